use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use release_retention_core::{RetentionFilter, TracingObserver};
use release_retention_data::RetentionDataset;
use serde_json::Value;
use tracing_subscriber::EnvFilter;

const CLI_CONTRACT_VERSION: &str = "retention.v1";

#[derive(Debug, Parser)]
#[command(name = "relret")]
#[command(about = "Resolve the most recently deployed releases to retain per project and environment")]
struct Cli {
    /// Directory containing Projects.json, Releases.json, Environments.json
    /// and Deployments.json.
    #[arg(long)]
    data_dir: PathBuf,

    /// How many of the most recently deployed releases to keep per
    /// (project, environment) pair.
    #[arg(long, short = 'n', value_parser = parse_count, allow_hyphen_values = true)]
    count: usize,

    /// Restrict the resolution to one project id.
    #[arg(long)]
    project: Option<String>,

    /// Restrict the resolution to one environment id.
    #[arg(long)]
    environment: Option<String>,
}

// Negative or non-numeric counts fail here with the same argument name the
// resolver uses, rather than clap's own flag-centric message.
fn parse_count(raw: &str) -> Result<usize, String> {
    raw.parse::<usize>()
        .map_err(|_| "invalid argument `number_of_releases`: must be an integer of at least 1".to_string())
}

fn with_contract_version(value: Value) -> Value {
    match value {
        Value::Object(mut object) => {
            object.insert(
                "contract_version".to_string(),
                Value::String(CLI_CONTRACT_VERSION.to_string()),
            );
            Value::Object(object)
        }
        other => serde_json::json!({
            "contract_version": CLI_CONTRACT_VERSION,
            "payload": other
        }),
    }
}

fn emit_json(value: Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&with_contract_version(value))?);
    Ok(())
}

fn main() -> Result<()> {
    // Retained-release records go to stderr; stdout carries only the JSON
    // document.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let dataset = RetentionDataset::load_dir(&cli.data_dir)?;
    let resolver = dataset.into_resolver();
    let filter = RetentionFilter { project_id: cli.project, environment_id: cli.environment };

    let mut observer = TracingObserver;
    let resolutions = resolver.retain_releases(cli.count, &filter, &mut observer)?;
    let retained: usize =
        resolutions.iter().map(|resolution| resolution.releases_to_keep.len()).sum();

    emit_json(serde_json::json!({
        "count": cli.count,
        "retained": retained,
        "resolutions": resolutions,
    }))
}
