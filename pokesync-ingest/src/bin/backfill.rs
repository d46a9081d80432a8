//! Offline Repair Binary
//!
//! Re-applies the ownership rules and relation synchronization to every
//! stored instance, then prints a counter report.
//!
//! Usage:
//!   pokesync-backfill [--tags-only] [--batch-size N]

use std::process::ExitCode;
use std::sync::Arc;

use pokesync_ingest::jobs::{run_backfill, BackfillConfig};
use pokesync_ingest::telemetry::{init_tracer, TelemetryConfig};
use pokesync_storage::{DbConfig, PgStore};

const USAGE: &str = "usage: pokesync-backfill [--tags-only] [--batch-size N]";

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<BackfillConfig, String> {
    let mut config = BackfillConfig::default();
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--tags-only" => config.tags_only = true,
            "--batch-size" => {
                let value = args
                    .next()
                    .ok_or_else(|| "--batch-size requires a value".to_string())?;
                config.batch_size = value
                    .parse::<usize>()
                    .ok()
                    .filter(|n| *n > 0)
                    .ok_or_else(|| format!("invalid --batch-size: {}", value))?;
            }
            "-h" | "--help" => return Err(USAGE.to_string()),
            other => return Err(format!("unknown argument: {}\n{}", other, USAGE)),
        }
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> ExitCode {
    let config = match parse_args(std::env::args().skip(1)) {
        Ok(config) => config,
        Err(message) => {
            eprintln!("{}", message);
            return ExitCode::from(2);
        }
    };

    let telemetry = TelemetryConfig {
        service_name: "pokesync-backfill".to_string(),
        ..TelemetryConfig::from_env()
    };
    if let Err(e) = init_tracer(&telemetry) {
        eprintln!("{}", e);
        return ExitCode::FAILURE;
    }

    let store = match PgStore::from_config(&DbConfig::from_env()) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            tracing::error!(error = %e, "Failed to create database pool");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(
        batch_size = config.batch_size,
        tags_only = config.tags_only,
        "Backfill starting"
    );

    match run_backfill(store, config).await {
        Ok(report) => {
            println!("{}", report);
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "Backfill aborted");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_defaults() {
        let config = parse_args(args(&[])).unwrap();
        assert_eq!(config, BackfillConfig::default());
        assert_eq!(config.batch_size, 500);
    }

    #[test]
    fn test_parse_flags() {
        let config = parse_args(args(&["--tags-only", "--batch-size", "50"])).unwrap();
        assert!(config.tags_only);
        assert_eq!(config.batch_size, 50);
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(parse_args(args(&["--batch-size"])).is_err());
        assert!(parse_args(args(&["--batch-size", "0"])).is_err());
        assert!(parse_args(args(&["--verbose"])).is_err());
    }
}
