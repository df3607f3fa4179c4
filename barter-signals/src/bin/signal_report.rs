use barter_signals::{
    AnalyticsConfig, AnalyticsError, ApiResponse, MarketSnapshot, SignalReport, build_report,
};
use futures::future::join_all;
use std::process::ExitCode;
use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Error)]
enum ReportError {
    #[error("usage: signal-report [--config <path>] <snapshot.json>...")]
    Usage,

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Json {
        path: String,
        source: serde_json::Error,
    },

    #[error("{path}: {source}")]
    Analytics {
        path: String,
        source: AnalyticsError,
    },

    #[error("analysis task for {path} failed: {source}")]
    Task {
        path: String,
        source: tokio::task::JoinError,
    },
}

#[derive(Debug, Default)]
struct Args {
    config: Option<String>,
    snapshots: Vec<String>,
}

impl Args {
    fn parse(mut args: impl Iterator<Item = String>) -> Result<Self, ReportError> {
        let mut parsed = Self::default();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" => parsed.config = Some(args.next().ok_or(ReportError::Usage)?),
                "-h" | "--help" => return Err(ReportError::Usage),
                _ => parsed.snapshots.push(arg),
            }
        }

        if parsed.snapshots.is_empty() {
            return Err(ReportError::Usage);
        }
        Ok(parsed)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialise logging
    init_logging();

    let args = match Args::parse(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(error) => {
            eprintln!("{error}");
            return ExitCode::from(2);
        }
    };

    let config = match load_config(args.config.as_deref()).await {
        Ok(config) => config,
        Err(error) => {
            error!(%error, "failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    info!(snapshots = args.snapshots.len(), "building signal reports");

    // Analyse every snapshot concurrently, preserving input order in the output
    let results = join_all(
        args.snapshots
            .into_iter()
            .map(|path| analyse_snapshot(path, config)),
    )
    .await;

    let mut failures = 0;
    for result in results {
        if let Err(error) = &result {
            error!(%error, "signal report failed");
            failures += 1;
        }

        match serde_json::to_string(&ApiResponse::from_result(result)) {
            Ok(json) => println!("{json}"),
            Err(error) => {
                error!(%error, "failed to serialise signal report");
                failures += 1;
            }
        }
    }

    if failures > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

/// Defaults, then the optional JSON config file, then environment variable overrides.
async fn load_config(path: Option<&str>) -> Result<AnalyticsConfig, ReportError> {
    let base = match path {
        Some(path) => {
            let contents = read(path).await?;
            serde_json::from_str(&contents).map_err(|source| ReportError::Json {
                path: path.to_string(),
                source,
            })?
        }
        None => AnalyticsConfig::default(),
    };

    Ok(base.with_overrides(|key| std::env::var(key).ok()))
}

async fn analyse_snapshot(
    path: String,
    config: AnalyticsConfig,
) -> Result<SignalReport, ReportError> {
    let contents = read(&path).await?;
    let snapshot: MarketSnapshot =
        serde_json::from_str(&contents).map_err(|source| ReportError::Json {
            path: path.clone(),
            source,
        })?;

    match tokio::task::spawn_blocking(move || build_report(&snapshot, &config)).await {
        Ok(Ok(report)) => {
            info!(%path, symbol = %report.symbol, "built signal report");
            Ok(report)
        }
        Ok(Err(source)) => Err(ReportError::Analytics { path, source }),
        Err(source) => Err(ReportError::Task { path, source }),
    }
}

async fn read(path: &str) -> Result<String, ReportError> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ReportError::Io {
            path: path.to_string(),
            source,
        })
}

/// Log to stderr so stdout carries only the JSON envelopes.
fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}
