//! Resolves a single request from the command line and prints the decision.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use perspective_arbiter::config::ArbiterConfig;
use perspective_arbiter::journal::ConflictLogger;
use perspective_arbiter::telemetry::init_tracing;
use perspective_arbiter::{ExecutionContext, Perspective, Resolver};
use serde_json::Value;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "resolve-cli", about = "Resolve conflicts between perspectives")]
struct Args {
    /// Operation text, e.g. "deploy --skip-validation".
    #[arg(long)]
    operation: String,

    /// Active perspective identifier; repeat for each perspective.
    #[arg(long = "perspective", required = true)]
    perspectives: Vec<String>,

    /// Deployment environment.
    #[arg(long, default_value = "development")]
    environment: String,

    /// Target resource; repeat for each target.
    #[arg(long = "target")]
    targets: Vec<String>,

    /// Context flag as key=value; values are read as JSON when they parse.
    #[arg(long = "flag", value_parser = parse_flag)]
    flags: Vec<(String, Value)>,

    /// Overrides the audit log location.
    #[arg(long)]
    log_path: Option<PathBuf>,
}

fn parse_flag(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got `{raw}`"))?;
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_owned()));
    Ok((key.trim().to_owned(), value))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = ArbiterConfig::from_env().context("loading configuration")?;
    if let Some(path) = args.log_path {
        config.journal.path = path;
    }
    init_tracing(&config.telemetry)?;

    let logger = Arc::new(ConflictLogger::open(config.logger_config()?).await?);
    let resolver = Resolver::builder()
        .with_config(config.resolver)
        .with_sink(logger.clone())
        .build()?;

    let perspectives = Perspective::parse_list(&args.perspectives)?;
    let context = args.flags.into_iter().fold(
        ExecutionContext::new(args.operation.as_str())
            .with_environment(args.environment)
            .with_targets(args.targets),
        |ctx, (key, value)| ctx.with_flag(key, value),
    );

    let decision = resolver.resolve(&args.operation, &perspectives, &context);
    println!("{}", serde_json::to_string_pretty(&decision)?);

    let written = logger.cleanup().await?;
    info!(written, path = %logger.config().path().display(), "audit log flushed");
    Ok(())
}
