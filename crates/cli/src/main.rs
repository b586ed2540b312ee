//! `vrfleet` -- VR headset fleet administration.
//!
//! Reads the backend connection from the environment (see
//! [`FleetConfig::from_env`]); a `.env` file is honoured. Reports are printed
//! as JSON on stdout and logs go to stderr.
//!
//! Exit codes: `0` complete, `1` error or nothing applied, `2` partial.

use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vrfleet_cli::{run, Cli, Completion, FleetConfig};

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match execute(cli).await {
        Ok(completion) => {
            if completion != Completion::Complete {
                tracing::warn!(?completion, "Command finished with failures");
            }
            ExitCode::from(completion.exit_code())
        }
        Err(e) => {
            let error = format!("{e:#}");
            tracing::error!(error = %error, "Command failed");
            ExitCode::FAILURE
        }
    }
}

async fn execute(cli: Cli) -> anyhow::Result<Completion> {
    let config = FleetConfig::from_env().context("Invalid configuration")?;
    let gateway = config.gateway().context("Failed to build backend client")?;
    tracing::debug!(
        api_url = %config.api_url,
        max_attempts = config.retry.max_attempts,
        pacing_ms = config.pacing.as_millis() as u64,
        "Backend configured",
    );
    let completion = run(&gateway, cli.command).await?;
    Ok(completion)
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "vrfleet=info".into());
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
