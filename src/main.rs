use clap::Parser;
use thiserror::Error;

use crate::config::Settings;
use crate::util::telemetry;

mod chat;
mod cli;
mod config;
mod ctl;
mod db;
mod karma;
mod ui;
mod util;

#[derive(Debug, Error)]
enum RunnerErr {
    #[error(transparent)]
    Env(#[from] util::env::EnvErr),

    #[error(transparent)]
    Config(#[from] config::ConfigError),

    #[error(transparent)]
    Ctl(#[from] ctl::CtlError),

    #[error(transparent)]
    Std(#[from] Box<dyn std::error::Error + Send + Sync>),
}

type Result<T> = core::result::Result<T, RunnerErr>;

#[tokio::main]
async fn main() -> Result<()> {
    util::env::load_dotenv()?;
    let cli = cli::Cli::parse();

    let mut settings = Settings::from_env()?;
    cli.apply(&mut settings);

    let telemetry_registry =
        telemetry::Telemetry::new(settings.otel_endpoint.as_deref())?.register();

    tracing::info!(command = ?cli.action(), "starting karmabot");
    let result = ctl::execute(cli.action(), &settings).await;

    if let Err(e) = &result {
        tracing::error!(error = ?e, "karmabot exited with an error");
    }

    telemetry_registry.shutdown();
    Ok(result?)
}
