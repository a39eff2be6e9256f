use bilancial::args::{Args, Command};
use bilancial::{commands, Config, Error, ErrorType, Result};
use clap::Parser;
use std::path::Path;
use std::process::ExitCode;
use tracing::{debug, error, trace};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let log_level = args.common().log_level();
    init_logger(log_level);
    debug!("Log level set to {}", log_level.to_string().to_lowercase());

    match main_inner(args).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Exiting with error: {e}");
            ExitCode::FAILURE
        }
    }
}

pub async fn main_inner(args: Args) -> Result<()> {
    trace!("{args:?}");
    let home = args.common().bilancial_home().path();

    let _: () = match args.command() {
        Command::Init => commands::init(home).await?.print(),
        Command::Report(report_args) => commands::report(load(home).await?, report_args.clone())
            .await?
            .print(),
        Command::Categories => commands::categories(load(home).await?).await?.print(),
        Command::Accounts => commands::accounts(load(home).await?).await?.print(),
        Command::Overlay(overlay_args) => {
            commands::overlay(load(home).await?, overlay_args.clone())
                .await?
                .print()
        }
    };
    Ok(())
}

async fn load(home: &Path) -> Result<Config> {
    Config::load(home)
        .await
        .map_err(|e| Error::new(ErrorType::Config, e))
}

/// Initializes the tracing subscriber.
pub fn init_logger(level: LevelFilter) {
    let filter = match std::env::var("RUST_LOG").ok() {
        // RUST_LOG wins when it is set.
        Some(_) => EnvFilter::from_default_env(),
        None => EnvFilter::new(format!(
            "{}={},{}={}",
            env!("CARGO_CRATE_NAME"),
            level,
            env!("CARGO_BIN_NAME"),
            level
        )),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
