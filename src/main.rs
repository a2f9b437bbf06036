use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::debug;

use wait_for_port::{wait, WaitConfig, WaitError};

/// Wait until a TCP port is in use or free.
#[derive(Parser, Debug)]
#[command(name = "wait-for-port", version, disable_help_flag = true)]
struct Args {
    /// Port to check
    #[arg(allow_negative_numbers = true)]
    port: i64,

    /// Host where to check for the port (empty means the local machine)
    #[arg(short = 'h', long, default_value = "", value_name = "HOST")]
    host: String,

    /// State to wait for: inuse or free
    #[arg(short, long, default_value = "inuse")]
    state: String,

    /// Timeout in seconds to wait for the port (zero or negative gives up after the first check)
    #[arg(short, long, default_value_t = 30, value_name = "SECONDS", allow_negative_numbers = true)]
    timeout: i64,

    /// JSON config file (overrides WAIT_FOR_PORT_CONFIG)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Log level for stderr output (overrides the config file)
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Print help
    #[arg(long, action = ArgAction::Help)]
    help: Option<bool>,
}

async fn load_config(args: &Args) -> Result<WaitConfig> {
    let mut config = match &args.config {
        Some(path) => WaitConfig::load(path).await?,
        None => WaitConfig::from_env().await?,
    };
    if let Some(level) = &args.log_level {
        config.log_level = level.clone();
    }
    config.validate()?;
    Ok(config)
}

fn init_tracing(config: &WaitConfig) -> Result<()> {
    let log_level = config.tracing_level()?;
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env()
                         .add_directive(format!("wait_for_port={}", log_level.as_str().to_lowercase()).parse()?))
        .init();
    Ok(())
}

fn timeout_from_secs(secs: i64) -> Duration {
    Duration::from_secs(secs.max(0).unsigned_abs())
}

async fn run(args: Args) -> Result<()> {
    let config = load_config(&args).await.context("loading configuration")?;
    init_tracing(&config)?;
    debug!("config: {:?}", config);

    wait(
        &args.host,
        args.port,
        &args.state,
        timeout_from_secs(args.timeout),
        &config,
    )
    .await?;
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // Usage errors and --help exit like any other failure.
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            // Wait errors already carry their cause in the message.
            match e.downcast_ref::<WaitError>() {
                Some(wait_err) => eprintln!("{}", wait_err),
                None => eprintln!("{:#}", e),
            }
            ExitCode::FAILURE
        }
    }
}
