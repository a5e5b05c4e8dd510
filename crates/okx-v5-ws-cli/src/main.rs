/*
[INPUT]:  CLI arguments, YAML configuration file, OS shutdown signals
[OUTPUT]: Live OKX v5 WebSocket session with channel pushes logged
[POS]:    Binary entry point
[UPDATE]: When changing CLI flags, startup flow, or shutdown handling
*/

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use okx_v5_ws::OkxV5Ws;
use okx_v5_ws_cli::{RunnerConfig, run_subscriptions};

#[derive(Parser, Debug)]
#[command(name = "okx-v5-ws", version, about = "OKX v5 WebSocket channel runner")]
struct Cli {
    #[arg(long = "config", value_name = "PATH")]
    config_path: PathBuf,
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    log_level: String,
    #[arg(long = "dry-run")]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(&args.log_level)?;

    info!(
        config_path = %args.config_path.display(),
        dry_run = args.dry_run,
        "starting okx-v5-ws"
    );

    let config = load_config(&args.config_path)?;
    let client_config = config.client_config()?;
    info!(
        url = %client_config.url,
        topic_count = config.topics.len(),
        login = client_config.should_auto_login(),
        "configuration loaded"
    );

    if args.dry_run {
        info!("dry-run requested; configuration validated");
        return Ok(());
    }

    let client = OkxV5Ws::new(client_config).context("create client")?;
    let shutdown = CancellationToken::new();
    setup_signal_handlers(shutdown.clone());

    let subscriptions = tokio::spawn(run_subscriptions(
        client.clone(),
        config.topics.clone(),
        shutdown.clone(),
    ));

    client.connect().await.context("connect")?;
    info!("connected");

    shutdown.cancelled().await;
    info!("shutdown signal received");

    subscriptions
        .await
        .context("join subscription task")?
        .context("run subscriptions")?;
    client.close().await.context("close client")?;
    info!("client closed");

    Ok(())
}

fn init_tracing(log_level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(log_level).context("invalid log level")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|err| anyhow!(err))
        .context("initialize tracing subscriber")?;
    Ok(())
}

fn load_config(path: &PathBuf) -> Result<RunnerConfig> {
    let path_str = path.to_str().context("config path must be valid utf-8")?;
    RunnerConfig::from_file(path_str).context("load config")
}

fn setup_signal_handlers(shutdown: CancellationToken) {
    let shutdown_clone = shutdown.clone();
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to install SIGINT handler");
            return;
        }
        info!("received SIGINT");
        shutdown_clone.cancel();
    });

    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let shutdown_clone = shutdown.clone();
        tokio::spawn(async move {
            match signal(SignalKind::terminate()) {
                Ok(mut stream) => {
                    stream.recv().await;
                    info!("received SIGTERM");
                    shutdown_clone.cancel();
                }
                Err(err) => {
                    warn!(error = %err, "failed to install SIGTERM handler");
                }
            }
        });
    }
}
