mod db;
mod http;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::info;

use herald_core::Config;
use herald_queue::{SqsConsumer, SqsPublisher};
use herald_scheduler::{Pipeline, PipelineDeps, PipelineMetrics};
use herald_store::PgStore;

/// Durable launch-time scheduler: stores requested launches and publishes a
/// notification when each one falls due.
#[derive(Parser, Debug)]
#[command(name = "herald", version, about)]
struct Cli {
    /// Config profile; overrides HERALD_PROFILE.
    #[arg(long, global = true)]
    profile: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run migrations, then the scheduler (default).
    Run,
    /// Apply database migrations and exit.
    Migrate,
    /// Print the resolved configuration without secrets.
    Config,
}

fn load_config(profile: Option<&str>) -> Config {
    herald_core::config::load_dotenv();
    match profile {
        Some(p) => Config::for_profile(p),
        None => Config::from_env(),
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    config.validate().context("invalid configuration")?;
    config.log_summary();

    let pool = db::connect(&config.postgres).await?;
    db::migrate(&pool).await?;

    let store = Arc::new(PgStore::new(pool.clone()));
    let consumer = Arc::new(SqsConsumer::new(&config.aws, &config.queue));
    let publisher = Arc::new(SqsPublisher::new(&config.aws, &config.queue));
    let metrics = Arc::new(PipelineMetrics::new());

    let deps = PipelineDeps {
        task_store: store.clone(),
        request_store: store,
        consumer: consumer.clone(),
        publisher,
    };
    let pipeline = Pipeline::new(config.scheduler.clone(), deps)
        .batch_size(config.queue.max_batch_size)
        .poll_interval(config.queue.poll_interval())
        .metrics(metrics.clone())
        .spawn()
        .context("failed to start scheduler pipeline")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", config.server.host, config.server.port))?;
    let server = http::spawn_server(
        addr,
        Arc::new(http::AppState {
            metrics,
            consumer,
            database: Some(pool.clone()),
        }),
        shutdown_rx,
    );

    shutdown_signal().await?;
    info!("shutdown signal received");

    let _ = shutdown_tx.send(true);
    pipeline.shutdown().await;
    let _ = server.await;
    pool.close().await;

    info!("herald exited cleanly");
    Ok(())
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() -> anyhow::Result<()> {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .context("failed to register SIGTERM handler")?;
        tokio::select! {
            res = ctrl_c => res.context("failed to listen for ctrl_c")?,
            _ = sigterm.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.context("failed to listen for ctrl_c")?;
    }

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.profile.as_deref());

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(config).await?,
        Commands::Migrate => {
            let pool = db::connect(&config.postgres).await?;
            db::migrate(&pool).await?;
            pool.close().await;
        }
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config.redacted_summary())?);
        }
    }

    Ok(())
}
