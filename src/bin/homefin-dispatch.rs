//! homefin-dispatch CLI: runs the background dispatch worker.

use clap::{Parser, Subcommand};
use homefin_dispatch::config::secrets::ExposeSecret;
use homefin_dispatch::config::{Config, DispatchConfig};
use homefin_dispatch::db::Db;
use homefin_dispatch::dispatch::{DispatchQueue, DispatchWorker, WorkerExit};
use homefin_dispatch::health::HealthState;
use homefin_dispatch::job::{Job, JobRegistry, SeedSampleData};
use homefin_dispatch::telemetry::{TelemetryConfig, init_telemetry};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Parser)]
#[command(name = "homefin-dispatch", about = "Serial background job dispatcher")]
struct Cli {
    /// TOML file with a [dispatch] table
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the dispatch worker until Ctrl-C
    Serve {
        /// Enqueue a sample-data seeding job at startup
        #[arg(long)]
        seed: bool,
        /// Seconds between health report log lines
        #[arg(long, default_value_t = 30)]
        report_every: u64,
    },
    /// Run one sample-data seeding job through the dispatcher and exit
    Seed,
    /// List registered job types
    Jobs,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let dispatch = match &cli.config {
        Some(path) => DispatchConfig::load(path)?,
        None => DispatchConfig::default(),
    };
    let config = Config::from_env_with(dispatch)?;

    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "homefin-dispatch".to_string(),
        default_filter: config.log_level.clone(),
    })?;

    let db = Db::connect(
        config.database_url.expose_secret(),
        config.db_max_connections,
    )
    .await?;
    db.migrate().await?;
    let registry = build_registry(Arc::new(db));

    match cli.command {
        Command::Serve { seed, report_every } => {
            cmd_serve(config, registry, seed, Duration::from_secs(report_every)).await
        }
        Command::Seed => cmd_seed(config, registry).await,
        Command::Jobs => {
            for tag in registry.tags() {
                println!("{tag}");
            }
            Ok(())
        }
    }
}

fn build_registry(db: Arc<Db>) -> JobRegistry {
    let mut registry = JobRegistry::empty();
    registry.register::<SeedSampleData, _>(move || {
        Ok(Box::new(SeedSampleData::new(Arc::clone(&db))) as Box<dyn Job>)
    });
    registry
}

async fn cmd_serve(
    config: Config,
    registry: JobRegistry,
    seed: bool,
    report_every: Duration,
) -> anyhow::Result<()> {
    let queue = Arc::new(DispatchQueue::new(config.dispatch.max_length));
    let health = Arc::new(HealthState::new());
    let shutdown = CancellationToken::new();

    let worker = DispatchWorker::new(
        Arc::clone(&queue),
        Arc::new(registry),
        Arc::clone(&health),
        config.dispatch.clone(),
    )?
    .spawn(shutdown.clone());

    if seed {
        let id = queue.enqueue::<SeedSampleData>("Seed sample household data")?;
        info!(work.id = %id, "seeding job enqueued");
    }

    let reporter = {
        let health = Arc::clone(&health);
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            let mut every = tokio::time::interval(report_every.max(Duration::from_secs(1)));
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = every.tick() => {
                        match serde_json::to_string(&health.report()) {
                            Ok(json) => info!(health = %json, "health report"),
                            Err(e) => debug!("health report not serialisable: {e}"),
                        }
                    }
                }
            }
        })
    };

    tokio::signal::ctrl_c().await.ok();
    info!("shutdown requested");
    shutdown.cancel();

    let exit = worker.shutdown().await;
    reporter.await.ok();
    info!(exit = ?exit, "dispatcher exited");
    exit.into_result()?;
    Ok(())
}

async fn cmd_seed(config: Config, registry: JobRegistry) -> anyhow::Result<()> {
    let queue = Arc::new(DispatchQueue::new(config.dispatch.max_length));
    let health = Arc::new(HealthState::new());
    let worker = DispatchWorker::new(
        Arc::clone(&queue),
        Arc::new(registry),
        health,
        config.dispatch.clone(),
    )?
    .spawn(CancellationToken::new());

    let id = queue.enqueue::<SeedSampleData>("Seed sample household data")?;
    println!("Enqueued: {id}");

    let Some(stats) = worker
        .wait_for_processed(1, config.dispatch.idle_wait)
        .await
    else {
        let exit = worker.join().await;
        anyhow::bail!("dispatch worker stopped before the seeding job finished ({exit:?})");
    };
    let exit = worker.shutdown().await;
    if stats.succeeded == 1 && exit == WorkerExit::Clean {
        println!("Seeded sample data.");
        return Ok(());
    }
    anyhow::bail!("seeding job did not succeed (see log for details)");
}
