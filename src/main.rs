use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use tes_scheduler::client::HttpTesClient;
use tes_scheduler::config::{CacheOptions, ControllerOptions, Options};
use tes_scheduler::scheduler::Scheduler;
use tes_scheduler::server::{install_metrics_recorder, run_ops_server};
use tes_scheduler::shutdown::install_shutdown_handler;

#[derive(Parser, Debug)]
#[command(name = "tes-scheduler")]
#[command(about = "Multi-cluster scheduler for a TES-style task execution service")]
struct Args {
    /// Endpoint of the upstream task service
    #[arg(long)]
    endpoint: String,

    /// Timeout for upstream requests, in seconds
    #[arg(long, default_value = "10")]
    client_timeout_secs: u64,

    /// Comma-separated list of scheduler plugins to enable
    #[arg(
        long,
        value_delimiter = ',',
        default_value = "ClusterCapacity,ClusterLimit,PrioritySort,ResourceQuota"
    )]
    scheduler_plugins: Vec<String>,

    /// Scheduler tick interval, in seconds
    #[arg(long, default_value = "10")]
    schedule_period_secs: u64,

    /// Heartbeat age after which a cluster stops receiving new tasks, in seconds
    #[arg(long, default_value = "300")]
    cluster_not_ready_timeout_secs: u64,

    /// Sync period of the cluster/task/extra-priority caches, in seconds
    #[arg(long, default_value = "10")]
    cache_sync_period_secs: u64,

    /// Controller sweep interval, in seconds
    #[arg(long, default_value = "10")]
    controller_period_secs: u64,

    /// Heartbeat age after which a cluster's tasks are rescheduled, in seconds
    #[arg(long, default_value = "1200")]
    cluster_reschedule_timeout_secs: u64,

    /// Port for the operational HTTP server (health, metrics)
    #[arg(long, default_value = "8080")]
    ops_port: u16,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let opts = Options {
        plugins: args.scheduler_plugins.clone(),
        schedule_period: Duration::from_secs(args.schedule_period_secs),
        cluster_not_ready_timeout: Duration::from_secs(args.cluster_not_ready_timeout_secs),
        cache: CacheOptions {
            sync_period: Duration::from_secs(args.cache_sync_period_secs),
        },
        controller: ControllerOptions {
            period: Duration::from_secs(args.controller_period_secs),
            cluster_reschedule_timeout: Duration::from_secs(args.cluster_reschedule_timeout_secs),
        },
    };
    opts.validate()?;

    tracing::info!(
        endpoint = %args.endpoint,
        plugins = ?opts.plugins,
        schedule_period_secs = args.schedule_period_secs,
        cache_sync_period_secs = args.cache_sync_period_secs,
        "Starting tes-scheduler"
    );

    let token = install_shutdown_handler();

    let client = Arc::new(HttpTesClient::new(
        args.endpoint,
        Duration::from_secs(args.client_timeout_secs),
    )?);

    // Leader election is provided externally: this process is started when
    // it holds the lease and killed when it loses it.
    let scheduler = Scheduler::new(&opts, client).await?;

    let metrics_handle = install_metrics_recorder();
    let ops_addr: SocketAddr = format!("0.0.0.0:{}", args.ops_port).parse()?;
    let ops_token = token.clone();
    tokio::spawn(async move {
        run_ops_server(ops_addr, metrics_handle, ops_token).await;
    });

    scheduler.run(token).await;

    Ok(())
}
