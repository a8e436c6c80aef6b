use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use opentelemetry::{KeyValue, global};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    Resource,
    trace::{self, Sampler},
};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::{EnvFilter, Registry, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use imgreaper::api::routes;
use imgreaper::backends::{AzureCliRegistry, ConfiguredLeadership, KubectlClusterState};
use imgreaper::collector::Collector;
use imgreaper::config::AppConfig;
use imgreaper::metrics::ReaperMetrics;
use imgreaper::schedule::schedule;
use imgreaper::worker;

/// Deletes registry manifests no longer referenced by cluster workloads
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Configuration file to load instead of config/default and config/$RUN_MODE
    #[clap(short = 'c', long = "config")]
    config_file: Option<PathBuf>,

    /// Run a single collection pass right away, ignoring schedule and window, then exit
    #[clap(long = "once")]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_tracing()?;

    // Flush buffered spans on every exit path, errors included
    let result = run(args).await;
    global::shutdown_tracer_provider();
    result
}

async fn run(args: Args) -> anyhow::Result<()> {
    // Missing or invalid settings end the process with exit status 1
    let config = AppConfig::load(args.config_file.as_deref())?;
    let window = config.time_window()?;

    info!(version = env!("CARGO_PKG_VERSION"), "Starting imgreaperd");
    info!("Cleanup window: {}", window);
    info!("Period: {:?}", config.period());
    info!("Registry: {}", config.registry);
    info!("Cluster type: {}", config.cluster_type);
    info!("Delete untagged: {}", config.delete_untagged);
    info!("Retain latest untagged: {}", config.retain_latest_untagged);
    info!("Perform delete: {}", config.perform_delete);
    info!("Whitelisted: {:?}", config.whitelisted);

    let metrics_registry = prometheus::Registry::new();
    let metrics = ReaperMetrics::new(&metrics_registry)?;

    let collector = Arc::new(
        Collector::new(
            Arc::new(AzureCliRegistry::new(&config.az_path, &config.registry)),
            Arc::new(KubectlClusterState::new(
                &config.kubectl_path,
                config.workload_resources.clone(),
            )),
            Arc::new(ConfiguredLeadership::new(
                config.cluster_name.clone(),
                config.active_cluster_name.clone(),
            )),
            config.retention_policy(),
            metrics,
        )
        .perform_delete(config.perform_delete)
        .whitelist(&config.whitelisted),
    );

    if args.once {
        worker::run_once(&collector).await?;
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let ticks = schedule(&mut StdRng::from_entropy(), config.period());
    let worker = tokio::spawn({
        let collector = Arc::clone(&collector);
        async move { worker::run(&collector, &window, ticks, shutdown_rx).await }
    });

    let app = routes::service_router(metrics_registry);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Metrics available at http://{}:{}/metrics", addr.ip(), addr.port());

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Let a pass that is already running finish before exiting
    let _ = shutdown_tx.send(true);
    worker.await?;

    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Unable to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        result = signal::ctrl_c() => {
            if let Err(e) = result {
                warn!("Unable to listen for Ctrl+C: {}", e);
            }
        }
        _ = terminate => {}
    }

    info!("Stopping, waiting for the current pass to finish");
}

// Log to stdout, and export spans as well when an OTLP endpoint is configured
fn init_tracing() -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let otel_layer = match std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT") {
        Ok(endpoint) => Some(OpenTelemetryLayer::new(otlp_tracer(endpoint)?)),
        Err(_) => None,
    };

    Registry::default()
        .with(env_filter)
        .with(fmt::layer().with_target(true))
        .with(otel_layer)
        .try_init()?;
    Ok(())
}

fn otlp_tracer(endpoint: String) -> anyhow::Result<trace::Tracer> {
    let tracer = opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(
            opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(endpoint),
        )
        .with_trace_config(
            trace::config()
                .with_sampler(Sampler::AlwaysOn)
                .with_resource(Resource::new(vec![
                    KeyValue::new("service.name", "imgreaperd"),
                    KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
                ])),
        )
        .install_batch(opentelemetry_sdk::runtime::Tokio)?;

    Ok(tracer)
}
