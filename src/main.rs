use confsync::ConfNode;
use confsync::ConfSyncConfig;
use confsync::ConfigSnapshot;
use confsync::ConsumerRegistry;
use confsync::Result;
use tokio::signal::unix::signal;
use tokio::signal::unix::SignalKind;
use tracing::error;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> Result<()> {
    init_observability();

    let config = ConfSyncConfig::new()?;

    let mut consumers = ConsumerRegistry::new();
    consumers.register("confsyncd", |snapshot: &ConfigSnapshot| {
        info!(
            path = %snapshot.path,
            version = snapshot.version,
            data = %snapshot.data_utf8(),
            "config reloaded"
        );
    });

    let node = ConfNode::builder(config).build()?;
    node.start(&consumers).await?;

    info!("Application started. Waiting for CTRL+C signal...");
    if let Err(e) = wait_for_shutdown_signal().await {
        error!("Failed to listen for shutdown signal: {:?}", e);
    }

    node.shutdown();
    info!("Exiting program.");
    Ok(())
}

async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        _ = sigint.recv() => {
            info!("SIGINT detected.");
        },
        _ = sigterm.recv() => {
            info!("SIGTERM detected.");
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl+C detected.");
        },
    }
    Ok(())
}

fn init_observability() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let base_subscriber = tracing_subscriber::fmt::layer().with_filter(filter);
    tracing_subscriber::registry().with(base_subscriber).init();
}
