use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

pub mod api;
use api::ApiServer;
pub mod config;
use config::app_config::{load_config, setup_http_client};
pub mod http_probe;
pub mod monitor;
use monitor::Monitor;
pub mod scheduler;
use scheduler::Scheduler;
pub mod store;
use store::MetricsStore;

#[cfg(test)]
mod test_support;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let app_config = load_config()?;

    let store = MetricsStore::open(&app_config.database_path)?;
    let client = setup_http_client(&app_config)?;
    let monitor = Monitor::new(client, app_config.target_url.as_str(), store);

    let server = ApiServer::bind(app_config.listen_address, monitor.clone()).await?;
    let scheduler = Scheduler::new(monitor, app_config.poll_interval).start();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let server_task = tokio::spawn(server.serve(shutdown_rx));

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested");

    shutdown_tx.send(true)?;
    scheduler.stop().await;
    server_task.await??;

    Ok(())
}
