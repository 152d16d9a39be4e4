use anyhow::Result;
use platform_client::{ConfigClient, HeartbeatTask, RegistryClient};
use platform_http::{shutdown_signal, telemetry};
use product_service::catalog::Catalog;
use product_service::settings::DEFAULT_PORT;
use product_service::state::{AppState, ConfigSource};
use product_service::{build_server, ProductServiceSettings};
use registry_core::InstanceAddress;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let settings = ProductServiceSettings::load()?;
    telemetry::init(settings.server.log_format);

    info!("Starting product-service...");

    let source = match &settings.config_url {
        Some(url) => Some(ConfigSource {
            client: ConfigClient::new(url)?,
            application: settings.service_name.clone(),
            profile: settings.profile.clone(),
        }),
        None => None,
    };
    let state = Arc::new(AppState::new(
        Catalog::new(settings.products.clone()),
        source,
    ));
    info!("Catalog initialized with {} products", state.catalog.count().await);

    if settings.config_url.is_some() {
        match state.refresh().await {
            Ok(_) => info!("Configuration version {:?} loaded", state.config_version().await),
            Err(e) if settings.fail_fast => return Err(e.into()),
            Err(e) => warn!("Starting without distributed configuration: {}", e),
        }
    }

    let listener = TcpListener::bind(settings.server.listen_addr(DEFAULT_PORT)).await?;
    let port = listener.local_addr()?.port();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let heartbeat = match &settings.registry_url {
        Some(url) => {
            let address = InstanceAddress::new(settings.advertise_host.clone(), port)?;
            let task = HeartbeatTask::new(
                RegistryClient::new(url)?,
                settings.service_name.clone(),
                settings.instance_id(),
                address,
                Duration::from_secs(settings.heartbeat_secs),
            );
            if let Err(e) = task.register().await {
                warn!("Initial registration failed, the heartbeat will retry: {}", e);
            }
            Some(task.spawn(shutdown_rx))
        }
        None => {
            info!("No registry configured, skipping registration");
            None
        }
    };

    let server = Arc::new(build_server(state)?.with_max_body_bytes(settings.server.max_body_bytes));
    server.serve(listener, shutdown_signal()).await?;

    let _ = shutdown_tx.send(true);
    if let Some(heartbeat) = heartbeat {
        heartbeat.await?;
    }
    info!("product-service stopped");
    Ok(())
}
