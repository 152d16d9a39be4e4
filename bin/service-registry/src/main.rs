use anyhow::Result;
use platform_http::{shutdown_signal, telemetry};
use registry_core::{EvictionSweeper, ServiceRegistry};
use service_registry::settings::DEFAULT_PORT;
use service_registry::{build_server, RegistryServiceSettings};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = RegistryServiceSettings::load()?;
    telemetry::init(settings.server.log_format);

    info!("Starting service-registry...");

    let registry = Arc::new(ServiceRegistry::new(settings.registry_settings()));
    info!(
        "Service registry initialized (lease {:?}, sweep every {:?})",
        registry.settings().lease_duration,
        registry.settings().effective_sweep_interval()
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = EvictionSweeper::new(registry.clone()).spawn(shutdown_rx);

    let server = Arc::new(
        build_server(registry)?.with_max_body_bytes(settings.server.max_body_bytes),
    );
    let listener = TcpListener::bind(settings.server.listen_addr(DEFAULT_PORT)).await?;
    server.serve(listener, shutdown_signal()).await?;

    let _ = shutdown_tx.send(true);
    sweeper.await?;
    info!("service-registry stopped");
    Ok(())
}
