use anyhow::Result;
use config_core::{ConfigDistributor, ConfigRepository};
use config_server::settings::DEFAULT_PORT;
use config_server::{build_server, open_store, ConfigServerSettings};
use platform_http::{shutdown_signal, telemetry};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = ConfigServerSettings::load()?;
    telemetry::init(settings.server.log_format);

    info!("Starting config-server...");

    let distributor = Arc::new(ConfigDistributor::new(open_store(&settings)?));

    if let Some(repo) = &settings.config_repo {
        let report = ConfigRepository::load(repo)?.seed(&distributor).await?;
        info!(
            "Seeded from {}: {} published, {} unchanged",
            repo.display(),
            report.published.len(),
            report.unchanged.len()
        );
    }

    let server = Arc::new(
        build_server(distributor)?.with_max_body_bytes(settings.server.max_body_bytes),
    );
    let listener = TcpListener::bind(settings.server.listen_addr(DEFAULT_PORT)).await?;
    server.serve(listener, shutdown_signal()).await?;

    info!("config-server stopped");
    Ok(())
}
