//! Product service: catalog API wired to the registry and config server

pub mod api;
pub mod catalog;
pub mod settings;
pub mod state;

pub use settings::ProductServiceSettings;

use anyhow::Result;
use platform_http::{HttpServer, MetricsCollector};
use state::AppState;
use std::sync::Arc;

pub const SERVER_NAME: &str = "product-service";

pub fn build_server(state: Arc<AppState>) -> Result<HttpServer<AppState>> {
    let metrics = MetricsCollector::new()?;
    Ok(HttpServer::new(SERVER_NAME, state, api::routes(), metrics))
}
