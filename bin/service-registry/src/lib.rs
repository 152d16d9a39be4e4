//! Service registry HTTP server

pub mod api;
pub mod dashboard;
pub mod gauges;
pub mod settings;

pub use settings::RegistryServiceSettings;

use anyhow::Result;
use gauges::RegistryGauges;
use platform_http::{HttpServer, MetricsCollector};
use registry_core::ServiceRegistry;
use std::sync::Arc;

pub const SERVER_NAME: &str = "service-registry";

/// Server with the registry routes and instance gauges on `/metrics`
pub fn build_server(registry: Arc<ServiceRegistry>) -> Result<HttpServer<ServiceRegistry>> {
    let metrics = MetricsCollector::new()?;
    let gauges = RegistryGauges::register(registry.clone(), &metrics)?;
    Ok(HttpServer::new(SERVER_NAME, registry, api::routes(), metrics).with_middleware(gauges))
}
