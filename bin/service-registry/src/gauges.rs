//! Registry gauges refreshed on every request, `/metrics` included

use anyhow::Result;
use platform_http::{MetricsCollector, Middleware, MiddlewareContext};
use prometheus::IntGauge;
use registry_core::ServiceRegistry;
use std::sync::Arc;

pub struct RegistryGauges {
    registry: Arc<ServiceRegistry>,
    instances: IntGauge,
    evicted: IntGauge,
}

impl RegistryGauges {
    pub fn register(registry: Arc<ServiceRegistry>, metrics: &MetricsCollector) -> Result<Self> {
        Ok(Self {
            registry,
            instances: metrics.register_gauge("registry_instances", "Instances currently stored")?,
            evicted: metrics.register_gauge(
                "registry_evicted_instances",
                "Instances evicted for an expired lease since startup",
            )?,
        })
    }

    fn refresh(&self) {
        self.instances.set(self.registry.instance_count() as i64);
        self.evicted.set(self.registry.evicted_total() as i64);
    }
}

#[async_trait::async_trait]
impl Middleware for RegistryGauges {
    fn name(&self) -> &'static str {
        "RegistryGauges"
    }

    async fn on_request(&self, _context: &MiddlewareContext) -> Result<()> {
        self.refresh();
        Ok(())
    }
}
