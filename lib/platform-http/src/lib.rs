//! HTTP plumbing shared by the platform services
//!
//! This library provides:
//! - An explicit method + path routing table
//! - JSON response helpers
//! - A middleware chain with request logging, request ids and Prometheus metrics
//! - The hyper accept loop with graceful shutdown
//! - Settings loading and tracing initialisation

pub mod metrics;
pub mod middleware;
pub mod response;
pub mod routes;
pub mod server;
pub mod settings;
pub mod telemetry;

pub use metrics::{MetricsCollector, MetricsMiddleware};
pub use middleware::{
    LoggingMiddleware, Middleware, MiddlewareChain, MiddlewareContext, RequestIdMiddleware,
};
pub use response::ApiResponse;
pub use routes::{ApiRequest, RouteMatch, RouteTable};
pub use server::{shutdown_signal, HttpServer};
pub use settings::{LogFormat, ServerSettings};
