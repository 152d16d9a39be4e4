//! HTTP clients for the platform services
//!
//! This library provides:
//! - A registry client with random load-balanced instance resolution
//! - A config client for latest and pinned snapshots
//! - A heartbeat task that keeps an instance's lease alive

pub mod config;
pub mod error;
pub mod heartbeat;
pub mod registry;

pub use config::ConfigClient;
pub use error::{ClientError, Result};
pub use heartbeat::HeartbeatTask;
pub use registry::RegistryClient;

use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

fn http_client() -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?)
}

fn trim_base_url(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_string()
}
