//! Middleware framework for request/response hooks

use anyhow::Result;
use hyper::{HeaderMap, Method};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, span, warn, Instrument, Level};

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Context passed through middleware chain
#[derive(Clone, Debug)]
pub struct MiddlewareContext {
    /// Request method
    pub method: String,
    /// Request path
    pub path: String,
    /// Matched route pattern, or "unmatched"
    pub route: String,
    /// Request headers
    pub request_headers: HashMap<String, String>,
    /// When the request was received
    pub started_at: Instant,
    /// Custom metadata for middleware
    pub metadata: Arc<Mutex<HashMap<String, String>>>,
}

impl MiddlewareContext {
    pub fn new(method: &Method, path: &str, route: &str, headers: &HeaderMap) -> Self {
        let request_headers = headers
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
            .collect();

        Self {
            method: method.to_string(),
            path: path.to_string(),
            route: route.to_string(),
            request_headers,
            started_at: Instant::now(),
            metadata: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Get a metadata value
    pub fn get_metadata(&self, key: &str) -> Option<String> {
        self.metadata
            .lock()
            .ok()
            .and_then(|m| m.get(key).cloned())
    }

    /// Set a metadata value
    pub fn set_metadata(&self, key: String, value: String) {
        if let Ok(mut m) = self.metadata.lock() {
            m.insert(key, value);
        }
    }
}

/// Middleware trait for processing requests and responses
#[async_trait::async_trait]
pub trait Middleware: Send + Sync {
    fn name(&self) -> &'static str {
        "UnnamedMiddleware"
    }

    /// Called before the handler runs
    async fn on_request(&self, _context: &MiddlewareContext) -> Result<()> {
        Ok(())
    }

    /// Called once the response status is known
    async fn on_response(&self, _context: &MiddlewareContext, _status: u16) -> Result<()> {
        Ok(())
    }

    /// Called for server-side failures (5xx)
    async fn on_error(&self, _context: &MiddlewareContext, _error: &str) -> Result<()> {
        Ok(())
    }
}

/// Chain of middleware to execute in order
#[derive(Clone, Default)]
pub struct MiddlewareChain {
    middleware: Vec<Arc<dyn Middleware>>,
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self {
            middleware: Vec::new(),
        }
    }

    /// Add middleware to the chain
    pub fn add<M: Middleware + 'static>(mut self, middleware: M) -> Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    pub fn len(&self) -> usize {
        self.middleware.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middleware.is_empty()
    }

    /// Process request through all middleware
    pub async fn on_request(&self, context: &MiddlewareContext) -> Result<()> {
        for mw in &self.middleware {
            let span = span!(Level::DEBUG, "middleware", name = mw.name());
            mw.on_request(context).instrument(span).await?;
        }
        Ok(())
    }

    /// Process response through all middleware (in reverse order)
    pub async fn on_response(&self, context: &MiddlewareContext, status: u16) -> Result<()> {
        for mw in self.middleware.iter().rev() {
            let span = span!(Level::DEBUG, "middleware", name = mw.name());
            mw.on_response(context, status).instrument(span).await?;
        }
        Ok(())
    }

    /// Process error through all middleware
    pub async fn on_error(&self, context: &MiddlewareContext, error: &str) -> Result<()> {
        for mw in &self.middleware {
            let span = span!(Level::DEBUG, "middleware", name = mw.name());
            mw.on_error(context, error).instrument(span).await?;
        }
        Ok(())
    }
}

/// Assigns each request an id, reusing the caller's `x-request-id` if present
pub struct RequestIdMiddleware;

#[async_trait::async_trait]
impl Middleware for RequestIdMiddleware {
    fn name(&self) -> &'static str {
        "RequestIdMiddleware"
    }

    async fn on_request(&self, context: &MiddlewareContext) -> Result<()> {
        let id = context
            .request_headers
            .get(REQUEST_ID_HEADER)
            .cloned()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        context.set_metadata("request_id".to_string(), id);
        Ok(())
    }
}

/// Logging middleware that logs request and response info
pub struct LoggingMiddleware;

#[async_trait::async_trait]
impl Middleware for LoggingMiddleware {
    fn name(&self) -> &'static str {
        "LoggingMiddleware"
    }

    async fn on_request(&self, context: &MiddlewareContext) -> Result<()> {
        debug!(
            request_id = %context.get_metadata("request_id").unwrap_or_default(),
            "Request: {} {}",
            context.method,
            context.path
        );
        Ok(())
    }

    async fn on_response(&self, context: &MiddlewareContext, status: u16) -> Result<()> {
        let request_id = context.get_metadata("request_id").unwrap_or_default();
        let elapsed_ms = context.elapsed().as_millis() as u64;
        if status >= 500 {
            warn!(request_id = %request_id, status, elapsed_ms, "{} {}", context.method, context.path);
        } else {
            info!(request_id = %request_id, status, elapsed_ms, "{} {}", context.method, context.path);
        }
        Ok(())
    }

    async fn on_error(&self, context: &MiddlewareContext, error: &str) -> Result<()> {
        warn!("Error: {} {} - {}", context.method, context.path, error);
        Ok(())
    }
}
