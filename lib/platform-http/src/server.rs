//! hyper accept loop and request dispatch

use crate::metrics::{MetricsCollector, MetricsMiddleware};
use crate::middleware::{
    LoggingMiddleware, Middleware, MiddlewareChain, MiddlewareContext, RequestIdMiddleware,
};
use crate::response::{
    bad_request_response, body_response, error_response, method_not_allowed_response,
    not_found_response, ApiResponse,
};
use crate::routes::{ApiRequest, RouteMatch, RouteTable};
use anyhow::Result;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::{
    body::{Body, Bytes},
    server::conn::http1,
    service::service_fn,
    HeaderMap, Method, Request, StatusCode,
};
use hyper_util::rt::tokio::TokioIo;
use std::convert::Infallible;
use std::error::Error as StdError;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

const METRICS_PATH: &str = "/metrics";
const UNMATCHED_ROUTE: &str = "unmatched";

/// A routed HTTP/1 server over shared state `S`
pub struct HttpServer<S> {
    name: String,
    state: Arc<S>,
    routes: RouteTable<S>,
    middleware: MiddlewareChain,
    metrics: MetricsCollector,
    max_body_bytes: usize,
}

impl<S: Send + Sync + 'static> HttpServer<S> {
    /// Build a server with request-id, logging and metrics middleware installed
    pub fn new(name: impl Into<String>, state: Arc<S>, routes: RouteTable<S>, metrics: MetricsCollector) -> Self {
        let middleware = MiddlewareChain::new()
            .add(RequestIdMiddleware)
            .add(LoggingMiddleware)
            .add(MetricsMiddleware::new(metrics.clone()));

        Self {
            name: name.into(),
            state,
            routes,
            middleware,
            metrics,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    pub fn with_middleware<M: Middleware + 'static>(mut self, middleware: M) -> Self {
        self.middleware = self.middleware.add(middleware);
        self
    }

    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> &Arc<S> {
        &self.state
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    /// Route an already-read request through the middleware chain and its handler
    pub async fn dispatch(
        &self,
        method: Method,
        path: &str,
        headers: &HeaderMap,
        body: Bytes,
    ) -> ApiResponse {
        let is_metrics = method == Method::GET && path == METRICS_PATH;
        let resolved = self.routes.resolve(&method, path);
        let route = match &resolved {
            _ if is_metrics => METRICS_PATH,
            RouteMatch::Found { pattern, .. } => *pattern,
            _ => UNMATCHED_ROUTE,
        };

        let context = MiddlewareContext::new(&method, path, route, headers);
        if let Err(e) = self.middleware.on_request(&context).await {
            warn!("Middleware on_request failed: {}", e);
        }

        let response = if is_metrics {
            self.metrics_response()
        } else {
            match resolved {
                RouteMatch::Found { handler, params, .. } => {
                    let mut request = ApiRequest::new(method.clone(), path, body);
                    request.params = params;
                    handler(self.state.clone(), request).await
                }
                RouteMatch::MethodNotAllowed(allowed) => method_not_allowed_response(&allowed),
                RouteMatch::NotFound => {
                    not_found_response(&format!("no route for {} {}", method, path))
                }
            }
        };

        let status = response.status();
        if status.is_server_error() {
            let reason = status.canonical_reason().unwrap_or("server error");
            if let Err(e) = self.middleware.on_error(&context, reason).await {
                warn!("Middleware on_error failed: {}", e);
            }
        }
        if let Err(e) = self.middleware.on_response(&context, status.as_u16()).await {
            warn!("Middleware on_response failed: {}", e);
        }

        response
    }

    /// Read the body (bounded by `max_body_bytes`) and dispatch
    pub async fn handle<B>(&self, req: Request<B>) -> Result<ApiResponse, Infallible>
    where
        B: Body,
        B::Error: Into<Box<dyn StdError + Send + Sync>>,
    {
        let (parts, body) = req.into_parts();
        let body = match Limited::new(body, self.max_body_bytes).collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
                debug!("Rejecting {} {}: body over {} bytes", parts.method, parts.uri.path(), self.max_body_bytes);
                return Ok(error_response(
                    StatusCode::PAYLOAD_TOO_LARGE,
                    &format!("request body exceeds {} bytes", self.max_body_bytes),
                ));
            }
            Err(e) => {
                debug!("Failed to read request body: {}", e);
                return Ok(bad_request_response("failed to read request body"));
            }
        };

        Ok(self
            .dispatch(parts.method, parts.uri.path(), &parts.headers, body)
            .await)
    }

    /// Accept connections until `shutdown` resolves.
    ///
    /// Connections already being served are left to finish on their own tasks.
    pub async fn serve<F>(self: Arc<Self>, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        info!("{} listening on {}", self.name, listener.local_addr()?);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("{} shutting down", self.name);
                    return Ok(());
                }
                accepted = listener.accept() => {
                    let (stream, peer_addr) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            warn!("Error accepting connection: {}", e);
                            continue;
                        }
                    };
                    let io = TokioIo::new(stream);
                    let server = self.clone();

                    tokio::task::spawn(async move {
                        let service = service_fn(move |req| {
                            let server = server.clone();
                            async move { server.handle(req).await }
                        });

                        if let Err(e) = http1::Builder::new()
                            .serve_connection(io, service)
                            .await
                        {
                            debug!("Error serving HTTP connection from {}: {}", peer_addr, e);
                        }
                    });
                }
            }
        }
    }

    fn metrics_response(&self) -> ApiResponse {
        match self.metrics.gather() {
            Ok(text) => body_response(StatusCode::OK, "text/plain; version=0.0.4", text),
            Err(e) => {
                warn!("Failed to gather metrics: {}", e);
                error_response(StatusCode::INTERNAL_SERVER_ERROR, "failed to gather metrics")
            }
        }
    }
}

/// Resolves on ctrl-c
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::{empty_response, json_response};
    use http_body_util::Full;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    #[derive(Default)]
    struct Counter {
        hits: AtomicUsize,
    }

    async fn hit(state: Arc<Counter>, req: ApiRequest) -> ApiResponse {
        let n = state.hits.fetch_add(1, Ordering::SeqCst) + 1;
        json_response(StatusCode::OK, &serde_json::json!({ "hits": n, "name": req.param("name") }))
    }

    async fn echo_len(_: Arc<Counter>, req: ApiRequest) -> ApiResponse {
        json_response(StatusCode::OK, &serde_json::json!({ "len": req.body.len() }))
    }

    async fn fail(_: Arc<Counter>, _: ApiRequest) -> ApiResponse {
        empty_response(StatusCode::SERVICE_UNAVAILABLE)
    }

    fn server() -> HttpServer<Counter> {
        let routes = RouteTable::new()
            .route(Method::GET, "/hit/{name}", hit)
            .route(Method::POST, "/echo", echo_len)
            .route(Method::GET, "/fail", fail);
        HttpServer::new("test", Arc::new(Counter::default()), routes, MetricsCollector::new().unwrap())
    }

    async fn body_json(response: ApiResponse) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_dispatch_to_handler() {
        let server = server();
        let response = server
            .dispatch(Method::GET, "/hit/alpha", &HeaderMap::new(), Bytes::new())
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["hits"], 1);
        assert_eq!(body["name"], "alpha");
        assert_eq!(server.state().hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dispatch_not_found_and_method_not_allowed() {
        let server = server();
        let missing = server
            .dispatch(Method::GET, "/nope", &HeaderMap::new(), Bytes::new())
            .await;
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        let wrong = server
            .dispatch(Method::DELETE, "/echo", &HeaderMap::new(), Bytes::new())
            .await;
        assert_eq!(wrong.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_metrics_endpoint_counts_routes() {
        let server = server();
        server
            .dispatch(Method::GET, "/hit/a", &HeaderMap::new(), Bytes::new())
            .await;
        server
            .dispatch(Method::GET, "/fail", &HeaderMap::new(), Bytes::new())
            .await;

        let response = server
            .dispatch(Method::GET, "/metrics", &HeaderMap::new(), Bytes::new())
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("route=\"/hit/{name}\""));
        assert!(text.contains("http_errors_total 1"));
    }

    #[tokio::test]
    async fn test_handle_enforces_body_limit() {
        let server = server().with_max_body_bytes(8);

        let small = Request::post("/echo").body(Full::new(Bytes::from_static(b"1234"))).unwrap();
        let response = server.handle(small).await.unwrap();
        assert_eq!(body_json(response).await["len"], 4);

        let big = Request::post("/echo")
            .body(Full::new(Bytes::from_static(b"0123456789")))
            .unwrap();
        let response = server.handle(big).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_handle_strips_query() {
        let server = server();
        let req = Request::get("/hit/q?verbose=1").body(Full::new(Bytes::new())).unwrap();
        let response = server.handle(req).await.unwrap();
        assert_eq!(body_json(response).await["name"], "q");
    }

    #[tokio::test]
    async fn test_serve_over_tcp_and_shutdown() {
        let server = Arc::new(server());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        let handle = tokio::spawn(server.clone().serve(listener, async {
            let _ = rx.await;
        }));

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /hit/tcp HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut raw = String::new();
        stream.read_to_string(&mut raw).await.unwrap();
        assert!(raw.starts_with("HTTP/1.1 200 OK"));
        assert!(raw.contains("\"name\":\"tcp\""));

        tx.send(()).unwrap();
        handle.await.unwrap().unwrap();
    }
}
