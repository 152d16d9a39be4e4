//! Routing table mapping method + path patterns to handlers

use crate::response::{bad_request_response, ApiResponse};
use futures::future::BoxFuture;
use hyper::{body::Bytes, Method};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;

/// A decoded request as seen by handlers
#[derive(Clone, Debug)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub params: HashMap<String, String>,
    pub body: Bytes,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>, body: Bytes) -> Self {
        Self {
            method,
            path: path.into(),
            params: HashMap::new(),
            body,
        }
    }

    /// A path parameter; empty when the pattern has no such parameter
    pub fn param(&self, name: &str) -> &str {
        self.params.get(name).map(String::as_str).unwrap_or("")
    }

    /// Parse a path parameter, answering 400 on failure
    pub fn parse_param<T: FromStr>(&self, name: &str) -> Result<T, ApiResponse> {
        self.param(name)
            .parse()
            .map_err(|_| bad_request_response(&format!("invalid {}: '{}'", name, self.param(name))))
    }

    /// Decode the body as JSON, answering 400 on failure
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiResponse> {
        serde_json::from_slice(&self.body)
            .map_err(|e| bad_request_response(&format!("invalid request body: {}", e)))
    }
}

pub type Handler<S> = Arc<dyn Fn(Arc<S>, ApiRequest) -> BoxFuture<'static, ApiResponse> + Send + Sync>;

#[derive(Clone, Debug, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

struct Route<S> {
    method: Method,
    pattern: String,
    segments: Vec<Segment>,
    handler: Handler<S>,
}

/// Result of resolving a request against the table
pub enum RouteMatch<'a, S> {
    Found {
        handler: &'a Handler<S>,
        pattern: &'a str,
        params: HashMap<String, String>,
    },
    /// The path exists but not for this method
    MethodNotAllowed(Vec<Method>),
    NotFound,
}

/// Routes are tried in registration order; the first match wins
pub struct RouteTable<S> {
    routes: Vec<Route<S>>,
}

impl<S: Send + Sync + 'static> RouteTable<S> {
    pub fn new() -> Self {
        Self { routes: Vec::new() }
    }

    /// Add a route. `pattern` segments written `{name}` capture that segment.
    pub fn route<F, Fut>(mut self, method: Method, pattern: &str, handler: F) -> Self
    where
        F: Fn(Arc<S>, ApiRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ApiResponse> + Send + 'static,
    {
        let handler: Handler<S> = Arc::new(
            move |state: Arc<S>, req: ApiRequest| -> BoxFuture<'static, ApiResponse> {
                Box::pin(handler(state, req))
            },
        );
        self.routes.push(Route {
            method,
            pattern: pattern.to_string(),
            segments: parse_pattern(pattern),
            handler,
        });
        self
    }

    pub fn resolve(&self, method: &Method, path: &str) -> RouteMatch<'_, S> {
        let path_segments = split_path(path);
        let mut allowed = Vec::new();

        for route in &self.routes {
            let Some(params) = match_segments(&route.segments, &path_segments) else {
                continue;
            };
            if route.method == *method {
                return RouteMatch::Found {
                    handler: &route.handler,
                    pattern: &route.pattern,
                    params,
                };
            }
            if !allowed.contains(&route.method) {
                allowed.push(route.method.clone());
            }
        }

        if allowed.is_empty() {
            RouteMatch::NotFound
        } else {
            RouteMatch::MethodNotAllowed(allowed)
        }
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl<S: Send + Sync + 'static> Default for RouteTable<S> {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_pattern(pattern: &str) -> Vec<Segment> {
    split_path(pattern)
        .into_iter()
        .map(|segment| {
            match segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                Some(name) => Segment::Param(name.to_string()),
                None => Segment::Literal(segment.to_string()),
            }
        })
        .collect()
}

/// Empty segments are dropped, so "/a//b/" matches "/a/b"
fn split_path(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn match_segments(pattern: &[Segment], path: &[&str]) -> Option<HashMap<String, String>> {
    if pattern.len() != path.len() {
        return None;
    }
    let mut params = HashMap::new();
    for (segment, value) in pattern.iter().zip(path) {
        match segment {
            Segment::Literal(literal) if literal == value => {}
            Segment::Literal(_) => return None,
            Segment::Param(name) => {
                params.insert(name.clone(), value.to_string());
            }
        }
    }
    Some(params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::{empty_response, json_response};
    use hyper::StatusCode;

    struct State;

    async fn ok(_: Arc<State>, _: ApiRequest) -> ApiResponse {
        empty_response(StatusCode::OK)
    }

    async fn echo(_: Arc<State>, req: ApiRequest) -> ApiResponse {
        json_response(StatusCode::OK, &req.params)
    }

    fn table() -> RouteTable<State> {
        RouteTable::new()
            .route(Method::GET, "/", ok)
            .route(Method::GET, "/registry/{service}", echo)
            .route(Method::POST, "/registry/{service}/{instance}", echo)
            .route(Method::DELETE, "/registry/{service}/{instance}", echo)
            .route(Method::PUT, "/registry/{service}/{instance}/heartbeat", ok)
    }

    fn params_of(m: RouteMatch<'_, State>) -> HashMap<String, String> {
        match m {
            RouteMatch::Found { params, .. } => params,
            _ => panic!("expected a match"),
        }
    }

    #[test]
    fn test_root_route() {
        let table = table();
        assert!(matches!(table.resolve(&Method::GET, "/"), RouteMatch::Found { pattern: "/", .. }));
        assert!(matches!(table.resolve(&Method::GET, ""), RouteMatch::Found { .. }));
    }

    #[test]
    fn test_param_capture() {
        let table = table();
        let params = params_of(table.resolve(&Method::POST, "/registry/product-service/i1"));
        assert_eq!(params["service"], "product-service");
        assert_eq!(params["instance"], "i1");
    }

    #[test]
    fn test_literal_segments_must_match() {
        let table = table();
        assert!(matches!(
            table.resolve(&Method::PUT, "/registry/svc/i1/heartbeat"),
            RouteMatch::Found { .. }
        ));
        assert!(matches!(
            table.resolve(&Method::PUT, "/registry/svc/i1/heartbeats"),
            RouteMatch::NotFound
        ));
        assert!(matches!(table.resolve(&Method::GET, "/config/a"), RouteMatch::NotFound));
    }

    #[test]
    fn test_method_not_allowed_lists_methods() {
        let table = table();
        match table.resolve(&Method::GET, "/registry/svc/i1") {
            RouteMatch::MethodNotAllowed(methods) => {
                assert_eq!(methods, vec![Method::POST, Method::DELETE]);
            }
            _ => panic!("expected method not allowed"),
        }
    }

    #[test]
    fn test_trailing_and_double_slashes() {
        let table = table();
        let params = params_of(table.resolve(&Method::GET, "/registry//svc/"));
        assert_eq!(params["service"], "svc");
    }

    #[test]
    fn test_parse_pattern() {
        assert_eq!(
            parse_pattern("/config/{application}/{profile}"),
            vec![
                Segment::Literal("config".into()),
                Segment::Param("application".into()),
                Segment::Param("profile".into()),
            ]
        );
        assert_eq!(table().len(), 5);
    }

    #[test]
    fn test_request_helpers() {
        let mut req = ApiRequest::new(Method::GET, "/x/7", Bytes::from_static(b"{\"a\": 1}"));
        req.params.insert("id".into(), "7".into());
        req.params.insert("bad".into(), "seven".into());

        assert_eq!(req.parse_param::<u64>("id").unwrap(), 7);
        assert_eq!(req.parse_param::<u64>("bad").unwrap_err().status(), StatusCode::BAD_REQUEST);
        assert_eq!(req.param("missing"), "");

        let body: serde_json::Value = req.json().unwrap();
        assert_eq!(body["a"], 1);

        let bad = ApiRequest::new(Method::POST, "/", Bytes::from_static(b"not json"));
        assert_eq!(
            bad.json::<serde_json::Value>().unwrap_err().status(),
            StatusCode::BAD_REQUEST
        );
    }
}
