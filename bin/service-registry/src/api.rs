//! Registry HTTP routes

use crate::dashboard;
use hyper::{Method, StatusCode};
use platform_http::response::{
    bad_request_response, body_response, health_response, json_response, not_found_response,
};
use platform_http::{ApiRequest, ApiResponse, RouteTable};
use registry_core::{InstanceAddress, InstanceRecord, InstanceStatus, RegistryError, ServiceRegistry};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

pub fn routes() -> RouteTable<ServiceRegistry> {
    RouteTable::new()
        .route(Method::GET, "/", dashboard_page)
        .route(Method::GET, "/health", health)
        .route(Method::GET, "/registry", applications)
        .route(Method::GET, "/registry/{service}", list_instances)
        .route(Method::POST, "/registry/{service}/{instanceId}", register)
        .route(Method::DELETE, "/registry/{service}/{instanceId}", deregister)
        .route(Method::PUT, "/registry/{service}/{instanceId}/heartbeat", heartbeat)
        .route(Method::PUT, "/registry/{service}/{instanceId}/status", set_status)
}

#[derive(Deserialize)]
struct RegisterBody {
    host: String,
    port: u16,
}

#[derive(Deserialize)]
struct StatusBody {
    status: InstanceStatus,
}

#[derive(Serialize)]
struct Application {
    name: String,
    instances: Vec<InstanceRecord>,
}

#[derive(Serialize)]
struct Applications {
    applications: Vec<Application>,
}

fn error_response(err: RegistryError) -> ApiResponse {
    match err {
        RegistryError::InstanceNotFound { .. } => not_found_response(&err.to_string()),
        RegistryError::InvalidRequest(_) | RegistryError::InvalidAddress(_) => {
            bad_request_response(&err.to_string())
        }
    }
}

fn respond<T: Serialize>(result: registry_core::Result<T>) -> ApiResponse {
    match result {
        Ok(body) => json_response(StatusCode::OK, &body),
        Err(e) => error_response(e),
    }
}

async fn register(registry: Arc<ServiceRegistry>, req: ApiRequest) -> ApiResponse {
    let body: RegisterBody = match req.json() {
        Ok(body) => body,
        Err(response) => return response,
    };
    let result = InstanceAddress::new(body.host, body.port).and_then(|address| {
        registry.register(req.param("service"), req.param("instanceId"), address)
    });
    respond(result)
}

async fn heartbeat(registry: Arc<ServiceRegistry>, req: ApiRequest) -> ApiResponse {
    respond(registry.heartbeat(req.param("service"), req.param("instanceId")))
}

async fn set_status(registry: Arc<ServiceRegistry>, req: ApiRequest) -> ApiResponse {
    let body: StatusBody = match req.json() {
        Ok(body) => body,
        Err(response) => return response,
    };
    respond(registry.set_status(req.param("service"), req.param("instanceId"), body.status))
}

async fn deregister(registry: Arc<ServiceRegistry>, req: ApiRequest) -> ApiResponse {
    respond(registry.deregister(req.param("service"), req.param("instanceId")))
}

async fn list_instances(registry: Arc<ServiceRegistry>, req: ApiRequest) -> ApiResponse {
    respond(registry.list_instances(req.param("service")))
}

/// Every record grouped by service, stale leases reported as DOWN
async fn applications(registry: Arc<ServiceRegistry>, _req: ApiRequest) -> ApiResponse {
    let mut grouped: BTreeMap<String, Vec<InstanceRecord>> = BTreeMap::new();
    for record in registry.snapshot() {
        grouped.entry(record.service_name.clone()).or_default().push(record);
    }
    let applications = grouped
        .into_iter()
        .map(|(name, instances)| Application { name, instances })
        .collect();
    json_response(StatusCode::OK, &Applications { applications })
}

async fn dashboard_page(registry: Arc<ServiceRegistry>, _req: ApiRequest) -> ApiResponse {
    body_response(
        StatusCode::OK,
        "text/html; charset=utf-8",
        dashboard::render(&registry),
    )
}

async fn health(_registry: Arc<ServiceRegistry>, _req: ApiRequest) -> ApiResponse {
    health_response(true)
}
