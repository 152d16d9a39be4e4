//! Config server HTTP routes

use config_core::{ConfigDistributor, ConfigError, ConfigSnapshot, HealthStatus, Properties};
use hyper::{Method, StatusCode};
use platform_http::response::{
    bad_request_response, error_response as status_error_response, health_response, json_response,
    not_found_response, service_unavailable_response,
};
use platform_http::{ApiRequest, ApiResponse, RouteTable};
use serde_json::json;
use std::sync::Arc;
use tracing::warn;

pub fn routes() -> RouteTable<ConfigDistributor> {
    RouteTable::new()
        .route(Method::GET, "/health", health)
        .route(Method::GET, "/config", list_keys)
        .route(Method::POST, "/config/{application}/{profile}", publish)
        .route(Method::GET, "/config/{application}/{profile}", get_latest)
        .route(Method::GET, "/config/{application}/{profile}/versions", list_versions)
        .route(Method::GET, "/config/{application}/{profile}/{version}", get_version)
        // Spring Cloud Config clients fetch `/{application}/{profile}`
        .route(Method::GET, "/{application}/{profile}", get_latest)
}

fn error_response(err: ConfigError) -> ApiResponse {
    match &err {
        ConfigError::NotFound(_) | ConfigError::VersionNotFound { .. } => {
            not_found_response(&err.to_string())
        }
        ConfigError::Conflict(_) => status_error_response(StatusCode::CONFLICT, &err.to_string()),
        ConfigError::StoreUnavailable(_) => {
            warn!("{}", err);
            service_unavailable_response(&err.to_string())
        }
        ConfigError::InvalidRequest(_) | ConfigError::InvalidRepository(_) => {
            bad_request_response(&err.to_string())
        }
    }
}

fn respond_snapshot(result: config_core::Result<Arc<ConfigSnapshot>>) -> ApiResponse {
    match result {
        Ok(snapshot) => json_response(StatusCode::OK, snapshot.as_ref()),
        Err(e) => error_response(e),
    }
}

async fn publish(distributor: Arc<ConfigDistributor>, req: ApiRequest) -> ApiResponse {
    let properties: Properties = match req.json() {
        Ok(properties) => properties,
        Err(response) => return response,
    };
    match distributor
        .publish(req.param("application"), req.param("profile"), properties)
        .await
    {
        Ok(snapshot) => json_response(
            StatusCode::OK,
            &json!({
                "application": snapshot.application,
                "profile": snapshot.profile,
                "version": snapshot.version,
                "digest": snapshot.digest,
            }),
        ),
        Err(e) => error_response(e),
    }
}

async fn get_latest(distributor: Arc<ConfigDistributor>, req: ApiRequest) -> ApiResponse {
    respond_snapshot(distributor.get_latest(req.param("application"), req.param("profile")))
}

async fn get_version(distributor: Arc<ConfigDistributor>, req: ApiRequest) -> ApiResponse {
    let version: u64 = match req.parse_param("version") {
        Ok(version) => version,
        Err(response) => return response,
    };
    respond_snapshot(distributor.get_version(
        req.param("application"),
        req.param("profile"),
        version,
    ))
}

async fn list_versions(distributor: Arc<ConfigDistributor>, req: ApiRequest) -> ApiResponse {
    match distributor.versions(req.param("application"), req.param("profile")) {
        Ok(versions) => json_response(StatusCode::OK, &json!({ "versions": versions })),
        Err(e) => error_response(e),
    }
}

async fn list_keys(distributor: Arc<ConfigDistributor>, _req: ApiRequest) -> ApiResponse {
    match distributor.keys() {
        Ok(keys) => json_response(StatusCode::OK, &keys),
        Err(e) => error_response(e),
    }
}

async fn health(distributor: Arc<ConfigDistributor>, _req: ApiRequest) -> ApiResponse {
    health_response(distributor.health_check() == HealthStatus::Up)
}
