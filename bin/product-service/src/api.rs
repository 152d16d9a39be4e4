//! Product HTTP routes

use crate::state::AppState;
use hyper::{Method, StatusCode};
use platform_http::response::{
    body_response, empty_response, health_response, json_response, not_found_response,
    service_unavailable_response,
};
use platform_http::{ApiRequest, ApiResponse, RouteTable};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

const UPDATE_STOCK_FAILED: &str = "Failed to update stock";

pub fn routes() -> RouteTable<AppState> {
    RouteTable::new()
        .route(Method::GET, "/health", health)
        .route(Method::POST, "/refresh", refresh)
        .route(Method::GET, "/api/v1/products", list_products)
        .route(Method::GET, "/api/v1/products/{id}", get_product)
        .route(Method::PUT, "/api/v1/products/{id}/stock", update_stock)
}

#[derive(Deserialize)]
struct StockUpdate {
    quantity: Option<i64>,
}

async fn list_products(state: Arc<AppState>, _req: ApiRequest) -> ApiResponse {
    json_response(StatusCode::OK, &state.catalog.list().await)
}

async fn get_product(state: Arc<AppState>, req: ApiRequest) -> ApiResponse {
    let id: u64 = match req.parse_param("id") {
        Ok(id) => id,
        Err(response) => return response,
    };
    match state.catalog.get(id).await {
        Some(product) => json_response(StatusCode::OK, &product),
        None => not_found_response(&format!("product {} not found", id)),
    }
}

async fn update_stock(state: Arc<AppState>, req: ApiRequest) -> ApiResponse {
    let id: u64 = match req.parse_param("id") {
        Ok(id) => id,
        Err(response) => return response,
    };
    let update: StockUpdate = match req.json() {
        Ok(update) => update,
        Err(response) => return response,
    };

    let max_stock = state.max_stock().await;
    match state.catalog.update_stock(id, update.quantity, max_stock).await {
        Ok(_) => empty_response(StatusCode::OK),
        Err(e) => {
            debug!("Stock update for product {} rejected: {}", id, e);
            body_response(
                StatusCode::BAD_REQUEST,
                "text/plain; charset=utf-8",
                UPDATE_STOCK_FAILED,
            )
        }
    }
}

async fn refresh(state: Arc<AppState>, _req: ApiRequest) -> ApiResponse {
    match state.refresh().await {
        Ok(changed) => json_response(StatusCode::OK, &changed),
        Err(e) => {
            warn!("Config refresh failed: {}", e);
            service_unavailable_response(&format!("config refresh failed: {}", e))
        }
    }
}

async fn health(_state: Arc<AppState>, _req: ApiRequest) -> ApiResponse {
    health_response(true)
}
