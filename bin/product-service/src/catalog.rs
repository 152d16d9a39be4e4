//! In-memory product catalog

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductDto {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: f64,
    #[serde(default)]
    pub stock_quantity: i64,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("Product not found: {0}")]
    ProductNotFound(u64),

    #[error("Quantity is required")]
    MissingQuantity,

    #[error("Quantity must not be negative: {0}")]
    NegativeQuantity(i64),

    #[error("Quantity {quantity} exceeds the maximum stock of {max}")]
    ExceedsMaxStock { quantity: i64, max: i64 },
}

pub struct Catalog {
    products: RwLock<BTreeMap<u64, ProductDto>>,
}

impl Catalog {
    /// Later entries with a duplicate id replace earlier ones
    pub fn new(products: impl IntoIterator<Item = ProductDto>) -> Self {
        let products = products.into_iter().map(|p| (p.id, p)).collect();
        Self {
            products: RwLock::new(products),
        }
    }

    /// All products, ordered by id
    pub async fn list(&self) -> Vec<ProductDto> {
        self.products.read().await.values().cloned().collect()
    }

    pub async fn get(&self, id: u64) -> Option<ProductDto> {
        self.products.read().await.get(&id).cloned()
    }

    /// Set the stock level of a product
    pub async fn update_stock(
        &self,
        id: u64,
        quantity: Option<i64>,
        max_stock: Option<i64>,
    ) -> Result<ProductDto, CatalogError> {
        let quantity = quantity.ok_or(CatalogError::MissingQuantity)?;
        if quantity < 0 {
            return Err(CatalogError::NegativeQuantity(quantity));
        }
        if let Some(max) = max_stock {
            if quantity > max {
                return Err(CatalogError::ExceedsMaxStock { quantity, max });
            }
        }

        let mut products = self.products.write().await;
        let product = products
            .get_mut(&id)
            .ok_or(CatalogError::ProductNotFound(id))?;
        debug!("Stock of product {} {} -> {}", id, product.stock_quantity, quantity);
        product.stock_quantity = quantity;
        Ok(product.clone())
    }

    pub async fn count(&self) -> usize {
        self.products.read().await.len()
    }
}

/// Products served when the settings file lists none
pub fn sample_products() -> Vec<ProductDto> {
    vec![
        ProductDto {
            id: 1,
            name: "Laptop".to_string(),
            description: "14-inch ultrabook".to_string(),
            price: 1299.99,
            stock_quantity: 25,
        },
        ProductDto {
            id: 2,
            name: "Headphones".to_string(),
            description: "Noise-cancelling over-ear headphones".to_string(),
            price: 199.5,
            stock_quantity: 120,
        },
        ProductDto {
            id: 3,
            name: "Keyboard".to_string(),
            description: "Mechanical keyboard".to_string(),
            price: 89.0,
            stock_quantity: 60,
        },
    ]
}
