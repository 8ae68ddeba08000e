//! Inventory items.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{non_negative_quantity, require_product_code, ValidationError};

/// A stocked product, keyed by its externally visible product code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryItem {
    pub product_code: String,
    pub name: String,
    pub description: String,
    pub quantity: u32,
    pub price: Decimal,
}

/// Caller input for creating an item.
///
/// `product_code` is optional; when absent the service generates one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewInventoryItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_code: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub quantity: i64,
    pub price: Decimal,
}

impl NewInventoryItem {
    pub fn new(name: impl Into<String>, quantity: i64, price: Decimal) -> Self {
        Self {
            product_code: None,
            name: name.into(),
            description: String::new(),
            quantity,
            price,
        }
    }

    pub fn with_product_code(mut self, product_code: impl Into<String>) -> Self {
        self.product_code = Some(product_code.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Check the input and build the item under `product_code`.
    pub fn into_item(self, product_code: String) -> Result<InventoryItem, ValidationError> {
        require_product_code(&product_code)?;
        let quantity = non_negative_quantity(self.quantity)?;
        if self.price < Decimal::ZERO {
            return Err(ValidationError(format!(
                "Price must not be negative, got {}",
                self.price
            )));
        }
        if self.name.trim().is_empty() {
            return Err(ValidationError("Name must not be empty".to_string()));
        }
        Ok(InventoryItem {
            product_code,
            name: self.name,
            description: self.description,
            quantity,
            price: self.price,
        })
    }
}
