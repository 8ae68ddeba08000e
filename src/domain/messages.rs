//! Request and reply bodies for the stock commands.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::InventoryItem;

/// Body of `inventory.stock.check`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockCheckRequest {
    pub product_code: String,
    pub quantity: u32,
}

/// Reply to `inventory.stock.check`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockCheckResponse {
    pub available: bool,
    pub message: String,
    #[serde(default)]
    pub current_stock: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_price: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_name: Option<String>,
}

impl StockCheckResponse {
    pub const NOT_FOUND_MESSAGE: &'static str = "Item not found in inventory";

    pub fn not_found() -> Self {
        Self::unavailable(Self::NOT_FOUND_MESSAGE)
    }

    /// Negative answer without stock details.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            available: false,
            message: message.into(),
            current_stock: 0,
            unit_price: None,
            product_name: None,
        }
    }

    /// Answer for an existing item.
    pub fn for_item(item: &InventoryItem, requested: u32) -> Self {
        let available = requested <= item.quantity;
        let message = if available {
            "Stock available".to_string()
        } else {
            format!(
                "Insufficient stock. Available: {}, requested: {}",
                item.quantity, requested
            )
        };
        Self {
            available,
            message,
            current_stock: item.quantity,
            unit_price: Some(item.price),
            product_name: Some(item.name.clone()),
        }
    }
}

/// Body of `inventory.stock.deduct`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockDeductRequest {
    pub product_code: String,
    pub quantity: u32,
}

/// Body of `inventory.stock.release`, the compensation for a deduction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockReleaseRequest {
    pub product_code: String,
    pub quantity: u32,
}

/// Why a stock command was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StockFailure {
    NotFound,
    InsufficientStock,
    InvalidRequest,
    Internal,
}

/// Reply to `inventory.stock.deduct` and `inventory.stock.release`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockCommandResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<StockFailure>,
}

impl StockCommandResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            code: None,
        }
    }

    pub fn failed(code: StockFailure, message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            code: Some(code),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn item(quantity: u32) -> InventoryItem {
        InventoryItem {
            product_code: "PROD-1".to_string(),
            name: "Widget".to_string(),
            description: String::new(),
            quantity,
            price: dec!(100),
        }
    }

    #[test]
    fn test_check_response_available() {
        let response = StockCheckResponse::for_item(&item(10), 10);
        assert!(response.available);
        assert_eq!(response.current_stock, 10);
        assert_eq!(response.unit_price, Some(dec!(100)));
    }

    #[test]
    fn test_check_response_insufficient() {
        let response = StockCheckResponse::for_item(&item(1), 2);
        assert!(!response.available);
        assert_eq!(response.current_stock, 1);
        assert!(response.message.contains("Available: 1"));
    }

    #[test]
    fn test_check_response_not_found_wire_format() {
        let value = serde_json::to_value(StockCheckResponse::not_found()).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "available": false,
                "message": "Item not found in inventory",
                "currentStock": 0
            })
        );
    }

    #[test]
    fn test_command_response_wire_format() {
        let value = serde_json::to_value(StockCommandResponse::failed(
            StockFailure::InsufficientStock,
            "Not enough",
        ))
        .unwrap();
        assert_eq!(value["success"], false);
        assert_eq!(value["code"], "INSUFFICIENT_STOCK");

        let parsed: StockCommandResponse =
            serde_json::from_value(serde_json::json!({"success": true})).unwrap();
        assert!(parsed.success);
        assert!(parsed.message.is_none());
    }
}
