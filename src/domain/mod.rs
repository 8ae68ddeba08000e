//! Domain types shared by the inventory and order services.
//!
//! Everything here is plain data plus the invariants checked at construction.
//! Wire formats are camelCase JSON.

mod events;
mod inventory;
mod messages;
mod order;

pub use events::{StockEventType, StockUpdateEvent};
pub use inventory::{InventoryItem, NewInventoryItem};
pub use messages::{
    StockCheckRequest, StockCheckResponse, StockCommandResponse, StockDeductRequest,
    StockFailure, StockReleaseRequest,
};
pub use order::{NewOrder, Order, OrderDraft, OrderStatus};

/// Invalid caller input, rejected before any store or broker call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ValidationError(pub String);

/// Validate a strictly positive quantity and narrow it to the stored width.
pub fn positive_quantity(quantity: i64) -> Result<u32, ValidationError> {
    if quantity <= 0 {
        return Err(ValidationError(format!(
            "Quantity must be a positive integer, got {}",
            quantity
        )));
    }
    u32::try_from(quantity)
        .map_err(|_| ValidationError(format!("Quantity {} is too large", quantity)))
}

/// Validate a non-negative quantity and narrow it to the stored width.
pub fn non_negative_quantity(quantity: i64) -> Result<u32, ValidationError> {
    if quantity < 0 {
        return Err(ValidationError(format!(
            "Quantity must not be negative, got {}",
            quantity
        )));
    }
    u32::try_from(quantity)
        .map_err(|_| ValidationError(format!("Quantity {} is too large", quantity)))
}

/// Validate that a product code is present.
pub fn require_product_code(product_code: &str) -> Result<(), ValidationError> {
    if product_code.trim().is_empty() {
        return Err(ValidationError("Product code must not be empty".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positive_quantity() {
        assert_eq!(positive_quantity(3), Ok(3));
        assert!(positive_quantity(0).is_err());
        assert!(positive_quantity(-1).is_err());
        assert!(positive_quantity(i64::from(u32::MAX) + 1).is_err());
    }

    #[test]
    fn test_non_negative_quantity() {
        assert_eq!(non_negative_quantity(0), Ok(0));
        assert!(non_negative_quantity(-5).is_err());
    }

    #[test]
    fn test_require_product_code() {
        assert!(require_product_code("PROD-1").is_ok());
        assert!(require_product_code("").is_err());
        assert!(require_product_code("   ").is_err());
    }
}
