//! Orders and their lifecycle.
//!
//! An order starts as an in-memory `OrderDraft` (PENDING) while stock is
//! checked and deducted. Only a confirmed order is ever persisted; a failed
//! attempt leaves no record.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Failed,
}

/// A persisted order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: Uuid,
    pub product_code: String,
    pub quantity: u32,
    pub total_price: Decimal,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

/// An order ready to be written. The store assigns `id` and `created_at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub product_code: String,
    pub quantity: u32,
    pub total_price: Decimal,
    pub status: OrderStatus,
}

/// An order being placed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderDraft {
    product_code: String,
    quantity: u32,
    total_price: Decimal,
}

impl OrderDraft {
    /// Price the order. Fails when the total does not fit a `Decimal`.
    pub fn new(
        product_code: impl Into<String>,
        quantity: u32,
        unit_price: Decimal,
    ) -> Result<Self, ValidationError> {
        let total_price = unit_price
            .checked_mul(Decimal::from(quantity))
            .ok_or_else(|| {
                ValidationError(format!(
                    "Total price of {} units at {} is out of range",
                    quantity, unit_price
                ))
            })?;
        Ok(Self {
            product_code: product_code.into(),
            quantity,
            total_price,
        })
    }

    pub fn status(&self) -> OrderStatus {
        OrderStatus::Pending
    }

    pub fn product_code(&self) -> &str {
        &self.product_code
    }

    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    pub fn total_price(&self) -> Decimal {
        self.total_price
    }

    /// Stock has been deducted: the order can be persisted as CONFIRMED.
    pub fn confirm(&self) -> NewOrder {
        NewOrder {
            product_code: self.product_code.clone(),
            quantity: self.quantity,
            total_price: self.total_price,
            status: OrderStatus::Confirmed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_draft_total_price() {
        let draft = OrderDraft::new("PROD-1", 3, dec!(19.99)).unwrap();
        assert_eq!(draft.status(), OrderStatus::Pending);
        assert_eq!(draft.total_price(), dec!(59.97));
    }

    #[test]
    fn test_confirm() {
        let order = OrderDraft::new("PROD-1", 2, dec!(100)).unwrap().confirm();
        assert_eq!(order.status, OrderStatus::Confirmed);
        assert_eq!(order.total_price, dec!(200));
        assert_eq!(order.product_code, "PROD-1");
    }

    #[test]
    fn test_draft_total_out_of_range() {
        assert!(OrderDraft::new("PROD-1", 2, Decimal::MAX).is_err());
        assert!(OrderDraft::new("PROD-1", 1, Decimal::MAX).is_ok());
    }

    #[test]
    fn test_status_wire_format() {
        assert_eq!(
            serde_json::to_value(OrderStatus::Confirmed).unwrap(),
            "CONFIRMED"
        );
        let status: OrderStatus = serde_json::from_value("FAILED".into()).unwrap();
        assert_eq!(status, OrderStatus::Failed);
    }
}
