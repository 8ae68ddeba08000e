//! Stock-change events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::InventoryItem;
use crate::topology::RoutingKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StockEventType {
    StockAdded,
    StockReduced,
}

impl StockEventType {
    /// Added when the quantity did not go down, reduced otherwise.
    pub fn for_change(previous: u32, new: u32) -> Self {
        if new >= previous {
            StockEventType::StockAdded
        } else {
            StockEventType::StockReduced
        }
    }

    pub fn routing_key(&self) -> RoutingKey {
        match self {
            StockEventType::StockAdded => RoutingKey::StockAdded,
            StockEventType::StockReduced => RoutingKey::StockReduced,
        }
    }
}

/// Published after a stock write commits. Fire-and-forget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockUpdateEvent {
    pub event_type: StockEventType,
    pub product_code: String,
    pub previous_quantity: u32,
    pub new_quantity: u32,
    pub product_name: String,
    pub timestamp: DateTime<Utc>,
}

impl StockUpdateEvent {
    /// Event describing `item` after its quantity moved from `previous_quantity`.
    pub fn for_change(item: &InventoryItem, previous_quantity: u32) -> Self {
        Self {
            event_type: StockEventType::for_change(previous_quantity, item.quantity),
            product_code: item.product_code.clone(),
            previous_quantity,
            new_quantity: item.quantity,
            product_name: item.name.clone(),
            timestamp: Utc::now(),
        }
    }
}
