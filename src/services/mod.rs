//! Service implementations.
//!
//! - `InventoryService`: inventory store owner and stock-event emitter
//! - `OrderService`: order placement over the broker

pub mod error;
pub mod inventory;
pub mod order;

pub use error::{Result, ServiceError};
pub use inventory::InventoryService;
pub use order::OrderService;
