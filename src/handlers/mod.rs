//! Message handlers binding services to the broker.

pub mod inventory;

pub use inventory::InventoryResponder;
