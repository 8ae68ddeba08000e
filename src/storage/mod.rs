//! Storage interfaces and implementations.
//!
//! - `InventoryStore`: inventory items keyed by product code
//! - `OrderStore`: confirmed orders keyed by id
//!
//! Stores are plain key/value access. Serializing read-modify-write on one
//! product is the inventory service's job, not the store's.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{InventoryItem, NewOrder, Order};

pub mod memory;

pub use memory::{MemoryInventoryStore, MemoryOrderStore};

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    #[error("{entity} already exists: {key}")]
    Conflict { entity: &'static str, key: String },

    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Inventory item persistence.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// Look up an item. `None` when absent.
    async fn find(&self, product_code: &str) -> Result<Option<InventoryItem>>;

    /// Insert a new item. Fails with `Conflict` if the code is taken.
    async fn insert(&self, item: InventoryItem) -> Result<InventoryItem>;

    /// Replace an existing item. Fails with `NotFound` if it was never inserted.
    async fn update(&self, item: InventoryItem) -> Result<InventoryItem>;
}

/// Order persistence.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persist an order, assigning its id and creation time.
    async fn insert(&self, order: NewOrder) -> Result<Order>;

    /// Look up an order by id. `None` when absent.
    async fn find(&self, id: Uuid) -> Result<Option<Order>>;
}
