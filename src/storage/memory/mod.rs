//! In-memory store implementations.
//!
//! Used by the standalone binary and by tests. Each store can be told to fail
//! its writes so callers can exercise their error paths.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{InventoryStore, OrderStore, Result, StorageError};
use crate::domain::{InventoryItem, NewOrder, Order};

/// Inventory items held in a map.
#[derive(Default)]
pub struct MemoryInventoryStore {
    items: RwLock<HashMap<String, InventoryItem>>,
    fail_on_write: RwLock<bool>,
}

impl MemoryInventoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_fail_on_write(&self, fail: bool) {
        *self.fail_on_write.write().await = fail;
    }

    pub async fn len(&self) -> usize {
        self.items.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.read().await.is_empty()
    }

    async fn check_writable(&self) -> Result<()> {
        if *self.fail_on_write.read().await {
            return Err(StorageError::Backend(
                "Simulated inventory write failure".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl InventoryStore for MemoryInventoryStore {
    async fn find(&self, product_code: &str) -> Result<Option<InventoryItem>> {
        Ok(self.items.read().await.get(product_code).cloned())
    }

    async fn insert(&self, item: InventoryItem) -> Result<InventoryItem> {
        self.check_writable().await?;
        let mut items = self.items.write().await;
        if items.contains_key(&item.product_code) {
            return Err(StorageError::Conflict {
                entity: "Inventory item",
                key: item.product_code,
            });
        }
        items.insert(item.product_code.clone(), item.clone());
        Ok(item)
    }

    async fn update(&self, item: InventoryItem) -> Result<InventoryItem> {
        self.check_writable().await?;
        let mut items = self.items.write().await;
        match items.get_mut(&item.product_code) {
            Some(existing) => {
                *existing = item.clone();
                Ok(item)
            }
            None => Err(StorageError::NotFound {
                entity: "Inventory item",
                key: item.product_code,
            }),
        }
    }
}

/// Orders held in a map.
#[derive(Default)]
pub struct MemoryOrderStore {
    orders: RwLock<HashMap<Uuid, Order>>,
    fail_on_insert: RwLock<bool>,
}

impl MemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_fail_on_insert(&self, fail: bool) {
        *self.fail_on_insert.write().await = fail;
    }

    pub async fn len(&self) -> usize {
        self.orders.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.orders.read().await.is_empty()
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn insert(&self, order: NewOrder) -> Result<Order> {
        if *self.fail_on_insert.read().await {
            return Err(StorageError::Backend(
                "Simulated order write failure".to_string(),
            ));
        }
        let order = Order {
            id: Uuid::new_v4(),
            product_code: order.product_code,
            quantity: order.quantity,
            total_price: order.total_price,
            status: order.status,
            created_at: Utc::now(),
        };
        self.orders.write().await.insert(order.id, order.clone());
        Ok(order)
    }

    async fn find(&self, id: Uuid) -> Result<Option<Order>> {
        Ok(self.orders.read().await.get(&id).cloned())
    }
}

#[cfg(test)]
mod tests;
