//! Inventory service.
//!
//! Owns the inventory store and emits a stock-change event after every
//! committed quantity change. Event emission is best-effort: a failed publish
//! is logged and the store write stands. Events for one product are published
//! under its lock, so they leave in commit order.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use super::error::{Result, ServiceError};
use crate::bus::{Broker, BrokerExt};
use crate::domain::{
    positive_quantity, require_product_code, InventoryItem, NewInventoryItem, StockCheckRequest,
    StockCheckResponse, StockUpdateEvent,
};
use crate::storage::{InventoryStore, StorageError};
use crate::utils::product_code::ProductCodeGenerator;

/// One async mutex per product code.
///
/// Held across the read, the write and the event publish of a quantity
/// change so two deductions on the same product cannot both pass the stock
/// check, and their events go out in commit order.
#[derive(Default)]
struct ProductLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ProductLocks {
    async fn acquire(&self, product_code: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            Arc::clone(locks.entry(product_code.to_string()).or_default())
        };
        lock.lock_owned().await
    }
}

/// Inventory operations backing both the command responder and direct callers.
pub struct InventoryService {
    store: Arc<dyn InventoryStore>,
    broker: Arc<dyn Broker>,
    codes: Arc<dyn ProductCodeGenerator>,
    code_attempts: u32,
    locks: ProductLocks,
}

impl InventoryService {
    pub fn new(
        store: Arc<dyn InventoryStore>,
        broker: Arc<dyn Broker>,
        codes: Arc<dyn ProductCodeGenerator>,
        code_attempts: u32,
    ) -> Self {
        Self {
            store,
            broker,
            codes,
            code_attempts,
            locks: ProductLocks::default(),
        }
    }

    /// Create an item, generating a product code when none is supplied.
    #[tracing::instrument(name = "inventory.create_item", skip_all, fields(name = %new_item.name))]
    pub async fn create_item(&self, new_item: NewInventoryItem) -> Result<InventoryItem> {
        let item = match new_item.product_code.clone() {
            Some(code) => {
                let item = new_item.into_item(code)?;
                self.store.insert(item).await?
            }
            None => self.insert_with_generated_code(new_item).await?,
        };

        info!(product_code = %item.product_code, quantity = item.quantity, "Inventory item created");
        self.emit(&item, 0).await;
        Ok(item)
    }

    async fn insert_with_generated_code(
        &self,
        new_item: NewInventoryItem,
    ) -> Result<InventoryItem> {
        for attempt in 1..=self.code_attempts {
            let code = self.codes.generate();
            let item = new_item.clone().into_item(code)?;
            match self.store.insert(item).await {
                Ok(item) => return Ok(item),
                Err(StorageError::Conflict { key, .. }) => {
                    debug!(product_code = %key, attempt, "Generated product code taken, re-rolling");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(ServiceError::Internal(format!(
            "No free product code after {} attempts",
            self.code_attempts
        )))
    }

    pub async fn get_item(&self, product_code: &str) -> Result<InventoryItem> {
        self.store
            .find(product_code)
            .await?
            .ok_or_else(|| not_found(product_code))
    }

    /// Set the stock level of an existing item.
    #[tracing::instrument(name = "inventory.update_stock", skip(self))]
    pub async fn update_stock(&self, product_code: &str, quantity: i64) -> Result<InventoryItem> {
        require_product_code(product_code)?;
        let quantity = positive_quantity(quantity)?;

        let guard = self.locks.acquire(product_code).await;
        let mut item = self.get_item(product_code).await?;
        let previous = item.quantity;
        item.quantity = quantity;
        let item = self.store.update(item).await?;

        info!(previous, quantity, "Stock updated");
        self.emit(&item, previous).await;
        drop(guard);
        Ok(item)
    }

    /// Answer whether `quantity` units are in stock. No side effects.
    pub async fn check_stock(&self, request: &StockCheckRequest) -> Result<StockCheckResponse> {
        Ok(match self.store.find(&request.product_code).await? {
            Some(item) => StockCheckResponse::for_item(&item, request.quantity),
            None => StockCheckResponse::not_found(),
        })
    }

    /// Remove `quantity` units. Fails without writing when stock is short.
    #[tracing::instrument(name = "inventory.deduct_stock", skip(self))]
    pub async fn deduct_stock(&self, product_code: &str, quantity: u32) -> Result<InventoryItem> {
        require_product_code(product_code)?;
        let quantity = positive_quantity(i64::from(quantity))?;

        let guard = self.locks.acquire(product_code).await;
        let mut item = self.get_item(product_code).await?;
        let previous = item.quantity;
        if previous < quantity {
            return Err(ServiceError::InsufficientStock(format!(
                "Insufficient stock for {}. Available: {}, requested: {}",
                product_code, previous, quantity
            )));
        }
        item.quantity = previous - quantity;
        let item = self.store.update(item).await?;

        info!(previous, remaining = item.quantity, "Stock deducted");
        self.emit(&item, previous).await;
        drop(guard);
        Ok(item)
    }

    /// Put back `quantity` units taken by an earlier deduction.
    #[tracing::instrument(name = "inventory.release_stock", skip(self))]
    pub async fn release_stock(&self, product_code: &str, quantity: u32) -> Result<InventoryItem> {
        require_product_code(product_code)?;
        let quantity = positive_quantity(i64::from(quantity))?;

        let guard = self.locks.acquire(product_code).await;
        let mut item = self.get_item(product_code).await?;
        let previous = item.quantity;
        item.quantity = previous.checked_add(quantity).ok_or_else(|| {
            ServiceError::Validation(format!(
                "Releasing {} units would overflow the stock of {}",
                quantity, product_code
            ))
        })?;
        let item = self.store.update(item).await?;

        info!(previous, quantity = item.quantity, "Stock released");
        self.emit(&item, previous).await;
        drop(guard);
        Ok(item)
    }

    async fn emit(&self, item: &InventoryItem, previous: u32) {
        let event = StockUpdateEvent::for_change(item, previous);
        let routing_key = event.event_type.routing_key();
        if let Err(e) = self.broker.publish_json(routing_key, &event).await {
            warn!(
                product_code = %item.product_code,
                routing_key = %routing_key,
                error = %e,
                "Failed to publish stock event; store write kept"
            );
        }
    }
}

fn not_found(product_code: &str) -> ServiceError {
    ServiceError::NotFound(format!("Inventory item not found: {}", product_code))
}
