use rust_decimal_macros::dec;

use super::*;
use crate::domain::OrderStatus;

fn item(code: &str, quantity: u32) -> InventoryItem {
    InventoryItem {
        product_code: code.to_string(),
        name: "Widget".to_string(),
        description: String::new(),
        quantity,
        price: dec!(100),
    }
}

#[tokio::test]
async fn test_inventory_insert_and_find() {
    let store = MemoryInventoryStore::new();
    store.insert(item("PROD-1", 5)).await.unwrap();

    let found = store.find("PROD-1").await.unwrap().unwrap();
    assert_eq!(found.quantity, 5);
    assert!(store.find("PROD-2").await.unwrap().is_none());
}

#[tokio::test]
async fn test_inventory_insert_conflict() {
    let store = MemoryInventoryStore::new();
    store.insert(item("PROD-1", 5)).await.unwrap();

    let result = store.insert(item("PROD-1", 9)).await;
    assert!(matches!(result, Err(StorageError::Conflict { .. })));
    assert_eq!(store.find("PROD-1").await.unwrap().unwrap().quantity, 5);
}

#[tokio::test]
async fn test_inventory_update() {
    let store = MemoryInventoryStore::new();
    store.insert(item("PROD-1", 5)).await.unwrap();
    store.update(item("PROD-1", 2)).await.unwrap();
    assert_eq!(store.find("PROD-1").await.unwrap().unwrap().quantity, 2);

    let missing = store.update(item("PROD-9", 1)).await;
    assert!(matches!(missing, Err(StorageError::NotFound { .. })));
}

#[tokio::test]
async fn test_inventory_fail_on_write() {
    let store = MemoryInventoryStore::new();
    store.set_fail_on_write(true).await;

    let result = store.insert(item("PROD-1", 5)).await;
    assert!(matches!(result, Err(StorageError::Backend(_))));
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn test_order_insert_assigns_id() {
    let store = MemoryOrderStore::new();
    let new_order = NewOrder {
        product_code: "PROD-1".to_string(),
        quantity: 2,
        total_price: dec!(200),
        status: OrderStatus::Confirmed,
    };

    let first = store.insert(new_order.clone()).await.unwrap();
    let second = store.insert(new_order).await.unwrap();
    assert_ne!(first.id, second.id);

    let found = store.find(first.id).await.unwrap().unwrap();
    assert_eq!(found, first);
    assert!(store.find(Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_order_fail_on_insert() {
    let store = MemoryOrderStore::new();
    store.set_fail_on_insert(true).await;

    let result = store
        .insert(NewOrder {
            product_code: "PROD-1".to_string(),
            quantity: 1,
            total_price: dec!(1),
            status: OrderStatus::Confirmed,
        })
        .await;
    assert!(matches!(result, Err(StorageError::Backend(_))));
    assert!(store.is_empty().await);
}
