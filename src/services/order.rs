//! Order choreography.
//!
//! Places an order by asking the inventory service over the broker:
//!
//! 1. Validate input locally; nothing is sent on failure.
//! 2. Stock check request. Gives availability and unit price. The total is
//!    priced here; a total out of range fails before anything is deducted.
//! 3. Stock deduct request.
//! 4. Persist the order as CONFIRMED.
//!
//! Any broker failure ends the attempt with nothing persisted. If the order
//! write fails after stock was deducted, a release request hands the stock
//! back before the error is returned.

use std::sync::Arc;

use tracing::{error, info, warn};
use uuid::Uuid;

use super::error::{Result, ServiceError};
use crate::bus::{Broker, BrokerExt, BusError};
use crate::config::TimeoutConfig;
use crate::domain::{
    positive_quantity, require_product_code, Order, OrderDraft, StockCheckRequest,
    StockCheckResponse, StockCommandResponse, StockDeductRequest, StockFailure,
    StockReleaseRequest,
};
use crate::storage::OrderStore;
use crate::topology::RoutingKey;

pub struct OrderService {
    broker: Arc<dyn Broker>,
    store: Arc<dyn OrderStore>,
    timeouts: TimeoutConfig,
}

impl OrderService {
    pub fn new(broker: Arc<dyn Broker>, store: Arc<dyn OrderStore>, timeouts: TimeoutConfig) -> Self {
        Self {
            broker,
            store,
            timeouts,
        }
    }

    /// Place an order for `quantity` units of `product_code`.
    #[tracing::instrument(name = "order.create", skip(self))]
    pub async fn create_order(&self, product_code: &str, quantity: i64) -> Result<Order> {
        require_product_code(product_code)?;
        let quantity = positive_quantity(quantity)?;

        let check: StockCheckResponse = self
            .broker
            .request(
                RoutingKey::StockCheck,
                &StockCheckRequest {
                    product_code: product_code.to_string(),
                    quantity,
                },
                self.timeouts.stock_check(),
            )
            .await
            .map_err(|e| upstream(RoutingKey::StockCheck, e))?;

        if !check.available {
            info!(reason = %check.message, "Stock check rejected order");
            return Err(ServiceError::InsufficientStock(check.message));
        }
        let unit_price = check.unit_price.ok_or_else(|| {
            ServiceError::Internal("Stock check reply carried no unit price".to_string())
        })?;

        let draft = OrderDraft::new(product_code, quantity, unit_price)?;

        let deduct: StockCommandResponse = self
            .broker
            .request(
                RoutingKey::StockDeduct,
                &StockDeductRequest {
                    product_code: product_code.to_string(),
                    quantity,
                },
                self.timeouts.stock_deduct(),
            )
            .await
            .map_err(|e| upstream(RoutingKey::StockDeduct, e))?;

        if !deduct.success {
            return Err(command_failure(deduct));
        }

        match self.store.insert(draft.confirm()).await {
            Ok(order) => {
                info!(order_id = %order.id, total_price = %order.total_price, "Order confirmed");
                Ok(order)
            }
            Err(e) => {
                error!(error = %e, "Failed to persist order after stock deduction");
                self.release(&draft).await;
                Err(ServiceError::Internal(format!("Failed to persist order: {}", e)))
            }
        }
    }

    /// Hand back stock deducted for an order that could not be saved.
    async fn release(&self, draft: &OrderDraft) {
        let request = StockReleaseRequest {
            product_code: draft.product_code().to_string(),
            quantity: draft.quantity(),
        };
        let outcome: std::result::Result<StockCommandResponse, BusError> = self
            .broker
            .request(RoutingKey::StockRelease, &request, self.timeouts.stock_release())
            .await;

        match outcome {
            Ok(response) if response.success => {
                warn!(
                    product_code = %request.product_code,
                    quantity = request.quantity,
                    "Released stock for unsaved order"
                );
            }
            Ok(response) => {
                error!(
                    product_code = %request.product_code,
                    quantity = request.quantity,
                    reason = response.message.as_deref().unwrap_or(""),
                    "Stock release rejected; inventory needs reconciliation"
                );
            }
            Err(e) => {
                error!(
                    product_code = %request.product_code,
                    quantity = request.quantity,
                    error = %e,
                    "Stock release failed; inventory needs reconciliation"
                );
            }
        }
    }

    /// Fetch an order. A malformed id is reported as not found.
    pub async fn get_order(&self, id: &str) -> Result<Order> {
        let not_found = || ServiceError::NotFound(format!("Order not found: {}", id));
        let uuid = Uuid::parse_str(id).map_err(|_| not_found())?;
        self.store.find(uuid).await?.ok_or_else(not_found)
    }
}

/// Every broker failure during order placement means the inventory service
/// could not be asked.
fn upstream(routing_key: RoutingKey, error: BusError) -> ServiceError {
    warn!(routing_key = %routing_key, error = %error, "Inventory request failed");
    ServiceError::UpstreamUnavailable(error.to_string())
}

fn command_failure(response: StockCommandResponse) -> ServiceError {
    let message = response
        .message
        .unwrap_or_else(|| "Stock deduction rejected".to_string());
    match response.code {
        Some(StockFailure::NotFound) => ServiceError::NotFound(message),
        Some(StockFailure::InsufficientStock) => ServiceError::InsufficientStock(message),
        Some(StockFailure::InvalidRequest) => ServiceError::Validation(message),
        Some(StockFailure::Internal) | None => ServiceError::Internal(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{CallKind, MockBroker, MockReply};
    use crate::domain::OrderStatus;
    use crate::storage::MemoryOrderStore;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    struct Harness {
        service: OrderService,
        broker: Arc<MockBroker>,
        store: Arc<MemoryOrderStore>,
    }

    fn harness() -> Harness {
        let broker = Arc::new(MockBroker::new());
        let store = Arc::new(MemoryOrderStore::new());
        let service = OrderService::new(broker.clone(), store.clone(), TimeoutConfig::default());
        Harness {
            service,
            broker,
            store,
        }
    }

    fn available(stock: u32) -> MockReply {
        MockReply::json(&StockCheckResponse {
            available: true,
            message: "Stock available".to_string(),
            current_stock: stock,
            unit_price: Some(dec!(100)),
            product_name: Some("Widget".to_string()),
        })
    }

    #[tokio::test]
    async fn test_create_order_confirms() {
        let h = harness();
        h.broker.push_reply(RoutingKey::StockCheck, available(100)).await;
        h.broker
            .push_reply(
                RoutingKey::StockDeduct,
                MockReply::json(&StockCommandResponse::ok("Stock deducted")),
            )
            .await;

        let order = h.service.create_order("PROD-1", 2).await.unwrap();
        assert_eq!(order.status, OrderStatus::Confirmed);
        assert_eq!(order.total_price, dec!(200));
        assert_eq!(order.quantity, 2);

        let calls = h.broker.calls().await;
        assert_eq!(calls.len(), 2);
        assert!(calls.iter().all(|c| c.kind == CallKind::Request));
        let deduct: StockDeductRequest = calls[1].decode().unwrap();
        assert_eq!(deduct.quantity, 2);

        assert_eq!(h.service.get_order(&order.id.to_string()).await.unwrap(), order);
    }

    #[tokio::test]
    async fn test_invalid_input_sends_nothing() {
        let h = harness();
        for (code, quantity) in [("PROD-1", 0), ("PROD-1", -3), ("", 1), ("  ", 1)] {
            let result = h.service.create_order(code, quantity).await;
            assert!(matches!(result, Err(ServiceError::Validation(_))));
        }
        assert_eq!(h.broker.call_count().await, 0);
        assert!(h.store.is_empty().await);
    }

    #[tokio::test]
    async fn test_unavailable_stock_surfaces_message() {
        let h = harness();
        h.broker
            .push_reply(
                RoutingKey::StockCheck,
                MockReply::json(&StockCheckResponse::unavailable("Only 1 left")),
            )
            .await;

        let result = h.service.create_order("PROD-1", 5).await;
        match result {
            Err(ServiceError::InsufficientStock(message)) => assert_eq!(message, "Only 1 left"),
            other => panic!("expected InsufficientStock, got {:?}", other),
        }
        assert!(h.broker.calls_for(RoutingKey::StockDeduct).await.is_empty());
        assert!(h.store.is_empty().await);
    }

    #[tokio::test]
    async fn test_total_out_of_range_deducts_nothing() {
        let h = harness();
        h.broker
            .push_reply(
                RoutingKey::StockCheck,
                MockReply::json(&StockCheckResponse {
                    available: true,
                    message: "Stock available".to_string(),
                    current_stock: 10,
                    unit_price: Some(Decimal::MAX),
                    product_name: Some("Widget".to_string()),
                }),
            )
            .await;

        let result = h.service.create_order("BIG", 3).await;
        assert!(matches!(result, Err(ServiceError::Validation(_))));
        assert!(h.broker.calls_for(RoutingKey::StockDeduct).await.is_empty());
        assert!(h.store.is_empty().await);
    }

    #[tokio::test]
    async fn test_check_timeout_is_upstream_unavailable() {
        let h = harness();
        h.broker
            .push_reply(RoutingKey::StockCheck, MockReply::TimedOut)
            .await;

        let result = h.service.create_order("PROD-1", 1).await;
        assert!(matches!(result, Err(ServiceError::UpstreamUnavailable(_))));
        assert!(h.store.is_empty().await);
    }

    #[tokio::test]
    async fn test_deduct_unreachable_persists_nothing() {
        let h = harness();
        h.broker.push_reply(RoutingKey::StockCheck, available(10)).await;
        h.broker
            .push_reply(RoutingKey::StockDeduct, MockReply::Unavailable)
            .await;

        let result = h.service.create_order("PROD-1", 1).await;
        assert!(matches!(result, Err(ServiceError::UpstreamUnavailable(_))));
        assert!(h.store.is_empty().await);
    }

    #[tokio::test]
    async fn test_deduct_rejection_maps_code() {
        let cases = [
            (StockFailure::NotFound, "NOT_FOUND"),
            (StockFailure::InsufficientStock, "INSUFFICIENT_STOCK"),
            (StockFailure::InvalidRequest, "VALIDATION_ERROR"),
            (StockFailure::Internal, "INTERNAL_ERROR"),
        ];

        for (failure, code) in cases {
            let h = harness();
            h.broker.push_reply(RoutingKey::StockCheck, available(10)).await;
            h.broker
                .push_reply(
                    RoutingKey::StockDeduct,
                    MockReply::json(&StockCommandResponse::failed(failure, "rejected")),
                )
                .await;

            let error = h.service.create_order("PROD-1", 1).await.unwrap_err();
            assert_eq!(error.code(), code);
            assert!(h.store.is_empty().await);
        }
    }

    #[tokio::test]
    async fn test_persist_failure_releases_stock() {
        let h = harness();
        h.store.set_fail_on_insert(true).await;
        h.broker.push_reply(RoutingKey::StockCheck, available(10)).await;
        h.broker
            .push_reply(
                RoutingKey::StockDeduct,
                MockReply::json(&StockCommandResponse::ok("Stock deducted")),
            )
            .await;
        h.broker
            .push_reply(
                RoutingKey::StockRelease,
                MockReply::json(&StockCommandResponse::ok("Stock released")),
            )
            .await;

        let result = h.service.create_order("PROD-1", 3).await;
        assert!(matches!(result, Err(ServiceError::Internal(_))));

        let releases = h.broker.calls_for(RoutingKey::StockRelease).await;
        assert_eq!(releases.len(), 1);
        let release: StockReleaseRequest = releases[0].decode().unwrap();
        assert_eq!(release.product_code, "PROD-1");
        assert_eq!(release.quantity, 3);
    }

    #[tokio::test]
    async fn test_failed_release_still_reports_internal() {
        let h = harness();
        h.store.set_fail_on_insert(true).await;
        h.broker.push_reply(RoutingKey::StockCheck, available(10)).await;
        h.broker
            .push_reply(
                RoutingKey::StockDeduct,
                MockReply::json(&StockCommandResponse::ok("Stock deducted")),
            )
            .await;
        // No release reply scripted: the release request times out.

        let result = h.service.create_order("PROD-1", 3).await;
        assert!(matches!(result, Err(ServiceError::Internal(_))));
        assert_eq!(h.broker.calls_for(RoutingKey::StockRelease).await.len(), 1);
    }

    #[tokio::test]
    async fn test_get_order_not_found() {
        let h = harness();
        assert!(h.service.get_order("not-a-uuid").await.unwrap_err().is_not_found());
        assert!(h
            .service
            .get_order(&Uuid::new_v4().to_string())
            .await
            .unwrap_err()
            .is_not_found());
    }
}
