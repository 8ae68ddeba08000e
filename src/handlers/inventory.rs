//! Inventory command responder.
//!
//! Subscribes the inventory service to the stock command keys and answers
//! every request on its reply destination. A request that cannot be decoded
//! still gets a failure reply so the requester does not wait out its timeout.

use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{debug, error, info, warn};

use crate::bus::{self, Broker, InboundMessage, MessageHandler};
use crate::domain::{
    StockCheckRequest, StockCheckResponse, StockCommandResponse, StockDeductRequest,
    StockFailure, StockReleaseRequest,
};
use crate::services::{InventoryService, ServiceError};
use crate::topology::RoutingKey;

/// Routing keys answered by the responder.
pub const COMMAND_KEYS: [RoutingKey; 3] = [
    RoutingKey::StockCheck,
    RoutingKey::StockDeduct,
    RoutingKey::StockRelease,
];

/// Message handler answering stock commands from an `InventoryService`.
pub struct InventoryResponder {
    service: Arc<InventoryService>,
}

impl InventoryResponder {
    pub fn new(service: Arc<InventoryService>) -> Self {
        Self { service }
    }

    /// Subscribe to every command key.
    pub async fn register(self: &Arc<Self>, broker: &dyn Broker) -> bus::Result<()> {
        for key in COMMAND_KEYS {
            broker
                .subscribe(key.exchange(), key.as_str(), Arc::clone(self) as Arc<dyn MessageHandler>)
                .await?;
        }
        info!(keys = ?COMMAND_KEYS.map(|k| k.as_str()), "Inventory responder registered");
        Ok(())
    }
}

impl MessageHandler for InventoryResponder {
    fn handle(&self, message: InboundMessage) -> BoxFuture<'static, bus::Result<()>> {
        let service = Arc::clone(&self.service);
        Box::pin(async move { respond(&service, message).await })
    }
}

async fn respond(service: &InventoryService, message: InboundMessage) -> bus::Result<()> {
    match message.routing_key {
        RoutingKey::StockCheck => {
            let response = match message.decode::<StockCheckRequest>() {
                Ok(request) => match service.check_stock(&request).await {
                    Ok(response) => response,
                    Err(e) => {
                        error!(product_code = %request.product_code, error = %e, "Stock check failed");
                        StockCheckResponse::unavailable(e.to_string())
                    }
                },
                Err(e) => {
                    warn!(error = %e, "Malformed stock check request");
                    StockCheckResponse::unavailable(format!("Invalid stock check request: {}", e))
                }
            };
            message.reply(&response).await
        }
        RoutingKey::StockDeduct => {
            let response = match message.decode::<StockDeductRequest>() {
                Ok(request) => command_response(
                    service
                        .deduct_stock(&request.product_code, request.quantity)
                        .await
                        .map(|item| format!("Stock deducted. Remaining: {}", item.quantity)),
                ),
                Err(e) => malformed(RoutingKey::StockDeduct, e),
            };
            message.reply(&response).await
        }
        RoutingKey::StockRelease => {
            let response = match message.decode::<StockReleaseRequest>() {
                Ok(request) => command_response(
                    service
                        .release_stock(&request.product_code, request.quantity)
                        .await
                        .map(|item| format!("Stock released. Available: {}", item.quantity)),
                ),
                Err(e) => malformed(RoutingKey::StockRelease, e),
            };
            message.reply(&response).await
        }
        RoutingKey::StockAdded | RoutingKey::StockReduced => {
            debug!(routing_key = %message.routing_key, "Ignoring stock event");
            Ok(())
        }
    }
}

fn command_response(outcome: Result<String, ServiceError>) -> StockCommandResponse {
    match outcome {
        Ok(message) => StockCommandResponse::ok(message),
        Err(e) => {
            let code = failure_code(&e);
            if code == StockFailure::Internal {
                error!(error = %e, "Stock command failed");
            } else {
                debug!(error = %e, "Stock command rejected");
            }
            StockCommandResponse::failed(code, e.to_string())
        }
    }
}

fn malformed(routing_key: RoutingKey, error: bus::BusError) -> StockCommandResponse {
    warn!(routing_key = %routing_key, error = %error, "Malformed stock command");
    StockCommandResponse::failed(
        StockFailure::InvalidRequest,
        format!("Invalid request on {}: {}", routing_key, error),
    )
}

fn failure_code(error: &ServiceError) -> StockFailure {
    match error {
        ServiceError::NotFound(_) => StockFailure::NotFound,
        ServiceError::InsufficientStock(_) => StockFailure::InsufficientStock,
        ServiceError::Validation(_) => StockFailure::InvalidRequest,
        ServiceError::Conflict(_)
        | ServiceError::UpstreamUnavailable(_)
        | ServiceError::Internal(_) => StockFailure::Internal,
    }
}
