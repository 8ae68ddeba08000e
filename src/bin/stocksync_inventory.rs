//! stocksync-inventory: inventory service daemon
//!
//! Connects to the broker, subscribes the inventory responder to the stock
//! command keys and answers requests until Ctrl-C.
//!
//! ## Configuration
//! - First argument or STOCKSYNC_CONFIG: YAML config file
//! - STOCKSYNC__MESSAGING__TYPE: channel or amqp
//! - STOCKSYNC_LOG: log filter (default "info")

use std::sync::Arc;
use std::time::Duration;

use backon::Retryable;
use tracing::{info, warn};

use stocksync::bus::{init_transport, BrokerClient, BusError};
use stocksync::config::{Config, MessagingType};
use stocksync::handlers::InventoryResponder;
use stocksync::services::InventoryService;
use stocksync::storage::MemoryInventoryStore;
use stocksync::utils::bootstrap::init_tracing;
use stocksync::utils::product_code::RandomProductCodes;
use stocksync::utils::retry::connection_backoff;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = std::env::args().nth(1);
    let config = Config::load(config_path.as_deref())?;
    init_tracing(config.logging.format);

    if config.messaging.messaging_type == MessagingType::Channel {
        warn!("Channel messaging only reaches this process; use amqp to serve other services");
    }

    let transport = init_transport(&config.messaging)
        .map_err(|e| -> Box<dyn std::error::Error> { e })?;
    let client = Arc::new(BrokerClient::new(transport, config.service.name.clone()));

    (|| {
        let client = Arc::clone(&client);
        async move { client.start().await }
    })
        .retry(connection_backoff())
        .when(|e: &BusError| matches!(e, BusError::Connection(_)))
        .notify(|err: &BusError, dur: Duration| {
            warn!(error = %err, delay = ?dur, "Broker connection failed, retrying");
        })
        .await?;

    let service = Arc::new(InventoryService::new(
        Arc::new(MemoryInventoryStore::new()),
        client.clone(),
        Arc::new(RandomProductCodes),
        config.inventory.product_code_attempts,
    ));
    let responder = Arc::new(InventoryResponder::new(service));
    responder.register(&*client).await?;

    info!(service = %config.service.name, "Inventory service ready");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    client.shutdown().await?;
    Ok(())
}
