//! Message broker abstraction.
//!
//! This module contains:
//! - `Broker` trait: publish, subscribe and request/response over a topic broker
//! - `BrokerClient`: the `Broker` implementation owning the connection lifecycle
//! - `Transport` trait: the wire-level operations a broker backend provides
//! - Implementations: in-process channel broker, AMQP (RabbitMQ), Mock

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::{MessagingConfig, MessagingType};
use crate::topology::{Exchange, RoutingKey};

// Implementation modules
#[cfg(feature = "amqp")]
pub mod amqp;
#[cfg(feature = "channel")]
pub mod channel;
mod client;
pub mod mock;
mod pending;

// Re-exports
#[cfg(feature = "amqp")]
pub use amqp::AmqpTransport;
#[cfg(feature = "channel")]
pub use channel::{ChannelBroker, ChannelTransport};
pub use client::{BrokerClient, ClientState};
pub use mock::{CallKind, MockBroker, MockReply, RecordedCall};
pub use pending::PendingReplies;

// ============================================================================
// Errors
// ============================================================================

/// Result type for bus operations.
pub type Result<T> = std::result::Result<T, BusError>;

/// Errors that can occur during bus operations.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("Broker client is not connected")]
    NotConnected,

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Subscribe failed: {0}")]
    Subscribe(String),

    #[error("Request on '{routing_key}' timed out after {timeout:?}")]
    TimedOut {
        routing_key: String,
        timeout: Duration,
    },

    #[error("Payload codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("Correlation id already pending: {0}")]
    DuplicateCorrelation(String),

    #[error("Handler failed: {0}")]
    Handler(String),
}

impl BusError {
    /// True when the broker or the peer service could not be reached in time.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            BusError::NotConnected
                | BusError::Connection(_)
                | BusError::Publish(_)
                | BusError::TimedOut { .. }
        )
    }
}

// ============================================================================
// Wire types
// ============================================================================

/// The AMQP default exchange. Messages sent to it route straight to the queue
/// named by the routing key; replies use it to reach a reply queue.
pub const DEFAULT_EXCHANGE: &str = "";

/// A message as it travels over a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub exchange: String,
    pub routing_key: String,
    /// Set on requests and echoed on their replies.
    pub correlation_id: Option<String>,
    /// Queue the responder should send its reply to.
    pub reply_to: Option<String>,
    /// JSON body.
    pub payload: Vec<u8>,
}

impl Envelope {
    /// Fire-and-forget message on a topic exchange.
    pub fn new(exchange: Exchange, routing_key: RoutingKey, payload: Vec<u8>) -> Self {
        Self {
            exchange: exchange.as_str().to_string(),
            routing_key: routing_key.as_str().to_string(),
            correlation_id: None,
            reply_to: None,
            payload,
        }
    }

    /// Request carrying the correlation id and reply destination.
    pub fn with_reply(mut self, correlation_id: String, reply_to: String) -> Self {
        self.correlation_id = Some(correlation_id);
        self.reply_to = Some(reply_to);
        self
    }

    /// Reply routed through the default exchange to the requester's queue.
    pub fn reply(reply_to: &str, correlation_id: Option<String>, payload: Vec<u8>) -> Self {
        Self {
            exchange: DEFAULT_EXCHANGE.to_string(),
            routing_key: reply_to.to_string(),
            correlation_id,
            reply_to: None,
            payload,
        }
    }
}

/// Queue declaration and binding for a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub exchange: Exchange,
    /// Topic pattern (e.g., "inventory.stock.*").
    pub pattern: String,
    /// Durable queue name shared by instances of the same service.
    pub queue: String,
}

/// Stream of deliveries from a queue.
pub type DeliveryStream = BoxStream<'static, Envelope>;

/// Wire-level operations a broker backend provides.
///
/// Implementations:
/// - `ChannelTransport`: in-process broker for standalone mode and tests
/// - `AmqpTransport`: RabbitMQ via AMQP
#[async_trait]
pub trait Transport: Send + Sync {
    /// Establish the underlying connection.
    async fn connect(&self) -> Result<()>;

    /// Declare topic exchanges. Idempotent.
    async fn declare_exchanges(&self, exchanges: &[Exchange]) -> Result<()>;

    /// Send a single message. Not retried.
    async fn send(&self, envelope: Envelope) -> Result<()>;

    /// Declare and bind a queue, then consume it.
    async fn consume(&self, binding: &Binding) -> Result<DeliveryStream>;

    /// Declare an exclusive, auto-deleted reply queue and consume it.
    ///
    /// Returns the queue name to put in `reply_to`.
    async fn reply_queue(&self) -> Result<(String, DeliveryStream)>;

    /// Release the connection and every queue owned by it.
    async fn close(&self) -> Result<()>;
}

// ============================================================================
// Handlers
// ============================================================================

/// Capability to answer a request that carried a reply destination.
#[derive(Clone)]
pub struct Replier {
    transport: Arc<dyn Transport>,
    reply_to: String,
    correlation_id: Option<String>,
}

impl Replier {
    pub(crate) fn new(
        transport: Arc<dyn Transport>,
        reply_to: String,
        correlation_id: Option<String>,
    ) -> Self {
        Self {
            transport,
            reply_to,
            correlation_id,
        }
    }

    pub fn reply_to(&self) -> &str {
        &self.reply_to
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    /// Send a raw reply payload.
    pub async fn reply(&self, payload: Vec<u8>) -> Result<()> {
        let envelope = Envelope::reply(&self.reply_to, self.correlation_id.clone(), payload);
        self.transport.send(envelope).await
    }
}

/// A decoded inbound message handed to a `MessageHandler`.
pub struct InboundMessage {
    pub routing_key: RoutingKey,
    pub payload: Vec<u8>,
    replier: Option<Replier>,
}

impl InboundMessage {
    pub fn new(routing_key: RoutingKey, payload: Vec<u8>, replier: Option<Replier>) -> Self {
        Self {
            routing_key,
            payload,
            replier,
        }
    }

    /// Deserialize the JSON payload.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.payload)?)
    }

    /// Reply capability, present when the sender asked for a response.
    pub fn replier(&self) -> Option<&Replier> {
        self.replier.as_ref()
    }

    /// Serialize and send a reply. A message without reply destination is
    /// answered by nobody; the reply is dropped.
    pub async fn reply<T: Serialize + Sync>(&self, body: &T) -> Result<()> {
        match &self.replier {
            Some(replier) => replier.reply(serde_json::to_vec(body)?).await,
            None => {
                debug!(routing_key = %self.routing_key, "No reply destination, dropping reply");
                Ok(())
            }
        }
    }
}

/// Handler for messages delivered to a subscription.
pub trait MessageHandler: Send + Sync {
    /// Process one message. Errors are logged by the dispatch loop.
    fn handle(&self, message: InboundMessage) -> BoxFuture<'static, Result<()>>;
}

struct FnHandler<F>(F);

impl<F, Fut> MessageHandler for FnHandler<F>
where
    F: Fn(InboundMessage) -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    fn handle(&self, message: InboundMessage) -> BoxFuture<'static, Result<()>> {
        Box::pin((self.0)(message))
    }
}

/// Wrap an async closure as a `MessageHandler`.
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn MessageHandler>
where
    F: Fn(InboundMessage) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

// ============================================================================
// Broker
// ============================================================================

/// Publish/subscribe plus request/response over a topic broker.
///
/// Implementations:
/// - `BrokerClient`: real client over a `Transport`
/// - `MockBroker`: records calls for testing
#[async_trait]
pub trait Broker: Send + Sync {
    /// Fire-and-forget send. Failures are reported, never retried.
    async fn publish(
        &self,
        exchange: Exchange,
        routing_key: RoutingKey,
        payload: Vec<u8>,
    ) -> Result<()>;

    /// Register a handler for every message matching `pattern`.
    async fn subscribe(
        &self,
        exchange: Exchange,
        pattern: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<()>;

    /// Send a request and wait for the correlated reply or the timeout.
    async fn publish_with_response(
        &self,
        exchange: Exchange,
        routing_key: RoutingKey,
        payload: Vec<u8>,
        timeout: Duration,
    ) -> Result<Vec<u8>>;
}

/// Typed JSON helpers over any `Broker`.
#[async_trait]
pub trait BrokerExt: Broker {
    /// Serialize and publish an event on its routing key's exchange.
    async fn publish_json<T>(&self, routing_key: RoutingKey, body: &T) -> Result<()>
    where
        T: Serialize + Sync,
    {
        let payload = serde_json::to_vec(body)?;
        self.publish(routing_key.exchange(), routing_key, payload)
            .await
    }

    /// Serialize a request, wait for the reply and deserialize it.
    async fn request<Req, Resp>(
        &self,
        routing_key: RoutingKey,
        request: &Req,
        timeout: Duration,
    ) -> Result<Resp>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned + Send,
    {
        let payload = serde_json::to_vec(request)?;
        let reply = self
            .publish_with_response(routing_key.exchange(), routing_key, payload, timeout)
            .await?;
        Ok(serde_json::from_slice(&reply)?)
    }
}

impl<B: Broker + ?Sized> BrokerExt for B {}

// ============================================================================
// Factory
// ============================================================================

/// Initialize the transport selected by configuration.
///
/// Requires the corresponding feature to be enabled:
/// - Channel: `--features channel` (default)
/// - AMQP: `--features amqp`
pub fn init_transport(
    config: &MessagingConfig,
) -> std::result::Result<Arc<dyn Transport>, Box<dyn std::error::Error + Send + Sync>> {
    match config.messaging_type {
        MessagingType::Channel => {
            #[cfg(feature = "channel")]
            {
                info!(messaging_type = "channel", "Transport initialized");
                Ok(Arc::new(ChannelTransport::new(ChannelBroker::new())))
            }

            #[cfg(not(feature = "channel"))]
            {
                Err("Channel broker requires the 'channel' feature".into())
            }
        }
        MessagingType::Amqp => {
            #[cfg(feature = "amqp")]
            {
                info!(messaging_type = "amqp", url = %config.amqp.url, "Transport initialized");
                Ok(Arc::new(AmqpTransport::new(&config.amqp.url)))
            }

            #[cfg(not(feature = "amqp"))]
            {
                Err("AMQP support requires the 'amqp' feature. Rebuild with --features amqp".into())
            }
        }
    }
}
