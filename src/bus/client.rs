//! Broker client: connection lifecycle, subscriptions and request/response.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::{Mutex, RwLock, RwLockReadGuard};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

use super::{
    Binding, BusError, DeliveryStream, Envelope, InboundMessage, MessageHandler,
    PendingReplies, Replier, Result, Transport,
};
use super::Broker;
use crate::topology::{self, Exchange, RoutingKey};

/// Lifecycle of a `BrokerClient`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Created, `start` not yet called (or last attempt failed).
    Idle,
    /// Connected and topology declared.
    Connected,
    /// Shut down. Terminal.
    Closed,
}

/// Broker client multiplexing every logical request over one transport.
///
/// A single reply queue is created lazily on the first request and shared by
/// all requests; replies are matched to callers by correlation id only, so
/// they may arrive in any order.
pub struct BrokerClient {
    transport: Arc<dyn Transport>,
    service_name: String,
    state: RwLock<ClientState>,
    pending: Arc<PendingReplies>,
    reply_queue: Mutex<Option<String>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl BrokerClient {
    /// Create a client. No connection is made until `start`.
    ///
    /// `service_name` prefixes durable subscription queues so instances of the
    /// same service compete for messages.
    pub fn new(transport: Arc<dyn Transport>, service_name: impl Into<String>) -> Self {
        Self {
            transport,
            service_name: service_name.into(),
            state: RwLock::new(ClientState::Idle),
            pending: Arc::new(PendingReplies::new()),
            reply_queue: Mutex::new(None),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Connect and declare the topology. Idempotent while connected.
    pub async fn start(&self) -> Result<()> {
        let mut state = self.state.write().await;
        match *state {
            ClientState::Connected => return Ok(()),
            ClientState::Closed => return Err(BusError::NotConnected),
            ClientState::Idle => {}
        }

        self.transport.connect().await?;
        self.transport.declare_exchanges(&Exchange::ALL).await?;
        *state = ClientState::Connected;

        info!(service = %self.service_name, "Broker client connected");
        Ok(())
    }

    /// Stop consumers, drop pending waiters and release the connection.
    ///
    /// Callers still awaiting a reply observe `NotConnected`.
    pub async fn shutdown(&self) -> Result<()> {
        let previous = {
            let mut state = self.state.write().await;
            std::mem::replace(&mut *state, ClientState::Closed)
        };
        if previous != ClientState::Connected {
            return Ok(());
        }

        for task in self.tasks.lock().await.drain(..) {
            task.abort();
        }
        let dropped = self.pending.clear().await;
        self.reply_queue.lock().await.take();
        self.transport.close().await?;

        info!(
            service = %self.service_name,
            dropped_waiters = dropped,
            "Broker client shut down"
        );
        Ok(())
    }

    pub async fn state(&self) -> ClientState {
        *self.state.read().await
    }

    /// Number of requests still waiting for a reply.
    pub async fn pending_count(&self) -> usize {
        self.pending.len().await
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Read guard on a connected state.
    ///
    /// Held across an operation so `shutdown` cannot interleave with it.
    async fn connected(&self) -> Result<RwLockReadGuard<'_, ClientState>> {
        let state = self.state.read().await;
        match *state {
            ClientState::Connected => Ok(state),
            _ => Err(BusError::NotConnected),
        }
    }

    /// Reply queue shared by all requests, created on first use.
    async fn ensure_reply_queue(&self) -> Result<String> {
        let mut reply_queue = self.reply_queue.lock().await;
        if let Some(name) = reply_queue.as_ref() {
            return Ok(name.clone());
        }

        let (name, stream) = self.transport.reply_queue().await?;
        let handle = tokio::spawn(dispatch_replies(stream, Arc::clone(&self.pending)));
        self.tasks.lock().await.push(handle);

        debug!(reply_queue = %name, "Reply queue ready");
        *reply_queue = Some(name.clone());
        Ok(name)
    }
}

#[async_trait]
impl Broker for BrokerClient {
    #[tracing::instrument(name = "bus.publish", skip_all, fields(routing_key = %routing_key))]
    async fn publish(
        &self,
        exchange: Exchange,
        routing_key: RoutingKey,
        payload: Vec<u8>,
    ) -> Result<()> {
        let _connected = self.connected().await?;
        self.transport
            .send(Envelope::new(exchange, routing_key, payload))
            .await?;
        debug!(exchange = %exchange, "Published message");
        Ok(())
    }

    async fn subscribe(
        &self,
        exchange: Exchange,
        pattern: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<()> {
        let _connected = self.connected().await?;

        let binding = Binding {
            exchange,
            pattern: pattern.to_string(),
            queue: topology::queue_name(&self.service_name, pattern),
        };
        let stream = self.transport.consume(&binding).await?;

        info!(
            queue = %binding.queue,
            pattern = %binding.pattern,
            "Subscribed"
        );

        let handle = tokio::spawn(dispatch_messages(
            stream,
            handler,
            Arc::clone(&self.transport),
            binding.queue,
        ));
        self.tasks.lock().await.push(handle);
        Ok(())
    }

    #[tracing::instrument(name = "bus.request", skip_all, fields(routing_key = %routing_key))]
    async fn publish_with_response(
        &self,
        exchange: Exchange,
        routing_key: RoutingKey,
        payload: Vec<u8>,
        timeout: Duration,
    ) -> Result<Vec<u8>> {
        let correlation_id = Uuid::new_v4().to_string();
        let reply = {
            let _connected = self.connected().await?;
            let reply_to = self.ensure_reply_queue().await?;
            let reply = self.pending.register(&correlation_id).await?;

            let envelope = Envelope::new(exchange, routing_key, payload)
                .with_reply(correlation_id.clone(), reply_to);
            if let Err(e) = self.transport.send(envelope).await {
                self.pending.cancel(&correlation_id).await;
                return Err(e);
            }
            reply
        };

        match tokio::time::timeout(timeout, reply).await {
            Ok(Ok(payload)) => {
                debug!(correlation_id = %correlation_id, "Received reply");
                Ok(payload)
            }
            // Waiter dropped by shutdown.
            Ok(Err(_)) => Err(BusError::NotConnected),
            Err(_) => {
                self.pending.cancel(&correlation_id).await;
                warn!(
                    correlation_id = %correlation_id,
                    timeout_ms = timeout.as_millis() as u64,
                    "Request timed out"
                );
                Err(BusError::TimedOut {
                    routing_key: routing_key.to_string(),
                    timeout,
                })
            }
        }
    }
}

/// Route replies from the reply queue to their waiters.
async fn dispatch_replies(mut stream: DeliveryStream, pending: Arc<PendingReplies>) {
    while let Some(envelope) = stream.next().await {
        let Some(correlation_id) = envelope.correlation_id else {
            warn!("Reply without correlation id, discarding");
            continue;
        };
        if !pending.resolve(&correlation_id, envelope.payload).await {
            debug!(correlation_id = %correlation_id, "Discarding late or unknown reply");
        }
    }
    info!("Reply stream ended");
}

/// Feed deliveries of one subscription to its handler, one at a time.
///
/// Each invocation runs in its own task so that a panicking handler is
/// contained and logged like a failed one. The task lives in a `JoinSet`
/// owned by this loop, so aborting the loop also aborts the handler.
async fn dispatch_messages(
    mut stream: DeliveryStream,
    handler: Arc<dyn MessageHandler>,
    transport: Arc<dyn Transport>,
    queue: String,
) {
    let mut in_flight = JoinSet::new();
    while let Some(envelope) = stream.next().await {
        let routing_key = match envelope.routing_key.parse::<RoutingKey>() {
            Ok(key) => key,
            Err(e) => {
                warn!(queue = %queue, error = %e, "Dropping message");
                continue;
            }
        };

        let replier = envelope.reply_to.map(|reply_to| {
            Replier::new(Arc::clone(&transport), reply_to, envelope.correlation_id)
        });
        let message = InboundMessage::new(routing_key, envelope.payload, replier);

        let consume_span = tracing::info_span!("bus.consume", routing_key = %routing_key);
        let handling = handler.handle(message).instrument(consume_span);

        in_flight.spawn(handling);
        let Some(outcome) = in_flight.join_next().await else {
            continue;
        };
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!(queue = %queue, routing_key = %routing_key, error = %e, "Handler failed");
            }
            Err(e) => {
                error!(queue = %queue, routing_key = %routing_key, error = %e, "Handler panicked");
            }
        }
    }
    info!(queue = %queue, "Subscription stream ended");
}
