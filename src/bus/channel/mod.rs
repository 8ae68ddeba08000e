//! In-memory broker for standalone mode.
//!
//! `ChannelBroker` plays the part of the broker server: it holds topic
//! exchanges, bindings and named queues, and routes with AMQP topic semantics.
//! Each service connects through its own `ChannelTransport`, so two services
//! in one process talk exactly as they would over RabbitMQ.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info};
use uuid::Uuid;

use super::{Binding, BusError, DeliveryStream, Envelope, Result, Transport, DEFAULT_EXCHANGE};
use crate::topology::{topic_matches, Exchange};

/// A named queue with competing consumers.
#[derive(Default)]
struct Queue {
    consumers: Vec<mpsc::UnboundedSender<Envelope>>,
    /// Round-robin cursor over `consumers`.
    next: usize,
    /// Messages enqueued while no consumer was attached.
    backlog: VecDeque<Envelope>,
    /// Exclusive queues are owned by one connection and deleted with it.
    owner: Option<Uuid>,
}

impl Queue {
    /// Hand the message to the next live consumer, or keep it in the backlog.
    fn deliver(&mut self, envelope: Envelope) {
        let mut envelope = envelope;
        while !self.consumers.is_empty() {
            let index = self.next % self.consumers.len();
            match self.consumers[index].send(envelope) {
                Ok(()) => {
                    self.next = index + 1;
                    return;
                }
                Err(mpsc::error::SendError(returned)) => {
                    self.consumers.remove(index);
                    envelope = returned;
                }
            }
        }
        self.backlog.push_back(envelope);
    }
}

struct QueueBinding {
    exchange: String,
    pattern: String,
    queue: String,
}

struct BrokerState {
    reachable: bool,
    exchanges: HashSet<String>,
    bindings: Vec<QueueBinding>,
    queues: HashMap<String, Queue>,
}

impl Default for BrokerState {
    fn default() -> Self {
        Self {
            reachable: true,
            exchanges: HashSet::new(),
            bindings: Vec::new(),
            queues: HashMap::new(),
        }
    }
}

/// Shared in-process broker. Cloning yields a handle to the same broker.
#[derive(Clone, Default)]
pub struct ChannelBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl ChannelBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the broker going away (or coming back).
    ///
    /// While unreachable, connects and sends fail with `BusError::Connection`.
    pub async fn set_reachable(&self, reachable: bool) {
        self.state.lock().await.reachable = reachable;
    }

    /// Number of queues currently declared.
    pub async fn queue_count(&self) -> usize {
        self.state.lock().await.queues.len()
    }

    pub async fn has_queue(&self, name: &str) -> bool {
        self.state.lock().await.queues.contains_key(name)
    }
}

/// One connection to a `ChannelBroker`.
pub struct ChannelTransport {
    broker: ChannelBroker,
    id: Uuid,
    connected: RwLock<bool>,
}

impl ChannelTransport {
    pub fn new(broker: ChannelBroker) -> Self {
        Self {
            broker,
            id: Uuid::new_v4(),
            connected: RwLock::new(false),
        }
    }

    pub fn broker(&self) -> &ChannelBroker {
        &self.broker
    }

    async fn check_connected(&self) -> Result<()> {
        if *self.connected.read().await {
            Ok(())
        } else {
            Err(BusError::Connection("Transport not connected".to_string()))
        }
    }

    /// Attach a new consumer to `queue`, draining its backlog first.
    fn attach(queue: &mut Queue) -> DeliveryStream {
        let (tx, rx) = mpsc::unbounded_channel();
        for envelope in queue.backlog.drain(..) {
            // Receiver is alive: it is held below.
            let _ = tx.send(envelope);
        }
        queue.consumers.push(tx);
        UnboundedReceiverStream::new(rx).boxed()
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn connect(&self) -> Result<()> {
        if !self.broker.state.lock().await.reachable {
            return Err(BusError::Connection("Broker unreachable".to_string()));
        }
        *self.connected.write().await = true;
        debug!(connection = %self.id, "Channel transport connected");
        Ok(())
    }

    async fn declare_exchanges(&self, exchanges: &[Exchange]) -> Result<()> {
        self.check_connected().await?;
        let mut state = self.broker.state.lock().await;
        for exchange in exchanges {
            state.exchanges.insert(exchange.as_str().to_string());
        }
        Ok(())
    }

    async fn send(&self, envelope: Envelope) -> Result<()> {
        self.check_connected().await?;
        let mut state = self.broker.state.lock().await;
        if !state.reachable {
            return Err(BusError::Connection("Broker unreachable".to_string()));
        }

        if envelope.exchange == DEFAULT_EXCHANGE {
            match state.queues.get_mut(&envelope.routing_key) {
                Some(queue) => queue.deliver(envelope),
                None => debug!(queue = %envelope.routing_key, "Unroutable message dropped"),
            }
            return Ok(());
        }

        if !state.exchanges.contains(&envelope.exchange) {
            return Err(BusError::Publish(format!(
                "Exchange not declared: {}",
                envelope.exchange
            )));
        }

        // A queue bound several times still receives one copy.
        let mut targets: Vec<String> = state
            .bindings
            .iter()
            .filter(|b| b.exchange == envelope.exchange)
            .filter(|b| topic_matches(&b.pattern, &envelope.routing_key))
            .map(|b| b.queue.clone())
            .collect();
        targets.sort();
        targets.dedup();

        if targets.is_empty() {
            debug!(routing_key = %envelope.routing_key, "No queue bound, message dropped");
        }
        for name in targets {
            if let Some(queue) = state.queues.get_mut(&name) {
                queue.deliver(envelope.clone());
            }
        }
        Ok(())
    }

    async fn consume(&self, binding: &Binding) -> Result<DeliveryStream> {
        self.check_connected().await?;
        let mut state = self.broker.state.lock().await;

        let exchange = binding.exchange.as_str();
        if !state.exchanges.contains(exchange) {
            return Err(BusError::Subscribe(format!(
                "Exchange not declared: {}",
                exchange
            )));
        }

        let already_bound = state.bindings.iter().any(|b| {
            b.exchange == exchange && b.pattern == binding.pattern && b.queue == binding.queue
        });
        if !already_bound {
            state.bindings.push(QueueBinding {
                exchange: exchange.to_string(),
                pattern: binding.pattern.clone(),
                queue: binding.queue.clone(),
            });
        }

        let queue = state.queues.entry(binding.queue.clone()).or_default();
        Ok(Self::attach(queue))
    }

    async fn reply_queue(&self) -> Result<(String, DeliveryStream)> {
        self.check_connected().await?;
        let name = format!("amq.gen-{}", Uuid::new_v4());

        let mut state = self.broker.state.lock().await;
        let queue = state.queues.entry(name.clone()).or_insert_with(|| Queue {
            owner: Some(self.id),
            ..Default::default()
        });
        let stream = Self::attach(queue);
        Ok((name, stream))
    }

    async fn close(&self) -> Result<()> {
        *self.connected.write().await = false;

        let mut state = self.broker.state.lock().await;
        let owned: Vec<String> = state
            .queues
            .iter()
            .filter(|(_, q)| q.owner == Some(self.id))
            .map(|(name, _)| name.clone())
            .collect();
        for name in &owned {
            state.queues.remove(name);
        }

        info!(connection = %self.id, deleted_queues = owned.len(), "Channel transport closed");
        Ok(())
    }
}
