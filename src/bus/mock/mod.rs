//! Mock broker implementation for testing.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::RwLock;

use super::{Broker, BusError, MessageHandler, Result};
use crate::topology::{Exchange, RoutingKey};

/// Scripted outcome of a mocked request.
#[derive(Debug, Clone)]
pub enum MockReply {
    Payload(Vec<u8>),
    TimedOut,
    Unavailable,
}

impl MockReply {
    /// Reply with a JSON-serialized body.
    pub fn json<T: Serialize>(body: &T) -> Self {
        MockReply::Payload(serde_json::to_vec(body).unwrap_or_default())
    }
}

/// Whether a call expected a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Publish,
    Request,
}

/// A call made against the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub kind: CallKind,
    pub routing_key: RoutingKey,
    pub payload: Vec<u8>,
}

impl RecordedCall {
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.payload)?)
    }
}

/// Mock broker for testing.
///
/// Requests are answered from per-routing-key reply queues; a request with no
/// scripted reply times out.
#[derive(Default)]
pub struct MockBroker {
    calls: RwLock<Vec<RecordedCall>>,
    replies: RwLock<HashMap<RoutingKey, VecDeque<MockReply>>>,
    fail_on_publish: RwLock<bool>,
}

impl MockBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply for the next request on `routing_key`.
    pub async fn push_reply(&self, routing_key: RoutingKey, reply: MockReply) {
        self.replies
            .write()
            .await
            .entry(routing_key)
            .or_default()
            .push_back(reply);
    }

    pub async fn set_fail_on_publish(&self, fail: bool) {
        *self.fail_on_publish.write().await = fail;
    }

    pub async fn calls(&self) -> Vec<RecordedCall> {
        self.calls.read().await.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.calls.read().await.len()
    }

    /// Calls made on one routing key, in order.
    pub async fn calls_for(&self, routing_key: RoutingKey) -> Vec<RecordedCall> {
        self.calls
            .read()
            .await
            .iter()
            .filter(|c| c.routing_key == routing_key)
            .cloned()
            .collect()
    }

    async fn record(&self, kind: CallKind, routing_key: RoutingKey, payload: Vec<u8>) {
        self.calls.write().await.push(RecordedCall {
            kind,
            routing_key,
            payload,
        });
    }
}

#[async_trait]
impl Broker for MockBroker {
    async fn publish(
        &self,
        _exchange: Exchange,
        routing_key: RoutingKey,
        payload: Vec<u8>,
    ) -> Result<()> {
        if *self.fail_on_publish.read().await {
            return Err(BusError::Connection("Mock publish failure".to_string()));
        }
        self.record(CallKind::Publish, routing_key, payload).await;
        Ok(())
    }

    async fn subscribe(
        &self,
        _exchange: Exchange,
        _pattern: &str,
        _handler: Arc<dyn MessageHandler>,
    ) -> Result<()> {
        Err(BusError::Subscribe(
            "Subscribe not supported by MockBroker".to_string(),
        ))
    }

    async fn publish_with_response(
        &self,
        _exchange: Exchange,
        routing_key: RoutingKey,
        payload: Vec<u8>,
        timeout: Duration,
    ) -> Result<Vec<u8>> {
        self.record(CallKind::Request, routing_key, payload).await;

        let reply = self
            .replies
            .write()
            .await
            .get_mut(&routing_key)
            .and_then(|queue| queue.pop_front());

        match reply {
            Some(MockReply::Payload(payload)) => Ok(payload),
            Some(MockReply::Unavailable) => {
                Err(BusError::Connection("Mock broker unavailable".to_string()))
            }
            Some(MockReply::TimedOut) | None => Err(BusError::TimedOut {
                routing_key: routing_key.to_string(),
                timeout,
            }),
        }
    }
}
