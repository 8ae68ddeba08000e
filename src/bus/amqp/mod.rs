//! AMQP (RabbitMQ) transport implementation.
//!
//! Uses durable topic exchanges for commands and events, durable named queues
//! for subscriptions, and a server-named exclusive queue for replies. Requests
//! carry the standard `correlation_id` and `reply_to` message properties.

use async_trait::async_trait;
use futures::StreamExt;
use lapin::{
    options::{
        BasicConsumeOptions, BasicPublishOptions, ConfirmSelectOptions, ExchangeDeclareOptions,
        QueueBindOptions, QueueDeclareOptions,
    },
    types::FieldTable,
    BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind,
};
use tokio::sync::RwLock;
use tracing::{debug, error, info};

use super::{Binding, BusError, DeliveryStream, Envelope, Result, Transport};
use crate::topology::Exchange;

/// Content type of every message body.
const CONTENT_TYPE: &str = "application/json";

/// Consumer tag prefix for subscriptions.
const CONSUMER_TAG: &str = "stocksync-consumer";

/// Open connection plus the channel used for publishing.
struct Session {
    connection: Connection,
    publish_channel: Channel,
}

/// AMQP transport using RabbitMQ.
///
/// One connection is shared by every operation; consumers get their own
/// channel so a slow handler never stalls publishing.
pub struct AmqpTransport {
    url: String,
    session: RwLock<Option<Session>>,
}

impl AmqpTransport {
    /// Create a transport. No connection is made until `connect`.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            session: RwLock::new(None),
        }
    }

    async fn publish_channel(&self) -> Result<Channel> {
        self.session
            .read()
            .await
            .as_ref()
            .map(|s| s.publish_channel.clone())
            .ok_or_else(|| BusError::Connection("AMQP transport not connected".to_string()))
    }

    /// Fresh channel for a consumer.
    async fn consumer_channel(&self) -> Result<Channel> {
        let session = self.session.read().await;
        let session = session
            .as_ref()
            .ok_or_else(|| BusError::Connection("AMQP transport not connected".to_string()))?;
        session
            .connection
            .create_channel()
            .await
            .map_err(|e| BusError::Connection(format!("Failed to create channel: {}", e)))
    }

    fn properties(envelope: &Envelope) -> BasicProperties {
        let mut properties = BasicProperties::default().with_content_type(CONTENT_TYPE.into());
        if let Some(correlation_id) = &envelope.correlation_id {
            properties = properties.with_correlation_id(correlation_id.as_str().into());
        }
        if let Some(reply_to) = &envelope.reply_to {
            properties = properties.with_reply_to(reply_to.as_str().into());
        }
        properties
    }

    /// Turn a consumer into a delivery stream. Deliveries are auto-acked: a
    /// message whose handler fails is not redelivered.
    fn into_stream(consumer: lapin::Consumer, queue: String) -> DeliveryStream {
        consumer
            .filter_map(move |delivery| {
                let queue = queue.clone();
                async move {
                    match delivery {
                        Ok(delivery) => Some(Envelope {
                            exchange: delivery.exchange.to_string(),
                            routing_key: delivery.routing_key.to_string(),
                            correlation_id: delivery
                                .properties
                                .correlation_id()
                                .as_ref()
                                .map(|id| id.to_string()),
                            reply_to: delivery
                                .properties
                                .reply_to()
                                .as_ref()
                                .map(|q| q.to_string()),
                            payload: delivery.data,
                        }),
                        Err(e) => {
                            error!(queue = %queue, error = %e, "Consumer delivery error");
                            None
                        }
                    }
                }
            })
            .boxed()
    }
}

#[async_trait]
impl Transport for AmqpTransport {
    async fn connect(&self) -> Result<()> {
        let mut session = self.session.write().await;
        if session.is_some() {
            return Ok(());
        }

        let connection = Connection::connect(&self.url, ConnectionProperties::default())
            .await
            .map_err(|e| BusError::Connection(format!("Failed to connect: {}", e)))?;

        let publish_channel = connection
            .create_channel()
            .await
            .map_err(|e| BusError::Connection(format!("Failed to create channel: {}", e)))?;

        publish_channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(|e| BusError::Connection(format!("Failed to enable confirms: {}", e)))?;

        info!(url = %self.url, "Connected to AMQP");

        *session = Some(Session {
            connection,
            publish_channel,
        });
        Ok(())
    }

    async fn declare_exchanges(&self, exchanges: &[Exchange]) -> Result<()> {
        let channel = self.publish_channel().await?;
        for exchange in exchanges {
            channel
                .exchange_declare(
                    exchange.as_str(),
                    ExchangeKind::Topic,
                    ExchangeDeclareOptions {
                        durable: true,
                        ..Default::default()
                    },
                    FieldTable::default(),
                )
                .await
                .map_err(|e| {
                    BusError::Connection(format!("Failed to declare exchange: {}", e))
                })?;
            debug!(exchange = %exchange, "Declared exchange");
        }
        Ok(())
    }

    async fn send(&self, envelope: Envelope) -> Result<()> {
        let channel = self.publish_channel().await?;
        let properties = Self::properties(&envelope);

        let confirm = channel
            .basic_publish(
                &envelope.exchange,
                &envelope.routing_key,
                BasicPublishOptions::default(),
                &envelope.payload,
                properties,
            )
            .await
            .map_err(|e| BusError::Publish(format!("Failed to publish: {}", e)))?;

        confirm
            .await
            .map_err(|e| BusError::Publish(format!("Publish confirmation failed: {}", e)))?;

        debug!(
            exchange = %envelope.exchange,
            routing_key = %envelope.routing_key,
            "Published message"
        );
        Ok(())
    }

    async fn consume(&self, binding: &Binding) -> Result<DeliveryStream> {
        let channel = self.consumer_channel().await?;

        channel
            .queue_declare(
                &binding.queue,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| BusError::Subscribe(format!("Failed to declare queue: {}", e)))?;

        channel
            .queue_bind(
                &binding.queue,
                binding.exchange.as_str(),
                &binding.pattern,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| BusError::Subscribe(format!("Failed to bind queue: {}", e)))?;

        let consumer = channel
            .basic_consume(
                &binding.queue,
                CONSUMER_TAG,
                BasicConsumeOptions {
                    no_ack: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| BusError::Subscribe(format!("Failed to start consumer: {}", e)))?;

        info!(
            queue = %binding.queue,
            routing_key = %binding.pattern,
            "Bound queue to exchange"
        );

        Ok(Self::into_stream(consumer, binding.queue.clone()))
    }

    async fn reply_queue(&self) -> Result<(String, DeliveryStream)> {
        let channel = self.consumer_channel().await?;

        // Empty name: the server picks a unique `amq.gen-*` name.
        let queue = channel
            .queue_declare(
                "",
                QueueDeclareOptions {
                    exclusive: true,
                    auto_delete: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| BusError::Subscribe(format!("Failed to declare reply queue: {}", e)))?;
        let name = queue.name().to_string();

        let consumer = channel
            .basic_consume(
                &name,
                "stocksync-replies",
                BasicConsumeOptions {
                    no_ack: true,
                    exclusive: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| BusError::Subscribe(format!("Failed to consume reply queue: {}", e)))?;

        debug!(reply_queue = %name, "Declared reply queue");
        Ok((name.clone(), Self::into_stream(consumer, name)))
    }

    async fn close(&self) -> Result<()> {
        if let Some(session) = self.session.write().await.take() {
            session
                .connection
                .close(200, "Shutdown")
                .await
                .map_err(|e| BusError::Connection(format!("Failed to close connection: {}", e)))?;
            info!(url = %self.url, "AMQP connection closed");
        }
        Ok(())
    }
}
