//! Broker topology shared by the inventory and order services.
//!
//! Exchange names and routing keys are a closed enumeration. Both services
//! resolve every key through this module, so a renamed key is a compile error
//! on both sides instead of a silently unroutable message.

use std::fmt;
use std::str::FromStr;

/// Topic exchanges declared on connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Exchange {
    /// Stock commands and stock-change events.
    Inventory,
}

impl Exchange {
    /// Every exchange the services rely on.
    pub const ALL: [Exchange; 1] = [Exchange::Inventory];

    pub fn as_str(&self) -> &'static str {
        match self {
            Exchange::Inventory => "inventory",
        }
    }
}

impl fmt::Display for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Routing keys carried on the inventory exchange.
///
/// Command keys expect a reply; event keys are fire-and-forget and double as
/// the human-readable event category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoutingKey {
    StockCheck,
    StockDeduct,
    StockRelease,
    StockAdded,
    StockReduced,
}

impl RoutingKey {
    pub const ALL: [RoutingKey; 5] = [
        RoutingKey::StockCheck,
        RoutingKey::StockDeduct,
        RoutingKey::StockRelease,
        RoutingKey::StockAdded,
        RoutingKey::StockReduced,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RoutingKey::StockCheck => "inventory.stock.check",
            RoutingKey::StockDeduct => "inventory.stock.deduct",
            RoutingKey::StockRelease => "inventory.stock.release",
            RoutingKey::StockAdded => "inventory.stock.added",
            RoutingKey::StockReduced => "inventory.stock.reduced",
        }
    }

    /// Exchange the key is published on.
    pub fn exchange(&self) -> Exchange {
        Exchange::Inventory
    }

    /// True for request/response commands, false for events.
    pub fn is_command(&self) -> bool {
        matches!(
            self,
            RoutingKey::StockCheck | RoutingKey::StockDeduct | RoutingKey::StockRelease
        )
    }
}

impl fmt::Display for RoutingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when an inbound routing key is not part of the topology.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown routing key: {0}")]
pub struct UnknownRoutingKey(pub String);

impl FromStr for RoutingKey {
    type Err = UnknownRoutingKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RoutingKey::ALL
            .into_iter()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| UnknownRoutingKey(s.to_string()))
    }
}

/// Binding pattern matching every stock key, commands included.
///
/// Event consumers skip keys where `is_command()` holds.
pub const STOCK_PATTERN: &str = "inventory.stock.#";

/// Check if a routing key matches an AMQP topic binding pattern.
///
/// Matching rules:
/// - Words are separated by `.`
/// - `*` matches exactly one word
/// - `#` matches zero or more words
pub fn topic_matches(pattern: &str, routing_key: &str) -> bool {
    let pattern: Vec<&str> = pattern.split('.').collect();
    let key: Vec<&str> = routing_key.split('.').collect();
    words_match(&pattern, &key)
}

fn words_match(pattern: &[&str], key: &[&str]) -> bool {
    match pattern.split_first() {
        None => key.is_empty(),
        Some((&"#", rest)) => (0..=key.len()).any(|skip| words_match(rest, &key[skip..])),
        Some((&word, rest)) => match key.split_first() {
            Some((&first, key_rest)) if word == "*" || word == first => {
                words_match(rest, key_rest)
            }
            _ => false,
        },
    }
}

/// Durable queue name for a service consuming a binding pattern.
///
/// Instances of the same service share the queue and compete for messages.
pub fn queue_name(service: &str, pattern: &str) -> String {
    format!("{}.{}", service, pattern)
}
