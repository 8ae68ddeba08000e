//! Stocksync - order and inventory coordination over a message broker
//!
//! The inventory service owns stock levels and answers check, deduct and
//! release commands. The order service places orders by asking it over
//! request/response messaging and persists only confirmed orders.

pub mod bus;
pub mod config;
pub mod domain;
pub mod handlers;
pub mod services;
pub mod storage;
pub mod topology;
pub mod utils;
