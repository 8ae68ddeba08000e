//! Shared utilities.

pub mod bootstrap;
pub mod product_code;
pub mod retry;
