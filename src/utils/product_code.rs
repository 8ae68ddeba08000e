//! Product code generation.

use rand::Rng;

/// Prefix of generated product codes.
pub const PRODUCT_CODE_PREFIX: &str = "INV-";

const CODE_SPACE: u32 = 1_000_000_000;

/// Source of candidate product codes. Uniqueness is checked by the store.
pub trait ProductCodeGenerator: Send + Sync {
    fn generate(&self) -> String;
}

/// `INV-` followed by nine random zero-padded digits.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomProductCodes;

impl ProductCodeGenerator for RandomProductCodes {
    fn generate(&self) -> String {
        format_product_code(rand::rng().random_range(0..CODE_SPACE))
    }
}

/// Format a number as a product code (`INV-000000042`).
pub fn format_product_code(n: u32) -> String {
    format!("{}{:09}", PRODUCT_CODE_PREFIX, n % CODE_SPACE)
}
