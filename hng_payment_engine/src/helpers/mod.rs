mod hmac_signature;
mod order_number;

pub use hmac_signature::{hmac_sha256_hex, verify_hmac_sha256, SignatureValidationError};
pub use order_number::{format_order_number, parse_order_number, ORDER_NUMBER_PREFIX};
