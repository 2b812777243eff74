//! Utility functions for common type conversions and transformations.

pub mod conversion;
pub mod eip712;
pub mod formatting;
pub mod helpers;

pub use conversion::{decode_signature, parse_address, parse_amount};
pub use eip712::{compute_domain_hash, compute_final_digest, Eip712AbiEncoder, DOMAIN_TYPE};
pub use formatting::{truncate_id, without_0x_prefix};
pub use helpers::current_timestamp;
