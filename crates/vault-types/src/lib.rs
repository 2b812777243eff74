//! Common types for the custodial vault workspace.
//!
//! Shared data types, the EIP-712 authorization schema, audit events,
//! configuration validation and HTTP API bodies used across the vault crates.

/// API types for HTTP endpoints and request/response structures.
pub mod api;
/// Withdrawal authorization schema and EIP-712 domain.
pub mod authorization;
/// Audit records emitted by the vault.
pub mod events;
/// Registry trait for pluggable implementations.
pub mod registry;
/// Storage namespaces.
pub mod storage;
/// Utility functions for hashing, parsing and formatting.
pub mod utils;
/// Configuration validation types for ensuring type-safe configurations.
pub mod validation;

pub use alloy_primitives::{Address, B256, U256};
pub use api::*;
pub use authorization::{
	CallAction, CallAuthorization, VaultDomain, WithdrawAuthorization, CALL_TYPE, SIGNATURE_LENGTH,
	WITHDRAW_TYPE,
};
pub use events::*;
pub use registry::ImplementationRegistry;
pub use storage::*;
pub use utils::{current_timestamp, truncate_id, without_0x_prefix};
pub use validation::*;
