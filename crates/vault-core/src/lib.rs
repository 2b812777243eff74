//! Core of the signature-authorized custodial vault.
//!
//! The vault holds a single fungible token for many depositors and releases
//! funds only against an EIP-712 authorization signed by a trusted off-chain
//! signer. This crate provides the authorization verifier, the withdrawal
//! state machine with its per-account nonce ledger, the deposit path, the
//! owner-gated administrative operations, and a builder that wires all of it
//! from configuration.

pub mod builder;
pub mod clock;
pub mod engine;
pub mod error;
pub mod guard;
pub mod state;
pub mod verifier;

pub use builder::{BuilderError, BuiltVault, VaultBuilder, VaultFactories};
pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{event_bus::EventBus, Vault, VaultService};
pub use error::VaultError;
pub use guard::{GuardHandle, ReentrancyGuard};
pub use state::{VaultState, VaultStore};
pub use verifier::AuthorizationVerifier;
