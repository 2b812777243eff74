//! External account ledgers consumed by the vault.
//!
//! The vault never tracks token balances itself. It reads and moves funds
//! through a fungible-token ledger (`transfer`, `transfer_from`,
//! `balance_of`) and a native-currency bank, and asks the contract registry
//! whether an address holds deployed code before accepting it as the
//! custodial token.
//!
//! The in-memory ledgers can write every change through to a
//! [`StorageService`], so balances survive a restart together with the
//! vault's own state.

use alloy_primitives::{Address, U256};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use vault_storage::StorageService;
use vault_types::StorageKey;

/// Re-export implementations
pub mod implementations {
	pub mod memory;
	pub mod native;
}

/// Errors raised by ledger implementations.
///
/// Any of these aborts the enclosing vault operation; the vault does not
/// retry.
#[derive(Debug, Error)]
pub enum LedgerError {
	#[error("Insufficient balance: requested {requested}, available {available}")]
	InsufficientBalance { requested: U256, available: U256 },
	#[error("Insufficient allowance: requested {requested}, allowed {allowed}")]
	InsufficientAllowance { requested: U256, allowed: U256 },
	#[error("Transfer to the zero address")]
	ZeroRecipient,
	#[error("Arithmetic overflow")]
	Overflow,
	#[error("Ledger call failed: {0}")]
	CallFailed(String),
	#[error("Ledger storage error: {0}")]
	Storage(String),
}

/// One persisted ledger record under the `ledger` storage namespace.
#[derive(Clone)]
pub struct LedgerStore {
	storage: Arc<StorageService>,
	id: String,
}

impl LedgerStore {
	pub fn new(storage: Arc<StorageService>, id: impl Into<String>) -> Self {
		Self {
			storage,
			id: id.into(),
		}
	}

	pub async fn load<T: DeserializeOwned>(&self) -> Result<Option<T>, LedgerError> {
		self.storage
			.retrieve_optional(StorageKey::Ledger.as_str(), &self.id)
			.await
			.map_err(|e| LedgerError::Storage(e.to_string()))
	}

	pub async fn save<T: Serialize + Sync>(&self, value: &T) -> Result<(), LedgerError> {
		self.storage
			.store(StorageKey::Ledger.as_str(), &self.id, value)
			.await
			.map_err(|e| LedgerError::Storage(e.to_string()))
	}
}

/// A fungible-token ledger.
///
/// `transfer` and `transfer_from` report success with `Ok(true)`. Both an
/// explicit `Ok(false)` and an `Err` are failures for the caller.
#[async_trait]
pub trait LedgerInterface: Send + Sync {
	/// Address the token contract is deployed at.
	fn address(&self) -> Address;

	/// Balance held by `account`.
	async fn balance_of(&self, account: Address) -> Result<U256, LedgerError>;

	/// Moves `amount` from `from` (the calling account) to `to`.
	async fn transfer(&self, from: Address, to: Address, amount: U256)
		-> Result<bool, LedgerError>;

	/// Moves `amount` from `from` to `to` on behalf of `spender`, consuming
	/// `spender`'s allowance.
	async fn transfer_from(
		&self,
		spender: Address,
		from: Address,
		to: Address,
		amount: U256,
	) -> Result<bool, LedgerError>;
}

/// The native currency of the chain.
#[async_trait]
pub trait NativeInterface: Send + Sync {
	async fn balance_of(&self, account: Address) -> Result<U256, LedgerError>;

	async fn transfer(&self, from: Address, to: Address, amount: U256)
		-> Result<(), LedgerError>;
}

/// Addresses that hold deployed token contracts.
///
/// Used to reject custodial token addresses with no code behind them.
#[derive(Default, Clone)]
pub struct ContractRegistry {
	contracts: Arc<RwLock<HashMap<Address, Arc<dyn LedgerInterface>>>>,
}

impl ContractRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Deploys `ledger` at its own address, replacing any previous contract.
	pub async fn register(&self, ledger: Arc<dyn LedgerInterface>) {
		let address = ledger.address();
		self.contracts.write().await.insert(address, ledger);
		tracing::debug!(contract = %address, "Registered token contract");
	}

	/// Whether `address` holds deployed code.
	pub async fn has_code(&self, address: &Address) -> bool {
		self.contracts.read().await.contains_key(address)
	}

	/// Returns the ledger deployed at `address`, if any.
	pub async fn ledger_at(&self, address: &Address) -> Option<Arc<dyn LedgerInterface>> {
		self.contracts.read().await.get(address).cloned()
	}
}
