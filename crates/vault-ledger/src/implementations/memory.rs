//! In-memory fungible-token ledger.
//!
//! Behaves like a plain ERC-20: balances, allowances, and `transfer_from`
//! consuming the spender's allowance. Failures surface as errors rather
//! than `false` returns.
//!
//! With a store attached, each change is applied to a copy of the balances,
//! written through, and only then made visible. A failed write leaves the
//! ledger untouched.

use crate::{LedgerError, LedgerInterface, LedgerStore};
use alloy_primitives::{Address, U256};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use vault_storage::StorageService;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct Balances {
	balances: BTreeMap<Address, U256>,
	/// owner -> spender -> remaining allowance
	allowances: BTreeMap<Address, BTreeMap<Address, U256>>,
}

impl Balances {
	fn balance(&self, account: &Address) -> U256 {
		self.balances.get(account).copied().unwrap_or(U256::ZERO)
	}

	fn allowance(&self, owner: &Address, spender: &Address) -> U256 {
		self.allowances
			.get(owner)
			.and_then(|spenders| spenders.get(spender))
			.copied()
			.unwrap_or(U256::ZERO)
	}

	fn move_funds(&mut self, from: Address, to: Address, amount: U256) -> Result<(), LedgerError> {
		if to == Address::ZERO {
			return Err(LedgerError::ZeroRecipient);
		}
		let available = self.balance(&from);
		if available < amount {
			return Err(LedgerError::InsufficientBalance {
				requested: amount,
				available,
			});
		}
		let credited = self
			.balance(&to)
			.checked_add(amount)
			.ok_or(LedgerError::Overflow)?;

		if from != to {
			self.balances.insert(from, available - amount);
			self.balances.insert(to, credited);
		}
		Ok(())
	}
}

/// ERC-20 style token held entirely in memory.
pub struct MemoryLedger {
	address: Address,
	state: RwLock<Balances>,
	store: Option<LedgerStore>,
}

impl MemoryLedger {
	pub fn new(address: Address) -> Self {
		Self {
			address,
			state: RwLock::new(Balances::default()),
			store: None,
		}
	}

	/// Writes every balance and allowance change through to `storage`.
	pub fn with_storage(mut self, storage: Arc<StorageService>) -> Self {
		self.store = Some(LedgerStore::new(storage, format!("token-{}", self.address)));
		self
	}

	/// Loads the persisted balances, if any. Returns `false` when nothing
	/// has been stored for this token yet.
	pub async fn restore(&self) -> Result<bool, LedgerError> {
		let Some(store) = &self.store else {
			return Ok(false);
		};
		match store.load::<Balances>().await? {
			Some(persisted) => {
				tracing::info!(
					token = %self.address,
					accounts = persisted.balances.len(),
					"Restored token balances"
				);
				*self.state.write().await = persisted;
				Ok(true)
			},
			None => Ok(false),
		}
	}

	/// Applies `change` to a copy of the balances, persists the copy, then
	/// swaps it in.
	async fn update<T, F>(&self, change: F) -> Result<T, LedgerError>
	where
		F: FnOnce(&mut Balances) -> Result<T, LedgerError> + Send,
		T: Send,
	{
		let mut state = self.state.write().await;
		let mut next = state.clone();
		let output = change(&mut next)?;
		if let Some(store) = &self.store {
			store.save(&next).await?;
		}
		*state = next;
		Ok(output)
	}

	/// Creates `amount` new tokens for `account`.
	pub async fn mint(&self, account: Address, amount: U256) -> Result<(), LedgerError> {
		self.update(|state| {
			let balance = state
				.balance(&account)
				.checked_add(amount)
				.ok_or(LedgerError::Overflow)?;
			state.balances.insert(account, balance);
			Ok(())
		})
		.await?;
		tracing::debug!(token = %self.address, account = %account, amount = %amount, "Minted");
		Ok(())
	}

	/// Sets the amount `spender` may move out of `owner`'s balance.
	pub async fn approve(
		&self,
		owner: Address,
		spender: Address,
		amount: U256,
	) -> Result<(), LedgerError> {
		self.update(|state| {
			state
				.allowances
				.entry(owner)
				.or_default()
				.insert(spender, amount);
			Ok(())
		})
		.await
	}

	pub async fn allowance(&self, owner: Address, spender: Address) -> U256 {
		self.state.read().await.allowance(&owner, &spender)
	}
}

#[async_trait]
impl LedgerInterface for MemoryLedger {
	fn address(&self) -> Address {
		self.address
	}

	async fn balance_of(&self, account: Address) -> Result<U256, LedgerError> {
		Ok(self.state.read().await.balance(&account))
	}

	async fn transfer(
		&self,
		from: Address,
		to: Address,
		amount: U256,
	) -> Result<bool, LedgerError> {
		self.update(|state| state.move_funds(from, to, amount))
			.await?;
		Ok(true)
	}

	async fn transfer_from(
		&self,
		spender: Address,
		from: Address,
		to: Address,
		amount: U256,
	) -> Result<bool, LedgerError> {
		self.update(|state| {
			let allowed = state.allowance(&from, &spender);
			if allowed < amount {
				return Err(LedgerError::InsufficientAllowance {
					requested: amount,
					allowed,
				});
			}
			state.move_funds(from, to, amount)?;
			state
				.allowances
				.entry(from)
				.or_default()
				.insert(spender, allowed - amount);
			Ok(())
		})
		.await?;
		Ok(true)
	}
}
