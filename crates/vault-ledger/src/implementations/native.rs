//! In-memory native-currency bank.

use crate::{LedgerError, LedgerStore, NativeInterface};
use alloy_primitives::{Address, U256};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use vault_storage::StorageService;

type NativeBalances = BTreeMap<Address, U256>;

/// Native balances held in memory.
#[derive(Default)]
pub struct MemoryNative {
	balances: RwLock<NativeBalances>,
	store: Option<LedgerStore>,
}

impl MemoryNative {
	pub fn new() -> Self {
		Self::default()
	}

	/// Writes every balance change through to `storage`.
	pub fn with_storage(mut self, storage: Arc<StorageService>) -> Self {
		self.store = Some(LedgerStore::new(storage, "native"));
		self
	}

	/// Loads persisted balances. `false` when nothing was stored yet.
	pub async fn restore(&self) -> Result<bool, LedgerError> {
		let Some(store) = &self.store else {
			return Ok(false);
		};
		match store.load::<NativeBalances>().await? {
			Some(persisted) => {
				*self.balances.write().await = persisted;
				Ok(true)
			},
			None => Ok(false),
		}
	}

	async fn commit(
		&self,
		balances: &mut NativeBalances,
		next: NativeBalances,
	) -> Result<(), LedgerError> {
		if let Some(store) = &self.store {
			store.save(&next).await?;
		}
		*balances = next;
		Ok(())
	}

	/// Credits `amount` to `account`, e.g. a plain value transfer into the vault.
	pub async fn credit(&self, account: Address, amount: U256) -> Result<(), LedgerError> {
		let mut balances = self.balances.write().await;
		let credited = balances
			.get(&account)
			.copied()
			.unwrap_or(U256::ZERO)
			.checked_add(amount)
			.ok_or(LedgerError::Overflow)?;
		let mut next = balances.clone();
		next.insert(account, credited);
		self.commit(&mut balances, next).await
	}
}

#[async_trait]
impl NativeInterface for MemoryNative {
	async fn balance_of(&self, account: Address) -> Result<U256, LedgerError> {
		Ok(self
			.balances
			.read()
			.await
			.get(&account)
			.copied()
			.unwrap_or(U256::ZERO))
	}

	async fn transfer(&self, from: Address, to: Address, amount: U256) -> Result<(), LedgerError> {
		if to == Address::ZERO {
			return Err(LedgerError::ZeroRecipient);
		}
		let mut balances = self.balances.write().await;
		let available = balances.get(&from).copied().unwrap_or(U256::ZERO);
		if available < amount {
			return Err(LedgerError::InsufficientBalance {
				requested: amount,
				available,
			});
		}
		let credited = balances
			.get(&to)
			.copied()
			.unwrap_or(U256::ZERO)
			.checked_add(amount)
			.ok_or(LedgerError::Overflow)?;
		if from == to {
			return Ok(());
		}

		let mut next = balances.clone();
		next.insert(from, available - amount);
		next.insert(to, credited);
		self.commit(&mut balances, next).await
	}
}
