//! Builder for constructing a vault from configuration.
//!
//! Storage and signing accounts are pluggable: each configured
//! implementation is created through the factory registered under its name.
//! The token ledger and native bank are in-memory, written through to the
//! same storage, and seeded from the `[ledger]` section only on first start.

use crate::clock::{Clock, SystemClock};
use crate::engine::{event_bus::EventBus, Vault, VaultService};
use crate::state::{VaultState, VaultStore};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use vault_account::{AccountError, AccountInterface, AccountService};
use vault_config::Config;
use vault_ledger::{
	implementations::{memory::MemoryLedger, native::MemoryNative},
	ContractRegistry,
};
use vault_storage::{StorageError, StorageInterface, StorageService};

/// Errors that can occur during vault construction.
#[derive(Debug, Error)]
pub enum BuilderError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Missing required component: {0}")]
	MissingComponent(String),
}

/// Factory functions keyed by implementation name.
pub struct VaultFactories<SF, AF> {
	pub storage_factories: HashMap<String, SF>,
	pub account_factories: HashMap<String, AF>,
}

/// A fully wired vault together with the ledgers it was built on.
pub struct BuiltVault {
	pub service: Arc<VaultService>,
	pub ledger: Arc<MemoryLedger>,
	pub native: Arc<MemoryNative>,
}

/// Builds a [`Vault`] from a [`Config`].
pub struct VaultBuilder {
	config: Config,
	clock: Arc<dyn Clock>,
}

impl VaultBuilder {
	pub fn new(config: Config) -> Self {
		Self {
			config,
			clock: Arc::new(SystemClock),
		}
	}

	/// Replaces the wall clock, e.g. with a manual clock in tests.
	pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = clock;
		self
	}

	/// Creates the primary storage backend.
	fn build_storage<SF>(
		&self,
		storage_factories: &HashMap<String, SF>,
	) -> Result<StorageService, BuilderError>
	where
		SF: Fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>,
	{
		let primary = &self.config.storage.primary;
		let config = self
			.config
			.storage
			.implementations
			.get(primary)
			.ok_or_else(|| {
				BuilderError::Config(format!(
					"Primary storage '{}' not found in implementations",
					primary
				))
			})?;
		let factory = storage_factories.get(primary).ok_or_else(|| {
			BuilderError::MissingComponent(format!("storage implementation '{}'", primary))
		})?;

		match factory(config) {
			Ok(backend) => {
				tracing::info!(component = "storage", implementation = %primary, "Loaded");
				Ok(StorageService::new(backend))
			},
			Err(e) => {
				tracing::error!(
					component = "storage",
					implementation = %primary,
					error = %e,
					"Failed to create storage implementation"
				);
				Err(BuilderError::Config(format!(
					"Failed to create storage implementation '{}': {}",
					primary, e
				)))
			},
		}
	}

	/// Deploys the in-memory token ledger on `storage`.
	///
	/// Persisted balances win. The `[ledger]` seed (balances and vault
	/// approvals) is applied only the first time a store is used, so a
	/// restart never mints again.
	async fn build_ledger(
		&self,
		storage: &Arc<StorageService>,
	) -> Result<Arc<MemoryLedger>, BuilderError> {
		let ledger_config = &self.config.ledger;
		let ledger =
			Arc::new(MemoryLedger::new(ledger_config.address).with_storage(storage.clone()));
		let restored = ledger
			.restore()
			.await
			.map_err(|e| BuilderError::Config(e.to_string()))?;

		if !restored {
			let balances = ledger_config
				.parsed_balances()
				.map_err(|e| BuilderError::Config(e.to_string()))?;
			for (account, amount) in balances {
				ledger.mint(account, amount).await.map_err(|e| {
					BuilderError::Config(format!("Failed to fund {}: {}", account, e))
				})?;
				if ledger_config.approve_vault {
					ledger
						.approve(account, self.config.vault.address, amount)
						.await
						.map_err(|e| BuilderError::Config(e.to_string()))?;
				}
			}
		}

		tracing::info!(
			component = "ledger",
			address = %ledger_config.address,
			restored,
			"Loaded"
		);
		Ok(ledger)
	}

	/// Creates the native bank on `storage`, crediting the configured vault
	/// balance only on first use.
	async fn build_native(
		&self,
		storage: &Arc<StorageService>,
	) -> Result<Arc<MemoryNative>, BuilderError> {
		let native = Arc::new(MemoryNative::new().with_storage(storage.clone()));
		let restored = native
			.restore()
			.await
			.map_err(|e| BuilderError::Config(e.to_string()))?;
		if !restored {
			let native_balance = self
				.config
				.ledger
				.parsed_native_balance()
				.map_err(|e| BuilderError::Config(e.to_string()))?;
			native
				.credit(self.config.vault.address, native_balance)
				.await
				.map_err(|e| BuilderError::Config(e.to_string()))?;
		}
		Ok(native)
	}

	/// Builds the vault, restoring any previously persisted state.
	pub async fn build<SF, AF>(
		self,
		factories: VaultFactories<SF, AF>,
	) -> Result<BuiltVault, BuilderError>
	where
		SF: Fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>,
		AF: Fn(&toml::Value) -> Result<Box<dyn AccountInterface>, AccountError>,
	{
		let storage = Arc::new(self.build_storage(&factories.storage_factories)?);
		let ledger = self.build_ledger(&storage).await?;

		let contracts = ContractRegistry::new();
		contracts.register(ledger.clone()).await;

		let native = self.build_native(&storage).await?;

		let vault_config = &self.config.vault;
		let store = VaultStore::new(storage);
		let (state, events) = store
			.load(self.initial_state())
			.await
			.map_err(|e| BuilderError::Config(e.to_string()))?;

		if let Some(token) = state.token {
			if !contracts.has_code(&token).await {
				return Err(BuilderError::Config(format!(
					"Persisted token contract {} is not deployed",
					token
				)));
			}
		}

		let vault = Vault::new(
			vault_config.domain(),
			state,
			events,
			contracts,
			native.clone(),
			self.clock.clone(),
			store,
			EventBus::default(),
		)
		.map_err(|e| BuilderError::Config(e.to_string()))?;

		tracing::info!(
			component = "vault",
			address = %vault.address(),
			chain_id = vault.domain().chain_id,
			domain_separator = %vault.domain_separator(),
			"Loaded"
		);

		Ok(BuiltVault {
			service: Arc::new(VaultService::new(Arc::new(vault))),
			ledger,
			native,
		})
	}

	fn initial_state(&self) -> VaultState {
		let vault_config = &self.config.vault;
		VaultState::new(vault_config.owner, vault_config.signer, vault_config.token)
	}

	/// Reads the vault state from storage without deploying the ledgers or
	/// the vault. Falls back to the configured values when nothing is stored.
	pub async fn load_state<SF>(
		&self,
		storage_factories: &HashMap<String, SF>,
	) -> Result<VaultState, BuilderError>
	where
		SF: Fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>,
	{
		let store = VaultStore::new(Arc::new(self.build_storage(storage_factories)?));
		let (state, _) = store
			.load(self.initial_state())
			.await
			.map_err(|e| BuilderError::Config(e.to_string()))?;
		Ok(state)
	}

	/// Creates the primary signing account, if one is configured.
	pub fn build_account<AF>(
		&self,
		account_factories: &HashMap<String, AF>,
	) -> Result<Option<AccountService>, BuilderError>
	where
		AF: Fn(&toml::Value) -> Result<Box<dyn AccountInterface>, AccountError>,
	{
		let Some(account_config) = &self.config.account else {
			return Ok(None);
		};
		let primary = &account_config.primary;
		let config = account_config.implementations.get(primary).ok_or_else(|| {
			BuilderError::Config(format!(
				"Primary account '{}' not found in implementations",
				primary
			))
		})?;
		let factory = account_factories.get(primary).ok_or_else(|| {
			BuilderError::MissingComponent(format!("account implementation '{}'", primary))
		})?;

		let implementation = factory(config).map_err(|e| {
			tracing::error!(
				component = "account",
				implementation = %primary,
				error = %e,
				"Failed to create account implementation"
			);
			BuilderError::Config(format!(
				"Failed to create account implementation '{}': {}",
				primary, e
			))
		})?;
		tracing::info!(component = "account", implementation = %primary, "Loaded");
		Ok(Some(AccountService::new(implementation)))
	}
}
