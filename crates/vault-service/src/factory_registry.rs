//! Factory registry for pluggable vault implementations.
//!
//! Collects the storage and account factories every crate registers, and
//! picks the ones the configuration names.

use std::collections::HashMap;
use std::sync::OnceLock;
use vault_account::{AccountFactory, AccountService};
use vault_config::Config;
use vault_core::{BuiltVault, VaultBuilder, VaultFactories, VaultState};
use vault_storage::StorageFactory;

/// Global registry for all implementation factories
pub struct FactoryRegistry {
	pub storage: HashMap<String, StorageFactory>,
	pub account: HashMap<String, AccountFactory>,
}

impl FactoryRegistry {
	pub fn new() -> Self {
		Self {
			storage: HashMap::new(),
			account: HashMap::new(),
		}
	}

	pub fn register_storage(&mut self, name: impl Into<String>, factory: StorageFactory) {
		self.storage.insert(name.into(), factory);
	}

	pub fn register_account(&mut self, name: impl Into<String>, factory: AccountFactory) {
		self.account.insert(name.into(), factory);
	}
}

static REGISTRY: OnceLock<FactoryRegistry> = OnceLock::new();

/// Returns the global registry, populating it on first use.
pub fn get_registry() -> &'static FactoryRegistry {
	REGISTRY.get_or_init(|| {
		let mut registry = FactoryRegistry::new();

		for (name, factory) in vault_storage::get_all_implementations() {
			tracing::debug!("Registering storage implementation: {}", name);
			registry.register_storage(name, factory);
		}

		for (name, factory) in vault_account::get_all_implementations() {
			tracing::debug!("Registering account implementation: {}", name);
			registry.register_account(name, factory);
		}

		registry
	})
}

/// Selects the factories for the implementations named in `$config_impls`,
/// failing on names nothing is registered under.
macro_rules! build_factories {
	($registry:expr, $config_impls:expr, $registry_field:ident, $type_name:literal) => {{
		let mut factories = HashMap::new();
		for name in $config_impls.keys() {
			if let Some(factory) = $registry.$registry_field.get(name) {
				factories.insert(name.clone(), *factory);
			} else {
				let mut available: Vec<_> = $registry.$registry_field.keys().cloned().collect();
				available.sort();
				return Err(format!(
					"Unknown {} implementation '{}'. Available: [{}]",
					$type_name,
					name,
					available.join(", ")
				)
				.into());
			}
		}
		factories
	}};
}

/// Builds the vault described by `config`.
pub async fn build_vault_from_config(
	config: Config,
) -> Result<BuiltVault, Box<dyn std::error::Error>> {
	let registry = get_registry();
	let storage_factories =
		build_factories!(registry, config.storage.implementations, storage, "storage");
	let account_factories = match &config.account {
		Some(account_config) => build_factories!(
			registry,
			account_config.implementations,
			account,
			"account"
		),
		None => HashMap::new(),
	};

	let factories = VaultFactories {
		storage_factories,
		account_factories,
	};
	Ok(VaultBuilder::new(config).build(factories).await?)
}

/// Loads the persisted vault state, or the configured one when the vault
/// has never run against this storage.
pub async fn load_state_from_config(
	config: &Config,
) -> Result<VaultState, Box<dyn std::error::Error>> {
	let registry = get_registry();
	let storage_factories =
		build_factories!(registry, config.storage.implementations, storage, "storage");
	Ok(VaultBuilder::new(config.clone())
		.load_state(&storage_factories)
		.await?)
}

/// Builds the signing account named by `[account]`, if configured.
pub fn build_account_from_config(
	config: &Config,
) -> Result<Option<AccountService>, Box<dyn std::error::Error>> {
	let registry = get_registry();
	let Some(account_config) = &config.account else {
		return Ok(None);
	};
	let account_factories = build_factories!(
		registry,
		account_config.implementations,
		account,
		"account"
	);

	Ok(VaultBuilder::new(config.clone()).build_account(&account_factories)?)
}
