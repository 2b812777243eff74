//! Configuration module for the custodial vault.
//!
//! Configuration is a single TOML file. `${VAR}` and `${VAR:-default}`
//! references are resolved from the environment before parsing, and the
//! parsed configuration is validated before it is handed to the builder.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use thiserror::Error;
use vault_types::{
	utils::{parse_address, parse_amount},
	Address, VaultDomain, U256,
};

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error that occurs during file I/O operations.
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	/// Error that occurs when parsing TOML configuration.
	#[error("Configuration error: {0}")]
	Parse(String),
	/// Error that occurs when configuration validation fails.
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// Extract just the message without the huge input dump
		let message = err.message().to_string();
		ConfigError::Parse(message)
	}
}

/// Main configuration structure for the vault.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	/// Vault identity, signing domain and initial roles.
	pub vault: VaultConfig,
	/// In-memory token ledger backing the vault.
	pub ledger: LedgerConfig,
	/// Configuration for the storage backend.
	pub storage: StorageConfig,
	/// Signing account used by operator tooling.
	pub account: Option<AccountConfig>,
	/// Configuration for the HTTP API server.
	pub api: Option<ApiConfig>,
}

/// Vault identity and initial roles.
///
/// `owner`, `signer` and `token` only seed a fresh vault. Once state has
/// been persisted, the stored values win.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VaultConfig {
	/// Signing domain name.
	pub name: String,
	/// Signing domain version.
	pub version: String,
	/// Chain the vault is deployed on.
	pub chain_id: u64,
	/// Address of the vault; the domain's verifying contract.
	pub address: Address,
	/// Initial owner.
	pub owner: Address,
	/// Initial trusted signer.
	pub signer: Address,
	/// Initial custodial token contract.
	pub token: Option<Address>,
}

impl VaultConfig {
	/// The EIP-712 domain described by this section.
	pub fn domain(&self) -> VaultDomain {
		VaultDomain::new(&self.name, &self.version, self.chain_id, self.address)
	}
}

/// In-memory token ledger deployed alongside the vault.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LedgerConfig {
	/// Address the token contract is deployed at.
	pub address: Address,
	/// Opening token balances, keyed by account address. Amounts are decimal
	/// or "0x"-prefixed hex strings.
	#[serde(default)]
	pub balances: HashMap<String, String>,
	/// Whether every funded account pre-approves the vault for its whole
	/// opening balance, so deposits work without a separate approval step.
	#[serde(default = "default_approve_vault")]
	pub approve_vault: bool,
	/// Opening native balance of the vault.
	pub native_balance: Option<String>,
}

fn default_approve_vault() -> bool {
	true
}

impl LedgerConfig {
	/// Parses the opening balances.
	pub fn parsed_balances(&self) -> Result<Vec<(Address, U256)>, ConfigError> {
		let mut balances = self
			.balances
			.iter()
			.map(|(account, amount)| {
				let account = parse_address(account).map_err(ConfigError::Validation)?;
				let amount = parse_amount(amount).map_err(ConfigError::Validation)?;
				Ok((account, amount))
			})
			.collect::<Result<Vec<_>, ConfigError>>()?;
		balances.sort_by_key(|(account, _)| *account);
		Ok(balances)
	}

	/// Parses the opening native balance, defaulting to zero.
	pub fn parsed_native_balance(&self) -> Result<U256, ConfigError> {
		self.native_balance
			.as_deref()
			.map(|amount| parse_amount(amount).map_err(ConfigError::Validation))
			.transpose()
			.map(|amount| amount.unwrap_or(U256::ZERO))
	}
}

/// Configuration for the storage backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of storage implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
}

/// Configuration for account management.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AccountConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of account implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
}

/// Configuration for the HTTP API server.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
	/// Whether the API server is enabled.
	#[serde(default)]
	pub enabled: bool,
	/// Host address to bind the server to.
	#[serde(default = "default_api_host")]
	pub host: String,
	/// Port to bind the server to.
	#[serde(default = "default_api_port")]
	pub port: u16,
	/// Maximum request size in bytes.
	#[serde(default = "default_max_request_size")]
	pub max_request_size: usize,
}

impl Default for ApiConfig {
	fn default() -> Self {
		Self {
			enabled: false,
			host: default_api_host(),
			port: default_api_port(),
			max_request_size: default_max_request_size(),
		}
	}
}

fn default_api_host() -> String {
	"127.0.0.1".to_string()
}

fn default_api_port() -> u16 {
	3000
}

fn default_max_request_size() -> usize {
	64 * 1024
}

/// Resolves environment variables in a string.
///
/// Replaces ${VAR_NAME} with the value of the environment variable VAR_NAME.
/// Supports default values with ${VAR_NAME:-default_value}.
///
/// Input strings are limited to 1MB.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	const MAX_INPUT_SIZE: usize = 1024 * 1024;
	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_INPUT_SIZE
		)));
	}

	let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut result = input.to_string();
	let mut replacements = Vec::new();

	for cap in re.captures_iter(input) {
		let (Some(full_match), Some(var_name)) = (cap.get(0), cap.get(1)) else {
			continue;
		};
		let var_name = var_name.as_str();
		let default_value = cap.get(2).map(|m| m.as_str());

		let value = match std::env::var(var_name) {
			Ok(v) => v,
			Err(_) => match default_value {
				Some(default) => default.to_string(),
				None => {
					return Err(ConfigError::Validation(format!(
						"Environment variable '{}' not found",
						var_name
					)))
				},
			},
		};

		replacements.push((full_match.start(), full_match.end(), value));
	}

	// Apply replacements in reverse order to maintain positions
	for (start, end, value) in replacements.iter().rev() {
		result.replace_range(start..end, value);
	}

	Ok(result)
}

impl Config {
	/// Loads configuration from a file, resolving environment variables.
	pub async fn from_file(path: &str) -> Result<Self, ConfigError> {
		let content = tokio::fs::read_to_string(path).await?;
		content.parse()
	}

	/// Validates the configuration to ensure all required fields are properly set.
	fn validate(&self) -> Result<(), ConfigError> {
		// Vault identity
		if self.vault.name.is_empty() {
			return Err(ConfigError::Validation("Vault name cannot be empty".into()));
		}
		if self.vault.version.is_empty() {
			return Err(ConfigError::Validation(
				"Vault version cannot be empty".into(),
			));
		}
		if self.vault.chain_id == 0 {
			return Err(ConfigError::Validation(
				"Vault chain_id must be greater than 0".into(),
			));
		}
		for (field, address) in [
			("address", self.vault.address),
			("owner", self.vault.owner),
			("signer", self.vault.signer),
		] {
			if address == Address::ZERO {
				return Err(ConfigError::Validation(format!(
					"vault.{} cannot be the zero address",
					field
				)));
			}
		}
		if let Some(token) = self.vault.token {
			if token != self.ledger.address {
				return Err(ConfigError::Validation(format!(
					"vault.token {} has no deployed ledger (ledger.address is {})",
					token, self.ledger.address
				)));
			}
		}

		// Ledger
		if self.ledger.address == Address::ZERO {
			return Err(ConfigError::Validation(
				"ledger.address cannot be the zero address".into(),
			));
		}
		if self.ledger.address == self.vault.address {
			return Err(ConfigError::Validation(
				"ledger.address must differ from vault.address".into(),
			));
		}
		self.ledger.parsed_balances()?;
		self.ledger.parsed_native_balance()?;

		// Storage
		if self.storage.implementations.is_empty() {
			return Err(ConfigError::Validation(
				"At least one storage implementation must be configured".into(),
			));
		}
		if self.storage.primary.is_empty() {
			return Err(ConfigError::Validation(
				"Storage primary implementation cannot be empty".into(),
			));
		}
		if !self
			.storage
			.implementations
			.contains_key(&self.storage.primary)
		{
			return Err(ConfigError::Validation(format!(
				"Primary storage '{}' not found in implementations",
				self.storage.primary
			)));
		}

		// Account
		if let Some(ref account) = self.account {
			if !account.implementations.contains_key(&account.primary) {
				return Err(ConfigError::Validation(format!(
					"Primary account '{}' not found in implementations",
					account.primary
				)));
			}
		}

		// API
		if let Some(ref api) = self.api {
			if api.enabled && api.max_request_size == 0 {
				return Err(ConfigError::Validation(
					"api.max_request_size must be greater than 0".into(),
				));
			}
		}

		Ok(())
	}
}

/// Parses configuration from a TOML string. Environment variables are
/// resolved and the configuration is validated after parsing.
impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}
}
