//! Local private-key account.

use crate::{AccountError, AccountInterface};
use alloy_signer::SignerSync;
use alloy_signer_local::PrivateKeySigner;
use async_trait::async_trait;
use vault_types::{Address, ConfigSchema, Field, ImplementationRegistry, Schema, ValidationError, B256};
use zeroize::Zeroizing;

/// Account backed by an in-process secp256k1 key.
pub struct LocalAccount {
	signer: PrivateKeySigner,
}

impl LocalAccount {
	/// Parses a hex private key, with or without the "0x" prefix.
	pub fn new(private_key: &str) -> Result<Self, AccountError> {
		let signer = private_key
			.parse::<PrivateKeySigner>()
			.map_err(|e| AccountError::InvalidKey(e.to_string()))?;
		Ok(Self { signer })
	}
}

/// Configuration schema for [`LocalAccount`].
pub struct LocalAccountSchema;

impl ConfigSchema for LocalAccountSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		const SCHEMA: Schema = Schema(&[Field::required("private_key").check(check_key)]);
		SCHEMA.validate(config)
	}
}

fn check_key(key: &str) -> Result<(), String> {
	let hex = key.strip_prefix("0x").unwrap_or(key);
	if hex.len() != 64 {
		return Err("Private key must be 64 hex characters".to_string());
	}
	if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
		return Err("Private key must be valid hex".to_string());
	}
	Ok(())
}

#[async_trait]
impl AccountInterface for LocalAccount {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(LocalAccountSchema)
	}

	async fn address(&self) -> Result<Address, AccountError> {
		Ok(self.signer.address())
	}

	async fn sign_hash(&self, hash: &B256) -> Result<Vec<u8>, AccountError> {
		let signature = self
			.signer
			.sign_hash_sync(hash)
			.map_err(|e| AccountError::SigningFailed(e.to_string()))?;
		Ok(signature.as_bytes().to_vec())
	}
}

/// Factory function to create a local account from configuration.
///
/// Configuration parameters:
/// - `private_key`: hex-encoded secp256k1 key (required)
pub fn create_account(config: &toml::Value) -> Result<Box<dyn AccountInterface>, AccountError> {
	LocalAccountSchema
		.validate(config)
		.map_err(|e| AccountError::InvalidKey(format!("Invalid configuration: {}", e)))?;

	let private_key = config
		.get("private_key")
		.and_then(|v| v.as_str())
		.map(|key| Zeroizing::new(key.to_string()))
		.ok_or_else(|| AccountError::InvalidKey("Private key is required".to_string()))?;

	Ok(Box::new(LocalAccount::new(&private_key)?))
}

/// Registry for the local account implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "local";
	type Factory = crate::AccountFactory;

	fn factory() -> Self::Factory {
		create_account
	}
}

impl crate::AccountRegistry for Registry {}
