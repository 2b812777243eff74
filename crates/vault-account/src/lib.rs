//! Signing accounts for off-chain withdrawal authorizations.
//!
//! The trusted signer lives outside the vault. This crate gives operator
//! tooling a way to produce the 65-byte signatures the vault accepts: an
//! [`AccountInterface`] signs raw 32-byte digests, and [`AccountService`]
//! builds the EIP-712 digest for a [`WithdrawAuthorization`] or a
//! [`CallAuthorization`] before signing.

use async_trait::async_trait;
use vault_types::{
	Address, CallAuthorization, ConfigSchema, ImplementationRegistry, VaultDomain,
	WithdrawAuthorization, B256, SIGNATURE_LENGTH,
};
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod local;
}

/// Errors that can occur during account operations.
#[derive(Debug, Error)]
pub enum AccountError {
	/// Error that occurs when signing operations fail.
	#[error("Signing failed: {0}")]
	SigningFailed(String),
	/// Error that occurs when a cryptographic key is invalid or malformed.
	#[error("Invalid key: {0}")]
	InvalidKey(String),
	/// Error that occurs when interacting with the account implementation.
	#[error("Implementation error: {0}")]
	Implementation(String),
}

/// Trait defining the interface for account implementations.
#[async_trait]
pub trait AccountInterface: Send + Sync {
	/// Returns the configuration schema for this account implementation.
	///
	/// The schema is used to validate the TOML table before the account is
	/// constructed.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Retrieves the address associated with this account.
	async fn address(&self) -> Result<Address, AccountError>;

	/// Signs a 32-byte prehashed digest, returning `r || s || v` with
	/// `v` in {27, 28}.
	async fn sign_hash(&self, hash: &B256) -> Result<Vec<u8>, AccountError>;
}

/// Type alias for account factory functions.
pub type AccountFactory = fn(&toml::Value) -> Result<Box<dyn AccountInterface>, AccountError>;

/// Registry trait for account implementations.
pub trait AccountRegistry: ImplementationRegistry<Factory = AccountFactory> {}

/// Get all registered account implementations.
pub fn get_all_implementations() -> Vec<(&'static str, AccountFactory)> {
	use implementations::local;

	vec![(local::Registry::NAME, local::Registry::factory())]
}

/// Service that signs withdrawal authorizations and vault calls with a managed account.
pub struct AccountService {
	implementation: Box<dyn AccountInterface>,
}

impl AccountService {
	pub fn new(implementation: Box<dyn AccountInterface>) -> Self {
		Self { implementation }
	}

	/// Retrieves the address associated with the managed account.
	pub async fn get_address(&self) -> Result<Address, AccountError> {
		self.implementation.address().await
	}

	async fn sign_digest(&self, digest: &B256) -> Result<Vec<u8>, AccountError> {
		let signature = self.implementation.sign_hash(digest).await?;
		if signature.len() != SIGNATURE_LENGTH {
			return Err(AccountError::SigningFailed(format!(
				"expected {} signature bytes, got {}",
				SIGNATURE_LENGTH,
				signature.len()
			)));
		}
		Ok(signature)
	}

	/// Signs `authorization` under `domain`.
	///
	/// The result is exactly what the vault's `withdraw` expects as its
	/// signature argument.
	pub async fn sign_withdrawal(
		&self,
		domain: &VaultDomain,
		authorization: &WithdrawAuthorization,
	) -> Result<Vec<u8>, AccountError> {
		let digest = authorization.digest(domain);
		let signature = self.sign_digest(&digest).await?;

		tracing::debug!(
			account = %authorization.account,
			nonce = authorization.nonce,
			digest = %digest,
			"Signed withdrawal authorization"
		);
		Ok(signature)
	}

	/// Signs a deposit or owner call. Only verifies when this account is the
	/// call's `caller`.
	pub async fn sign_call(
		&self,
		domain: &VaultDomain,
		call: &CallAuthorization,
	) -> Result<Vec<u8>, AccountError> {
		let digest = call.digest(domain);
		let signature = self.sign_digest(&digest).await?;

		tracing::debug!(
			caller = %call.caller,
			action = %call.action,
			nonce = call.nonce,
			"Signed vault call"
		);
		Ok(signature)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use implementations::local::LocalAccount;
	use vault_types::{CallAction, U256};

	const ANVIL_KEY_0: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

	#[tokio::test]
	async fn test_sign_withdrawal_recovers_to_account() {
		let account = LocalAccount::new(ANVIL_KEY_0).unwrap();
		let service = AccountService::new(Box::new(account));
		let signer = service.get_address().await.unwrap();

		let vault = Address::repeat_byte(0x11);
		let domain = VaultDomain::new("BonezVault", "1", 31337, vault);
		let authorization = WithdrawAuthorization {
			vault,
			amount: U256::from(50),
			nonce: 0,
			account: Address::repeat_byte(0x22),
			deadline: 1_700_000_000,
		};

		let bytes = service
			.sign_withdrawal(&domain, &authorization)
			.await
			.unwrap();
		assert_eq!(bytes.len(), SIGNATURE_LENGTH);
		assert!(bytes[64] == 27 || bytes[64] == 28);

		let signature = alloy_primitives::PrimitiveSignature::from_raw(&bytes).unwrap();
		let recovered = signature
			.recover_address_from_prehash(&authorization.digest(&domain))
			.unwrap();
		assert_eq!(recovered, signer);
	}

	#[tokio::test]
	async fn test_sign_call_recovers_to_account() {
		let service = AccountService::new(Box::new(LocalAccount::new(ANVIL_KEY_0).unwrap()));
		let caller = service.get_address().await.unwrap();
		let vault = Address::repeat_byte(0x11);
		let domain = VaultDomain::new("BonezVault", "1", 31337, vault);
		let call = CallAuthorization::new(vault, caller, CallAction::Deposit, 0, 1_700_000_000)
			.with_amount(U256::from(40));

		let bytes = service.sign_call(&domain, &call).await.unwrap();
		let signature = alloy_primitives::PrimitiveSignature::from_raw(&bytes).unwrap();
		assert_eq!(
			signature
				.recover_address_from_prehash(&call.digest(&domain))
				.unwrap(),
			caller
		);
	}
}
