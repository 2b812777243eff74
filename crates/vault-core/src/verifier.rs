//! Withdrawal authorization verifier.
//!
//! Tampering and staleness are checked separately: [`signature_matches`]
//! answers whether the trusted signer produced the signature, and
//! [`is_expired`] whether the deadline has passed. [`verify`] requires both.
//!
//! [`signature_matches`]: AuthorizationVerifier::signature_matches
//! [`is_expired`]: AuthorizationVerifier::is_expired
//! [`verify`]: AuthorizationVerifier::verify
//!
//! Signed calls are recovered under the same domain and compared against
//! the caller they name rather than the trusted signer.

use crate::VaultError;
use alloy_primitives::PrimitiveSignature;
use vault_types::{
	Address, CallAuthorization, VaultDomain, WithdrawAuthorization, B256, SIGNATURE_LENGTH,
};

/// Verifies withdrawal authorizations under one fixed domain.
#[derive(Debug, Clone)]
pub struct AuthorizationVerifier {
	domain: VaultDomain,
	separator: B256,
}

impl AuthorizationVerifier {
	/// Fixes the domain and computes its separator once.
	pub fn new(domain: VaultDomain) -> Self {
		let separator = domain.separator();
		Self { domain, separator }
	}

	pub fn domain(&self) -> &VaultDomain {
		&self.domain
	}

	pub fn separator(&self) -> B256 {
		self.separator
	}

	/// The digest the signer must sign for `authorization`.
	pub fn digest(&self, authorization: &WithdrawAuthorization) -> B256 {
		authorization.signing_hash(&self.separator)
	}

	pub fn call_digest(&self, call: &CallAuthorization) -> B256 {
		call.signing_hash(&self.separator)
	}

	/// Recovers the address that signed `authorization`.
	///
	/// Returns `Ok(None)` for a well-sized blob that does not recover to any
	/// key (bad `v`, invalid `r` or `s`).
	pub fn recover(
		&self,
		authorization: &WithdrawAuthorization,
		signature: &[u8],
	) -> Result<Option<Address>, VaultError> {
		recover_prehash(&self.digest(authorization), signature)
	}

	/// Recovers the address that signed `call`.
	pub fn recover_call(
		&self,
		call: &CallAuthorization,
		signature: &[u8],
	) -> Result<Option<Address>, VaultError> {
		recover_prehash(&self.call_digest(call), signature)
	}

	/// Whether `signature` over `authorization` was produced by `signer`.
	pub fn signature_matches(
		&self,
		authorization: &WithdrawAuthorization,
		signature: &[u8],
		signer: Address,
	) -> Result<bool, VaultError> {
		Ok(self.recover(authorization, signature)? == Some(signer))
	}

	/// Whether `deadline` has passed at `now`. The deadline second itself is
	/// still valid.
	pub fn is_expired(deadline: u64, now: u64) -> bool {
		now > deadline
	}

	/// Full verification: the signature matches `signer` and the deadline
	/// has not passed. Malformed blobs are an error rather than `false`.
	pub fn verify(
		&self,
		authorization: &WithdrawAuthorization,
		signature: &[u8],
		signer: Address,
		now: u64,
	) -> Result<bool, VaultError> {
		let matches = self.signature_matches(authorization, signature, signer)?;
		Ok(matches && !Self::is_expired(authorization.deadline, now))
	}
}

fn recover_prehash(digest: &B256, signature: &[u8]) -> Result<Option<Address>, VaultError> {
	if signature.len() != SIGNATURE_LENGTH {
		return Err(VaultError::InvalidSignatureLength(signature.len()));
	}
	let Ok(signature) = PrimitiveSignature::from_raw(signature) else {
		return Ok(None);
	};
	Ok(signature.recover_address_from_prehash(digest).ok())
}

#[cfg(test)]
mod tests {
	use super::*;
	use vault_account::{implementations::local::LocalAccount, AccountService};
	use vault_types::{CallAction, U256};

	const SIGNER_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
	const OTHER_KEY: &str = "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";

	fn account(key: &str) -> AccountService {
		AccountService::new(Box::new(LocalAccount::new(key).unwrap()))
	}

	fn setup() -> (AuthorizationVerifier, WithdrawAuthorization) {
		let vault = Address::repeat_byte(0x11);
		let verifier = AuthorizationVerifier::new(VaultDomain::new("BonezVault", "1", 31337, vault));
		let authorization = WithdrawAuthorization {
			vault,
			amount: U256::from(50),
			nonce: 0,
			account: Address::repeat_byte(0x22),
			deadline: 2_000,
		};
		(verifier, authorization)
	}

	#[tokio::test]
	async fn test_valid_signature_verifies() {
		let (verifier, authorization) = setup();
		let signer = account(SIGNER_KEY);
		let address = signer.get_address().await.unwrap();
		let signature = signer
			.sign_withdrawal(verifier.domain(), &authorization)
			.await
			.unwrap();

		assert_eq!(
			verifier.recover(&authorization, &signature).unwrap(),
			Some(address)
		);
		assert!(verifier.verify(&authorization, &signature, address, 1_000).unwrap());
		assert!(verifier.verify(&authorization, &signature, address, 2_000).unwrap());
	}

	#[tokio::test]
	async fn test_expiry_is_independent_of_signature() {
		let (verifier, authorization) = setup();
		let signer = account(SIGNER_KEY);
		let address = signer.get_address().await.unwrap();
		let signature = signer
			.sign_withdrawal(verifier.domain(), &authorization)
			.await
			.unwrap();

		assert!(verifier
			.signature_matches(&authorization, &signature, address)
			.unwrap());
		assert!(AuthorizationVerifier::is_expired(authorization.deadline, 2_001));
		assert!(!verifier.verify(&authorization, &signature, address, 2_001).unwrap());
	}

	#[tokio::test]
	async fn test_wrong_signer_and_tampering_do_not_match() {
		let (verifier, authorization) = setup();
		let trusted = account(SIGNER_KEY).get_address().await.unwrap();
		let forged = account(OTHER_KEY)
			.sign_withdrawal(verifier.domain(), &authorization)
			.await
			.unwrap();
		assert!(!verifier.verify(&authorization, &forged, trusted, 1_000).unwrap());

		let genuine = account(SIGNER_KEY)
			.sign_withdrawal(verifier.domain(), &authorization)
			.await
			.unwrap();
		let tampered = WithdrawAuthorization {
			amount: U256::from(5_000),
			..authorization
		};
		assert!(!verifier.verify(&tampered, &genuine, trusted, 1_000).unwrap());
	}

	#[tokio::test]
	async fn test_signature_is_domain_scoped() {
		let (verifier, authorization) = setup();
		let signer = account(SIGNER_KEY);
		let address = signer.get_address().await.unwrap();
		let signature = signer
			.sign_withdrawal(verifier.domain(), &authorization)
			.await
			.unwrap();

		let other_chain = AuthorizationVerifier::new(VaultDomain::new(
			"BonezVault",
			"1",
			1,
			authorization.vault,
		));
		let other_vault = AuthorizationVerifier::new(VaultDomain::new(
			"BonezVault",
			"1",
			31337,
			Address::repeat_byte(0x99),
		));
		assert!(!other_chain.verify(&authorization, &signature, address, 1_000).unwrap());
		assert!(!other_vault.verify(&authorization, &signature, address, 1_000).unwrap());
	}

	#[test]
	fn test_malformed_signatures() {
		let (verifier, authorization) = setup();
		let signer = Address::repeat_byte(0x33);

		assert!(matches!(
			verifier.verify(&authorization, &[0u8; 64], signer, 0),
			Err(VaultError::InvalidSignatureLength(64))
		));
		assert!(matches!(
			verifier.verify(&authorization, &[], signer, 0),
			Err(VaultError::InvalidSignatureLength(0))
		));

		// Right size, but not a point on the curve.
		let garbage = [0u8; SIGNATURE_LENGTH];
		assert_eq!(verifier.recover(&authorization, &garbage).unwrap(), None);
		assert!(!verifier.verify(&authorization, &garbage, signer, 0).unwrap());
	}

	#[tokio::test]
	async fn test_call_recovers_to_its_signer() {
		let (verifier, authorization) = setup();
		let owner = account(SIGNER_KEY);
		let owner_address = owner.get_address().await.unwrap();
		let call = CallAuthorization::new(
			authorization.vault,
			owner_address,
			CallAction::Pause,
			0,
			2_000,
		);

		let signature = owner.sign_call(verifier.domain(), &call).await.unwrap();
		assert_eq!(
			verifier.recover_call(&call, &signature).unwrap(),
			Some(owner_address)
		);

		// Someone else's key recovers to someone else.
		let other = account(OTHER_KEY)
			.sign_call(verifier.domain(), &call)
			.await
			.unwrap();
		assert_ne!(
			verifier.recover_call(&call, &other).unwrap(),
			Some(owner_address)
		);
		assert!(matches!(
			verifier.recover_call(&call, &signature[..64]),
			Err(VaultError::InvalidSignatureLength(64))
		));
	}
}
