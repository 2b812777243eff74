//! Withdrawal authorization types and their EIP-712 encoding.
//!
//! A withdrawal is authorized off-chain by the trusted signer, who signs the
//! typed `Withdraw` struct under the vault's domain. The domain binds the
//! signature to one vault address, name/version pair and chain id, so a
//! signature issued for one deployment never validates on another.
//!
//! Deposits and owner calls arriving over HTTP carry a [`CallAuthorization`]
//! signed by the caller itself under the same domain, so the caller named in
//! a request is the one holding its key.

use crate::utils::{compute_domain_hash, compute_final_digest, Eip712AbiEncoder};
use alloy_primitives::{keccak256, Address, B256, U256};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Typed struct signed by the trusted signer.
pub const WITHDRAW_TYPE: &str =
	"Withdraw(address vault,uint256 amount,uint256 nonce,address account,uint256 deadline)";

/// Typed struct a caller signs to submit a deposit or an owner call.
pub const CALL_TYPE: &str = "VaultCall(address vault,address caller,string action,address target,uint256 amount,uint256 nonce,uint256 deadline)";

/// Expected byte length of a signature: r (32) || s (32) || v (1).
pub const SIGNATURE_LENGTH: usize = 65;

/// EIP-712 domain of a vault deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultDomain {
	/// Human-readable signing domain name.
	pub name: String,
	/// Current major version of the signing domain.
	pub version: String,
	/// Chain the vault is deployed on.
	pub chain_id: u64,
	/// Address of the vault itself.
	pub verifying_contract: Address,
}

impl VaultDomain {
	pub fn new(
		name: impl Into<String>,
		version: impl Into<String>,
		chain_id: u64,
		verifying_contract: Address,
	) -> Self {
		Self {
			name: name.into(),
			version: version.into(),
			chain_id,
			verifying_contract,
		}
	}

	/// Computes the domain separator for this domain.
	pub fn separator(&self) -> B256 {
		compute_domain_hash(
			&self.name,
			&self.version,
			self.chain_id,
			&self.verifying_contract,
		)
	}
}

/// The data a withdrawal signature commits to.
///
/// `vault` is part of the struct itself in addition to the domain's
/// verifying contract, matching the schema the off-chain signer uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawAuthorization {
	pub vault: Address,
	pub amount: U256,
	pub nonce: u64,
	pub account: Address,
	/// UNIX timestamp (seconds) after which the authorization is expired.
	pub deadline: u64,
}

impl WithdrawAuthorization {
	/// Computes `hashStruct(Withdraw)`.
	pub fn struct_hash(&self) -> B256 {
		let mut enc = Eip712AbiEncoder::new();
		enc.push_b256(&keccak256(WITHDRAW_TYPE.as_bytes()));
		enc.push_address(&self.vault);
		enc.push_u256(self.amount);
		enc.push_u64(self.nonce);
		enc.push_address(&self.account);
		enc.push_u64(self.deadline);
		keccak256(enc.finish())
	}

	/// Computes the digest to sign, given a precomputed domain separator.
	pub fn signing_hash(&self, domain_separator: &B256) -> B256 {
		compute_final_digest(domain_separator, &self.struct_hash())
	}

	/// Computes the digest to sign under `domain`.
	pub fn digest(&self, domain: &VaultDomain) -> B256 {
		self.signing_hash(&domain.separator())
	}
}

/// State-changing calls that require the caller's own signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallAction {
	Deposit,
	Pause,
	Unpause,
	SetSigner,
	SetTokenContract,
	TransferOwnership,
	EmergencyWithdraw,
	WithdrawNative,
}

impl CallAction {
	pub fn all() -> &'static [CallAction] {
		&[
			CallAction::Deposit,
			CallAction::Pause,
			CallAction::Unpause,
			CallAction::SetSigner,
			CallAction::SetTokenContract,
			CallAction::TransferOwnership,
			CallAction::EmergencyWithdraw,
			CallAction::WithdrawNative,
		]
	}

	/// The `action` string that is hashed into the signed struct.
	pub fn as_str(&self) -> &'static str {
		match self {
			CallAction::Deposit => "deposit",
			CallAction::Pause => "pause",
			CallAction::Unpause => "unpause",
			CallAction::SetSigner => "set_signer",
			CallAction::SetTokenContract => "set_token_contract",
			CallAction::TransferOwnership => "transfer_ownership",
			CallAction::EmergencyWithdraw => "emergency_withdraw",
			CallAction::WithdrawNative => "withdraw_native",
		}
	}
}

impl fmt::Display for CallAction {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for CallAction {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		CallAction::all()
			.iter()
			.find(|action| action.as_str() == s)
			.copied()
			.ok_or_else(|| format!("Unknown call action: {}", s))
	}
}

/// The data a caller's signature over a deposit or owner call commits to.
///
/// `target` is the address argument of the call (new signer, token or
/// owner) and `amount` the deposit amount. Calls without one sign the zero
/// value in its place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallAuthorization {
	pub vault: Address,
	pub caller: Address,
	pub action: CallAction,
	pub target: Address,
	pub amount: U256,
	/// The caller's next call nonce, separate from its withdrawal nonce.
	pub nonce: u64,
	pub deadline: u64,
}

impl CallAuthorization {
	/// A call with no address or amount argument.
	pub fn new(vault: Address, caller: Address, action: CallAction, nonce: u64, deadline: u64) -> Self {
		Self {
			vault,
			caller,
			action,
			target: Address::ZERO,
			amount: U256::ZERO,
			nonce,
			deadline,
		}
	}

	pub fn with_target(self, target: Address) -> Self {
		Self { target, ..self }
	}

	pub fn with_amount(self, amount: U256) -> Self {
		Self { amount, ..self }
	}

	/// Computes `hashStruct(VaultCall)`.
	pub fn struct_hash(&self) -> B256 {
		let mut enc = Eip712AbiEncoder::new();
		enc.push_b256(&keccak256(CALL_TYPE.as_bytes()));
		enc.push_address(&self.vault);
		enc.push_address(&self.caller);
		enc.push_b256(&keccak256(self.action.as_str().as_bytes()));
		enc.push_address(&self.target);
		enc.push_u256(self.amount);
		enc.push_u64(self.nonce);
		enc.push_u64(self.deadline);
		keccak256(enc.finish())
	}

	pub fn signing_hash(&self, domain_separator: &B256) -> B256 {
		compute_final_digest(domain_separator, &self.struct_hash())
	}

	pub fn digest(&self, domain: &VaultDomain) -> B256 {
		self.signing_hash(&domain.separator())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use alloy_primitives::address;

	fn authorization() -> WithdrawAuthorization {
		WithdrawAuthorization {
			vault: address!("5FbDB2315678afecb367f032d93F642f64180aa3"),
			amount: U256::from(50),
			nonce: 0,
			account: address!("70997970C51812dc3A010C7d01b50e0d17dc79C8"),
			deadline: 1_700_000_000,
		}
	}

	#[test]
	fn test_digest_changes_with_each_field() {
		let domain = VaultDomain::new(
			"BonezVault",
			"1",
			31337,
			address!("5FbDB2315678afecb367f032d93F642f64180aa3"),
		);
		let base = authorization();
		let digest = base.digest(&domain);

		let variants = [
			WithdrawAuthorization {
				amount: U256::from(51),
				..base
			},
			WithdrawAuthorization { nonce: 1, ..base },
			WithdrawAuthorization {
				account: Address::repeat_byte(0x22),
				..base
			},
			WithdrawAuthorization {
				deadline: base.deadline + 1,
				..base
			},
			WithdrawAuthorization {
				vault: Address::repeat_byte(0x33),
				..base
			},
		];
		for variant in variants {
			assert_ne!(variant.digest(&domain), digest);
		}
	}

	#[test]
	fn test_digest_is_domain_scoped() {
		let contract = address!("5FbDB2315678afecb367f032d93F642f64180aa3");
		let auth = authorization();
		let on_local = VaultDomain::new("BonezVault", "1", 31337, contract);
		let on_mainnet = VaultDomain::new("BonezVault", "1", 1, contract);

		assert_ne!(auth.digest(&on_local), auth.digest(&on_mainnet));
		assert_eq!(
			auth.digest(&on_local),
			auth.signing_hash(&on_local.separator())
		);
	}

	#[test]
	fn test_call_digest_binds_action_and_arguments() {
		let domain = VaultDomain::new(
			"BonezVault",
			"1",
			31337,
			address!("5FbDB2315678afecb367f032d93F642f64180aa3"),
		);
		let owner = address!("f39Fd6e51aad88F6F4ce6aB8827279cffFb92266");
		let base = CallAuthorization::new(
			domain.verifying_contract,
			owner,
			CallAction::SetSigner,
			0,
			1_700_000_000,
		)
		.with_target(Address::repeat_byte(0x42));
		let digest = base.digest(&domain);

		let variants = [
			CallAuthorization {
				action: CallAction::TransferOwnership,
				..base
			},
			base.with_target(Address::repeat_byte(0x43)),
			base.with_amount(U256::from(1)),
			CallAuthorization {
				caller: Address::repeat_byte(0x22),
				..base
			},
			CallAuthorization { nonce: 1, ..base },
		];
		for variant in variants {
			assert_ne!(variant.digest(&domain), digest);
		}

		// A call never collides with a withdrawal over the same fields.
		let withdrawal = WithdrawAuthorization {
			vault: base.vault,
			amount: base.amount,
			nonce: base.nonce,
			account: base.caller,
			deadline: base.deadline,
		};
		assert_ne!(withdrawal.digest(&domain), digest);
	}

	#[test]
	fn test_call_action_names() {
		for action in CallAction::all() {
			assert_eq!(action.as_str().parse::<CallAction>().unwrap(), *action);
		}
		assert_eq!(
			serde_json::to_value(CallAction::SetTokenContract).unwrap(),
			"set_token_contract"
		);
		assert!("mint".parse::<CallAction>().is_err());
	}
}
