//! Audit records emitted by the vault.
//!
//! Exactly one record is appended per successful state-changing call. The
//! same records are published on the engine's event bus and written to the
//! tracing log.

use crate::u256_serde;
use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

/// Append-only audit record of a vault state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum VaultEvent {
	/// Tokens pulled from a depositor into custody.
	Deposit {
		caller: Address,
		#[serde(with = "u256_serde")]
		amount: U256,
	},
	/// Tokens released to a caller under a signed authorization.
	Withdraw {
		caller: Address,
		#[serde(with = "u256_serde")]
		amount: U256,
		/// Nonce consumed by this withdrawal.
		nonce: u64,
	},
	/// The custodial token contract was replaced.
	LedgerUpdated {
		old: Option<Address>,
		new: Address,
	},
	/// The trusted signer was replaced.
	SignerUpdated { old: Address, new: Address },
	/// The whole custodial balance was swept to the owner.
	EmergencySweep {
		owner: Address,
		#[serde(with = "u256_serde")]
		amount: U256,
	},
	/// The whole native balance was swept to the owner.
	NativeSweep {
		owner: Address,
		#[serde(with = "u256_serde")]
		amount: U256,
	},
	/// Deposits and withdrawals were suspended.
	Paused { account: Address },
	/// Deposits and withdrawals were resumed.
	Unpaused { account: Address },
	/// Ownership moved to a new account.
	OwnershipTransferred { old: Address, new: Address },
}

impl VaultEvent {
	/// Short name of the record, used as a log field.
	pub fn kind(&self) -> &'static str {
		match self {
			VaultEvent::Deposit { .. } => "Deposit",
			VaultEvent::Withdraw { .. } => "Withdraw",
			VaultEvent::LedgerUpdated { .. } => "LedgerUpdated",
			VaultEvent::SignerUpdated { .. } => "SignerUpdated",
			VaultEvent::EmergencySweep { .. } => "EmergencySweep",
			VaultEvent::NativeSweep { .. } => "NativeSweep",
			VaultEvent::Paused { .. } => "Paused",
			VaultEvent::Unpaused { .. } => "Unpaused",
			VaultEvent::OwnershipTransferred { .. } => "OwnershipTransferred",
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_withdraw_event_json_shape() {
		let event = VaultEvent::Withdraw {
			caller: Address::repeat_byte(0x01),
			amount: U256::from(50),
			nonce: 0,
		};
		let json = serde_json::to_value(&event).unwrap();

		assert_eq!(json["type"], "withdraw");
		assert_eq!(json["amount"], "50");
		assert_eq!(json["nonce"], 0);
		assert_eq!(event.kind(), "Withdraw");
	}
}
