//! Storage-related types for the vault.

use std::str::FromStr;

/// Storage namespaces used by the vault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
	/// Owner, signer, token, pause flag and the nonce ledger.
	VaultState,
	/// Append-only audit records.
	Events,
	/// Token and native balances held by the in-memory ledgers.
	Ledger,
}

impl StorageKey {
	/// Returns the string representation of the storage key.
	pub fn as_str(&self) -> &'static str {
		match self {
			StorageKey::VaultState => "vault_state",
			StorageKey::Events => "events",
			StorageKey::Ledger => "ledger",
		}
	}

	/// Returns an iterator over all StorageKey variants.
	pub fn all() -> impl Iterator<Item = Self> {
		[Self::VaultState, Self::Events, Self::Ledger].into_iter()
	}
}

impl FromStr for StorageKey {
	type Err = ();

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"vault_state" => Ok(Self::VaultState),
			"events" => Ok(Self::Events),
			"ledger" => Ok(Self::Ledger),
			_ => Err(()),
		}
	}
}

impl From<StorageKey> for &'static str {
	fn from(key: StorageKey) -> Self {
		key.as_str()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_storage_key_round_trips_through_str() {
		for key in StorageKey::all() {
			assert_eq!(key.as_str().parse::<StorageKey>(), Ok(key));
		}
		assert!("orders".parse::<StorageKey>().is_err());
	}
}
