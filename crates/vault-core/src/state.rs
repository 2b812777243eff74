//! Persisted vault state and the per-account nonce ledger.

use crate::VaultError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use vault_storage::StorageService;
use vault_types::{Address, StorageKey, VaultEvent};

/// Storage id of the single vault record within each namespace.
const RECORD_ID: &str = "vault";

/// Process-wide mutable vault state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultState {
	pub owner: Address,
	/// Trusted signer, read fresh on every verification.
	pub signer: Address,
	/// Custodial token contract.
	pub token: Option<Address>,
	pub paused: bool,
	/// Next expected nonce per account. Absent means zero.
	#[serde(default)]
	pub nonces: BTreeMap<Address, u64>,
	/// Next expected nonce of each caller's signed deposit or owner call.
	#[serde(default)]
	pub call_nonces: BTreeMap<Address, u64>,
}

impl VaultState {
	pub fn new(owner: Address, signer: Address, token: Option<Address>) -> Self {
		Self {
			owner,
			signer,
			token,
			paused: false,
			nonces: BTreeMap::new(),
			call_nonces: BTreeMap::new(),
		}
	}

	pub fn nonce_of(&self, account: &Address) -> u64 {
		self.nonces.get(account).copied().unwrap_or(0)
	}

	/// Consumes `nonce` for `account`, which must be the next expected one.
	pub fn advance_nonce(&mut self, account: Address, nonce: u64) -> Result<(), VaultError> {
		advance(&mut self.nonces, account, nonce)
	}

	/// Undoes [`advance_nonce`](Self::advance_nonce) after a failed release.
	/// A no-op unless `nonce` is the most recently consumed value.
	pub fn rewind_nonce(&mut self, account: Address, nonce: u64) {
		if self.nonce_of(&account) != nonce + 1 {
			return;
		}
		if nonce == 0 {
			self.nonces.remove(&account);
		} else {
			self.nonces.insert(account, nonce);
		}
	}

	pub fn call_nonce_of(&self, caller: &Address) -> u64 {
		self.call_nonces.get(caller).copied().unwrap_or(0)
	}

	/// Consumes a signed call's nonce. Never rewound: a call that was
	/// authenticated and then rejected cannot be resubmitted.
	pub fn advance_call_nonce(&mut self, caller: Address, nonce: u64) -> Result<(), VaultError> {
		advance(&mut self.call_nonces, caller, nonce)
	}

	pub fn require_owner(&self, caller: Address) -> Result<(), VaultError> {
		if caller != self.owner {
			return Err(VaultError::Unauthorized(caller));
		}
		Ok(())
	}
}

fn advance(nonces: &mut BTreeMap<Address, u64>, account: Address, nonce: u64) -> Result<(), VaultError> {
	let expected = nonces.get(&account).copied().unwrap_or(0);
	if expected != nonce {
		return Err(VaultError::InvalidNonce {
			expected,
			provided: nonce,
		});
	}
	nonces.insert(account, expected + 1);
	Ok(())
}

/// Reads and writes the vault record and its audit log.
pub struct VaultStore {
	storage: Arc<StorageService>,
}

impl VaultStore {
	pub fn new(storage: Arc<StorageService>) -> Self {
		Self { storage }
	}

	/// Returns the persisted state and audit log, or `initial` with an empty
	/// log when nothing has been stored yet.
	pub async fn load(
		&self,
		initial: VaultState,
	) -> Result<(VaultState, Vec<VaultEvent>), VaultError> {
		let state = self
			.storage
			.retrieve_optional::<VaultState>(StorageKey::VaultState.as_str(), RECORD_ID)
			.await
			.map_err(|e| VaultError::Storage(e.to_string()))?;
		let events = self
			.storage
			.retrieve_optional::<Vec<VaultEvent>>(StorageKey::Events.as_str(), RECORD_ID)
			.await
			.map_err(|e| VaultError::Storage(e.to_string()))?
			.unwrap_or_default();

		match state {
			Some(state) => {
				tracing::info!(
					owner = %state.owner,
					signer = %state.signer,
					accounts = state.nonces.len(),
					events = events.len(),
					"Restored vault state"
				);
				Ok((state, events))
			},
			None => Ok((initial, events)),
		}
	}

	pub async fn save(&self, state: &VaultState, events: &[VaultEvent]) -> Result<(), VaultError> {
		self.storage
			.store(StorageKey::VaultState.as_str(), RECORD_ID, state)
			.await
			.map_err(|e| VaultError::Storage(e.to_string()))?;
		self.storage
			.store(StorageKey::Events.as_str(), RECORD_ID, &events)
			.await
			.map_err(|e| VaultError::Storage(e.to_string()))
	}
}
