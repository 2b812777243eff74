//! Vault engine.
//!
//! [`Vault`] owns the authorization verifier, the nonce ledger and the admin
//! state, and moves funds through the external ledgers. Every state-changing
//! call returns the single audit event it produced. [`VaultService`] is the
//! front door used by the binary and the HTTP API; it admits one
//! state-changing call at a time.
//!
//! Deposits and owner calls can also arrive as a signed [`CallAuthorization`]
//! through [`Vault::execute`], which establishes the caller from the
//! signature before dispatching.
//!
//! Ledgers may call back into the [`Vault`] while funds are being released.
//! Such nested calls find the caller's nonce already consumed and the
//! reentrancy guard held.

pub mod event_bus;

#[cfg(test)]
mod tests;

use crate::clock::Clock;
use crate::guard::ReentrancyGuard;
use crate::state::{VaultState, VaultStore};
use crate::verifier::AuthorizationVerifier;
use crate::VaultError;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::instrument;
use vault_ledger::{ContractRegistry, LedgerInterface, NativeInterface};
use vault_types::{
	truncate_id, Address, CallAction, CallAuthorization, VaultDomain, VaultEvent,
	WithdrawAuthorization, B256, U256,
};

/// Mutable part of the vault. Never locked across an `.await`.
struct Inner {
	state: VaultState,
	events: Vec<VaultEvent>,
}

/// A signature-authorized custodial vault.
pub struct Vault {
	address: Address,
	verifier: AuthorizationVerifier,
	inner: Mutex<Inner>,
	guard: ReentrancyGuard,
	contracts: ContractRegistry,
	native: Arc<dyn NativeInterface>,
	clock: Arc<dyn Clock>,
	store: VaultStore,
	event_bus: event_bus::EventBus,
}

impl Vault {
	/// Creates a vault from already-loaded state.
	///
	/// The domain separator is computed here and never changes afterwards.
	#[allow(clippy::too_many_arguments)]
	pub fn new(
		domain: VaultDomain,
		state: VaultState,
		events: Vec<VaultEvent>,
		contracts: ContractRegistry,
		native: Arc<dyn NativeInterface>,
		clock: Arc<dyn Clock>,
		store: VaultStore,
		event_bus: event_bus::EventBus,
	) -> Result<Self, VaultError> {
		if domain.verifying_contract == Address::ZERO || state.signer == Address::ZERO {
			return Err(VaultError::ZeroAddress);
		}

		Ok(Self {
			address: domain.verifying_contract,
			verifier: AuthorizationVerifier::new(domain),
			inner: Mutex::new(Inner { state, events }),
			guard: ReentrancyGuard::new(),
			contracts,
			native,
			clock,
			store,
			event_bus,
		})
	}

	fn inner(&self) -> MutexGuard<'_, Inner> {
		self.inner.lock().unwrap_or_else(PoisonError::into_inner)
	}

	fn snapshot(&self) -> VaultState {
		self.inner().state.clone()
	}

	/// Applies `update` to the state after checking the caller owns the vault.
	fn owner_update<T>(
		&self,
		caller: Address,
		update: impl FnOnce(&mut VaultState) -> Result<T, VaultError>,
	) -> Result<T, VaultError> {
		let mut inner = self.inner();
		inner.state.require_owner(caller)?;
		update(&mut inner.state)
	}

	/// Resolves the configured custodial token to its ledger.
	async fn custodial_ledger(&self) -> Result<Arc<dyn LedgerInterface>, VaultError> {
		let token = self
			.inner()
			.state
			.token
			.ok_or(VaultError::BonezContractNotSet)?;
		self.contracts
			.ledger_at(&token)
			.await
			.ok_or(VaultError::InvalidTokenContract(token))
	}

	/// Sends `amount` of the custodial token from the vault to `to` while
	/// holding the reentrancy guard.
	async fn release(
		&self,
		ledger: &dyn LedgerInterface,
		to: Address,
		amount: U256,
	) -> Result<(), VaultError> {
		let _guard = self.guard.enter()?;
		match ledger.transfer(self.address, to, amount).await {
			Ok(true) => Ok(()),
			Ok(false) => Err(VaultError::TransferFailed(
				"ledger rejected the transfer".into(),
			)),
			Err(e) => Err(VaultError::TransferFailed(e.to_string())),
		}
	}

	/// Writes the current state and audit log. Failures are logged; the
	/// in-memory state stays authoritative.
	async fn persist(&self, context: &'static str) {
		let (state, events) = {
			let inner = self.inner();
			(inner.state.clone(), inner.events.clone())
		};
		if let Err(e) = self.store.save(&state, &events).await {
			tracing::error!(context, error = %e, "Failed to persist vault state");
		}
	}

	/// Appends `event` to the audit log, persists the new state and
	/// publishes the event.
	///
	/// The state change has already happened when this runs, so a storage
	/// failure is logged rather than returned.
	async fn commit(&self, event: VaultEvent) -> VaultEvent {
		self.inner().events.push(event.clone());
		self.persist(event.kind()).await;
		let _ = self.event_bus.publish(event.clone());
		tracing::info!(event = event.kind(), details = ?event, "Vault event");
		event
	}

	/// Establishes that `call` was signed by the caller it names and
	/// consumes its call nonce.
	///
	/// Checks run in order: vault, deadline, nonce, signature. Anything that
	/// does not recover to `call.caller` is reported as unauthorized.
	fn authenticate(&self, call: &CallAuthorization, signature: &[u8]) -> Result<(), VaultError> {
		if call.vault != self.address {
			return Err(VaultError::Unauthorized(call.caller));
		}
		let now = self.clock.now();
		if AuthorizationVerifier::is_expired(call.deadline, now) {
			return Err(VaultError::SignatureExpired {
				deadline: call.deadline,
				now,
			});
		}
		let expected = self.inner().state.call_nonce_of(&call.caller);
		if expected != call.nonce {
			return Err(VaultError::InvalidNonce {
				expected,
				provided: call.nonce,
			});
		}

		let recovered = self.verifier.recover_call(call, signature)?;
		if recovered != Some(call.caller) {
			tracing::warn!(
				caller = %call.caller,
				recovered = ?recovered,
				action = %call.action,
				"Rejected call signature"
			);
			return Err(VaultError::Unauthorized(call.caller));
		}

		self.inner()
			.state
			.advance_call_nonce(call.caller, call.nonce)
	}

	/// Runs a deposit or owner call on behalf of the account that signed it.
	///
	/// Once authenticated the call nonce stays consumed even if the call
	/// itself is rejected.
	pub async fn execute(
		&self,
		call: CallAuthorization,
		signature: &[u8],
	) -> Result<VaultEvent, VaultError> {
		self.authenticate(&call, signature)?;

		let caller = call.caller;
		let result = match call.action {
			CallAction::Deposit => self.deposit(caller, call.amount).await,
			CallAction::Pause => self.pause(caller).await,
			CallAction::Unpause => self.unpause(caller).await,
			CallAction::SetSigner => self.set_signer(caller, call.target).await,
			CallAction::SetTokenContract => self.set_token_contract(caller, call.target).await,
			CallAction::TransferOwnership => self.transfer_ownership(caller, call.target).await,
			CallAction::EmergencyWithdraw => self.emergency_withdraw(caller).await,
			CallAction::WithdrawNative => self.withdraw_native(caller).await,
		};

		if let Err(e) = &result {
			tracing::warn!(caller = %caller, action = %call.action, error = %e, "Signed call rejected");
			self.persist(call.action.as_str()).await;
		}
		result
	}

	/// Digest `call.caller` must sign for [`execute`](Self::execute).
	pub fn call_digest(&self, call: &CallAuthorization) -> B256 {
		self.verifier.call_digest(call)
	}

	/// Next call nonce `caller` must sign.
	pub fn call_nonce_of(&self, caller: &Address) -> u64 {
		self.inner().state.call_nonce_of(caller)
	}

	/// Pulls `amount` of the custodial token from `caller` into the vault.
	///
	/// The caller must have approved the vault on the token ledger.
	pub async fn deposit(&self, caller: Address, amount: U256) -> Result<VaultEvent, VaultError> {
		{
			let inner = self.inner();
			if inner.state.paused {
				return Err(VaultError::PausedUnavailable);
			}
			if amount.is_zero() {
				return Err(VaultError::ZeroAmount);
			}
			if inner.state.token.is_none() {
				return Err(VaultError::BonezContractNotSet);
			}
		}
		let ledger = self.custodial_ledger().await?;

		{
			let _guard = self.guard.enter()?;
			match ledger
				.transfer_from(self.address, caller, self.address, amount)
				.await
			{
				Ok(true) => {},
				Ok(false) => {
					return Err(VaultError::TransferFailed(
						"ledger rejected the transfer".into(),
					))
				},
				Err(e) => return Err(VaultError::TransferFailed(e.to_string())),
			}
		}

		Ok(self.commit(VaultEvent::Deposit { caller, amount }).await)
	}

	/// Releases `amount` to `caller` under an authorization from the trusted
	/// signer.
	///
	/// Checks run in a fixed order so the reported error is well defined:
	/// pause, amount, deadline, nonce, token, balance, signature. The nonce
	/// is consumed before funds move and restored if the release fails.
	pub async fn withdraw(
		&self,
		caller: Address,
		amount: U256,
		nonce: u64,
		deadline: u64,
		signature: &[u8],
	) -> Result<VaultEvent, VaultError> {
		let now = self.clock.now();
		{
			let inner = self.inner();
			if inner.state.paused {
				return Err(VaultError::PausedUnavailable);
			}
			if amount.is_zero() {
				return Err(VaultError::ZeroAmount);
			}
			if AuthorizationVerifier::is_expired(deadline, now) {
				return Err(VaultError::SignatureExpired { deadline, now });
			}
			let expected = inner.state.nonce_of(&caller);
			if expected != nonce {
				return Err(VaultError::InvalidNonce {
					expected,
					provided: nonce,
				});
			}
			if inner.state.token.is_none() {
				return Err(VaultError::BonezContractNotSet);
			}
		}

		let ledger = self.custodial_ledger().await?;
		let available = ledger
			.balance_of(self.address)
			.await
			.map_err(|e| VaultError::Ledger(e.to_string()))?;
		if available < amount {
			return Err(VaultError::InsufficientContractBalance {
				requested: amount,
				available,
			});
		}

		let authorization = self.authorization(amount, nonce, deadline, caller);
		let signer = self.inner().state.signer;
		if !self
			.verifier
			.signature_matches(&authorization, signature, signer)?
		{
			tracing::warn!(
				caller = %caller,
				nonce,
				digest = %truncate_id(&self.verifier.digest(&authorization).to_string()),
				"Rejected withdrawal signature"
			);
			return Err(VaultError::InvalidSignature);
		}

		// Effects before interactions.
		self.inner().state.advance_nonce(caller, nonce)?;

		if let Err(e) = self.release(ledger.as_ref(), caller, amount).await {
			self.inner().state.rewind_nonce(caller, nonce);
			tracing::warn!(caller = %caller, nonce, error = %e, "Withdrawal release failed");
			return Err(e);
		}

		Ok(self
			.commit(VaultEvent::Withdraw {
				caller,
				amount,
				nonce,
			})
			.await)
	}

	/// Replaces the custodial token contract. The new address must hold
	/// deployed code.
	pub async fn set_token_contract(
		&self,
		caller: Address,
		token: Address,
	) -> Result<VaultEvent, VaultError> {
		self.inner().state.require_owner(caller)?;
		if token == Address::ZERO {
			return Err(VaultError::ZeroAddress);
		}
		if !self.contracts.has_code(&token).await {
			return Err(VaultError::InvalidTokenContract(token));
		}

		let old = self.owner_update(caller, |state| Ok(state.token.replace(token)))?;
		Ok(self.commit(VaultEvent::LedgerUpdated { old, new: token }).await)
	}

	/// Replaces the trusted signer. Nonces are untouched; authorizations
	/// issued by the previous signer stop verifying immediately.
	pub async fn set_signer(&self, caller: Address, signer: Address) -> Result<VaultEvent, VaultError> {
		let old = self.owner_update(caller, |state| {
			if signer == Address::ZERO {
				return Err(VaultError::ZeroAddress);
			}
			Ok(std::mem::replace(&mut state.signer, signer))
		})?;
		Ok(self.commit(VaultEvent::SignerUpdated { old, new: signer }).await)
	}

	/// Sweeps the whole custodial token balance to the owner.
	pub async fn emergency_withdraw(&self, caller: Address) -> Result<VaultEvent, VaultError> {
		let owner = {
			let inner = self.inner();
			inner.state.require_owner(caller)?;
			if inner.state.token.is_none() {
				return Err(VaultError::BonezContractNotSet);
			}
			inner.state.owner
		};
		let ledger = self.custodial_ledger().await?;

		let amount = {
			let _guard = self.guard.enter()?;
			let amount = ledger
				.balance_of(self.address)
				.await
				.map_err(|e| VaultError::Ledger(e.to_string()))?;
			match ledger.transfer(self.address, owner, amount).await {
				Ok(true) => amount,
				Ok(false) => {
					return Err(VaultError::TransferFailed(
						"ledger rejected the transfer".into(),
					))
				},
				Err(e) => return Err(VaultError::TransferFailed(e.to_string())),
			}
		};

		Ok(self.commit(VaultEvent::EmergencySweep { owner, amount }).await)
	}

	/// Sweeps the whole native balance to the owner.
	pub async fn withdraw_native(&self, caller: Address) -> Result<VaultEvent, VaultError> {
		let owner = {
			let inner = self.inner();
			inner.state.require_owner(caller)?;
			inner.state.owner
		};

		let amount = {
			let _guard = self.guard.enter()?;
			let amount = self
				.native
				.balance_of(self.address)
				.await
				.map_err(|e| VaultError::Ledger(e.to_string()))?;
			self.native
				.transfer(self.address, owner, amount)
				.await
				.map_err(|e| VaultError::TransferFailed(e.to_string()))?;
			amount
		};

		Ok(self.commit(VaultEvent::NativeSweep { owner, amount }).await)
	}

	/// Suspends deposits and withdrawals.
	pub async fn pause(&self, caller: Address) -> Result<VaultEvent, VaultError> {
		self.owner_update(caller, |state| {
			if state.paused {
				return Err(VaultError::PausedUnavailable);
			}
			state.paused = true;
			Ok(())
		})?;
		Ok(self.commit(VaultEvent::Paused { account: caller }).await)
	}

	/// Resumes deposits and withdrawals.
	pub async fn unpause(&self, caller: Address) -> Result<VaultEvent, VaultError> {
		self.owner_update(caller, |state| {
			if !state.paused {
				return Err(VaultError::NotPaused);
			}
			state.paused = false;
			Ok(())
		})?;
		Ok(self.commit(VaultEvent::Unpaused { account: caller }).await)
	}

	/// Hands ownership to `new_owner`.
	pub async fn transfer_ownership(
		&self,
		caller: Address,
		new_owner: Address,
	) -> Result<VaultEvent, VaultError> {
		let old = self.owner_update(caller, |state| {
			if new_owner == Address::ZERO {
				return Err(VaultError::ZeroAddress);
			}
			Ok(std::mem::replace(&mut state.owner, new_owner))
		})?;
		Ok(self
			.commit(VaultEvent::OwnershipTransferred {
				old,
				new: new_owner,
			})
			.await)
	}

	/// Checks an authorization against the current signer and clock without
	/// touching any state.
	pub fn verify(
		&self,
		amount: U256,
		nonce: u64,
		deadline: u64,
		account: Address,
		signature: &[u8],
	) -> Result<bool, VaultError> {
		let authorization = self.authorization(amount, nonce, deadline, account);
		let signer = self.inner().state.signer;
		self.verifier
			.verify(&authorization, signature, signer, self.clock.now())
	}

	fn authorization(
		&self,
		amount: U256,
		nonce: u64,
		deadline: u64,
		account: Address,
	) -> WithdrawAuthorization {
		WithdrawAuthorization {
			vault: self.address,
			amount,
			nonce,
			account,
			deadline,
		}
	}

	/// Digest the trusted signer must sign to authorize this withdrawal.
	pub fn withdraw_digest(&self, amount: U256, nonce: u64, deadline: u64, account: Address) -> B256 {
		self.verifier
			.digest(&self.authorization(amount, nonce, deadline, account))
	}

	pub fn address(&self) -> Address {
		self.address
	}

	pub fn domain(&self) -> &VaultDomain {
		self.verifier.domain()
	}

	pub fn domain_separator(&self) -> B256 {
		self.verifier.separator()
	}

	/// Next nonce `account` must present.
	pub fn nonce_of(&self, account: &Address) -> u64 {
		self.inner().state.nonce_of(account)
	}

	pub fn token_contract(&self) -> Option<Address> {
		self.inner().state.token
	}

	pub fn signer(&self) -> Address {
		self.inner().state.signer
	}

	pub fn owner(&self) -> Address {
		self.inner().state.owner
	}

	pub fn is_paused(&self) -> bool {
		self.inner().state.paused
	}

	pub fn state(&self) -> VaultState {
		self.snapshot()
	}

	/// The audit log, oldest first.
	pub fn events(&self) -> Vec<VaultEvent> {
		self.inner().events.clone()
	}

	pub fn event_bus(&self) -> &event_bus::EventBus {
		&self.event_bus
	}

	/// Custodial token balance, or `None` when no token is configured.
	pub async fn custodial_balance(&self) -> Result<Option<U256>, VaultError> {
		if self.token_contract().is_none() {
			return Ok(None);
		}
		let ledger = self.custodial_ledger().await?;
		ledger
			.balance_of(self.address)
			.await
			.map(Some)
			.map_err(|e| VaultError::Ledger(e.to_string()))
	}
}

/// Serialized entry point to a [`Vault`].
///
/// External callers go through here so only one state-changing call runs at
/// a time. Reads go straight to [`VaultService::vault`].
pub struct VaultService {
	vault: Arc<Vault>,
	execution: tokio::sync::Mutex<()>,
}

impl VaultService {
	pub fn new(vault: Arc<Vault>) -> Self {
		Self {
			vault,
			execution: tokio::sync::Mutex::new(()),
		}
	}

	pub fn vault(&self) -> &Arc<Vault> {
		&self.vault
	}

	#[instrument(skip_all, fields(caller = %call.caller, action = %call.action, nonce = call.nonce))]
	pub async fn execute(
		&self,
		call: CallAuthorization,
		signature: &[u8],
	) -> Result<VaultEvent, VaultError> {
		let _permit = self.execution.lock().await;
		self.vault.execute(call, signature).await
	}

	#[instrument(skip_all, fields(caller = %caller, amount = %amount))]
	pub async fn deposit(&self, caller: Address, amount: U256) -> Result<VaultEvent, VaultError> {
		let _permit = self.execution.lock().await;
		self.vault.deposit(caller, amount).await
	}

	#[instrument(skip_all, fields(caller = %caller, amount = %amount, nonce = nonce))]
	pub async fn withdraw(
		&self,
		caller: Address,
		amount: U256,
		nonce: u64,
		deadline: u64,
		signature: &[u8],
	) -> Result<VaultEvent, VaultError> {
		let _permit = self.execution.lock().await;
		self.vault
			.withdraw(caller, amount, nonce, deadline, signature)
			.await
	}

	#[instrument(skip_all, fields(caller = %caller, token = %token))]
	pub async fn set_token_contract(
		&self,
		caller: Address,
		token: Address,
	) -> Result<VaultEvent, VaultError> {
		let _permit = self.execution.lock().await;
		self.vault.set_token_contract(caller, token).await
	}

	#[instrument(skip_all, fields(caller = %caller, signer = %signer))]
	pub async fn set_signer(&self, caller: Address, signer: Address) -> Result<VaultEvent, VaultError> {
		let _permit = self.execution.lock().await;
		self.vault.set_signer(caller, signer).await
	}

	#[instrument(skip_all, fields(caller = %caller))]
	pub async fn emergency_withdraw(&self, caller: Address) -> Result<VaultEvent, VaultError> {
		let _permit = self.execution.lock().await;
		self.vault.emergency_withdraw(caller).await
	}

	#[instrument(skip_all, fields(caller = %caller))]
	pub async fn withdraw_native(&self, caller: Address) -> Result<VaultEvent, VaultError> {
		let _permit = self.execution.lock().await;
		self.vault.withdraw_native(caller).await
	}

	#[instrument(skip_all, fields(caller = %caller))]
	pub async fn pause(&self, caller: Address) -> Result<VaultEvent, VaultError> {
		let _permit = self.execution.lock().await;
		self.vault.pause(caller).await
	}

	#[instrument(skip_all, fields(caller = %caller))]
	pub async fn unpause(&self, caller: Address) -> Result<VaultEvent, VaultError> {
		let _permit = self.execution.lock().await;
		self.vault.unpause(caller).await
	}

	#[instrument(skip_all, fields(caller = %caller, new_owner = %new_owner))]
	pub async fn transfer_ownership(
		&self,
		caller: Address,
		new_owner: Address,
	) -> Result<VaultEvent, VaultError> {
		let _permit = self.execution.lock().await;
		self.vault.transfer_ownership(caller, new_owner).await
	}
}
