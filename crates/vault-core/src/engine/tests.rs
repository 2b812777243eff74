use super::*;
use crate::clock::ManualClock;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;
use vault_account::{implementations::local::LocalAccount, AccountService};
use vault_ledger::{
	implementations::{memory::MemoryLedger, native::MemoryNative},
	LedgerError,
};
use vault_storage::{
	implementations::{file::FileStorage, memory::MemoryStorage},
	StorageService,
};

const SIGNER_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
const NEW_SIGNER_KEY: &str = "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";

const NOW: u64 = 1_700_000_000;
const DEADLINE: u64 = NOW + 3_600;

/// A nested withdrawal the ledger attempts while releasing funds.
struct Reentry {
	caller: Address,
	amount: U256,
	nonce: u64,
	signature: Vec<u8>,
}

/// Token ledger that can refuse transfers or call back into the vault.
struct ScriptedLedger {
	inner: MemoryLedger,
	vault: OnceLock<Arc<Vault>>,
	reentry: Mutex<Option<Reentry>>,
	nested: Mutex<Vec<Result<VaultEvent, VaultError>>>,
	refuse: AtomicBool,
}

impl ScriptedLedger {
	fn new(address: Address) -> Self {
		Self {
			inner: MemoryLedger::new(address),
			vault: OnceLock::new(),
			reentry: Mutex::new(None),
			nested: Mutex::new(Vec::new()),
			refuse: AtomicBool::new(false),
		}
	}

	fn reenter_with(&self, reentry: Reentry) {
		*self.reentry.lock().unwrap() = Some(reentry);
	}

	fn take_nested(&self) -> Vec<Result<VaultEvent, VaultError>> {
		std::mem::take(&mut *self.nested.lock().unwrap())
	}
}

#[async_trait]
impl LedgerInterface for ScriptedLedger {
	fn address(&self) -> Address {
		self.inner.address()
	}

	async fn balance_of(&self, account: Address) -> Result<U256, LedgerError> {
		self.inner.balance_of(account).await
	}

	async fn transfer(&self, from: Address, to: Address, amount: U256) -> Result<bool, LedgerError> {
		if self.refuse.load(Ordering::SeqCst) {
			return Ok(false);
		}
		let reentry = self.reentry.lock().unwrap().take();
		if let (Some(reentry), Some(vault)) = (reentry, self.vault.get()) {
			let result = vault
				.withdraw(
					reentry.caller,
					reentry.amount,
					reentry.nonce,
					DEADLINE,
					&reentry.signature,
				)
				.await;
			self.nested.lock().unwrap().push(result);
		}
		self.inner.transfer(from, to, amount).await
	}

	async fn transfer_from(
		&self,
		spender: Address,
		from: Address,
		to: Address,
		amount: U256,
	) -> Result<bool, LedgerError> {
		self.inner.transfer_from(spender, from, to, amount).await
	}
}

struct Harness {
	vault: Arc<Vault>,
	ledger: Arc<ScriptedLedger>,
	native: Arc<MemoryNative>,
	contracts: ContractRegistry,
	clock: Arc<ManualClock>,
	signer: AccountService,
	owner: Address,
	user: Address,
}

fn account(key: &str) -> AccountService {
	AccountService::new(Box::new(LocalAccount::new(key).unwrap()))
}

fn memory_store() -> VaultStore {
	VaultStore::new(Arc::new(StorageService::new(Box::new(MemoryStorage::new()))))
}

async fn harness_with(token_set: bool, store: VaultStore) -> Harness {
	let token = Address::repeat_byte(0xee);
	let vault_address = Address::repeat_byte(0x5f);
	let owner = Address::repeat_byte(0x0a);
	let user = Address::repeat_byte(0x0b);

	let ledger = Arc::new(ScriptedLedger::new(token));
	let contracts = ContractRegistry::new();
	contracts.register(ledger.clone()).await;
	let native = Arc::new(MemoryNative::new());
	let clock = Arc::new(ManualClock::new(NOW));
	let signer = account(SIGNER_KEY);

	let state = VaultState::new(
		owner,
		signer.get_address().await.unwrap(),
		token_set.then_some(token),
	);
	let (state, events) = store.load(state).await.unwrap();
	let vault = Arc::new(
		Vault::new(
			VaultDomain::new("BonezVault", "1", 31337, vault_address),
			state,
			events,
			contracts.clone(),
			native.clone(),
			clock.clone(),
			store,
			event_bus::EventBus::default(),
		)
		.unwrap(),
	);
	assert!(ledger.vault.set(vault.clone()).is_ok());

	ledger.inner.mint(user, U256::from(100)).await.unwrap();
	ledger
		.inner
		.approve(user, vault_address, U256::from(100))
		.await
		.unwrap();

	Harness {
		vault,
		ledger,
		native,
		contracts,
		clock,
		signer,
		owner,
		user,
	}
}

async fn harness() -> Harness {
	harness_with(true, memory_store()).await
}

impl Harness {
	async fn sign_with(
		&self,
		signer: &AccountService,
		amount: u64,
		nonce: u64,
		deadline: u64,
	) -> Vec<u8> {
		let authorization = WithdrawAuthorization {
			vault: self.vault.address(),
			amount: U256::from(amount),
			nonce,
			account: self.user,
			deadline,
		};
		signer
			.sign_withdrawal(self.vault.domain(), &authorization)
			.await
			.unwrap()
	}

	async fn sign(&self, amount: u64, nonce: u64) -> Vec<u8> {
		self.sign_with(&self.signer, amount, nonce, DEADLINE).await
	}

	async fn withdraw(&self, amount: u64, nonce: u64, signature: &[u8]) -> Result<VaultEvent, VaultError> {
		self.vault
			.withdraw(self.user, U256::from(amount), nonce, DEADLINE, signature)
			.await
	}

	async fn custody(&self) -> U256 {
		self.vault.custodial_balance().await.unwrap().unwrap()
	}

	fn call(&self, caller: Address, action: CallAction, nonce: u64) -> CallAuthorization {
		CallAuthorization::new(self.vault.address(), caller, action, nonce, DEADLINE)
	}

	async fn sign_call(&self, key: &str, call: &CallAuthorization) -> Vec<u8> {
		account(key)
			.sign_call(self.vault.domain(), call)
			.await
			.unwrap()
	}

	/// Hands the vault to the holder of `key` and returns its address.
	async fn own_with(&self, key: &str) -> Address {
		let owner = account(key).get_address().await.unwrap();
		self.vault.transfer_ownership(self.owner, owner).await.unwrap();
		owner
	}
}

#[tokio::test]
async fn test_deposit_and_sequential_withdrawals() {
	let h = harness().await;

	let event = h.vault.deposit(h.user, U256::from(100)).await.unwrap();
	assert_eq!(
		event,
		VaultEvent::Deposit {
			caller: h.user,
			amount: U256::from(100)
		}
	);
	assert_eq!(h.custody().await, U256::from(100));

	let first = h.sign(50, 0).await;
	let event = h.withdraw(50, 0, &first).await.unwrap();
	assert_eq!(
		event,
		VaultEvent::Withdraw {
			caller: h.user,
			amount: U256::from(50),
			nonce: 0
		}
	);
	assert_eq!(h.custody().await, U256::from(50));
	assert_eq!(h.vault.nonce_of(&h.user), 1);

	// Replaying the consumed authorization never succeeds.
	for _ in 0..2 {
		assert!(matches!(
			h.withdraw(50, 0, &first).await,
			Err(VaultError::InvalidNonce {
				expected: 1,
				provided: 0
			})
		));
	}

	let second = h.sign(50, 1).await;
	h.withdraw(50, 1, &second).await.unwrap();
	assert_eq!(h.custody().await, U256::ZERO);
	assert_eq!(h.vault.nonce_of(&h.user), 2);
	assert_eq!(h.ledger.balance_of(h.user).await.unwrap(), U256::from(100));
	assert_eq!(h.vault.events().len(), 3);
}

#[tokio::test]
async fn test_future_nonce_rejected_with_valid_signature() {
	let h = harness().await;
	h.vault.deposit(h.user, U256::from(100)).await.unwrap();

	let ahead = h.sign(10, 1).await;
	assert!(h.vault.verify(U256::from(10), 1, DEADLINE, h.user, &ahead).unwrap());
	assert!(matches!(
		h.withdraw(10, 1, &ahead).await,
		Err(VaultError::InvalidNonce {
			expected: 0,
			provided: 1
		})
	));
	assert_eq!(h.vault.nonce_of(&h.user), 0);
}

#[tokio::test]
async fn test_expired_is_distinct_from_forged() {
	let h = harness().await;
	h.vault.deposit(h.user, U256::from(100)).await.unwrap();

	let expiring = h.sign_with(&h.signer, 10, 0, NOW + 10).await;
	assert!(h
		.vault
		.verify(U256::from(10), 0, NOW + 10, h.user, &expiring)
		.unwrap());

	h.clock.advance(11);
	assert!(!h
		.vault
		.verify(U256::from(10), 0, NOW + 10, h.user, &expiring)
		.unwrap());
	assert!(matches!(
		h.vault
			.withdraw(h.user, U256::from(10), 0, NOW + 10, &expiring)
			.await,
		Err(VaultError::SignatureExpired { .. })
	));

	let forged = h.sign_with(&account(NEW_SIGNER_KEY), 10, 0, DEADLINE).await;
	assert!(matches!(
		h.withdraw(10, 0, &forged).await,
		Err(VaultError::InvalidSignature)
	));
	assert_eq!(h.vault.nonce_of(&h.user), 0);
}

#[tokio::test]
async fn test_balance_gates_withdrawal() {
	let h = harness().await;
	h.vault.deposit(h.user, U256::from(10)).await.unwrap();

	let signature = h.sign(50, 0).await;
	assert!(matches!(
		h.withdraw(50, 0, &signature).await,
		Err(VaultError::InsufficientContractBalance { requested, available })
			if requested == U256::from(50) && available == U256::from(10)
	));
	assert_eq!(h.vault.nonce_of(&h.user), 0);
}

#[tokio::test]
async fn test_error_precedence() {
	let h = harness().await;
	h.vault.deposit(h.user, U256::from(10)).await.unwrap();
	let past = NOW - 1;

	// amount before deadline
	assert!(matches!(
		h.vault.withdraw(h.user, U256::ZERO, 9, past, &[]).await,
		Err(VaultError::ZeroAmount)
	));
	// deadline before nonce
	assert!(matches!(
		h.vault.withdraw(h.user, U256::from(1), 9, past, &[]).await,
		Err(VaultError::SignatureExpired { deadline, now }) if deadline == past && now == NOW
	));
	// nonce before balance
	assert!(matches!(
		h.withdraw(500, 9, &[]).await,
		Err(VaultError::InvalidNonce { .. })
	));
	// balance before signature
	assert!(matches!(
		h.withdraw(500, 0, &[]).await,
		Err(VaultError::InsufficientContractBalance { .. })
	));
	// malformed signature is an error of its own
	assert!(matches!(
		h.withdraw(5, 0, &[0u8; 64]).await,
		Err(VaultError::InvalidSignatureLength(64))
	));
	assert!(matches!(
		h.vault.verify(U256::from(5), 0, DEADLINE, h.user, &[0u8; 66]),
		Err(VaultError::InvalidSignatureLength(66))
	));
	assert!(matches!(
		h.withdraw(5, 0, &[0u8; 65]).await,
		Err(VaultError::InvalidSignature)
	));
}

#[tokio::test]
async fn test_pause_gate() {
	let h = harness().await;
	h.vault.deposit(h.user, U256::from(100)).await.unwrap();
	let signature = h.sign(10, 0).await;

	assert!(matches!(
		h.vault.pause(h.user).await,
		Err(VaultError::Unauthorized(caller)) if caller == h.user
	));
	assert_eq!(
		h.vault.pause(h.owner).await.unwrap(),
		VaultEvent::Paused { account: h.owner }
	);
	assert!(h.vault.is_paused());
	assert!(matches!(
		h.vault.pause(h.owner).await,
		Err(VaultError::PausedUnavailable)
	));

	assert!(matches!(
		h.vault.deposit(h.user, U256::from(1)).await,
		Err(VaultError::PausedUnavailable)
	));
	assert!(matches!(
		h.vault.deposit(h.user, U256::ZERO).await,
		Err(VaultError::PausedUnavailable)
	));
	assert!(matches!(
		h.withdraw(10, 0, &signature).await,
		Err(VaultError::PausedUnavailable)
	));
	// Verification stays available while paused.
	assert!(h.vault.verify(U256::from(10), 0, DEADLINE, h.user, &signature).unwrap());

	h.vault.unpause(h.owner).await.unwrap();
	assert!(matches!(
		h.vault.unpause(h.owner).await,
		Err(VaultError::NotPaused)
	));
	h.withdraw(10, 0, &signature).await.unwrap();
	assert_eq!(h.vault.nonce_of(&h.user), 1);
}

#[tokio::test]
async fn test_signer_rotation() {
	let h = harness().await;
	h.vault.deposit(h.user, U256::from(100)).await.unwrap();
	let new_signer = account(NEW_SIGNER_KEY);
	let new_address = new_signer.get_address().await.unwrap();
	let old_address = h.vault.signer();

	assert!(matches!(
		h.vault.set_signer(h.user, new_address).await,
		Err(VaultError::Unauthorized(_))
	));
	assert!(matches!(
		h.vault.set_signer(h.owner, Address::ZERO).await,
		Err(VaultError::ZeroAddress)
	));

	let event = h.vault.set_signer(h.owner, new_address).await.unwrap();
	assert_eq!(
		event,
		VaultEvent::SignerUpdated {
			old: old_address,
			new: new_address
		}
	);
	assert_eq!(h.vault.nonce_of(&h.user), 0);

	let stale = h.sign(10, 0).await;
	assert!(!h.vault.verify(U256::from(10), 0, DEADLINE, h.user, &stale).unwrap());
	assert!(matches!(
		h.withdraw(10, 0, &stale).await,
		Err(VaultError::InvalidSignature)
	));

	let fresh = h.sign_with(&new_signer, 10, 0, DEADLINE).await;
	assert!(h.vault.verify(U256::from(10), 0, DEADLINE, h.user, &fresh).unwrap());
	h.withdraw(10, 0, &fresh).await.unwrap();
}

#[tokio::test]
async fn test_set_token_contract() {
	let h = harness().await;
	let old = h.vault.token_contract();
	let replacement = Address::repeat_byte(0xcc);

	assert!(matches!(
		h.vault.set_token_contract(h.owner, Address::ZERO).await,
		Err(VaultError::ZeroAddress)
	));
	assert!(matches!(
		h.vault.set_token_contract(h.owner, replacement).await,
		Err(VaultError::InvalidTokenContract(token)) if token == replacement
	));

	h.contracts
		.register(Arc::new(MemoryLedger::new(replacement)))
		.await;
	assert!(matches!(
		h.vault.set_token_contract(h.user, replacement).await,
		Err(VaultError::Unauthorized(_))
	));
	let event = h
		.vault
		.set_token_contract(h.owner, replacement)
		.await
		.unwrap();
	assert_eq!(
		event,
		VaultEvent::LedgerUpdated {
			old,
			new: replacement
		}
	);
	assert_eq!(h.vault.token_contract(), Some(replacement));
	assert_eq!(h.custody().await, U256::ZERO);
}

#[tokio::test]
async fn test_operations_require_token_contract() {
	let h = harness_with(false, memory_store()).await;
	let signature = h.sign(10, 0).await;

	assert!(matches!(
		h.vault.deposit(h.user, U256::from(10)).await,
		Err(VaultError::BonezContractNotSet)
	));
	assert!(matches!(
		h.withdraw(10, 0, &signature).await,
		Err(VaultError::BonezContractNotSet)
	));
	assert!(matches!(
		h.vault.emergency_withdraw(h.owner).await,
		Err(VaultError::BonezContractNotSet)
	));
	assert_eq!(h.vault.custodial_balance().await.unwrap(), None);

	let token = h.ledger.address();
	h.vault.set_token_contract(h.owner, token).await.unwrap();
	assert!(matches!(
		h.vault.events().last(),
		Some(VaultEvent::LedgerUpdated { old: None, new }) if *new == token
	));
	h.vault.deposit(h.user, U256::from(10)).await.unwrap();
}

#[tokio::test]
async fn test_reentrant_withdrawal_rejected() {
	let h = harness().await;
	h.vault.deposit(h.user, U256::from(100)).await.unwrap();

	// Replay of the nonce being consumed.
	let first = h.sign(30, 0).await;
	h.ledger.reenter_with(Reentry {
		caller: h.user,
		amount: U256::from(30),
		nonce: 0,
		signature: first.clone(),
	});
	h.withdraw(30, 0, &first).await.unwrap();
	let nested = h.ledger.take_nested();
	assert_eq!(nested.len(), 1);
	assert!(matches!(
		nested[0],
		Err(VaultError::InvalidNonce {
			expected: 1,
			provided: 0
		})
	));

	// A correctly signed follow-up still hits the guard.
	let second = h.sign(30, 1).await;
	let third = h.sign(30, 2).await;
	h.ledger.reenter_with(Reentry {
		caller: h.user,
		amount: U256::from(30),
		nonce: 2,
		signature: third.clone(),
	});
	h.withdraw(30, 1, &second).await.unwrap();
	let nested = h.ledger.take_nested();
	assert!(matches!(nested[..], [Err(VaultError::ReentrantCall)]));

	assert_eq!(h.vault.nonce_of(&h.user), 2);
	assert_eq!(h.custody().await, U256::from(40));
	assert_eq!(h.vault.events().len(), 3);

	// The rolled-back nonce is usable once the outer call has finished.
	h.withdraw(30, 2, &third).await.unwrap();
	assert_eq!(h.custody().await, U256::from(10));
}

#[tokio::test]
async fn test_failed_release_leaves_no_trace() {
	let h = harness().await;
	h.vault.deposit(h.user, U256::from(100)).await.unwrap();
	let signature = h.sign(40, 0).await;

	h.ledger.refuse.store(true, Ordering::SeqCst);
	assert!(matches!(
		h.withdraw(40, 0, &signature).await,
		Err(VaultError::TransferFailed(_))
	));
	assert_eq!(h.vault.nonce_of(&h.user), 0);
	assert_eq!(h.custody().await, U256::from(100));
	assert_eq!(h.vault.events().len(), 1);

	h.ledger.refuse.store(false, Ordering::SeqCst);
	h.withdraw(40, 0, &signature).await.unwrap();
	assert_eq!(h.vault.nonce_of(&h.user), 1);
}

#[tokio::test]
async fn test_emergency_and_native_sweeps() {
	let h = harness().await;
	h.vault.deposit(h.user, U256::from(100)).await.unwrap();
	h.native
		.credit(h.vault.address(), U256::from(5))
		.await
		.unwrap();

	assert!(matches!(
		h.vault.emergency_withdraw(h.user).await,
		Err(VaultError::Unauthorized(_))
	));
	assert!(matches!(
		h.vault.withdraw_native(h.user).await,
		Err(VaultError::Unauthorized(_))
	));

	assert_eq!(
		h.vault.emergency_withdraw(h.owner).await.unwrap(),
		VaultEvent::EmergencySweep {
			owner: h.owner,
			amount: U256::from(100)
		}
	);
	assert_eq!(h.custody().await, U256::ZERO);
	assert_eq!(h.ledger.balance_of(h.owner).await.unwrap(), U256::from(100));

	assert_eq!(
		h.vault.withdraw_native(h.owner).await.unwrap(),
		VaultEvent::NativeSweep {
			owner: h.owner,
			amount: U256::from(5)
		}
	);
	assert_eq!(h.native.balance_of(h.owner).await.unwrap(), U256::from(5));
}

#[tokio::test]
async fn test_transfer_ownership() {
	let h = harness().await;
	let next = Address::repeat_byte(0x0c);

	assert!(matches!(
		h.vault.transfer_ownership(h.owner, Address::ZERO).await,
		Err(VaultError::ZeroAddress)
	));
	h.vault.transfer_ownership(h.owner, next).await.unwrap();
	assert_eq!(h.vault.owner(), next);
	assert!(matches!(
		h.vault.pause(h.owner).await,
		Err(VaultError::Unauthorized(_))
	));
	h.vault.pause(next).await.unwrap();
}

#[tokio::test]
async fn test_events_are_published() {
	let h = harness().await;
	let mut receiver = h.vault.event_bus().subscribe();

	h.vault.deposit(h.user, U256::from(5)).await.unwrap();
	h.vault.pause(h.owner).await.unwrap();

	assert!(matches!(
		receiver.recv().await.unwrap(),
		VaultEvent::Deposit { .. }
	));
	assert_eq!(
		receiver.recv().await.unwrap(),
		VaultEvent::Paused { account: h.owner }
	);
	assert_eq!(h.vault.events().len(), 2);
}

#[tokio::test]
async fn test_digest_matches_signed_authorization() {
	let h = harness().await;
	let authorization = WithdrawAuthorization {
		vault: h.vault.address(),
		amount: U256::from(7),
		nonce: 3,
		account: h.user,
		deadline: DEADLINE,
	};

	assert_eq!(
		h.vault.withdraw_digest(U256::from(7), 3, DEADLINE, h.user),
		authorization.digest(h.vault.domain())
	);
	assert_eq!(h.vault.domain_separator(), h.vault.domain().separator());
}

#[tokio::test]
async fn test_service_serializes_competing_withdrawals() {
	let h = harness().await;
	h.vault.deposit(h.user, U256::from(100)).await.unwrap();
	let signature = h.sign(60, 0).await;
	let service = VaultService::new(h.vault.clone());

	let (a, b) = tokio::join!(
		service.withdraw(h.user, U256::from(60), 0, DEADLINE, &signature),
		service.withdraw(h.user, U256::from(60), 0, DEADLINE, &signature),
	);
	let outcomes = [a, b];
	assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
	assert!(outcomes
		.iter()
		.any(|r| matches!(r, Err(VaultError::InvalidNonce { .. }))));
	assert_eq!(h.custody().await, U256::from(40));
}

#[tokio::test]
async fn test_state_survives_reload() {
	let dir = tempfile::tempdir().unwrap();
	let store = || {
		VaultStore::new(Arc::new(StorageService::new(Box::new(FileStorage::new(
			dir.path().to_path_buf(),
		)))))
	};

	{
		let h = harness_with(true, store()).await;
		h.vault.deposit(h.user, U256::from(50)).await.unwrap();
		let signature = h.sign(20, 0).await;
		h.withdraw(20, 0, &signature).await.unwrap();
		h.vault.pause(h.owner).await.unwrap();
	}

	let h = harness_with(true, store()).await;
	assert_eq!(h.vault.nonce_of(&h.user), 1);
	assert!(h.vault.is_paused());
	assert_eq!(h.vault.events().len(), 3);
	assert!(matches!(
		h.vault.events()[1],
		VaultEvent::Withdraw { nonce: 0, .. }
	));
}

#[tokio::test]
async fn test_signed_calls_act_for_their_signer() {
	let h = harness().await;
	let owner = h.own_with(NEW_SIGNER_KEY).await;

	let pause = h.call(owner, CallAction::Pause, 0);
	let signature = h.sign_call(NEW_SIGNER_KEY, &pause).await;
	assert_eq!(
		h.vault.execute(pause, &signature).await.unwrap(),
		VaultEvent::Paused { account: owner }
	);
	assert_eq!(h.vault.call_nonce_of(&owner), 1);
	assert!(matches!(
		h.vault.execute(pause, &signature).await,
		Err(VaultError::InvalidNonce {
			expected: 1,
			provided: 0
		})
	));

	let new_signer = Address::repeat_byte(0x42);
	let rotate = h
		.call(owner, CallAction::SetSigner, 1)
		.with_target(new_signer);
	let signature = h.sign_call(NEW_SIGNER_KEY, &rotate).await;
	h.vault.execute(rotate, &signature).await.unwrap();
	assert_eq!(h.vault.signer(), new_signer);
	// Withdrawal nonces are a separate sequence.
	assert_eq!(h.vault.nonce_of(&owner), 0);
}

#[tokio::test]
async fn test_claiming_the_owner_without_its_key_is_unauthorized() {
	let h = harness().await;
	let owner = h.own_with(NEW_SIGNER_KEY).await;
	let signer = h.vault.signer();

	// Signed by a different key while naming the owner as caller.
	let rotate = h
		.call(owner, CallAction::SetSigner, 0)
		.with_target(Address::repeat_byte(0x66));
	let forged = h.sign_call(SIGNER_KEY, &rotate).await;
	assert!(matches!(
		h.vault.execute(rotate, &forged).await,
		Err(VaultError::Unauthorized(caller)) if caller == owner
	));

	// A genuine signature for another vault does not transfer.
	let elsewhere = CallAuthorization {
		vault: Address::repeat_byte(0x99),
		..rotate
	};
	let signature = h.sign_call(NEW_SIGNER_KEY, &elsewhere).await;
	assert!(matches!(
		h.vault.execute(elsewhere, &signature).await,
		Err(VaultError::Unauthorized(_))
	));

	let genuine = h.sign_call(NEW_SIGNER_KEY, &rotate).await;
	assert!(matches!(
		h.vault.execute(rotate, &genuine[..64]).await,
		Err(VaultError::InvalidSignatureLength(64))
	));
	h.clock.set(DEADLINE + 1);
	assert!(matches!(
		h.vault.execute(rotate, &genuine).await,
		Err(VaultError::SignatureExpired { .. })
	));

	assert_eq!(h.vault.signer(), signer);
	assert_eq!(h.vault.call_nonce_of(&owner), 0);
}

#[tokio::test]
async fn test_signed_call_from_non_owner_is_rejected() {
	let h = harness().await;
	let outsider = account(NEW_SIGNER_KEY).get_address().await.unwrap();

	let pause = h.call(outsider, CallAction::Pause, 0);
	let signature = h.sign_call(NEW_SIGNER_KEY, &pause).await;
	assert!(matches!(
		h.vault.execute(pause, &signature).await,
		Err(VaultError::Unauthorized(_))
	));
	assert!(!h.vault.is_paused());
}

#[tokio::test]
async fn test_signed_deposit_pulls_from_signer() {
	let h = harness().await;
	let depositor = account(NEW_SIGNER_KEY).get_address().await.unwrap();
	h.ledger.inner.mint(depositor, U256::from(30)).await.unwrap();
	h.ledger
		.inner
		.approve(depositor, h.vault.address(), U256::from(30))
		.await
		.unwrap();

	let deposit = h
		.call(depositor, CallAction::Deposit, 0)
		.with_amount(U256::from(30));
	let signature = h.sign_call(NEW_SIGNER_KEY, &deposit).await;
	assert_eq!(
		h.vault.execute(deposit, &signature).await.unwrap(),
		VaultEvent::Deposit {
			caller: depositor,
			amount: U256::from(30)
		}
	);
	assert_eq!(h.custody().await, U256::from(30));

	// The amount is part of what was signed.
	let inflated = h
		.call(depositor, CallAction::Deposit, 1)
		.with_amount(U256::from(31));
	let signature = h.sign_call(NEW_SIGNER_KEY, &deposit).await;
	assert!(matches!(
		h.vault.execute(inflated, &signature).await,
		Err(VaultError::Unauthorized(_))
	));
}

#[tokio::test]
async fn test_rejected_call_keeps_its_nonce_consumed() {
	let dir = tempfile::tempdir().unwrap();
	let store = || {
		VaultStore::new(Arc::new(StorageService::new(Box::new(FileStorage::new(
			dir.path().to_path_buf(),
		)))))
	};

	let owner = {
		let h = harness_with(true, store()).await;
		let owner = h.own_with(NEW_SIGNER_KEY).await;
		let unpause = h.call(owner, CallAction::Unpause, 0);
		let signature = h.sign_call(NEW_SIGNER_KEY, &unpause).await;
		assert!(matches!(
			h.vault.execute(unpause, &signature).await,
			Err(VaultError::NotPaused)
		));
		assert_eq!(h.vault.call_nonce_of(&owner), 1);
		owner
	};

	let h = harness_with(true, store()).await;
	assert_eq!(h.vault.owner(), owner);
	assert_eq!(h.vault.call_nonce_of(&owner), 1);
}

#[tokio::test]
async fn test_service_execute_matches_direct_digest() {
	let h = harness().await;
	let owner = h.own_with(NEW_SIGNER_KEY).await;
	let service = VaultService::new(h.vault.clone());

	let sweep = h.call(owner, CallAction::WithdrawNative, 0);
	assert_eq!(h.vault.call_digest(&sweep), sweep.digest(h.vault.domain()));
	let signature = h.sign_call(NEW_SIGNER_KEY, &sweep).await;
	assert!(matches!(
		service.execute(sweep, &signature).await.unwrap(),
		VaultEvent::NativeSweep { .. }
	));
}
