//! Vault error kinds.

use thiserror::Error;
use vault_types::{APIError, Address, U256};

/// Every failure is terminal for the enclosing call and leaves no partial
/// state behind.
#[derive(Debug, Error)]
pub enum VaultError {
	#[error("Amount must be greater than zero")]
	ZeroAmount,
	#[error("Zero address is not a valid identity")]
	ZeroAddress,
	#[error("No contract code at {0}")]
	InvalidTokenContract(Address),
	#[error("Custodial token contract is not set")]
	BonezContractNotSet,
	#[error("Signature expired: deadline {deadline}, now {now}")]
	SignatureExpired { deadline: u64, now: u64 },
	#[error("Invalid nonce: expected {expected}, provided {provided}")]
	InvalidNonce { expected: u64, provided: u64 },
	#[error("Insufficient contract balance: requested {requested}, available {available}")]
	InsufficientContractBalance { requested: U256, available: U256 },
	#[error("Invalid signature length: expected 65 bytes, got {0}")]
	InvalidSignatureLength(usize),
	#[error("Invalid signature")]
	InvalidSignature,
	#[error("Caller {0} is not the owner")]
	Unauthorized(Address),
	#[error("Vault is paused")]
	PausedUnavailable,
	#[error("Vault is not paused")]
	NotPaused,
	#[error("Reentrant call")]
	ReentrantCall,
	#[error("Transfer failed: {0}")]
	TransferFailed(String),
	#[error("Ledger error: {0}")]
	Ledger(String),
	#[error("Storage error: {0}")]
	Storage(String),
}

impl VaultError {
	/// Stable machine-readable code, used as the API error type.
	pub fn code(&self) -> &'static str {
		match self {
			VaultError::ZeroAmount => "ZERO_AMOUNT",
			VaultError::ZeroAddress => "ZERO_ADDRESS",
			VaultError::InvalidTokenContract(_) => "INVALID_TOKEN_CONTRACT",
			VaultError::BonezContractNotSet => "BONEZ_CONTRACT_NOT_SET",
			VaultError::SignatureExpired { .. } => "SIGNATURE_EXPIRED",
			VaultError::InvalidNonce { .. } => "INVALID_NONCE",
			VaultError::InsufficientContractBalance { .. } => "INSUFFICIENT_CONTRACT_BALANCE",
			VaultError::InvalidSignatureLength(_) => "INVALID_SIGNATURE_LENGTH",
			VaultError::InvalidSignature => "INVALID_SIGNATURE",
			VaultError::Unauthorized(_) => "UNAUTHORIZED",
			VaultError::PausedUnavailable => "PAUSED",
			VaultError::NotPaused => "NOT_PAUSED",
			VaultError::ReentrantCall => "REENTRANT_CALL",
			VaultError::TransferFailed(_) => "TRANSFER_FAILED",
			VaultError::Ledger(_) => "LEDGER_ERROR",
			VaultError::Storage(_) => "STORAGE_ERROR",
		}
	}
}

impl From<VaultError> for APIError {
	fn from(err: VaultError) -> Self {
		let error_type = err.code().to_string();
		let message = err.to_string();
		match err {
			VaultError::PausedUnavailable => APIError::ServiceUnavailable {
				error_type,
				message,
			},
			VaultError::Unauthorized(_) => APIError::Forbidden {
				error_type,
				message,
			},
			VaultError::InvalidSignatureLength(_) | VaultError::ZeroAddress => {
				APIError::BadRequest {
					error_type,
					message,
				}
			},
			VaultError::Ledger(_) | VaultError::Storage(_) => APIError::InternalServerError {
				error_type,
				message,
			},
			_ => APIError::UnprocessableEntity {
				error_type,
				message,
			},
		}
	}
}
