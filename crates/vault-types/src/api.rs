//! API types for the vault HTTP API.
//!
//! Request and response bodies for the domain, status, nonce, verification,
//! deposit, withdrawal and admin endpoints, plus the structured error type
//! the handlers return. Deposit and admin bodies carry a [`CallProof`].

use crate::VaultEvent;
use alloy_primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Domain information needed by off-chain signing tooling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainResponse {
	pub name: String,
	pub version: String,
	pub chain_id: u64,
	pub verifying_contract: Address,
	pub domain_separator: B256,
	/// The typed struct schema the signer must use.
	pub primary_type: String,
	/// The typed struct callers sign for deposits and owner calls.
	pub call_type: String,
}

/// Current administrative state of the vault.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
	pub vault: Address,
	pub owner: Address,
	pub signer: Address,
	pub token: Option<Address>,
	pub paused: bool,
	/// Custodial token balance, when a token contract is configured.
	#[serde(with = "u256_option_serde")]
	pub balance: Option<U256>,
}

/// Next expected nonces for an account.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NonceResponse {
	pub account: Address,
	/// Withdrawal nonce, consumed by signer-authorized withdrawals.
	pub nonce: u64,
	/// Nonce of the account's next signed deposit or owner call.
	pub call_nonce: u64,
}

/// Request body for `POST /api/verify`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyRequest {
	#[serde(with = "u256_serde")]
	pub amount: U256,
	pub nonce: u64,
	pub deadline: u64,
	pub account: Address,
	/// Hex-encoded signature blob.
	pub signature: String,
}

/// Result of a verification, with the digest that was checked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyResponse {
	pub valid: bool,
	pub digest: B256,
}

/// The caller's signature over a [`CallAuthorization`](crate::CallAuthorization),
/// carried alongside the call's own fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallProof {
	/// The caller's call nonce.
	pub nonce: u64,
	pub deadline: u64,
	/// Hex-encoded signature blob.
	pub signature: String,
}

/// Request body for `POST /api/deposit`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositRequest {
	/// Account the deposit is pulled from.
	pub caller: Address,
	#[serde(with = "u256_serde")]
	pub amount: U256,
	#[serde(flatten)]
	pub proof: CallProof,
}

/// Request body for `POST /api/withdraw`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawRequest {
	/// Account the withdrawal is executed for.
	pub caller: Address,
	#[serde(with = "u256_serde")]
	pub amount: U256,
	pub nonce: u64,
	pub deadline: u64,
	/// Hex-encoded signature blob.
	pub signature: String,
}

/// Request body for owner-gated calls that take no argument (pause,
/// unpause, sweeps).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminRequest {
	pub caller: Address,
	#[serde(flatten)]
	pub proof: CallProof,
}

/// Request body for `POST /api/admin/signer`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetSignerRequest {
	pub caller: Address,
	pub signer: Address,
	#[serde(flatten)]
	pub proof: CallProof,
}

/// Request body for `POST /api/admin/token`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetTokenRequest {
	pub caller: Address,
	pub token: Address,
	#[serde(flatten)]
	pub proof: CallProof,
}

/// Request body for `POST /api/admin/owner`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferOwnershipRequest {
	pub caller: Address,
	pub new_owner: Address,
	#[serde(flatten)]
	pub proof: CallProof,
}

/// Response for successful state-changing calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResponse {
	pub event: VaultEvent,
}

/// Audit log listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsResponse {
	pub events: Vec<VaultEvent>,
}

/// API error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
	/// Error type/code
	pub error: String,
	/// Human-readable description
	pub message: String,
}

/// Structured API error type with appropriate HTTP status mapping.
#[derive(Debug)]
pub enum APIError {
	/// Malformed request (400)
	BadRequest { error_type: String, message: String },
	/// Caller is not allowed to perform the operation (403)
	Forbidden { error_type: String, message: String },
	/// Business rule rejected the request (422)
	UnprocessableEntity { error_type: String, message: String },
	/// Vault is paused (503)
	ServiceUnavailable { error_type: String, message: String },
	/// Internal server error (500)
	InternalServerError { error_type: String, message: String },
}

impl APIError {
	/// Get the HTTP status code for this error.
	pub fn status_code(&self) -> u16 {
		match self {
			APIError::BadRequest { .. } => 400,
			APIError::Forbidden { .. } => 403,
			APIError::UnprocessableEntity { .. } => 422,
			APIError::ServiceUnavailable { .. } => 503,
			APIError::InternalServerError { .. } => 500,
		}
	}

	/// Convert to ErrorResponse for JSON serialization.
	pub fn to_error_response(&self) -> ErrorResponse {
		let (error_type, message) = match self {
			APIError::BadRequest {
				error_type,
				message,
			}
			| APIError::Forbidden {
				error_type,
				message,
			}
			| APIError::UnprocessableEntity {
				error_type,
				message,
			}
			| APIError::ServiceUnavailable {
				error_type,
				message,
			}
			| APIError::InternalServerError {
				error_type,
				message,
			} => (error_type, message),
		};
		ErrorResponse {
			error: error_type.clone(),
			message: message.clone(),
		}
	}
}

impl fmt::Display for APIError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			APIError::BadRequest { message, .. } => write!(f, "Bad Request: {}", message),
			APIError::Forbidden { message, .. } => write!(f, "Forbidden: {}", message),
			APIError::UnprocessableEntity { message, .. } => {
				write!(f, "Unprocessable Entity: {}", message)
			},
			APIError::ServiceUnavailable { message, .. } => {
				write!(f, "Service Unavailable: {}", message)
			},
			APIError::InternalServerError { message, .. } => {
				write!(f, "Internal Server Error: {}", message)
			},
		}
	}
}

impl std::error::Error for APIError {}

impl axum::response::IntoResponse for APIError {
	fn into_response(self) -> axum::response::Response {
		use axum::{http::StatusCode, response::Json};

		let status = StatusCode::from_u16(self.status_code())
			.unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
		(status, Json(self.to_error_response())).into_response()
	}
}

/// Serde module for U256 as a decimal string.
pub mod u256_serde {
	use alloy_primitives::U256;
	use serde::{de::Error, Deserialize, Deserializer, Serialize, Serializer};

	pub fn serialize<S>(value: &U256, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		value.to_string().serialize(serializer)
	}

	pub fn deserialize<'de, D>(deserializer: D) -> Result<U256, D::Error>
	where
		D: Deserializer<'de>,
	{
		let s = String::deserialize(deserializer)?;
		U256::from_str_radix(&s, 10).map_err(D::Error::custom)
	}
}

/// Serde module for `Option<U256>` as an optional decimal string.
pub mod u256_option_serde {
	use alloy_primitives::U256;
	use serde::{de::Error, Deserialize, Deserializer, Serialize, Serializer};

	pub fn serialize<S>(value: &Option<U256>, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		value.map(|v| v.to_string()).serialize(serializer)
	}

	pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<U256>, D::Error>
	where
		D: Deserializer<'de>,
	{
		Option::<String>::deserialize(deserializer)?
			.map(|s| U256::from_str_radix(&s, 10).map_err(D::Error::custom))
			.transpose()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_withdraw_request_parses_decimal_amount() {
		let body = serde_json::json!({
			"caller": "0x70997970c51812dc3a010c7d01b50e0d17dc79c8",
			"amount": "50",
			"nonce": 0,
			"deadline": 1700000000u64,
			"signature": "0x00"
		});
		let request: WithdrawRequest = serde_json::from_value(body).unwrap();
		assert_eq!(request.amount, U256::from(50));
		assert_eq!(request.nonce, 0);
	}

	#[test]
	fn test_signed_call_fields_sit_beside_arguments() {
		let body = serde_json::json!({
			"caller": "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266",
			"newOwner": "0x70997970c51812dc3a010c7d01b50e0d17dc79c8",
			"nonce": 3,
			"deadline": 1700000000u64,
			"signature": "0x00"
		});
		let request: TransferOwnershipRequest = serde_json::from_value(body).unwrap();
		assert_eq!(request.proof.nonce, 3);
		assert_eq!(request.proof.signature, "0x00");

		let unsigned = serde_json::json!({
			"caller": "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"
		});
		assert!(serde_json::from_value::<AdminRequest>(unsigned).is_err());
	}

	#[test]
	fn test_api_error_status_codes() {
		let err = APIError::UnprocessableEntity {
			error_type: "INVALID_NONCE".into(),
			message: "nonce".into(),
		};
		assert_eq!(err.status_code(), 422);
		assert_eq!(err.to_error_response().error, "INVALID_NONCE");

		let err = APIError::ServiceUnavailable {
			error_type: "PAUSED".into(),
			message: "paused".into(),
		};
		assert_eq!(err.status_code(), 503);
	}
}
