//! HTTP server for the vault API.
//!
//! Reads go straight to the vault. State-changing calls go through the
//! [`VaultService`], which runs them one at a time.
//!
//! Deposit and admin bodies name a `caller` and carry that caller's
//! signature over the call, so only the holder of the caller's key can act
//! as it. Withdrawals are authorized by the trusted signer and always pay
//! the account the signer named.

use axum::{
	extract::{DefaultBodyLimit, Path, State},
	response::Json,
	routing::{get, post},
	Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use vault_config::ApiConfig;
use vault_core::VaultService;
use vault_types::{
	utils::{decode_signature, parse_address},
	APIError, Address, AdminRequest, CallAction, CallAuthorization, CallProof, DepositRequest,
	DomainResponse, EventsResponse, ExecutionResponse, NonceResponse, SetSignerRequest,
	SetTokenRequest, StatusResponse, TransferOwnershipRequest, VaultEvent, VerifyRequest,
	VerifyResponse, WithdrawRequest, CALL_TYPE, WITHDRAW_TYPE,
};

/// Shared application state for the API server.
#[derive(Clone)]
pub struct AppState {
	pub vault: Arc<VaultService>,
}

/// Builds the API router.
pub fn router(state: AppState, max_request_size: usize) -> Router {
	Router::new()
		.nest(
			"/api",
			Router::new()
				.route("/domain", get(handle_domain))
				.route("/status", get(handle_status))
				.route("/nonces/{account}", get(handle_nonce))
				.route("/events", get(handle_events))
				.route("/verify", post(handle_verify))
				.route("/deposit", post(handle_deposit))
				.route("/withdraw", post(handle_withdraw))
				.route("/admin/pause", post(handle_pause))
				.route("/admin/unpause", post(handle_unpause))
				.route("/admin/signer", post(handle_set_signer))
				.route("/admin/token", post(handle_set_token))
				.route("/admin/owner", post(handle_transfer_ownership))
				.route("/admin/sweep", post(handle_emergency_withdraw))
				.route("/admin/sweep-native", post(handle_withdraw_native)),
		)
		.layer(
			ServiceBuilder::new()
				.layer(TraceLayer::new_for_http())
				.layer(CorsLayer::permissive())
				.layer(DefaultBodyLimit::max(max_request_size)),
		)
		.with_state(state)
}

/// Starts the HTTP server and runs it until Ctrl+C.
pub async fn start_server(
	api_config: ApiConfig,
	vault: Arc<VaultService>,
) -> Result<(), Box<dyn std::error::Error>> {
	let app = router(AppState { vault }, api_config.max_request_size);

	let bind_address = format!("{}:{}", api_config.host, api_config.port);
	let listener = TcpListener::bind(&bind_address).await?;

	tracing::info!("Vault API server starting on {}", bind_address);

	axum::serve(listener, app)
		.with_graceful_shutdown(async {
			let _ = tokio::signal::ctrl_c().await;
			tracing::info!("Shutdown signal received");
		})
		.await?;

	Ok(())
}

fn bad_request(error_type: &str, message: String) -> APIError {
	APIError::BadRequest {
		error_type: error_type.to_string(),
		message,
	}
}

fn decode(signature: &str) -> Result<Vec<u8>, APIError> {
	decode_signature(signature).map_err(|e| bad_request("INVALID_SIGNATURE_ENCODING", e))
}

/// The call `caller` must have signed for `action`.
fn call_for(
	state: &AppState,
	caller: Address,
	action: CallAction,
	proof: &CallProof,
) -> CallAuthorization {
	CallAuthorization::new(
		state.vault.vault().address(),
		caller,
		action,
		proof.nonce,
		proof.deadline,
	)
}

async fn execute(
	state: &AppState,
	call: CallAuthorization,
	proof: &CallProof,
) -> Result<Json<ExecutionResponse>, APIError> {
	let signature = decode(&proof.signature)?;
	executed(state.vault.execute(call, &signature).await)
}

fn executed(result: Result<VaultEvent, vault_core::VaultError>) -> Result<Json<ExecutionResponse>, APIError> {
	match result {
		Ok(event) => Ok(Json(ExecutionResponse { event })),
		Err(e) => {
			tracing::warn!(error = %e, "Vault call rejected");
			Err(APIError::from(e))
		},
	}
}

/// Handles GET /api/domain.
///
/// Everything off-chain tooling needs to build a signable withdrawal.
async fn handle_domain(State(state): State<AppState>) -> Json<DomainResponse> {
	let vault = state.vault.vault();
	let domain = vault.domain();
	Json(DomainResponse {
		name: domain.name.clone(),
		version: domain.version.clone(),
		chain_id: domain.chain_id,
		verifying_contract: domain.verifying_contract,
		domain_separator: vault.domain_separator(),
		primary_type: WITHDRAW_TYPE.to_string(),
		call_type: CALL_TYPE.to_string(),
	})
}

/// Handles GET /api/status.
async fn handle_status(State(state): State<AppState>) -> Result<Json<StatusResponse>, APIError> {
	let vault = state.vault.vault();
	let balance = vault.custodial_balance().await.map_err(APIError::from)?;
	let vault_state = vault.state();
	Ok(Json(StatusResponse {
		vault: vault.address(),
		owner: vault_state.owner,
		signer: vault_state.signer,
		token: vault_state.token,
		paused: vault_state.paused,
		balance,
	}))
}

/// Handles GET /api/nonces/{account}.
async fn handle_nonce(
	State(state): State<AppState>,
	Path(account): Path<String>,
) -> Result<Json<NonceResponse>, APIError> {
	let account = parse_address(&account).map_err(|e| bad_request("INVALID_ADDRESS", e))?;
	let vault = state.vault.vault();
	Ok(Json(NonceResponse {
		account,
		nonce: vault.nonce_of(&account),
		call_nonce: vault.call_nonce_of(&account),
	}))
}

/// Handles GET /api/events.
async fn handle_events(State(state): State<AppState>) -> Json<EventsResponse> {
	Json(EventsResponse {
		events: state.vault.vault().events(),
	})
}

/// Handles POST /api/verify.
///
/// Read-only pre-validation of an authorization against the current signer
/// and clock.
async fn handle_verify(
	State(state): State<AppState>,
	Json(request): Json<VerifyRequest>,
) -> Result<Json<VerifyResponse>, APIError> {
	let signature = decode(&request.signature)?;
	let vault = state.vault.vault();
	let valid = vault
		.verify(
			request.amount,
			request.nonce,
			request.deadline,
			request.account,
			&signature,
		)
		.map_err(APIError::from)?;
	let digest = vault.withdraw_digest(
		request.amount,
		request.nonce,
		request.deadline,
		request.account,
	);
	Ok(Json(VerifyResponse { valid, digest }))
}

/// Handles POST /api/deposit.
async fn handle_deposit(
	State(state): State<AppState>,
	Json(request): Json<DepositRequest>,
) -> Result<Json<ExecutionResponse>, APIError> {
	let deposit = call_for(&state, request.caller, CallAction::Deposit, &request.proof)
		.with_amount(request.amount);
	execute(&state, deposit, &request.proof).await
}

/// Handles POST /api/withdraw.
async fn handle_withdraw(
	State(state): State<AppState>,
	Json(request): Json<WithdrawRequest>,
) -> Result<Json<ExecutionResponse>, APIError> {
	let signature = decode(&request.signature)?;
	executed(
		state
			.vault
			.withdraw(
				request.caller,
				request.amount,
				request.nonce,
				request.deadline,
				&signature,
			)
			.await,
	)
}

async fn handle_admin(
	state: AppState,
	request: AdminRequest,
	action: CallAction,
) -> Result<Json<ExecutionResponse>, APIError> {
	let admin = call_for(&state, request.caller, action, &request.proof);
	execute(&state, admin, &request.proof).await
}

async fn handle_pause(
	State(state): State<AppState>,
	Json(request): Json<AdminRequest>,
) -> Result<Json<ExecutionResponse>, APIError> {
	handle_admin(state, request, CallAction::Pause).await
}

async fn handle_unpause(
	State(state): State<AppState>,
	Json(request): Json<AdminRequest>,
) -> Result<Json<ExecutionResponse>, APIError> {
	handle_admin(state, request, CallAction::Unpause).await
}

async fn handle_set_signer(
	State(state): State<AppState>,
	Json(request): Json<SetSignerRequest>,
) -> Result<Json<ExecutionResponse>, APIError> {
	let rotate = call_for(&state, request.caller, CallAction::SetSigner, &request.proof)
		.with_target(request.signer);
	execute(&state, rotate, &request.proof).await
}

async fn handle_set_token(
	State(state): State<AppState>,
	Json(request): Json<SetTokenRequest>,
) -> Result<Json<ExecutionResponse>, APIError> {
	let replace = call_for(&state, request.caller, CallAction::SetTokenContract, &request.proof)
		.with_target(request.token);
	execute(&state, replace, &request.proof).await
}

async fn handle_transfer_ownership(
	State(state): State<AppState>,
	Json(request): Json<TransferOwnershipRequest>,
) -> Result<Json<ExecutionResponse>, APIError> {
	let transfer = call_for(&state, request.caller, CallAction::TransferOwnership, &request.proof)
		.with_target(request.new_owner);
	execute(&state, transfer, &request.proof).await
}

async fn handle_emergency_withdraw(
	State(state): State<AppState>,
	Json(request): Json<AdminRequest>,
) -> Result<Json<ExecutionResponse>, APIError> {
	handle_admin(state, request, CallAction::EmergencyWithdraw).await
}

async fn handle_withdraw_native(
	State(state): State<AppState>,
	Json(request): Json<AdminRequest>,
) -> Result<Json<ExecutionResponse>, APIError> {
	handle_admin(state, request, CallAction::WithdrawNative).await
}
