//! Main entry point for the vault service.
//!
//! `serve` builds the vault from configuration and exposes it over HTTP.
//! `domain`, `sign` and `sign-call` are offline helpers for producing
//! withdrawal authorizations and signed deposit or owner calls that the
//! running vault will accept.

use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;
use vault_config::{ApiConfig, Config};
use vault_types::{
	utils::{parse_address, parse_amount},
	Address, CallAction, CallAuthorization, WithdrawAuthorization, CALL_TYPE, U256, WITHDRAW_TYPE,
};

mod factory_registry;
mod server;

use factory_registry::{build_account_from_config, build_vault_from_config, load_state_from_config};

/// Command-line arguments for the vault service.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path to configuration file
	#[arg(short, long, default_value = "config.toml")]
	config: PathBuf,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, default_value = "info")]
	log_level: String,

	#[command(subcommand)]
	command: Option<Command>,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Command {
	/// Build the vault and serve the HTTP API (default)
	Serve,
	/// Print the signing domain and its separator
	Domain,
	/// Sign a withdrawal authorization with the configured account
	Sign {
		/// Account the withdrawal is authorized for
		#[arg(long)]
		account: String,
		/// Token amount, decimal or 0x-prefixed hex
		#[arg(long)]
		amount: String,
		/// Nonce the authorization consumes
		#[arg(long)]
		nonce: u64,
		/// Absolute deadline in unix seconds; overrides --ttl
		#[arg(long)]
		deadline: Option<u64>,
		/// Seconds from now until the authorization expires
		#[arg(long, default_value_t = 3600)]
		ttl: u64,
	},
	/// Sign a deposit or owner call as the configured account
	SignCall {
		/// deposit, pause, unpause, set_signer, set_token_contract,
		/// transfer_ownership, emergency_withdraw or withdraw_native
		#[arg(long)]
		action: CallAction,
		/// New signer, token or owner, for the calls that take one
		#[arg(long)]
		target: Option<String>,
		/// Deposit amount, decimal or 0x-prefixed hex
		#[arg(long)]
		amount: Option<String>,
		/// Call nonce, see `callNonce` in GET /api/nonces/{account}
		#[arg(long)]
		nonce: u64,
		#[arg(long)]
		deadline: Option<u64>,
		#[arg(long, default_value_t = 3600)]
		ttl: u64,
	},
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	use tracing_subscriber::{fmt, EnvFilter};

	let env_filter = EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| EnvFilter::new(args.log_level.clone()));

	fmt()
		.with_env_filter(env_filter)
		.with_thread_ids(true)
		.with_target(true)
		.with_writer(std::io::stderr)
		.init();

	let path = args.config.to_string_lossy();
	let config = Config::from_file(&path).await?;
	tracing::info!(
		"Loaded configuration [{} v{}]",
		config.vault.name,
		config.vault.version
	);

	match args.command.unwrap_or(Command::Serve) {
		Command::Serve => serve(config).await,
		Command::Domain => print_domain(&config),
		Command::Sign {
			account,
			amount,
			nonce,
			deadline,
			ttl,
		} => sign(&config, &account, &amount, nonce, deadline, ttl).await,
		Command::SignCall {
			action,
			target,
			amount,
			nonce,
			deadline,
			ttl,
		} => {
			let target = target.as_deref().map(parse_address).transpose()?;
			let amount = amount.as_deref().map(parse_amount).transpose()?;
			let deadline = resolve_deadline(deadline, ttl, now());
			sign_call(&config, action, target, amount, nonce, deadline).await
		},
	}
}

async fn serve(config: Config) -> Result<(), Box<dyn std::error::Error>> {
	let api_config = match config.api.clone() {
		Some(api) if !api.enabled => {
			tracing::warn!("API server disabled in configuration, nothing to serve");
			return Ok(());
		},
		Some(api) => api,
		None => ApiConfig::default(),
	};

	let built = build_vault_from_config(config).await?;
	tracing::info!("Started vault");

	server::start_server(api_config, built.service).await?;

	tracing::info!("Stopped vault");
	Ok(())
}

fn print_domain(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
	let domain = config.vault.domain();
	let output = json!({
		"name": domain.name,
		"version": domain.version,
		"chainId": domain.chain_id,
		"verifyingContract": domain.verifying_contract,
		"domainSeparator": domain.separator(),
		"primaryType": WITHDRAW_TYPE,
		"callType": CALL_TYPE,
	});
	println!("{}", serde_json::to_string_pretty(&output)?);
	Ok(())
}

fn now() -> u64 {
	u64::try_from(chrono::Utc::now().timestamp()).unwrap_or_default()
}

/// Resolves the authorization deadline: an explicit value wins, otherwise
/// `now + ttl`.
fn resolve_deadline(deadline: Option<u64>, ttl: u64, now: u64) -> u64 {
	deadline.unwrap_or_else(|| now.saturating_add(ttl))
}

async fn sign(
	config: &Config,
	account: &str,
	amount: &str,
	nonce: u64,
	deadline: Option<u64>,
	ttl: u64,
) -> Result<(), Box<dyn std::error::Error>> {
	let signer = build_account_from_config(config)?
		.ok_or("No [account] section configured; cannot sign")?;

	let domain = config.vault.domain();
	let authorization = WithdrawAuthorization {
		vault: config.vault.address,
		amount: parse_amount(amount)?,
		nonce,
		account: parse_address(account)?,
		deadline: resolve_deadline(deadline, ttl, now()),
	};

	let trusted_signer = load_state_from_config(config).await?.signer;
	let signer_address = signer.get_address().await?;
	if signer_address != trusted_signer {
		tracing::warn!(
			trusted_signer = %trusted_signer,
			account = %signer_address,
			"Signing account is not the vault's trusted signer; the vault will reject this signature"
		);
	}

	let signature = signer.sign_withdrawal(&domain, &authorization).await?;
	let output = json!({
		"account": authorization.account,
		"amount": authorization.amount.to_string(),
		"nonce": authorization.nonce,
		"deadline": authorization.deadline,
		"digest": authorization.digest(&domain),
		"signer": signer_address,
		"signature": format!("0x{}", hex::encode(signature)),
	});
	println!("{}", serde_json::to_string_pretty(&output)?);
	Ok(())
}

async fn sign_call(
	config: &Config,
	action: CallAction,
	target: Option<Address>,
	amount: Option<U256>,
	nonce: u64,
	deadline: u64,
) -> Result<(), Box<dyn std::error::Error>> {
	let account = build_account_from_config(config)?
		.ok_or("No [account] section configured; cannot sign")?;
	let caller = account.get_address().await?;

	let mut call = CallAuthorization::new(config.vault.address, caller, action, nonce, deadline);
	if let Some(target) = target {
		call = call.with_target(target);
	}
	if let Some(amount) = amount {
		call = call.with_amount(amount);
	}

	let domain = config.vault.domain();
	let signature = account.sign_call(&domain, &call).await?;
	let output = json!({
		"caller": call.caller,
		"action": call.action,
		"target": call.target,
		"amount": call.amount.to_string(),
		"nonce": call.nonce,
		"deadline": call.deadline,
		"digest": call.digest(&domain),
		"signature": format!("0x{}", hex::encode(signature)),
	});
	println!("{}", serde_json::to_string_pretty(&output)?);
	Ok(())
}
