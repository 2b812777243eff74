//! Conversion utilities for addresses, amounts and signature blobs.

use super::formatting::without_0x_prefix;
use alloy_primitives::{hex, Address, U256};

/// Parses a hex address string, with or without the "0x" prefix.
pub fn parse_address(value: &str) -> Result<Address, String> {
	let raw = without_0x_prefix(value.trim());
	if raw.len() != 40 {
		return Err(format!(
			"Invalid address '{}': expected 40 hex characters, got {}",
			value,
			raw.len()
		));
	}
	raw.parse::<Address>()
		.map_err(|e| format!("Invalid address '{}': {}", value, e))
}

/// Parses a token amount given either as a decimal string or as a
/// "0x"-prefixed hex string.
pub fn parse_amount(value: &str) -> Result<U256, String> {
	let value = value.trim();
	let parsed = if value.starts_with("0x") || value.starts_with("0X") {
		U256::from_str_radix(without_0x_prefix(value), 16)
	} else {
		U256::from_str_radix(value, 10)
	};
	parsed.map_err(|e| format!("Invalid amount '{}': {}", value, e))
}

/// Decodes a hex-encoded signature blob. The length is not checked here;
/// the verifier rejects blobs of the wrong size explicitly.
pub fn decode_signature(value: &str) -> Result<Vec<u8>, String> {
	hex::decode(without_0x_prefix(value.trim()))
		.map_err(|e| format!("Invalid signature hex: {}", e))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_parse_address() {
		let with_prefix = parse_address("0x5FbDB2315678afecb367f032d93F642f64180aa3").unwrap();
		let without_prefix = parse_address("5fbdb2315678afecb367f032d93f642f64180aa3").unwrap();
		assert_eq!(with_prefix, without_prefix);

		assert!(parse_address("0x1234").is_err());
		assert!(parse_address("0xzzbdb2315678afecb367f032d93f642f64180aa3").is_err());
	}

	#[test]
	fn test_parse_amount() {
		assert_eq!(parse_amount("100").unwrap(), U256::from(100));
		assert_eq!(parse_amount("0x64").unwrap(), U256::from(100));
		assert!(parse_amount("-1").is_err());
		assert!(parse_amount("ten").is_err());
	}

	#[test]
	fn test_decode_signature() {
		assert_eq!(decode_signature("0x0102").unwrap(), vec![1u8, 2]);
		assert_eq!(decode_signature("").unwrap(), Vec::<u8>::new());
		assert!(decode_signature("0xz1").is_err());
	}
}
