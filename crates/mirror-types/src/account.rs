//! Account and network summary types.

use crate::SecretString;
use alloy::primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Opaque reference to the signer's private key.
///
/// Configuration names where the key lives rather than holding it directly.
/// The key is read only at signing time by the account implementation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyHandle {
	/// Name of an environment variable holding the hex key.
	Env(String),
	/// Path to a file holding the hex key.
	File(PathBuf),
	/// The hex key itself. Intended for local development chains only.
	Inline(SecretString),
}

/// Snapshot of the signer account and the network it is connected to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountInfo {
	/// Address of the configured signer account.
	pub address: Address,
	/// Native balance in wei.
	pub balance: U256,
	/// Human readable balance in ether.
	pub balance_eth: String,
	/// Configured network name.
	pub network: String,
	pub chain_id: u64,
	/// Latest block number reported by the node.
	pub block_height: u64,
	/// Current gas price in wei.
	pub gas_price: u128,
	/// Registry contract, when one is configured.
	pub contract_address: Option<Address>,
}

/// Result of a liveness probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
	pub connected: bool,
	pub network: String,
	pub chain_id: u64,
	pub block_height: Option<u64>,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[derive(Deserialize)]
	struct Holder {
		key: KeyHandle,
	}

	#[test]
	fn test_key_handle_variants_deserialize() {
		let env: Holder = serde_json::from_str(r#"{"key":{"env":"OWNER_KEY"}}"#).unwrap();
		assert_eq!(env.key, KeyHandle::Env("OWNER_KEY".into()));

		let file: Holder = serde_json::from_str(r#"{"key":{"file":"/run/owner.key"}}"#).unwrap();
		assert_eq!(file.key, KeyHandle::File(PathBuf::from("/run/owner.key")));
	}

	#[test]
	fn test_inline_key_handle_is_redacted() {
		let inline: Holder = serde_json::from_str(r#"{"key":{"inline":"0xdeadbeef"}}"#).unwrap();
		let debug = format!("{:?}", inline.key);
		assert!(!debug.contains("deadbeef"));
	}
}
