//! Configuration for the chain mirroring service.
//!
//! Configuration is a single TOML file. String values may reference
//! environment variables as `${VAR}` or `${VAR:-default}`; they are resolved
//! before parsing, so secrets and per-deployment endpoints can stay out of
//! the file. Every loaded configuration is validated before use.

#[cfg(any(test, feature = "testing"))]
pub mod builders;

use mirror_types::{Address, KeyHandle};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error that occurs during file I/O operations.
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	/// Error that occurs when parsing TOML configuration.
	#[error("Configuration error: {0}")]
	Parse(String),
	/// Error that occurs when configuration validation fails.
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// Keep only the message; the default rendering echoes the input
		ConfigError::Parse(err.message().to_string())
	}
}

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	/// Identity of this service instance.
	pub service: ServiceConfig,
	/// Chain endpoint and signer account.
	pub endpoint: EndpointConfig,
	/// Transaction construction settings.
	#[serde(default)]
	pub transactions: TransactionConfig,
	/// Confirmation polling settings.
	#[serde(default)]
	pub confirmation: ConfirmationConfig,
	/// Catalog storage backend.
	pub storage: StorageConfig,
	/// HTTP API server.
	pub api: Option<ApiConfig>,
}

/// Identity of this service instance.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
	/// Identifier used in logs.
	pub id: String,
}

/// Connection and signer settings for one chain endpoint.
///
/// A client instance is bound to exactly one endpoint configuration for its
/// whole lifetime.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EndpointConfig {
	/// HTTP(S) JSON-RPC endpoint of the node.
	pub rpc_url: String,
	/// Chain id the node is expected to report.
	pub chain_id: u64,
	/// Display name of the network.
	#[serde(default = "default_network_name")]
	pub network_name: String,
	/// Product registry contract. Without it, mirroring falls back to
	/// self-transfer marker transactions and chain reads are unavailable.
	#[serde(default)]
	pub contract_address: Option<Address>,
	/// Account that signs every mirror transaction.
	pub signer_account: Address,
	/// Where the signer's key can be read from.
	pub signer_key: KeyHandle,
	/// Upper bound for liveness probes, in milliseconds.
	#[serde(default = "default_liveness_timeout_ms")]
	pub liveness_timeout_ms: u64,
	/// Upper bound for every other JSON-RPC request, in milliseconds.
	#[serde(default = "default_request_timeout_ms")]
	pub request_timeout_ms: u64,
}

impl EndpointConfig {
	pub fn liveness_timeout(&self) -> Duration {
		Duration::from_millis(self.liveness_timeout_ms)
	}

	pub fn request_timeout(&self) -> Duration {
		Duration::from_millis(self.request_timeout_ms)
	}
}

fn default_network_name() -> String {
	"ganache".to_string()
}

fn default_liveness_timeout_ms() -> u64 {
	4_000
}

fn default_request_timeout_ms() -> u64 {
	15_000
}

/// Fee model used when building transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FeeMode {
	/// Type 0 transactions priced with `gasPrice`.
	#[default]
	Legacy,
	/// Type 2 transactions priced with base fee plus priority fee.
	Eip1559,
}

/// Transaction construction settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransactionConfig {
	/// Fee model for new transactions.
	#[serde(default)]
	pub fee_mode: FeeMode,
	/// Fixed legacy gas price in wei. Queried from the node when absent.
	#[serde(default)]
	pub gas_price_wei: Option<u64>,
	/// Fixed EIP-1559 priority fee in wei. Estimated when absent.
	#[serde(default)]
	pub max_priority_fee_wei: Option<u64>,
	/// Percentage added on top of `eth_estimateGas` results.
	#[serde(default = "default_gas_buffer_percent")]
	pub gas_buffer_percent: u64,
	/// Value attached to marker transactions, in wei.
	#[serde(default)]
	pub marker_value_wei: u64,
}

impl Default for TransactionConfig {
	fn default() -> Self {
		Self {
			fee_mode: FeeMode::default(),
			gas_price_wei: None,
			max_priority_fee_wei: None,
			gas_buffer_percent: default_gas_buffer_percent(),
			marker_value_wei: 0,
		}
	}
}

fn default_gas_buffer_percent() -> u64 {
	20
}

/// Confirmation polling settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConfirmationConfig {
	/// First delay between receipt polls, in milliseconds.
	#[serde(default = "default_initial_interval_ms")]
	pub initial_interval_ms: u64,
	/// Cap on the delay between receipt polls, in milliseconds.
	#[serde(default = "default_max_interval_ms")]
	pub max_interval_ms: u64,
	/// Growth factor of the poll delay.
	#[serde(default = "default_multiplier")]
	pub multiplier: f64,
	/// Budget the facade waits inline before reporting `Pending`, in seconds.
	#[serde(default = "default_timeout_seconds")]
	pub timeout_seconds: u64,
	/// Budget of background reconciliation for pending mirrors, in minutes.
	#[serde(default = "default_monitoring_timeout_minutes")]
	pub monitoring_timeout_minutes: u64,
}

impl Default for ConfirmationConfig {
	fn default() -> Self {
		Self {
			initial_interval_ms: default_initial_interval_ms(),
			max_interval_ms: default_max_interval_ms(),
			multiplier: default_multiplier(),
			timeout_seconds: default_timeout_seconds(),
			monitoring_timeout_minutes: default_monitoring_timeout_minutes(),
		}
	}
}

impl ConfirmationConfig {
	pub fn initial_interval(&self) -> Duration {
		Duration::from_millis(self.initial_interval_ms)
	}

	pub fn max_interval(&self) -> Duration {
		Duration::from_millis(self.max_interval_ms)
	}

	pub fn timeout(&self) -> Duration {
		Duration::from_secs(self.timeout_seconds)
	}

	pub fn monitoring_timeout(&self) -> Duration {
		Duration::from_secs(self.monitoring_timeout_minutes * 60)
	}
}

fn default_initial_interval_ms() -> u64 {
	500
}

fn default_max_interval_ms() -> u64 {
	5_000
}

fn default_multiplier() -> f64 {
	2.0
}

fn default_timeout_seconds() -> u64 {
	30
}

fn default_monitoring_timeout_minutes() -> u64 {
	10
}

/// Catalog storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
	/// Which implementation to use.
	pub primary: String,
	/// Map of storage implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
}

/// HTTP API server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
	/// Whether the API server is enabled.
	#[serde(default)]
	pub enabled: bool,
	/// Host address to bind the server to.
	#[serde(default = "default_api_host")]
	pub host: String,
	/// Port to bind the server to.
	#[serde(default = "default_api_port")]
	pub port: u16,
	/// Maximum request body size in bytes.
	#[serde(default = "default_max_request_size")]
	pub max_request_size: usize,
}

fn default_api_host() -> String {
	"127.0.0.1".to_string()
}

fn default_api_port() -> u16 {
	8000
}

fn default_max_request_size() -> usize {
	64 * 1024
}

/// Resolves environment variables in a string.
///
/// Replaces `${VAR_NAME}` with the value of `VAR_NAME` and supports
/// `${VAR_NAME:-default}`. Input is capped at 1MB.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	const MAX_INPUT_SIZE: usize = 1024 * 1024;
	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_INPUT_SIZE
		)));
	}

	let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut missing = None;
	let resolved = re.replace_all(input, |caps: &regex::Captures<'_>| {
		let var_name = &caps[1];
		match std::env::var(var_name) {
			Ok(value) => value,
			Err(_) => match caps.get(2) {
				Some(default) => default.as_str().to_string(),
				None => {
					missing.get_or_insert_with(|| var_name.to_string());
					String::new()
				},
			},
		}
	});

	if let Some(var_name) = missing {
		return Err(ConfigError::Validation(format!(
			"Environment variable '{}' not found",
			var_name
		)));
	}

	Ok(resolved.into_owned())
}

impl Config {
	/// Loads, resolves and validates a configuration file.
	pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let content = tokio::fs::read_to_string(path.as_ref()).await?;
		content.parse()
	}

	/// Validates the configuration.
	///
	/// Checks the service id, endpoint shape, signer account, timing bounds,
	/// storage selection and API settings.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.service.id.trim().is_empty() {
			return Err(ConfigError::Validation("Service id cannot be empty".into()));
		}

		self.validate_endpoint()?;

		if self.transactions.gas_buffer_percent > 100 {
			return Err(ConfigError::Validation(
				"gas_buffer_percent cannot exceed 100".into(),
			));
		}

		let confirmation = &self.confirmation;
		if confirmation.initial_interval_ms == 0 {
			return Err(ConfigError::Validation(
				"confirmation.initial_interval_ms must be greater than 0".into(),
			));
		}
		if confirmation.max_interval_ms < confirmation.initial_interval_ms {
			return Err(ConfigError::Validation(
				"confirmation.max_interval_ms must not be below initial_interval_ms".into(),
			));
		}
		if !(confirmation.multiplier >= 1.0) {
			return Err(ConfigError::Validation(
				"confirmation.multiplier must be at least 1.0".into(),
			));
		}
		if confirmation.timeout_seconds > 3_600 {
			return Err(ConfigError::Validation(
				"confirmation.timeout_seconds cannot exceed 3600".into(),
			));
		}

		if self.storage.implementations.is_empty() {
			return Err(ConfigError::Validation(
				"At least one storage implementation must be configured".into(),
			));
		}
		if !self
			.storage
			.implementations
			.contains_key(&self.storage.primary)
		{
			return Err(ConfigError::Validation(format!(
				"Primary storage '{}' not found in implementations",
				self.storage.primary
			)));
		}

		if let Some(api) = &self.api {
			if api.enabled && api.port == 0 {
				return Err(ConfigError::Validation("API port cannot be 0".into()));
			}
		}

		Ok(())
	}

	fn validate_endpoint(&self) -> Result<(), ConfigError> {
		let endpoint = &self.endpoint;
		if !(endpoint.rpc_url.starts_with("http://") || endpoint.rpc_url.starts_with("https://"))
		{
			return Err(ConfigError::Validation(format!(
				"rpc_url must be an http(s) URL, got '{}'",
				endpoint.rpc_url
			)));
		}
		if endpoint.chain_id == 0 {
			return Err(ConfigError::Validation("chain_id cannot be 0".into()));
		}
		if endpoint.signer_account == Address::ZERO {
			return Err(ConfigError::Validation(
				"signer_account cannot be the zero address".into(),
			));
		}
		if endpoint.contract_address == Some(Address::ZERO) {
			return Err(ConfigError::Validation(
				"contract_address cannot be the zero address".into(),
			));
		}
		if !(1_000..=30_000).contains(&endpoint.liveness_timeout_ms) {
			return Err(ConfigError::Validation(
				"liveness_timeout_ms must be between 1000 and 30000".into(),
			));
		}
		if !(1_000..=120_000).contains(&endpoint.request_timeout_ms) {
			return Err(ConfigError::Validation(
				"request_timeout_ms must be between 1000 and 120000".into(),
			));
		}
		match &endpoint.signer_key {
			KeyHandle::Env(name) if name.trim().is_empty() => Err(ConfigError::Validation(
				"signer_key.env cannot be empty".into(),
			)),
			KeyHandle::Inline(secret) if secret.is_empty() => Err(ConfigError::Validation(
				"signer_key.inline cannot be empty".into(),
			)),
			_ => Ok(()),
		}
	}
}

impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}
}
