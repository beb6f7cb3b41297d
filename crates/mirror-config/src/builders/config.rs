//! Configuration builder for test and development setups.

use crate::{
	ApiConfig, Config, ConfirmationConfig, EndpointConfig, FeeMode, ServiceConfig,
	StorageConfig, TransactionConfig,
};
use mirror_types::{Address, KeyHandle};
use std::collections::HashMap;

/// Builder for `Config` instances with a fluent API.
///
/// Defaults describe a local development chain with in-memory storage and
/// short confirmation budgets.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
	service_id: String,
	rpc_url: String,
	chain_id: u64,
	network_name: String,
	contract_address: Option<Address>,
	signer_account: Address,
	signer_key: KeyHandle,
	request_timeout_ms: u64,
	fee_mode: FeeMode,
	gas_price_wei: Option<u64>,
	confirmation: ConfirmationConfig,
	storage_primary: String,
	api: Option<ApiConfig>,
}

impl Default for ConfigBuilder {
	fn default() -> Self {
		Self::new()
	}
}

impl ConfigBuilder {
	/// Creates a new `ConfigBuilder` with defaults suitable for testing.
	pub fn new() -> Self {
		Self {
			service_id: "test-mirror".to_string(),
			rpc_url: "http://127.0.0.1:8545".to_string(),
			chain_id: 1337,
			network_name: "ganache".to_string(),
			contract_address: None,
			signer_account: Address::repeat_byte(0x11),
			signer_key: KeyHandle::Env("MIRROR_TEST_SIGNER_KEY".to_string()),
			request_timeout_ms: 5_000,
			fee_mode: FeeMode::Legacy,
			gas_price_wei: None,
			confirmation: ConfirmationConfig {
				initial_interval_ms: 10,
				max_interval_ms: 50,
				multiplier: 2.0,
				timeout_seconds: 2,
				monitoring_timeout_minutes: 1,
			},
			storage_primary: "memory".to_string(),
			api: None,
		}
	}

	pub fn service_id(mut self, id: impl Into<String>) -> Self {
		self.service_id = id.into();
		self
	}

	pub fn rpc_url(mut self, url: impl Into<String>) -> Self {
		self.rpc_url = url.into();
		self
	}

	pub fn chain_id(mut self, chain_id: u64) -> Self {
		self.chain_id = chain_id;
		self
	}

	pub fn network_name(mut self, name: impl Into<String>) -> Self {
		self.network_name = name.into();
		self
	}

	/// Sets the registry contract address.
	pub fn contract_address(mut self, address: Option<Address>) -> Self {
		self.contract_address = address;
		self
	}

	/// Sets the signer account and where its key is found.
	pub fn signer(mut self, account: Address, key: KeyHandle) -> Self {
		self.signer_account = account;
		self.signer_key = key;
		self
	}

	/// Sets the bound on JSON-RPC requests other than liveness probes.
	pub fn request_timeout_ms(mut self, timeout_ms: u64) -> Self {
		self.request_timeout_ms = timeout_ms;
		self
	}

	/// Sets the background reconciliation window in minutes.
	pub fn monitoring_timeout_minutes(mut self, minutes: u64) -> Self {
		self.confirmation.monitoring_timeout_minutes = minutes;
		self
	}

	pub fn fee_mode(mut self, mode: FeeMode) -> Self {
		self.fee_mode = mode;
		self
	}

	pub fn gas_price_wei(mut self, price: Option<u64>) -> Self {
		self.gas_price_wei = price;
		self
	}

	/// Sets the inline confirmation budget in seconds.
	pub fn confirmation_timeout_seconds(mut self, seconds: u64) -> Self {
		self.confirmation.timeout_seconds = seconds;
		self
	}

	pub fn storage_primary(mut self, primary: impl Into<String>) -> Self {
		self.storage_primary = primary.into();
		self
	}

	pub fn api(mut self, api: Option<ApiConfig>) -> Self {
		self.api = api;
		self
	}

	/// Builds the `Config`.
	pub fn build(self) -> Config {
		let mut implementations = HashMap::new();
		implementations.insert(
			self.storage_primary.clone(),
			toml::Value::Table(toml::map::Map::new()),
		);

		Config {
			service: ServiceConfig {
				id: self.service_id,
			},
			endpoint: EndpointConfig {
				rpc_url: self.rpc_url,
				chain_id: self.chain_id,
				network_name: self.network_name,
				contract_address: self.contract_address,
				signer_account: self.signer_account,
				signer_key: self.signer_key,
				liveness_timeout_ms: 4_000,
				request_timeout_ms: self.request_timeout_ms,
			},
			transactions: TransactionConfig {
				fee_mode: self.fee_mode,
				gas_price_wei: self.gas_price_wei,
				..TransactionConfig::default()
			},
			confirmation: self.confirmation,
			storage: StorageConfig {
				primary: self.storage_primary,
				implementations,
			},
			api: self.api,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_built_config_is_valid() {
		let config = ConfigBuilder::new()
			.chain_id(5777)
			.contract_address(Some(Address::repeat_byte(0x22)))
			.build();
		assert!(config.validate().is_ok());
		assert_eq!(config.endpoint.chain_id, 5777);
		assert!(config.storage.implementations.contains_key("memory"));
	}
}
