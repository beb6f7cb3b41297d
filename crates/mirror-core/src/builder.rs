//! Construction of a [`MirrorFacade`] from configuration.
//!
//! The builder connects to the configured endpoint, opens the primary
//! storage backend and wires account, delivery and reader services together.
//! A failed connection is reported as an error; there is no offline fallback.

use crate::MirrorFacade;
use mirror_account::{create_account, AccountService};
use mirror_config::Config;
use mirror_delivery::{DeliveryService, PollSchedule};
use mirror_reader::ContractStateReader;
use mirror_rpc::{ChainRpc, Connection, ConnectionError};
use mirror_storage::{create_backend, StorageService};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BuilderError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Connection error: {0}")]
	Connection(#[from] ConnectionError),
	#[error("Storage error: {0}")]
	Storage(String),
}

/// Builds a facade for one endpoint configuration.
pub struct MirrorBuilder {
	config: Config,
}

impl MirrorBuilder {
	pub fn new(config: Config) -> Self {
		Self { config }
	}

	/// Connects over HTTP to the configured RPC endpoint.
	pub async fn build(self) -> Result<MirrorFacade, BuilderError> {
		self.config
			.validate()
			.map_err(|e| BuilderError::Config(e.to_string()))?;
		let connection = Connection::connect(&self.config.endpoint).await?;
		self.assemble(connection)
	}

	/// Uses an existing RPC client instead of opening an HTTP provider.
	pub async fn build_with_rpc(self, rpc: Arc<dyn ChainRpc>) -> Result<MirrorFacade, BuilderError> {
		self.config
			.validate()
			.map_err(|e| BuilderError::Config(e.to_string()))?;
		let connection = Connection::from_rpc(rpc, &self.config.endpoint).await?;
		self.assemble(connection)
	}

	fn assemble(self, connection: Connection) -> Result<MirrorFacade, BuilderError> {
		let config = self.config;

		let primary = &config.storage.primary;
		let table = config.storage.implementations.get(primary).ok_or_else(|| {
			BuilderError::Config(format!("Primary storage '{}' is not configured", primary))
		})?;
		let backend = create_backend(primary, table).map_err(|e| {
			tracing::error!(
				component = "storage",
				implementation = %primary,
				error = %e,
				"Failed to create storage implementation"
			);
			BuilderError::Storage(format!(
				"Failed to create storage implementation '{}': {}",
				primary, e
			))
		})?;
		tracing::info!(component = "storage", implementation = %primary, "Loaded");

		let account = AccountService::new(create_account(
			config.endpoint.signer_account,
			config.endpoint.signer_key.clone(),
		));
		tracing::info!(
			component = "account",
			address = %config.endpoint.signer_account,
			"Loaded"
		);

		let delivery = DeliveryService::new(
			connection.clone(),
			account,
			config.transactions.gas_buffer_percent,
			PollSchedule::from(&config.confirmation),
		);
		let reader = ContractStateReader::new(connection, config.endpoint.contract_address);
		match config.endpoint.contract_address {
			Some(contract) => {
				tracing::info!(component = "reader", contract = %contract, "Loaded")
			},
			None => tracing::info!(
				component = "reader",
				"No registry contract configured, mirroring with marker transactions"
			),
		}

		Ok(MirrorFacade::new(
			config,
			Arc::new(StorageService::new(backend)),
			delivery,
			reader,
		))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::tests::{dev_address, funded_node, DEV_KEY};
	use mirror_config::builders::ConfigBuilder;
	use mirror_rpc::testing::MockNode;
	use mirror_types::KeyHandle;

	fn config(chain_id: u64) -> Config {
		ConfigBuilder::new()
			.chain_id(chain_id)
			.signer(dev_address(), KeyHandle::Inline(DEV_KEY.into()))
			.build()
	}

	#[tokio::test]
	async fn test_build_with_rpc() {
		let facade = MirrorBuilder::new(config(1337))
			.build_with_rpc(Arc::new(funded_node()))
			.await
			.unwrap();
		assert!(facade.health().await.connected);
	}

	#[tokio::test]
	async fn test_chain_id_mismatch_fails_build() {
		let result = MirrorBuilder::new(config(1337))
			.build_with_rpc(Arc::new(MockNode::new(31337)))
			.await;
		assert!(matches!(
			result,
			Err(BuilderError::Connection(ConnectionError::ChainIdMismatch { .. }))
		));
	}

	#[tokio::test]
	async fn test_unknown_storage_backend() {
		let config = ConfigBuilder::new()
			.signer(dev_address(), KeyHandle::Inline(DEV_KEY.into()))
			.storage_primary("redis")
			.build();
		let result = MirrorBuilder::new(config)
			.build_with_rpc(Arc::new(funded_node()))
			.await;
		assert!(matches!(result, Err(BuilderError::Storage(_))));
	}

	#[tokio::test]
	async fn test_invalid_config_is_rejected() {
		let config = ConfigBuilder::new()
			.signer(dev_address(), KeyHandle::Inline(DEV_KEY.into()))
			.rpc_url("ws://127.0.0.1:8545")
			.build();
		let result = MirrorBuilder::new(config)
			.build_with_rpc(Arc::new(funded_node()))
			.await;
		assert!(matches!(result, Err(BuilderError::Config(_))));
	}
}
