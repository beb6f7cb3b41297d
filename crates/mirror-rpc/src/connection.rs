//! Endpoint-bound connection with chain id verification and liveness probes.

use crate::{AlloyRpc, BoundedRpc, ChainRpc, RpcError};
use mirror_config::EndpointConfig;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while establishing a connection.
#[derive(Debug, Error)]
pub enum ConnectionError {
	/// The configured RPC URL cannot be used.
	#[error("Invalid RPC URL: {0}")]
	InvalidUrl(String),
	/// The chain id probe failed or timed out.
	#[error("Endpoint unreachable: {0}")]
	Unreachable(String),
	/// The node serves a different chain than configured.
	#[error("Chain id mismatch: expected {expected}, node reports {actual}")]
	ChainIdMismatch { expected: u64, actual: u64 },
}

/// A verified handle to one chain endpoint.
///
/// Cheap to clone; clones share the underlying RPC client.
#[derive(Clone)]
pub struct Connection {
	rpc: Arc<dyn ChainRpc>,
	chain_id: u64,
	network_name: String,
	liveness_timeout: Duration,
}

impl std::fmt::Debug for Connection {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Connection")
			.field("chain_id", &self.chain_id)
			.field("network_name", &self.network_name)
			.finish()
	}
}

impl Connection {
	/// Opens an HTTP provider for the endpoint and verifies its chain id.
	pub async fn connect(config: &EndpointConfig) -> Result<Self, ConnectionError> {
		let rpc = AlloyRpc::new(&config.rpc_url).map_err(ConnectionError::InvalidUrl)?;
		Self::from_rpc(Arc::new(rpc), config).await
	}

	/// Binds an existing RPC client to the endpoint configuration.
	///
	/// Every request made through the connection is bounded by the request
	/// timeout. Performs one `eth_chainId` probe bounded by the liveness
	/// timeout.
	pub async fn from_rpc(
		rpc: Arc<dyn ChainRpc>,
		config: &EndpointConfig,
	) -> Result<Self, ConnectionError> {
		let rpc: Arc<dyn ChainRpc> = Arc::new(BoundedRpc::new(rpc, config.request_timeout()));
		let liveness_timeout = config.liveness_timeout();
		let actual = tokio::time::timeout(liveness_timeout, rpc.chain_id())
			.await
			.map_err(|_| ConnectionError::Unreachable(RpcError::Timeout(liveness_timeout).to_string()))?
			.map_err(|e| ConnectionError::Unreachable(e.to_string()))?;

		if actual != config.chain_id {
			return Err(ConnectionError::ChainIdMismatch {
				expected: config.chain_id,
				actual,
			});
		}

		tracing::info!(
			network = %config.network_name,
			chain_id = actual,
			"Connected to chain endpoint"
		);

		Ok(Self {
			rpc,
			chain_id: actual,
			network_name: config.network_name.clone(),
			liveness_timeout,
		})
	}

	pub fn rpc(&self) -> &Arc<dyn ChainRpc> {
		&self.rpc
	}

	pub fn chain_id(&self) -> u64 {
		self.chain_id
	}

	pub fn network_name(&self) -> &str {
		&self.network_name
	}

	/// Returns true when the node answers `eth_blockNumber` within the
	/// liveness timeout.
	pub async fn is_live(&self) -> bool {
		match tokio::time::timeout(self.liveness_timeout, self.rpc.block_number()).await {
			Ok(Ok(_)) => true,
			Ok(Err(e)) => {
				tracing::debug!(error = %e, "Liveness probe failed");
				false
			},
			Err(_) => {
				tracing::debug!(timeout = ?self.liveness_timeout, "Liveness probe timed out");
				false
			},
		}
	}

	/// Latest block number reported by the node.
	pub async fn current_block_height(&self) -> Result<u64, RpcError> {
		self.rpc.block_number().await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::MockNode;
	use mirror_config::builders::ConfigBuilder;

	#[tokio::test]
	async fn test_connect_verifies_chain_id() {
		let config = ConfigBuilder::new().chain_id(1337).build();
		let node = Arc::new(MockNode::new(1337));

		let connection = Connection::from_rpc(node, &config.endpoint).await.unwrap();
		assert_eq!(connection.chain_id(), 1337);
		assert_eq!(connection.network_name(), "ganache");
		assert!(connection.is_live().await);
		assert_eq!(connection.current_block_height().await.unwrap(), 0);
	}

	#[tokio::test]
	async fn test_chain_id_mismatch() {
		let config = ConfigBuilder::new().chain_id(1).build();
		let node = Arc::new(MockNode::new(1337));

		let result = Connection::from_rpc(node, &config.endpoint).await;
		assert!(matches!(
			result,
			Err(ConnectionError::ChainIdMismatch {
				expected: 1,
				actual: 1337
			})
		));
	}

	#[tokio::test]
	async fn test_unreachable_endpoint() {
		let config = ConfigBuilder::new().build();
		let node = Arc::new(MockNode::new(1337));
		node.set_offline(true).await;

		let result = Connection::from_rpc(node, &config.endpoint).await;
		assert!(matches!(result, Err(ConnectionError::Unreachable(_))));
	}

	#[tokio::test(start_paused = true)]
	async fn test_liveness_probe_is_bounded() {
		let config = ConfigBuilder::new().build();
		let node = Arc::new(MockNode::new(1337));
		let connection = Connection::from_rpc(node.clone(), &config.endpoint)
			.await
			.unwrap();

		node.set_latency(Duration::from_secs(60)).await;
		assert!(!connection.is_live().await);
	}

	#[tokio::test(start_paused = true)]
	async fn test_stalled_node_request_times_out() {
		let config = ConfigBuilder::new().request_timeout_ms(5_000).build();
		let node = Arc::new(MockNode::new(1337));
		let connection = Connection::from_rpc(node.clone(), &config.endpoint)
			.await
			.unwrap();

		node.set_latency(Duration::from_secs(60)).await;
		assert_eq!(
			connection.current_block_height().await,
			Err(RpcError::Timeout(Duration::from_secs(5)))
		);
		assert!(matches!(
			connection.rpc().send_raw_transaction(&[0x01]).await,
			Err(RpcError::Timeout(_))
		));
	}

	#[tokio::test]
	async fn test_invalid_url() {
		let mut config = ConfigBuilder::new().build();
		config.endpoint.rpc_url = "ftp://node".to_string();
		let result = Connection::connect(&config.endpoint).await;
		assert!(matches!(result, Err(ConnectionError::InvalidUrl(_))));
	}
}
