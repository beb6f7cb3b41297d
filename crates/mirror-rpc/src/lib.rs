//! JSON-RPC access to the chain the catalog is mirrored onto.
//!
//! `ChainRpc` is the seam between the mirroring client and the node. The
//! production implementation talks to an HTTP endpoint through an alloy
//! provider; tests use the in-process `MockNode` behind the `testing`
//! feature. `Connection` binds a `ChainRpc` to one endpoint configuration
//! after checking that the node serves the expected chain.
//!
//! This layer never retries. Callers decide what a failure means.

use alloy::primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use mirror_types::{BlockSummary, ChainReceipt};
use std::time::Duration;
use thiserror::Error;

pub mod connection;
pub mod envelope;
pub mod implementations {
	pub mod alloy;
	pub mod bounded;
}
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use connection::{Connection, ConnectionError};
pub use implementations::alloy::AlloyRpc;
pub use implementations::bounded::BoundedRpc;

/// Errors returned by a single JSON-RPC exchange.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RpcError {
	/// The request never produced a JSON-RPC response.
	#[error("Transport error: {0}")]
	Transport(String),
	/// The node answered with a JSON-RPC error object.
	#[error("Node error {code}: {message}")]
	Node { code: i64, message: String },
	/// The request did not complete within its time bound.
	#[error("Request timed out after {0:?}")]
	Timeout(Duration),
	/// The node answered with something that is not the expected shape.
	#[error("Unexpected response: {0}")]
	Response(String),
}

impl RpcError {
	/// The node-supplied message, when the node rejected the request.
	pub fn node_message(&self) -> Option<&str> {
		match self {
			RpcError::Node { message, .. } => Some(message),
			_ => None,
		}
	}

	/// True when the node reported that EVM execution reverted.
	pub fn is_execution_reverted(&self) -> bool {
		self.node_message()
			.is_some_and(|message| message.to_ascii_lowercase().contains("execution reverted"))
	}
}

/// Fee suggestion for EIP-1559 transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Eip1559Fees {
	pub max_fee_per_gas: u128,
	pub max_priority_fee_per_gas: u128,
}

/// Parameters of an `eth_call` or `eth_estimateGas` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRequest {
	pub from: Option<Address>,
	pub to: Address,
	pub value: U256,
	pub data: Bytes,
}

impl CallRequest {
	/// A read-only call with no sender and no value.
	pub fn read(to: Address, data: impl Into<Bytes>) -> Self {
		Self {
			from: None,
			to,
			value: U256::ZERO,
			data: data.into(),
		}
	}
}

/// The JSON-RPC methods the mirroring client relies on.
#[async_trait]
pub trait ChainRpc: Send + Sync {
	/// `eth_chainId`
	async fn chain_id(&self) -> Result<u64, RpcError>;

	/// `eth_blockNumber`
	async fn block_number(&self) -> Result<u64, RpcError>;

	/// `eth_getTransactionCount`, at the `pending` tag when `pending` is set and
	/// at `latest` otherwise.
	async fn transaction_count(&self, address: Address, pending: bool) -> Result<u64, RpcError>;

	/// `eth_gasPrice`
	async fn gas_price(&self) -> Result<u128, RpcError>;

	/// Fee estimate for EIP-1559 transactions.
	async fn eip1559_fees(&self) -> Result<Eip1559Fees, RpcError>;

	/// `eth_estimateGas`
	async fn estimate_gas(&self, request: &CallRequest) -> Result<u64, RpcError>;

	/// `eth_sendRawTransaction`; returns the hash the node reports.
	async fn send_raw_transaction(&self, raw: &[u8]) -> Result<B256, RpcError>;

	/// `eth_getTransactionReceipt`; `None` while the transaction is unmined.
	async fn transaction_receipt(&self, tx_hash: B256) -> Result<Option<ChainReceipt>, RpcError>;

	/// `eth_call` at the latest block.
	async fn call(&self, request: &CallRequest) -> Result<Bytes, RpcError>;

	/// `eth_getBalance` at the latest block.
	async fn balance(&self, address: Address) -> Result<U256, RpcError>;

	/// `eth_getBlockByNumber` with full transactions; `None` past the head.
	async fn block_transactions(&self, number: u64) -> Result<Option<BlockSummary>, RpcError>;

	/// `eth_accounts`
	async fn accounts(&self) -> Result<Vec<Address>, RpcError>;
}
