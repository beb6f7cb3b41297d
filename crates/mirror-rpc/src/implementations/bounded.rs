//! Per-request time bound around any `ChainRpc`.

use crate::{CallRequest, ChainRpc, Eip1559Fees, RpcError};
use alloy::primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use mirror_types::{BlockSummary, ChainReceipt};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Fails any request that takes longer than `timeout` with
/// [`RpcError::Timeout`].
pub struct BoundedRpc {
	inner: Arc<dyn ChainRpc>,
	timeout: Duration,
}

impl BoundedRpc {
	pub fn new(inner: Arc<dyn ChainRpc>, timeout: Duration) -> Self {
		Self { inner, timeout }
	}

	async fn bounded<T>(
		&self,
		request: impl Future<Output = Result<T, RpcError>>,
	) -> Result<T, RpcError> {
		tokio::time::timeout(self.timeout, request)
			.await
			.map_err(|_| RpcError::Timeout(self.timeout))?
	}
}

#[async_trait]
impl ChainRpc for BoundedRpc {
	async fn chain_id(&self) -> Result<u64, RpcError> {
		self.bounded(self.inner.chain_id()).await
	}

	async fn block_number(&self) -> Result<u64, RpcError> {
		self.bounded(self.inner.block_number()).await
	}

	async fn transaction_count(&self, address: Address, pending: bool) -> Result<u64, RpcError> {
		self.bounded(self.inner.transaction_count(address, pending))
			.await
	}

	async fn gas_price(&self) -> Result<u128, RpcError> {
		self.bounded(self.inner.gas_price()).await
	}

	async fn eip1559_fees(&self) -> Result<Eip1559Fees, RpcError> {
		self.bounded(self.inner.eip1559_fees()).await
	}

	async fn estimate_gas(&self, request: &CallRequest) -> Result<u64, RpcError> {
		self.bounded(self.inner.estimate_gas(request)).await
	}

	async fn send_raw_transaction(&self, raw: &[u8]) -> Result<B256, RpcError> {
		self.bounded(self.inner.send_raw_transaction(raw)).await
	}

	async fn transaction_receipt(&self, tx_hash: B256) -> Result<Option<ChainReceipt>, RpcError> {
		self.bounded(self.inner.transaction_receipt(tx_hash)).await
	}

	async fn call(&self, request: &CallRequest) -> Result<Bytes, RpcError> {
		self.bounded(self.inner.call(request)).await
	}

	async fn balance(&self, address: Address) -> Result<U256, RpcError> {
		self.bounded(self.inner.balance(address)).await
	}

	async fn block_transactions(&self, number: u64) -> Result<Option<BlockSummary>, RpcError> {
		self.bounded(self.inner.block_transactions(number)).await
	}

	async fn accounts(&self) -> Result<Vec<Address>, RpcError> {
		self.bounded(self.inner.accounts()).await
	}
}
