//! `ChainRpc` over an alloy HTTP provider.

use crate::{CallRequest, ChainRpc, Eip1559Fees, RpcError};
use alloy::consensus::Transaction as _;
use alloy::eips::BlockNumberOrTag;
use alloy::network::{Ethereum, ReceiptResponse};
use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::providers::{Provider, RootProvider};
use alloy::rpc::types::TransactionRequest;
use alloy::transports::TransportError;
use async_trait::async_trait;
use mirror_types::{BlockSummary, ChainReceipt, ChainTransaction};

/// Plain JSON-RPC provider without fillers or a wallet.
///
/// Nonces, fees and signatures are resolved by the delivery crate, so the
/// provider only forwards requests.
pub struct AlloyRpc {
	provider: RootProvider<Ethereum>,
}

impl AlloyRpc {
	/// Creates a provider for an `http://` or `https://` endpoint.
	///
	/// Returns the rejection reason when the URL is unusable. The URL itself
	/// is not echoed, since hosted endpoints embed API keys in it.
	pub fn new(rpc_url: &str) -> Result<Self, String> {
		if !(rpc_url.starts_with("http://") || rpc_url.starts_with("https://")) {
			return Err("unsupported scheme, expected http or https".to_string());
		}
		let url = match rpc_url.parse() {
			Ok(url) => url,
			Err(_) => return Err("malformed URL".to_string()),
		};
		Ok(Self {
			provider: RootProvider::<Ethereum>::new_http(url),
		})
	}

	fn transaction_request(request: &CallRequest) -> TransactionRequest {
		let mut tx = TransactionRequest::default()
			.to(request.to)
			.value(request.value)
			.input(request.data.clone().into());
		if let Some(from) = request.from {
			tx = tx.from(from);
		}
		tx
	}
}

/// Keeps the node's error code and message when there is one.
fn map_transport_error(err: TransportError) -> RpcError {
	match err.as_error_resp() {
		Some(payload) => RpcError::Node {
			code: payload.code,
			message: payload.message.to_string(),
		},
		None => RpcError::Transport(err.to_string()),
	}
}

#[async_trait]
impl ChainRpc for AlloyRpc {
	async fn chain_id(&self) -> Result<u64, RpcError> {
		self.provider.get_chain_id().await.map_err(map_transport_error)
	}

	async fn block_number(&self) -> Result<u64, RpcError> {
		self.provider
			.get_block_number()
			.await
			.map_err(map_transport_error)
	}

	async fn transaction_count(&self, address: Address, pending: bool) -> Result<u64, RpcError> {
		let request = self.provider.get_transaction_count(address);
		let count = if pending {
			request.pending().await
		} else {
			request.latest().await
		};
		count.map_err(map_transport_error)
	}

	async fn gas_price(&self) -> Result<u128, RpcError> {
		self.provider.get_gas_price().await.map_err(map_transport_error)
	}

	async fn eip1559_fees(&self) -> Result<Eip1559Fees, RpcError> {
		let estimate = self
			.provider
			.estimate_eip1559_fees()
			.await
			.map_err(map_transport_error)?;
		Ok(Eip1559Fees {
			max_fee_per_gas: estimate.max_fee_per_gas,
			max_priority_fee_per_gas: estimate.max_priority_fee_per_gas,
		})
	}

	async fn estimate_gas(&self, request: &CallRequest) -> Result<u64, RpcError> {
		self.provider
			.estimate_gas(Self::transaction_request(request))
			.await
			.map_err(map_transport_error)
	}

	async fn send_raw_transaction(&self, raw: &[u8]) -> Result<B256, RpcError> {
		let pending = self
			.provider
			.send_raw_transaction(raw)
			.await
			.map_err(map_transport_error)?;
		Ok(*pending.tx_hash())
	}

	async fn transaction_receipt(&self, tx_hash: B256) -> Result<Option<ChainReceipt>, RpcError> {
		let receipt = self
			.provider
			.get_transaction_receipt(tx_hash)
			.await
			.map_err(map_transport_error)?;

		let Some(receipt) = receipt else {
			return Ok(None);
		};
		let block_number = receipt.block_number.ok_or_else(|| {
			RpcError::Response("receipt without block number".to_string())
		})?;

		Ok(Some(ChainReceipt {
			tx_hash: receipt.transaction_hash,
			block_number,
			gas_used: receipt.gas_used,
			success: receipt.status(),
			logs: receipt
				.inner
				.logs()
				.iter()
				.map(|log| log.inner.clone())
				.collect(),
		}))
	}

	async fn call(&self, request: &CallRequest) -> Result<Bytes, RpcError> {
		self.provider
			.call(Self::transaction_request(request))
			.await
			.map_err(map_transport_error)
	}

	async fn balance(&self, address: Address) -> Result<U256, RpcError> {
		self.provider
			.get_balance(address)
			.await
			.map_err(map_transport_error)
	}

	async fn block_transactions(&self, number: u64) -> Result<Option<BlockSummary>, RpcError> {
		let block = self
			.provider
			.get_block_by_number(BlockNumberOrTag::Number(number))
			.full()
			.await
			.map_err(map_transport_error)?;

		let Some(block) = block else {
			return Ok(None);
		};
		let transactions = block
			.transactions
			.txns()
			.map(|tx| ChainTransaction {
				hash: *tx.inner.tx_hash(),
				from: tx.inner.signer(),
				to: tx.to(),
				value: tx.value(),
				gas_limit: tx.gas_limit(),
				gas_price: tx
					.effective_gas_price
					.unwrap_or_else(|| tx.max_fee_per_gas()),
			})
			.collect();

		Ok(Some(BlockSummary {
			number: block.header.number,
			timestamp: block.header.timestamp,
			transactions,
		}))
	}

	async fn accounts(&self) -> Result<Vec<Address>, RpcError> {
		self.provider.get_accounts().await.map_err(map_transport_error)
	}
}
