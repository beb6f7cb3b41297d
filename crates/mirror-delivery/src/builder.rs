//! Transaction construction and signing.
//!
//! `TransactionBuilder::build` resolves everything a transaction needs from
//! the node (pending nonce, gas limit, fees) and returns an unsigned typed
//! transaction. `sign` turns it into an EIP-2718 envelope using an account.
//! Neither step caches anything between calls.

use crate::{FeePolicy, TransactionRequest, TxTarget};
use alloy::consensus::{SignableTransaction, TxEip1559, TxEnvelope, TxLegacy};
use alloy::eips::eip2718::Encodable2718;
use alloy::primitives::{Address, Bytes, TxKind, B256, U256};
use mirror_account::{AccountError, AccountInterface};
use mirror_rpc::envelope::{decode_envelope, recover_signer, EnvelopeError};
use mirror_rpc::{CallRequest, Connection, RpcError};
use thiserror::Error;

/// Errors raised while building a transaction.
#[derive(Debug, Error)]
pub enum BuildError {
	/// The request is malformed and was rejected before any RPC call.
	#[error("Invalid request: {0}")]
	InvalidRequest(String),
	#[error("Failed to fetch nonce: {0}")]
	NonceFetch(RpcError),
	#[error("Gas estimation failed: {0}")]
	GasEstimation(RpcError),
	#[error("Fee estimation failed: {0}")]
	FeeEstimation(RpcError),
}

/// Errors raised while signing a transaction.
#[derive(Debug, Error)]
pub enum SigningError {
	#[error(transparent)]
	Account(#[from] AccountError),
	/// The account is not the sender the transaction was built for.
	#[error("Account {account} cannot sign for sender {from}")]
	SenderMismatch { account: Address, from: Address },
}

#[derive(Debug, Clone, PartialEq)]
enum TypedTransaction {
	Legacy(TxLegacy),
	Eip1559(TxEip1559),
}

/// A fully resolved transaction waiting for a signature.
#[derive(Debug, Clone, PartialEq)]
pub struct UnsignedTransaction {
	from: Address,
	tx: TypedTransaction,
}

impl UnsignedTransaction {
	pub fn from(&self) -> Address {
		self.from
	}

	pub fn nonce(&self) -> u64 {
		match &self.tx {
			TypedTransaction::Legacy(tx) => tx.nonce,
			TypedTransaction::Eip1559(tx) => tx.nonce,
		}
	}

	pub fn gas_limit(&self) -> u64 {
		match &self.tx {
			TypedTransaction::Legacy(tx) => tx.gas_limit,
			TypedTransaction::Eip1559(tx) => tx.gas_limit,
		}
	}

	pub fn chain_id(&self) -> Option<u64> {
		match &self.tx {
			TypedTransaction::Legacy(tx) => tx.chain_id,
			TypedTransaction::Eip1559(tx) => Some(tx.chain_id),
		}
	}

	pub fn is_eip1559(&self) -> bool {
		matches!(self.tx, TypedTransaction::Eip1559(_))
	}

	/// Digest the sender signs.
	pub fn signature_hash(&self) -> B256 {
		match &self.tx {
			TypedTransaction::Legacy(tx) => tx.signature_hash(),
			TypedTransaction::Eip1559(tx) => tx.signature_hash(),
		}
	}
}

/// A signed transaction ready for broadcast.
///
/// Consumed by `submit`; it cannot be sent twice through the client.
#[derive(Debug, PartialEq, Eq)]
pub struct SignedTransaction {
	/// EIP-2718 encoded envelope.
	pub raw: Bytes,
	/// Keccak hash of the envelope.
	pub hash: B256,
	pub nonce: u64,
	pub from: Address,
}

impl SignedTransaction {
	/// Recovers the signing address from the encoded envelope.
	pub fn recover_signer(&self) -> Result<Address, EnvelopeError> {
		recover_signer(&decode_envelope(&self.raw)?)
	}
}

/// Resolves transaction requests against the connected node.
#[derive(Debug, Clone)]
pub struct TransactionBuilder {
	connection: Connection,
	gas_buffer_percent: u64,
}

impl TransactionBuilder {
	pub fn new(connection: Connection, gas_buffer_percent: u64) -> Self {
		Self {
			connection,
			gas_buffer_percent,
		}
	}

	/// Builds an unsigned transaction for `request`.
	///
	/// The nonce is always the node's `pending` count for the sender, so
	/// callers must hold the sender's lock until the result is submitted.
	pub async fn build(
		&self,
		request: TransactionRequest,
	) -> Result<UnsignedTransaction, BuildError> {
		validate(&request)?;
		let rpc = self.connection.rpc();
		let (to, input) = match request.target {
			TxTarget::ContractCall { contract, calldata } => (contract, calldata),
			TxTarget::Transfer { to, data } => (to, data),
		};

		let nonce = rpc
			.transaction_count(request.from, true)
			.await
			.map_err(BuildError::NonceFetch)?;

		let gas_limit = match request.gas_limit {
			Some(limit) => limit,
			None => {
				let estimate = rpc
					.estimate_gas(&CallRequest {
						from: Some(request.from),
						to,
						value: request.value,
						data: input.clone(),
					})
					.await
					.map_err(BuildError::GasEstimation)?;
				with_buffer(estimate, self.gas_buffer_percent)
			},
		};

		let chain_id = self.connection.chain_id();
		let tx = match request.fee {
			FeePolicy::Legacy { gas_price } => {
				let gas_price = match gas_price {
					Some(price) => price,
					None => rpc.gas_price().await.map_err(BuildError::FeeEstimation)?,
				};
				TypedTransaction::Legacy(TxLegacy {
					chain_id: Some(chain_id),
					nonce,
					gas_price,
					gas_limit,
					to: TxKind::Call(to),
					value: request.value,
					input,
				})
			},
			FeePolicy::Eip1559 {
				max_priority_fee_per_gas,
			} => {
				let estimate = rpc.eip1559_fees().await.map_err(BuildError::FeeEstimation)?;
				let priority =
					max_priority_fee_per_gas.unwrap_or(estimate.max_priority_fee_per_gas);
				let max_fee = estimate
					.max_fee_per_gas
					.saturating_sub(estimate.max_priority_fee_per_gas)
					.saturating_add(priority);
				TypedTransaction::Eip1559(TxEip1559 {
					chain_id,
					nonce,
					gas_limit,
					max_fee_per_gas: max_fee,
					max_priority_fee_per_gas: priority,
					to: TxKind::Call(to),
					value: request.value,
					input,
					..Default::default()
				})
			},
		};

		tracing::debug!(from = %request.from, nonce, gas_limit, "Built transaction");
		Ok(UnsignedTransaction {
			from: request.from,
			tx,
		})
	}
}

fn validate(request: &TransactionRequest) -> Result<(), BuildError> {
	if request.from == Address::ZERO {
		return Err(BuildError::InvalidRequest(
			"sender cannot be the zero address".into(),
		));
	}
	match &request.target {
		TxTarget::Transfer { to, .. } if *to == Address::ZERO => Err(BuildError::InvalidRequest(
			"transfer recipient cannot be the zero address".into(),
		)),
		TxTarget::ContractCall { contract, .. } if *contract == Address::ZERO => Err(
			BuildError::InvalidRequest("contract cannot be the zero address".into()),
		),
		TxTarget::ContractCall { calldata, .. } if calldata.is_empty() => Err(
			BuildError::InvalidRequest("contract call without calldata".into()),
		),
		_ => Ok(()),
	}
}

fn with_buffer(estimate: u64, percent: u64) -> u64 {
	estimate.saturating_add(estimate.saturating_mul(percent) / 100)
}

/// Signs `unsigned` with `account`.
///
/// Depends only on its inputs: no RPC calls are made.
pub async fn sign(
	unsigned: UnsignedTransaction,
	account: &dyn AccountInterface,
) -> Result<SignedTransaction, SigningError> {
	let account_address = account.address().await?;
	if account_address != unsigned.from {
		return Err(SigningError::SenderMismatch {
			account: account_address,
			from: unsigned.from,
		});
	}

	let nonce = unsigned.nonce();
	let signature = account.sign_hash(&unsigned.signature_hash()).await?;
	let envelope: TxEnvelope = match unsigned.tx {
		TypedTransaction::Legacy(tx) => tx.into_signed(signature).into(),
		TypedTransaction::Eip1559(tx) => tx.into_signed(signature).into(),
	};

	Ok(SignedTransaction {
		raw: envelope.encoded_2718().into(),
		hash: *envelope.tx_hash(),
		nonce,
		from: unsigned.from,
	})
}

/// Value of a marker transaction's memo: UTF-8 text as calldata.
pub fn memo_data(memo: &str) -> Bytes {
	Bytes::copy_from_slice(memo.as_bytes())
}

/// Self-transfer request carrying `memo`.
pub fn marker_request(from: Address, memo: &str, value: U256, fee: FeePolicy) -> TransactionRequest {
	TransactionRequest {
		target: TxTarget::Transfer {
			to: from,
			data: memo_data(memo),
		},
		value,
		gas_limit: None,
		fee,
		from,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::tests::{dev_account, dev_address, dev_connection};
	use mirror_rpc::testing::MockNode;

	fn transfer(from: Address, fee: FeePolicy) -> TransactionRequest {
		marker_request(from, "product:1:Widget", U256::ZERO, fee)
	}

	#[tokio::test]
	async fn test_recovered_signer_matches_sender() {
		let (connection, _node) = dev_connection(MockNode::new(1337)).await;
		let builder = TransactionBuilder::new(connection, 20);

		for fee in [
			FeePolicy::Legacy { gas_price: None },
			FeePolicy::Eip1559 {
				max_priority_fee_per_gas: None,
			},
		] {
			let unsigned = builder.build(transfer(dev_address(), fee)).await.unwrap();
			let signed = sign(unsigned, &dev_account()).await.unwrap();
			assert_eq!(signed.recover_signer().unwrap(), dev_address());
			assert_eq!(signed.from, dev_address());
		}
	}

	#[tokio::test]
	async fn test_gas_estimate_gets_buffer() {
		let (connection, _node) = dev_connection(MockNode::new(1337)).await;
		let builder = TransactionBuilder::new(connection, 20);

		let unsigned = builder
			.build(transfer(dev_address(), FeePolicy::Legacy { gas_price: Some(1) }))
			.await
			.unwrap();
		let memo_gas = 16 * "product:1:Widget".len() as u64;
		assert_eq!(unsigned.gas_limit(), with_buffer(21_000 + memo_gas, 20));
		assert_eq!(unsigned.chain_id(), Some(1337));
		assert_eq!(unsigned.nonce(), 0);
		assert!(!unsigned.is_eip1559());
	}

	#[tokio::test]
	async fn test_rejects_malformed_requests() {
		let (connection, _node) = dev_connection(MockNode::new(1337)).await;
		let builder = TransactionBuilder::new(connection, 20);
		let fee = FeePolicy::Legacy { gas_price: None };

		let zero_sender = transfer(Address::ZERO, fee);
		assert!(matches!(
			builder.build(zero_sender).await,
			Err(BuildError::InvalidRequest(_))
		));

		let empty_call = TransactionRequest {
			target: TxTarget::ContractCall {
				contract: Address::repeat_byte(0xAA),
				calldata: Bytes::new(),
			},
			value: U256::ZERO,
			gas_limit: None,
			fee,
			from: dev_address(),
		};
		assert!(matches!(
			builder.build(empty_call).await,
			Err(BuildError::InvalidRequest(_))
		));
	}

	#[tokio::test]
	async fn test_nonce_fetch_failure() {
		let (connection, node) = dev_connection(MockNode::new(1337)).await;
		node.set_offline(true).await;
		let builder = TransactionBuilder::new(connection, 20);

		let result = builder
			.build(transfer(dev_address(), FeePolicy::Legacy { gas_price: None }))
			.await;
		assert!(matches!(result, Err(BuildError::NonceFetch(_))));
	}

	#[tokio::test]
	async fn test_sign_rejects_foreign_sender() {
		let (connection, _node) = dev_connection(MockNode::new(1337)).await;
		let builder = TransactionBuilder::new(connection, 20);
		let other = Address::repeat_byte(0x33);

		let unsigned = builder
			.build(transfer(other, FeePolicy::Legacy { gas_price: Some(1) }))
			.await
			.unwrap();
		assert!(matches!(
			sign(unsigned, &dev_account()).await,
			Err(SigningError::SenderMismatch { .. })
		));
	}

	#[test]
	fn test_with_buffer() {
		assert_eq!(with_buffer(100_000, 20), 120_000);
		assert_eq!(with_buffer(u64::MAX, 20), u64::MAX);
	}
}
