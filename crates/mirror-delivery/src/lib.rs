//! Transaction delivery for the mirroring client.
//!
//! Builds transactions against the connected node, signs them with the
//! configured account, broadcasts them and tracks their confirmation. The
//! nonce fetch through broadcast runs under a per-signer lock so concurrent
//! callers sharing one signer get distinct, increasing nonces.

use alloy::primitives::{Address, Bytes, B256, U256};
use chrono::{DateTime, Utc};
use mirror_account::AccountService;
use mirror_config::{FeeMode, TransactionConfig};
use mirror_rpc::{Connection, RpcError};
use mirror_types::{truncate_id, TransactionOutcome};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::instrument;

pub mod builder;
pub mod confirmation;
pub mod locks;
pub mod submitter;

pub use builder::{
	marker_request, memo_data, sign, BuildError, SignedTransaction, SigningError,
	TransactionBuilder, UnsignedTransaction,
};
pub use confirmation::{
	await_confirmation, check_outcome, ConfirmationError, ConfirmationTask, ConfirmationTracker,
	PollSchedule,
};
pub use locks::SignerLocks;
pub use submitter::{submit, SubmitError};

/// What a transaction does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxTarget {
	/// Call into a contract with ABI-encoded calldata.
	ContractCall { contract: Address, calldata: Bytes },
	/// Value transfer, optionally carrying opaque data.
	Transfer { to: Address, data: Bytes },
}

/// How the transaction is priced. `None` asks the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeePolicy {
	Legacy {
		gas_price: Option<u128>,
	},
	Eip1559 {
		max_priority_fee_per_gas: Option<u128>,
	},
}

impl From<&TransactionConfig> for FeePolicy {
	fn from(config: &TransactionConfig) -> Self {
		match config.fee_mode {
			FeeMode::Legacy => FeePolicy::Legacy {
				gas_price: config.gas_price_wei.map(u128::from),
			},
			FeeMode::Eip1559 => FeePolicy::Eip1559 {
				max_priority_fee_per_gas: config.max_priority_fee_wei.map(u128::from),
			},
		}
	}
}

/// A transaction to be built, created per operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRequest {
	pub target: TxTarget,
	pub value: U256,
	/// Estimated (with a safety buffer) when absent.
	pub gas_limit: Option<u64>,
	pub fee: FeePolicy,
	pub from: Address,
}

/// A transaction accepted by the node and not yet known to be mined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingHandle {
	pub tx_hash: B256,
	pub from: Address,
	pub nonce: u64,
	pub submitted_at: DateTime<Utc>,
}

/// Errors that can occur while delivering a transaction.
#[derive(Debug, Error)]
pub enum DeliveryError {
	#[error(transparent)]
	Build(#[from] BuildError),
	#[error(transparent)]
	Signing(#[from] SigningError),
	#[error(transparent)]
	Submit(#[from] SubmitError),
}

/// Builds, signs, submits and tracks transactions for one endpoint.
///
/// Cheap to clone; clones share the signer locks.
#[derive(Clone)]
pub struct DeliveryService {
	connection: Connection,
	account: AccountService,
	builder: TransactionBuilder,
	locks: Arc<SignerLocks>,
	tracker: ConfirmationTracker,
	schedule: PollSchedule,
}

impl DeliveryService {
	pub fn new(
		connection: Connection,
		account: AccountService,
		gas_buffer_percent: u64,
		schedule: PollSchedule,
	) -> Self {
		Self {
			builder: TransactionBuilder::new(connection.clone(), gas_buffer_percent),
			tracker: ConfirmationTracker::new(connection.clone(), schedule),
			connection,
			account,
			locks: Arc::new(SignerLocks::new()),
			schedule,
		}
	}

	pub fn connection(&self) -> &Connection {
		&self.connection
	}

	pub fn account(&self) -> &AccountService {
		&self.account
	}

	pub fn tracker(&self) -> &ConfirmationTracker {
		&self.tracker
	}

	/// Builds, signs and submits `request` under the sender's lock.
	#[instrument(skip_all, fields(from = %request.from))]
	pub async fn deliver(&self, request: TransactionRequest) -> Result<PendingHandle, DeliveryError> {
		let _guard = self.locks.acquire(request.from).await;
		let unsigned = self.builder.build(request).await?;
		let signed = sign(unsigned, self.account.interface()).await?;
		Ok(submit(signed, &self.connection).await?)
	}

	/// Delivers `request` and waits up to `timeout` for its receipt.
	///
	/// The signer lock is released before waiting.
	pub async fn deliver_and_wait(
		&self,
		request: TransactionRequest,
		timeout: Duration,
	) -> Result<(PendingHandle, TransactionOutcome), DeliveryError> {
		let handle = self.deliver(request).await?;
		let outcome = self.await_confirmation(handle.tx_hash, timeout).await;
		tracing::debug!(
			tx_hash = %truncate_id(&handle.tx_hash.to_string()),
			terminal = outcome.is_terminal(),
			"Delivery finished"
		);
		Ok((handle, outcome))
	}

	pub async fn await_confirmation(&self, tx_hash: B256, timeout: Duration) -> TransactionOutcome {
		await_confirmation(tx_hash, &self.connection, timeout, self.schedule).await
	}

	pub async fn check_outcome(&self, tx_hash: B256) -> Result<TransactionOutcome, RpcError> {
		check_outcome(tx_hash, &self.connection).await
	}
}

#[cfg(test)]
pub(crate) mod tests {
	use super::*;
	use alloy::signers::local::PrivateKeySigner;
	use mirror_account::LocalAccount;
	use mirror_config::builders::ConfigBuilder;
	use mirror_rpc::testing::MockNode;
	use mirror_types::KeyHandle;

	pub(crate) const DEV_KEY: &str =
		"0x4f3edf983ac636a65a842ce7c78d9aa706d3b113bce9c46f30d7d21715b23b1d";

	pub(crate) fn dev_address() -> Address {
		DEV_KEY
			.parse::<PrivateKeySigner>()
			.map(|signer| signer.address())
			.unwrap()
	}

	pub(crate) fn dev_account() -> LocalAccount {
		LocalAccount::new(dev_address(), KeyHandle::Inline(DEV_KEY.into()))
	}

	pub(crate) fn funded_node() -> MockNode {
		MockNode::new(1337).with_balance(dev_address(), U256::from(10u128.pow(20)))
	}

	pub(crate) async fn dev_connection(node: MockNode) -> (Connection, Arc<MockNode>) {
		let config = ConfigBuilder::new()
			.chain_id(1337)
			.signer(dev_address(), KeyHandle::Inline(DEV_KEY.into()))
			.build();
		let node = Arc::new(node);
		let connection = Connection::from_rpc(node.clone(), &config.endpoint)
			.await
			.unwrap();
		(connection, node)
	}

	async fn service(node: MockNode) -> (DeliveryService, Arc<MockNode>) {
		let (connection, node) = dev_connection(node).await;
		let account = AccountService::new(Box::new(dev_account()));
		let service = DeliveryService::new(connection, account, 20, PollSchedule::default());
		(service, node)
	}

	fn marker(memo: &str) -> TransactionRequest {
		marker_request(
			dev_address(),
			memo,
			U256::ZERO,
			FeePolicy::Legacy { gas_price: None },
		)
	}

	#[tokio::test]
	async fn test_deliver_and_wait_confirms() {
		let (service, _node) = service(funded_node()).await;

		let (handle, outcome) = service
			.deliver_and_wait(marker("product:1:Widget"), Duration::from_secs(5))
			.await
			.unwrap();
		assert_eq!(handle.nonce, 0);
		assert!(matches!(
			outcome,
			TransactionOutcome::Confirmed { tx_hash, block_number: 1, .. } if tx_hash == handle.tx_hash
		));
	}

	#[tokio::test]
	async fn test_concurrent_deliveries_get_increasing_nonces() {
		let (service, node) = service(funded_node()).await;
		node.set_automine(false).await;

		let tasks: Vec<_> = (0..4)
			.map(|i| {
				let service = service.clone();
				tokio::spawn(async move { service.deliver(marker(&format!("product:{}:x", i))).await })
			})
			.collect();

		let mut nonces = Vec::new();
		for task in tasks {
			nonces.push(task.await.unwrap().unwrap().nonce);
		}
		nonces.sort_unstable();
		assert_eq!(nonces, vec![0, 1, 2, 3]);

		let accepted: Vec<u64> = node
			.accepted_transactions()
			.await
			.into_iter()
			.map(|(_, nonce)| nonce)
			.collect();
		assert_eq!(accepted, vec![0, 1, 2, 3]);
	}

	#[tokio::test]
	async fn test_insufficient_funds_yields_no_hash() {
		let (service, _node) = service(MockNode::new(1337)).await;

		let err = service.deliver(marker("order:1:1:3")).await.unwrap_err();
		assert!(matches!(
			err,
			DeliveryError::Submit(SubmitError::InsufficientFunds(_))
		));
	}

	#[tokio::test]
	async fn test_unmined_transaction_stays_pending_until_mined() {
		let (service, node) = service(funded_node()).await;
		node.set_automine(false).await;

		let (handle, outcome) = service
			.deliver_and_wait(marker("order:2:1:1"), Duration::ZERO)
			.await
			.unwrap();
		assert_eq!(outcome, TransactionOutcome::Pending { tx_hash: handle.tx_hash });

		node.mine_pending().await;
		assert!(service
			.check_outcome(handle.tx_hash)
			.await
			.unwrap()
			.is_confirmed());
	}

	#[test]
	fn test_fee_policy_from_config() {
		let mut config = TransactionConfig::default();
		config.gas_price_wei = Some(5);
		assert_eq!(
			FeePolicy::from(&config),
			FeePolicy::Legacy { gas_price: Some(5) }
		);

		config.fee_mode = FeeMode::Eip1559;
		assert_eq!(
			FeePolicy::from(&config),
			FeePolicy::Eip1559 {
				max_priority_fee_per_gas: None
			}
		);
	}
}
