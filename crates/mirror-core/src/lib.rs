//! Product and purchase mirroring for the catalog service.
//!
//! [`MirrorFacade`] is the entry point used by the HTTP boundary. Every
//! operation writes the catalog first and only then mirrors the change on
//! chain: a contract call when a registry is configured, a marker
//! self-transfer otherwise. Mirroring failures are recorded on the row and
//! never undo the catalog write.

use alloy::primitives::{Address, B256, U256};
use alloy::sol_types::{SolCall, SolEvent};
use dashmap::DashSet;
use mirror_account::AccountError;
use mirror_config::Config;
use mirror_delivery::{
	marker_request, DeliveryError, DeliveryService, FeePolicy, TransactionRequest, TxTarget,
};
use mirror_reader::{ContractStateReader, ReadError};
use mirror_rpc::RpcError;
use mirror_storage::StorageService;
use mirror_types::contract::IProductRegistry;
use mirror_types::{
	format_wei, truncate_id, AccountInfo, HealthStatus, MirrorInfo, MirrorResult, MirrorState,
	NewProduct, OrderRow, ProductRecord, ProductRow, PurchaseRecord, TransactionOutcome,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;

pub mod builder;
pub mod catalog;
pub mod monitoring;
pub mod reports;
pub mod state;

pub use builder::{BuilderError, MirrorBuilder};
pub use catalog::{CatalogError, CatalogStore, MirrorTarget};
pub use monitoring::ReconciliationMonitor;
pub use state::{MirrorStateError, MirrorStateMachine};

/// Errors returned by facade operations.
#[derive(Debug, Error)]
pub enum FacadeError {
	#[error("Invalid input: {0}")]
	InvalidInput(String),
	#[error("{0}")]
	NotFound(String),
	#[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
	InsufficientStock {
		product_id: u64,
		requested: u64,
		available: u64,
	},
	#[error("Rejected: {0}")]
	Rejected(String),
	#[error("{0}")]
	InvalidTransition(String),
	/// Reconciliation was requested for an entity without a mirror transaction.
	#[error("{0}")]
	NotSubmitted(String),
	#[error("No registry contract configured")]
	ContractNotConfigured,
	#[error("Chain unavailable: {0}")]
	ChainUnavailable(String),
	/// On-chain data did not match the expected layout.
	#[error("Decode error: {0}")]
	Decode(String),
	#[error("Delivery error: {0}")]
	Delivery(String),
	#[error("Storage error: {0}")]
	Storage(String),
}

impl From<CatalogError> for FacadeError {
	fn from(err: CatalogError) -> Self {
		match err {
			CatalogError::Storage(message) => FacadeError::Storage(message),
			CatalogError::ProductNotFound(_) | CatalogError::OrderNotFound(_) => {
				FacadeError::NotFound(err.to_string())
			},
			CatalogError::InvalidInput(message) => FacadeError::InvalidInput(message),
			CatalogError::InactiveProduct(_) => FacadeError::Rejected(err.to_string()),
			CatalogError::InsufficientStock {
				product_id,
				requested,
				available,
			} => FacadeError::InsufficientStock {
				product_id,
				requested,
				available,
			},
			CatalogError::Transition(e) => FacadeError::InvalidTransition(e.to_string()),
		}
	}
}

impl From<ReadError> for FacadeError {
	fn from(err: ReadError) -> Self {
		match err {
			ReadError::NotFound { .. } => FacadeError::NotFound(err.to_string()),
			ReadError::Decode { .. } => FacadeError::Decode(err.to_string()),
			ReadError::Rpc(e) => e.into(),
			ReadError::ContractNotConfigured => FacadeError::ContractNotConfigured,
		}
	}
}

impl From<RpcError> for FacadeError {
	fn from(err: RpcError) -> Self {
		FacadeError::ChainUnavailable(err.to_string())
	}
}

impl From<DeliveryError> for FacadeError {
	fn from(err: DeliveryError) -> Self {
		FacadeError::Delivery(err.to_string())
	}
}

impl From<AccountError> for FacadeError {
	fn from(err: AccountError) -> Self {
		FacadeError::Delivery(err.to_string())
	}
}

/// Reason recorded when a mirror attempt stopped before reaching an outcome.
const INTERRUPTED: &str = "mirror attempt interrupted";

/// Reason recorded when a pending mirror outlived its monitoring window.
const UNRESOLVED: &str = "transaction not mined within the monitoring window";

fn unix_now() -> u64 {
	chrono::Utc::now().timestamp().max(0) as u64
}

/// Catalog operations with on-chain mirroring.
///
/// Cheap to clone; clones share storage, signer locks and the connection.
#[derive(Clone)]
pub struct MirrorFacade {
	config: Arc<Config>,
	catalog: Arc<CatalogStore>,
	delivery: DeliveryService,
	reader: ContractStateReader,
	monitor: ReconciliationMonitor,
	in_flight: Arc<DashSet<MirrorTarget>>,
}

/// Marks `target` as being mirrored by this process.
///
/// If dropped before [`MirrorAttempt::finish`], for instance because the
/// caller's future was cancelled, the attempt is resolved in the background
/// so the row does not stay `Submitting` forever.
struct MirrorAttempt {
	facade: MirrorFacade,
	target: MirrorTarget,
	attempt: Option<u32>,
	finished: bool,
}

impl MirrorAttempt {
	fn begin(facade: &MirrorFacade, target: MirrorTarget) -> Result<Self, FacadeError> {
		if !facade.in_flight.insert(target) {
			return Err(FacadeError::InvalidTransition(format!(
				"mirror of {} is already in progress",
				target
			)));
		}
		Ok(Self {
			facade: facade.clone(),
			target,
			attempt: None,
			finished: false,
		})
	}

	fn finish(&mut self) {
		self.finished = true;
	}
}

impl Drop for MirrorAttempt {
	fn drop(&mut self) {
		self.facade.in_flight.remove(&self.target);
		let Some(attempt) = self.attempt.filter(|_| !self.finished) else {
			return;
		};
		let Ok(runtime) = tokio::runtime::Handle::try_current() else {
			return;
		};
		let facade = self.facade.clone();
		let target = self.target;
		runtime.spawn(async move {
			if let Err(e) = facade.recover_interrupted(target, attempt).await {
				tracing::warn!(%target, error = %e, "Failed to resolve interrupted mirror attempt");
			}
		});
	}
}

impl MirrorFacade {
	pub fn new(
		config: Config,
		storage: Arc<StorageService>,
		delivery: DeliveryService,
		reader: ContractStateReader,
	) -> Self {
		let monitor = ReconciliationMonitor::new(
			delivery.clone(),
			config.confirmation.max_interval(),
			config.confirmation.monitoring_timeout(),
		);
		Self {
			config: Arc::new(config),
			catalog: Arc::new(CatalogStore::new(storage)),
			delivery,
			reader,
			monitor,
			in_flight: Arc::new(DashSet::new()),
		}
	}

	pub fn config(&self) -> &Config {
		&self.config
	}

	pub fn catalog(&self) -> &CatalogStore {
		&self.catalog
	}

	/// Creates a product and, when requested, mirrors it on chain.
	#[instrument(skip_all, fields(name = %input.name))]
	pub async fn register_product(
		&self,
		input: NewProduct,
	) -> Result<MirrorResult<ProductRow>, FacadeError> {
		let row = self.catalog.create_product(&input).await?;
		tracing::info!(product_id = row.id, "Product created");

		let target = MirrorTarget::Product(row.id);
		if input.mirror {
			self.mirror_logged(target).await;
		}
		let row = self.catalog.get_product(row.id).await?;
		Ok(MirrorResult::from_info(row.clone(), &row.mirror))
	}

	/// Places an order and mirrors the purchase on chain.
	///
	/// Stock is decremented and the order stored before any chain work.
	#[instrument(skip_all, fields(product_id = product_id, quantity = quantity, buyer = %buyer))]
	pub async fn purchase_product(
		&self,
		product_id: u64,
		quantity: u64,
		buyer: Address,
	) -> Result<MirrorResult<OrderRow>, FacadeError> {
		let (order, product) = self.catalog.place_order(product_id, quantity, buyer).await?;
		tracing::info!(order_id = order.id, remaining_stock = product.stock, "Order placed");

		self.mirror_logged(MirrorTarget::Order(order.id)).await;
		let order = self.catalog.get_order(order.id).await?;
		Ok(MirrorResult::from_info(order.clone(), &order.mirror))
	}

	/// Resubmits a product mirror that failed or was skipped.
	pub async fn retry_product_mirror(&self, id: u64) -> Result<MirrorResult<ProductRow>, FacadeError> {
		self.mirror(MirrorTarget::Product(id)).await?;
		let row = self.catalog.get_product(id).await?;
		Ok(MirrorResult::from_info(row.clone(), &row.mirror))
	}

	/// Resubmits an order mirror that failed or was skipped.
	pub async fn retry_order_mirror(&self, id: u64) -> Result<MirrorResult<OrderRow>, FacadeError> {
		self.mirror(MirrorTarget::Order(id)).await?;
		let row = self.catalog.get_order(id).await?;
		Ok(MirrorResult::from_info(row.clone(), &row.mirror))
	}

	/// Re-queries the recorded mirror transaction of a product.
	pub async fn reconcile_product(&self, id: u64) -> Result<MirrorResult<ProductRow>, FacadeError> {
		self.reconcile(MirrorTarget::Product(id)).await?;
		let row = self.catalog.get_product(id).await?;
		Ok(MirrorResult::from_info(row.clone(), &row.mirror))
	}

	/// Re-queries the recorded mirror transaction of an order.
	pub async fn reconcile_order(&self, id: u64) -> Result<MirrorResult<OrderRow>, FacadeError> {
		self.reconcile(MirrorTarget::Order(id)).await?;
		let row = self.catalog.get_order(id).await?;
		Ok(MirrorResult::from_info(row.clone(), &row.mirror))
	}

	pub async fn get_product(&self, id: u64) -> Result<ProductRow, FacadeError> {
		Ok(self.catalog.get_product(id).await?)
	}

	pub async fn list_products(&self) -> Result<Vec<ProductRow>, FacadeError> {
		Ok(self.catalog.list_products().await?)
	}

	pub async fn get_order(&self, id: u64) -> Result<OrderRow, FacadeError> {
		Ok(self.catalog.get_order(id).await?)
	}

	pub async fn list_orders(&self) -> Result<Vec<OrderRow>, FacadeError> {
		Ok(self.catalog.list_orders().await?)
	}

	/// Reads a product from the registry by its on-chain id.
	pub async fn get_chain_product(&self, id: u64) -> Result<ProductRecord, FacadeError> {
		Ok(self.reader.read_product(id).await?)
	}

	/// Reads a purchase from the registry by its on-chain id.
	pub async fn get_chain_purchase(&self, id: u64) -> Result<PurchaseRecord, FacadeError> {
		Ok(self.reader.read_purchase(id).await?)
	}

	/// Balance and network summary of the signer account.
	pub async fn get_account_info(&self) -> Result<AccountInfo, FacadeError> {
		let connection = self.delivery.connection();
		let address = self.config.endpoint.signer_account;
		let balance = connection.rpc().balance(address).await?;
		let block_height = connection.current_block_height().await?;
		let gas_price = connection.rpc().gas_price().await?;

		Ok(AccountInfo {
			address,
			balance,
			balance_eth: format_wei(balance),
			network: connection.network_name().to_string(),
			chain_id: connection.chain_id(),
			block_height,
			gas_price,
			contract_address: self.reader.contract(),
		})
	}

	pub async fn health(&self) -> HealthStatus {
		let connection = self.delivery.connection();
		let connected = connection.is_live().await;
		let block_height = if connected {
			connection.current_block_height().await.ok()
		} else {
			None
		};
		HealthStatus {
			connected,
			network: connection.network_name().to_string(),
			chain_id: connection.chain_id(),
			block_height,
		}
	}

	/// Sends a self-transfer of `value` wei and waits for it.
	#[instrument(skip_all, fields(value = %value))]
	pub async fn send_test_transaction(&self, value: U256) -> Result<TransactionOutcome, FacadeError> {
		if !self.delivery.connection().is_live().await {
			return Err(FacadeError::ChainUnavailable("chain endpoint unreachable".into()));
		}
		let request = marker_request(
			self.config.endpoint.signer_account,
			"test",
			value,
			FeePolicy::from(&self.config.transactions),
		);
		let (_, outcome) = self
			.delivery
			.deliver_and_wait(request, self.config.confirmation.timeout())
			.await?;
		Ok(outcome)
	}

	/// Mirrors `target`, logging instead of returning errors so the caller's
	/// catalog write stands.
	async fn mirror_logged(&self, target: MirrorTarget) {
		if let Err(e) = self.mirror(target).await {
			tracing::error!(%target, error = %e, "Failed to record mirror attempt");
		}
	}

	/// One mirror attempt: `Submitting`, then deliver and wait.
	///
	/// A row left in `Submitting` by an attempt that no longer runs is
	/// released first, see [`Self::release_stalled`].
	async fn mirror(&self, target: MirrorTarget) -> Result<MirrorInfo, FacadeError> {
		let mut attempt = MirrorAttempt::begin(self, target)?;

		let current = self.catalog.mirror_info(target).await?;
		if current.state == MirrorState::Submitting {
			self.release_stalled(target, &current).await?;
			let released = self.catalog.mirror_info(target).await?;
			if released.state == MirrorState::Mirrored {
				// The stalled transaction had landed after all
				return Ok(released);
			}
		}

		let info = self
			.catalog
			.update_mirror(target, |info| {
				MirrorStateMachine::transition(info, MirrorState::Submitting)?;
				info.attempts += 1;
				info.tx_hash = None;
				info.submitted_at = None;
				info.outcome = None;
				info.last_error = None;
				Ok(())
			})
			.await?;
		attempt.attempt = Some(info.attempts);
		tracing::info!(%target, attempt = info.attempts, "Mirroring");

		let result = self.submit_and_confirm(target).await;
		if result.is_ok() {
			attempt.finish();
		}
		result
	}

	async fn submit_and_confirm(&self, target: MirrorTarget) -> Result<MirrorInfo, FacadeError> {
		if !self.delivery.connection().is_live().await {
			return self.record_failure(target, "chain endpoint unreachable".into()).await;
		}

		let request = match self.mirror_request(target).await {
			Ok(request) => request,
			Err(reason) => return self.record_failure(target, reason).await,
		};

		let handle = match self.delivery.deliver(request).await {
			Ok(handle) => handle,
			Err(e) => return self.record_failure(target, e.to_string()).await,
		};

		let tx_hash = handle.tx_hash;
		let submitted_at = handle.submitted_at.timestamp().max(0) as u64;
		self.catalog
			.update_mirror(target, |info| {
				info.tx_hash = Some(tx_hash);
				info.submitted_at = Some(submitted_at);
				info.outcome = Some(TransactionOutcome::Pending { tx_hash });
				Ok(())
			})
			.await?;

		let outcome = self
			.delivery
			.await_confirmation(tx_hash, self.config.confirmation.timeout())
			.await;
		let pending = !outcome.is_terminal();
		let info = self.apply_outcome(target, tx_hash, outcome).await?;

		if pending {
			self.spawn_reconciliation(target, tx_hash);
		}
		Ok(info)
	}

	/// Moves a `Submitting` row that no attempt in this process is driving to
	/// `MirrorFailed`, so it can be submitted again.
	///
	/// A row without a hash was interrupted before broadcast. A row with a
	/// hash is re-queried first: a terminal outcome is simply recorded, and a
	/// still-pending one is released only once its monitoring window is over.
	async fn release_stalled(&self, target: MirrorTarget, info: &MirrorInfo) -> Result<(), FacadeError> {
		let reason = match info.tx_hash {
			None => INTERRUPTED,
			Some(tx_hash) => {
				let outcome = self.delivery.check_outcome(tx_hash).await?;
				if outcome.is_terminal() {
					self.apply_outcome(target, tx_hash, outcome).await?;
					return Ok(());
				}
				if !self.pending_window_elapsed(info) {
					return Err(FacadeError::InvalidTransition(format!(
						"{} is waiting for mirror transaction {}",
						target, tx_hash
					)));
				}
				UNRESOLVED
			},
		};

		tracing::warn!(%target, reason, "Releasing stalled mirror attempt");
		let stalled_hash = info.tx_hash;
		self.catalog
			.update_mirror(target, |info| {
				if info.state != MirrorState::Submitting || info.tx_hash != stalled_hash {
					return Ok(());
				}
				MirrorStateMachine::transition(info, MirrorState::MirrorFailed)?;
				info.outcome = Some(TransactionOutcome::Failed {
					reason: reason.to_string(),
					tx_hash: stalled_hash,
				});
				info.last_error = Some(reason.to_string());
				Ok(())
			})
			.await?;
		Ok(())
	}

	/// True once neither the inline wait nor background monitoring can still
	/// resolve the row's pending transaction.
	fn pending_window_elapsed(&self, info: &MirrorInfo) -> bool {
		let Some(submitted_at) = info.submitted_at else {
			return true;
		};
		let confirmation = &self.config.confirmation;
		let window = confirmation.timeout() + confirmation.monitoring_timeout();
		unix_now() >= submitted_at.saturating_add(window.as_secs())
	}

	/// Resolves an attempt whose future was dropped mid-flight.
	async fn recover_interrupted(&self, target: MirrorTarget, attempt: u32) -> Result<(), FacadeError> {
		let info = self.catalog.mirror_info(target).await?;
		if info.state != MirrorState::Submitting || info.attempts != attempt {
			return Ok(());
		}
		if let Some(tx_hash) = info.tx_hash {
			// Broadcast already happened; let monitoring find the receipt
			self.spawn_reconciliation(target, tx_hash);
			return Ok(());
		}

		tracing::warn!(%target, attempt, "Mirror attempt interrupted before broadcast");
		self.catalog
			.update_mirror(target, |info| {
				if info.state != MirrorState::Submitting
					|| info.attempts != attempt
					|| info.tx_hash.is_some()
				{
					return Ok(());
				}
				MirrorStateMachine::transition(info, MirrorState::MirrorFailed)?;
				info.outcome = Some(TransactionOutcome::Failed {
					reason: INTERRUPTED.to_string(),
					tx_hash: None,
				});
				info.last_error = Some(INTERRUPTED.to_string());
				Ok(())
			})
			.await?;
		Ok(())
	}

	async fn record_failure(&self, target: MirrorTarget, reason: String) -> Result<MirrorInfo, FacadeError> {
		tracing::warn!(%target, reason = %reason, "Mirror attempt failed");
		Ok(self
			.catalog
			.update_mirror(target, |info| {
				MirrorStateMachine::transition(info, MirrorState::MirrorFailed)?;
				info.outcome = Some(TransactionOutcome::Failed {
					reason: reason.clone(),
					tx_hash: None,
				});
				info.last_error = Some(reason);
				Ok(())
			})
			.await?)
	}

	/// Builds the transaction that records `target` on chain.
	///
	/// Errors are reasons to store on the row, not facade failures.
	async fn mirror_request(&self, target: MirrorTarget) -> Result<TransactionRequest, String> {
		let from = self.config.endpoint.signer_account;
		let fee = FeePolicy::from(&self.config.transactions);

		let Some(contract) = self.reader.contract() else {
			let memo = match target {
				MirrorTarget::Product(id) => {
					let product = self.catalog.get_product(id).await.map_err(|e| e.to_string())?;
					format!("product:{}:{}", product.id, product.name)
				},
				MirrorTarget::Order(id) => {
					let order = self.catalog.get_order(id).await.map_err(|e| e.to_string())?;
					format!("order:{}:{}:{}", order.id, order.product_id, order.quantity)
				},
			};
			return Ok(marker_request(
				from,
				&memo,
				U256::from(self.config.transactions.marker_value_wei),
				fee,
			));
		};

		let calldata = match target {
			MirrorTarget::Product(id) => {
				let product = self.catalog.get_product(id).await.map_err(|e| e.to_string())?;
				IProductRegistry::registerProductCall {
					name: product.name,
					price: product.price,
					stock: U256::from(product.stock),
				}
				.abi_encode()
			},
			MirrorTarget::Order(id) => {
				let order = self.catalog.get_order(id).await.map_err(|e| e.to_string())?;
				let product = self
					.catalog
					.get_product(order.product_id)
					.await
					.map_err(|e| e.to_string())?;
				let chain_product_id = product
					.mirror
					.chain_entity_id
					.ok_or_else(|| "product is not mirrored on chain".to_string())?;
				let product_data = serde_json::json!({
					"id": product.id,
					"name": product.name,
					"description": product.description,
					"price": product.price.to_string(),
				})
				.to_string();
				IProductRegistry::purchaseProductCall {
					productId: U256::from(chain_product_id),
					quantity: U256::from(order.quantity),
					buyer: order.buyer,
					productData: product_data,
				}
				.abi_encode()
			},
		};

		Ok(TransactionRequest {
			target: TxTarget::ContractCall {
				contract,
				calldata: calldata.into(),
			},
			value: U256::ZERO,
			gas_limit: None,
			fee,
			from,
		})
	}

	/// Stores `outcome` for `tx_hash` unless the row has moved on to a newer
	/// transaction.
	async fn apply_outcome(
		&self,
		target: MirrorTarget,
		tx_hash: B256,
		outcome: TransactionOutcome,
	) -> Result<MirrorInfo, FacadeError> {
		let entity_id = if outcome.is_confirmed() {
			self.entity_id_from_receipt(target, tx_hash).await
		} else {
			None
		};

		let info = self
			.catalog
			.update_mirror(target, |info| {
				if info.tx_hash != Some(tx_hash) {
					return Ok(());
				}
				match &outcome {
					TransactionOutcome::Confirmed { .. } => {
						if info.state == MirrorState::Submitting {
							MirrorStateMachine::transition(info, MirrorState::Mirrored)?;
						}
						if entity_id.is_some() {
							info.chain_entity_id = entity_id;
						}
						info.last_error = None;
					},
					TransactionOutcome::Failed { reason, .. } => {
						if info.state != MirrorState::MirrorFailed {
							MirrorStateMachine::transition(info, MirrorState::MirrorFailed)?;
						}
						// A reverted registration never assigned an id
						info.chain_entity_id = None;
						info.last_error = Some(reason.clone());
					},
					TransactionOutcome::Pending { .. } => {},
				}
				info.outcome = Some(outcome);
				Ok(())
			})
			.await?;

		tracing::info!(
			%target,
			tx_hash = %truncate_id(&tx_hash.to_string()),
			state = %info.state,
			"Mirror outcome recorded"
		);
		Ok(info)
	}

	/// Registry id assigned to `target`, read from the receipt's event log.
	async fn entity_id_from_receipt(&self, target: MirrorTarget, tx_hash: B256) -> Option<u64> {
		let contract = self.reader.contract()?;
		let receipt = match self
			.delivery
			.connection()
			.rpc()
			.transaction_receipt(tx_hash)
			.await
		{
			Ok(receipt) => receipt?,
			Err(e) => {
				tracing::warn!(%target, error = %e, "Failed to fetch mirror receipt");
				return None;
			},
		};

		receipt
			.logs
			.iter()
			.filter(|log| log.address == contract)
			.find_map(|log| {
				let id = match target {
					MirrorTarget::Product(_) => {
						IProductRegistry::ProductRegistered::decode_log_data(&log.data)
							.ok()?
							.productId
					},
					MirrorTarget::Order(_) => {
						IProductRegistry::ProductPurchased::decode_log_data(&log.data)
							.ok()?
							.purchaseId
					},
				};
				u64::try_from(id).ok()
			})
	}

	async fn reconcile(&self, target: MirrorTarget) -> Result<MirrorInfo, FacadeError> {
		let info = self.catalog.mirror_info(target).await?;
		let tx_hash = info
			.tx_hash
			.ok_or_else(|| FacadeError::NotSubmitted(format!("{} has no mirror transaction", target)))?;
		let outcome = self.delivery.check_outcome(tx_hash).await?;
		self.apply_outcome(target, tx_hash, outcome).await
	}

	fn spawn_reconciliation(&self, target: MirrorTarget, tx_hash: B256) {
		if !self.monitor.is_enabled() {
			return;
		}
		let facade = self.clone();
		tokio::spawn(async move {
			if let Some(outcome) = facade.monitor.watch(tx_hash).await {
				if let Err(e) = facade.apply_outcome(target, tx_hash, outcome).await {
					tracing::warn!(%target, error = %e, "Failed to record reconciled outcome");
				}
			}
		});
	}
}
