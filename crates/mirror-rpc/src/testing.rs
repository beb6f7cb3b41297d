//! In-process development chain for tests.
//!
//! `MockNode` behaves like a single-node Ganache instance: it decodes raw
//! transactions, recovers their signer, enforces nonces and balances, mines
//! each accepted transaction into its own block (unless automine is off) and
//! executes the product registry ABI when one is deployed. Faults can be
//! injected to exercise error paths, including transactions that are mined
//! but revert.

use crate::envelope::{decode_envelope, recover_signer};
use crate::{CallRequest, ChainRpc, Eip1559Fees, RpcError};
use alloy::consensus::{Transaction, TxEnvelope};
use alloy::primitives::{Address, Bytes, Log, B256, U256};
use alloy::sol_types::{SolCall, SolEvent, SolInterface};
use async_trait::async_trait;
use mirror_types::contract::{IProductRegistry, Product, Purchase};
use mirror_types::{BlockSummary, ChainReceipt, ChainTransaction};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::sync::Mutex;

const GENESIS_TIMESTAMP: u64 = 1_700_000_000;
const BLOCK_TIME_SECONDS: u64 = 2;
const TRANSFER_GAS: u64 = 21_000;
const CONTRACT_EXECUTION_GAS: u64 = 60_000;
const DEFAULT_GAS_PRICE: u128 = 2_000_000_000;
const DEFAULT_BASE_FEE: u128 = 1_000_000_000;

/// Product registry state, executed natively.
#[derive(Clone, Default)]
struct Registry {
	products: Vec<Product>,
	purchases: Vec<Purchase>,
}

type Execution = Result<(Bytes, Vec<Log>), String>;

impl Registry {
	/// Runs one call against the registry. Mutations are only kept by the
	/// caller on success.
	fn execute(&mut self, address: Address, from: Address, input: &[u8], timestamp: u64) -> Execution {
		use IProductRegistry::IProductRegistryCalls as Calls;

		let call = Calls::abi_decode(input).map_err(|_| "unknown selector".to_string())?;
		match call {
			Calls::registerProduct(call) => {
				if call.name.is_empty() {
					return Err("name required".into());
				}
				let id = U256::from(self.products.len() + 1);
				self.products.push(Product {
					id,
					name: call.name.clone(),
					price: call.price,
					stock: call.stock,
					creator: from,
					createdAt: U256::from(timestamp),
				});
				let event = IProductRegistry::ProductRegistered {
					productId: id,
					name: call.name,
					price: call.price,
					stock: call.stock,
					creator: from,
				};
				Ok((
					IProductRegistry::registerProductCall::abi_encode_returns(&id).into(),
					vec![Log {
						address,
						data: event.encode_log_data(),
					}],
				))
			},
			Calls::purchaseProduct(call) => {
				if call.quantity.is_zero() {
					return Err("quantity must be positive".into());
				}
				let index = self
					.product_index(call.productId)
					.ok_or_else(|| "product does not exist".to_string())?;
				let product = &mut self.products[index];
				if product.stock < call.quantity {
					return Err("insufficient stock".into());
				}
				product.stock -= call.quantity;
				let total_price = product.price.saturating_mul(call.quantity);

				let id = U256::from(self.purchases.len() + 1);
				self.purchases.push(Purchase {
					id,
					productId: call.productId,
					buyer: call.buyer,
					quantity: call.quantity,
					totalPrice: total_price,
					purchasedAt: U256::from(timestamp),
					productData: call.productData,
				});
				let event = IProductRegistry::ProductPurchased {
					purchaseId: id,
					productId: call.productId,
					buyer: call.buyer,
					quantity: call.quantity,
					totalPrice: total_price,
				};
				Ok((
					IProductRegistry::purchaseProductCall::abi_encode_returns(&id).into(),
					vec![Log {
						address,
						data: event.encode_log_data(),
					}],
				))
			},
			Calls::getProduct(call) => {
				// Missing keys read as the zero struct, like a Solidity mapping
				let product = self
					.product_index(call.productId)
					.map(|index| self.products[index].clone())
					.unwrap_or_else(empty_product);
				let output = IProductRegistry::getProductCall::abi_encode_returns(&product);
				Ok((output.into(), Vec::new()))
			},
			Calls::getPurchase(call) => {
				let purchase = self
					.purchase_index(call.purchaseId)
					.map(|index| self.purchases[index].clone())
					.unwrap_or_else(empty_purchase);
				let output = IProductRegistry::getPurchaseCall::abi_encode_returns(&purchase);
				Ok((output.into(), Vec::new()))
			},
			Calls::productCount(_) => {
				let count = U256::from(self.products.len());
				Ok((IProductRegistry::productCountCall::abi_encode_returns(&count).into(), Vec::new()))
			},
			Calls::purchaseCount(_) => {
				let count = U256::from(self.purchases.len());
				Ok((IProductRegistry::purchaseCountCall::abi_encode_returns(&count).into(), Vec::new()))
			},
		}
	}

	fn product_index(&self, id: U256) -> Option<usize> {
		let index = usize::try_from(id).ok()?.checked_sub(1)?;
		(index < self.products.len()).then_some(index)
	}

	fn purchase_index(&self, id: U256) -> Option<usize> {
		let index = usize::try_from(id).ok()?.checked_sub(1)?;
		(index < self.purchases.len()).then_some(index)
	}
}

fn empty_product() -> Product {
	Product {
		id: U256::ZERO,
		name: String::new(),
		price: U256::ZERO,
		stock: U256::ZERO,
		creator: Address::ZERO,
		createdAt: U256::ZERO,
	}
}

fn empty_purchase() -> Purchase {
	Purchase {
		id: U256::ZERO,
		productId: U256::ZERO,
		buyer: Address::ZERO,
		quantity: U256::ZERO,
		totalPrice: U256::ZERO,
		purchasedAt: U256::ZERO,
		productData: String::new(),
	}
}

fn intrinsic_gas(data: &[u8]) -> u64 {
	data.iter().fold(TRANSFER_GAS, |gas, byte| {
		gas + if *byte == 0 { 4 } else { 16 }
	})
}

fn reverted(reason: &str) -> RpcError {
	RpcError::Node {
		code: 3,
		message: format!("execution reverted: {}", reason),
	}
}

fn rejected(message: &str) -> RpcError {
	RpcError::Node {
		code: -32000,
		message: message.to_string(),
	}
}

struct PendingTx {
	hash: B256,
	from: Address,
	envelope: TxEnvelope,
}

struct NodeState {
	chain_id: u64,
	block_number: u64,
	gas_price: u128,
	base_fee: u128,
	balances: HashMap<Address, U256>,
	mined_nonces: HashMap<Address, u64>,
	pending_nonces: HashMap<Address, u64>,
	pending: Vec<PendingTx>,
	receipts: HashMap<B256, ChainReceipt>,
	known: HashSet<B256>,
	accepted: Vec<(Address, u64)>,
	blocks: Vec<BlockSummary>,
	accounts: Vec<Address>,
	revert_next: bool,
	registry_address: Option<Address>,
	registry: Registry,
	automine: bool,
	offline: bool,
	latency: Duration,
	next_send_error: Option<RpcError>,
	call_override: Option<Bytes>,
}

impl NodeState {
	fn timestamp(&self) -> u64 {
		GENESIS_TIMESTAMP + self.block_number * BLOCK_TIME_SECONDS
	}

	fn gas_required(&self, to: Option<Address>, data: &[u8]) -> u64 {
		let mut gas = intrinsic_gas(data);
		if to.is_some() && to == self.registry_address {
			gas += CONTRACT_EXECUTION_GAS;
		}
		gas
	}

	fn mine_pending(&mut self) {
		for tx in std::mem::take(&mut self.pending) {
			self.block_number += 1;
			let receipt = self.execute_transaction(&tx);
			self.receipts.insert(tx.hash, receipt);

			let envelope = &tx.envelope;
			let listed = ChainTransaction {
				hash: tx.hash,
				from: tx.from,
				to: envelope.to(),
				value: envelope.value(),
				gas_limit: envelope.gas_limit(),
				gas_price: envelope.effective_gas_price(u64::try_from(self.base_fee).ok()),
			};
			self.blocks.push(BlockSummary {
				number: self.block_number,
				timestamp: self.timestamp(),
				transactions: vec![listed],
			});
		}
	}

	fn execute_transaction(&mut self, tx: &PendingTx) -> ChainReceipt {
		let envelope = &tx.envelope;
		*self.mined_nonces.entry(tx.from).or_default() += 1;

		let required = self.gas_required(envelope.to(), envelope.input());
		let gas_limit = envelope.gas_limit();
		let price = envelope.effective_gas_price(u64::try_from(self.base_fee).ok());

		let (success, gas_used, logs) = if gas_limit < required {
			(false, gas_limit, Vec::new())
		} else if std::mem::take(&mut self.revert_next) {
			(false, required, Vec::new())
		} else {
			match envelope.to().filter(|to| Some(*to) == self.registry_address) {
				Some(address) => {
					let mut registry = self.registry.clone();
					let timestamp = self.timestamp();
					match registry.execute(address, tx.from, envelope.input(), timestamp) {
						Ok((_, logs)) => {
							self.registry = registry;
							(true, required, logs)
						},
						Err(_) => (false, required, Vec::new()),
					}
				},
				None => (true, required, Vec::new()),
			}
		};

		let fee = U256::from(gas_used) * U256::from(price);
		let value = if success { envelope.value() } else { U256::ZERO };
		let balance = self.balances.entry(tx.from).or_default();
		*balance = balance.saturating_sub(fee + value);
		if let Some(to) = envelope.to() {
			*self.balances.entry(to).or_default() += value;
		}

		ChainReceipt {
			tx_hash: tx.hash,
			block_number: self.block_number,
			gas_used,
			success,
			logs,
		}
	}
}

/// Ganache-like chain living in the test process.
pub struct MockNode {
	state: Mutex<NodeState>,
}

impl MockNode {
	/// A chain with no accounts funded, no registry and automine on.
	pub fn new(chain_id: u64) -> Self {
		Self {
			state: Mutex::new(NodeState {
				chain_id,
				block_number: 0,
				gas_price: DEFAULT_GAS_PRICE,
				base_fee: DEFAULT_BASE_FEE,
				balances: HashMap::new(),
				mined_nonces: HashMap::new(),
				pending_nonces: HashMap::new(),
				pending: Vec::new(),
				receipts: HashMap::new(),
				known: HashSet::new(),
				accepted: Vec::new(),
				blocks: Vec::new(),
				accounts: Vec::new(),
				revert_next: false,
				registry_address: None,
				registry: Registry::default(),
				automine: true,
				offline: false,
				latency: Duration::ZERO,
				next_send_error: None,
				call_override: None,
			}),
		}
	}

	/// Deploys the product registry at `address`.
	pub fn with_registry(mut self, address: Address) -> Self {
		self.state.get_mut().registry_address = Some(address);
		self
	}

	/// Credits `address` with `balance` wei and lists it in `eth_accounts`.
	pub fn with_balance(mut self, address: Address, balance: U256) -> Self {
		let state = self.state.get_mut();
		state.balances.insert(address, balance);
		if !state.accounts.contains(&address) {
			state.accounts.push(address);
		}
		self
	}

	/// Turns per-transaction mining on or off.
	pub async fn set_automine(&self, automine: bool) {
		self.state.lock().await.automine = automine;
	}

	/// Mines every pending transaction, one block each.
	pub async fn mine_pending(&self) {
		self.state.lock().await.mine_pending();
	}

	/// Makes every request fail with a transport error.
	pub async fn set_offline(&self, offline: bool) {
		self.state.lock().await.offline = offline;
	}

	/// Delays every request by `latency`.
	pub async fn set_latency(&self, latency: Duration) {
		self.state.lock().await.latency = latency;
	}

	/// Makes the next mined transaction revert. It is still accepted, mined
	/// and charged for gas.
	pub async fn revert_next_transaction(&self) {
		self.state.lock().await.revert_next = true;
	}

	/// Rewrites the status of an existing receipt, as a reorg onto a
	/// different execution would.
	pub async fn set_receipt_status(&self, tx_hash: B256, success: bool) {
		if let Some(receipt) = self.state.lock().await.receipts.get_mut(&tx_hash) {
			receipt.success = success;
		}
	}

	/// Fails the next `eth_sendRawTransaction` with `error`.
	pub async fn fail_next_send(&self, error: RpcError) {
		self.state.lock().await.next_send_error = Some(error);
	}

	/// Answers every `eth_call` with `response` instead of executing it.
	pub async fn set_call_override(&self, response: Option<Bytes>) {
		self.state.lock().await.call_override = response;
	}

	pub async fn set_balance(&self, address: Address, balance: U256) {
		self.state.lock().await.balances.insert(address, balance);
	}

	/// Sender and nonce of every accepted transaction, in acceptance order.
	pub async fn accepted_transactions(&self) -> Vec<(Address, u64)> {
		self.state.lock().await.accepted.clone()
	}

	async fn enter(&self) -> Result<tokio::sync::MutexGuard<'_, NodeState>, RpcError> {
		let latency = self.state.lock().await.latency;
		if !latency.is_zero() {
			tokio::time::sleep(latency).await;
		}
		let state = self.state.lock().await;
		if state.offline {
			return Err(RpcError::Transport("connection refused".to_string()));
		}
		Ok(state)
	}
}

#[async_trait]
impl ChainRpc for MockNode {
	async fn chain_id(&self) -> Result<u64, RpcError> {
		Ok(self.enter().await?.chain_id)
	}

	async fn block_number(&self) -> Result<u64, RpcError> {
		Ok(self.enter().await?.block_number)
	}

	async fn transaction_count(&self, address: Address, pending: bool) -> Result<u64, RpcError> {
		let state = self.enter().await?;
		let nonces = if pending {
			&state.pending_nonces
		} else {
			&state.mined_nonces
		};
		Ok(nonces.get(&address).copied().unwrap_or_default())
	}

	async fn gas_price(&self) -> Result<u128, RpcError> {
		Ok(self.enter().await?.gas_price)
	}

	async fn eip1559_fees(&self) -> Result<Eip1559Fees, RpcError> {
		let state = self.enter().await?;
		let priority = state.gas_price.saturating_sub(state.base_fee);
		Ok(Eip1559Fees {
			max_fee_per_gas: state.base_fee * 2 + priority,
			max_priority_fee_per_gas: priority,
		})
	}

	async fn estimate_gas(&self, request: &CallRequest) -> Result<u64, RpcError> {
		let state = self.enter().await?;
		if Some(request.to) == state.registry_address {
			let mut registry = state.registry.clone();
			registry
				.execute(
					request.to,
					request.from.unwrap_or_default(),
					&request.data,
					state.timestamp(),
				)
				.map_err(|reason| reverted(&reason))?;
		}
		Ok(state.gas_required(Some(request.to), &request.data))
	}

	async fn send_raw_transaction(&self, raw: &[u8]) -> Result<B256, RpcError> {
		let mut state = self.enter().await?;
		if let Some(error) = state.next_send_error.take() {
			return Err(error);
		}

		let envelope = decode_envelope(raw).map_err(|e| rejected(&e.to_string()))?;
		let from = recover_signer(&envelope).map_err(|e| rejected(&e.to_string()))?;
		let hash = *envelope.tx_hash();

		if state.known.contains(&hash) {
			return Err(rejected("already known"));
		}
		if envelope.chain_id() != Some(state.chain_id) {
			return Err(rejected("invalid chain id for signer"));
		}

		let expected_nonce = state.pending_nonces.get(&from).copied().unwrap_or_default();
		if envelope.nonce() < expected_nonce {
			return Err(rejected(&format!(
				"nonce too low: next nonce {}, tx nonce {}",
				expected_nonce,
				envelope.nonce()
			)));
		}
		if envelope.nonce() > expected_nonce {
			return Err(rejected("nonce too high"));
		}

		let max_cost = U256::from(envelope.gas_limit()) * U256::from(envelope.max_fee_per_gas())
			+ envelope.value();
		let balance = state.balances.get(&from).copied().unwrap_or_default();
		if balance < max_cost {
			return Err(rejected(&format!(
				"insufficient funds for gas * price + value: balance {}, tx cost {}",
				balance, max_cost
			)));
		}

		state.pending_nonces.insert(from, expected_nonce + 1);
		state.known.insert(hash);
		state.accepted.push((from, envelope.nonce()));
		state.pending.push(PendingTx {
			hash,
			from,
			envelope,
		});
		if state.automine {
			state.mine_pending();
		}
		Ok(hash)
	}

	async fn transaction_receipt(&self, tx_hash: B256) -> Result<Option<ChainReceipt>, RpcError> {
		Ok(self.enter().await?.receipts.get(&tx_hash).cloned())
	}

	async fn call(&self, request: &CallRequest) -> Result<Bytes, RpcError> {
		let state = self.enter().await?;
		if let Some(response) = &state.call_override {
			return Ok(response.clone());
		}
		if Some(request.to) != state.registry_address {
			return Ok(Bytes::new());
		}
		let mut registry = state.registry.clone();
		let (output, _) = registry
			.execute(
				request.to,
				request.from.unwrap_or_default(),
				&request.data,
				state.timestamp(),
			)
			.map_err(|reason| reverted(&reason))?;
		Ok(output)
	}

	async fn balance(&self, address: Address) -> Result<U256, RpcError> {
		Ok(self
			.enter()
			.await?
			.balances
			.get(&address)
			.copied()
			.unwrap_or_default())
	}

	async fn block_transactions(&self, number: u64) -> Result<Option<BlockSummary>, RpcError> {
		let state = self.enter().await?;
		if number == 0 {
			return Ok(Some(BlockSummary {
				number: 0,
				timestamp: GENESIS_TIMESTAMP,
				transactions: Vec::new(),
			}));
		}
		let index = usize::try_from(number - 1).unwrap_or(usize::MAX);
		Ok(state.blocks.get(index).cloned())
	}

	async fn accounts(&self) -> Result<Vec<Address>, RpcError> {
		Ok(self.enter().await?.accounts.clone())
	}
}
