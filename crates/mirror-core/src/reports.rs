//! Read-only summaries for operators: catalog dashboard, recent chain
//! activity and the accounts the node manages.

use crate::{FacadeError, MirrorFacade};
use alloy::primitives::U256;
use mirror_types::{
	format_wei, DashboardStats, MirrorState, NodeAccount, OrderRow, TransactionSummary,
};

/// Orders shown on the dashboard.
const RECENT_ORDERS: usize = 10;
/// Blocks scanned when the caller does not say.
pub const DEFAULT_SCANNED_BLOCKS: u64 = 5;
/// Upper bound on blocks scanned per request.
pub const MAX_SCANNED_BLOCKS: u64 = 50;
/// Upper bound on transactions listed per request.
pub const MAX_LISTED_TRANSACTIONS: usize = 20;
/// Node accounts listed.
const LISTED_ACCOUNTS: usize = 5;

impl MirrorFacade {
	/// Catalog totals, mirror coverage and, when reachable, registry counters.
	///
	/// Chain figures are best effort: an unreachable node leaves them `None`
	/// rather than failing the whole summary.
	pub async fn dashboard(&self) -> Result<DashboardStats, FacadeError> {
		let products = self.catalog.list_products().await?;
		let mut orders = self.catalog.list_orders().await?;

		let mirrored_products = products
			.iter()
			.filter(|product| product.mirror.state == MirrorState::Mirrored)
			.count() as u64;
		let mirrored_orders = orders
			.iter()
			.filter(|order| order.mirror.state == MirrorState::Mirrored)
			.count() as u64;
		let failed_mirrors = products
			.iter()
			.map(|product| &product.mirror)
			.chain(orders.iter().map(|order| &order.mirror))
			.filter(|mirror| mirror.state == MirrorState::MirrorFailed)
			.count() as u64;
		let total_sales = orders
			.iter()
			.fold(U256::ZERO, |total, order| total.saturating_add(order.total_paid));

		let (chain_products, chain_purchases) = if self.reader.contract().is_some() {
			(
				self.reader
					.product_count()
					.await
					.inspect_err(|e| tracing::warn!(error = %e, "Failed to read product count"))
					.ok(),
				self.reader
					.purchase_count()
					.await
					.inspect_err(|e| tracing::warn!(error = %e, "Failed to read purchase count"))
					.ok(),
			)
		} else {
			(None, None)
		};
		let block_height = self.delivery.connection().current_block_height().await.ok();

		let total_orders = orders.len() as u64;
		newest_first(&mut orders, RECENT_ORDERS);

		Ok(DashboardStats {
			total_products: products.len() as u64,
			total_orders,
			mirrored_products,
			mirrored_orders,
			failed_mirrors,
			total_sales,
			chain_products,
			chain_purchases,
			block_height,
			recent_orders: orders,
		})
	}

	/// Transactions of the latest `blocks` blocks, newest block first.
	///
	/// `blocks` defaults to [`DEFAULT_SCANNED_BLOCKS`] and is clamped to
	/// `1..=MAX_SCANNED_BLOCKS`. At most [`MAX_LISTED_TRANSACTIONS`] are
	/// returned. A block that cannot be read is skipped.
	pub async fn recent_transactions(
		&self,
		blocks: Option<u64>,
	) -> Result<Vec<TransactionSummary>, FacadeError> {
		let blocks = blocks
			.unwrap_or(DEFAULT_SCANNED_BLOCKS)
			.clamp(1, MAX_SCANNED_BLOCKS);
		let connection = self.delivery.connection();
		let latest = connection.current_block_height().await?;

		let mut listed = Vec::new();
		for number in (latest.saturating_sub(blocks - 1)..=latest).rev() {
			let block = match connection.rpc().block_transactions(number).await {
				Ok(Some(block)) => block,
				Ok(None) => continue,
				Err(e) => {
					tracing::warn!(block = number, error = %e, "Failed to read block");
					continue;
				},
			};
			for tx in &block.transactions {
				if listed.len() >= MAX_LISTED_TRANSACTIONS {
					return Ok(listed);
				}
				let receipt = connection
					.rpc()
					.transaction_receipt(tx.hash)
					.await
					.ok()
					.flatten();
				listed.push(TransactionSummary::new(&block, tx, receipt.as_ref()));
			}
		}
		Ok(listed)
	}

	/// The first accounts the node manages, with their balances.
	pub async fn node_accounts(&self) -> Result<Vec<NodeAccount>, FacadeError> {
		let rpc = self.delivery.connection().rpc();
		let addresses = rpc.accounts().await?;

		let mut accounts = Vec::with_capacity(addresses.len().min(LISTED_ACCOUNTS));
		for (index, address) in addresses.into_iter().take(LISTED_ACCOUNTS).enumerate() {
			let balance = rpc.balance(address).await?;
			accounts.push(NodeAccount {
				index,
				address,
				balance,
				balance_eth: format_wei(balance),
			});
		}
		Ok(accounts)
	}
}

fn newest_first(orders: &mut Vec<OrderRow>, limit: usize) {
	orders.sort_by(|a, b| b.id.cmp(&a.id));
	orders.truncate(limit);
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::tests::{dev_address, funded_node, DEV_KEY};
	use crate::MirrorBuilder;
	use alloy::primitives::Address;
	use mirror_config::builders::ConfigBuilder;
	use mirror_rpc::testing::MockNode;
	use mirror_types::{KeyHandle, NewProduct, TransactionStatus};
	use std::sync::Arc;

	const REGISTRY: Address = Address::new([0xAB; 20]);

	async fn facade(node: MockNode, contract: Option<Address>) -> (MirrorFacade, Arc<MockNode>) {
		let node = Arc::new(node);
		let config = ConfigBuilder::new()
			.chain_id(1337)
			.signer(dev_address(), KeyHandle::Inline(DEV_KEY.into()))
			.contract_address(contract)
			.build();
		let facade = MirrorBuilder::new(config)
			.build_with_rpc(node.clone())
			.await
			.unwrap();
		(facade, node)
	}

	fn product(name: &str, mirror: bool) -> NewProduct {
		NewProduct {
			name: name.into(),
			description: String::new(),
			price: U256::from(100u64),
			stock: 10,
			mirror,
		}
	}

	#[tokio::test]
	async fn test_dashboard_counts_catalog_and_registry() {
		let (facade, _node) = facade(funded_node().with_registry(REGISTRY), Some(REGISTRY)).await;
		let mirrored = facade.register_product(product("Widget", true)).await.unwrap();
		facade.register_product(product("Gadget", false)).await.unwrap();
		facade
			.purchase_product(mirrored.entity.id, 3, Address::repeat_byte(0x22))
			.await
			.unwrap();
		facade
			.purchase_product(mirrored.entity.id, 1, Address::repeat_byte(0x23))
			.await
			.unwrap();

		let stats = facade.dashboard().await.unwrap();
		assert_eq!(stats.total_products, 2);
		assert_eq!(stats.mirrored_products, 1);
		assert_eq!(stats.total_orders, 2);
		assert_eq!(stats.mirrored_orders, 2);
		assert_eq!(stats.failed_mirrors, 0);
		assert_eq!(stats.total_sales, U256::from(400u64));
		assert_eq!(stats.chain_products, Some(1));
		assert_eq!(stats.chain_purchases, Some(2));
		assert_eq!(stats.block_height, Some(3));
		let ids: Vec<u64> = stats.recent_orders.iter().map(|order| order.id).collect();
		assert_eq!(ids, vec![2, 1]);
	}

	#[tokio::test]
	async fn test_dashboard_survives_offline_node() {
		let (facade, node) = facade(funded_node().with_registry(REGISTRY), Some(REGISTRY)).await;
		facade.register_product(product("Widget", true)).await.unwrap();
		node.set_offline(true).await;
		facade.register_product(product("Gadget", true)).await.unwrap();

		let stats = facade.dashboard().await.unwrap();
		assert_eq!(stats.total_products, 2);
		assert_eq!(stats.mirrored_products, 1);
		assert_eq!(stats.failed_mirrors, 1);
		assert_eq!(stats.chain_products, None);
		assert_eq!(stats.block_height, None);
	}

	#[tokio::test]
	async fn test_recent_transactions_newest_first() {
		let (facade, node) = facade(funded_node(), None).await;
		for i in 0..3 {
			facade
				.register_product(product(&format!("Widget {}", i), true))
				.await
				.unwrap();
		}
		node.revert_next_transaction().await;
		facade.register_product(product("Reverted", true)).await.unwrap();

		let listed = facade.recent_transactions(Some(2)).await.unwrap();
		let blocks: Vec<u64> = listed.iter().map(|tx| tx.block_number).collect();
		assert_eq!(blocks, vec![4, 3]);
		assert_eq!(listed[0].status, TransactionStatus::Failed);
		assert_eq!(listed[1].status, TransactionStatus::Success);
		assert_eq!(listed[1].from, dev_address());
		assert_eq!(listed[1].to, Some(dev_address()));
		assert!(listed[1].gas_used.is_some());

		let all = facade.recent_transactions(None).await.unwrap();
		assert_eq!(all.len(), 4);
	}

	#[tokio::test]
	async fn test_recent_transactions_are_capped() {
		let (facade, _node) = facade(funded_node(), None).await;
		for i in 0..(MAX_LISTED_TRANSACTIONS + 2) {
			facade
				.register_product(product(&format!("Widget {}", i), true))
				.await
				.unwrap();
		}

		let listed = facade.recent_transactions(Some(1_000)).await.unwrap();
		assert_eq!(listed.len(), MAX_LISTED_TRANSACTIONS);
		assert_eq!(listed[0].block_number, MAX_LISTED_TRANSACTIONS as u64 + 2);
	}

	#[tokio::test]
	async fn test_recent_transactions_on_fresh_chain() {
		let (facade, _node) = facade(funded_node(), None).await;
		assert!(facade.recent_transactions(Some(0)).await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn test_node_accounts_lists_first_five() {
		let mut node = funded_node();
		for byte in 1..=6u8 {
			node = node.with_balance(Address::repeat_byte(byte), U256::from(byte));
		}
		let (facade, _node) = facade(node, None).await;

		let accounts = facade.node_accounts().await.unwrap();
		assert_eq!(accounts.len(), 5);
		assert_eq!(accounts[0].index, 0);
		assert_eq!(accounts[0].address, dev_address());
		assert_eq!(accounts[0].balance, U256::from(10u128.pow(20)));
		assert_eq!(accounts[0].balance_eth, "100.000000000000000000");
		assert_eq!(accounts[4].address, Address::repeat_byte(4));
	}

	#[tokio::test]
	async fn test_node_accounts_reports_unreachable_node() {
		let (facade, node) = facade(funded_node(), None).await;
		node.set_offline(true).await;
		assert!(matches!(
			facade.node_accounts().await,
			Err(FacadeError::ChainUnavailable(_))
		));
	}
}
