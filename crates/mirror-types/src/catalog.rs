//! Catalog rows and their mirror bookkeeping.
//!
//! The catalog is the primary record of products and orders. Every row
//! carries a [`MirrorInfo`] describing how far its on-chain mirror got. A row
//! without a transaction hash is simply not mirrored (yet); that is a normal
//! state, not an error.

use crate::delivery::TransactionOutcome;
use alloy::primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of the on-chain mirror of one catalog entity.
///
/// `Unmirrored -> Submitting -> {Mirrored | MirrorFailed}`. A failed mirror is
/// only resubmitted through an explicit retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MirrorState {
	#[default]
	Unmirrored,
	Submitting,
	Mirrored,
	MirrorFailed,
}

impl fmt::Display for MirrorState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			MirrorState::Unmirrored => "unmirrored",
			MirrorState::Submitting => "submitting",
			MirrorState::Mirrored => "mirrored",
			MirrorState::MirrorFailed => "mirror_failed",
		};
		f.write_str(s)
	}
}

/// Mirror bookkeeping stored alongside a catalog row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct MirrorInfo {
	pub state: MirrorState,
	/// Hash of the last submitted mirror transaction.
	pub tx_hash: Option<B256>,
	/// Id assigned by the registry contract, learned from the receipt logs.
	pub chain_entity_id: Option<u64>,
	/// Last known outcome of `tx_hash`.
	pub outcome: Option<TransactionOutcome>,
	/// Reason of the last failed attempt.
	pub last_error: Option<String>,
	/// Number of submission attempts so far.
	pub attempts: u32,
	/// Unix seconds at which `tx_hash` was accepted by the node.
	#[serde(default)]
	pub submitted_at: Option<u64>,
}

impl MirrorInfo {
	/// Returns true once a transaction hash has been recorded.
	pub fn is_on_chain(&self) -> bool {
		self.tx_hash.is_some()
	}
}

/// Input for registering a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProduct {
	pub name: String,
	#[serde(default)]
	pub description: String,
	/// Unit price in the chain's smallest currency unit.
	pub price: U256,
	pub stock: u64,
	/// Whether to mirror the product on chain.
	#[serde(default = "default_mirror")]
	pub mirror: bool,
}

fn default_mirror() -> bool {
	true
}

/// A product row in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRow {
	pub id: u64,
	pub name: String,
	pub description: String,
	pub price: U256,
	pub stock: u64,
	pub active: bool,
	pub created_at: u64,
	pub updated_at: u64,
	pub mirror: MirrorInfo,
}

/// Business status of an order, independent of its mirror state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
	Pending,
	Confirmed,
	Completed,
	Cancelled,
}

/// An order row in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRow {
	pub id: u64,
	pub product_id: u64,
	pub buyer: Address,
	pub quantity: u64,
	pub total_paid: U256,
	pub status: OrderStatus,
	pub created_at: u64,
	pub updated_at: u64,
	pub mirror: MirrorInfo,
}

/// Catalog totals and mirror coverage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardStats {
	pub total_products: u64,
	pub total_orders: u64,
	pub mirrored_products: u64,
	pub mirrored_orders: u64,
	/// Products and orders whose last mirror attempt failed.
	pub failed_mirrors: u64,
	/// Sum of `total_paid` over every order.
	pub total_sales: U256,
	/// Registry counters, when a registry is configured and readable.
	pub chain_products: Option<u64>,
	pub chain_purchases: Option<u64>,
	pub block_height: Option<u64>,
	/// Newest orders first.
	pub recent_orders: Vec<OrderRow>,
}

/// Result of a catalog operation that may have been mirrored.
///
/// The catalog write always succeeded when a `MirrorResult` exists; `state`
/// and `error` describe the mirror attempt only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorResult<T> {
	pub entity: T,
	pub state: MirrorState,
	pub tx_hash: Option<B256>,
	pub outcome: Option<TransactionOutcome>,
	pub error: Option<String>,
}

impl<T> MirrorResult<T> {
	/// Builds a result from an entity and its mirror bookkeeping.
	pub fn from_info(entity: T, info: &MirrorInfo) -> Self {
		Self {
			entity,
			state: info.state,
			tx_hash: info.tx_hash,
			outcome: info.outcome.clone(),
			error: info.last_error.clone(),
		}
	}

	/// Returns true when a retry could be requested.
	pub fn retry_available(&self) -> bool {
		self.state == MirrorState::MirrorFailed
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_new_product_defaults_to_mirroring() {
		let input: NewProduct =
			serde_json::from_str(r#"{"name":"Widget","price":"0x64","stock":10}"#).unwrap();
		assert!(input.mirror);
		assert_eq!(input.price, U256::from(100u64));
		assert!(input.description.is_empty());
	}

	#[test]
	fn test_missing_hash_means_not_mirrored() {
		let info = MirrorInfo::default();
		assert_eq!(info.state, MirrorState::Unmirrored);
		assert!(!info.is_on_chain());
	}

	#[test]
	fn test_mirror_result_retry_flag() {
		let info = MirrorInfo {
			state: MirrorState::MirrorFailed,
			last_error: Some("insufficient funds".into()),
			..Default::default()
		};
		let result = MirrorResult::from_info(7u64, &info);
		assert!(result.retry_available());
		assert_eq!(result.error.as_deref(), Some("insufficient funds"));
		assert_eq!(result.tx_hash, None);
	}
}
