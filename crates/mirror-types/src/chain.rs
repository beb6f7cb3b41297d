//! Read-only views of the node: blocks, their transactions and accounts.

use crate::delivery::ChainReceipt;
use alloy::primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};

/// A transaction as listed in a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainTransaction {
	pub hash: B256,
	pub from: Address,
	/// `None` for contract creations.
	pub to: Option<Address>,
	pub value: U256,
	pub gas_limit: u64,
	pub gas_price: u128,
}

/// A block with its full transactions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockSummary {
	pub number: u64,
	pub timestamp: u64,
	pub transactions: Vec<ChainTransaction>,
}

/// Execution status of a listed transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
	Success,
	Failed,
	/// No receipt was available when the block was read.
	Unknown,
}

/// One row of the recent transactions view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionSummary {
	pub block_number: u64,
	pub timestamp: u64,
	pub hash: B256,
	pub from: Address,
	pub to: Option<Address>,
	pub value: U256,
	pub value_eth: String,
	pub gas_used: Option<u64>,
	pub gas_price: u128,
	pub status: TransactionStatus,
}

impl TransactionSummary {
	/// Combines a listed transaction with its receipt, when one was found.
	pub fn new(
		block: &BlockSummary,
		tx: &ChainTransaction,
		receipt: Option<&ChainReceipt>,
	) -> Self {
		let status = match receipt {
			Some(receipt) if receipt.success => TransactionStatus::Success,
			Some(_) => TransactionStatus::Failed,
			None => TransactionStatus::Unknown,
		};
		Self {
			block_number: block.number,
			timestamp: block.timestamp,
			hash: tx.hash,
			from: tx.from,
			to: tx.to,
			value: tx.value,
			value_eth: crate::format_wei(tx.value),
			gas_used: receipt.map(|receipt| receipt.gas_used),
			gas_price: tx.gas_price,
			status,
		}
	}
}

/// An account the node manages, with its balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeAccount {
	pub index: usize,
	pub address: Address,
	pub balance: U256,
	pub balance_eth: String,
}

#[cfg(test)]
mod tests {
	use super::*;

	fn block() -> BlockSummary {
		BlockSummary {
			number: 4,
			timestamp: 1_700_000_008,
			transactions: vec![ChainTransaction {
				hash: B256::repeat_byte(0x01),
				from: Address::repeat_byte(0x02),
				to: None,
				value: U256::from(10u64).pow(U256::from(18u64)),
				gas_limit: 90_000,
				gas_price: 2_000_000_000,
			}],
		}
	}

	#[test]
	fn test_summary_status_follows_receipt() {
		let block = block();
		let tx = &block.transactions[0];

		let unknown = TransactionSummary::new(&block, tx, None);
		assert_eq!(unknown.status, TransactionStatus::Unknown);
		assert_eq!(unknown.gas_used, None);
		assert_eq!(unknown.value_eth, "1.000000000000000000");

		let reverted = ChainReceipt {
			tx_hash: tx.hash,
			block_number: 4,
			gas_used: 81_000,
			success: false,
			logs: vec![],
		};
		let failed = TransactionSummary::new(&block, tx, Some(&reverted));
		assert_eq!(failed.status, TransactionStatus::Failed);
		assert_eq!(failed.gas_used, Some(81_000));
	}
}
