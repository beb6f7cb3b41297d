//! Transaction outcome and receipt types.
//!
//! These types describe what happened to a submitted transaction as far as
//! the mirroring client can tell. They are stored in catalog rows, so they
//! are serializable and carry no provider-specific data.

use alloy::primitives::{Log, B256};
use serde::{Deserialize, Serialize};

/// Normalized result of waiting on a submitted transaction.
///
/// `Confirmed` and `Failed` are terminal. `Pending` means the confirmation
/// budget ran out before a receipt was observed; a later poll of the same
/// hash may still resolve it either way.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TransactionOutcome {
	Confirmed {
		tx_hash: B256,
		block_number: u64,
		gas_used: u64,
	},
	Pending {
		tx_hash: B256,
	},
	Failed {
		reason: String,
		tx_hash: Option<B256>,
	},
}

impl TransactionOutcome {
	/// Returns true for `Confirmed` and `Failed`.
	pub fn is_terminal(&self) -> bool {
		!matches!(self, TransactionOutcome::Pending { .. })
	}

	pub fn is_confirmed(&self) -> bool {
		matches!(self, TransactionOutcome::Confirmed { .. })
	}

	/// The transaction hash the outcome refers to, if one exists.
	pub fn tx_hash(&self) -> Option<B256> {
		match self {
			TransactionOutcome::Confirmed { tx_hash, .. } => Some(*tx_hash),
			TransactionOutcome::Pending { tx_hash } => Some(*tx_hash),
			TransactionOutcome::Failed { tx_hash, .. } => *tx_hash,
		}
	}

	/// Maps a mined receipt onto an outcome using its status flag.
	pub fn from_receipt(receipt: &ChainReceipt) -> Self {
		if receipt.success {
			TransactionOutcome::Confirmed {
				tx_hash: receipt.tx_hash,
				block_number: receipt.block_number,
				gas_used: receipt.gas_used,
			}
		} else {
			TransactionOutcome::Failed {
				reason: "transaction reverted".to_string(),
				tx_hash: Some(receipt.tx_hash),
			}
		}
	}
}

/// Receipt of a mined transaction, reduced to the fields the client uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainReceipt {
	/// Hash of the transaction.
	pub tx_hash: B256,
	/// Block the transaction was included in.
	pub block_number: u64,
	/// Gas consumed by the transaction.
	pub gas_used: u64,
	/// Status flag; false when execution reverted.
	pub success: bool,
	/// Logs emitted during execution.
	pub logs: Vec<Log>,
}
