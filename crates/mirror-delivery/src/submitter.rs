//! Broadcast of signed transactions.

use crate::builder::SignedTransaction;
use crate::PendingHandle;
use mirror_rpc::{Connection, RpcError};
use mirror_types::truncate_id;
use thiserror::Error;

/// Errors raised by `eth_sendRawTransaction`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubmitError {
	/// The node rejected the transaction for a reason not classified below.
	#[error("Broadcast rejected: {0}")]
	Broadcast(String),
	/// The sender cannot pay for gas and value.
	#[error("Insufficient funds: {0}")]
	InsufficientFunds(String),
	/// The nonce is already used or a transaction with it is in the pool.
	#[error("Nonce too low: {0}")]
	NonceTooLow(String),
	/// The request never reached the node or got no answer.
	#[error("Connection error: {0}")]
	Connection(String),
}

impl From<RpcError> for SubmitError {
	fn from(err: RpcError) -> Self {
		match err {
			RpcError::Node { message, .. } => {
				let lower = message.to_ascii_lowercase();
				if lower.contains("insufficient funds") || lower.contains("enough funds") {
					SubmitError::InsufficientFunds(message)
				} else if lower.contains("nonce too low")
					|| lower.contains("already known")
					|| lower.contains("replacement transaction underpriced")
					|| lower.contains("nonce has already been used")
				{
					SubmitError::NonceTooLow(message)
				} else {
					SubmitError::Broadcast(message)
				}
			},
			other => SubmitError::Connection(other.to_string()),
		}
	}
}

/// Sends `signed` to the node.
///
/// Takes ownership so a signed transaction is submitted at most once. No
/// retries: a rejected transaction is reported as is.
pub async fn submit(
	signed: SignedTransaction,
	connection: &Connection,
) -> Result<PendingHandle, SubmitError> {
	let reported = connection.rpc().send_raw_transaction(&signed.raw).await?;
	if reported != signed.hash {
		tracing::warn!(
			expected = %truncate_id(&signed.hash.to_string()),
			reported = %truncate_id(&reported.to_string()),
			"Node reported a different transaction hash"
		);
	}

	tracing::info!(
		tx_hash = %truncate_id(&signed.hash.to_string()),
		from = %signed.from,
		nonce = signed.nonce,
		"Submitted transaction"
	);

	Ok(PendingHandle {
		tx_hash: signed.hash,
		from: signed.from,
		nonce: signed.nonce,
		submitted_at: chrono::Utc::now(),
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	fn node_error(message: &str) -> RpcError {
		RpcError::Node {
			code: -32000,
			message: message.to_string(),
		}
	}

	#[test]
	fn test_classifies_node_messages() {
		assert!(matches!(
			SubmitError::from(node_error("insufficient funds for gas * price + value")),
			SubmitError::InsufficientFunds(_)
		));
		assert!(matches!(
			SubmitError::from(node_error("nonce too low: next nonce 4, tx nonce 3")),
			SubmitError::NonceTooLow(_)
		));
		assert!(matches!(
			SubmitError::from(node_error("already known")),
			SubmitError::NonceTooLow(_)
		));
		assert!(matches!(
			SubmitError::from(node_error("replacement transaction underpriced")),
			SubmitError::NonceTooLow(_)
		));
		assert!(matches!(
			SubmitError::from(node_error("intrinsic gas too low")),
			SubmitError::Broadcast(_)
		));
		assert!(matches!(
			SubmitError::from(RpcError::Transport("connection refused".into())),
			SubmitError::Connection(_)
		));
	}
}
