//! Bounded confirmation polling.
//!
//! Receipts are polled with exponentially growing delays until one shows up
//! or the time budget runs out. Running out of time is not an error: the
//! outcome is `Pending` and the hash can be re-checked later with
//! `check_outcome`.

use crate::PendingHandle;
use alloy::primitives::B256;
use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use mirror_config::ConfirmationConfig;
use mirror_rpc::{Connection, RpcError};
use mirror_types::{truncate_id, TransactionOutcome};
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::instrument;

/// Delay schedule between receipt polls.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollSchedule {
	pub initial_interval: Duration,
	pub max_interval: Duration,
	pub multiplier: f64,
}

impl Default for PollSchedule {
	fn default() -> Self {
		Self {
			initial_interval: Duration::from_millis(500),
			max_interval: Duration::from_secs(5),
			multiplier: 2.0,
		}
	}
}

impl From<&ConfirmationConfig> for PollSchedule {
	fn from(config: &ConfirmationConfig) -> Self {
		Self {
			initial_interval: config.initial_interval(),
			max_interval: config.max_interval(),
			multiplier: config.multiplier,
		}
	}
}

impl PollSchedule {
	fn backoff(&self) -> ExponentialBackoff {
		ExponentialBackoffBuilder::new()
			.with_initial_interval(self.initial_interval)
			.with_max_interval(self.max_interval)
			.with_multiplier(self.multiplier)
			.with_randomization_factor(0.0)
			.with_max_elapsed_time(None)
			.build()
	}
}

/// Polls for the receipt of `tx_hash` for at most `timeout`.
///
/// A zero timeout returns `Pending` without touching the node. RPC errors
/// while polling are logged and polling continues until the deadline.
#[instrument(skip_all, fields(tx_hash = %truncate_id(&tx_hash.to_string())))]
pub async fn await_confirmation(
	tx_hash: B256,
	connection: &Connection,
	timeout: Duration,
	schedule: PollSchedule,
) -> TransactionOutcome {
	if timeout.is_zero() {
		return TransactionOutcome::Pending { tx_hash };
	}

	let deadline = Instant::now() + timeout;
	let mut backoff = schedule.backoff();

	loop {
		let remaining = deadline.saturating_duration_since(Instant::now());
		match tokio::time::timeout(remaining, connection.rpc().transaction_receipt(tx_hash)).await {
			Ok(Ok(Some(receipt))) => {
				let outcome = TransactionOutcome::from_receipt(&receipt);
				tracing::info!(block = receipt.block_number, success = receipt.success, "Receipt observed");
				return outcome;
			},
			Ok(Ok(None)) => {},
			Ok(Err(e)) => tracing::warn!(error = %e, "Receipt poll failed"),
			Err(_) => {},
		}

		let remaining = deadline.saturating_duration_since(Instant::now());
		if remaining.is_zero() {
			tracing::debug!(timeout = ?timeout, "Confirmation budget exhausted");
			return TransactionOutcome::Pending { tx_hash };
		}
		let delay = backoff.next_backoff().unwrap_or(schedule.max_interval);
		tokio::time::sleep(delay.min(remaining)).await;
	}
}

/// Single receipt lookup; `Pending` when the transaction is not mined yet.
pub async fn check_outcome(
	tx_hash: B256,
	connection: &Connection,
) -> Result<TransactionOutcome, RpcError> {
	Ok(match connection.rpc().transaction_receipt(tx_hash).await? {
		Some(receipt) => TransactionOutcome::from_receipt(&receipt),
		None => TransactionOutcome::Pending { tx_hash },
	})
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfirmationError {
	/// The task was cancelled before it produced an outcome.
	#[error("Confirmation tracking cancelled")]
	Cancelled,
	#[error("Confirmation task failed: {0}")]
	Task(String),
}

/// Spawns confirmation polls on independent tasks.
#[derive(Debug, Clone)]
pub struct ConfirmationTracker {
	connection: Connection,
	schedule: PollSchedule,
}

impl ConfirmationTracker {
	pub fn new(connection: Connection, schedule: PollSchedule) -> Self {
		Self {
			connection,
			schedule,
		}
	}

	/// Starts polling for `handle` in the background.
	pub fn spawn(&self, handle: &PendingHandle, timeout: Duration) -> ConfirmationTask {
		let connection = self.connection.clone();
		let schedule = self.schedule;
		let tx_hash = handle.tx_hash;
		let join = tokio::spawn(async move {
			await_confirmation(tx_hash, &connection, timeout, schedule).await
		});
		ConfirmationTask { tx_hash, join }
	}
}

/// A running confirmation poll.
#[derive(Debug)]
pub struct ConfirmationTask {
	tx_hash: B256,
	join: JoinHandle<TransactionOutcome>,
}

impl ConfirmationTask {
	pub fn tx_hash(&self) -> B256 {
		self.tx_hash
	}

	/// Stops polling. The transaction itself stays submitted.
	pub fn cancel(&self) {
		self.join.abort();
	}

	pub fn is_finished(&self) -> bool {
		self.join.is_finished()
	}

	/// Waits for the poll to finish.
	pub async fn outcome(self) -> Result<TransactionOutcome, ConfirmationError> {
		match self.join.await {
			Ok(outcome) => Ok(outcome),
			Err(e) if e.is_cancelled() => Err(ConfirmationError::Cancelled),
			Err(e) => Err(ConfirmationError::Task(e.to_string())),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::tests::{dev_connection, funded_node};

	#[tokio::test]
	async fn test_zero_timeout_returns_pending_without_rpc() {
		let (connection, node) = dev_connection(funded_node()).await;
		node.set_offline(true).await;
		let tx_hash = B256::repeat_byte(0x01);

		let outcome =
			await_confirmation(tx_hash, &connection, Duration::ZERO, PollSchedule::default())
				.await;
		assert_eq!(outcome, TransactionOutcome::Pending { tx_hash });
	}

	#[tokio::test(start_paused = true)]
	async fn test_unknown_hash_times_out_as_pending() {
		let (connection, _node) = dev_connection(funded_node()).await;
		let tx_hash = B256::repeat_byte(0x02);

		let started = Instant::now();
		let outcome = await_confirmation(
			tx_hash,
			&connection,
			Duration::from_secs(3),
			PollSchedule::default(),
		)
		.await;
		assert_eq!(outcome, TransactionOutcome::Pending { tx_hash });
		assert!(started.elapsed() >= Duration::from_secs(3));
		assert!(started.elapsed() < Duration::from_secs(4));
	}

	#[tokio::test(start_paused = true)]
	async fn test_rpc_errors_do_not_end_polling_early() {
		let (connection, node) = dev_connection(funded_node()).await;
		node.set_offline(true).await;
		let tx_hash = B256::repeat_byte(0x03);

		let started = Instant::now();
		let outcome = await_confirmation(
			tx_hash,
			&connection,
			Duration::from_secs(2),
			PollSchedule::default(),
		)
		.await;
		assert_eq!(outcome, TransactionOutcome::Pending { tx_hash });
		assert!(started.elapsed() >= Duration::from_secs(2));
	}

	#[tokio::test]
	async fn test_check_outcome_of_unknown_hash() {
		let (connection, _node) = dev_connection(funded_node()).await;
		let tx_hash = B256::repeat_byte(0x04);
		assert_eq!(
			check_outcome(tx_hash, &connection).await.unwrap(),
			TransactionOutcome::Pending { tx_hash }
		);
	}

	#[tokio::test(start_paused = true)]
	async fn test_cancelled_task_reports_cancelled() {
		let (connection, _node) = dev_connection(funded_node()).await;
		let tracker = ConfirmationTracker::new(connection, PollSchedule::default());
		let handle = PendingHandle {
			tx_hash: B256::repeat_byte(0x05),
			from: crate::tests::dev_address(),
			nonce: 0,
			submitted_at: chrono::Utc::now(),
		};

		let task = tracker.spawn(&handle, Duration::from_secs(60));
		task.cancel();
		assert_eq!(task.outcome().await, Err(ConfirmationError::Cancelled));
	}
}
