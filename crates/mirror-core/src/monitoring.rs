//! Background reconciliation of mirror transactions.
//!
//! When the confirmation budget of a mirror attempt runs out, the transaction
//! may still be mined later. The monitor keeps re-querying its receipt at a
//! fixed interval until it resolves or the monitoring window closes.

use alloy::primitives::B256;
use mirror_delivery::DeliveryService;
use mirror_types::{truncate_id, TransactionOutcome};
use std::time::Duration;
use tracing::instrument;

#[derive(Clone)]
pub struct ReconciliationMonitor {
	delivery: DeliveryService,
	poll_interval: Duration,
	timeout: Duration,
}

impl ReconciliationMonitor {
	pub fn new(delivery: DeliveryService, poll_interval: Duration, timeout: Duration) -> Self {
		Self {
			delivery,
			poll_interval,
			timeout,
		}
	}

	pub fn is_enabled(&self) -> bool {
		!self.timeout.is_zero()
	}

	/// Polls `tx_hash` until it has a terminal outcome.
	///
	/// Returns `None` when the monitoring window closes first.
	#[instrument(skip_all, fields(tx_hash = %truncate_id(&tx_hash.to_string())))]
	pub async fn watch(&self, tx_hash: B256) -> Option<TransactionOutcome> {
		let start_time = tokio::time::Instant::now();

		loop {
			if start_time.elapsed() >= self.timeout {
				tracing::warn!(
					timeout_secs = self.timeout.as_secs(),
					"Transaction monitoring timeout reached"
				);
				return None;
			}

			match self.delivery.check_outcome(tx_hash).await {
				Ok(outcome) if outcome.is_terminal() => return Some(outcome),
				Ok(_) => {
					tracing::debug!(
						elapsed_secs = start_time.elapsed().as_secs(),
						"Waiting for transaction to be mined"
					);
				},
				Err(e) => {
					tracing::info!(error = %e, "Checking transaction status");
				},
			}

			tokio::time::sleep(self.poll_interval).await;
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::tests::{dev_connection, dev_delivery, funded_node};
	use mirror_delivery::marker_request;
	use mirror_delivery::FeePolicy;
	use mirror_types::U256;

	async fn submit_unmined() -> (ReconciliationMonitor, std::sync::Arc<mirror_rpc::testing::MockNode>, B256) {
		let (connection, node) = dev_connection(funded_node()).await;
		let delivery = dev_delivery(connection);
		node.set_automine(false).await;
		let handle = delivery
			.deliver(marker_request(
				crate::tests::dev_address(),
				"order:1:1:1",
				U256::ZERO,
				FeePolicy::Legacy { gas_price: None },
			))
			.await
			.unwrap();
		let monitor = ReconciliationMonitor::new(
			delivery,
			Duration::from_millis(100),
			Duration::from_secs(5),
		);
		(monitor, node, handle.tx_hash)
	}

	#[tokio::test(start_paused = true)]
	async fn test_watch_resolves_once_mined() {
		let (monitor, node, tx_hash) = submit_unmined().await;

		let watcher = tokio::spawn({
			let monitor = monitor.clone();
			async move { monitor.watch(tx_hash).await }
		});
		tokio::time::sleep(Duration::from_millis(350)).await;
		node.mine_pending().await;

		let outcome = watcher.await.unwrap();
		assert!(matches!(
			outcome,
			Some(TransactionOutcome::Confirmed { tx_hash: hash, .. }) if hash == tx_hash
		));
	}

	#[tokio::test(start_paused = true)]
	async fn test_watch_gives_up_after_window() {
		let (monitor, _node, tx_hash) = submit_unmined().await;
		assert_eq!(monitor.watch(tx_hash).await, None);
	}

	#[tokio::test]
	async fn test_zero_window_disables_monitor() {
		let (connection, _node) = dev_connection(funded_node()).await;
		let monitor = ReconciliationMonitor::new(
			dev_delivery(connection),
			Duration::from_millis(100),
			Duration::ZERO,
		);
		assert!(!monitor.is_enabled());
	}
}
