//! Per-signer serialization of the nonce-to-submit section.

use alloy::primitives::Address;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// One async mutex per signer address.
///
/// Holding a signer's guard across nonce fetch, signing and submission keeps
/// two concurrent requests from reading the same pending nonce. Different
/// signers never contend.
#[derive(Debug, Default)]
pub struct SignerLocks {
	locks: DashMap<Address, Arc<Mutex<()>>>,
}

impl SignerLocks {
	pub fn new() -> Self {
		Self::default()
	}

	/// Waits for and returns the guard of `signer`.
	pub async fn acquire(&self, signer: Address) -> OwnedMutexGuard<()> {
		let lock = self.locks.entry(signer).or_default().clone();
		lock.lock_owned().await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::time::Duration;

	#[tokio::test]
	async fn test_same_signer_is_serialized() {
		let locks = Arc::new(SignerLocks::new());
		let signer = Address::repeat_byte(0x01);

		let guard = locks.acquire(signer).await;
		let waiter = {
			let locks = locks.clone();
			tokio::spawn(async move {
				let _guard = locks.acquire(signer).await;
			})
		};

		tokio::time::sleep(Duration::from_millis(20)).await;
		assert!(!waiter.is_finished());
		drop(guard);
		waiter.await.unwrap();
	}

	#[tokio::test]
	async fn test_distinct_signers_do_not_contend() {
		let locks = SignerLocks::new();
		let _first = locks.acquire(Address::repeat_byte(0x01)).await;
		let second = tokio::time::timeout(
			Duration::from_millis(50),
			locks.acquire(Address::repeat_byte(0x02)),
		)
		.await;
		assert!(second.is_ok());
	}
}
