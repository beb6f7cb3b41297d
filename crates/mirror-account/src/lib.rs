//! Signer account for mirror transactions.
//!
//! An account knows its address and can sign a 32-byte digest. How the key
//! is obtained is up to the implementation; the local implementation reads
//! it from its `KeyHandle` for each signature and drops it afterwards.

use alloy::primitives::{Address, Signature, B256};
use async_trait::async_trait;
use mirror_types::KeyHandle;
use std::sync::Arc;
use thiserror::Error;

pub mod implementations {
	pub mod local;
}

pub use implementations::local::LocalAccount;

/// Errors that can occur during account operations.
///
/// Messages never contain key material.
#[derive(Debug, Error)]
pub enum AccountError {
	/// The key could not be read from where the handle points.
	#[error("Key unavailable: {0}")]
	KeyUnavailable(String),
	/// The key was read but is not a valid secp256k1 private key.
	#[error("Invalid key: {0}")]
	InvalidKey(String),
	/// The key does not control the configured signer address.
	#[error("Key does not control configured signer {configured}")]
	AddressMismatch { configured: Address },
	/// The signature operation itself failed.
	#[error("Signing failed: {0}")]
	SigningFailed(String),
}

/// Interface for account implementations.
#[async_trait]
pub trait AccountInterface: Send + Sync {
	/// Address transactions signed by this account originate from.
	async fn address(&self) -> Result<Address, AccountError>;

	/// Signs a 32-byte digest.
	async fn sign_hash(&self, hash: &B256) -> Result<Signature, AccountError>;
}

/// Builds the account for a configured signer.
pub fn create_account(address: Address, key: KeyHandle) -> Box<dyn AccountInterface> {
	Box::new(LocalAccount::new(address, key))
}

/// Shared handle to the signer account.
#[derive(Clone)]
pub struct AccountService {
	implementation: Arc<dyn AccountInterface>,
}

impl AccountService {
	pub fn new(implementation: Box<dyn AccountInterface>) -> Self {
		Self {
			implementation: Arc::from(implementation),
		}
	}

	pub async fn get_address(&self) -> Result<Address, AccountError> {
		self.implementation.address().await
	}

	pub async fn sign_hash(&self, hash: &B256) -> Result<Signature, AccountError> {
		self.implementation.sign_hash(hash).await
	}

	/// The underlying implementation, for code that takes `&dyn AccountInterface`.
	pub fn interface(&self) -> &dyn AccountInterface {
		self.implementation.as_ref()
	}
}
