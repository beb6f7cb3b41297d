//! Account backed by a locally held private key.

use crate::{AccountError, AccountInterface};
use alloy::primitives::{Address, Signature, B256};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;
use async_trait::async_trait;
use mirror_types::{KeyHandle, SecretString};
use zeroize::Zeroizing;

/// Signs with the key its `KeyHandle` points at.
///
/// The key is loaded for each signature and dropped when the signature is
/// produced, so no key material is held between calls.
#[derive(Debug, Clone)]
pub struct LocalAccount {
	address: Address,
	key: KeyHandle,
}

impl LocalAccount {
	pub fn new(address: Address, key: KeyHandle) -> Self {
		Self { address, key }
	}

	async fn read_secret(&self) -> Result<SecretString, AccountError> {
		let secret = match &self.key {
			KeyHandle::Env(name) => std::env::var(name).map(SecretString::new).map_err(|_| {
				AccountError::KeyUnavailable(format!("environment variable '{}' is not set", name))
			})?,
			KeyHandle::File(path) => tokio::fs::read_to_string(path)
				.await
				.map(SecretString::new)
				.map_err(|e| {
					AccountError::KeyUnavailable(format!(
						"cannot read key file {}: {}",
						path.display(),
						e.kind()
					))
				})?,
			KeyHandle::Inline(secret) => secret.clone(),
		};
		Ok(secret.trimmed())
	}

	async fn load_signer(&self) -> Result<PrivateKeySigner, AccountError> {
		let secret = self.read_secret().await?;
		let mut bytes = Zeroizing::new([0u8; 32]);
		secret.with_exposed(|key| {
			let key = key.strip_prefix("0x").unwrap_or(key);
			hex::decode_to_slice(key, bytes.as_mut_slice())
				.map_err(|_| AccountError::InvalidKey("expected 32 bytes of hex".into()))
		})?;

		let signer = PrivateKeySigner::from_slice(bytes.as_slice())
			.map_err(|_| AccountError::InvalidKey("not a valid secp256k1 scalar".into()))?;
		if signer.address() != self.address {
			return Err(AccountError::AddressMismatch {
				configured: self.address,
			});
		}
		Ok(signer)
	}
}

#[async_trait]
impl AccountInterface for LocalAccount {
	async fn address(&self) -> Result<Address, AccountError> {
		Ok(self.address)
	}

	async fn sign_hash(&self, hash: &B256) -> Result<Signature, AccountError> {
		let signer = self.load_signer().await?;
		let signature = signer
			.sign_hash_sync(hash)
			.map_err(|e| AccountError::SigningFailed(e.to_string()))?;
		tracing::debug!(signer = %self.address, "Signed digest");
		Ok(signature)
	}
}
