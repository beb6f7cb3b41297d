//! Catalog storage for the mirroring service.
//!
//! A byte-oriented `StorageInterface` is implemented by each backend, and
//! `StorageService` layers namespaced, JSON-typed access on top of it.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

pub mod implementations {
	pub mod file;
	pub mod memory;
}

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
	/// Error that occurs when a requested item is not found.
	#[error("Not found")]
	NotFound,
	/// Error that occurs during serialization/deserialization.
	#[error("Serialization error: {0}")]
	Serialization(String),
	/// Error that occurs in the storage backend.
	#[error("Backend error: {0}")]
	Backend(String),
	/// Error that occurs when the backend configuration is invalid.
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Low-level interface for storage backends.
///
/// Basic key-value operations. Entries never expire: catalog rows and id
/// counters live until deleted.
#[async_trait]
pub trait StorageInterface: Send + Sync {
	/// Retrieves raw bytes for the given key.
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError>;

	/// Stores raw bytes, creating or overwriting the entry.
	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError>;

	/// Deletes the value associated with the given key.
	async fn delete(&self, key: &str) -> Result<(), StorageError>;

	/// Checks if a key exists in storage.
	async fn exists(&self, key: &str) -> Result<bool, StorageError>;
}

/// Signature of the function every backend provides to build itself from its
/// TOML table.
pub type StorageFactory = fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>;

/// Returns (name, factory) pairs for every available backend.
pub fn get_all_implementations() -> Vec<(&'static str, StorageFactory)> {
	use implementations::{file, memory};

	vec![
		(file::NAME, file::create_storage as StorageFactory),
		(memory::NAME, memory::create_storage as StorageFactory),
	]
}

/// Builds the backend registered under `name`.
pub fn create_backend(
	name: &str,
	config: &toml::Value,
) -> Result<Box<dyn StorageInterface>, StorageError> {
	get_all_implementations()
		.into_iter()
		.find(|(candidate, _)| *candidate == name)
		.map(|(_, factory)| factory(config))
		.unwrap_or_else(|| {
			Err(StorageError::Configuration(format!(
				"Unknown storage implementation '{}'",
				name
			)))
		})
}

/// Typed storage on top of a backend.
///
/// Namespace and id are joined as `namespace:id`; values are JSON.
pub struct StorageService {
	backend: Box<dyn StorageInterface>,
}

impl StorageService {
	pub fn new(backend: Box<dyn StorageInterface>) -> Self {
		Self { backend }
	}

	fn key(namespace: &str, id: &str) -> String {
		format!("{}:{}", namespace, id)
	}

	/// Stores a serializable value, creating or overwriting it.
	pub async fn store<T: Serialize>(
		&self,
		namespace: &str,
		id: &str,
		data: &T,
	) -> Result<(), StorageError> {
		let bytes =
			serde_json::to_vec(data).map_err(|e| StorageError::Serialization(e.to_string()))?;
		self.backend.set_bytes(&Self::key(namespace, id), bytes).await
	}

	/// Retrieves and deserializes a value.
	pub async fn retrieve<T: DeserializeOwned>(
		&self,
		namespace: &str,
		id: &str,
	) -> Result<T, StorageError> {
		let bytes = self.backend.get_bytes(&Self::key(namespace, id)).await?;
		serde_json::from_slice(&bytes).map_err(|e| StorageError::Serialization(e.to_string()))
	}

	/// Like `retrieve`, but maps a missing value to `None`.
	pub async fn retrieve_optional<T: DeserializeOwned>(
		&self,
		namespace: &str,
		id: &str,
	) -> Result<Option<T>, StorageError> {
		match self.retrieve(namespace, id).await {
			Ok(value) => Ok(Some(value)),
			Err(StorageError::NotFound) => Ok(None),
			Err(e) => Err(e),
		}
	}

	pub async fn remove(&self, namespace: &str, id: &str) -> Result<(), StorageError> {
		self.backend.delete(&Self::key(namespace, id)).await
	}

	/// Overwrites an existing value. Fails with `NotFound` if it is absent,
	/// unlike `store`.
	pub async fn update<T: Serialize>(
		&self,
		namespace: &str,
		id: &str,
		data: &T,
	) -> Result<(), StorageError> {
		let key = Self::key(namespace, id);
		if !self.backend.exists(&key).await? {
			return Err(StorageError::NotFound);
		}

		let bytes =
			serde_json::to_vec(data).map_err(|e| StorageError::Serialization(e.to_string()))?;
		self.backend.set_bytes(&key, bytes).await
	}

	pub async fn exists(&self, namespace: &str, id: &str) -> Result<bool, StorageError> {
		self.backend.exists(&Self::key(namespace, id)).await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use implementations::memory::MemoryStorage;
	use serde::Deserialize;

	#[derive(Debug, PartialEq, Serialize, Deserialize)]
	struct Row {
		name: String,
		stock: u64,
	}

	fn service() -> StorageService {
		StorageService::new(Box::new(MemoryStorage::new()))
	}

	#[tokio::test]
	async fn test_typed_store_and_retrieve() {
		let storage = service();
		let row = Row {
			name: "Widget".into(),
			stock: 10,
		};

		storage.store("products", "1", &row).await.unwrap();
		let loaded: Row = storage.retrieve("products", "1").await.unwrap();
		assert_eq!(loaded, row);

		let missing: Option<Row> = storage.retrieve_optional("products", "2").await.unwrap();
		assert!(missing.is_none());
	}

	#[tokio::test]
	async fn test_update_requires_existing_value() {
		let storage = service();
		let row = Row {
			name: "Widget".into(),
			stock: 7,
		};

		let result = storage.update("products", "1", &row).await;
		assert!(matches!(result, Err(StorageError::NotFound)));

		storage.store("products", "1", &row).await.unwrap();
		assert!(storage.update("products", "1", &row).await.is_ok());
	}

	#[test]
	fn test_create_backend_by_name() {
		let empty = toml::Value::Table(toml::map::Map::new());
		assert!(create_backend("memory", &empty).is_ok());
		assert!(matches!(
			create_backend("postgres", &empty),
			Err(StorageError::Configuration(_))
		));
	}
}
