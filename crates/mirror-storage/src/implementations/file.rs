//! File-based storage backend.
//!
//! Each key is one file under the configured directory. Files start with a
//! fixed header identifying the record format, and writes go through a
//! temporary file that is renamed into place.

use crate::{StorageError, StorageInterface};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;

pub const NAME: &str = "file";

const DEFAULT_STORAGE_PATH: &str = "./data/catalog";

/// Fixed-size record header.
///
/// Layout (32 bytes): magic `MIRS`, version as little-endian u16, then zero
/// padding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RecordHeader {
	version: u16,
}

impl RecordHeader {
	const MAGIC: &'static [u8; 4] = b"MIRS";
	const VERSION: u16 = 2;
	const SIZE: usize = 32;

	fn current() -> Self {
		Self {
			version: Self::VERSION,
		}
	}

	fn encode(&self) -> [u8; Self::SIZE] {
		let mut bytes = [0u8; Self::SIZE];
		bytes[0..4].copy_from_slice(Self::MAGIC);
		bytes[4..6].copy_from_slice(&self.version.to_le_bytes());
		bytes
	}

	fn decode(bytes: &[u8]) -> Result<Self, StorageError> {
		if bytes.len() < Self::SIZE || &bytes[0..4] != Self::MAGIC {
			return Err(StorageError::Backend("Missing record header".into()));
		}

		let version = u16::from_le_bytes([bytes[4], bytes[5]]);
		if version > Self::VERSION {
			return Err(StorageError::Backend(format!(
				"Unsupported record version: {}",
				version
			)));
		}
		Ok(Self { version })
	}
}

/// Stores each key as a binary file below `base_path`.
pub struct FileStorage {
	base_path: PathBuf,
}

impl FileStorage {
	pub fn new(base_path: PathBuf) -> Self {
		Self { base_path }
	}

	fn file_path(&self, key: &str) -> PathBuf {
		let safe_key = key.replace(['/', '\\', ':'], "_");
		self.base_path.join(format!("{}.bin", safe_key))
	}

	async fn read_record(path: &Path) -> Result<Vec<u8>, StorageError> {
		match fs::read(path).await {
			Ok(data) => Ok(data),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StorageError::NotFound),
			Err(e) => Err(StorageError::Backend(e.to_string())),
		}
	}
}

#[async_trait]
impl StorageInterface for FileStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		let data = Self::read_record(&self.file_path(key)).await?;
		RecordHeader::decode(&data)?;
		Ok(data[RecordHeader::SIZE..].to_vec())
	}

	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
		fs::create_dir_all(&self.base_path)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;

		let mut record = Vec::with_capacity(RecordHeader::SIZE + value.len());
		record.extend_from_slice(&RecordHeader::current().encode());
		record.extend_from_slice(&value);

		let path = self.file_path(key);
		let temp_path = path.with_extension("tmp");
		fs::write(&temp_path, record)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;
		fs::rename(&temp_path, &path)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		match fs::remove_file(self.file_path(key)).await {
			Ok(()) => Ok(()),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(StorageError::Backend(e.to_string())),
		}
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		match fs::try_exists(self.file_path(key)).await {
			Ok(exists) => Ok(exists),
			Err(e) => Err(StorageError::Backend(e.to_string())),
		}
	}
}

/// Builds a file backend.
///
/// Configuration parameters:
/// - `storage_path`: base directory (default: "./data/catalog")
///
/// Catalog rows and id counters must never expire, so `ttl_*` keys are
/// rejected instead of ignored.
pub fn create_storage(config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	if let Some(key) = config
		.as_table()
		.and_then(|table| table.keys().find(|key| key.starts_with("ttl_")))
	{
		return Err(StorageError::Configuration(format!(
			"{} is not supported: catalog records do not expire",
			key
		)));
	}

	let storage_path = match config.get("storage_path") {
		None => DEFAULT_STORAGE_PATH,
		Some(value) => value.as_str().ok_or_else(|| {
			StorageError::Configuration("storage_path must be a string".into())
		})?,
	};

	Ok(Box::new(FileStorage::new(PathBuf::from(storage_path))))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_write_read_delete() {
		let dir = tempfile::tempdir().unwrap();
		let storage = FileStorage::new(dir.path().to_path_buf());

		storage
			.set_bytes("products:1", b"{\"name\":\"Widget\"}".to_vec())
			.await
			.unwrap();
		assert_eq!(
			storage.get_bytes("products:1").await.unwrap(),
			b"{\"name\":\"Widget\"}".to_vec()
		);
		assert!(dir.path().join("products_1.bin").exists());
		assert!(!dir.path().join("products_1.tmp").exists());

		storage.delete("products:1").await.unwrap();
		assert!(!storage.exists("products:1").await.unwrap());
		storage.delete("products:1").await.unwrap();
	}

	#[tokio::test]
	async fn test_rejects_foreign_files() {
		let dir = tempfile::tempdir().unwrap();
		let storage = FileStorage::new(dir.path().to_path_buf());
		std::fs::write(dir.path().join("orders_9.bin"), b"not a record").unwrap();

		assert!(matches!(
			storage.get_bytes("orders:9").await,
			Err(StorageError::Backend(_))
		));
	}

	#[tokio::test]
	async fn test_ttl_keys_are_rejected() {
		let config: toml::Value = toml::from_str("ttl_sequences = 1").unwrap();
		match create_storage(&config) {
			Err(StorageError::Configuration(message)) => {
				assert!(message.contains("ttl_sequences"))
			},
			Err(other) => panic!("unexpected error: {}", other),
			Ok(_) => panic!("ttl configuration was accepted"),
		}
	}

	#[tokio::test]
	async fn test_sequence_survives_in_place_rewrites() {
		let dir = tempfile::tempdir().unwrap();
		let config: toml::Value = toml::from_str(&format!(
			"storage_path = {:?}",
			dir.path().to_string_lossy()
		))
		.unwrap();
		let storage = create_storage(&config).unwrap();

		storage.set_bytes("sequences:products", b"1".to_vec()).await.unwrap();
		storage.set_bytes("sequences:products", b"2".to_vec()).await.unwrap();
		assert_eq!(storage.get_bytes("sequences:products").await.unwrap(), b"2".to_vec());
	}
}
