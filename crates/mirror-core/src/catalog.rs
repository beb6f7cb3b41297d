//! Catalog of products and orders.
//!
//! Rows live in the storage service under the `products` and `orders`
//! namespaces; ids come from counters in `sequences`. Every read-modify-write
//! runs under one catalog mutex, which is never held across chain calls.

use crate::state::MirrorStateError;
use alloy::primitives::{Address, U256};
use mirror_storage::{StorageError, StorageService};
use mirror_types::{MirrorInfo, NewProduct, OrderRow, OrderStatus, ProductRow, StorageKey};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Debug, Error)]
pub enum CatalogError {
	#[error("Storage error: {0}")]
	Storage(String),
	#[error("Product {0} not found")]
	ProductNotFound(u64),
	#[error("Order {0} not found")]
	OrderNotFound(u64),
	#[error("Invalid input: {0}")]
	InvalidInput(String),
	#[error("Product {0} is not active")]
	InactiveProduct(u64),
	#[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
	InsufficientStock {
		product_id: u64,
		requested: u64,
		available: u64,
	},
	#[error(transparent)]
	Transition(#[from] MirrorStateError),
}

impl From<StorageError> for CatalogError {
	fn from(err: StorageError) -> Self {
		CatalogError::Storage(err.to_string())
	}
}

/// A catalog entity that can be mirrored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MirrorTarget {
	Product(u64),
	Order(u64),
}

impl std::fmt::Display for MirrorTarget {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			MirrorTarget::Product(id) => write!(f, "product {}", id),
			MirrorTarget::Order(id) => write!(f, "order {}", id),
		}
	}
}

fn now() -> u64 {
	chrono::Utc::now().timestamp().max(0) as u64
}

pub struct CatalogStore {
	storage: Arc<StorageService>,
	lock: Mutex<()>,
}

impl CatalogStore {
	pub fn new(storage: Arc<StorageService>) -> Self {
		Self {
			storage,
			lock: Mutex::new(()),
		}
	}

	async fn next_id(&self, key: StorageKey) -> Result<u64, CatalogError> {
		let sequences = StorageKey::Sequences.as_str();
		let current: u64 = self
			.storage
			.retrieve_optional(sequences, key.as_str())
			.await?
			.unwrap_or(0);
		let next = current + 1;
		self.storage.store(sequences, key.as_str(), &next).await?;
		Ok(next)
	}

	async fn last_id(&self, key: StorageKey) -> Result<u64, CatalogError> {
		Ok(self
			.storage
			.retrieve_optional(StorageKey::Sequences.as_str(), key.as_str())
			.await?
			.unwrap_or(0))
	}

	async fn load<T: DeserializeOwned>(&self, key: StorageKey, id: u64) -> Result<Option<T>, CatalogError> {
		Ok(self
			.storage
			.retrieve_optional(key.as_str(), &id.to_string())
			.await?)
	}

	async fn save<T: Serialize>(&self, key: StorageKey, id: u64, row: &T) -> Result<(), CatalogError> {
		Ok(self.storage.store(key.as_str(), &id.to_string(), row).await?)
	}

	/// Creates a product row in the `Unmirrored` state.
	pub async fn create_product(&self, input: &NewProduct) -> Result<ProductRow, CatalogError> {
		let name = input.name.trim();
		if name.is_empty() {
			return Err(CatalogError::InvalidInput("product name cannot be empty".into()));
		}
		if input.price.is_zero() {
			return Err(CatalogError::InvalidInput("price must be greater than zero".into()));
		}

		let _guard = self.lock.lock().await;
		let id = self.next_id(StorageKey::Products).await?;
		let timestamp = now();
		let row = ProductRow {
			id,
			name: name.to_string(),
			description: input.description.clone(),
			price: input.price,
			stock: input.stock,
			active: true,
			created_at: timestamp,
			updated_at: timestamp,
			mirror: MirrorInfo::default(),
		};
		self.save(StorageKey::Products, id, &row).await?;
		Ok(row)
	}

	pub async fn get_product(&self, id: u64) -> Result<ProductRow, CatalogError> {
		self.load(StorageKey::Products, id)
			.await?
			.ok_or(CatalogError::ProductNotFound(id))
	}

	/// All products in id order.
	pub async fn list_products(&self) -> Result<Vec<ProductRow>, CatalogError> {
		let last = self.last_id(StorageKey::Products).await?;
		let mut products = Vec::new();
		for id in 1..=last {
			if let Some(row) = self.load(StorageKey::Products, id).await? {
				products.push(row);
			}
		}
		Ok(products)
	}

	pub async fn get_order(&self, id: u64) -> Result<OrderRow, CatalogError> {
		self.load(StorageKey::Orders, id)
			.await?
			.ok_or(CatalogError::OrderNotFound(id))
	}

	/// All orders in id order.
	pub async fn list_orders(&self) -> Result<Vec<OrderRow>, CatalogError> {
		let last = self.last_id(StorageKey::Orders).await?;
		let mut orders = Vec::new();
		for id in 1..=last {
			if let Some(row) = self.load(StorageKey::Orders, id).await? {
				orders.push(row);
			}
		}
		Ok(orders)
	}

	/// Decrements stock and records the order in one step.
	///
	/// Returns the new order and the product as it is after the decrement.
	pub async fn place_order(
		&self,
		product_id: u64,
		quantity: u64,
		buyer: Address,
	) -> Result<(OrderRow, ProductRow), CatalogError> {
		if quantity == 0 {
			return Err(CatalogError::InvalidInput("quantity must be greater than zero".into()));
		}
		if buyer == Address::ZERO {
			return Err(CatalogError::InvalidInput("buyer cannot be the zero address".into()));
		}

		let _guard = self.lock.lock().await;
		let mut product = self.get_product(product_id).await?;
		if !product.active {
			return Err(CatalogError::InactiveProduct(product_id));
		}
		if product.stock < quantity {
			return Err(CatalogError::InsufficientStock {
				product_id,
				requested: quantity,
				available: product.stock,
			});
		}

		let timestamp = now();
		product.stock -= quantity;
		product.updated_at = timestamp;
		self.save(StorageKey::Products, product_id, &product).await?;

		let id = self.next_id(StorageKey::Orders).await?;
		let order = OrderRow {
			id,
			product_id,
			buyer,
			quantity,
			total_paid: product.price.saturating_mul(U256::from(quantity)),
			status: OrderStatus::Confirmed,
			created_at: timestamp,
			updated_at: timestamp,
			mirror: MirrorInfo::default(),
		};
		self.save(StorageKey::Orders, id, &order).await?;
		Ok((order, product))
	}

	/// Applies `update` to the mirror bookkeeping of `target` and persists it.
	///
	/// Nothing is written when `update` fails.
	pub async fn update_mirror<F>(&self, target: MirrorTarget, update: F) -> Result<MirrorInfo, CatalogError>
	where
		F: FnOnce(&mut MirrorInfo) -> Result<(), MirrorStateError>,
	{
		let _guard = self.lock.lock().await;
		match target {
			MirrorTarget::Product(id) => {
				let mut row = self.get_product(id).await?;
				update(&mut row.mirror)?;
				row.updated_at = now();
				self.save(StorageKey::Products, id, &row).await?;
				Ok(row.mirror)
			},
			MirrorTarget::Order(id) => {
				let mut row = self.get_order(id).await?;
				update(&mut row.mirror)?;
				row.updated_at = now();
				self.save(StorageKey::Orders, id, &row).await?;
				Ok(row.mirror)
			},
		}
	}

	pub async fn mirror_info(&self, target: MirrorTarget) -> Result<MirrorInfo, CatalogError> {
		match target {
			MirrorTarget::Product(id) => Ok(self.get_product(id).await?.mirror),
			MirrorTarget::Order(id) => Ok(self.get_order(id).await?.mirror),
		}
	}
}
