//! On-chain product and purchase records.
//!
//! These are the decoded, validated forms of the registry contract's
//! `Product` and `Purchase` structs. Conversion from the raw ABI structs is
//! checked: an integer that does not fit the record field is rejected rather
//! than truncated.

use crate::contract;
use alloy::primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reasons a raw contract struct cannot become a record.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordError {
	/// The struct is the all-zero default a mapping returns for a missing key.
	#[error("record is empty")]
	Empty,
	/// A field value is outside the range of the record field.
	#[error("field '{field}' out of range: {value}")]
	OutOfRange { field: &'static str, value: U256 },
}

/// Product as stored by the registry contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRecord {
	pub id: u64,
	pub name: String,
	/// Price in the chain's smallest currency unit.
	pub price: U256,
	pub stock: u64,
	pub creator: Address,
	/// Block timestamp of registration (Unix seconds).
	pub created_at: u64,
}

/// Purchase as stored by the registry contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseRecord {
	pub id: u64,
	pub product_id: u64,
	pub buyer: Address,
	pub quantity: u64,
	pub total_price: U256,
	/// Block timestamp of the purchase (Unix seconds).
	pub purchased_at: u64,
	/// Free-form JSON snapshot of the product at purchase time.
	pub product_data: String,
}

fn narrow(field: &'static str, value: U256) -> Result<u64, RecordError> {
	u64::try_from(value).map_err(|_| RecordError::OutOfRange { field, value })
}

impl TryFrom<contract::Product> for ProductRecord {
	type Error = RecordError;

	fn try_from(raw: contract::Product) -> Result<Self, Self::Error> {
		if raw.id.is_zero() || raw.creator == Address::ZERO {
			return Err(RecordError::Empty);
		}
		Ok(Self {
			id: narrow("id", raw.id)?,
			name: raw.name,
			price: raw.price,
			stock: narrow("stock", raw.stock)?,
			creator: raw.creator,
			created_at: narrow("createdAt", raw.createdAt)?,
		})
	}
}

impl TryFrom<contract::Purchase> for PurchaseRecord {
	type Error = RecordError;

	fn try_from(raw: contract::Purchase) -> Result<Self, Self::Error> {
		if raw.id.is_zero() || raw.buyer == Address::ZERO {
			return Err(RecordError::Empty);
		}
		Ok(Self {
			id: narrow("id", raw.id)?,
			product_id: narrow("productId", raw.productId)?,
			buyer: raw.buyer,
			quantity: narrow("quantity", raw.quantity)?,
			total_price: raw.totalPrice,
			purchased_at: narrow("purchasedAt", raw.purchasedAt)?,
			product_data: raw.productData,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn raw_product(id: u64) -> contract::Product {
		contract::Product {
			id: U256::from(id),
			name: "Widget".to_string(),
			price: U256::from(100u64),
			stock: U256::from(10u64),
			creator: Address::repeat_byte(0x11),
			createdAt: U256::from(1_700_000_000u64),
		}
	}

	#[test]
	fn test_product_conversion() {
		let record = ProductRecord::try_from(raw_product(1)).unwrap();
		assert_eq!(record.id, 1);
		assert_eq!(record.name, "Widget");
		assert_eq!(record.price, U256::from(100u64));
		assert_eq!(record.stock, 10);
	}

	#[test]
	fn test_zero_product_is_empty() {
		let mut raw = raw_product(0);
		raw.price = U256::ZERO;
		assert_eq!(ProductRecord::try_from(raw), Err(RecordError::Empty));
	}

	#[test]
	fn test_oversized_stock_is_rejected() {
		let mut raw = raw_product(3);
		raw.stock = U256::MAX;
		assert!(matches!(
			ProductRecord::try_from(raw),
			Err(RecordError::OutOfRange { field: "stock", .. })
		));
	}
}
