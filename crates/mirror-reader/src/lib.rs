//! Read access to the product registry contract.
//!
//! Reads are plain `eth_call`s: no nonce, no signature, no gas. Return data
//! is decoded against the expected struct layout and converted into checked
//! records, so a read yields either a complete record or an error.

use alloy::primitives::{Address, Bytes, U256};
use alloy::sol_types::SolCall;
use mirror_rpc::{CallRequest, Connection, RpcError};
use mirror_types::contract::IProductRegistry;
use mirror_types::{ProductRecord, PurchaseRecord, RecordError};
use thiserror::Error;

/// Errors returned by contract reads.
#[derive(Debug, Error)]
pub enum ReadError {
	/// No record exists under the requested id.
	#[error("{entity} {id} not found")]
	NotFound { entity: &'static str, id: u64 },
	/// The return data does not match the expected layout.
	#[error("Failed to decode {entity}: {reason}")]
	Decode {
		entity: &'static str,
		reason: String,
	},
	#[error("RPC error: {0}")]
	Rpc(#[from] RpcError),
	/// No registry contract is configured for this endpoint.
	#[error("No registry contract configured")]
	ContractNotConfigured,
}

/// Reads products and purchases from the registry.
#[derive(Debug, Clone)]
pub struct ContractStateReader {
	connection: Connection,
	contract: Option<Address>,
}

impl ContractStateReader {
	pub fn new(connection: Connection, contract: Option<Address>) -> Self {
		Self {
			connection,
			contract,
		}
	}

	pub fn contract(&self) -> Option<Address> {
		self.contract
	}

	async fn call(&self, entity: &'static str, id: u64, data: Vec<u8>) -> Result<Bytes, ReadError> {
		let contract = self.contract.ok_or(ReadError::ContractNotConfigured)?;
		match self
			.connection
			.rpc()
			.call(&CallRequest::read(contract, data))
			.await
		{
			Ok(output) => Ok(output),
			Err(e) if e.is_execution_reverted() => Err(ReadError::NotFound { entity, id }),
			Err(e) => Err(e.into()),
		}
	}

	/// Reads product `id` from the registry.
	pub async fn read_product(&self, id: u64) -> Result<ProductRecord, ReadError> {
		let data = IProductRegistry::getProductCall {
			productId: U256::from(id),
		}
		.abi_encode();
		let output = self.call("product", id, data).await?;

		let raw = IProductRegistry::getProductCall::abi_decode_returns(&output).map_err(|e| {
			ReadError::Decode {
				entity: "product",
				reason: e.to_string(),
			}
		})?;
		let record = convert("product", id, ProductRecord::try_from(raw))?;
		tracing::debug!(product_id = id, name = %record.name, "Read product from registry");
		Ok(record)
	}

	/// Reads purchase `id` from the registry.
	pub async fn read_purchase(&self, id: u64) -> Result<PurchaseRecord, ReadError> {
		let data = IProductRegistry::getPurchaseCall {
			purchaseId: U256::from(id),
		}
		.abi_encode();
		let output = self.call("purchase", id, data).await?;

		let raw = IProductRegistry::getPurchaseCall::abi_decode_returns(&output).map_err(|e| {
			ReadError::Decode {
				entity: "purchase",
				reason: e.to_string(),
			}
		})?;
		let record = convert("purchase", id, PurchaseRecord::try_from(raw))?;
		tracing::debug!(purchase_id = id, product_id = record.product_id, "Read purchase from registry");
		Ok(record)
	}

	/// Number of products registered on chain.
	pub async fn product_count(&self) -> Result<u64, ReadError> {
		let output = self
			.call("product count", 0, IProductRegistry::productCountCall {}.abi_encode())
			.await?;
		let count = IProductRegistry::productCountCall::abi_decode_returns(&output);
		decode_count("product count", count)
	}

	/// Number of purchases recorded on chain.
	pub async fn purchase_count(&self) -> Result<u64, ReadError> {
		let output = self
			.call("purchase count", 0, IProductRegistry::purchaseCountCall {}.abi_encode())
			.await?;
		let count = IProductRegistry::purchaseCountCall::abi_decode_returns(&output);
		decode_count("purchase count", count)
	}
}

fn convert<T>(entity: &'static str, id: u64, record: Result<T, RecordError>) -> Result<T, ReadError> {
	match record {
		Ok(record) => Ok(record),
		Err(RecordError::Empty) => Err(ReadError::NotFound { entity, id }),
		Err(e) => Err(ReadError::Decode {
			entity,
			reason: e.to_string(),
		}),
	}
}

fn decode_count(
	entity: &'static str,
	count: Result<U256, alloy::sol_types::Error>,
) -> Result<u64, ReadError> {
	let count = count.map_err(|e| ReadError::Decode {
		entity,
		reason: e.to_string(),
	})?;
	u64::try_from(count).map_err(|_| ReadError::Decode {
		entity,
		reason: format!("count out of range: {}", count),
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use mirror_config::builders::ConfigBuilder;
	use mirror_types::contract::{Product, Purchase};
	use mirror_rpc::testing::MockNode;
	use std::sync::Arc;

	const REGISTRY: Address = Address::new([0xAA; 20]);

	async fn reader(node: MockNode, contract: Option<Address>) -> (ContractStateReader, Arc<MockNode>) {
		let config = ConfigBuilder::new().build();
		let node = Arc::new(node);
		let connection = Connection::from_rpc(node.clone(), &config.endpoint)
			.await
			.unwrap();
		(ContractStateReader::new(connection, contract), node)
	}

	#[tokio::test]
	async fn test_missing_product_is_not_found() {
		let (reader, _node) = reader(MockNode::new(1337).with_registry(REGISTRY), Some(REGISTRY)).await;

		assert!(matches!(
			reader.read_product(42).await,
			Err(ReadError::NotFound { entity: "product", id: 42 })
		));
		assert!(matches!(
			reader.read_purchase(7).await,
			Err(ReadError::NotFound { entity: "purchase", id: 7 })
		));
		assert_eq!(reader.product_count().await.unwrap(), 0);
	}

	#[tokio::test]
	async fn test_malformed_return_data_is_decode_error() {
		let (reader, node) = reader(MockNode::new(1337).with_registry(REGISTRY), Some(REGISTRY)).await;
		node.set_call_override(Some(Bytes::from(vec![0u8; 31]))).await;

		assert!(matches!(
			reader.read_product(1).await,
			Err(ReadError::Decode { .. })
		));
		assert!(matches!(
			reader.purchase_count().await,
			Err(ReadError::Decode { .. })
		));
	}

	#[tokio::test]
	async fn test_out_of_range_field_is_decode_error() {
		let (reader, node) = reader(MockNode::new(1337).with_registry(REGISTRY), Some(REGISTRY)).await;
		let oversized = Product {
			id: U256::from(1u64),
			name: "Widget".to_string(),
			price: U256::from(100u64),
			stock: U256::MAX,
			creator: Address::repeat_byte(0x11),
			createdAt: U256::from(1u64),
		};
		let output = IProductRegistry::getProductCall::abi_encode_returns(&oversized);
		node.set_call_override(Some(output.into())).await;

		assert!(matches!(
			reader.read_product(1).await,
			Err(ReadError::Decode { entity: "product", .. })
		));
	}

	#[tokio::test]
	async fn test_decodes_function_return_encoding() {
		let (reader, node) = reader(MockNode::new(1337).with_registry(REGISTRY), Some(REGISTRY)).await;
		let purchase = Purchase {
			id: U256::from(3u64),
			productId: U256::from(1u64),
			buyer: Address::repeat_byte(0x22),
			quantity: U256::from(2u64),
			totalPrice: U256::from(200u64),
			purchasedAt: U256::from(1_700_000_000u64),
			productData: "{\"name\":\"Widget\"}".to_string(),
		};
		let output = IProductRegistry::getPurchaseCall::abi_encode_returns(&purchase);
		node.set_call_override(Some(output.into())).await;

		let record = reader.read_purchase(3).await.unwrap();
		assert_eq!(record.id, 3);
		assert_eq!(record.buyer, Address::repeat_byte(0x22));
		assert_eq!(record.total_price, U256::from(200u64));
		assert_eq!(record.product_data, "{\"name\":\"Widget\"}");
	}

	#[tokio::test]
	async fn test_without_contract() {
		let (reader, _node) = reader(MockNode::new(1337), None).await;
		assert!(matches!(
			reader.read_product(1).await,
			Err(ReadError::ContractNotConfigured)
		));
	}

	#[tokio::test]
	async fn test_transport_failure_is_rpc_error() {
		let (reader, node) = reader(MockNode::new(1337).with_registry(REGISTRY), Some(REGISTRY)).await;
		node.set_offline(true).await;
		assert!(matches!(reader.read_product(1).await, Err(ReadError::Rpc(_))));
	}
}
