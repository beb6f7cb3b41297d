//! ABI of the product registry contract.
//!
//! The registry assigns sequential ids starting at 1 to products and
//! purchases. Purchases are recorded custodially: the store-owner account
//! submits them and names the buyer explicitly.

use alloy::sol;

sol! {
	#[derive(Debug, Default, PartialEq, Eq, Hash)]
	struct Product {
		uint256 id;
		string name;
		uint256 price;
		uint256 stock;
		address creator;
		uint256 createdAt;
	}

	#[derive(Debug, Default, PartialEq, Eq, Hash)]
	struct Purchase {
		uint256 id;
		uint256 productId;
		address buyer;
		uint256 quantity;
		uint256 totalPrice;
		uint256 purchasedAt;
		string productData;
	}

	#[sol(all_derives)]
	interface IProductRegistry {
		event ProductRegistered(
			uint256 indexed productId,
			string name,
			uint256 price,
			uint256 stock,
			address indexed creator
		);

		event ProductPurchased(
			uint256 indexed purchaseId,
			uint256 indexed productId,
			address indexed buyer,
			uint256 quantity,
			uint256 totalPrice
		);

		function registerProduct(string name, uint256 price, uint256 stock) external returns (uint256 productId);

		function purchaseProduct(
			uint256 productId,
			uint256 quantity,
			address buyer,
			string productData
		) external payable returns (uint256 purchaseId);

		function getProduct(uint256 productId) external view returns (Product memory product);

		function getPurchase(uint256 purchaseId) external view returns (Purchase memory purchase);

		function productCount() external view returns (uint256 count);

		function purchaseCount() external view returns (uint256 count);
	}
}
