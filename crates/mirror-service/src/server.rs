//! HTTP server for the catalog mirroring API.
//!
//! Every route lives under `/api` and delegates to the mirroring facade held
//! in the shared state.

use crate::apis::{chain, orders, products};
use axum::{
	extract::DefaultBodyLimit,
	routing::{get, post},
	Router,
};
use mirror_config::ApiConfig;
use mirror_core::MirrorFacade;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Shared application state for the API server.
#[derive(Clone)]
pub struct AppState {
	pub facade: MirrorFacade,
}

/// Builds the API router.
pub fn router(facade: MirrorFacade, max_request_size: usize) -> Router {
	Router::new()
		.nest(
			"/api",
			Router::new()
				.route("/health", get(chain::health))
				.route("/account", get(chain::account))
				.route("/dashboard", get(chain::dashboard))
				.route(
					"/products",
					get(products::list_products).post(products::create_product),
				)
				.route("/products/{id}", get(products::get_product))
				.route("/products/{id}/purchase", post(products::purchase_product))
				.route("/products/{id}/mirror/retry", post(products::retry_mirror))
				.route(
					"/products/{id}/mirror/reconcile",
					post(products::reconcile_mirror),
				)
				.route("/orders", get(orders::list_orders))
				.route("/orders/{id}", get(orders::get_order))
				.route("/orders/{id}/mirror/retry", post(orders::retry_mirror))
				.route(
					"/orders/{id}/mirror/reconcile",
					post(orders::reconcile_mirror),
				)
				.route("/chain/products/{id}", get(chain::get_chain_product))
				.route("/chain/purchases/{id}", get(chain::get_chain_purchase))
				.route("/chain/transactions", get(chain::recent_transactions))
				.route("/chain/accounts", get(chain::node_accounts))
				.route("/chain/test-transaction", post(chain::test_transaction)),
		)
		.layer(
			ServiceBuilder::new()
				.layer(TraceLayer::new_for_http())
				.layer(CorsLayer::permissive())
				.layer(DefaultBodyLimit::max(max_request_size)),
		)
		.with_state(AppState { facade })
}

/// Starts the HTTP server and serves until it fails.
pub async fn start_server(
	api_config: ApiConfig,
	facade: MirrorFacade,
) -> Result<(), Box<dyn std::error::Error>> {
	let app = router(facade, api_config.max_request_size);

	let bind_address = format!("{}:{}", api_config.host, api_config.port);
	let listener = TcpListener::bind(&bind_address).await?;

	tracing::info!("Mirror API server starting on {}", bind_address);

	axum::serve(listener, app).await?;

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use alloy::primitives::{Address, U256};
	use alloy::signers::local::PrivateKeySigner;
	use axum::body::Body;
	use axum::http::{Request, StatusCode};
	use mirror_config::builders::ConfigBuilder;
	use mirror_core::MirrorBuilder;
	use mirror_rpc::testing::MockNode;
	use mirror_types::KeyHandle;
	use serde_json::{json, Value};
	use std::sync::Arc;
	use tower::ServiceExt;

	const DEV_KEY: &str = "0x4f3edf983ac636a65a842ce7c78d9aa706d3b113bce9c46f30d7d21715b23b1d";
	const REGISTRY: Address = Address::new([0xAA; 20]);

	async fn app(contract: Option<Address>) -> Router {
		let signer = DEV_KEY
			.parse::<PrivateKeySigner>()
			.map(|signer| signer.address())
			.unwrap();
		let mut node = MockNode::new(1337).with_balance(signer, U256::from(10u128.pow(20)));
		if let Some(contract) = contract {
			node = node.with_registry(contract);
		}
		let config = ConfigBuilder::new()
			.signer(signer, KeyHandle::Inline(DEV_KEY.into()))
			.contract_address(contract)
			.build();
		let facade = MirrorBuilder::new(config)
			.build_with_rpc(Arc::new(node))
			.await
			.unwrap();
		router(facade, 64 * 1024)
	}

	async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
		let mut request = Request::builder().method(method).uri(uri);
		let body = match body {
			Some(body) => {
				request = request.header("content-type", "application/json");
				Body::from(body.to_string())
			},
			None => Body::empty(),
		};
		let response = app
			.clone()
			.oneshot(request.body(body).unwrap())
			.await
			.unwrap();
		let status = response.status();
		let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
			.await
			.unwrap();
		let value = if bytes.is_empty() {
			Value::Null
		} else {
			serde_json::from_slice(&bytes).unwrap()
		};
		(status, value)
	}

	#[tokio::test]
	async fn test_create_and_purchase_over_http() {
		let app = app(Some(REGISTRY)).await;

		let (status, created) = send(
			&app,
			"POST",
			"/api/products",
			Some(json!({"name": "Widget", "price": "100", "stock": 10})),
		)
		.await;
		assert_eq!(status, StatusCode::CREATED);
		assert_eq!(created["state"], "mirrored");
		assert_eq!(created["entity"]["id"], 1);

		let (status, order) = send(
			&app,
			"POST",
			"/api/products/1/purchase",
			Some(json!({"quantity": 3, "buyer": "0x2222222222222222222222222222222222222222"})),
		)
		.await;
		assert_eq!(status, StatusCode::CREATED);
		assert_eq!(order["entity"]["quantity"], 3);

		let (status, product) = send(&app, "GET", "/api/products/1", None).await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(product["stock"], 7);

		let (status, on_chain) = send(&app, "GET", "/api/chain/products/1", None).await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(on_chain["name"], "Widget");
		assert_eq!(on_chain["stock"], 7);
	}

	#[tokio::test]
	async fn test_error_statuses() {
		let app = app(Some(REGISTRY)).await;

		let (status, body) = send(&app, "GET", "/api/products/42", None).await;
		assert_eq!(status, StatusCode::NOT_FOUND);
		assert_eq!(body["error"], "NOT_FOUND");

		let (status, _) = send(
			&app,
			"POST",
			"/api/products",
			Some(json!({"name": "Widget", "price": "ten", "stock": 1})),
		)
		.await;
		assert_eq!(status, StatusCode::BAD_REQUEST);

		send(
			&app,
			"POST",
			"/api/products",
			Some(json!({"name": "Widget", "price": 100, "stock": 2})),
		)
		.await;
		let (status, body) = send(
			&app,
			"POST",
			"/api/products/1/purchase",
			Some(json!({"quantity": 3, "buyer": "0x2222222222222222222222222222222222222222"})),
		)
		.await;
		assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
		assert_eq!(body["error"], "INSUFFICIENT_STOCK");

		let (status, body) = send(&app, "POST", "/api/products/1/mirror/retry", None).await;
		assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
		assert_eq!(body["error"], "INVALID_MIRROR_TRANSITION");
	}

	#[tokio::test]
	async fn test_chain_reads_without_contract() {
		let app = app(None).await;

		let (status, body) = send(&app, "GET", "/api/chain/purchases/1", None).await;
		assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
		assert_eq!(body["error"], "CONTRACT_NOT_CONFIGURED");

		let (status, outcome) = send(&app, "POST", "/api/chain/test-transaction", None).await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(outcome["status"], "confirmed");
	}

	#[tokio::test]
	async fn test_health_and_account() {
		let app = app(None).await;

		let (status, health) = send(&app, "GET", "/api/health", None).await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(health["connected"], true);
		assert_eq!(health["chain_id"], 1337);

		let (status, account) = send(&app, "GET", "/api/account", None).await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(account["network"], "ganache");
	}

	#[tokio::test]
	async fn test_orders_and_dashboard() {
		let app = app(Some(REGISTRY)).await;
		send(
			&app,
			"POST",
			"/api/products",
			Some(json!({"name": "Widget", "price": "100", "stock": 10})),
		)
		.await;
		for quantity in [1, 2] {
			send(
				&app,
				"POST",
				"/api/products/1/purchase",
				Some(json!({"quantity": quantity, "buyer": "0x2222222222222222222222222222222222222222"})),
			)
			.await;
		}

		let (status, orders) = send(&app, "GET", "/api/orders", None).await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(orders.as_array().map(Vec::len), Some(2));
		assert_eq!(orders[0]["id"], 1);

		let (status, stats) = send(&app, "GET", "/api/dashboard", None).await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(stats["total_products"], 1);
		assert_eq!(stats["total_orders"], 2);
		assert_eq!(stats["mirrored_orders"], 2);
		assert_eq!(stats["chain_purchases"], 2);
		assert_eq!(stats["recent_orders"][0]["id"], 2);
	}

	#[tokio::test]
	async fn test_chain_transactions_and_accounts() {
		let app = app(None).await;
		send(&app, "POST", "/api/chain/test-transaction", None).await;
		send(&app, "POST", "/api/chain/test-transaction", None).await;

		let (status, listed) = send(&app, "GET", "/api/chain/transactions?blocks=1", None).await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(listed["total"], 1);
		assert_eq!(listed["transactions"][0]["block_number"], 2);
		assert_eq!(listed["transactions"][0]["status"], "success");

		let (status, listed) = send(&app, "GET", "/api/chain/transactions", None).await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(listed["total"], 2);

		let (status, body) = send(&app, "GET", "/api/chain/accounts", None).await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(body["accounts"].as_array().map(Vec::len), Some(1));
		assert_eq!(body["accounts"][0]["index"], 0);
	}
}
