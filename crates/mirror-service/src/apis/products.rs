//! Product endpoints.

use super::{Amount, ApiError};
use crate::server::AppState;
use alloy::primitives::Address;
use axum::{
	extract::{Path, State},
	http::StatusCode,
	Json,
};
use mirror_types::{MirrorResult, NewProduct, OrderRow, ProductRow};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct CreateProductRequest {
	pub name: String,
	#[serde(default)]
	pub description: String,
	pub price: Amount,
	pub stock: u64,
	/// Mirror the product on chain; defaults to true.
	#[serde(default = "default_mirror")]
	pub mirror: bool,
}

fn default_mirror() -> bool {
	true
}

#[derive(Debug, Deserialize)]
pub struct PurchaseRequest {
	pub quantity: u64,
	pub buyer: Address,
}

/// Handles GET /api/products.
pub async fn list_products(State(state): State<AppState>) -> Result<Json<Vec<ProductRow>>, ApiError> {
	Ok(Json(state.facade.list_products().await?))
}

/// Handles POST /api/products.
pub async fn create_product(
	State(state): State<AppState>,
	Json(request): Json<CreateProductRequest>,
) -> Result<(StatusCode, Json<MirrorResult<ProductRow>>), ApiError> {
	let input = NewProduct {
		price: request.price.to_u256("price")?,
		name: request.name,
		description: request.description,
		stock: request.stock,
		mirror: request.mirror,
	};
	let result = state.facade.register_product(input).await?;
	Ok((StatusCode::CREATED, Json(result)))
}

/// Handles GET /api/products/{id}.
pub async fn get_product(
	State(state): State<AppState>,
	Path(id): Path<u64>,
) -> Result<Json<ProductRow>, ApiError> {
	Ok(Json(state.facade.get_product(id).await?))
}

/// Handles POST /api/products/{id}/purchase.
pub async fn purchase_product(
	State(state): State<AppState>,
	Path(id): Path<u64>,
	Json(request): Json<PurchaseRequest>,
) -> Result<(StatusCode, Json<MirrorResult<OrderRow>>), ApiError> {
	let result = state
		.facade
		.purchase_product(id, request.quantity, request.buyer)
		.await?;
	Ok((StatusCode::CREATED, Json(result)))
}

/// Handles POST /api/products/{id}/mirror/retry.
pub async fn retry_mirror(
	State(state): State<AppState>,
	Path(id): Path<u64>,
) -> Result<Json<MirrorResult<ProductRow>>, ApiError> {
	Ok(Json(state.facade.retry_product_mirror(id).await?))
}

/// Handles POST /api/products/{id}/mirror/reconcile.
pub async fn reconcile_mirror(
	State(state): State<AppState>,
	Path(id): Path<u64>,
) -> Result<Json<MirrorResult<ProductRow>>, ApiError> {
	Ok(Json(state.facade.reconcile_product(id).await?))
}
