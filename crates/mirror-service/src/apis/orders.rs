//! Order endpoints.

use super::ApiError;
use crate::server::AppState;
use axum::{
	extract::{Path, State},
	Json,
};
use mirror_types::{MirrorResult, OrderRow};

/// Handles GET /api/orders.
pub async fn list_orders(State(state): State<AppState>) -> Result<Json<Vec<OrderRow>>, ApiError> {
	Ok(Json(state.facade.list_orders().await?))
}

/// Handles GET /api/orders/{id}.
pub async fn get_order(
	State(state): State<AppState>,
	Path(id): Path<u64>,
) -> Result<Json<OrderRow>, ApiError> {
	Ok(Json(state.facade.get_order(id).await?))
}

/// Handles POST /api/orders/{id}/mirror/retry.
pub async fn retry_mirror(
	State(state): State<AppState>,
	Path(id): Path<u64>,
) -> Result<Json<MirrorResult<OrderRow>>, ApiError> {
	Ok(Json(state.facade.retry_order_mirror(id).await?))
}

/// Handles POST /api/orders/{id}/mirror/reconcile.
pub async fn reconcile_mirror(
	State(state): State<AppState>,
	Path(id): Path<u64>,
) -> Result<Json<MirrorResult<OrderRow>>, ApiError> {
	Ok(Json(state.facade.reconcile_order(id).await?))
}
