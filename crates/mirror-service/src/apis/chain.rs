//! Chain status and read-back endpoints.

use super::{Amount, ApiError};
use crate::server::AppState;
use alloy::primitives::U256;
use axum::{
	body::Bytes,
	extract::{Path, Query, State},
	http::StatusCode,
	Json,
};
use mirror_types::{
	AccountInfo, DashboardStats, HealthStatus, NodeAccount, ProductRecord, PurchaseRecord, TransactionOutcome,
	TransactionSummary,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Deserialize)]
pub struct TestTransactionRequest {
	/// Wei to send to the signer's own address; zero when omitted.
	#[serde(default)]
	pub value: Option<Amount>,
}

#[derive(Debug, Deserialize)]
pub struct TransactionsQuery {
	/// Number of latest blocks to scan.
	pub blocks: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct TransactionsResponse {
	pub total: usize,
	pub transactions: Vec<TransactionSummary>,
}

#[derive(Debug, Serialize)]
pub struct AccountsResponse {
	pub accounts: Vec<NodeAccount>,
}

/// Handles GET /api/health.
///
/// Answers 503 with the same body when the node is not reachable.
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthStatus>) {
	let status = state.facade.health().await;
	let code = if status.connected {
		StatusCode::OK
	} else {
		StatusCode::SERVICE_UNAVAILABLE
	};
	(code, Json(status))
}

/// Handles GET /api/account.
pub async fn account(State(state): State<AppState>) -> Result<Json<AccountInfo>, ApiError> {
	Ok(Json(state.facade.get_account_info().await?))
}

/// Handles GET /api/chain/products/{id}.
pub async fn get_chain_product(
	State(state): State<AppState>,
	Path(id): Path<u64>,
) -> Result<Json<ProductRecord>, ApiError> {
	Ok(Json(state.facade.get_chain_product(id).await?))
}

/// Handles GET /api/chain/purchases/{id}.
pub async fn get_chain_purchase(
	State(state): State<AppState>,
	Path(id): Path<u64>,
) -> Result<Json<PurchaseRecord>, ApiError> {
	Ok(Json(state.facade.get_chain_purchase(id).await?))
}

/// Handles POST /api/chain/test-transaction.
pub async fn test_transaction(
	State(state): State<AppState>,
	body: Bytes,
) -> Result<Json<TransactionOutcome>, ApiError> {
	let request: TestTransactionRequest = if body.is_empty() {
		TestTransactionRequest::default()
	} else {
		serde_json::from_slice(&body).map_err(|e| ApiError::bad_request(e.to_string()))?
	};
	let value = match &request.value {
		Some(amount) => amount.to_u256("value")?,
		None => U256::ZERO,
	};
	Ok(Json(state.facade.send_test_transaction(value).await?))
}

/// Handles GET /api/chain/transactions.
pub async fn recent_transactions(
	State(state): State<AppState>,
	Query(query): Query<TransactionsQuery>,
) -> Result<Json<TransactionsResponse>, ApiError> {
	let transactions = state.facade.recent_transactions(query.blocks).await?;
	Ok(Json(TransactionsResponse {
		total: transactions.len(),
		transactions,
	}))
}

/// Handles GET /api/chain/accounts.
pub async fn node_accounts(State(state): State<AppState>) -> Result<Json<AccountsResponse>, ApiError> {
	let accounts = state.facade.node_accounts().await?;
	Ok(Json(AccountsResponse { accounts }))
}

/// Handles GET /api/dashboard.
pub async fn dashboard(State(state): State<AppState>) -> Result<Json<DashboardStats>, ApiError> {
	Ok(Json(state.facade.dashboard().await?))
}
