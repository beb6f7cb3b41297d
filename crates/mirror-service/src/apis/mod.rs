//! Request handlers and the error body shared by all endpoints.

use alloy::primitives::U256;
use axum::{
	http::StatusCode,
	response::{IntoResponse, Json, Response},
};
use mirror_core::FacadeError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub mod chain;
pub mod orders;
pub mod products;

/// API error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
	/// Error type/code
	pub error: String,
	/// Human-readable description
	pub message: String,
	/// Additional error context
	#[serde(skip_serializing_if = "Option::is_none")]
	pub details: Option<serde_json::Value>,
}

/// Structured API error type with HTTP status mapping.
#[derive(Debug)]
pub enum ApiError {
	/// Malformed request (400)
	BadRequest { error_type: String, message: String },
	/// Unknown product, order or on-chain record (404)
	NotFound { error_type: String, message: String },
	/// Request understood but refused by business rules (422)
	UnprocessableEntity {
		error_type: String,
		message: String,
		details: Option<serde_json::Value>,
	},
	/// Chain endpoint or contract not available (503)
	ServiceUnavailable { error_type: String, message: String },
	/// Internal server error (500)
	InternalServerError { error_type: String, message: String },
}

impl ApiError {
	pub fn bad_request(message: impl Into<String>) -> Self {
		ApiError::BadRequest {
			error_type: "INVALID_REQUEST".to_string(),
			message: message.into(),
		}
	}

	pub fn status_code(&self) -> StatusCode {
		match self {
			ApiError::BadRequest { .. } => StatusCode::BAD_REQUEST,
			ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
			ApiError::UnprocessableEntity { .. } => StatusCode::UNPROCESSABLE_ENTITY,
			ApiError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
			ApiError::InternalServerError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
		}
	}

	pub fn to_error_response(&self) -> ErrorResponse {
		match self {
			ApiError::BadRequest {
				error_type,
				message,
			}
			| ApiError::NotFound {
				error_type,
				message,
			}
			| ApiError::ServiceUnavailable {
				error_type,
				message,
			}
			| ApiError::InternalServerError {
				error_type,
				message,
			} => ErrorResponse {
				error: error_type.clone(),
				message: message.clone(),
				details: None,
			},
			ApiError::UnprocessableEntity {
				error_type,
				message,
				details,
			} => ErrorResponse {
				error: error_type.clone(),
				message: message.clone(),
				details: details.clone(),
			},
		}
	}
}

impl fmt::Display for ApiError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let response = self.to_error_response();
		write!(f, "{} ({}): {}", self.status_code(), response.error, response.message)
	}
}

impl std::error::Error for ApiError {}

impl From<FacadeError> for ApiError {
	fn from(err: FacadeError) -> Self {
		let message = err.to_string();
		match err {
			FacadeError::InvalidInput(_) => ApiError::BadRequest {
				error_type: "INVALID_INPUT".to_string(),
				message,
			},
			FacadeError::NotFound(_) => ApiError::NotFound {
				error_type: "NOT_FOUND".to_string(),
				message,
			},
			FacadeError::InsufficientStock {
				product_id,
				requested,
				available,
			} => ApiError::UnprocessableEntity {
				error_type: "INSUFFICIENT_STOCK".to_string(),
				message,
				details: Some(serde_json::json!({
					"productId": product_id,
					"requested": requested,
					"available": available,
				})),
			},
			FacadeError::Rejected(_) => ApiError::UnprocessableEntity {
				error_type: "REJECTED".to_string(),
				message,
				details: None,
			},
			FacadeError::InvalidTransition(_) => ApiError::UnprocessableEntity {
				error_type: "INVALID_MIRROR_TRANSITION".to_string(),
				message,
				details: None,
			},
			FacadeError::NotSubmitted(_) => ApiError::UnprocessableEntity {
				error_type: "NOT_SUBMITTED".to_string(),
				message,
				details: None,
			},
			FacadeError::ContractNotConfigured => ApiError::ServiceUnavailable {
				error_type: "CONTRACT_NOT_CONFIGURED".to_string(),
				message,
			},
			FacadeError::ChainUnavailable(_) => ApiError::ServiceUnavailable {
				error_type: "CHAIN_UNAVAILABLE".to_string(),
				message,
			},
			FacadeError::Decode(_) => ApiError::InternalServerError {
				error_type: "DECODE_ERROR".to_string(),
				message,
			},
			FacadeError::Delivery(_) => ApiError::InternalServerError {
				error_type: "DELIVERY_ERROR".to_string(),
				message,
			},
			FacadeError::Storage(_) => ApiError::InternalServerError {
				error_type: "STORAGE_ERROR".to_string(),
				message,
			},
		}
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		(self.status_code(), Json(self.to_error_response())).into_response()
	}
}

/// Wei amount accepted either as a JSON number or as a decimal/hex string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Amount {
	Number(u64),
	Text(String),
}

impl Amount {
	pub fn to_u256(&self, field: &str) -> Result<U256, ApiError> {
		match self {
			Amount::Number(value) => Ok(U256::from(*value)),
			Amount::Text(text) => U256::from_str(text.trim())
				.map_err(|_| ApiError::bad_request(format!("'{}' is not a valid amount", field))),
		}
	}
}
