//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures errors to Sentry before
//! responding to the client. All route handlers should return `Result<T, AppError>`.

use std::sync::Arc;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::bookstore::{ApiError, QueryError};

/// Application-level error type for the storefront.
#[derive(Debug, Error)]
pub enum AppError {
    /// Remote bookstore operation failed.
    #[error("Bookstore error: {0}")]
    Store(#[from] QueryError),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),
}

impl From<ApiError> for AppError {
    fn from(error: ApiError) -> Self {
        Self::Store(Arc::new(error))
    }
}

impl AppError {
    /// HTTP status this error renders with.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Store(err) => match err.as_ref() {
                ApiError::NotFound(_) => StatusCode::NOT_FOUND,
                ApiError::Validation(_) => StatusCode::BAD_REQUEST,
                ApiError::Conflict(_) => StatusCode::CONFLICT,
                ApiError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
                ApiError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
                ApiError::Network(_) | ApiError::Parse(_) | ApiError::Remote { .. } => {
                    StatusCode::BAD_GATEWAY
                }
            },
            Self::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }

    /// Message safe to show to the customer.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::Store(err) => match err.as_ref() {
                ApiError::NotFound(what) => format!("Not found: {what}"),
                ApiError::Validation(_) => "That request could not be processed".to_string(),
                ApiError::Conflict(_) => {
                    "The bookstore rejected the change, please try again".to_string()
                }
                ApiError::Timeout(_) => "The bookstore took too long to respond".to_string(),
                _ => "The bookstore is unavailable right now".to_string(),
            },
            Self::NotFound(_) => self.to_string(),
        }
    }

    /// Log the error, capturing server errors to Sentry.
    pub fn report(&self) {
        let status = self.status();
        if status.is_server_error() {
            let event_id = sentry::capture_error(self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        } else {
            tracing::debug!(error = %self, status = %status, "Request rejected");
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        self.report();

        // Don't expose internal error details to clients
        (self.status(), self.public_message()).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Add a breadcrumb for customer actions.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of actions
/// leading up to an error.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("cart", "Added book to cart", Some(&[("book_id", "5")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}
