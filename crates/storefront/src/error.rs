//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures errors to Sentry before
//! responding to the client. All route handlers should return `Result<T, AppError>`.
//!
//! Error bodies are JSON: `{"error": "..."}`, plus `missing` for an incomplete
//! checkout profile and `code`/`paymentIntentId` when a paid order needs
//! manual reconciliation.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use sole_core::profile::ProfileField;

use crate::db::RepositoryError;
use crate::services::auth::AuthError;
use crate::services::cart::CartError;
use crate::services::checkout::CheckoutError;
use crate::services::reviews::ReviewError;

/// Application-level error type for the storefront.
#[derive(Debug, Error)]
pub enum AppError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    /// Authentication operation failed.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// Cart change rejected.
    #[error("Cart error: {0}")]
    Cart(#[from] CartError),

    /// Checkout step failed.
    #[error("Checkout error: {0}")]
    Checkout(#[from] CheckoutError),

    /// Review rejected.
    #[error("Review error: {0}")]
    Review(#[from] ReviewError),

    /// Session store failure.
    #[error("Session error: {0}")]
    Session(#[from] tower_sessions::session::Error),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    missing: Vec<ProfileField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    payment_intent_id: Option<String>,
}

impl ErrorBody {
    fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            missing: Vec::new(),
            code: None,
            payment_intent_id: None,
        }
    }
}

impl AppError {
    /// Whether this is a server-side failure worth capturing.
    fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::Database(_)
                | Self::Session(_)
                | Self::Auth(AuthError::Repository(_) | AuthError::PasswordHash)
                | Self::Cart(CartError::Repository(_))
                | Self::Checkout(CheckoutError::Repository(_))
                | Self::Review(ReviewError::Repository(_))
        )
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::Database(_) | Self::Session(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Auth(err) => match err {
                AuthError::InvalidCredentials | AuthError::UserNotFound => StatusCode::UNAUTHORIZED,
                AuthError::UserAlreadyExists => StatusCode::CONFLICT,
                AuthError::WeakPassword(_) | AuthError::InvalidEmail(_) => StatusCode::BAD_REQUEST,
                AuthError::EmailMismatch => StatusCode::FORBIDDEN,
                AuthError::Repository(_) | AuthError::PasswordHash => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            Self::Cart(err) => match err {
                CartError::UnknownProduct(_) => StatusCode::NOT_FOUND,
                CartError::UnavailableSize { .. } | CartError::InvalidQuantity => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                CartError::OutOfStock { .. } => StatusCode::CONFLICT,
                CartError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Checkout(err) => match err {
                CheckoutError::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                CheckoutError::GatewayUnavailable(_) => StatusCode::BAD_GATEWAY,
                CheckoutError::PaymentFailed(_) => StatusCode::PAYMENT_REQUIRED,
                CheckoutError::NotFound(_) => StatusCode::NOT_FOUND,
                CheckoutError::Reconciliation { .. } | CheckoutError::Repository(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            Self::Review(err) => match err {
                ReviewError::UnknownProduct(_) => StatusCode::NOT_FOUND,
                ReviewError::InvalidRating | ReviewError::InvalidComment => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                ReviewError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }

    // Don't expose internal error details to clients
    fn body(self) -> ErrorBody {
        if self.is_server_error() {
            return ErrorBody::new("Internal server error");
        }

        match self {
            Self::Auth(err) => ErrorBody::new(match err {
                AuthError::InvalidCredentials | AuthError::UserNotFound => {
                    "Invalid credentials".to_string()
                }
                AuthError::UserAlreadyExists => {
                    "An account with this email already exists".to_string()
                }
                AuthError::WeakPassword(msg) => msg,
                AuthError::InvalidEmail(_) => "Invalid email address".to_string(),
                other => other.to_string(),
            }),
            Self::Checkout(CheckoutError::Validation { message, missing }) => ErrorBody {
                missing,
                ..ErrorBody::new(message)
            },
            // Gateway messages are shown to the shopper as-is.
            Self::Checkout(CheckoutError::GatewayUnavailable(message)) => ErrorBody::new(message),
            Self::Checkout(CheckoutError::PaymentFailed(message)) => ErrorBody::new(message),
            Self::Checkout(CheckoutError::Reconciliation {
                payment_intent_id, ..
            }) => ErrorBody {
                code: Some("reconciliation_required"),
                payment_intent_id: Some(payment_intent_id),
                ..ErrorBody::new(
                    "Your payment was received but we could not record your order. \
                     Our team has been notified and will follow up.",
                )
            },
            Self::Checkout(err) => ErrorBody::new(err.to_string()),
            Self::Cart(err) => ErrorBody::new(err.to_string()),
            Self::Review(err) => ErrorBody::new(err.to_string()),
            other => ErrorBody::new(other.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Capture server errors to Sentry
        if self.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        } else if let Self::Checkout(CheckoutError::Reconciliation {
            payment_intent_id, ..
        }) = &self
        {
            // Captured with its reconciliation tag where it was raised.
            tracing::error!(payment_intent_id = %payment_intent_id, "Responding with reconciliation error");
        }

        let status = self.status();
        (status, Json(self.body())).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context from a user ID.
///
/// Call this after successful authentication to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
///
/// Call this on logout to stop associating errors with the user.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

/// Add a breadcrumb for user actions.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of user actions
/// leading up to an error.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("cart", "Added to cart", Some(&[("product_id", "3")]));
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

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::body::to_bytes;
    use sole_core::ProductId;

    use super::*;

    fn get_status(err: AppError) -> StatusCode {
        err.into_response().status()
    }

    async fn get_body(err: AppError) -> serde_json::Value {
        let bytes = to_bytes(err.into_response().into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_app_error_display() {
        let err = AppError::NotFound("product-123".to_string());
        assert_eq!(err.to_string(), "Not found: product-123");

        let err: AppError = CartError::InvalidQuantity.into();
        assert_eq!(err.to_string(), "Cart error: quantity must be at least 1");
    }

    #[test]
    fn test_app_error_status_codes() {
        assert_eq!(
            get_status(AppError::NotFound("test".to_string())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            get_status(AuthError::InvalidCredentials.into()),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            get_status(AuthError::PasswordHash.into()),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            get_status(
                CartError::OutOfStock {
                    product_id: ProductId::new(1),
                    size: "9".parse().unwrap(),
                }
                .into()
            ),
            StatusCode::CONFLICT
        );
        assert_eq!(
            get_status(CheckoutError::PaymentFailed("declined".to_string()).into()),
            StatusCode::PAYMENT_REQUIRED
        );
        assert_eq!(
            get_status(CheckoutError::GatewayUnavailable("timed out".to_string()).into()),
            StatusCode::BAD_GATEWAY
        );
    }

    #[tokio::test]
    async fn test_validation_body_lists_missing_fields() {
        let body = get_body(
            CheckoutError::Validation {
                message: "profile is incomplete".to_string(),
                missing: vec![ProfileField::DateOfBirth],
            }
            .into(),
        )
        .await;

        assert_eq!(body["error"], "profile is incomplete");
        assert_eq!(body["missing"], serde_json::json!(["dob"]));
    }

    #[tokio::test]
    async fn test_reconciliation_body_is_distinct() {
        let err: AppError = CheckoutError::Reconciliation {
            payment_intent_id: "pi_123".to_string(),
            reason: "connection refused".to_string(),
        }
        .into();
        assert_eq!(get_status_ref(&err), StatusCode::INTERNAL_SERVER_ERROR);

        let body = get_body(err).await;
        assert_eq!(body["code"], "reconciliation_required");
        assert_eq!(body["paymentIntentId"], "pi_123");
        assert!(!body["error"].as_str().unwrap().contains("connection refused"));
    }

    #[tokio::test]
    async fn test_database_errors_are_not_leaked() {
        let body = get_body(AppError::Database(RepositoryError::DataCorruption(
            "bad row in storefront.order".to_string(),
        )))
        .await;
        assert_eq!(body["error"], "Internal server error");
    }

    fn get_status_ref(err: &AppError) -> StatusCode {
        err.status()
    }
}
