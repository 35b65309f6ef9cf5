use axum::http::StatusCode;
use serde_json::json;
use service_core::error::AppError;
use thiserror::Error;

use super::sales::LineItemFailure;
use crate::db::StoreError;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Email already registered")]
    EmailAlreadyRegistered,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Invalid webhook signature: {0}")]
    InvalidSignature(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Validation(String),

    #[error("{resource} limit reached for the {plan} plan ({current_usage}/{limit})")]
    QuotaExceeded {
        plan: String,
        resource: String,
        current_usage: u64,
        limit: u64,
    },

    #[error("{resource} is not available on the {plan} plan")]
    FeatureUnavailable { plan: String, resource: String },

    #[error("Sale rejected")]
    SaleRejected(Vec<LineItemFailure>),

    #[error("Sale total {provided:.2} does not match line items total {computed:.2}")]
    TotalMismatch { provided: f64, computed: f64 },

    #[error("Sale could not be committed after {attempts} attempts")]
    TransactionContention { attempts: u32 },

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Email error: {0}")]
    Email(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Store(StoreError::Conflict(msg)) => {
                AppError::Conflict(anyhow::anyhow!("Concurrent update, please retry: {}", msg))
            }
            ServiceError::Store(StoreError::NotFound { collection, id }) => {
                AppError::NotFound(anyhow::anyhow!("{}/{} not found", collection, id))
            }
            ServiceError::Store(e) => AppError::DatabaseError(anyhow::Error::new(e)),
            ServiceError::Internal(e) => AppError::InternalError(e),
            ServiceError::InvalidCredentials => {
                AppError::AuthError(anyhow::anyhow!("Invalid credentials"))
            }
            ServiceError::EmailAlreadyRegistered => {
                AppError::Conflict(anyhow::anyhow!("Email already registered"))
            }
            ServiceError::InvalidToken => {
                AppError::AuthError(anyhow::anyhow!("Invalid or expired token"))
            }
            ServiceError::InvalidSignature(msg) => {
                AppError::Unauthorized(anyhow::anyhow!("Invalid webhook signature: {}", msg))
            }
            ServiceError::NotFound(msg) => AppError::NotFound(anyhow::anyhow!(msg)),
            ServiceError::Forbidden(msg) => AppError::Forbidden(anyhow::anyhow!(msg)),
            ServiceError::Conflict(msg) => AppError::Conflict(anyhow::anyhow!(msg)),
            ServiceError::Validation(msg) => AppError::BadRequest(anyhow::anyhow!(msg)),
            ServiceError::QuotaExceeded {
                plan,
                resource,
                current_usage,
                limit,
            } => {
                let message = format!(
                    "{} limit reached for the {} plan ({}/{})",
                    resource, plan, current_usage, limit
                );
                AppError::Rejected {
                    status: StatusCode::FORBIDDEN,
                    message,
                    details: json!({
                        "plan": plan,
                        "resource": resource,
                        "currentUsage": current_usage,
                        "limit": limit,
                    }),
                }
            }
            ServiceError::FeatureUnavailable { plan, resource } => AppError::Rejected {
                status: StatusCode::FORBIDDEN,
                message: format!("{} is not available on the {} plan", resource, plan),
                details: json!({ "plan": plan, "resource": resource }),
            },
            ServiceError::SaleRejected(failures) => {
                let status = sale_rejection_status(&failures);
                let message = failures
                    .first()
                    .map(|f| format!("Sale rejected: {}", f))
                    .unwrap_or_else(|| "Sale rejected".to_string());
                AppError::Rejected {
                    status,
                    message,
                    details: json!({ "failures": failures }),
                }
            }
            ServiceError::TotalMismatch { provided, computed } => AppError::Rejected {
                status: StatusCode::UNPROCESSABLE_ENTITY,
                message: format!(
                    "Sale total {:.2} does not match line items total {:.2}",
                    provided, computed
                ),
                details: json!({ "providedTotal": provided, "computedTotal": computed }),
            },
            ServiceError::TransactionContention { attempts } => AppError::ServiceUnavailable(
                format!(
                    "Sale could not be committed after {} attempts due to concurrent updates",
                    attempts
                ),
                Some(1),
            ),
            ServiceError::Upstream(msg) => AppError::BadGateway(msg),
            ServiceError::Email(msg) => AppError::EmailError(msg),
        }
    }
}

/// Cross-tenant access outranks missing products, which outrank stock shortfalls.
fn sale_rejection_status(failures: &[LineItemFailure]) -> StatusCode {
    if failures
        .iter()
        .any(|f| matches!(f, LineItemFailure::CrossTenantAccess { .. }))
    {
        StatusCode::FORBIDDEN
    } else if failures
        .iter()
        .any(|f| matches!(f, LineItemFailure::ProductNotFound { .. }))
    {
        StatusCode::NOT_FOUND
    } else {
        StatusCode::CONFLICT
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::response::IntoResponse;

    #[test]
    fn sale_rejection_status_prefers_cross_tenant_then_missing() {
        let stock = LineItemFailure::InsufficientStock {
            product_id: "a".into(),
            available: 1,
            requested: 2,
        };
        let missing = LineItemFailure::ProductNotFound {
            product_id: "b".into(),
        };
        let foreign = LineItemFailure::CrossTenantAccess {
            product_id: "c".into(),
        };

        assert_eq!(sale_rejection_status(&[stock.clone()]), StatusCode::CONFLICT);
        assert_eq!(
            sale_rejection_status(&[stock.clone(), missing.clone()]),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            sale_rejection_status(&[missing, stock, foreign]),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn contention_maps_to_service_unavailable() {
        let response =
            AppError::from(ServiceError::TransactionContention { attempts: 5 }).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
