use axum::{
    Json,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;

/// Error returned by every HTTP handler. Renders as `{"error", "details"?}`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    ValidationError(#[from] validator::ValidationErrors),

    #[error("Bad request: {0}")]
    BadRequest(anyhow::Error),

    #[error("Not found: {0}")]
    NotFound(anyhow::Error),

    #[error("Unauthorized: {0}")]
    Unauthorized(anyhow::Error),

    #[error("Forbidden: {0}")]
    Forbidden(anyhow::Error),

    /// Rejected credentials or tokens.
    #[error("Authentication error: {0}")]
    AuthError(anyhow::Error),

    #[error("Conflict: {0}")]
    Conflict(anyhow::Error),

    /// A request refused for a domain reason, with structured details for the caller.
    #[error("{message}")]
    Rejected {
        status: StatusCode,
        message: String,
        details: Value,
    },

    #[error("Internal server error: {0}")]
    InternalError(#[from] anyhow::Error),

    /// A third-party provider failed. The message is passed on as details.
    #[error("Bad gateway: {0}")]
    BadGateway(String),

    /// Temporary refusal; the second field becomes `Retry-After` in seconds.
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String, Option<u64>),

    #[error("Database error: {0}")]
    DatabaseError(anyhow::Error),

    #[error("Email error: {0}")]
    EmailError(String),

    #[error("Configuration error: {0}")]
    ConfigError(anyhow::Error),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(anyhow::Error::new(err))
    }
}

impl From<lettre::error::Error> for AppError {
    fn from(err: lettre::error::Error) -> Self {
        AppError::EmailError(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::InternalError(anyhow::Error::new(err))
    }
}

impl From<mongodb::error::Error> for AppError {
    fn from(err: mongodb::error::Error) -> Self {
        AppError::DatabaseError(anyhow::Error::new(err))
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized(_) | AppError::AuthError(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Rejected { status, .. } => *status,
            AppError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            AppError::ServiceUnavailable(..) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::InternalError(_)
            | AppError::DatabaseError(_)
            | AppError::EmailError(_)
            | AppError::ConfigError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Client-facing message and details. Server faults are logged here and
    /// their internals kept out of the body.
    fn into_body(self) -> ErrorResponse {
        let (error, details) = match self {
            AppError::ValidationError(errors) => {
                ("Validation error".to_string(), Some(field_messages(&errors)))
            }
            AppError::BadRequest(err)
            | AppError::NotFound(err)
            | AppError::Unauthorized(err)
            | AppError::Forbidden(err)
            | AppError::AuthError(err)
            | AppError::Conflict(err) => (err.to_string(), None),
            AppError::Rejected {
                message, details, ..
            } => (message, Some(details)),
            AppError::BadGateway(msg) => {
                tracing::warn!(error = %msg, "Upstream provider error");
                ("Upstream service error".to_string(), Some(Value::String(msg)))
            }
            AppError::ServiceUnavailable(msg, _) => (msg, None),
            AppError::InternalError(err) => {
                tracing::error!(error = ?err, "Internal server error");
                ("Internal server error".to_string(), None)
            }
            AppError::DatabaseError(err) => {
                tracing::error!(error = %err, "Database error");
                ("Database error".to_string(), None)
            }
            AppError::EmailError(msg) => {
                tracing::error!(error = %msg, "Email delivery failed");
                ("Email error".to_string(), None)
            }
            AppError::ConfigError(err) => {
                tracing::error!(error = %err, "Configuration error");
                ("Configuration error".to_string(), None)
            }
        };
        ErrorResponse { error, details }
    }
}

/// `{"field": ["message", ...]}` for every failed rule.
fn field_messages(errors: &validator::ValidationErrors) -> Value {
    let fields: serde_json::Map<String, Value> = errors
        .field_errors()
        .into_iter()
        .map(|(field, errs)| {
            let messages: Vec<String> = errs
                .iter()
                .map(|e| {
                    e.message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| e.code.to_string())
                })
                .collect();
            (field.to_string(), json!(messages))
        })
        .collect();

    if fields.is_empty() {
        Value::String(errors.to_string())
    } else {
        Value::Object(fields)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let retry_after = match &self {
            AppError::ServiceUnavailable(_, retry) => *retry,
            _ => None,
        };

        let mut res = (status, Json(self.into_body())).into_response();
        if let Some(retry) = retry_after {
            res.headers_mut().insert(header::RETRY_AFTER, retry.into());
        }
        res
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    #[derive(Validate)]
    struct Signup {
        #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
        password: String,
    }

    #[test]
    fn rejected_keeps_status_and_retry_after_is_set_for_unavailable() {
        let rejected = AppError::Rejected {
            status: StatusCode::CONFLICT,
            message: "Insufficient stock".to_string(),
            details: json!({ "failures": [] }),
        }
        .into_response();
        assert_eq!(rejected.status(), StatusCode::CONFLICT);

        let unavailable =
            AppError::ServiceUnavailable("try again".to_string(), Some(1)).into_response();
        assert_eq!(unavailable.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            unavailable
                .headers()
                .get(header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok()),
            Some("1")
        );
    }

    #[test]
    fn validation_details_list_messages_per_field() {
        let errors = Signup {
            password: "123".to_string(),
        }
        .validate()
        .unwrap_err();

        let body = AppError::from(errors).into_body();
        assert_eq!(body.error, "Validation error");
        assert_eq!(
            body.details,
            Some(json!({ "password": ["Password must be at least 6 characters"] }))
        );
    }

    #[test]
    fn server_faults_hide_internals() {
        let body = AppError::DatabaseError(anyhow::anyhow!("connection reset by peer")).into_body();
        assert_eq!(body.error, "Database error");
        assert!(body.details.is_none());
    }
}
