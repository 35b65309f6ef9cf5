//! Tenant context for catalog and sales routes.
//!
//! The business comes from the verified token claims only. A token issued
//! before its owner created or joined a business carries none, and the
//! client has to refresh it first.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use service_core::error::AppError;

use crate::services::{Principal, TenantScope};

#[derive(Debug, Clone)]
pub struct TenantContext(pub TenantScope);

#[async_trait]
impl<S> FromRequestParts<S> for TenantContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let principal = parts
            .extensions
            .get::<Principal>()
            .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Authentication required")))?;

        let scope = TenantScope::from_claims(principal).ok_or_else(|| {
            tracing::debug!(user_id = %principal.uid, "Token carries no business claim");
            AppError::Forbidden(anyhow::anyhow!(
                "No business associated with this account. Create a business or refresh your token."
            ))
        })?;

        let span = tracing::Span::current();
        span.record("business_id", scope.business_id.as_str());
        span.record("user_id", scope.user_id.as_str());

        Ok(TenantContext(scope))
    }
}
