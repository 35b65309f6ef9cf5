use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::Html,
    Json,
};
use service_core::error::AppError;
use service_core::utils::signature::{
    WEBHOOK_ID_HEADER, WEBHOOK_SIGNATURE_HEADER, WEBHOOK_TIMESTAMP_HEADER,
};

use crate::{
    dtos::{
        subscription::{
            CancelSubscriptionRequest, CheckoutResponse, CreateCheckoutRequest,
            PaymentSuccessQuery,
        },
        MessageResponse,
    },
    middleware::AuthUser,
    services::billing::{payment_success_page, WebhookHeaders},
    AppState,
};

pub async fn create_checkout(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Json(req): Json<CreateCheckoutRequest>,
) -> Result<Json<CheckoutResponse>, AppError> {
    let checkout_url = state
        .billing
        .create_checkout(&principal, &req.plan_id, &req.business_id)
        .await?;
    Ok(Json(CheckoutResponse { checkout_url }))
}

pub async fn cancel_subscription(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Json(req): Json<CancelSubscriptionRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    state
        .billing
        .cancel_subscription(&principal, &req.business_id)
        .await?;
    Ok(Json(MessageResponse::new("Subscription canceled successfully")))
}

/// Billing provider callback. The raw body is needed for the signature.
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, &'static str), AppError> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    let webhook_headers = WebhookHeaders {
        id: header(WEBHOOK_ID_HEADER),
        timestamp: header(WEBHOOK_TIMESTAMP_HEADER),
        signature: header(WEBHOOK_SIGNATURE_HEADER),
    };

    state.billing.handle_webhook(&webhook_headers, &body).await?;
    Ok((StatusCode::OK, "Webhook processed"))
}

pub async fn payment_success(Query(query): Query<PaymentSuccessQuery>) -> Html<String> {
    Html(payment_success_page(query.checkout_id.as_deref()))
}
