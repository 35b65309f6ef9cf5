//! Subscription billing.
//!
//! Checkout goes through hosted checkout links: the service records a pending
//! billing transaction and hands the client a link whose metadata carries the
//! transaction id back to us in the provider's webhooks.

use async_trait::async_trait;
use mongodb::bson::{doc, DateTime, Document};
use reqwest::{StatusCode, Url};
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use service_core::observability::TracedClientExt;
use service_core::utils::signature::verify_webhook;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use super::{Principal, ServiceError};
use crate::config::BillingConfig;
use crate::db::{collections, encode, get_as, DocumentStore};
use crate::models::{BillingTransaction, BillingTransactionStatus, Business};
use crate::utils::escape_html;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    Canceled,
    /// The provider no longer knows the subscription.
    AlreadyGone,
}

#[async_trait]
pub trait BillingProvider: Send + Sync {
    /// Hosted checkout URL for a checkout link with extra query parameters.
    fn checkout_url(&self, link_id: &str, params: &[(&str, &str)]) -> Result<String, ServiceError>;

    async fn cancel_subscription(&self, subscription_id: &str)
        -> Result<CancelOutcome, ServiceError>;
}

pub fn build_checkout_url(
    base: &str,
    link_id: &str,
    params: &[(&str, &str)],
) -> Result<String, ServiceError> {
    let mut url = Url::parse(&format!("{}/{}", base.trim_end_matches('/'), link_id))
        .map_err(|e| ServiceError::Internal(anyhow::anyhow!("Invalid checkout URL: {}", e)))?;
    {
        let mut query = url.query_pairs_mut();
        for (key, value) in params {
            query.append_pair(key, value);
        }
    }
    Ok(url.into())
}

/// Polar REST client.
#[derive(Clone)]
pub struct PolarClient {
    client: reqwest::Client,
    api_url: String,
    checkout_url: String,
    access_token: Secret<String>,
}

impl PolarClient {
    pub fn new(config: &BillingConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: config.api_url.trim_end_matches('/').to_string(),
            checkout_url: config.checkout_url.clone(),
            access_token: config.access_token.clone(),
        }
    }
}

#[async_trait]
impl BillingProvider for PolarClient {
    fn checkout_url(&self, link_id: &str, params: &[(&str, &str)]) -> Result<String, ServiceError> {
        build_checkout_url(&self.checkout_url, link_id, params)
    }

    async fn cancel_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<CancelOutcome, ServiceError> {
        let url = format!("{}/v1/subscriptions/{}", self.api_url, subscription_id);
        let response = self
            .client
            .traced_delete(&url)
            .bearer_auth(self.access_token.expose_secret())
            .header("Content-Type", "application/json")
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Billing provider request failed");
                ServiceError::Upstream(format!("Billing provider unreachable: {}", e))
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(CancelOutcome::Canceled);
        }
        if status == StatusCode::NOT_FOUND {
            return Ok(CancelOutcome::AlreadyGone);
        }

        let body = response.text().await.unwrap_or_default();
        tracing::error!(status = %status, body = %body, "Billing provider rejected cancellation");
        Err(ServiceError::Upstream(format!(
            "Billing provider returned {}: {}",
            status.as_u16(),
            body
        )))
    }
}

/// In-memory provider for tests and local runs.
#[derive(Default)]
pub struct MockBillingProvider {
    cancel_status: Option<u16>,
    canceled: Mutex<Vec<String>>,
}

impl MockBillingProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every cancellation with this HTTP status.
    pub fn responding_with(status: u16) -> Self {
        Self {
            cancel_status: Some(status),
            canceled: Mutex::new(Vec::new()),
        }
    }

    pub fn canceled(&self) -> Result<Vec<String>, anyhow::Error> {
        self.canceled
            .lock()
            .map(|c| c.clone())
            .map_err(|_| anyhow::anyhow!("mock billing lock poisoned"))
    }
}

#[async_trait]
impl BillingProvider for MockBillingProvider {
    fn checkout_url(&self, link_id: &str, params: &[(&str, &str)]) -> Result<String, ServiceError> {
        build_checkout_url("https://checkout.test", link_id, params)
    }

    async fn cancel_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<CancelOutcome, ServiceError> {
        self.canceled
            .lock()
            .map_err(|_| ServiceError::Internal(anyhow::anyhow!("mock billing lock poisoned")))?
            .push(subscription_id.to_string());

        match self.cancel_status {
            None => Ok(CancelOutcome::Canceled),
            Some(404) => Ok(CancelOutcome::AlreadyGone),
            Some(status) if (200..300).contains(&status) => Ok(CancelOutcome::Canceled),
            Some(status) => Err(ServiceError::Upstream(format!(
                "Billing provider returned {}",
                status
            ))),
        }
    }
}

/// Standard Webhooks headers of a delivery.
#[derive(Debug, Clone, Default)]
pub struct WebhookHeaders {
    pub id: Option<String>,
    pub timestamp: Option<String>,
    pub signature: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WebhookEvent {
    #[serde(rename = "type")]
    event_type: String,
    data: serde_json::Value,
}

/// The fields we read from order and subscription payloads.
#[derive(Debug, Default, Deserialize)]
struct ProviderObject {
    id: Option<String>,
    status: Option<String>,
    subscription_id: Option<String>,
    customer_id: Option<String>,
    product_id: Option<String>,
    #[serde(default)]
    metadata: HashMap<String, serde_json::Value>,
}

impl ProviderObject {
    fn metadata(&self, keys: &[&str]) -> Option<String> {
        keys.iter()
            .filter_map(|key| self.metadata.get(*key))
            .filter_map(|value| value.as_str())
            .map(str::trim)
            .find(|value| !value.is_empty())
            .map(str::to_string)
    }

    fn transaction_id(&self) -> Option<String> {
        self.metadata(&["transaction_id", "transactionId", "reference_id"])
    }

    fn business_id(&self) -> Option<String> {
        self.metadata(&["business_id", "businessId"])
    }
}

#[derive(Clone)]
pub struct BillingService {
    store: Arc<dyn DocumentStore>,
    provider: Arc<dyn BillingProvider>,
    plan_links: HashMap<String, String>,
    webhook_secret: Option<Secret<String>>,
}

impl BillingService {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        provider: Arc<dyn BillingProvider>,
        config: &BillingConfig,
    ) -> Self {
        Self {
            store,
            provider,
            plan_links: config
                .plan_links
                .iter()
                .map(|(plan, link)| (plan.to_lowercase(), link.clone()))
                .collect(),
            webhook_secret: config.webhook_secret.clone(),
        }
    }

    /// Record a pending transaction and return the hosted checkout URL.
    pub async fn create_checkout(
        &self,
        principal: &Principal,
        plan_id: &str,
        business_id: &str,
    ) -> Result<String, ServiceError> {
        let plan_id = plan_id.trim().to_lowercase();
        if plan_id.is_empty() || business_id.trim().is_empty() {
            return Err(ServiceError::Validation(
                "Missing planId or businessId".to_string(),
            ));
        }
        let link_id = self
            .plan_links
            .get(&plan_id)
            .ok_or_else(|| ServiceError::Validation("Invalid planId".to_string()))?;

        let business = self.owned_business(principal, business_id).await?;

        let transaction_id = Uuid::new_v4().to_string();
        let checkout_url = self.provider.checkout_url(
            link_id,
            &[
                ("customer_email", principal.email.as_str()),
                ("metadata[transaction_id]", transaction_id.as_str()),
                ("metadata[business_id]", business.id.as_str()),
                ("metadata[plan_id]", plan_id.as_str()),
                ("metadata[user_id]", principal.uid.as_str()),
            ],
        )?;

        let now = DateTime::now();
        let transaction = BillingTransaction {
            id: transaction_id,
            business_id: business.id.clone(),
            plan_id,
            user_id: principal.uid.clone(),
            status: BillingTransactionStatus::Pending,
            checkout_url: checkout_url.clone(),
            order_id: None,
            subscription_id: None,
            created_at: now,
            updated_at: now,
        };
        self.store
            .set(collections::TRANSACTIONS, &transaction.id, encode(&transaction)?)
            .await?;

        tracing::info!(
            transaction_id = %transaction.id,
            business_id = %transaction.business_id,
            plan_id = %transaction.plan_id,
            "Checkout created"
        );
        Ok(checkout_url)
    }

    pub async fn cancel_subscription(
        &self,
        principal: &Principal,
        business_id: &str,
    ) -> Result<(), ServiceError> {
        if business_id.trim().is_empty() {
            return Err(ServiceError::Validation("Missing businessId".to_string()));
        }
        let business = self.owned_business(principal, business_id).await?;

        let Some(subscription_id) = business
            .subscription
            .as_ref()
            .and_then(|s| s.external_subscription_id.clone())
        else {
            return Err(ServiceError::Validation(
                "No active subscription found to cancel".to_string(),
            ));
        };

        if self.provider.cancel_subscription(&subscription_id).await? == CancelOutcome::AlreadyGone {
            tracing::info!(
                business_id = %business.id,
                subscription_id = %subscription_id,
                "Subscription unknown to billing provider, canceling locally"
            );
        }

        let now = DateTime::now();
        self.store
            .update(
                collections::BUSINESSES,
                &business.id,
                doc! {
                    "subscription.status": "canceled",
                    "subscription.canceled_at": now,
                    "subscription.updated_at": now,
                },
            )
            .await?;

        tracing::info!(business_id = %business.id, subscription_id = %subscription_id, "Subscription canceled");
        Ok(())
    }

    /// Verify and apply a webhook delivery. Unknown event types are ignored.
    pub async fn handle_webhook(
        &self,
        headers: &WebhookHeaders,
        body: &[u8],
    ) -> Result<(), ServiceError> {
        self.verify_signature(headers, body)?;

        let event: WebhookEvent = serde_json::from_slice(body)
            .map_err(|_| ServiceError::Validation("Invalid payload".to_string()))?;
        if event.data.is_null() {
            return Err(ServiceError::Validation("Invalid payload".to_string()));
        }
        let payload: ProviderObject = serde_json::from_value(event.data)
            .map_err(|_| ServiceError::Validation("Invalid payload".to_string()))?;

        metrics::counter!("pos_billing_webhooks_total", "event" => event.event_type.clone())
            .increment(1);
        tracing::info!(event_type = %event.event_type, "Billing webhook received");

        if event.event_type == "order.paid" {
            self.handle_order_paid(&payload).await
        } else if event.event_type.starts_with("subscription.") {
            self.handle_subscription_update(&payload).await
        } else {
            tracing::debug!(event_type = %event.event_type, "Ignoring billing event");
            Ok(())
        }
    }

    fn verify_signature(&self, headers: &WebhookHeaders, body: &[u8]) -> Result<(), ServiceError> {
        let Some(secret) = &self.webhook_secret else {
            return Ok(());
        };

        let (Some(id), Some(timestamp), Some(signature)) =
            (&headers.id, &headers.timestamp, &headers.signature)
        else {
            tracing::warn!("Webhook delivery without signature headers");
            return Err(ServiceError::InvalidSignature(
                "missing signature headers".to_string(),
            ));
        };

        verify_webhook(
            secret.expose_secret(),
            id,
            timestamp,
            signature,
            body,
            chrono::Utc::now().timestamp(),
        )
        .map_err(|e| {
            tracing::warn!(webhook_id = %id, error = %e, "Webhook signature rejected");
            ServiceError::InvalidSignature(e.to_string())
        })
    }

    /// Complete the transaction, then activate the plan. A failure in the
    /// second step is logged and the delivery still acknowledged.
    async fn handle_order_paid(&self, order: &ProviderObject) -> Result<(), ServiceError> {
        let Some(transaction_id) = order.transaction_id() else {
            tracing::warn!(order_id = ?order.id, "Paid order without transaction metadata");
            return Ok(());
        };

        let Some(transaction) = get_as::<BillingTransaction>(
            self.store.as_ref(),
            collections::TRANSACTIONS,
            &transaction_id,
        )
        .await?
        else {
            tracing::warn!(transaction_id = %transaction_id, "Paid order for unknown transaction");
            return Ok(());
        };

        let mut fields = doc! {
            "status": "completed",
            "updated_at": DateTime::now(),
        };
        if let Some(order_id) = &order.id {
            fields.insert("order_id", order_id.as_str());
        }
        if let Some(subscription_id) = &order.subscription_id {
            fields.insert("subscription_id", subscription_id.as_str());
        }
        self.store
            .update(collections::TRANSACTIONS, &transaction.id, fields)
            .await?;

        let mut subscription = doc! {
            "subscription.plan": transaction.plan_id.as_str(),
            "subscription.status": "active",
        };
        append_external_ids(&mut subscription, order.subscription_id.as_deref(), order);
        self.update_subscription(&transaction.business_id, subscription)
            .await;

        tracing::info!(
            transaction_id = %transaction.id,
            business_id = %transaction.business_id,
            plan_id = %transaction.plan_id,
            "Order paid"
        );
        Ok(())
    }

    async fn handle_subscription_update(
        &self,
        subscription: &ProviderObject,
    ) -> Result<(), ServiceError> {
        let business_id = match subscription.business_id() {
            Some(id) => Some(id),
            None => match subscription.transaction_id() {
                Some(transaction_id) => get_as::<BillingTransaction>(
                    self.store.as_ref(),
                    collections::TRANSACTIONS,
                    &transaction_id,
                )
                .await?
                .map(|t| t.business_id),
                None => None,
            },
        };

        let Some(business_id) = business_id else {
            tracing::warn!(subscription_id = ?subscription.id, "Subscription event without a business");
            return Ok(());
        };

        let mut fields = Document::new();
        if let Some(status) = &subscription.status {
            fields.insert("subscription.status", status.as_str());
        }
        append_external_ids(&mut fields, subscription.id.as_deref(), subscription);
        self.update_subscription(&business_id, fields).await;
        Ok(())
    }

    async fn update_subscription(&self, business_id: &str, mut fields: Document) {
        fields.insert("subscription.updated_at", DateTime::now());
        match self
            .store
            .update(collections::BUSINESSES, business_id, fields)
            .await
        {
            Ok(true) => tracing::info!(business_id = %business_id, "Business subscription updated"),
            Ok(false) => {
                tracing::error!(business_id = %business_id, "Subscription update for unknown business")
            }
            Err(e) => tracing::error!(
                business_id = %business_id,
                error = %e,
                "Failed to update business subscription"
            ),
        }
    }

    /// Existence first, then ownership.
    async fn owned_business(
        &self,
        principal: &Principal,
        business_id: &str,
    ) -> Result<Business, ServiceError> {
        let business: Business =
            get_as(self.store.as_ref(), collections::BUSINESSES, business_id.trim())
                .await?
                .ok_or_else(|| ServiceError::NotFound("Business not found".to_string()))?;
        if business.owner_id != principal.uid {
            tracing::warn!(user_id = %principal.uid, business_id = %business.id, "Billing change by non-owner");
            return Err(ServiceError::Forbidden(
                "Only the business owner can perform this action".to_string(),
            ));
        }
        Ok(business)
    }
}

fn append_external_ids(fields: &mut Document, subscription_id: Option<&str>, object: &ProviderObject) {
    if let Some(id) = subscription_id {
        fields.insert("subscription.external_subscription_id", id);
    }
    if let Some(customer_id) = &object.customer_id {
        fields.insert("subscription.customer_id", customer_id.as_str());
    }
    if let Some(product_id) = &object.product_id {
        fields.insert("subscription.product_id", product_id.as_str());
    }
}

/// Page the provider redirects to after a successful checkout.
pub fn payment_success_page(checkout_id: Option<&str>) -> String {
    let checkout_id = checkout_id
        .filter(|id| !id.is_empty())
        .map(escape_html)
        .unwrap_or_else(|| "N/A".to_string());

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1.0" />
  <title>Payment Successful</title>
  <style>
    body {{ font-family: system-ui; display: flex; justify-content: center; align-items: center; height: 100vh; background: #f0fdf4; }}
    .card {{ background: white; padding: 40px; border-radius: 12px; box-shadow: 0 4px 6px rgba(0,0,0,0.1); text-align: center; }}
    h1 {{ color: #16a34a; }}
  </style>
</head>
<body>
  <div class="card">
    <h1>Payment Successful</h1>
    <p>Your subscription has been activated.</p>
    <p><small>Checkout ID: {checkout_id}</small></p>
    <button onclick="window.close()" style="margin-top:20px; padding: 10px 20px; cursor:pointer;">Close Window</button>
  </div>
</body>
</html>
"#
    )
}
