use serde::{Deserialize, Serialize};

/// Fields are checked by the billing service so that a missing value gets
/// its own message instead of a generic parse error.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCheckoutRequest {
    #[serde(default)]
    pub plan_id: String,
    #[serde(default)]
    pub business_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub checkout_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelSubscriptionRequest {
    #[serde(default)]
    pub business_id: String,
}

#[derive(Debug, Deserialize)]
pub struct PaymentSuccessQuery {
    pub checkout_id: Option<String>,
}
