use mongodb::bson::DateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BusinessSettings {
    pub currency: String,
    pub timezone: String,
}

impl Default for BusinessSettings {
    fn default() -> Self {
        Self {
            currency: "USD".to_string(),
            timezone: "UTC".to_string(),
        }
    }
}

/// Billing state of a tenant, written by the subscription webhook.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Subscription {
    pub plan: Option<String>,
    pub status: Option<String>,
    pub external_subscription_id: Option<String>,
    pub customer_id: Option<String>,
    pub product_id: Option<String>,
    pub updated_at: Option<DateTime>,
    pub canceled_at: Option<DateTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Business {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub contact: String,
    #[serde(rename = "type")]
    pub business_type: String,
    pub owner_id: String,
    pub status: String,
    #[serde(default)]
    pub settings: BusinessSettings,
    /// Left out of the document until billing writes it, so dotted updates
    /// can create it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription: Option<Subscription>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}
