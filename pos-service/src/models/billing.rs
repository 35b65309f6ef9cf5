use mongodb::bson::DateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BillingTransactionStatus {
    Pending,
    Completed,
}

/// A checkout initiated by a business owner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingTransaction {
    #[serde(rename = "_id")]
    pub id: String,
    pub business_id: String,
    pub plan_id: String,
    pub user_id: String,
    pub status: BillingTransactionStatus,
    pub checkout_url: String,
    pub order_id: Option<String>,
    pub subscription_id: Option<String>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}
