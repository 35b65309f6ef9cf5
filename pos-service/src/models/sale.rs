use mongodb::bson::DateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LineItem {
    pub product_id: String,
    pub quantity: i64,
    pub price: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SaleStatus {
    Completed,
}

/// A recorded sale. Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sale {
    #[serde(rename = "_id")]
    pub id: String,
    pub business_id: String,
    pub user_id: String,
    pub customer_id: Option<String>,
    pub items: Vec<LineItem>,
    pub total: f64,
    pub payment_method: String,
    pub status: SaleStatus,
    pub created_at: DateTime,
}
