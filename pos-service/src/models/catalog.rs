use mongodb::bson::DateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub description: String,
    pub color: String,
    pub business_id: String,
    pub status: String,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub category_id: Option<String>,
    pub price: f64,
    pub stock: i64,
    pub details: String,
    pub business_id: String,
    pub status: String,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}
