use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::models::{LineItem, Sale, SaleStatus};
use crate::services::NewSale;

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LineItemDto {
    #[validate(
        length(min = 1, message = "productId is required"),
        custom(function = "not_blank")
    )]
    pub product_id: String,
    #[validate(range(min = 1, message = "quantity must be greater than 0"))]
    pub quantity: i64,
    #[validate(range(min = 0.0, message = "price must be a non-negative number"))]
    pub price: f64,
}

fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank").with_message("productId is required".into()));
    }
    Ok(())
}

impl From<LineItemDto> for LineItem {
    fn from(item: LineItemDto) -> Self {
        Self {
            product_id: item.product_id,
            quantity: item.quantity,
            price: item.price,
        }
    }
}

impl From<LineItem> for LineItemDto {
    fn from(item: LineItem) -> Self {
        Self {
            product_id: item.product_id,
            quantity: item.quantity,
            price: item.price,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateSaleRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "Items array is required"), nested)]
    pub items: Vec<LineItemDto>,
    pub total: Option<f64>,
    pub payment_method: Option<String>,
    pub customer_id: Option<String>,
}

impl From<CreateSaleRequest> for NewSale {
    fn from(req: CreateSaleRequest) -> Self {
        Self {
            items: req.items.into_iter().map(Into::into).collect(),
            total: req.total,
            payment_method: req.payment_method,
            customer_id: req.customer_id,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SalesQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleResponse {
    pub id: String,
    pub business_id: String,
    pub user_id: String,
    pub customer_id: Option<String>,
    pub items: Vec<LineItemDto>,
    pub total: f64,
    pub payment_method: String,
    pub status: SaleStatus,
    pub created_at: DateTime<Utc>,
}

impl From<Sale> for SaleResponse {
    fn from(s: Sale) -> Self {
        Self {
            id: s.id,
            business_id: s.business_id,
            user_id: s.user_id,
            customer_id: s.customer_id,
            items: s.items.into_iter().map(Into::into).collect(),
            total: s.total,
            payment_method: s.payment_method,
            status: s.status,
            created_at: s.created_at.to_chrono(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CreateSaleResponse {
    pub message: String,
    pub sale: SaleResponse,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(items: serde_json::Value) -> CreateSaleRequest {
        serde_json::from_value(json!({ "items": items })).unwrap()
    }

    #[test]
    fn malformed_items_fail_validation() {
        for items in [
            json!([]),
            json!([{ "productId": "p1", "quantity": 0, "price": 1.0 }]),
            json!([{ "productId": "p1", "quantity": -2, "price": 1.0 }]),
            json!([{ "productId": "p1", "quantity": 1, "price": -0.5 }]),
            json!([{ "productId": "   ", "quantity": 1, "price": 1.0 }]),
        ] {
            assert!(request(items.clone()).validate().is_err(), "{}", items);
        }
    }

    #[test]
    fn free_items_are_valid() {
        let req = request(json!([{ "productId": "p1", "quantity": 2, "price": 0.0 }]));
        assert!(req.validate().is_ok());
    }
}
