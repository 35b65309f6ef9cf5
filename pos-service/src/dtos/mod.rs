//! Request and response bodies. JSON on the wire is camelCase.

pub mod auth;
pub mod business;
pub mod catalog;
pub mod sales;
pub mod subscription;

use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Bulk delete body shared by categories and products.
#[derive(Debug, serde::Deserialize, validator::Validate)]
pub struct BulkDeleteRequest {
    #[validate(length(min = 1, message = "ids must be a non-empty array"))]
    pub ids: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct BulkDeleteResponse {
    pub message: String,
    pub deleted: usize,
}
