use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::{Business, BusinessSettings, Subscription};
use crate::services::business::{BusinessUpdate, NewBusiness};

#[derive(Debug, Deserialize, Validate)]
pub struct CreateBusinessRequest {
    #[validate(length(min = 1, max = 200, message = "Business name is required"))]
    pub name: String,
    pub address: Option<String>,
    pub contact: Option<String>,
    #[serde(rename = "type")]
    pub business_type: Option<String>,
}

impl From<CreateBusinessRequest> for NewBusiness {
    fn from(req: CreateBusinessRequest) -> Self {
        Self {
            name: req.name,
            address: req.address,
            contact: req.contact,
            business_type: req.business_type,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct SettingsRequest {
    #[validate(length(equal = 3, message = "Currency must be a 3-letter code"))]
    pub currency: String,
    #[validate(length(min = 1, message = "Timezone is required"))]
    pub timezone: String,
}

/// Only these fields are client-writable; anything else in the body is ignored.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateBusinessRequest {
    #[validate(length(min = 1, max = 200, message = "Business name must be 1-200 characters"))]
    pub name: Option<String>,
    pub address: Option<String>,
    pub contact: Option<String>,
    #[serde(rename = "type")]
    pub business_type: Option<String>,
    #[validate(nested)]
    pub settings: Option<SettingsRequest>,
}

impl From<UpdateBusinessRequest> for BusinessUpdate {
    fn from(req: UpdateBusinessRequest) -> Self {
        Self {
            name: req.name,
            address: req.address,
            contact: req.contact,
            business_type: req.business_type,
            settings: req.settings.map(|s| BusinessSettings {
                currency: s.currency.to_uppercase(),
                timezone: s.timezone,
            }),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionResponse {
    pub plan: Option<String>,
    pub status: Option<String>,
    pub external_subscription_id: Option<String>,
    pub customer_id: Option<String>,
    pub product_id: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
    pub canceled_at: Option<DateTime<Utc>>,
}

impl From<Subscription> for SubscriptionResponse {
    fn from(s: Subscription) -> Self {
        Self {
            plan: s.plan,
            status: s.status,
            external_subscription_id: s.external_subscription_id,
            customer_id: s.customer_id,
            product_id: s.product_id,
            updated_at: s.updated_at.map(|d| d.to_chrono()),
            canceled_at: s.canceled_at.map(|d| d.to_chrono()),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessResponse {
    pub id: String,
    pub name: String,
    pub address: String,
    pub contact: String,
    #[serde(rename = "type")]
    pub business_type: String,
    pub owner_id: String,
    pub status: String,
    pub settings: BusinessSettings,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription: Option<SubscriptionResponse>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Business> for BusinessResponse {
    fn from(b: Business) -> Self {
        Self {
            id: b.id,
            name: b.name,
            address: b.address,
            contact: b.contact,
            business_type: b.business_type,
            owner_id: b.owner_id,
            status: b.status,
            settings: b.settings,
            subscription: b.subscription.map(Into::into),
            created_at: b.created_at.to_chrono(),
            updated_at: b.updated_at.to_chrono(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBusinessResponse {
    pub message: String,
    pub business_id: String,
    pub business: BusinessResponse,
    pub note: String,
}
