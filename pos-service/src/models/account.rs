use mongodb::bson::DateTime;
use serde::{Deserialize, Serialize};

use super::Role;

/// Custom claims attached to a principal and copied into tokens at issue time.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccountClaims {
    #[serde(default)]
    pub role: Role,
    pub business_id: Option<String>,
}

/// Identity provider record. Never leaves the identity module.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    #[serde(rename = "_id")]
    pub id: String,
    pub email: String,
    pub password_hash: String,
    pub display_name: String,
    pub photo_url: Option<String>,
    pub phone_number: Option<String>,
    #[serde(default)]
    pub claims: AccountClaims,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

/// Pending password reset, keyed by the SHA-256 digest of the e-mailed token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasswordReset {
    #[serde(rename = "_id")]
    pub id: String,
    pub account_id: String,
    pub expires_at: DateTime,
    pub created_at: DateTime,
}
