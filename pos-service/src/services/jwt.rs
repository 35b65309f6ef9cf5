use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ServiceError;
use crate::config::JwtConfig;
use crate::models::{AccountClaims, Role};

/// Distinguishes the two token kinds so one cannot stand in for the other.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenUse {
    Access,
    Refresh,
}

/// Claims carried by every token this service issues.
///
/// `role` and `business_id` are a snapshot of the account's claims at issue
/// time. They do not change until the client refreshes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    pub sub: String,
    pub email: String,
    #[serde(default)]
    pub role: Role,
    pub business_id: Option<String>,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
    pub token_use: TokenUse,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

/// HS256 token issuer and verifier.
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_token_expiry_minutes: i64,
    refresh_token_expiry_days: i64,
}

impl JwtService {
    pub fn new(config: &JwtConfig) -> Self {
        let secret = config.secret.expose_secret().as_bytes();

        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            access_token_expiry_minutes: config.access_token_expiry_minutes,
            refresh_token_expiry_days: config.refresh_token_expiry_days,
        }
    }

    fn issue(
        &self,
        uid: &str,
        email: &str,
        claims: &AccountClaims,
        token_use: TokenUse,
    ) -> Result<String, ServiceError> {
        let now = Utc::now();
        let exp = match token_use {
            TokenUse::Access => now + Duration::minutes(self.access_token_expiry_minutes),
            TokenUse::Refresh => now + Duration::days(self.refresh_token_expiry_days),
        };

        let token_claims = TokenClaims {
            sub: uid.to_string(),
            email: email.to_string(),
            role: claims.role,
            business_id: claims.business_id.clone(),
            iat: now.timestamp(),
            exp: exp.timestamp(),
            jti: Uuid::new_v4().to_string(),
            token_use,
        };

        encode(&Header::new(Algorithm::HS256), &token_claims, &self.encoding_key)
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("Failed to encode token: {}", e)))
    }

    pub fn generate_token_pair(
        &self,
        uid: &str,
        email: &str,
        claims: &AccountClaims,
    ) -> Result<TokenPair, ServiceError> {
        Ok(TokenPair {
            access_token: self.issue(uid, email, claims, TokenUse::Access)?,
            refresh_token: self.issue(uid, email, claims, TokenUse::Refresh)?,
            token_type: "Bearer".to_string(),
            expires_in: self.access_token_expiry_minutes * 60,
        })
    }

    /// Decode a token and check its signature, expiry and kind.
    pub fn validate(&self, token: &str, expected: TokenUse) -> Result<TokenClaims, ServiceError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;

        let data = decode::<TokenClaims>(token, &self.decoding_key, &validation).map_err(|e| {
            tracing::debug!(error = %e, "Token rejected");
            ServiceError::InvalidToken
        })?;

        if data.claims.token_use != expected {
            return Err(ServiceError::InvalidToken);
        }

        Ok(data.claims)
    }
}
