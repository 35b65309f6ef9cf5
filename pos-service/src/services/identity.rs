//! Identity provider.
//!
//! Issues bearer tokens, stores per-principal claims (role and business) and
//! verifies tokens back into a [`Principal`]. The rest of the service only
//! talks to the [`IdentityProvider`] trait.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use mongodb::bson::{self, doc, DateTime};
use std::sync::Arc;
use uuid::Uuid;

use super::{EmailProvider, JwtService, ServiceError, TokenPair, TokenUse};
use crate::config::PasswordResetConfig;
use crate::db::{collections, decode, encode, get_as, DocumentStore, Query, Write};
use crate::models::{Account, AccountClaims, PasswordReset};
use crate::utils::{digest_token, generate_token, hash_password, verify_password, Password, PasswordHashString};

/// A verified caller.
#[derive(Debug, Clone)]
pub struct Principal {
    pub uid: String,
    pub email: String,
    pub claims: AccountClaims,
}

#[derive(Debug, Clone, Default)]
pub struct PrincipalUpdate {
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
    pub phone_number: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SignIn {
    pub uid: String,
    pub email: String,
    pub tokens: TokenPair,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn create_principal(
        &self,
        email: &str,
        password: &Password,
        display_name: &str,
    ) -> Result<Principal, ServiceError>;

    async fn sign_in(&self, email: &str, password: &Password) -> Result<SignIn, ServiceError>;

    /// Re-issue tokens carrying the principal's current claims.
    async fn refresh(&self, refresh_token: &str) -> Result<SignIn, ServiceError>;

    async fn verify_bearer_token(&self, token: &str) -> Result<Principal, ServiceError>;

    /// Replace stored claims. Tokens issued earlier keep their old claims.
    async fn set_claims(&self, uid: &str, claims: AccountClaims) -> Result<(), ServiceError>;

    async fn update_principal(&self, uid: &str, update: &PrincipalUpdate)
        -> Result<(), ServiceError>;

    async fn delete_principal(&self, uid: &str) -> Result<(), ServiceError>;

    /// Succeeds whether or not the address is registered.
    async fn send_password_reset(&self, email: &str) -> Result<(), ServiceError>;

    async fn confirm_password_reset(
        &self,
        token: &str,
        new_password: &Password,
    ) -> Result<(), ServiceError>;
}

/// Identity provider backed by the document store.
pub struct StoreIdentityProvider {
    store: Arc<dyn DocumentStore>,
    jwt: JwtService,
    email: Arc<dyn EmailProvider>,
    reset: PasswordResetConfig,
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

impl StoreIdentityProvider {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        jwt: JwtService,
        email: Arc<dyn EmailProvider>,
        reset: PasswordResetConfig,
    ) -> Self {
        Self {
            store,
            jwt,
            email,
            reset,
        }
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, ServiceError> {
        let query = Query::collection(collections::ACCOUNTS)
            .where_eq("email", normalize_email(email))
            .limit(1);
        let found = self.store.query(&query).await?;
        Ok(found.into_iter().next().map(decode).transpose()?)
    }

    fn sign_in_result(&self, account: &Account) -> Result<SignIn, ServiceError> {
        Ok(SignIn {
            uid: account.id.clone(),
            email: account.email.clone(),
            tokens: self
                .jwt
                .generate_token_pair(&account.id, &account.email, &account.claims)?,
        })
    }
}

#[async_trait]
impl IdentityProvider for StoreIdentityProvider {
    async fn create_principal(
        &self,
        email: &str,
        password: &Password,
        display_name: &str,
    ) -> Result<Principal, ServiceError> {
        if self.find_by_email(email).await?.is_some() {
            return Err(ServiceError::EmailAlreadyRegistered);
        }

        let now = DateTime::now();
        let account = Account {
            id: Uuid::new_v4().to_string(),
            email: normalize_email(email),
            password_hash: hash_password(password)?.into_string(),
            display_name: display_name.to_string(),
            photo_url: None,
            phone_number: None,
            claims: AccountClaims::default(),
            created_at: now,
            updated_at: now,
        };

        self.store
            .set(collections::ACCOUNTS, &account.id, encode(&account)?)
            .await?;

        tracing::info!(uid = %account.id, "Principal created");

        Ok(Principal {
            uid: account.id,
            email: account.email,
            claims: account.claims,
        })
    }

    async fn sign_in(&self, email: &str, password: &Password) -> Result<SignIn, ServiceError> {
        let account = self
            .find_by_email(email)
            .await?
            .ok_or(ServiceError::InvalidCredentials)?;

        verify_password(password, &PasswordHashString::new(account.password_hash.clone()))
            .map_err(|_| ServiceError::InvalidCredentials)?;

        self.sign_in_result(&account)
    }

    async fn refresh(&self, refresh_token: &str) -> Result<SignIn, ServiceError> {
        let claims = self.jwt.validate(refresh_token, TokenUse::Refresh)?;

        let account: Account = get_as(self.store.as_ref(), collections::ACCOUNTS, &claims.sub)
            .await?
            .ok_or(ServiceError::InvalidToken)?;

        self.sign_in_result(&account)
    }

    async fn verify_bearer_token(&self, token: &str) -> Result<Principal, ServiceError> {
        let claims = self.jwt.validate(token, TokenUse::Access)?;

        Ok(Principal {
            uid: claims.sub,
            email: claims.email,
            claims: AccountClaims {
                role: claims.role,
                business_id: claims.business_id,
            },
        })
    }

    async fn set_claims(&self, uid: &str, claims: AccountClaims) -> Result<(), ServiceError> {
        let fields = doc! {
            "claims": bson::to_bson(&claims).map_err(crate::db::StoreError::from)?,
            "updated_at": DateTime::now(),
        };

        if !self.store.update(collections::ACCOUNTS, uid, fields).await? {
            return Err(ServiceError::NotFound("Account not found".to_string()));
        }

        tracing::info!(uid = %uid, role = %claims.role, business_id = ?claims.business_id, "Claims updated");
        Ok(())
    }

    async fn update_principal(
        &self,
        uid: &str,
        update: &PrincipalUpdate,
    ) -> Result<(), ServiceError> {
        let mut fields = doc! { "updated_at": DateTime::now() };
        if let Some(name) = &update.display_name {
            fields.insert("display_name", name.as_str());
        }
        if let Some(photo) = &update.photo_url {
            fields.insert("photo_url", photo.as_str());
        }
        if let Some(phone) = &update.phone_number {
            fields.insert("phone_number", phone.as_str());
        }

        if !self.store.update(collections::ACCOUNTS, uid, fields).await? {
            return Err(ServiceError::NotFound("Account not found".to_string()));
        }
        Ok(())
    }

    async fn delete_principal(&self, uid: &str) -> Result<(), ServiceError> {
        if !self.store.delete(collections::ACCOUNTS, uid).await? {
            return Err(ServiceError::NotFound("Account not found".to_string()));
        }
        tracing::info!(uid = %uid, "Principal deleted");
        Ok(())
    }

    async fn send_password_reset(&self, email: &str) -> Result<(), ServiceError> {
        let Some(account) = self.find_by_email(email).await? else {
            tracing::info!("Password reset requested for unknown email");
            return Ok(());
        };

        let token = generate_token();
        let now = Utc::now();
        let reset = PasswordReset {
            id: digest_token(&token),
            account_id: account.id.clone(),
            expires_at: DateTime::from_chrono(now + Duration::minutes(self.reset.expiry_minutes)),
            created_at: DateTime::from_chrono(now),
        };
        self.store
            .set(collections::PASSWORD_RESETS, &reset.id, encode(&reset)?)
            .await?;

        let link = format!("{}?token={}", self.reset.url, token);
        self.email
            .send_password_reset_email(&account.email, &link)
            .await
            .map_err(|e| ServiceError::Email(e.to_string()))?;

        tracing::info!(uid = %account.id, "Password reset email dispatched");
        Ok(())
    }

    async fn confirm_password_reset(
        &self,
        token: &str,
        new_password: &Password,
    ) -> Result<(), ServiceError> {
        let key = digest_token(token);
        let reset: PasswordReset = get_as(self.store.as_ref(), collections::PASSWORD_RESETS, &key)
            .await?
            .ok_or(ServiceError::InvalidToken)?;

        if reset.expires_at < DateTime::now() {
            self.store.delete(collections::PASSWORD_RESETS, &key).await?;
            return Err(ServiceError::InvalidToken);
        }

        let hash = hash_password(new_password)?;
        let result = self
            .store
            .batch_commit(vec![
                Write::update(
                    collections::ACCOUNTS,
                    &reset.account_id,
                    doc! { "password_hash": hash.into_string(), "updated_at": DateTime::now() },
                ),
                Write::delete(collections::PASSWORD_RESETS, &key),
            ])
            .await;

        match result {
            Ok(()) => {
                tracing::info!(uid = %reset.account_id, "Password reset completed");
                Ok(())
            }
            Err(crate::db::StoreError::NotFound { .. }) => Err(ServiceError::InvalidToken),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JwtConfig;
    use crate::db::MemoryStore;
    use crate::models::Role;
    use crate::services::MockEmailService;
    use secrecy::Secret;

    fn provider(store: Arc<dyn DocumentStore>, email: Arc<MockEmailService>) -> StoreIdentityProvider {
        let jwt = JwtService::new(&JwtConfig {
            secret: Secret::new("identity-test".to_string()),
            access_token_expiry_minutes: 15,
            refresh_token_expiry_days: 7,
        });
        StoreIdentityProvider::new(
            store,
            jwt,
            email,
            PasswordResetConfig {
                url: "http://pos.test/reset".to_string(),
                expiry_minutes: 30,
            },
        )
    }

    #[tokio::test]
    async fn claims_change_only_after_refresh() {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let idp = provider(store, Arc::new(MockEmailService::new()));
        let password = Password::new("Password123!".to_string());

        let principal = idp
            .create_principal("Owner@Cafe.test", &password, "Owner")
            .await
            .unwrap();
        assert_eq!(principal.email, "owner@cafe.test");

        let first = idp.sign_in("owner@cafe.test", &password).await.unwrap();
        idp.set_claims(
            &principal.uid,
            AccountClaims {
                role: Role::Owner,
                business_id: Some("biz-1".to_string()),
            },
        )
        .await
        .unwrap();

        let stale = idp
            .verify_bearer_token(&first.tokens.access_token)
            .await
            .unwrap();
        assert_eq!(stale.claims.role, Role::User);
        assert!(stale.claims.business_id.is_none());

        let refreshed = idp.refresh(&first.tokens.refresh_token).await.unwrap();
        let fresh = idp
            .verify_bearer_token(&refreshed.tokens.access_token)
            .await
            .unwrap();
        assert_eq!(fresh.claims.role, Role::Owner);
        assert_eq!(fresh.claims.business_id.as_deref(), Some("biz-1"));
    }

    #[tokio::test]
    async fn duplicate_email_and_wrong_password_are_rejected() {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let idp = provider(store, Arc::new(MockEmailService::new()));
        let password = Password::new("Password123!".to_string());

        idp.create_principal("a@pos.test", &password, "A").await.unwrap();
        assert!(matches!(
            idp.create_principal("A@pos.test", &password, "A").await,
            Err(ServiceError::EmailAlreadyRegistered)
        ));
        assert!(matches!(
            idp.sign_in("a@pos.test", &Password::new("nope".to_string())).await,
            Err(ServiceError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn reset_token_is_single_use() {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let email = Arc::new(MockEmailService::new());
        let idp = provider(store, email.clone());

        idp.create_principal("a@pos.test", &Password::new("old-password".to_string()), "A")
            .await
            .unwrap();
        idp.send_password_reset("a@pos.test").await.unwrap();
        idp.send_password_reset("nobody@pos.test").await.unwrap();

        let sent = email.sent().unwrap();
        assert_eq!(sent.len(), 1);
        let token = sent[0].link.split("token=").nth(1).unwrap().to_string();

        let new_password = Password::new("new-password".to_string());
        idp.confirm_password_reset(&token, &new_password).await.unwrap();
        assert!(idp.sign_in("a@pos.test", &new_password).await.is_ok());
        assert!(matches!(
            idp.confirm_password_reset(&token, &new_password).await,
            Err(ServiceError::InvalidToken)
        ));
    }
}
