//! Account lifecycle on top of the identity provider.
//!
//! The identity record holds credentials and claims; the `users` document
//! mirrors the profile for the rest of the system. Both are written here.

use mongodb::bson::{doc, DateTime};
use std::sync::Arc;

use super::access::fresh_scope;
use super::{IdentityProvider, Principal, PrincipalUpdate, ServiceError, SignIn};
use crate::db::{collections, encode, get_as, DocumentStore};
use crate::models::{AccountClaims, Business, Role, User, STATUS_ACTIVE};
use crate::utils::Password;

#[derive(Debug)]
pub struct Registration {
    pub email: String,
    pub password: Password,
    pub display_name: Option<String>,
    pub role: Option<Role>,
    pub business_id: Option<String>,
}

#[derive(Clone)]
pub struct AccountService {
    store: Arc<dyn DocumentStore>,
    identity: Arc<dyn IdentityProvider>,
}

impl AccountService {
    pub fn new(store: Arc<dyn DocumentStore>, identity: Arc<dyn IdentityProvider>) -> Self {
        Self { store, identity }
    }

    /// Register a principal and its user document.
    ///
    /// Without a caller the account starts as a plain `user`. An owner may
    /// enrol the new account into their business as manager or staff.
    pub async fn register(
        &self,
        caller: Option<&Principal>,
        registration: Registration,
    ) -> Result<User, ServiceError> {
        let claims = self
            .enrolment_claims(caller, registration.role, registration.business_id)
            .await?;
        let display_name = registration
            .display_name
            .map(|n| n.trim().to_string())
            .unwrap_or_default();

        let principal = self
            .identity
            .create_principal(&registration.email, &registration.password, &display_name)
            .await?;

        let now = DateTime::now();
        let user = User {
            id: principal.uid.clone(),
            email: principal.email.clone(),
            display_name,
            role: claims.role,
            business_id: claims.business_id.clone(),
            status: STATUS_ACTIVE.to_string(),
            photo_url: None,
            phone_number: None,
            created_at: now,
            updated_at: now,
        };

        if let Err(e) = self.persist_user(&user, claims).await {
            tracing::error!(user_id = %user.id, error = %e, "User setup failed, removing principal");
            if let Err(cleanup) = self.identity.delete_principal(&user.id).await {
                tracing::error!(user_id = %user.id, error = %cleanup, "Failed to remove principal");
            }
            return Err(e);
        }

        metrics::counter!("pos_accounts_registered_total", "role" => user.role.as_str())
            .increment(1);
        tracing::info!(
            user_id = %user.id,
            role = %user.role,
            business_id = ?user.business_id,
            "User registered"
        );
        Ok(user)
    }

    async fn persist_user(&self, user: &User, claims: AccountClaims) -> Result<(), ServiceError> {
        if claims != AccountClaims::default() {
            self.identity.set_claims(&user.id, claims).await?;
        }
        self.store
            .set(collections::USERS, &user.id, encode(user)?)
            .await?;
        Ok(())
    }

    async fn enrolment_claims(
        &self,
        caller: Option<&Principal>,
        role: Option<Role>,
        business_id: Option<String>,
    ) -> Result<AccountClaims, ServiceError> {
        let business_id = business_id.filter(|b| !b.trim().is_empty());
        if business_id.is_none() && matches!(role, None | Some(Role::User)) {
            return Ok(AccountClaims::default());
        }

        let Some(caller) = caller else {
            return Err(ServiceError::Forbidden(
                "Only a business owner can assign a role or business".to_string(),
            ));
        };

        let target = match business_id {
            Some(id) => id,
            None => fresh_scope(self.store.as_ref(), caller)
                .await?
                .map(|scope| scope.business_id)
                .ok_or_else(|| {
                    ServiceError::Forbidden(
                        "Only a business owner can assign a role or business".to_string(),
                    )
                })?,
        };

        let business: Business = get_as(self.store.as_ref(), collections::BUSINESSES, &target)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Business not found".to_string()))?;
        if business.owner_id != caller.uid {
            tracing::warn!(
                user_id = %caller.uid,
                business_id = %target,
                "Enrolment into a business the caller does not own"
            );
            return Err(ServiceError::Forbidden(
                "Only the business owner can enrol members".to_string(),
            ));
        }

        let role = match role {
            None => Role::Staff,
            Some(role @ (Role::Manager | Role::Staff)) => role,
            Some(other) => {
                return Err(ServiceError::Forbidden(format!(
                    "Owners can enrol managers or staff, not {}",
                    other
                )))
            }
        };

        Ok(AccountClaims {
            role,
            business_id: Some(business.id),
        })
    }

    pub async fn login(&self, email: &str, password: &Password) -> Result<SignIn, ServiceError> {
        let result = self.identity.sign_in(email, password).await;
        match &result {
            Ok(sign_in) => tracing::info!(user_id = %sign_in.uid, "User logged in"),
            Err(ServiceError::InvalidCredentials) => {
                metrics::counter!("pos_login_failures_total").increment(1);
                tracing::info!("Login failed");
            }
            Err(_) => {}
        }
        result
    }

    /// Re-issue tokens with the claims stored right now.
    pub async fn refresh(&self, refresh_token: &str) -> Result<SignIn, ServiceError> {
        self.identity.refresh(refresh_token).await
    }

    pub async fn forgot_password(&self, email: &str) -> Result<(), ServiceError> {
        self.identity.send_password_reset(email).await
    }

    pub async fn reset_password(
        &self,
        token: &str,
        new_password: &Password,
    ) -> Result<(), ServiceError> {
        self.identity.confirm_password_reset(token, new_password).await
    }

    pub async fn me(&self, principal: &Principal) -> Result<User, ServiceError> {
        get_as(self.store.as_ref(), collections::USERS, &principal.uid)
            .await?
            .ok_or_else(|| ServiceError::NotFound("User profile not found".to_string()))
    }

    pub async fn update(
        &self,
        principal: &Principal,
        update: PrincipalUpdate,
    ) -> Result<(), ServiceError> {
        self.identity.update_principal(&principal.uid, &update).await?;

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

        if !self
            .store
            .update(collections::USERS, &principal.uid, fields)
            .await?
        {
            return Err(ServiceError::NotFound("User profile not found".to_string()));
        }
        Ok(())
    }

    /// Remove the identity record, then the user document. Not atomic: a
    /// failure in between leaves the document behind.
    pub async fn delete(&self, principal: &Principal) -> Result<(), ServiceError> {
        self.identity.delete_principal(&principal.uid).await?;
        if !self.store.delete(collections::USERS, &principal.uid).await? {
            tracing::warn!(user_id = %principal.uid, "User document already absent");
        }
        tracing::info!(user_id = %principal.uid, "Account deleted");
        Ok(())
    }
}
