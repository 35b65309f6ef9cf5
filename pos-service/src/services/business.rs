use mongodb::bson::{self, doc, Bson, DateTime};
use std::sync::Arc;
use uuid::Uuid;

use super::access::fresh_scope;
use super::{IdentityProvider, Principal, ServiceError};
use crate::db::{collections, encode, get_as, query_as, DocumentStore, Query, StoreError, Write};
use crate::models::{AccountClaims, Business, BusinessSettings, Role, User, STATUS_ACTIVE};

pub const DEFAULT_BUSINESS_TYPE: &str = "retail";

#[derive(Debug, Clone)]
pub struct NewBusiness {
    pub name: String,
    pub address: Option<String>,
    pub contact: Option<String>,
    pub business_type: Option<String>,
}

/// Client-writable business fields. Owner and subscription are not here.
#[derive(Debug, Clone, Default)]
pub struct BusinessUpdate {
    pub name: Option<String>,
    pub address: Option<String>,
    pub contact: Option<String>,
    pub business_type: Option<String>,
    pub settings: Option<BusinessSettings>,
}

#[derive(Clone)]
pub struct BusinessService {
    store: Arc<dyn DocumentStore>,
    identity: Arc<dyn IdentityProvider>,
}

impl BusinessService {
    pub fn new(store: Arc<dyn DocumentStore>, identity: Arc<dyn IdentityProvider>) -> Self {
        Self { store, identity }
    }

    /// Create a business owned by the caller and promote the caller to owner.
    /// The caller's current token keeps its old claims until refreshed.
    pub async fn create(
        &self,
        principal: &Principal,
        input: NewBusiness,
    ) -> Result<Business, ServiceError> {
        let name = input.name.trim();
        if name.is_empty() {
            return Err(ServiceError::Validation(
                "Business name is required".to_string(),
            ));
        }

        let user: User = get_as(self.store.as_ref(), collections::USERS, &principal.uid)
            .await?
            .ok_or_else(|| ServiceError::NotFound("User profile not found".to_string()))?;
        if user.business_id.is_some() {
            return Err(ServiceError::Conflict(
                "User already belongs to a business".to_string(),
            ));
        }

        let now = DateTime::now();
        let business = Business {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            address: input.address.unwrap_or_default(),
            contact: input.contact.unwrap_or_default(),
            business_type: input
                .business_type
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_BUSINESS_TYPE.to_string()),
            owner_id: principal.uid.clone(),
            status: STATUS_ACTIVE.to_string(),
            settings: BusinessSettings::default(),
            subscription: None,
            created_at: now,
            updated_at: now,
        };

        self.store
            .batch_commit(vec![
                Write::set(collections::BUSINESSES, &business.id, encode(&business)?),
                Write::update(
                    collections::USERS,
                    &principal.uid,
                    doc! {
                        "business_id": business.id.as_str(),
                        "role": Role::Owner.as_str(),
                        "updated_at": now,
                    },
                ),
            ])
            .await
            .map_err(|e| match e {
                StoreError::NotFound { .. } => {
                    ServiceError::NotFound("User profile not found".to_string())
                }
                other => other.into(),
            })?;

        let claims = AccountClaims {
            role: Role::Owner,
            business_id: Some(business.id.clone()),
        };
        if let Err(e) = self.identity.set_claims(&principal.uid, claims).await {
            tracing::error!(
                user_id = %principal.uid,
                business_id = %business.id,
                error = %e,
                "Failed to set owner claims, rolling back business"
            );
            self.detach_owner(&principal.uid, &business.id).await?;
            return Err(e);
        }

        metrics::counter!("pos_businesses_created_total").increment(1);
        tracing::info!(
            business_id = %business.id,
            user_id = %principal.uid,
            "Business created"
        );
        Ok(business)
    }

    /// Businesses the caller owns or works for, newest first.
    pub async fn list(&self, principal: &Principal) -> Result<Vec<Business>, ServiceError> {
        let owned_query =
            Query::collection(collections::BUSINESSES).where_eq("owner_id", principal.uid.as_str());
        let mut businesses: Vec<Business> = query_as(self.store.as_ref(), &owned_query).await?;

        if let Some(scope) = fresh_scope(self.store.as_ref(), principal).await? {
            if !businesses.iter().any(|b| b.id == scope.business_id) {
                let member: Option<Business> =
                    get_as(self.store.as_ref(), collections::BUSINESSES, &scope.business_id)
                        .await?;
                businesses.extend(member);
            }
        }

        businesses.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(businesses)
    }

    pub async fn get(&self, principal: &Principal, id: &str) -> Result<Business, ServiceError> {
        let business = self.load(id).await?;
        if business.owner_id == principal.uid {
            return Ok(business);
        }

        let member = fresh_scope(self.store.as_ref(), principal)
            .await?
            .is_some_and(|scope| scope.business_id == business.id);
        if !member {
            tracing::warn!(user_id = %principal.uid, business_id = %id, "Cross-tenant business read denied");
            return Err(ServiceError::Forbidden(
                "Access denied: resource belongs to another business".to_string(),
            ));
        }
        Ok(business)
    }

    /// The caller's own business, tolerating a token issued before it existed.
    pub async fn profile(&self, principal: &Principal) -> Result<Business, ServiceError> {
        let scope = fresh_scope(self.store.as_ref(), principal)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound("No business associated with this user".to_string())
            })?;
        self.load(&scope.business_id).await
    }

    pub async fn update(
        &self,
        principal: &Principal,
        id: &str,
        update: BusinessUpdate,
    ) -> Result<(), ServiceError> {
        let business = self.load(id).await?;
        ensure_owner(principal, &business)?;

        let mut fields = doc! { "updated_at": DateTime::now() };
        if let Some(name) = update.name {
            let name = name.trim();
            if name.is_empty() {
                return Err(ServiceError::Validation(
                    "Business name is required".to_string(),
                ));
            }
            fields.insert("name", name);
        }
        if let Some(address) = update.address {
            fields.insert("address", address);
        }
        if let Some(contact) = update.contact {
            fields.insert("contact", contact);
        }
        if let Some(business_type) = update.business_type {
            fields.insert("type", business_type);
        }
        if let Some(settings) = update.settings {
            fields.insert(
                "settings",
                bson::to_bson(&settings).map_err(StoreError::from)?,
            );
        }

        if !self.store.update(collections::BUSINESSES, id, fields).await? {
            return Err(ServiceError::NotFound("Business not found".to_string()));
        }
        tracing::info!(business_id = %id, user_id = %principal.uid, "Business updated");
        Ok(())
    }

    /// Delete the business and demote the owner. Categories, products and
    /// sales of the business are left in place.
    pub async fn delete(&self, principal: &Principal, id: &str) -> Result<(), ServiceError> {
        let business = self.load(id).await?;
        ensure_owner(principal, &business)?;

        self.detach_owner(&principal.uid, id).await?;
        self.identity
            .set_claims(&principal.uid, AccountClaims::default())
            .await?;

        tracing::info!(business_id = %id, user_id = %principal.uid, "Business deleted");
        Ok(())
    }

    async fn load(&self, id: &str) -> Result<Business, ServiceError> {
        get_as(self.store.as_ref(), collections::BUSINESSES, id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Business not found".to_string()))
    }

    /// Remove the business document and reset its owner to a plain user.
    async fn detach_owner(&self, uid: &str, business_id: &str) -> Result<(), ServiceError> {
        let mut writes = vec![Write::delete(collections::BUSINESSES, business_id)];
        let user: Option<User> = get_as(self.store.as_ref(), collections::USERS, uid).await?;
        if user.is_some() {
            writes.push(Write::update(
                collections::USERS,
                uid,
                doc! {
                    "business_id": Bson::Null,
                    "role": Role::User.as_str(),
                    "updated_at": DateTime::now(),
                },
            ));
        }
        self.store.batch_commit(writes).await?;
        Ok(())
    }
}

fn ensure_owner(principal: &Principal, business: &Business) -> Result<(), ServiceError> {
    if business.owner_id != principal.uid {
        tracing::warn!(
            user_id = %principal.uid,
            business_id = %business.id,
            "Non-owner attempted an owner-only business change"
        );
        return Err(ServiceError::Forbidden(
            "Only the business owner can perform this action".to_string(),
        ));
    }
    Ok(())
}
