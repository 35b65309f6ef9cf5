use serde::de::DeserializeOwned;

use super::{Principal, ServiceError};
use crate::db::{collections, get_as, DocumentStore};
use crate::models::{Business, Category, Product, Role, Sale, User};

/// Whether a rule also requires the owner role on top of tenant membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnershipRule {
    AnyMember,
    OwnerOnly,
}

/// The acting tenant and role of a request, taken from verified claims.
#[derive(Debug, Clone)]
pub struct TenantScope {
    pub user_id: String,
    pub business_id: String,
    pub role: Role,
}

/// Anything stamped with the id of the business that owns it.
pub trait TenantOwned {
    fn business_id(&self) -> &str;
}

impl TenantOwned for Category {
    fn business_id(&self) -> &str {
        &self.business_id
    }
}

impl TenantOwned for Product {
    fn business_id(&self) -> &str {
        &self.business_id
    }
}

impl TenantOwned for Sale {
    fn business_id(&self) -> &str {
        &self.business_id
    }
}

impl TenantOwned for Business {
    fn business_id(&self) -> &str {
        &self.id
    }
}

impl TenantScope {
    pub fn authorize(
        &self,
        resource: &impl TenantOwned,
        rule: OwnershipRule,
    ) -> Result<(), ServiceError> {
        if resource.business_id() != self.business_id {
            return Err(ServiceError::Forbidden(
                "Access denied: resource belongs to another business".to_string(),
            ));
        }
        if rule == OwnershipRule::OwnerOnly && self.role != Role::Owner {
            return Err(ServiceError::Forbidden(
                "Only the business owner can perform this action".to_string(),
            ));
        }
        Ok(())
    }

    /// Load a tenant-owned document: not-found first, then the tenant check.
    pub async fn load<T>(
        &self,
        store: &dyn DocumentStore,
        collection: &str,
        id: &str,
        label: &str,
        rule: OwnershipRule,
    ) -> Result<T, ServiceError>
    where
        T: DeserializeOwned + TenantOwned,
    {
        let resource: T = get_as(store, collection, id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("{} not found", label)))?;

        if let Err(e) = self.authorize(&resource, rule) {
            tracing::warn!(
                user_id = %self.user_id,
                business_id = %self.business_id,
                resource_id = %id,
                collection = %collection,
                "Cross-tenant access denied"
            );
            return Err(e);
        }

        Ok(resource)
    }
}

impl TenantScope {
    /// Scope straight from token claims, or `None` when the token carries no business.
    pub fn from_claims(principal: &Principal) -> Option<Self> {
        principal.claims.business_id.as_ref().map(|business_id| Self {
            user_id: principal.uid.clone(),
            business_id: business_id.clone(),
            role: principal.claims.role,
        })
    }
}

/// Scope from claims, falling back to the mirrored user document when the
/// token was issued before the caller joined a business.
pub async fn fresh_scope(
    store: &dyn DocumentStore,
    principal: &Principal,
) -> Result<Option<TenantScope>, ServiceError> {
    if let Some(scope) = TenantScope::from_claims(principal) {
        return Ok(Some(scope));
    }

    let user: Option<User> = get_as(store, collections::USERS, &principal.uid).await?;
    Ok(user.and_then(|user| {
        user.business_id.map(|business_id| {
            tracing::debug!(
                user_id = %principal.uid,
                business_id = %business_id,
                "Token has no business claim, using user document"
            );
            TenantScope {
                user_id: principal.uid.clone(),
                business_id,
                role: user.role,
            }
        })
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::DateTime;

    fn category(business_id: &str) -> Category {
        Category {
            id: "c1".into(),
            name: "Beverages".into(),
            description: String::new(),
            color: "#000000".into(),
            business_id: business_id.into(),
            status: "active".into(),
            created_at: DateTime::now(),
            updated_at: DateTime::now(),
        }
    }

    fn scope(role: Role) -> TenantScope {
        TenantScope {
            user_id: "u1".into(),
            business_id: "b1".into(),
            role,
        }
    }

    #[test]
    fn same_tenant_member_is_allowed_unless_owner_only() {
        let own = category("b1");
        assert!(scope(Role::Staff)
            .authorize(&own, OwnershipRule::AnyMember)
            .is_ok());
        assert!(matches!(
            scope(Role::Staff).authorize(&own, OwnershipRule::OwnerOnly),
            Err(ServiceError::Forbidden(_))
        ));
        assert!(scope(Role::Owner)
            .authorize(&own, OwnershipRule::OwnerOnly)
            .is_ok());
    }

    #[test]
    fn other_tenant_is_forbidden_even_for_owner() {
        assert!(matches!(
            scope(Role::Owner).authorize(&category("b2"), OwnershipRule::AnyMember),
            Err(ServiceError::Forbidden(_))
        ));
    }
}
