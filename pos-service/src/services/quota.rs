//! Per-plan resource limits.
//!
//! Creation of categories and products is gated on the number of documents the
//! business already owns. A plan name that does not resolve to a known tier is
//! allowed through and logged: a corrupt or missing plan must never block sales
//! staff from working.

use std::fmt;
use std::sync::Arc;

use super::ServiceError;
use crate::db::{collections, get_as, DocumentStore, Query};
use crate::models::{Business, Subscription};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanTier {
    Basic,
    Pro,
    Enterprise,
}

impl PlanTier {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_uppercase().as_str() {
            "BASIC" => Some(PlanTier::Basic),
            "PRO" => Some(PlanTier::Pro),
            "ENTERPRISE" => Some(PlanTier::Enterprise),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PlanTier::Basic => "BASIC",
            PlanTier::Pro => "PRO",
            PlanTier::Enterprise => "ENTERPRISE",
        }
    }

    pub fn quota(&self, resource: ResourceKind) -> Quota {
        use ResourceKind::*;
        match (self, resource) {
            (PlanTier::Basic, Products) => Quota::Limit(50),
            (PlanTier::Basic, Categories) => Quota::Limit(10),
            (PlanTier::Basic, Orders) => Quota::Limit(100),
            (PlanTier::Basic, Reports) => Quota::Feature(false),
            (PlanTier::Pro, Products) => Quota::Limit(500),
            (PlanTier::Pro, Categories) => Quota::Limit(50),
            (PlanTier::Pro, Orders) => Quota::Limit(1000),
            (PlanTier::Pro, Reports) => Quota::Feature(true),
            (PlanTier::Enterprise, Reports) => Quota::Feature(true),
            (PlanTier::Enterprise, _) => Quota::Unlimited,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Products,
    Categories,
    Orders,
    Reports,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Products => "products",
            ResourceKind::Categories => "categories",
            ResourceKind::Orders => "orders",
            ResourceKind::Reports => "reports",
        }
    }

    /// Collection counted for a numeric cap.
    fn collection(&self) -> Option<&'static str> {
        match self {
            ResourceKind::Products => Some(collections::PRODUCTS),
            ResourceKind::Categories => Some(collections::CATEGORIES),
            ResourceKind::Orders => Some(collections::SALES),
            ResourceKind::Reports => None,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quota {
    Feature(bool),
    Limit(u64),
    Unlimited,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Plan {
    Tier(PlanTier),
    /// A plan name with no entry in the table.
    Unrecognized(String),
}

/// Plan in force for a subscription. Only `active`/`trialing` (or no status)
/// subscriptions get their plan; anything else is BASIC.
pub fn resolve_plan(subscription: Option<&Subscription>) -> Plan {
    let Some(sub) = subscription else {
        return Plan::Tier(PlanTier::Basic);
    };

    let in_good_standing = sub
        .status
        .as_deref()
        .map(|s| matches!(s.to_lowercase().as_str(), "active" | "trialing"))
        .unwrap_or(true);
    if !in_good_standing {
        return Plan::Tier(PlanTier::Basic);
    }

    match sub.plan.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
        None => Plan::Tier(PlanTier::Basic),
        Some(name) => match PlanTier::from_name(name) {
            Some(tier) => Plan::Tier(tier),
            None => Plan::Unrecognized(name.to_string()),
        },
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(Denial),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Denial {
    FeatureUnavailable {
        plan: PlanTier,
        resource: ResourceKind,
    },
    LimitReached {
        plan: PlanTier,
        resource: ResourceKind,
        current_usage: u64,
        limit: u64,
    },
}

impl From<Denial> for ServiceError {
    fn from(denial: Denial) -> Self {
        match denial {
            Denial::FeatureUnavailable { plan, resource } => ServiceError::FeatureUnavailable {
                plan: plan.as_str().to_string(),
                resource: resource.to_string(),
            },
            Denial::LimitReached {
                plan,
                resource,
                current_usage,
                limit,
            } => ServiceError::QuotaExceeded {
                plan: plan.as_str().to_string(),
                resource: resource.to_string(),
                current_usage,
                limit,
            },
        }
    }
}

#[derive(Clone)]
pub struct QuotaGate {
    store: Arc<dyn DocumentStore>,
}

impl QuotaGate {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn check(
        &self,
        business_id: &str,
        resource: ResourceKind,
    ) -> Result<Decision, ServiceError> {
        let business: Business = get_as(self.store.as_ref(), collections::BUSINESSES, business_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Business not found".to_string()))?;

        let tier = match resolve_plan(business.subscription.as_ref()) {
            Plan::Tier(tier) => tier,
            Plan::Unrecognized(name) => {
                tracing::warn!(
                    business_id = %business_id,
                    plan = %name,
                    resource = %resource,
                    "Unrecognized subscription plan, allowing request"
                );
                return Ok(Decision::Allow);
            }
        };

        match tier.quota(resource) {
            Quota::Unlimited | Quota::Feature(true) => Ok(Decision::Allow),
            Quota::Feature(false) => Ok(Decision::Deny(Denial::FeatureUnavailable {
                plan: tier,
                resource,
            })),
            Quota::Limit(limit) => {
                let Some(collection) = resource.collection() else {
                    return Ok(Decision::Allow);
                };
                let current_usage = self
                    .store
                    .count(&Query::collection(collection).where_eq("business_id", business_id))
                    .await?;

                if current_usage < limit {
                    Ok(Decision::Allow)
                } else {
                    Ok(Decision::Deny(Denial::LimitReached {
                        plan: tier,
                        resource,
                        current_usage,
                        limit,
                    }))
                }
            }
        }
    }

    /// `check`, turning a denial into an error.
    pub async fn enforce(
        &self,
        business_id: &str,
        resource: ResourceKind,
    ) -> Result<(), ServiceError> {
        match self.check(business_id, resource).await? {
            Decision::Allow => Ok(()),
            Decision::Deny(denial) => {
                metrics::counter!("pos_quota_denials_total", "resource" => resource.as_str())
                    .increment(1);
                tracing::info!(business_id = %business_id, resource = %resource, "Quota denied creation");
                Err(denial.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{encode, MemoryStore};
    use crate::models::BusinessSettings;
    use axum::http::StatusCode;
    use mongodb::bson::{doc, DateTime};
    use serde_json::json;
    use service_core::error::AppError;

    async fn store_with(subscription: Option<Subscription>, products: usize) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        let business = Business {
            id: "b1".to_string(),
            name: "Corner Cafe".to_string(),
            address: String::new(),
            contact: String::new(),
            business_type: "cafe".to_string(),
            owner_id: "u1".to_string(),
            status: "active".to_string(),
            settings: BusinessSettings::default(),
            subscription,
            created_at: DateTime::now(),
            updated_at: DateTime::now(),
        };
        store
            .set(collections::BUSINESSES, "b1", encode(&business).unwrap())
            .await
            .unwrap();
        for i in 0..products {
            store
                .set(
                    collections::PRODUCTS,
                    &format!("p{}", i),
                    doc! { "business_id": "b1", "stock": 1_i64 },
                )
                .await
                .unwrap();
        }
        store
    }

    fn sub(plan: Option<&str>, status: Option<&str>) -> Subscription {
        Subscription {
            plan: plan.map(String::from),
            status: status.map(String::from),
            ..Default::default()
        }
    }

    #[test]
    fn table_matches_plan_catalogue() {
        assert_eq!(PlanTier::Basic.quota(ResourceKind::Products), Quota::Limit(50));
        assert_eq!(PlanTier::Basic.quota(ResourceKind::Categories), Quota::Limit(10));
        assert_eq!(PlanTier::Basic.quota(ResourceKind::Reports), Quota::Feature(false));
        assert_eq!(PlanTier::Pro.quota(ResourceKind::Orders), Quota::Limit(1000));
        assert_eq!(PlanTier::Enterprise.quota(ResourceKind::Products), Quota::Unlimited);
        assert_eq!(PlanTier::Enterprise.quota(ResourceKind::Reports), Quota::Feature(true));
    }

    #[test]
    fn plan_resolution_defaults_and_status_fallback() {
        assert_eq!(resolve_plan(None), Plan::Tier(PlanTier::Basic));
        assert_eq!(resolve_plan(Some(&sub(None, None))), Plan::Tier(PlanTier::Basic));
        assert_eq!(
            resolve_plan(Some(&sub(Some("pro"), Some("Active")))),
            Plan::Tier(PlanTier::Pro)
        );
        assert_eq!(
            resolve_plan(Some(&sub(Some("ENTERPRISE"), Some("trialing")))),
            Plan::Tier(PlanTier::Enterprise)
        );
        assert_eq!(
            resolve_plan(Some(&sub(Some("PRO"), Some("canceled")))),
            Plan::Tier(PlanTier::Basic)
        );
        assert_eq!(
            resolve_plan(Some(&sub(Some("growth"), Some("active")))),
            Plan::Unrecognized("growth".to_string())
        );
    }

    #[tokio::test]
    async fn basic_plan_has_no_reports() {
        let gate = QuotaGate::new(store_with(None, 0).await);

        assert_eq!(
            gate.check("b1", ResourceKind::Reports).await.unwrap(),
            Decision::Deny(Denial::FeatureUnavailable {
                plan: PlanTier::Basic,
                resource: ResourceKind::Reports,
            })
        );

        let err = gate.enforce("b1", ResourceKind::Reports).await.unwrap_err();
        match AppError::from(err) {
            AppError::Rejected {
                status, details, ..
            } => {
                assert_eq!(status, StatusCode::FORBIDDEN);
                assert_eq!(details, json!({ "plan": "BASIC", "resource": "reports" }));
            }
            other => panic!("expected a rejection, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn enterprise_is_never_capped() {
        let gate = QuotaGate::new(
            store_with(Some(sub(Some("enterprise"), Some("active"))), 51).await,
        );

        assert_eq!(
            gate.check("b1", ResourceKind::Products).await.unwrap(),
            Decision::Allow
        );
        assert_eq!(
            gate.check("b1", ResourceKind::Reports).await.unwrap(),
            Decision::Allow
        );
        assert!(gate.enforce("b1", ResourceKind::Products).await.is_ok());
    }

    #[tokio::test]
    async fn basic_plan_stops_at_product_cap() {
        let gate = QuotaGate::new(store_with(None, 50).await);

        assert_eq!(
            gate.check("b1", ResourceKind::Products).await.unwrap(),
            Decision::Deny(Denial::LimitReached {
                plan: PlanTier::Basic,
                resource: ResourceKind::Products,
                current_usage: 50,
                limit: 50,
            })
        );
        assert_eq!(
            gate.check("b1", ResourceKind::Categories).await.unwrap(),
            Decision::Allow
        );
    }
}
