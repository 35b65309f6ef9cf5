//! Sale recording.
//!
//! A sale reads every product it touches inside one store transaction, checks
//! all of them, then stages the stock decrements and the sale document and
//! commits them together. A commit that loses a race with another writer is
//! re-run from a fresh transaction a bounded number of times.

use mongodb::bson::{doc, DateTime};
use serde::Serialize;
use service_core::retry::{retry_async, RetryConfig};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use super::{OwnershipRule, ServiceError, TenantScope};
use crate::config::TotalMismatchPolicy;
use crate::db::{collections, decode, encode, DocumentStore, Query, SortDirection, StoreError, Write};
use crate::models::{LineItem, Product, Sale, SaleStatus};

pub const DEFAULT_PAYMENT_METHOD: &str = "cash";
pub const MAX_LIST_LIMIT: i64 = 500;

/// Why a single line item blocked a sale.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum LineItemFailure {
    #[serde(rename_all = "camelCase")]
    ProductNotFound { product_id: String },
    #[serde(rename_all = "camelCase")]
    CrossTenantAccess { product_id: String },
    #[serde(rename_all = "camelCase")]
    InsufficientStock {
        product_id: String,
        available: i64,
        requested: i64,
    },
}

impl fmt::Display for LineItemFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LineItemFailure::ProductNotFound { product_id } => {
                write!(f, "product {} not found", product_id)
            }
            LineItemFailure::CrossTenantAccess { product_id } => {
                write!(f, "product {} belongs to another business", product_id)
            }
            LineItemFailure::InsufficientStock {
                product_id,
                available,
                requested,
            } => write!(
                f,
                "insufficient stock for product {} (available {}, requested {})",
                product_id, available, requested
            ),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewSale {
    pub items: Vec<LineItem>,
    pub total: Option<f64>,
    pub payment_method: Option<String>,
    pub customer_id: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SaleFilter {
    pub start: Option<DateTime>,
    pub end: Option<DateTime>,
    pub limit: Option<i64>,
}

#[derive(Clone)]
pub struct SaleEngine {
    store: Arc<dyn DocumentStore>,
    retry: RetryConfig,
    mismatch: TotalMismatchPolicy,
}

impl SaleEngine {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        max_attempts: u32,
        mismatch: TotalMismatchPolicy,
    ) -> Self {
        Self {
            store,
            retry: RetryConfig::contention(max_attempts),
            mismatch,
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub async fn create_sale(
        &self,
        scope: &TenantScope,
        input: NewSale,
    ) -> Result<Sale, ServiceError> {
        validate_items(&input.items)?;
        let quantities = aggregate_quantities(&input.items)?;
        let computed_cents = total_cents(&input.items)?;
        let total = resolve_total(input.total, computed_cents, self.mismatch)?;

        let sale = Sale {
            id: Uuid::new_v4().to_string(),
            business_id: scope.business_id.clone(),
            user_id: scope.user_id.clone(),
            customer_id: input.customer_id,
            items: input.items,
            total,
            payment_method: input
                .payment_method
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_PAYMENT_METHOD.to_string()),
            status: SaleStatus::Completed,
            created_at: DateTime::now(),
        };

        let started = Instant::now();
        let engine = self;
        let sale_ref = &sale;
        let quantities_ref = &quantities;
        let result = retry_async(
            &self.retry,
            "create_sale",
            |e: &ServiceError| matches!(e, ServiceError::Store(StoreError::Conflict(_))),
            move || engine.attempt(sale_ref, quantities_ref),
        )
        .await;

        metrics::histogram!("pos_sale_transaction_duration_seconds")
            .record(started.elapsed().as_secs_f64());

        match result {
            Ok(created_at) => {
                metrics::counter!("pos_sales_total", "outcome" => "completed").increment(1);
                tracing::info!(
                    sale_id = %sale.id,
                    business_id = %sale.business_id,
                    user_id = %sale.user_id,
                    items = sale.items.len(),
                    total = sale.total,
                    "Sale recorded"
                );
                Ok(Sale { created_at, ..sale })
            }
            Err(ServiceError::Store(StoreError::Conflict(_))) => {
                metrics::counter!("pos_sales_total", "outcome" => "contention").increment(1);
                Err(ServiceError::TransactionContention {
                    attempts: self.retry.max_attempts.max(1),
                })
            }
            Err(e @ ServiceError::SaleRejected(_)) => {
                metrics::counter!("pos_sales_total", "outcome" => "rejected").increment(1);
                tracing::info!(business_id = %sale.business_id, error = %e, "Sale rejected");
                Err(e)
            }
            Err(e) => {
                metrics::counter!("pos_sales_total", "outcome" => "error").increment(1);
                Err(e)
            }
        }
    }

    /// One read-validate-write-commit pass. Returns the commit timestamp.
    async fn attempt(
        &self,
        sale: &Sale,
        quantities: &BTreeMap<String, i64>,
    ) -> Result<DateTime, ServiceError> {
        let mut tx = self.store.begin().await?;

        let mut products = Vec::with_capacity(quantities.len());
        for product_id in quantities.keys() {
            match tx.get(collections::PRODUCTS, product_id).await {
                Ok(doc) => products.push((product_id, doc)),
                Err(e) => {
                    abort_quietly(tx).await;
                    return Err(e.into());
                }
            }
        }

        let mut failures = Vec::new();
        let mut new_stock = Vec::with_capacity(products.len());
        for (product_id, doc) in products {
            let requested = quantities.get(product_id).copied().unwrap_or_default();
            let Some(doc) = doc else {
                failures.push(LineItemFailure::ProductNotFound {
                    product_id: product_id.clone(),
                });
                continue;
            };
            let product: Product = match decode(doc) {
                Ok(p) => p,
                Err(e) => {
                    abort_quietly(tx).await;
                    return Err(e.into());
                }
            };

            if product.business_id != sale.business_id {
                failures.push(LineItemFailure::CrossTenantAccess {
                    product_id: product_id.clone(),
                });
            } else if product.stock < requested {
                failures.push(LineItemFailure::InsufficientStock {
                    product_id: product_id.clone(),
                    available: product.stock,
                    requested,
                });
            } else {
                new_stock.push((product_id, product.stock - requested));
            }
        }

        if !failures.is_empty() {
            abort_quietly(tx).await;
            return Err(ServiceError::SaleRejected(failures));
        }

        let now = DateTime::now();
        for (product_id, stock) in new_stock {
            tx.stage(Write::update(
                collections::PRODUCTS,
                product_id,
                doc! { "stock": stock, "updated_at": now },
            ));
        }

        let record = Sale {
            created_at: now,
            ..sale.clone()
        };
        tx.stage(Write::set(collections::SALES, &record.id, encode(&record)?));

        match tx.commit().await {
            Ok(()) => Ok(now),
            Err(e) => {
                if e.is_conflict() {
                    metrics::counter!("pos_sale_conflict_retries_total").increment(1);
                    tracing::debug!(sale_id = %sale.id, error = %e, "Sale transaction conflicted");
                }
                Err(e.into())
            }
        }
    }

    pub async fn list(
        &self,
        scope: &TenantScope,
        filter: SaleFilter,
    ) -> Result<Vec<Sale>, ServiceError> {
        let mut query = Query::collection(collections::SALES)
            .where_eq("business_id", scope.business_id.as_str())
            .order_by("created_at", SortDirection::Descending);
        if let Some(start) = filter.start {
            query = query.where_gte("created_at", start);
        }
        if let Some(end) = filter.end {
            query = query.where_lte("created_at", end);
        }
        if let Some(limit) = filter.limit {
            if !(1..=MAX_LIST_LIMIT).contains(&limit) {
                return Err(ServiceError::Validation(format!(
                    "limit must be between 1 and {}",
                    MAX_LIST_LIMIT
                )));
            }
            query = query.limit(limit);
        }

        Ok(crate::db::query_as(self.store.as_ref(), &query).await?)
    }

    pub async fn get(&self, scope: &TenantScope, id: &str) -> Result<Sale, ServiceError> {
        scope
            .load(
                self.store.as_ref(),
                collections::SALES,
                id,
                "Sale",
                OwnershipRule::AnyMember,
            )
            .await
    }
}

async fn abort_quietly(tx: Box<dyn crate::db::StoreTransaction>) {
    if let Err(e) = tx.abort().await {
        tracing::warn!(error = %e, "Failed to abort sale transaction");
    }
}

fn validate_items(items: &[LineItem]) -> Result<(), ServiceError> {
    if items.is_empty() {
        return Err(ServiceError::Validation(
            "A sale needs at least one item".to_string(),
        ));
    }
    for (index, item) in items.iter().enumerate() {
        if item.product_id.trim().is_empty() {
            return Err(ServiceError::Validation(format!(
                "items[{}].productId is required",
                index
            )));
        }
        if item.quantity <= 0 {
            return Err(ServiceError::Validation(format!(
                "items[{}].quantity must be greater than 0",
                index
            )));
        }
        if !item.price.is_finite() || item.price < 0.0 {
            return Err(ServiceError::Validation(format!(
                "items[{}].price must be a non-negative number",
                index
            )));
        }
    }
    Ok(())
}

/// Sum quantities per product so a repeated product becomes one decrement.
fn aggregate_quantities(items: &[LineItem]) -> Result<BTreeMap<String, i64>, ServiceError> {
    let mut quantities = BTreeMap::new();
    for item in items {
        let entry = quantities.entry(item.product_id.clone()).or_insert(0_i64);
        *entry = entry
            .checked_add(item.quantity)
            .ok_or_else(|| ServiceError::Validation("Quantity out of range".to_string()))?;
    }
    Ok(quantities)
}

fn to_cents(amount: f64) -> i64 {
    (amount * 100.0).round() as i64
}

/// Line item total in cents, prices rounded to the cent first.
fn total_cents(items: &[LineItem]) -> Result<i64, ServiceError> {
    items.iter().try_fold(0_i64, |acc, item| {
        to_cents(item.price)
            .checked_mul(item.quantity)
            .and_then(|line| acc.checked_add(line))
            .ok_or_else(|| ServiceError::Validation("Sale total out of range".to_string()))
    })
}

fn resolve_total(
    provided: Option<f64>,
    computed_cents: i64,
    policy: TotalMismatchPolicy,
) -> Result<f64, ServiceError> {
    let computed = computed_cents as f64 / 100.0;
    let Some(provided) = provided else {
        return Ok(computed);
    };

    if !provided.is_finite() || provided < 0.0 {
        return Err(ServiceError::Validation(
            "total must be a non-negative number".to_string(),
        ));
    }

    if to_cents(provided) == computed_cents {
        return Ok(computed);
    }

    match policy {
        TotalMismatchPolicy::Reject => Err(ServiceError::TotalMismatch { provided, computed }),
        TotalMismatchPolicy::Override => {
            tracing::warn!(
                provided_total = provided,
                computed_total = computed,
                "Sale total mismatch, storing computed total"
            );
            Ok(computed)
        }
    }
}
