//! Categories and products.
//!
//! Every read and write is scoped to the caller's business. Creation passes
//! the plan quota first.

use mongodb::bson::{doc, Bson, DateTime, Document};
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use super::quota::{QuotaGate, ResourceKind};
use super::{OwnershipRule, ServiceError, TenantOwned, TenantScope};
use crate::db::{collections, decode, encode, query_as, DocumentStore, Query, SortDirection, Write};
use crate::models::{Category, Product, STATUS_ACTIVE};

pub const DEFAULT_CATEGORY_COLOR: &str = "#000000";

#[derive(Debug, Clone)]
pub struct NewCategory {
    pub name: String,
    pub description: Option<String>,
    pub color: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CategoryUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub color: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewProduct {
    pub name: String,
    pub category_id: Option<String>,
    pub price: f64,
    pub stock: Option<i64>,
    pub details: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ProductUpdate {
    pub name: Option<String>,
    pub category_id: Option<String>,
    pub price: Option<f64>,
    pub stock: Option<i64>,
    pub details: Option<String>,
    pub status: Option<String>,
}

#[derive(Clone)]
pub struct CatalogService {
    store: Arc<dyn DocumentStore>,
    quota: QuotaGate,
}

impl CatalogService {
    pub fn new(store: Arc<dyn DocumentStore>, quota: QuotaGate) -> Self {
        Self { store, quota }
    }

    // Categories

    pub async fn create_category(
        &self,
        scope: &TenantScope,
        input: NewCategory,
    ) -> Result<Category, ServiceError> {
        let name = required_name(&input.name, "Category")?;
        self.quota
            .enforce(&scope.business_id, ResourceKind::Categories)
            .await?;

        let now = DateTime::now();
        let category = Category {
            id: Uuid::new_v4().to_string(),
            name,
            description: input.description.unwrap_or_default(),
            color: input
                .color
                .filter(|c| !c.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_CATEGORY_COLOR.to_string()),
            business_id: scope.business_id.clone(),
            status: STATUS_ACTIVE.to_string(),
            created_at: now,
            updated_at: now,
        };

        self.store
            .set(collections::CATEGORIES, &category.id, encode(&category)?)
            .await?;

        tracing::info!(
            category_id = %category.id,
            business_id = %category.business_id,
            "Category created"
        );
        Ok(category)
    }

    pub async fn list_categories(&self, scope: &TenantScope) -> Result<Vec<Category>, ServiceError> {
        let query = Query::collection(collections::CATEGORIES)
            .where_eq("business_id", scope.business_id.as_str())
            .order_by("created_at", SortDirection::Descending);
        Ok(query_as(self.store.as_ref(), &query).await?)
    }

    pub async fn get_category(&self, scope: &TenantScope, id: &str) -> Result<Category, ServiceError> {
        scope
            .load(
                self.store.as_ref(),
                collections::CATEGORIES,
                id,
                "Category",
                OwnershipRule::AnyMember,
            )
            .await
    }

    pub async fn update_category(
        &self,
        scope: &TenantScope,
        id: &str,
        update: CategoryUpdate,
    ) -> Result<(), ServiceError> {
        let _: Category = self.get_category(scope, id).await?;

        let mut fields = doc! { "updated_at": DateTime::now() };
        if let Some(name) = update.name {
            fields.insert("name", required_name(&name, "Category")?);
        }
        if let Some(description) = update.description {
            fields.insert("description", description);
        }
        if let Some(color) = update.color {
            fields.insert("color", color);
        }
        if let Some(status) = update.status {
            fields.insert("status", status);
        }

        self.apply_update(collections::CATEGORIES, id, "Category", fields)
            .await
    }

    pub async fn delete_category(&self, scope: &TenantScope, id: &str) -> Result<(), ServiceError> {
        let _: Category = self.get_category(scope, id).await?;
        self.store.delete(collections::CATEGORIES, id).await?;
        tracing::info!(category_id = %id, business_id = %scope.business_id, "Category deleted");
        Ok(())
    }

    pub async fn bulk_delete_categories(
        &self,
        scope: &TenantScope,
        ids: &[String],
    ) -> Result<usize, ServiceError> {
        self.bulk_delete::<Category>(scope, collections::CATEGORIES, ids)
            .await
    }

    // Products

    pub async fn create_product(
        &self,
        scope: &TenantScope,
        input: NewProduct,
    ) -> Result<Product, ServiceError> {
        let name = required_name(&input.name, "Product")?;
        validate_price(input.price)?;
        let stock = input.stock.unwrap_or(0);
        validate_stock(stock)?;
        let category_id = normalize_category_id(input.category_id);
        if let Some(category_id) = &category_id {
            self.ensure_category(scope, category_id).await?;
        }

        self.quota
            .enforce(&scope.business_id, ResourceKind::Products)
            .await?;

        let now = DateTime::now();
        let product = Product {
            id: Uuid::new_v4().to_string(),
            name,
            category_id,
            price: input.price,
            stock,
            details: input.details.unwrap_or_default(),
            business_id: scope.business_id.clone(),
            status: STATUS_ACTIVE.to_string(),
            created_at: now,
            updated_at: now,
        };

        self.store
            .set(collections::PRODUCTS, &product.id, encode(&product)?)
            .await?;

        tracing::info!(
            product_id = %product.id,
            business_id = %product.business_id,
            stock = product.stock,
            "Product created"
        );
        Ok(product)
    }

    pub async fn list_products(
        &self,
        scope: &TenantScope,
        category_id: Option<&str>,
    ) -> Result<Vec<Product>, ServiceError> {
        let mut query = Query::collection(collections::PRODUCTS)
            .where_eq("business_id", scope.business_id.as_str())
            .order_by("created_at", SortDirection::Descending);
        if let Some(category_id) = category_id.filter(|c| !c.is_empty()) {
            query = query.where_eq("category_id", category_id);
        }
        Ok(query_as(self.store.as_ref(), &query).await?)
    }

    pub async fn get_product(&self, scope: &TenantScope, id: &str) -> Result<Product, ServiceError> {
        scope
            .load(
                self.store.as_ref(),
                collections::PRODUCTS,
                id,
                "Product",
                OwnershipRule::AnyMember,
            )
            .await
    }

    pub async fn update_product(
        &self,
        scope: &TenantScope,
        id: &str,
        update: ProductUpdate,
    ) -> Result<(), ServiceError> {
        let _: Product = self.get_product(scope, id).await?;

        let mut fields = doc! { "updated_at": DateTime::now() };
        if let Some(name) = update.name {
            fields.insert("name", required_name(&name, "Product")?);
        }
        if let Some(category_id) = update.category_id {
            match normalize_category_id(Some(category_id)) {
                Some(category_id) => {
                    self.ensure_category(scope, &category_id).await?;
                    fields.insert("category_id", category_id);
                }
                None => {
                    fields.insert("category_id", Bson::Null);
                }
            }
        }
        if let Some(price) = update.price {
            validate_price(price)?;
            fields.insert("price", price);
        }
        if let Some(stock) = update.stock {
            validate_stock(stock)?;
            fields.insert("stock", stock);
        }
        if let Some(details) = update.details {
            fields.insert("details", details);
        }
        if let Some(status) = update.status {
            fields.insert("status", status);
        }

        self.apply_update(collections::PRODUCTS, id, "Product", fields)
            .await
    }

    pub async fn delete_product(&self, scope: &TenantScope, id: &str) -> Result<(), ServiceError> {
        let _: Product = self.get_product(scope, id).await?;
        self.store.delete(collections::PRODUCTS, id).await?;
        tracing::info!(product_id = %id, business_id = %scope.business_id, "Product deleted");
        Ok(())
    }

    pub async fn bulk_delete_products(
        &self,
        scope: &TenantScope,
        ids: &[String],
    ) -> Result<usize, ServiceError> {
        self.bulk_delete::<Product>(scope, collections::PRODUCTS, ids)
            .await
    }

    async fn ensure_category(&self, scope: &TenantScope, category_id: &str) -> Result<(), ServiceError> {
        let _: Category = scope
            .load(
                self.store.as_ref(),
                collections::CATEGORIES,
                category_id,
                "Category",
                OwnershipRule::AnyMember,
            )
            .await?;
        Ok(())
    }

    async fn apply_update(
        &self,
        collection: &str,
        id: &str,
        label: &str,
        fields: Document,
    ) -> Result<(), ServiceError> {
        if !self.store.update(collection, id, fields).await? {
            return Err(ServiceError::NotFound(format!("{} not found", label)));
        }
        Ok(())
    }

    /// Fetch every id in one read, keep the caller's own documents, delete
    /// those in one batch. Foreign and unknown ids are skipped.
    async fn bulk_delete<T>(
        &self,
        scope: &TenantScope,
        collection: &str,
        ids: &[String],
    ) -> Result<usize, ServiceError>
    where
        T: serde::de::DeserializeOwned + TenantOwned,
    {
        let unique: Vec<String> = {
            let mut seen = HashSet::new();
            ids.iter()
                .map(|id| id.trim())
                .filter(|id| !id.is_empty() && seen.insert(*id))
                .map(str::to_string)
                .collect()
        };
        if unique.is_empty() {
            return Err(ServiceError::Validation(
                "ids must be a non-empty array".to_string(),
            ));
        }

        let docs = self.store.batch_get(collection, &unique).await?;

        let mut writes = Vec::with_capacity(docs.len());
        let mut skipped = 0usize;
        for doc in docs {
            let Some(id) = doc.get_str("_id").ok().map(str::to_string) else {
                continue;
            };
            let resource: T = decode(doc)?;
            if resource.business_id() == scope.business_id {
                writes.push(Write::delete(collection, &id));
            } else {
                skipped += 1;
            }
        }

        if skipped > 0 {
            tracing::warn!(
                user_id = %scope.user_id,
                business_id = %scope.business_id,
                collection = %collection,
                skipped,
                "Bulk delete skipped documents owned by another business"
            );
        }

        let deleted = writes.len();
        if deleted > 0 {
            self.store.batch_commit(writes).await?;
        }

        tracing::info!(
            business_id = %scope.business_id,
            collection = %collection,
            requested = unique.len(),
            deleted,
            "Bulk delete completed"
        );
        Ok(deleted)
    }
}

fn required_name(name: &str, label: &str) -> Result<String, ServiceError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ServiceError::Validation(format!("{} name is required", label)));
    }
    Ok(trimmed.to_string())
}

fn validate_price(price: f64) -> Result<(), ServiceError> {
    if !price.is_finite() || price < 0.0 {
        return Err(ServiceError::Validation(
            "price must be a non-negative number".to_string(),
        ));
    }
    Ok(())
}

fn validate_stock(stock: i64) -> Result<(), ServiceError> {
    if stock < 0 {
        return Err(ServiceError::Validation(
            "stock must be a non-negative integer".to_string(),
        ));
    }
    Ok(())
}

fn normalize_category_id(category_id: Option<String>) -> Option<String> {
    category_id
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::models::{Business, Role};

    async fn setup() -> (Arc<dyn DocumentStore>, CatalogService) {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        for id in ["b1", "b2"] {
            let now = DateTime::now();
            let business = Business {
                id: id.to_string(),
                name: format!("Business {}", id),
                address: String::new(),
                contact: String::new(),
                business_type: "retail".into(),
                owner_id: format!("owner-{}", id),
                status: STATUS_ACTIVE.into(),
                settings: Default::default(),
                subscription: None,
                created_at: now,
                updated_at: now,
            };
            store
                .set(collections::BUSINESSES, id, encode(&business).unwrap())
                .await
                .unwrap();
        }
        let catalog = CatalogService::new(store.clone(), QuotaGate::new(store.clone()));
        (store, catalog)
    }

    fn scope(business_id: &str) -> TenantScope {
        TenantScope {
            user_id: format!("user-{}", business_id),
            business_id: business_id.to_string(),
            role: Role::Staff,
        }
    }

    fn product(name: &str, category_id: Option<&str>) -> NewProduct {
        NewProduct {
            name: name.to_string(),
            category_id: category_id.map(String::from),
            price: 2.5,
            stock: None,
            details: None,
        }
    }

    #[tokio::test]
    async fn defaults_are_applied_on_create() {
        let (_, catalog) = setup().await;
        let category = catalog
            .create_category(
                &scope("b1"),
                NewCategory {
                    name: " Beverages ".into(),
                    description: None,
                    color: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(category.name, "Beverages");
        assert_eq!(category.color, DEFAULT_CATEGORY_COLOR);
        assert_eq!(category.status, STATUS_ACTIVE);

        let product = catalog
            .create_product(&scope("b1"), product("Latte", Some(&category.id)))
            .await
            .unwrap();
        assert_eq!(product.stock, 0);
        assert_eq!(product.details, "");
        assert_eq!(product.category_id.as_deref(), Some(category.id.as_str()));
    }

    #[tokio::test]
    async fn product_rejects_foreign_category_and_negative_numbers() {
        let (_, catalog) = setup().await;
        let foreign = catalog
            .create_category(
                &scope("b2"),
                NewCategory {
                    name: "Other".into(),
                    description: None,
                    color: None,
                },
            )
            .await
            .unwrap();

        assert!(matches!(
            catalog
                .create_product(&scope("b1"), product("Latte", Some(&foreign.id)))
                .await,
            Err(ServiceError::Forbidden(_))
        ));
        assert!(matches!(
            catalog
                .create_product(&scope("b1"), product("Latte", Some("missing")))
                .await,
            Err(ServiceError::NotFound(_))
        ));

        let mut negative = product("Latte", None);
        negative.price = -1.0;
        assert!(matches!(
            catalog.create_product(&scope("b1"), negative).await,
            Err(ServiceError::Validation(_))
        ));

        let created = catalog
            .create_product(&scope("b1"), product("Latte", None))
            .await
            .unwrap();
        assert!(matches!(
            catalog
                .update_product(
                    &scope("b1"),
                    &created.id,
                    ProductUpdate {
                        stock: Some(-3),
                        ..Default::default()
                    }
                )
                .await,
            Err(ServiceError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn product_list_filters_by_category() {
        let (_, catalog) = setup().await;
        let category = catalog
            .create_category(
                &scope("b1"),
                NewCategory {
                    name: "Food".into(),
                    description: None,
                    color: Some("#ff0000".into()),
                },
            )
            .await
            .unwrap();
        catalog
            .create_product(&scope("b1"), product("Bagel", Some(&category.id)))
            .await
            .unwrap();
        catalog
            .create_product(&scope("b1"), product("Tea", None))
            .await
            .unwrap();
        catalog
            .create_product(&scope("b2"), product("Elsewhere", None))
            .await
            .unwrap();

        let all = catalog.list_products(&scope("b1"), None).await.unwrap();
        assert_eq!(all.len(), 2);
        let food = catalog
            .list_products(&scope("b1"), Some(&category.id))
            .await
            .unwrap();
        assert_eq!(food.len(), 1);
        assert_eq!(food[0].name, "Bagel");
    }

    #[tokio::test]
    async fn clearing_category_sets_null() {
        let (store, catalog) = setup().await;
        let category = catalog
            .create_category(
                &scope("b1"),
                NewCategory {
                    name: "Food".into(),
                    description: None,
                    color: None,
                },
            )
            .await
            .unwrap();
        let created = catalog
            .create_product(&scope("b1"), product("Bagel", Some(&category.id)))
            .await
            .unwrap();

        catalog
            .update_product(
                &scope("b1"),
                &created.id,
                ProductUpdate {
                    category_id: Some(String::new()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let stored: Product = crate::db::get_as(store.as_ref(), collections::PRODUCTS, &created.id)
            .await
            .unwrap()
            .unwrap();
        assert!(stored.category_id.is_none());
    }

    #[tokio::test]
    async fn bulk_delete_rejects_empty_input() {
        let (_, catalog) = setup().await;
        assert!(matches!(
            catalog.bulk_delete_products(&scope("b1"), &[]).await,
            Err(ServiceError::Validation(_))
        ));
    }
}
