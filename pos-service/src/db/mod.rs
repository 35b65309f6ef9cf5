//! Document store seam.
//!
//! Every service receives an `Arc<dyn DocumentStore>` at construction. Production
//! wires [`MongoStore`]; tests and local runs use [`MemoryStore`], which honours
//! the same transaction contract.

mod memory;
mod mongo;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

use async_trait::async_trait;
use mongodb::bson::{self, Bson, Document};
use serde::{de::DeserializeOwned, Serialize};

pub mod collections {
    pub const ACCOUNTS: &str = "accounts";
    pub const PASSWORD_RESETS: &str = "password_resets";
    pub const USERS: &str = "users";
    pub const BUSINESSES: &str = "businesses";
    pub const CATEGORIES: &str = "categories";
    pub const PRODUCTS: &str = "products";
    pub const SALES: &str = "sales";
    pub const TRANSACTIONS: &str = "transactions";
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A concurrent writer invalidated what this transaction read.
    #[error("Transaction conflict: {0}")]
    Conflict(String),

    #[error("Document not found: {collection}/{id}")]
    NotFound { collection: String, id: String },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Store backend error: {0}")]
    Backend(#[from] anyhow::Error),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}

impl From<bson::ser::Error> for StoreError {
    fn from(err: bson::ser::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

impl From<bson::de::Error> for StoreError {
    fn from(err: bson::de::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// A mutation, applied directly in a batch or staged inside a transaction.
#[derive(Debug, Clone)]
pub enum Write {
    /// Create or fully replace a document.
    Set {
        collection: String,
        id: String,
        doc: Document,
    },
    /// `$set` the given fields; keys may be dotted paths into sub-documents.
    Update {
        collection: String,
        id: String,
        fields: Document,
    },
    Delete { collection: String, id: String },
}

impl Write {
    pub fn set(collection: &str, id: &str, doc: Document) -> Self {
        Write::Set {
            collection: collection.to_string(),
            id: id.to_string(),
            doc,
        }
    }

    pub fn update(collection: &str, id: &str, fields: Document) -> Self {
        Write::Update {
            collection: collection.to_string(),
            id: id.to_string(),
            fields,
        }
    }

    pub fn delete(collection: &str, id: &str) -> Self {
        Write::Delete {
            collection: collection.to_string(),
            id: id.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, Bson),
    Gte(String, Bson),
    Lte(String, Bson),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

#[derive(Debug, Clone)]
pub struct Query {
    pub collection: String,
    pub filters: Vec<Filter>,
    pub order_by: Option<(String, SortDirection)>,
    pub limit: Option<i64>,
}

impl Query {
    pub fn collection(name: &str) -> Self {
        Self {
            collection: name.to_string(),
            filters: Vec::new(),
            order_by: None,
            limit: None,
        }
    }

    pub fn where_eq(mut self, field: &str, value: impl Into<Bson>) -> Self {
        self.filters.push(Filter::Eq(field.to_string(), value.into()));
        self
    }

    pub fn where_gte(mut self, field: &str, value: impl Into<Bson>) -> Self {
        self.filters.push(Filter::Gte(field.to_string(), value.into()));
        self
    }

    pub fn where_lte(mut self, field: &str, value: impl Into<Bson>) -> Self {
        self.filters.push(Filter::Lte(field.to_string(), value.into()));
        self
    }

    pub fn order_by(mut self, field: &str, direction: SortDirection) -> Self {
        self.order_by = Some((field.to_string(), direction));
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Render the filters as a MongoDB query document.
    pub fn filter_document(&self) -> Document {
        let mut filter = Document::new();
        for f in &self.filters {
            let (field, op, value) = match f {
                Filter::Eq(field, value) => {
                    filter.insert(field.clone(), value.clone());
                    continue;
                }
                Filter::Gte(field, value) => (field, "$gte", value),
                Filter::Lte(field, value) => (field, "$lte", value),
            };
            match filter.get_mut(field) {
                Some(Bson::Document(ops)) => {
                    ops.insert(op, value.clone());
                }
                _ => {
                    let mut ops = Document::new();
                    ops.insert(op, value.clone());
                    filter.insert(field.clone(), ops);
                }
            }
        }
        filter
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError>;

    async fn set(&self, collection: &str, id: &str, doc: Document) -> Result<(), StoreError>;

    /// Returns `false` when the document does not exist.
    async fn update(&self, collection: &str, id: &str, fields: Document)
        -> Result<bool, StoreError>;

    /// Returns `false` when the document did not exist.
    async fn delete(&self, collection: &str, id: &str) -> Result<bool, StoreError>;

    async fn query(&self, query: &Query) -> Result<Vec<Document>, StoreError>;

    /// Exact number of documents matching the query's filters.
    async fn count(&self, query: &Query) -> Result<u64, StoreError>;

    /// Fetch several documents in one round trip. Missing ids are skipped;
    /// found documents come back in request order.
    async fn batch_get(&self, collection: &str, ids: &[String])
        -> Result<Vec<Document>, StoreError>;

    /// Apply all writes or none.
    async fn batch_commit(&self, writes: Vec<Write>) -> Result<(), StoreError>;

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError>;

    async fn health_check(&self) -> Result<(), StoreError>;
}

/// A multi-document transaction.
///
/// Reads see a consistent snapshot. Staged writes become visible together at
/// `commit`, which fails with [`StoreError::Conflict`] if anything read was
/// changed by another committer in the meantime.
#[async_trait]
pub trait StoreTransaction: Send {
    async fn get(&mut self, collection: &str, id: &str) -> Result<Option<Document>, StoreError>;

    fn stage(&mut self, write: Write);

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn abort(self: Box<Self>) -> Result<(), StoreError>;
}

pub fn encode<T: Serialize>(value: &T) -> Result<Document, StoreError> {
    Ok(bson::to_document(value)?)
}

pub fn decode<T: DeserializeOwned>(doc: Document) -> Result<T, StoreError> {
    Ok(bson::from_document(doc)?)
}

/// Typed single-document read.
pub async fn get_as<T: DeserializeOwned>(
    store: &dyn DocumentStore,
    collection: &str,
    id: &str,
) -> Result<Option<T>, StoreError> {
    store.get(collection, id).await?.map(decode).transpose()
}

/// Typed query.
pub async fn query_as<T: DeserializeOwned>(
    store: &dyn DocumentStore,
    query: &Query,
) -> Result<Vec<T>, StoreError> {
    store.query(query).await?.into_iter().map(decode).collect()
}
