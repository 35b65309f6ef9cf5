use async_trait::async_trait;
use mongodb::bson::{Bson, Document};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::{DocumentStore, Filter, Query, SortDirection, StoreError, StoreTransaction, Write};

#[derive(Debug, Clone)]
struct Versioned {
    version: u64,
    doc: Document,
}

type Collections = HashMap<String, HashMap<String, Versioned>>;

#[derive(Debug, Default)]
struct State {
    next_version: u64,
    collections: Collections,
}

impl State {
    fn entry(&self, collection: &str, id: &str) -> Option<&Versioned> {
        self.collections.get(collection).and_then(|c| c.get(id))
    }

    /// Apply writes to a copy and swap it in only if every write succeeded.
    fn apply_all(&mut self, writes: Vec<Write>) -> Result<(), StoreError> {
        let mut staged = self.collections.clone();
        let mut version = self.next_version;

        for write in writes {
            version += 1;
            match write {
                Write::Set {
                    collection,
                    id,
                    mut doc,
                } => {
                    doc.insert("_id", id.clone());
                    staged
                        .entry(collection)
                        .or_default()
                        .insert(id, Versioned { version, doc });
                }
                Write::Update {
                    collection,
                    id,
                    fields,
                } => {
                    let entry = staged
                        .get_mut(&collection)
                        .and_then(|c| c.get_mut(&id))
                        .ok_or_else(|| StoreError::NotFound {
                            collection: collection.clone(),
                            id: id.clone(),
                        })?;
                    for (path, value) in fields {
                        set_path(&mut entry.doc, &path, value);
                    }
                    entry.version = version;
                }
                Write::Delete { collection, id } => {
                    if let Some(c) = staged.get_mut(&collection) {
                        c.remove(&id);
                    }
                }
            }
        }

        self.collections = staged;
        self.next_version = version;
        Ok(())
    }

    fn matching(&self, query: &Query) -> Vec<Document> {
        self.collections
            .get(&query.collection)
            .map(|c| {
                c.values()
                    .filter(|v| query.filters.iter().all(|f| matches_filter(&v.doc, f)))
                    .map(|v| v.doc.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// In-process store with optimistic transactions.
///
/// Each document carries a version. A transaction remembers the version of
/// every document it read and refuses to commit if any of them moved.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, StoreError> {
        lock_state(&self.state)
    }
}

fn lock_state(state: &Mutex<State>) -> Result<MutexGuard<'_, State>, StoreError> {
    state
        .lock()
        .map_err(|e| StoreError::Backend(anyhow::anyhow!("Memory store mutex poisoned: {}", e)))
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        Ok(self.lock()?.entry(collection, id).map(|v| v.doc.clone()))
    }

    async fn set(&self, collection: &str, id: &str, doc: Document) -> Result<(), StoreError> {
        self.lock()?.apply_all(vec![Write::set(collection, id, doc)])
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        fields: Document,
    ) -> Result<bool, StoreError> {
        let mut state = self.lock()?;
        if state.entry(collection, id).is_none() {
            return Ok(false);
        }
        state.apply_all(vec![Write::update(collection, id, fields)])?;
        Ok(true)
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool, StoreError> {
        let mut state = self.lock()?;
        let existed = state.entry(collection, id).is_some();
        state.apply_all(vec![Write::delete(collection, id)])?;
        Ok(existed)
    }

    async fn query(&self, query: &Query) -> Result<Vec<Document>, StoreError> {
        let mut docs = self.lock()?.matching(query);

        if let Some((field, direction)) = &query.order_by {
            docs.sort_by(|a, b| {
                let ord = compare_bson(
                    get_path(a, field).unwrap_or(&Bson::Null),
                    get_path(b, field).unwrap_or(&Bson::Null),
                )
                .unwrap_or(Ordering::Equal);
                match direction {
                    SortDirection::Ascending => ord,
                    SortDirection::Descending => ord.reverse(),
                }
            });
        }

        if let Some(limit) = query.limit {
            docs.truncate(limit.max(0) as usize);
        }

        Ok(docs)
    }

    async fn count(&self, query: &Query) -> Result<u64, StoreError> {
        Ok(self.lock()?.matching(query).len() as u64)
    }

    async fn batch_get(
        &self,
        collection: &str,
        ids: &[String],
    ) -> Result<Vec<Document>, StoreError> {
        let state = self.lock()?;
        Ok(ids
            .iter()
            .filter_map(|id| state.entry(collection, id).map(|v| v.doc.clone()))
            .collect())
    }

    async fn batch_commit(&self, writes: Vec<Write>) -> Result<(), StoreError> {
        self.lock()?.apply_all(writes)
    }

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        Ok(Box::new(MemoryTransaction {
            state: self.state.clone(),
            reads: HashMap::new(),
            writes: Vec::new(),
        }))
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        self.lock().map(|_| ())
    }
}

struct MemoryTransaction {
    state: Arc<Mutex<State>>,
    /// Version observed per (collection, id); `None` means it did not exist.
    reads: HashMap<(String, String), Option<u64>>,
    writes: Vec<Write>,
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn get(&mut self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        let state = lock_state(&self.state)?;
        let current = state.entry(collection, id);
        let version = current.map(|v| v.version);
        let key = (collection.to_string(), id.to_string());

        match self.reads.get(&key) {
            Some(seen) if *seen != version => {
                return Err(StoreError::Conflict(format!(
                    "{}/{} changed during the transaction",
                    collection, id
                )));
            }
            Some(_) => {}
            None => {
                self.reads.insert(key, version);
            }
        }

        Ok(current.map(|v| v.doc.clone()))
    }

    fn stage(&mut self, write: Write) {
        self.writes.push(write);
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryTransaction {
            state: shared,
            reads,
            writes,
        } = *self;
        let mut state = lock_state(&shared)?;

        for ((collection, id), seen) in &reads {
            let current = state.entry(collection, id).map(|v| v.version);
            if current != *seen {
                return Err(StoreError::Conflict(format!(
                    "{}/{} was modified by a concurrent transaction",
                    collection, id
                )));
            }
        }

        state.apply_all(writes)
    }

    async fn abort(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}

fn get_path<'a>(doc: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut parts = path.split('.');
    let mut current = doc.get(parts.next()?)?;
    for part in parts {
        current = match current {
            Bson::Document(inner) => inner.get(part)?,
            _ => return None,
        };
    }
    Some(current)
}

fn set_path(doc: &mut Document, path: &str, value: Bson) {
    match path.split_once('.') {
        None => {
            doc.insert(path, value);
        }
        Some((head, rest)) => {
            if !matches!(doc.get(head), Some(Bson::Document(_))) {
                doc.insert(head, Document::new());
            }
            if let Some(Bson::Document(child)) = doc.get_mut(head) {
                set_path(child, rest, value);
            }
        }
    }
}

fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(v) => Some(f64::from(*v)),
        Bson::Int64(v) => Some(*v as f64),
        Bson::Double(v) => Some(*v),
        _ => None,
    }
}

fn compare_bson(a: &Bson, b: &Bson) -> Option<Ordering> {
    match (a, b) {
        (Bson::String(x), Bson::String(y)) => Some(x.cmp(y)),
        (Bson::DateTime(x), Bson::DateTime(y)) => Some(x.cmp(y)),
        (Bson::Boolean(x), Bson::Boolean(y)) => Some(x.cmp(y)),
        (Bson::Null, Bson::Null) => Some(Ordering::Equal),
        _ => match (as_f64(a), as_f64(b)) {
            (Some(x), Some(y)) => x.partial_cmp(&y),
            _ => None,
        },
    }
}

fn matches_filter(doc: &Document, filter: &Filter) -> bool {
    match filter {
        // Like MongoDB, an equality match on null also matches a missing field.
        Filter::Eq(field, expected) => {
            let actual = get_path(doc, field).unwrap_or(&Bson::Null);
            compare_bson(actual, expected) == Some(Ordering::Equal)
        }
        Filter::Gte(field, bound) => get_path(doc, field)
            .and_then(|actual| compare_bson(actual, bound))
            .map_or(false, |ord| ord != Ordering::Less),
        Filter::Lte(field, bound) => get_path(doc, field)
            .and_then(|actual| compare_bson(actual, bound))
            .map_or(false, |ord| ord != Ordering::Greater),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::collections::PRODUCTS;
    use mongodb::bson::doc;

    async fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        store
            .set(PRODUCTS, "p1", doc! { "business_id": "b1", "stock": 5_i64 })
            .await
            .unwrap();
        store
            .set(PRODUCTS, "p2", doc! { "business_id": "b2", "stock": 1_i64 })
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn transaction_writes_are_invisible_until_commit() {
        let store = seeded().await;
        let mut tx = store.begin().await.unwrap();
        tx.get(PRODUCTS, "p1").await.unwrap();
        tx.stage(Write::update(PRODUCTS, "p1", doc! { "stock": 2_i64 }));

        let before = store.get(PRODUCTS, "p1").await.unwrap().unwrap();
        assert_eq!(before.get_i64("stock").unwrap(), 5);

        tx.commit().await.unwrap();
        let after = store.get(PRODUCTS, "p1").await.unwrap().unwrap();
        assert_eq!(after.get_i64("stock").unwrap(), 2);
    }

    #[tokio::test]
    async fn second_committer_on_same_document_conflicts() {
        let store = seeded().await;

        let mut first = store.begin().await.unwrap();
        let mut second = store.begin().await.unwrap();
        first.get(PRODUCTS, "p1").await.unwrap();
        second.get(PRODUCTS, "p1").await.unwrap();

        first.stage(Write::update(PRODUCTS, "p1", doc! { "stock": 4_i64 }));
        second.stage(Write::update(PRODUCTS, "p1", doc! { "stock": 3_i64 }));

        first.commit().await.unwrap();
        let err = second.commit().await.unwrap_err();
        assert!(err.is_conflict());

        let doc = store.get(PRODUCTS, "p1").await.unwrap().unwrap();
        assert_eq!(doc.get_i64("stock").unwrap(), 4);
    }

    #[tokio::test]
    async fn batch_commit_is_all_or_nothing() {
        let store = seeded().await;
        let result = store
            .batch_commit(vec![
                Write::delete(PRODUCTS, "p1"),
                Write::update(PRODUCTS, "missing", doc! { "stock": 1_i64 }),
            ])
            .await;

        assert!(matches!(result, Err(StoreError::NotFound { .. })));
        assert!(store.get(PRODUCTS, "p1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn query_filters_sorts_and_counts() {
        let store = seeded().await;
        store
            .set(PRODUCTS, "p3", doc! { "business_id": "b1", "stock": 9_i64 })
            .await
            .unwrap();

        let query = Query::collection(PRODUCTS)
            .where_eq("business_id", "b1")
            .order_by("stock", SortDirection::Descending);
        let docs = store.query(&query).await.unwrap();
        let ids: Vec<&str> = docs.iter().map(|d| d.get_str("_id").unwrap()).collect();
        assert_eq!(ids, vec!["p3", "p1"]);
        assert_eq!(store.count(&query).await.unwrap(), 2);

        let ranged = Query::collection(PRODUCTS).where_gte("stock", 2_i64).where_lte("stock", 6_i64);
        assert_eq!(store.count(&ranged).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn dotted_update_reaches_into_subdocuments() {
        let store = MemoryStore::new();
        store
            .set("businesses", "b1", doc! { "name": "Cafe" })
            .await
            .unwrap();
        assert!(store
            .update("businesses", "b1", doc! { "subscription.status": "active" })
            .await
            .unwrap());

        let doc = store.get("businesses", "b1").await.unwrap().unwrap();
        assert_eq!(
            doc.get_document("subscription").unwrap().get_str("status").unwrap(),
            "active"
        );
        assert!(!store
            .update("businesses", "nope", doc! { "name": "x" })
            .await
            .unwrap());
    }
}
