use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, Document},
    error::{Error as MongoError, TRANSIENT_TRANSACTION_ERROR, UNKNOWN_TRANSACTION_COMMIT_RESULT},
    options::{
        Acknowledgment, ClientOptions, FindOptions, IndexOptions, ReadConcern, ReplaceOptions,
        TransactionOptions, WriteConcern,
    },
    Client, ClientSession, Collection, Database, IndexModel,
};
use std::time::Duration;

use super::{
    collections, DocumentStore, Query, SortDirection, StoreError, StoreTransaction, Write,
};

/// Attempts at `commitTransaction` when the server reports an unknown outcome.
const COMMIT_RETRIES: u32 = 3;

fn classify(err: MongoError) -> StoreError {
    if err.contains_label(TRANSIENT_TRANSACTION_ERROR) {
        StoreError::Conflict(err.to_string())
    } else {
        StoreError::Backend(anyhow::Error::new(err))
    }
}

/// MongoDB-backed store. Multi-document transactions need a replica set.
#[derive(Clone)]
pub struct MongoStore {
    client: Client,
    db: Database,
}

impl MongoStore {
    pub async fn connect(uri: &str, database: &str) -> Result<Self, StoreError> {
        let mut client_options = ClientOptions::parse(uri).await.map_err(|e| {
            tracing::error!("Failed to parse MongoDB connection string: {}", e);
            classify(e)
        })?;
        client_options.app_name = Some("pos-service".to_string());

        let client = Client::with_options(client_options).map_err(|e| {
            tracing::error!("Failed to create MongoDB client: {}", e);
            classify(e)
        })?;
        let db = client.database(database);

        tracing::info!(database = %database, "Connected to MongoDB");
        Ok(Self { client, db })
    }

    fn collection(&self, name: &str) -> Collection<Document> {
        self.db.collection(name)
    }

    /// Create the indexes tenant-scoped queries and quota counts rely on.
    pub async fn initialize_indexes(&self) -> Result<(), StoreError> {
        let tenant_recent = |name: &str| {
            IndexModel::builder()
                .keys(doc! { "business_id": 1, "created_at": -1 })
                .options(IndexOptions::builder().name(name.to_string()).build())
                .build()
        };

        self.collection(collections::CATEGORIES)
            .create_indexes([tenant_recent("tenant_category_idx")], None)
            .await
            .map_err(classify)?;

        let product_category = IndexModel::builder()
            .keys(doc! { "business_id": 1, "category_id": 1 })
            .options(
                IndexOptions::builder()
                    .name("tenant_product_category_idx".to_string())
                    .build(),
            )
            .build();
        self.collection(collections::PRODUCTS)
            .create_indexes(
                [tenant_recent("tenant_product_idx"), product_category],
                None,
            )
            .await
            .map_err(classify)?;

        self.collection(collections::SALES)
            .create_indexes([tenant_recent("tenant_sale_idx")], None)
            .await
            .map_err(classify)?;

        let owner = IndexModel::builder()
            .keys(doc! { "owner_id": 1 })
            .options(IndexOptions::builder().name("owner_idx".to_string()).build())
            .build();
        self.collection(collections::BUSINESSES)
            .create_indexes([owner], None)
            .await
            .map_err(classify)?;

        let member = IndexModel::builder()
            .keys(doc! { "business_id": 1 })
            .options(IndexOptions::builder().name("member_idx".to_string()).build())
            .build();
        self.collection(collections::USERS)
            .create_indexes([member], None)
            .await
            .map_err(classify)?;

        let email = IndexModel::builder()
            .keys(doc! { "email": 1 })
            .options(
                IndexOptions::builder()
                    .name("account_email_idx".to_string())
                    .unique(true)
                    .build(),
            )
            .build();
        self.collection(collections::ACCOUNTS)
            .create_indexes([email], None)
            .await
            .map_err(classify)?;

        let reset_expiry = IndexModel::builder()
            .keys(doc! { "expires_at": 1 })
            .options(
                IndexOptions::builder()
                    .name("reset_expiry_idx".to_string())
                    .expire_after(Duration::from_secs(0))
                    .build(),
            )
            .build();
        self.collection(collections::PASSWORD_RESETS)
            .create_indexes([reset_expiry], None)
            .await
            .map_err(classify)?;

        let billing_tenant = IndexModel::builder()
            .keys(doc! { "business_id": 1 })
            .options(
                IndexOptions::builder()
                    .name("tenant_transaction_idx".to_string())
                    .build(),
            )
            .build();
        self.collection(collections::TRANSACTIONS)
            .create_indexes([billing_tenant], None)
            .await
            .map_err(classify)?;

        tracing::info!("POS service indexes initialized");
        Ok(())
    }

    async fn start_transaction(&self) -> Result<MongoTransaction, StoreError> {
        let mut session = self.client.start_session(None).await.map_err(classify)?;
        let options = TransactionOptions::builder()
            .read_concern(ReadConcern::snapshot())
            .write_concern(WriteConcern::builder().w(Acknowledgment::Majority).build())
            .build();
        session.start_transaction(options).await.map_err(classify)?;

        Ok(MongoTransaction {
            db: self.db.clone(),
            session,
            writes: Vec::new(),
        })
    }
}

#[async_trait]
impl DocumentStore for MongoStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        self.collection(collection)
            .find_one(doc! { "_id": id }, None)
            .await
            .map_err(classify)
    }

    async fn set(&self, collection: &str, id: &str, mut doc: Document) -> Result<(), StoreError> {
        doc.insert("_id", id);
        self.collection(collection)
            .replace_one(
                doc! { "_id": id },
                doc,
                ReplaceOptions::builder().upsert(true).build(),
            )
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        fields: Document,
    ) -> Result<bool, StoreError> {
        let result = self
            .collection(collection)
            .update_one(doc! { "_id": id }, doc! { "$set": fields }, None)
            .await
            .map_err(classify)?;
        Ok(result.matched_count > 0)
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool, StoreError> {
        let result = self
            .collection(collection)
            .delete_one(doc! { "_id": id }, None)
            .await
            .map_err(classify)?;
        Ok(result.deleted_count > 0)
    }

    async fn query(&self, query: &Query) -> Result<Vec<Document>, StoreError> {
        let mut options = FindOptions::default();
        if let Some((field, direction)) = &query.order_by {
            let mut sort = Document::new();
            let order = match direction {
                SortDirection::Ascending => 1,
                SortDirection::Descending => -1,
            };
            sort.insert(field.clone(), order);
            options.sort = Some(sort);
        }
        options.limit = query.limit;

        let cursor = self
            .collection(&query.collection)
            .find(query.filter_document(), options)
            .await
            .map_err(classify)?;
        cursor.try_collect().await.map_err(classify)
    }

    async fn count(&self, query: &Query) -> Result<u64, StoreError> {
        self.collection(&query.collection)
            .count_documents(query.filter_document(), None)
            .await
            .map_err(classify)
    }

    async fn batch_get(
        &self,
        collection: &str,
        ids: &[String],
    ) -> Result<Vec<Document>, StoreError> {
        let cursor = self
            .collection(collection)
            .find(doc! { "_id": { "$in": ids } }, None)
            .await
            .map_err(classify)?;
        let found: Vec<Document> = cursor.try_collect().await.map_err(classify)?;

        Ok(ids
            .iter()
            .filter_map(|id| {
                found
                    .iter()
                    .find(|d| d.get_str("_id").map_or(false, |v| v == id))
                    .cloned()
            })
            .collect())
    }

    async fn batch_commit(&self, writes: Vec<Write>) -> Result<(), StoreError> {
        let mut tx = self.start_transaction().await?;
        for write in writes {
            tx.stage(write);
        }
        Box::new(tx).commit().await
    }

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        Ok(Box::new(self.start_transaction().await?))
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        self.db
            .run_command(doc! { "ping": 1 }, None)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "MongoDB health check failed");
                classify(e)
            })?;
        Ok(())
    }
}

struct MongoTransaction {
    db: Database,
    session: ClientSession,
    writes: Vec<Write>,
}

impl MongoTransaction {
    async fn apply(&mut self, write: Write) -> Result<(), StoreError> {
        match write {
            Write::Set {
                collection,
                id,
                mut doc,
            } => {
                doc.insert("_id", id.as_str());
                self.db
                    .collection::<Document>(&collection)
                    .replace_one_with_session(
                        doc! { "_id": id.as_str() },
                        doc,
                        ReplaceOptions::builder().upsert(true).build(),
                        &mut self.session,
                    )
                    .await
                    .map_err(classify)?;
            }
            Write::Update {
                collection,
                id,
                fields,
            } => {
                let result = self
                    .db
                    .collection::<Document>(&collection)
                    .update_one_with_session(
                        doc! { "_id": id.as_str() },
                        doc! { "$set": fields },
                        None,
                        &mut self.session,
                    )
                    .await
                    .map_err(classify)?;
                if result.matched_count == 0 {
                    return Err(StoreError::NotFound { collection, id });
                }
            }
            Write::Delete { collection, id } => {
                self.db
                    .collection::<Document>(&collection)
                    .delete_one_with_session(doc! { "_id": id.as_str() }, None, &mut self.session)
                    .await
                    .map_err(classify)?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl StoreTransaction for MongoTransaction {
    async fn get(&mut self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        self.db
            .collection::<Document>(collection)
            .find_one_with_session(doc! { "_id": id }, None, &mut self.session)
            .await
            .map_err(classify)
    }

    fn stage(&mut self, write: Write) {
        self.writes.push(write);
    }

    async fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
        let writes = std::mem::take(&mut self.writes);
        for write in writes {
            if let Err(err) = self.apply(write).await {
                if let Err(abort_err) = self.session.abort_transaction().await {
                    tracing::warn!(error = %abort_err, "Failed to abort MongoDB transaction");
                }
                return Err(err);
            }
        }

        // The outcome of a commit that reports UnknownTransactionCommitResult is
        // retried as a commit, never by replaying the transaction body.
        let mut attempt = 0;
        loop {
            match self.session.commit_transaction().await {
                Ok(()) => return Ok(()),
                Err(err)
                    if err.contains_label(UNKNOWN_TRANSACTION_COMMIT_RESULT)
                        && attempt + 1 < COMMIT_RETRIES =>
                {
                    attempt += 1;
                    tracing::warn!(error = %err, attempt, "Retrying transaction commit");
                }
                Err(err) => return Err(classify(err)),
            }
        }
    }

    async fn abort(mut self: Box<Self>) -> Result<(), StoreError> {
        self.session.abort_transaction().await.map_err(classify)
    }
}
