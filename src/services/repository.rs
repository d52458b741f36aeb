//! Persistence collaborator.
//!
//! Services talk to [`Repository`] trait objects so the same code runs on
//! MongoDB in production and on the in-memory backend in development and
//! tests.

use std::sync::Arc;

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::{
    bson::{self, doc, oid::ObjectId, Bson, Document},
    options::FindOptions,
    Collection,
};
use tokio::sync::RwLock;

use super::database::Database;
use crate::error::{AppError, AppResult};
use crate::models::{comment::Comment, document, issue::Issue, user::User, Record};
use crate::utils::pagination::{Page, PageRequest};

pub const DELETED_AT: &str = "deleted_at";

/// Equality conditions over live records.
///
/// Only records whose `deleted_at` is null or missing match. Soft-deleted
/// records are reachable through [`Repository::find_by_id`] alone.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    conditions: Document,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: &str, value: impl Into<Bson>) -> Self {
        self.conditions.insert(field, value.into());
        self
    }

    /// MongoDB query document.
    pub fn to_document(&self) -> Document {
        let mut query = self.conditions.clone();
        query.insert(DELETED_AT, Bson::Null);
        query
    }

    /// Evaluates the filter against the BSON form of a record.
    pub fn matches(&self, record: &Document) -> bool {
        match record.get(DELETED_AT) {
            None | Some(Bson::Null) => {}
            Some(_) => return false,
        }
        self.conditions
            .iter()
            .all(|(field, expected)| record.get(field) == Some(expected))
    }
}

#[async_trait]
pub trait Repository<T: Record>: Send + Sync {
    async fn insert(&self, record: &T) -> AppResult<()>;

    /// Looks a record up by id, soft-deleted or not.
    async fn find_by_id(&self, id: &ObjectId) -> AppResult<Option<T>>;

    async fn find_one(&self, filter: &Filter) -> AppResult<Option<T>>;

    /// Overwrites an existing record. Fails with not-found if it is gone.
    async fn replace(&self, record: &T) -> AppResult<()>;

    /// Matching records in creation order, cut to the requested page.
    async fn paginate(&self, filter: &Filter, page: PageRequest) -> AppResult<Page<T>>;
}

pub struct MongoRepository<T: Record> {
    collection: Collection<T>,
}

impl<T: Record> MongoRepository<T> {
    pub fn new(db: &Database) -> Self {
        Self {
            collection: db.database.collection::<T>(T::COLLECTION),
        }
    }
}

#[async_trait]
impl<T: Record> Repository<T> for MongoRepository<T> {
    async fn insert(&self, record: &T) -> AppResult<()> {
        self.collection.insert_one(record, None).await?;
        Ok(())
    }

    async fn find_by_id(&self, id: &ObjectId) -> AppResult<Option<T>> {
        Ok(self.collection.find_one(doc! { "_id": id }, None).await?)
    }

    async fn find_one(&self, filter: &Filter) -> AppResult<Option<T>> {
        Ok(self.collection.find_one(filter.to_document(), None).await?)
    }

    async fn replace(&self, record: &T) -> AppResult<()> {
        let id = record.id();
        let result = self
            .collection
            .replace_one(doc! { "_id": id }, record, None)
            .await?;
        if result.matched_count == 0 {
            return Err(AppError::not_found(T::ENTITY, id.to_hex()));
        }
        Ok(())
    }

    async fn paginate(&self, filter: &Filter, page: PageRequest) -> AppResult<Page<T>> {
        let query = filter.to_document();
        let total = self.collection.count_documents(query.clone(), None).await?;

        let mut options = FindOptions::default();
        options.sort = Some(doc! { "_id": 1 });
        options.skip = Some(page.skip());
        options.limit = Some(page.limit as i64);

        let docs: Vec<T> = self.collection.find(query, options).await?.try_collect().await?;
        Ok(Page::new(page, total, docs))
    }
}

/// Records kept in insertion order behind an async lock.
pub struct MemoryRepository<T: Record> {
    records: RwLock<Vec<T>>,
}

impl<T: Record> Default for MemoryRepository<T> {
    fn default() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
        }
    }
}

impl<T: Record> MemoryRepository<T> {
    pub fn new() -> Self {
        Self::default()
    }

    fn matching(records: &[T], filter: &Filter) -> AppResult<Vec<T>> {
        let mut found = Vec::new();
        for record in records {
            if filter.matches(&bson::to_document(record)?) {
                found.push(record.clone());
            }
        }
        Ok(found)
    }
}

#[async_trait]
impl<T: Record> Repository<T> for MemoryRepository<T> {
    async fn insert(&self, record: &T) -> AppResult<()> {
        let mut records = self.records.write().await;
        if records.iter().any(|existing| existing.id() == record.id()) {
            return Err(AppError::conflict(format!(
                "{} \"{}\" already exists",
                T::ENTITY,
                record.id().to_hex()
            )));
        }
        records.push(record.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &ObjectId) -> AppResult<Option<T>> {
        let records = self.records.read().await;
        Ok(records.iter().find(|record| record.id() == *id).cloned())
    }

    async fn find_one(&self, filter: &Filter) -> AppResult<Option<T>> {
        let records = self.records.read().await;
        Ok(Self::matching(&records, filter)?.into_iter().next())
    }

    async fn replace(&self, record: &T) -> AppResult<()> {
        let mut records = self.records.write().await;
        match records.iter_mut().find(|existing| existing.id() == record.id()) {
            Some(existing) => {
                *existing = record.clone();
                Ok(())
            }
            None => Err(AppError::not_found(T::ENTITY, record.id().to_hex())),
        }
    }

    async fn paginate(&self, filter: &Filter, page: PageRequest) -> AppResult<Page<T>> {
        let records = self.records.read().await;
        Ok(Page::from_vec(page, Self::matching(&records, filter)?))
    }
}

/// One repository per collection.
#[derive(Clone)]
pub struct Repositories {
    pub users: Arc<dyn Repository<User>>,
    pub issues: Arc<dyn Repository<Issue>>,
    pub comments: Arc<dyn Repository<Comment>>,
    pub documents: Arc<dyn Repository<document::Document>>,
}

impl Repositories {
    pub fn mongo(db: &Database) -> Self {
        Self {
            users: Arc::new(MongoRepository::<User>::new(db)),
            issues: Arc::new(MongoRepository::<Issue>::new(db)),
            comments: Arc::new(MongoRepository::<Comment>::new(db)),
            documents: Arc::new(MongoRepository::<document::Document>::new(db)),
        }
    }

    pub fn memory() -> Self {
        Self {
            users: Arc::new(MemoryRepository::<User>::new()),
            issues: Arc::new(MemoryRepository::<Issue>::new()),
            comments: Arc::new(MemoryRepository::<Comment>::new()),
            documents: Arc::new(MemoryRepository::<document::Document>::new()),
        }
    }
}
