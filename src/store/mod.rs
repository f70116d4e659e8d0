//! Hierarchical document store the roster lives in.
//!
//! The tree is addressed by [`Path`]s. Writes are expressed as a [`WriteBatch`]
//! of `(path, value)` pairs that either all apply or none do; listeners learn
//! about applied batches through the store's [`ChangeFeed`].

use std::future::Future;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::keys::{Key, KeyError};

pub mod feed;
pub mod memory;
pub mod mongo;
pub mod path;
pub mod tree;

pub use feed::{Change, ChangeFeed};
pub use memory::MemoryStore;
pub use mongo::MongoStore;
pub use path::Path;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("batch writes both '{0}' and its subtree '{1}'")]
    OverlappingPaths(Path, Path),
    #[error("path '{0}' doesn't belong to a professor")]
    Unscoped(Path),
    #[error("batch spans more than one professor")]
    CrossDocument,
    #[error(transparent)]
    Key(#[from] KeyError),
    #[error(transparent)]
    Database(#[from] mongodb::error::Error),
    #[error(transparent)]
    Bson(#[from] bson::ser::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Writes that apply atomically. Writing `null` removes a node.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    writes: Vec<(Path, Value)>,
}

impl WriteBatch {
    pub fn new() -> WriteBatch {
        WriteBatch::default()
    }

    pub fn single(path: Path, value: Value) -> WriteBatch {
        WriteBatch {
            writes: vec![(path, value)],
        }
    }

    /// Sets each field of `fields` under `base`, leaving other children alone.
    pub fn merge(base: &Path, fields: Map<String, Value>) -> Result<WriteBatch, KeyError> {
        let mut batch = WriteBatch::new();
        for (field, value) in fields {
            batch.set(base.child(&Key::new(field)?), value);
        }
        Ok(batch)
    }

    pub fn set(&mut self, path: Path, value: Value) -> &mut WriteBatch {
        self.writes.push((path, value));
        self
    }

    pub fn remove(&mut self, path: Path) -> &mut WriteBatch {
        self.set(path, Value::Null)
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub fn paths(&self) -> Vec<Path> {
        self.writes.iter().map(|(p, _)| p.clone()).collect()
    }

    pub fn into_writes(self) -> Vec<(Path, Value)> {
        self.writes
    }

    /// Rejects batches where one write targets the subtree of another; the
    /// outcome of such a batch would depend on write order.
    pub fn validate(&self) -> Result<(), StoreError> {
        let mut paths: Vec<&Path> = self.writes.iter().map(|(p, _)| p).collect();
        paths.sort();
        // Sorted, an ancestor is directly followed by (one of) its descendants.
        for pair in paths.windows(2) {
            if pair[0].contains(pair[1]) {
                return Err(StoreError::OverlappingPaths(
                    pair[0].clone(),
                    pair[1].clone(),
                ));
            }
        }
        Ok(())
    }
}

pub trait DocumentStore: Clone + Send + Sync + 'static {
    /// Reads the subtree at `path`; `None` if nothing is stored there.
    fn get(&self, path: &Path) -> impl Future<Output = Result<Option<Value>, StoreError>> + Send;

    /// Applies all writes of `batch` atomically and publishes one change.
    fn apply(&self, batch: WriteBatch) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Writes `value` at `path` unless something is already stored there.
    /// Returns whether the value was written.
    fn create(
        &self,
        path: &Path,
        value: Value,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    fn feed(&self) -> &ChangeFeed;

    fn set(&self, path: Path, value: Value) -> impl Future<Output = Result<(), StoreError>> + Send {
        self.apply(WriteBatch::single(path, value))
    }

    fn update(
        &self,
        path: &Path,
        fields: Map<String, Value>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send {
        async move {
            let batch = WriteBatch::merge(path, fields)?;
            self.apply(batch).await
        }
    }

    fn remove(&self, path: Path) -> impl Future<Output = Result<(), StoreError>> + Send {
        self.apply(WriteBatch::single(path, Value::Null))
    }
}

/// Store backend picked by configuration.
#[derive(Debug, Clone)]
pub enum AnyStore {
    Memory(MemoryStore),
    Mongo(MongoStore),
}

impl DocumentStore for AnyStore {
    async fn get(&self, path: &Path) -> Result<Option<Value>, StoreError> {
        match self {
            AnyStore::Memory(store) => store.get(path).await,
            AnyStore::Mongo(store) => store.get(path).await,
        }
    }

    async fn apply(&self, batch: WriteBatch) -> Result<(), StoreError> {
        match self {
            AnyStore::Memory(store) => store.apply(batch).await,
            AnyStore::Mongo(store) => store.apply(batch).await,
        }
    }

    async fn create(&self, path: &Path, value: Value) -> Result<bool, StoreError> {
        match self {
            AnyStore::Memory(store) => store.create(path, value).await,
            AnyStore::Mongo(store) => store.create(path, value).await,
        }
    }

    fn feed(&self) -> &ChangeFeed {
        match self {
            AnyStore::Memory(store) => store.feed(),
            AnyStore::Mongo(store) => store.feed(),
        }
    }
}
