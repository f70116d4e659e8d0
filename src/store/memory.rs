use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;

use super::{tree, ChangeFeed, DocumentStore, Path, StoreError, WriteBatch};

/// Whole tree in one JSON value behind a lock. Batches apply under a single
/// write lock, so readers see either none or all of a batch.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    tree: Arc<RwLock<Value>>,
    applied: Arc<AtomicU64>,
    feed: ChangeFeed,
}

impl MemoryStore {
    pub fn new(feed_capacity: usize) -> MemoryStore {
        MemoryStore {
            tree: Arc::new(RwLock::new(Value::Null)),
            applied: Arc::new(AtomicU64::new(0)),
            feed: ChangeFeed::new(feed_capacity),
        }
    }

    /// Number of batches applied so far.
    pub fn applied_batches(&self) -> u64 {
        self.applied.load(Ordering::SeqCst)
    }

    pub async fn dump(&self) -> Value {
        self.tree.read().await.clone()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        MemoryStore::new(256)
    }
}

impl DocumentStore for MemoryStore {
    async fn get(&self, path: &Path) -> Result<Option<Value>, StoreError> {
        let root = self.tree.read().await;
        Ok(tree::lookup(&root, path.segments()).cloned())
    }

    async fn apply(&self, batch: WriteBatch) -> Result<(), StoreError> {
        batch.validate()?;
        if batch.is_empty() {
            return Ok(());
        }
        let paths = batch.paths();
        {
            let mut root = self.tree.write().await;
            for (path, value) in batch.into_writes() {
                tree::write(&mut root, path.segments(), value);
            }
            self.applied.fetch_add(1, Ordering::SeqCst);
        }
        self.feed.publish(paths);
        Ok(())
    }

    async fn create(&self, path: &Path, value: Value) -> Result<bool, StoreError> {
        {
            let mut root = self.tree.write().await;
            if tree::lookup(&root, path.segments()).is_some() {
                return Ok(false);
            }
            tree::write(&mut root, path.segments(), value);
            self.applied.fetch_add(1, Ordering::SeqCst);
        }
        self.feed.publish(vec![path.clone()]);
        Ok(true)
    }

    fn feed(&self) -> &ChangeFeed {
        &self.feed
    }
}
