use std::sync::Arc;

use tokio::sync::broadcast;

use super::Path;

/// One applied write batch.
#[derive(Debug, Clone)]
pub struct Change {
    paths: Arc<[Path]>,
}

impl Change {
    pub fn paths(&self) -> &[Path] {
        &self.paths
    }

    /// Whether the batch changed anything at or below `path`.
    pub fn touches(&self, path: &Path) -> bool {
        self.paths.iter().any(|it| it.overlaps(path))
    }
}

/// Fans out applied batches to live listeners. A batch is published once,
/// after all of its writes are visible.
#[derive(Debug, Clone)]
pub struct ChangeFeed {
    tx: broadcast::Sender<Change>,
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> ChangeFeed {
        let (tx, _) = broadcast::channel(capacity.max(1));
        ChangeFeed { tx }
    }

    pub fn publish(&self, paths: Vec<Path>) {
        if paths.is_empty() {
            return;
        }
        let change = Change {
            paths: paths.into(),
        };
        // No receivers is fine, nobody is listening.
        if let Ok(count) = self.tx.send(change) {
            tracing::trace!("published change to {} listeners", count);
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Change> {
        self.tx.subscribe()
    }
}
