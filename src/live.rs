//! Live views: subscriptions that re-read a collection whenever a write
//! touches it and hand out the full, ordered list every time.

use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::broadcast::Receiver;
use tokio::task::JoinHandle;
use tracing_futures::Instrument;

use crate::data::activity::ActivityEntry;
use crate::data::class::ClassEntry;
use crate::data::student::StudentEntry;
use crate::data::{classes_path, ClassScope};
use crate::keys::Key;
use crate::roster::{project_activities, project_classes, project_students, Roster};
use crate::store::{Change, DocumentStore, Path, StoreError};

pub type Projection<T> = fn(Option<Value>) -> Vec<T>;

/// Pull-based live view of the collection at one path. The first
/// [`next`](Subscription::next) yields the current state, later ones wait for
/// a change below the path. Dropping the subscription ends it.
#[derive(Debug)]
pub struct Subscription<S, T> {
    store: S,
    path: Path,
    rx: Receiver<Change>,
    project: Projection<T>,
    primed: bool,
}

impl<S: DocumentStore, T: Send + 'static> Subscription<S, T> {
    pub fn new(store: S, path: Path, project: Projection<T>) -> Subscription<S, T> {
        // Listen before the first read so no change slips in between.
        let rx = store.feed().subscribe();
        Subscription {
            store,
            path,
            rx,
            project,
            primed: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn snapshot(&self) -> Result<Vec<T>, StoreError> {
        let node = self.store.get(&self.path).await?;
        Ok((self.project)(node))
    }

    /// Skips notifications already queued; the next snapshot covers them.
    fn drain(&mut self) {
        loop {
            match self.rx.try_recv() {
                Ok(_) | Err(TryRecvError::Lagged(_)) => continue,
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
    }

    /// Waits for the next snapshot. `None` once the store stops publishing.
    pub async fn next(&mut self) -> Option<Result<Vec<T>, StoreError>> {
        if !self.primed {
            self.primed = true;
            return Some(self.snapshot().await);
        }

        loop {
            match self.rx.recv().await {
                Ok(change) if change.touches(&self.path) => break,
                Ok(_) => continue,
                Err(RecvError::Lagged(missed)) => {
                    tracing::debug!("live view of {} lagged by {} changes", self.path, missed);
                    break;
                }
                Err(RecvError::Closed) => return None,
            }
        }
        self.drain();
        Some(self.snapshot().await)
    }

    pub fn unsubscribe(self) {
        tracing::trace!("unsubscribed from {}", self.path);
    }

    /// Delivers every snapshot to `callback` on a background task.
    ///
    /// The callback must not unsubscribe its own handle. It runs under the
    /// handle's lock, so keep it short: `unsubscribe` blocks its thread,
    /// tokio worker included, until a running callback returns.
    pub fn spawn<F>(mut self, mut callback: F) -> WatchHandle
    where
        F: FnMut(Result<Vec<T>, StoreError>) + Send + 'static,
    {
        let active = Arc::new(Mutex::new(true));
        let flag = active.clone();
        let span = tracing::debug_span!("live", path = %self.path);

        let task = tokio::spawn(
            async move {
                while let Some(snapshot) = self.next().await {
                    if !deliver(&flag, &mut callback, snapshot) {
                        break;
                    }
                }
            }
            .instrument(span),
        );

        WatchHandle {
            active,
            task: Some(task),
        }
    }
}

/// Runs the callback while holding the flag, so a concurrent unsubscribe
/// either waits for it or prevents it. The flag is a blocking mutex; a slow
/// callback stalls the unsubscribing thread for as long as it runs.
fn deliver<T, F: FnMut(T)>(flag: &Mutex<bool>, callback: &mut F, item: T) -> bool {
    let active = flag.lock().unwrap_or_else(PoisonError::into_inner);
    if *active {
        callback(item);
    }
    *active
}

/// Handle to a spawned subscription.
#[derive(Debug)]
pub struct WatchHandle {
    active: Arc<Mutex<bool>>,
    task: Option<JoinHandle<()>>,
}

impl WatchHandle {
    /// Stops the listener. Once this returns the callback doesn't run again.
    /// Blocks while a callback is running.
    pub fn unsubscribe(mut self) {
        self.stop();
    }

    pub fn is_active(&self) -> bool {
        *self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn stop(&mut self) {
        *self.active.lock().unwrap_or_else(PoisonError::into_inner) = false;
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

impl<S: DocumentStore> Roster<S> {
    pub fn watch_classes(&self, owner: &Key) -> Subscription<S, ClassEntry> {
        Subscription::new(self.store().clone(), classes_path(owner), project_classes)
    }

    /// Students of a class in key order.
    pub fn watch_students(&self, owner: &Key, class: &Key) -> Subscription<S, StudentEntry> {
        let scope = ClassScope::new(owner, class);
        Subscription::new(self.store().clone(), scope.students(), project_students)
    }

    /// Activities of a class, newest first, deleted ones hidden.
    pub fn watch_activities(&self, owner: &Key, class: &Key) -> Subscription<S, ActivityEntry> {
        let scope = ClassScope::new(owner, class);
        Subscription::new(self.store().clone(), scope.activities(), project_activities)
    }
}
