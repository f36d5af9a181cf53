//! Run-owned connection pool
//!
//! Sessions are keyed by a digest of their connection parameters and opened
//! at most once per key, even when several entries ask for the same key while
//! the first connection attempt is still in flight.

use indexmap::IndexMap;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::OnceCell;

type Slot<S> = Arc<OnceCell<Arc<S>>>;

pub struct ConnectionPool<S> {
    sessions: Mutex<IndexMap<String, Slot<S>>>,
}

impl<S> Default for ConnectionPool<S> {
    fn default() -> Self {
        Self {
            sessions: Mutex::new(IndexMap::new()),
        }
    }
}

impl<S> ConnectionPool<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the pooled session for `key`, connecting on first use.
    ///
    /// A failed connection leaves the slot empty so a later entry retries.
    pub async fn get_or_connect<F, Fut, E>(&self, key: &str, connect: F) -> Result<Arc<S>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<S, E>>,
    {
        let slot = {
            let mut sessions = self.sessions.lock();
            sessions
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        slot.get_or_try_init(|| async { connect().await.map(Arc::new) })
            .await
            .cloned()
    }

    /// Remove every open session from the pool
    pub fn drain(&self) -> Vec<Arc<S>> {
        let slots: Vec<Slot<S>> = {
            let mut sessions = self.sessions.lock();
            sessions.drain(..).map(|(_, slot)| slot).collect()
        };
        slots
            .into_iter()
            .filter_map(|slot| slot.get().cloned())
            .collect()
    }

    /// Number of keys with an open session
    pub fn len(&self) -> usize {
        self.sessions
            .lock()
            .values()
            .filter(|slot| slot.initialized())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
