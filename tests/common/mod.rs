//! Shared test fixtures: an in-memory persistence tier with call counting
//! and failure injection.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use tierkit::{PersistError, PersistenceTier, StoredEntry};

/// Toy persistence tier backed by a `HashMap`.
///
/// Records every call so tests can verify which tier served a request, and
/// can be told to fail any operation to exercise the coordinator's
/// degradation paths. Entries stream back in insertion order.
#[derive(Debug, Default)]
pub struct TestStore<V> {
    entries: Mutex<HashMap<String, (V, u64)>>,
    order: Mutex<Vec<String>>,

    pub get_calls: AtomicUsize,
    pub set_calls: AtomicUsize,
    pub delete_calls: AtomicUsize,
    pub cleanup_calls: AtomicUsize,
    pub flush_calls: AtomicUsize,
    pub len_calls: AtomicUsize,
    pub stream_calls: AtomicUsize,
    pub close_calls: AtomicUsize,

    pub fail_get: AtomicBool,
    pub fail_set: AtomicBool,
    pub fail_delete: AtomicBool,
    pub fail_flush: AtomicBool,
    pub fail_close: AtomicBool,

    /// What `cleanup` reports as its removed count.
    pub cleanup_result: AtomicUsize,
    pub last_cleanup_max_age: Mutex<Option<Duration>>,
}

impl<V> TestStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            order: Mutex::new(Vec::new()),
            get_calls: AtomicUsize::new(0),
            set_calls: AtomicUsize::new(0),
            delete_calls: AtomicUsize::new(0),
            cleanup_calls: AtomicUsize::new(0),
            flush_calls: AtomicUsize::new(0),
            len_calls: AtomicUsize::new(0),
            stream_calls: AtomicUsize::new(0),
            close_calls: AtomicUsize::new(0),
            fail_get: AtomicBool::new(false),
            fail_set: AtomicBool::new(false),
            fail_delete: AtomicBool::new(false),
            fail_flush: AtomicBool::new(false),
            fail_close: AtomicBool::new(false),
            cleanup_result: AtomicUsize::new(0),
            last_cleanup_max_age: Mutex::new(None),
        }
    }

    /// Pre-populates an entry without counting a `set` call.
    pub fn seed(&self, key: &str, value: V, expiry: u64) {
        let mut entries = self.entries.lock();
        if entries.insert(key.to_string(), (value, expiry)).is_none() {
            self.order.lock().push(key.to_string());
        }
    }

    /// Returns how many entries the backend holds.
    pub fn stored_len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns `true` if the backend holds `key`.
    pub fn stored_contains(&self, key: &str) -> bool {
        self.entries.lock().contains_key(key)
    }

    pub fn calls(&self, counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    fn gate(&self, ctx: &CancellationToken, failing: &AtomicBool) -> Result<(), PersistError> {
        if ctx.is_cancelled() {
            return Err(PersistError::Cancelled);
        }
        if failing.load(Ordering::SeqCst) {
            return Err(PersistError::Io("injected failure".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl<V> PersistenceTier<String, V> for TestStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn validate_key(&self, key: &String) -> Result<(), PersistError> {
        if key.is_empty() {
            return Err(PersistError::InvalidKey("empty key".into()));
        }
        if key.contains('/') || key.contains("..") {
            return Err(PersistError::InvalidKey(format!(
                "key {key:?} contains path separators"
            )));
        }
        Ok(())
    }

    async fn get(
        &self,
        ctx: &CancellationToken,
        key: &String,
    ) -> Result<Option<(V, u64)>, PersistError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        self.gate(ctx, &self.fail_get)?;
        Ok(self.entries.lock().get(key).cloned())
    }

    async fn set(
        &self,
        ctx: &CancellationToken,
        key: &String,
        value: &V,
        expiry: u64,
    ) -> Result<(), PersistError> {
        self.set_calls.fetch_add(1, Ordering::SeqCst);
        self.gate(ctx, &self.fail_set)?;
        self.seed(key, value.clone(), expiry);
        Ok(())
    }

    async fn delete(&self, ctx: &CancellationToken, key: &String) -> Result<(), PersistError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.gate(ctx, &self.fail_delete)?;
        if self.entries.lock().remove(key).is_some() {
            self.order.lock().retain(|k| k != key);
        }
        Ok(())
    }

    async fn cleanup(
        &self,
        ctx: &CancellationToken,
        max_age: Duration,
    ) -> Result<usize, PersistError> {
        self.cleanup_calls.fetch_add(1, Ordering::SeqCst);
        self.gate(ctx, &self.fail_get)?;
        *self.last_cleanup_max_age.lock() = Some(max_age);
        Ok(self.cleanup_result.load(Ordering::SeqCst))
    }

    async fn flush(&self, ctx: &CancellationToken) -> Result<usize, PersistError> {
        self.flush_calls.fetch_add(1, Ordering::SeqCst);
        self.gate(ctx, &self.fail_flush)?;
        let mut entries = self.entries.lock();
        let removed = entries.len();
        entries.clear();
        self.order.lock().clear();
        Ok(removed)
    }

    async fn len(&self, ctx: &CancellationToken) -> Result<usize, PersistError> {
        self.len_calls.fetch_add(1, Ordering::SeqCst);
        self.gate(ctx, &self.fail_get)?;
        Ok(self.entries.lock().len())
    }

    async fn stream_recent(
        &self,
        ctx: &CancellationToken,
        limit: usize,
    ) -> Result<BoxStream<'static, Result<StoredEntry<String, V>, PersistError>>, PersistError>
    {
        self.stream_calls.fetch_add(1, Ordering::SeqCst);
        self.gate(ctx, &self.fail_get)?;

        let entries = self.entries.lock();
        let order = self.order.lock();
        // Most recently inserted first.
        let mut recent: Vec<StoredEntry<String, V>> = order
            .iter()
            .rev()
            .filter_map(|key| {
                entries.get(key).map(|(value, expiry)| StoredEntry {
                    key: key.clone(),
                    value: value.clone(),
                    expiry: *expiry,
                })
            })
            .collect();
        if limit > 0 {
            recent.truncate(limit);
        }
        Ok(stream::iter(recent.into_iter().map(Ok)).boxed())
    }

    fn location(&self, key: &String) -> String {
        format!("test://{key}")
    }

    async fn close(&self) -> Result<(), PersistError> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_close.load(Ordering::SeqCst) {
            return Err(PersistError::Io("injected close failure".into()));
        }
        Ok(())
    }
}

/// Polls `condition` until it holds or roughly two seconds elapse.
pub async fn eventually<F>(mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
