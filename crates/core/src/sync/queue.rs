//! Durable priority queue with a bounded dead-letter set.
//!
//! Committed state lives in memory behind a synchronous `RwLock` so counts
//! and snapshots never wait on storage. Every mutation takes the async writer
//! lock, stages its change on a copy, persists the affected blobs, and only
//! then swaps the copy in. A failed write therefore leaves the in-memory view
//! exactly as it was.
//!
//! Persisted layout: two JSON arrays of [`SyncItem`] under
//! [`PENDING_QUEUE_KEY`] (queue order) and [`DEAD_LETTER_QUEUE_KEY`] (oldest
//! first).

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use outpost_common::testing::Clock;
use outpost_domain::constants::{
    CORRUPT_KEY_SUFFIX, DEAD_LETTER_QUEUE_KEY, DEFAULT_DEAD_LETTER_CAPACITY,
    MAX_ERROR_MESSAGE_LENGTH, PENDING_QUEUE_KEY,
};
use outpost_domain::{OutpostError, Priority, Result, SyncItem};
use parking_lot::RwLock;
use tracing::{debug, error, info, instrument, warn};

use crate::sync::ports::KeyValueStore;

/// Result of recording a failed delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Re-queued; `retry_count` is the updated attempt counter.
    Retrying { retry_count: u32 },
    /// Retries exhausted; moved to the dead-letter set.
    DeadLettered,
}

/// Total order of pending items: priority desc, `created_at` asc, then
/// insertion sequence.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct QueueKey {
    priority: Reverse<Priority>,
    order_at: DateTime<Utc>,
    seq: u64,
}

#[derive(Debug, Clone, Default)]
struct QueueState {
    pending: BTreeMap<QueueKey, SyncItem>,
    index: HashMap<String, QueueKey>,
    dead_letter: VecDeque<SyncItem>,
    next_seq: u64,
}

impl QueueState {
    fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id) || self.dead_letter_position(id).is_some()
    }

    fn dead_letter_position(&self, id: &str) -> Option<usize> {
        self.dead_letter.iter().position(|item| item.id == id)
    }

    /// Insert into pending; `false` when the id is already pending.
    fn insert_pending(&mut self, item: SyncItem) -> bool {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.saturating_add(1);
        self.insert_with_seq(item, seq)
    }

    /// Re-insert under a previously assigned sequence so ties on
    /// `created_at` keep their original order.
    fn insert_with_seq(&mut self, item: SyncItem, seq: u64) -> bool {
        if self.index.contains_key(&item.id) {
            return false;
        }
        let key = QueueKey {
            priority: Reverse(item.priority),
            order_at: item.created_at,
            seq,
        };
        self.index.insert(item.id.clone(), key.clone());
        self.pending.insert(key, item);
        true
    }

    fn remove_pending(&mut self, id: &str) -> Option<SyncItem> {
        let key = self.index.remove(id)?;
        self.pending.remove(&key)
    }

    /// Append to the dead-letter set, evicting the oldest entries over
    /// `capacity`. Returns the evicted items.
    fn push_dead_letter(&mut self, item: SyncItem, capacity: usize) -> Vec<SyncItem> {
        self.dead_letter.push_back(item);
        let mut evicted = Vec::new();
        while self.dead_letter.len() > capacity {
            if let Some(oldest) = self.dead_letter.pop_front() {
                evicted.push(oldest);
            }
        }
        evicted
    }
}

/// Which blobs a mutation touched, in write order.
#[derive(Debug, Clone, Copy)]
enum PersistPlan {
    Pending,
    DeadLetter,
    DeadLetterThenPending,
    PendingThenDeadLetter,
}

/// Persistent outbox queue.
pub struct DurableQueue {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    dead_letter_capacity: usize,
    state: RwLock<QueueState>,
    writer: tokio::sync::Mutex<()>,
    loaded: AtomicBool,
}

impl std::fmt::Debug for DurableQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DurableQueue")
            .field("pending", &self.pending_count())
            .field("failed", &self.failed_count())
            .field("dead_letter_capacity", &self.dead_letter_capacity)
            .finish_non_exhaustive()
    }
}

impl DurableQueue {
    /// Queue over `store`. Call [`load`](Self::load) before mutating it.
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            dead_letter_capacity: DEFAULT_DEAD_LETTER_CAPACITY,
            state: RwLock::new(QueueState::default()),
            writer: tokio::sync::Mutex::new(()),
            loaded: AtomicBool::new(false),
        }
    }

    /// Override the dead-letter bound (minimum 1).
    pub fn with_dead_letter_capacity(mut self, capacity: usize) -> Self {
        self.dead_letter_capacity = capacity.max(1);
        self
    }

    /// Hydrate both sets from storage. Subsequent calls are no-ops.
    ///
    /// Blobs that fail to parse are copied to `<key>.corrupt` and treated as
    /// empty. An id present in both sets is kept in pending only.
    ///
    /// # Errors
    /// Returns the store's error if a key cannot be read.
    #[instrument(skip(self))]
    pub async fn load(&self) -> Result<()> {
        let _writer = self.writer.lock().await;
        if self.loaded.load(Ordering::Acquire) {
            return Ok(());
        }

        let pending = self.read_blob(PENDING_QUEUE_KEY).await?;
        let dead_letter = self.read_blob(DEAD_LETTER_QUEUE_KEY).await?;

        let mut staged = QueueState::default();
        let mut duplicates = 0_usize;
        for item in pending {
            if !staged.insert_pending(item) {
                duplicates = duplicates.saturating_add(1);
            }
        }

        let mut seen = HashSet::new();
        for item in dead_letter {
            if staged.index.contains_key(&item.id) || !seen.insert(item.id.clone()) {
                duplicates = duplicates.saturating_add(1);
                continue;
            }
            staged.push_dead_letter(item, self.dead_letter_capacity);
        }

        if duplicates > 0 {
            warn!(duplicates, "Dropped duplicate queue entries while loading");
        }

        info!(
            pending = staged.pending.len(),
            failed = staged.dead_letter.len(),
            "Sync queue loaded"
        );

        *self.state.write() = staged;
        self.loaded.store(true, Ordering::Release);
        Ok(())
    }

    /// Add `item` to pending. First enqueue wins: returns `false` (and writes
    /// nothing) when the id is already pending or dead-lettered.
    ///
    /// # Errors
    /// `InvalidInput` for an empty id, or the store's error on write failure.
    #[instrument(skip(self, item), fields(item_id = %item.id))]
    pub async fn enqueue(&self, item: SyncItem) -> Result<bool> {
        if item.id.trim().is_empty() {
            return Err(OutpostError::InvalidInput("sync item id must not be empty".into()));
        }

        let _writer = self.writer.lock().await;
        let mut staged = self.state.read().clone();
        if staged.contains(&item.id) {
            debug!("Duplicate enqueue ignored");
            return Ok(false);
        }

        staged.insert_pending(item);
        self.commit(staged, PersistPlan::Pending).await?;
        Ok(true)
    }

    /// Head of the queue without removing it.
    pub fn peek(&self) -> Option<SyncItem> {
        self.state.read().pending.values().next().cloned()
    }

    /// First item in queue order whose id is not in `skip`.
    pub fn peek_excluding(&self, skip: &HashSet<String>) -> Option<SyncItem> {
        self.state.read().pending.values().find(|item| !skip.contains(&item.id)).cloned()
    }

    /// Remove and return the head of the queue.
    ///
    /// # Errors
    /// Returns the store's error; the item then stays queued.
    pub async fn dequeue(&self) -> Result<Option<SyncItem>> {
        let _writer = self.writer.lock().await;
        let mut staged = self.state.read().clone();
        let Some(id) = staged.pending.values().next().map(|item| item.id.clone()) else {
            return Ok(None);
        };
        let item = staged.remove_pending(&id);
        self.commit(staged, PersistPlan::Pending).await?;
        Ok(item)
    }

    /// Drop a delivered item. Returns `false` if it was not pending.
    ///
    /// # Errors
    /// Returns the store's error on write failure.
    #[instrument(skip(self))]
    pub async fn mark_completed(&self, id: &str) -> Result<bool> {
        let _writer = self.writer.lock().await;
        let mut staged = self.state.read().clone();
        if staged.remove_pending(id).is_none() {
            return Ok(false);
        }
        self.commit(staged, PersistPlan::Pending).await?;
        Ok(true)
    }

    /// Record a failed attempt for a pending item.
    ///
    /// The item keeps its place in queue order, or is dead-lettered once
    /// `retry_count >= max_retries`. Returns `None` if `id` is not
    /// pending.
    ///
    /// # Errors
    /// Returns the store's error on write failure.
    #[instrument(skip(self, message))]
    pub async fn mark_failed(
        &self,
        id: &str,
        message: &str,
        max_retries: u32,
    ) -> Result<Option<FailureOutcome>> {
        let _writer = self.writer.lock().await;
        let mut staged = self.state.read().clone();
        let Some(seq) = staged.index.get(id).map(|key| key.seq) else {
            return Ok(None);
        };
        let Some(mut item) = staged.remove_pending(id) else {
            return Ok(None);
        };

        item.retry_count = item.retry_count.saturating_add(1);
        item.last_error = Some(truncate_reason(message));
        item.last_retry_at = Some(self.clock.utc_now());

        if item.retry_count >= max_retries {
            let retry_count = item.retry_count;
            let evicted = staged.push_dead_letter(item, self.dead_letter_capacity);
            self.commit(staged, PersistPlan::DeadLetterThenPending).await?;
            warn!(item_id = %id, retry_count, "Retries exhausted; item moved to dead-letter set");
            log_evicted(&evicted);
            return Ok(Some(FailureOutcome::DeadLettered));
        }

        let retry_count = item.retry_count;
        staged.insert_with_seq(item, seq);
        self.commit(staged, PersistPlan::Pending).await?;
        debug!(item_id = %id, retry_count, "Item re-queued after failure");
        Ok(Some(FailureOutcome::Retrying { retry_count }))
    }

    /// Move every dead-lettered item back to pending with `retry_count = 0`.
    ///
    /// # Errors
    /// Returns the store's error on write failure.
    #[instrument(skip(self))]
    pub async fn retry_failed(&self) -> Result<usize> {
        let _writer = self.writer.lock().await;
        let mut staged = self.state.read().clone();
        if staged.dead_letter.is_empty() {
            return Ok(0);
        }

        let mut moved = 0_usize;
        for mut item in std::mem::take(&mut staged.dead_letter) {
            item.retry_count = 0;
            if staged.insert_pending(item) {
                moved = moved.saturating_add(1);
            }
        }

        self.commit(staged, PersistPlan::PendingThenDeadLetter).await?;
        info!(moved, "Dead-lettered items returned to pending");
        Ok(moved)
    }

    /// Return a single dead-lettered item to pending.
    ///
    /// # Errors
    /// Returns the store's error on write failure.
    #[instrument(skip(self))]
    pub async fn retry_failed_item(&self, id: &str) -> Result<bool> {
        let _writer = self.writer.lock().await;
        let mut staged = self.state.read().clone();
        let Some(position) = staged.dead_letter_position(id) else {
            return Ok(false);
        };
        let Some(mut item) = staged.dead_letter.remove(position) else {
            return Ok(false);
        };
        item.retry_count = 0;
        staged.insert_pending(item);

        self.commit(staged, PersistPlan::PendingThenDeadLetter).await?;
        Ok(true)
    }

    /// Permanently drop a dead-lettered item.
    ///
    /// # Errors
    /// Returns the store's error on write failure.
    #[instrument(skip(self))]
    pub async fn discard_failed(&self, id: &str) -> Result<bool> {
        let _writer = self.writer.lock().await;
        let mut staged = self.state.read().clone();
        let Some(position) = staged.dead_letter_position(id) else {
            return Ok(false);
        };
        staged.dead_letter.remove(position);

        self.commit(staged, PersistPlan::DeadLetter).await?;
        info!(item_id = %id, "Dead-lettered item discarded");
        Ok(true)
    }

    /// Number of pending items.
    pub fn pending_count(&self) -> usize {
        self.state.read().pending.len()
    }

    /// Number of dead-lettered items.
    pub fn failed_count(&self) -> usize {
        self.state.read().dead_letter.len()
    }

    /// `true` when nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.state.read().pending.is_empty()
    }

    /// `true` when at least one item is pending.
    pub fn is_not_empty(&self) -> bool {
        !self.is_empty()
    }

    /// Whether [`load`](Self::load) has completed.
    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    /// Pending items in delivery order.
    pub fn pending_items(&self) -> Vec<SyncItem> {
        self.state.read().pending.values().cloned().collect()
    }

    /// Dead-lettered items, oldest first.
    pub fn failed_items(&self) -> Vec<SyncItem> {
        self.state.read().dead_letter.iter().cloned().collect()
    }

    async fn commit(&self, staged: QueueState, plan: PersistPlan) -> Result<()> {
        match plan {
            PersistPlan::Pending => self.write_pending(&staged).await?,
            PersistPlan::DeadLetter => self.write_dead_letter(&staged).await?,
            PersistPlan::DeadLetterThenPending => {
                self.write_dead_letter(&staged).await?;
                self.write_pending(&staged).await?;
            }
            PersistPlan::PendingThenDeadLetter => {
                self.write_pending(&staged).await?;
                self.write_dead_letter(&staged).await?;
            }
        }
        *self.state.write() = staged;
        Ok(())
    }

    async fn write_pending(&self, staged: &QueueState) -> Result<()> {
        let items: Vec<&SyncItem> = staged.pending.values().collect();
        self.write_blob(PENDING_QUEUE_KEY, &items).await
    }

    async fn write_dead_letter(&self, staged: &QueueState) -> Result<()> {
        let items: Vec<&SyncItem> = staged.dead_letter.iter().collect();
        self.write_blob(DEAD_LETTER_QUEUE_KEY, &items).await
    }

    async fn write_blob(&self, key: &str, items: &[&SyncItem]) -> Result<()> {
        let blob = serde_json::to_string(items)?;
        self.store.set(key, &blob).await.map_err(|err| {
            error!(key, error = %err, "Failed to persist sync queue");
            err
        })
    }

    async fn read_blob(&self, key: &str) -> Result<Vec<SyncItem>> {
        let Some(raw) = self.store.get(key).await? else {
            return Ok(Vec::new());
        };
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }

        match serde_json::from_str::<Vec<SyncItem>>(&raw) {
            Ok(items) => Ok(items),
            Err(parse_err) => {
                let backup_key = format!("{key}{CORRUPT_KEY_SUFFIX}");
                warn!(
                    key,
                    backup_key = %backup_key,
                    error = %parse_err,
                    "Persisted queue blob is unreadable; starting empty"
                );
                if let Err(err) = self.store.set(&backup_key, &raw).await {
                    error!(key = %backup_key, error = %err, "Failed to preserve corrupt queue blob");
                }
                Ok(Vec::new())
            }
        }
    }
}

fn log_evicted(evicted: &[SyncItem]) {
    for item in evicted {
        warn!(
            item_id = %item.id,
            entity_kind = %item.entity_kind,
            "Dead-letter set full; dropping oldest entry"
        );
    }
}

/// Cap stored error messages.
pub(crate) fn truncate_reason(reason: &str) -> String {
    if reason.chars().count() <= MAX_ERROR_MESSAGE_LENGTH {
        return reason.to_string();
    }

    let mut truncated =
        reason.chars().take(MAX_ERROR_MESSAGE_LENGTH.saturating_sub(3)).collect::<String>();
    truncated.push_str("...");
    truncated
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::TimeZone;
    use outpost_common::testing::MockClock;
    use outpost_domain::{EntityKind, SyncOperation};
    use serde_json::{json, Map, Value};

    use super::*;

    #[derive(Default)]
    struct MapStore {
        values: parking_lot::Mutex<HashMap<String, String>>,
        fail_writes: AtomicBool,
    }

    impl MapStore {
        fn raw(&self, key: &str) -> Option<String> {
            self.values.lock().get(key).cloned()
        }
    }

    #[async_trait]
    impl KeyValueStore for MapStore {
        async fn get(&self, key: &str) -> Result<Option<String>> {
            Ok(self.values.lock().get(key).cloned())
        }

        async fn set(&self, key: &str, value: &str) -> Result<()> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(OutpostError::Storage("disk full".into()));
            }
            self.values.lock().insert(key.to_string(), value.to_string());
            Ok(())
        }

        async fn remove(&self, key: &str) -> Result<()> {
            self.values.lock().remove(key);
            Ok(())
        }
    }

    fn clock() -> Arc<MockClock> {
        Arc::new(MockClock::starting_at_utc(Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap()))
    }

    fn item(id: &str, priority: Priority, clock: &MockClock) -> SyncItem {
        let payload = match json!({"id": id}) {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        SyncItem::new(EntityKind::Session, SyncOperation::Create, payload)
            .with_id(id)
            .with_priority(priority)
            .with_created_at(clock.utc_now())
    }

    fn ids(items: &[SyncItem]) -> Vec<&str> {
        items.iter().map(|item| item.id.as_str()).collect()
    }

    async fn queue_with(store: &Arc<MapStore>, clock: &Arc<MockClock>) -> DurableQueue {
        let queue = DurableQueue::new(store.clone(), clock.clone());
        queue.load().await.unwrap();
        queue
    }

    #[tokio::test]
    async fn duplicate_enqueue_is_ignored() {
        let (store, clock) = (Arc::new(MapStore::default()), clock());
        let queue = queue_with(&store, &clock).await;

        assert!(queue.enqueue(item("a", Priority::Normal, &clock)).await.unwrap());
        assert!(!queue.enqueue(item("a", Priority::Critical, &clock)).await.unwrap());

        assert_eq!(queue.pending_count(), 1);
        assert_eq!(queue.peek().unwrap().priority, Priority::Normal);
    }

    /// Validates delivery order across priority bands and FIFO ties.
    ///
    /// Assertions:
    /// - Higher priority items come first.
    /// - Equal priority items keep creation order.
    #[tokio::test]
    async fn orders_by_priority_then_age() {
        let (store, clock) = (Arc::new(MapStore::default()), clock());
        let queue = queue_with(&store, &clock).await;

        queue.enqueue(item("low", Priority::Low, &clock)).await.unwrap();
        clock.advance(Duration::from_secs(1));
        queue.enqueue(item("n1", Priority::Normal, &clock)).await.unwrap();
        clock.advance(Duration::from_secs(1));
        queue.enqueue(item("crit", Priority::Critical, &clock)).await.unwrap();
        queue.enqueue(item("n2", Priority::Normal, &clock)).await.unwrap();

        assert_eq!(ids(&queue.pending_items()), vec!["crit", "n1", "n2", "low"]);
        assert_eq!(queue.dequeue().await.unwrap().unwrap().id, "crit");
        assert_eq!(queue.peek().unwrap().id, "n1");
    }

    #[tokio::test]
    async fn equal_timestamps_fall_back_to_insertion_order() {
        let (store, clock) = (Arc::new(MapStore::default()), clock());
        let queue = queue_with(&store, &clock).await;

        for id in ["x", "y", "z"] {
            queue.enqueue(item(id, Priority::High, &clock)).await.unwrap();
        }
        assert_eq!(ids(&queue.pending_items()), vec!["x", "y", "z"]);
    }

    /// Validates that a failed attempt does not reorder the queue.
    ///
    /// Assertions:
    /// - A re-queued item stays ahead of later-created peers of equal priority.
    /// - Ties on `created_at` keep their original insertion order.
    /// - The failure is recorded on the item.
    #[tokio::test]
    async fn failed_item_keeps_its_creation_order() {
        let (store, clock) = (Arc::new(MapStore::default()), clock());
        let queue = queue_with(&store, &clock).await;

        queue.enqueue(item("a", Priority::Normal, &clock)).await.unwrap();
        queue.enqueue(item("b", Priority::Normal, &clock)).await.unwrap();
        clock.advance(Duration::from_secs(1));
        queue.enqueue(item("c", Priority::Normal, &clock)).await.unwrap();
        clock.advance(Duration::from_secs(1));

        let outcome = queue.mark_failed("a", "HTTP 503", 5).await.unwrap();
        assert_eq!(outcome, Some(FailureOutcome::Retrying { retry_count: 1 }));

        let pending = queue.pending_items();
        assert_eq!(ids(&pending), vec!["a", "b", "c"]);
        assert_eq!(queue.peek().unwrap().id, "a");
        assert_eq!(pending[0].last_error.as_deref(), Some("HTTP 503"));
        assert_eq!(pending[0].last_retry_at, Some(clock.utc_now()));
    }

    /// Validates the dead-letter transition at `max_retries`.
    ///
    /// Assertions:
    /// - The fifth failure with `max_retries = 5` dead-letters the item.
    /// - Counts reflect the move and both blobs are persisted.
    #[tokio::test]
    async fn dead_letters_when_retries_exhausted() {
        let (store, clock) = (Arc::new(MapStore::default()), clock());
        let queue = queue_with(&store, &clock).await;
        queue.enqueue(item("a", Priority::Normal, &clock)).await.unwrap();

        for attempt in 1..5 {
            let outcome = queue.mark_failed("a", "timeout", 5).await.unwrap();
            assert_eq!(outcome, Some(FailureOutcome::Retrying { retry_count: attempt }));
        }
        let outcome = queue.mark_failed("a", "timeout", 5).await.unwrap();
        assert_eq!(outcome, Some(FailureOutcome::DeadLettered));

        assert_eq!(queue.pending_count(), 0);
        assert_eq!(queue.failed_count(), 1);
        assert_eq!(queue.failed_items()[0].retry_count, 5);
        assert_eq!(store.raw(PENDING_QUEUE_KEY).as_deref(), Some("[]"));
        assert!(store.raw(DEAD_LETTER_QUEUE_KEY).unwrap().contains("\"a\""));

        assert_eq!(queue.mark_failed("a", "timeout", 5).await.unwrap(), None);
    }

    #[tokio::test]
    async fn retry_failed_resets_counters() {
        let (store, clock) = (Arc::new(MapStore::default()), clock());
        let queue = queue_with(&store, &clock).await;
        queue.enqueue(item("a", Priority::Normal, &clock)).await.unwrap();
        queue.enqueue(item("b", Priority::Normal, &clock)).await.unwrap();
        queue.mark_failed("a", "boom", 1).await.unwrap();
        queue.mark_failed("b", "boom", 1).await.unwrap();

        assert_eq!(queue.retry_failed().await.unwrap(), 2);
        assert_eq!(queue.failed_count(), 0);
        assert!(queue.pending_items().iter().all(|item| item.retry_count == 0));
        assert_eq!(queue.retry_failed().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn single_item_retry_and_discard() {
        let (store, clock) = (Arc::new(MapStore::default()), clock());
        let queue = queue_with(&store, &clock).await;
        for id in ["a", "b"] {
            queue.enqueue(item(id, Priority::Normal, &clock)).await.unwrap();
            queue.mark_failed(id, "boom", 0).await.unwrap();
        }

        assert!(queue.retry_failed_item("a").await.unwrap());
        assert!(!queue.retry_failed_item("a").await.unwrap());
        assert!(queue.discard_failed("b").await.unwrap());
        assert!(!queue.discard_failed("missing").await.unwrap());

        assert_eq!(ids(&queue.pending_items()), vec!["a"]);
        assert_eq!(queue.failed_count(), 0);
    }

    #[tokio::test]
    async fn dead_letter_capacity_drops_oldest() {
        let (store, clock) = (Arc::new(MapStore::default()), clock());
        let queue = DurableQueue::new(store.clone(), clock.clone()).with_dead_letter_capacity(2);
        queue.load().await.unwrap();

        for id in ["a", "b", "c"] {
            queue.enqueue(item(id, Priority::Normal, &clock)).await.unwrap();
            queue.mark_failed(id, "boom", 1).await.unwrap();
        }

        assert_eq!(ids(&queue.failed_items()), vec!["b", "c"]);
    }

    #[tokio::test]
    async fn completed_items_are_not_persisted() {
        let (store, clock) = (Arc::new(MapStore::default()), clock());
        let queue = queue_with(&store, &clock).await;
        queue.enqueue(item("a", Priority::Normal, &clock)).await.unwrap();
        queue.enqueue(item("b", Priority::Normal, &clock)).await.unwrap();

        assert!(queue.mark_completed("a").await.unwrap());
        assert!(!queue.mark_completed("a").await.unwrap());

        let reloaded = queue_with(&store, &clock).await;
        assert_eq!(ids(&reloaded.pending_items()), vec!["b"]);
    }

    /// Validates a failed write leaves memory untouched.
    ///
    /// Assertions:
    /// - `enqueue` surfaces the storage error.
    /// - Counts and snapshots are unchanged.
    #[tokio::test]
    async fn failed_write_does_not_commit() {
        let (store, clock) = (Arc::new(MapStore::default()), clock());
        let queue = queue_with(&store, &clock).await;
        queue.enqueue(item("a", Priority::Normal, &clock)).await.unwrap();

        store.fail_writes.store(true, Ordering::SeqCst);
        let result = queue.enqueue(item("b", Priority::Normal, &clock)).await;
        assert!(matches!(result, Err(OutpostError::Storage(_))));
        assert!(queue.mark_failed("a", "boom", 1).await.is_err());

        assert_eq!(ids(&queue.pending_items()), vec!["a"]);
        assert_eq!(queue.failed_count(), 0);
        assert_eq!(queue.peek().unwrap().retry_count, 0);
    }

    #[tokio::test]
    async fn corrupt_blob_is_preserved_and_treated_as_empty() {
        let (store, clock) = (Arc::new(MapStore::default()), clock());
        store.values.lock().insert(PENDING_QUEUE_KEY.to_string(), "{not json".to_string());

        let queue = queue_with(&store, &clock).await;

        assert!(queue.is_empty());
        assert_eq!(store.raw("sync_queue_pending.corrupt").as_deref(), Some("{not json"));
    }

    #[tokio::test]
    async fn load_keeps_pending_copy_of_duplicated_ids() {
        let (store, clock) = (Arc::new(MapStore::default()), clock());
        let shared = item("dup", Priority::High, &clock);
        let blob = serde_json::to_string(&vec![shared.clone()]).unwrap();
        store.values.lock().insert(PENDING_QUEUE_KEY.to_string(), blob.clone());
        store.values.lock().insert(DEAD_LETTER_QUEUE_KEY.to_string(), blob);

        let queue = queue_with(&store, &clock).await;
        assert_eq!(queue.pending_count(), 1);
        assert_eq!(queue.failed_count(), 0);

        queue.load().await.unwrap();
        assert_eq!(queue.pending_count(), 1);
    }

    #[test]
    fn truncate_reason_caps_length() {
        let long = "x".repeat(400);
        let truncated = truncate_reason(&long);
        assert_eq!(truncated.chars().count(), MAX_ERROR_MESSAGE_LENGTH);
        assert!(truncated.ends_with("..."));
        assert_eq!(truncate_reason("short"), "short");
    }
}
