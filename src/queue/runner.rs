use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::future::join_all;
use tokio::sync::Mutex;

use crate::ai::Summarize;
use crate::cache::{content_hash, SummaryCache};
use crate::error::Result;
use crate::models::{
    ItemStatus, Priority, QueueItem, QueueProgress, QueueState, SummaryMetadata, SummaryRequest,
};
use crate::storage::KvStore;

const ITEMS_KEY: &str = "summary_queue:items";
const STATE_KEY: &str = "summary_queue:state";

const BATCH_DELAY: Duration = Duration::from_millis(100);
const DEFAULT_MAX_RETRIES: u32 = 3;

#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub max_concurrent: usize,
    pub max_retries: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 3,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

type ProgressCallback = Arc<dyn Fn(QueueProgress) + Send + Sync>;

struct Inner {
    items: Vec<QueueItem>,
    state: QueueState,
    processing_started: Option<Instant>,
    completed_this_run: u64,
    next_item_seq: u64,
}

fn priority_rank(p: Priority) -> u8 {
    match p {
        Priority::High => 0,
        Priority::Normal => 1,
        Priority::Low => 2,
    }
}

/// Priority-ordered, concurrency-bounded, retrying job runner for
/// summarization work, with durable state and progress snapshots.
///
/// A single logical driver (`process`) pulls pending items in priority
/// order, runs up to `max_concurrent` at a time, and never lets one slow or
/// failing item block the rest of its batch.
pub struct SummaryQueue {
    inner: Mutex<Inner>,
    subscribers: std::sync::Mutex<HashMap<u64, ProgressCallback>>,
    next_sub_id: std::sync::atomic::AtomicU64,
    summarizer: Arc<dyn Summarize>,
    summary_cache: Arc<SummaryCache>,
    store: Arc<dyn KvStore>,
    max_concurrent: usize,
    max_retries: u32,
}

impl SummaryQueue {
    pub fn new(
        summarizer: Arc<dyn Summarize>,
        summary_cache: Arc<SummaryCache>,
        store: Arc<dyn KvStore>,
        config: QueueConfig,
    ) -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: Vec::new(),
                state: QueueState::default(),
                processing_started: None,
                completed_this_run: 0,
                next_item_seq: 0,
            }),
            subscribers: std::sync::Mutex::new(HashMap::new()),
            next_sub_id: std::sync::atomic::AtomicU64::new(1),
            summarizer,
            summary_cache,
            store,
            max_concurrent: config.max_concurrent.clamp(1, 10),
            max_retries: config.max_retries,
        }
    }

    /// Restores persisted queue state. In-flight work from a previous
    /// process is not resumable: the processing flag is cleared and items
    /// stranded in `processing` are swept back to `pending`.
    pub async fn load(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;

        if let Some(raw) = self.store.get_item(ITEMS_KEY).await? {
            match serde_json::from_str::<Vec<QueueItem>>(&raw) {
                Ok(items) => inner.items = items,
                Err(e) => tracing::warn!("Discarding undecodable persisted queue: {}", e),
            }
        }
        if let Some(raw) = self.store.get_item(STATE_KEY).await? {
            match serde_json::from_str::<QueueState>(&raw) {
                Ok(state) => inner.state = state,
                Err(e) => tracing::warn!("Discarding undecodable persisted queue state: {}", e),
            }
        }

        inner.state.is_processing = false;
        inner.state.current_processing.clear();
        let mut swept = 0;
        for item in inner.items.iter_mut() {
            if item.status == ItemStatus::Processing {
                item.status = ItemStatus::Pending;
                item.started_at = None;
                swept += 1;
            }
        }
        if swept > 0 {
            tracing::info!("Swept {} stranded in-flight items back to pending", swept);
        }

        self.persist(&inner).await;
        Ok(())
    }

    /// Submits a request, inserting it before the first item of a strictly
    /// lower priority class so the queue stays sorted without a re-sort.
    /// Ties preserve submission order.
    pub async fn submit(&self, request: SummaryRequest) -> Result<String> {
        let mut inner = self.inner.lock().await;

        inner.next_item_seq += 1;
        let id = format!(
            "job-{}-{}",
            Utc::now().timestamp_millis(),
            inner.next_item_seq
        );

        let item = QueueItem {
            id: id.clone(),
            request,
            status: ItemStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            response: None,
            error: None,
            retry_count: 0,
            max_retries: self.max_retries,
        };

        let rank = priority_rank(item.request.priority);
        let pos = inner
            .items
            .iter()
            .position(|existing| priority_rank(existing.request.priority) > rank)
            .unwrap_or(inner.items.len());
        inner.items.insert(pos, item);

        self.persist(&inner).await;
        let progress = Self::snapshot(&inner);
        drop(inner);
        self.notify(progress);

        Ok(id)
    }

    /// Runs the processing loop until no pending work remains or the queue
    /// is paused. Starting it while it is already running is a no-op.
    pub async fn process(&self) -> Result<()> {
        {
            let mut inner = self.inner.lock().await;
            if inner.state.is_processing {
                return Ok(());
            }
            inner.state.is_processing = true;
            inner.processing_started = Some(Instant::now());
            inner.completed_this_run = 0;
            self.persist(&inner).await;
        }

        loop {
            let batch: Vec<(String, SummaryRequest)> = {
                let mut inner = self.inner.lock().await;
                if !inner.state.is_processing {
                    break;
                }

                let slots = self
                    .max_concurrent
                    .saturating_sub(inner.state.current_processing.len());
                let mut batch = Vec::new();

                for idx in 0..inner.items.len() {
                    if batch.len() >= slots {
                        break;
                    }
                    if inner.items[idx].status == ItemStatus::Pending {
                        inner.items[idx].status = ItemStatus::Processing;
                        inner.items[idx].started_at = Some(Utc::now());
                        let id = inner.items[idx].id.clone();
                        let request = inner.items[idx].request.clone();
                        inner.state.current_processing.push(id.clone());
                        batch.push((id, request));
                    }
                }

                if batch.is_empty() {
                    if inner.state.current_processing.is_empty() {
                        break;
                    }
                    Vec::new()
                } else {
                    self.persist(&inner).await;
                    batch
                }
            };

            if batch.is_empty() {
                tokio::time::sleep(BATCH_DELAY).await;
                continue;
            }

            {
                let inner = self.inner.lock().await;
                let progress = Self::snapshot(&inner);
                drop(inner);
                self.notify(progress);
            }

            // allSettled semantics: each job records its own outcome, so one
            // slow or failing item never takes down the batch.
            join_all(
                batch
                    .into_iter()
                    .map(|(id, request)| self.run_item(id, request)),
            )
            .await;

            tokio::time::sleep(BATCH_DELAY).await;
        }

        let mut inner = self.inner.lock().await;
        inner.state.is_processing = false;
        self.persist(&inner).await;
        let progress = Self::snapshot(&inner);
        drop(inner);
        self.notify(progress);

        Ok(())
    }

    async fn run_item(&self, id: String, request: SummaryRequest) {
        let result = self.summarize_guarded(&request).await;

        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        let Some(idx) = inner.items.iter().position(|i| i.id == id) else {
            inner.state.current_processing.retain(|p| p != &id);
            return;
        };

        match result {
            Ok(response) => {
                let item = &mut inner.items[idx];
                item.status = ItemStatus::Completed;
                item.completed_at = Some(Utc::now());
                item.response = Some(response);
                inner.state.total_processed += 1;
                inner.state.last_processed_at = Some(Utc::now());
                inner.completed_this_run += 1;
            }
            Err(e) => {
                inner.items[idx].retry_count += 1;
                let retry_count = inner.items[idx].retry_count;
                if retry_count < inner.items[idx].max_retries {
                    tracing::debug!(
                        "Job {} failed (attempt {}), requeueing: {}",
                        id,
                        retry_count,
                        e
                    );
                    // Retries go to the back so other pending work gets a
                    // turn first; this forfeits the item's priority slot.
                    let mut item = inner.items.remove(idx);
                    item.status = ItemStatus::Pending;
                    item.started_at = None;
                    inner.items.push(item);
                } else {
                    tracing::warn!("Job {} failed permanently: {}", id, e);
                    let item = &mut inner.items[idx];
                    item.status = ItemStatus::Failed;
                    item.error = Some(e.to_string());
                    inner.state.total_failed += 1;
                }
            }
        }

        inner.state.current_processing.retain(|p| p != &id);
        self.persist(inner).await;
        let progress = Self::snapshot(inner);
        drop(guard);
        self.notify(progress);
    }

    /// The summarization call, guarded by the content-addressed cache so
    /// identical article text is never summarized twice.
    async fn summarize_guarded(
        &self,
        request: &SummaryRequest,
    ) -> Result<crate::models::SummaryResponse> {
        let hash = content_hash(&request.title, &request.content);

        if let Some(cached) = self.summary_cache.get(&hash).await {
            tracing::debug!("Summary cache hit for {}", request.url);
            return Ok(cached);
        }

        let response = self
            .summarizer
            .summarize(&request.content, &request.title, request.priority)
            .await?;

        let metadata = SummaryMetadata {
            quality_score: response.confidence * 100.0,
            extracted_date: Utc::now(),
        };
        self.summary_cache.put(&hash, response.clone(), metadata).await?;

        Ok(response)
    }

    /// Clears the processing flag; the in-flight batch completes but no new
    /// batch starts.
    pub async fn pause(&self) {
        let mut inner = self.inner.lock().await;
        inner.state.is_processing = false;
        self.persist(&inner).await;
        let progress = Self::snapshot(&inner);
        drop(inner);
        self.notify(progress);
    }

    /// Restarts the loop if there is pending work and the driver is idle;
    /// a no-op otherwise.
    pub async fn resume(&self) -> Result<()> {
        let has_pending = {
            let inner = self.inner.lock().await;
            inner.items.iter().any(|i| i.status == ItemStatus::Pending)
        };
        if has_pending {
            self.process().await?;
        }
        Ok(())
    }

    /// Pauses, then discards everything except completed items and work
    /// currently in flight.
    pub async fn clear(&self) {
        let mut inner = self.inner.lock().await;
        inner.state.is_processing = false;
        let current: Vec<String> = inner.state.current_processing.clone();
        inner.items.retain(|i| {
            i.status == ItemStatus::Completed || current.contains(&i.id)
        });
        self.persist(&inner).await;
        let progress = Self::snapshot(&inner);
        drop(inner);
        self.notify(progress);
    }

    pub async fn clear_completed(&self) {
        let mut inner = self.inner.lock().await;
        inner.items.retain(|i| i.status != ItemStatus::Completed);
        self.persist(&inner).await;
        let progress = Self::snapshot(&inner);
        drop(inner);
        self.notify(progress);
    }

    /// Resets all failed items to fresh pending and restarts the driver if
    /// it is not already running.
    pub async fn retry_failed(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let mut reset = 0;
        for item in inner.items.iter_mut() {
            if item.status == ItemStatus::Failed {
                item.status = ItemStatus::Pending;
                item.retry_count = 0;
                item.error = None;
                item.started_at = None;
                item.completed_at = None;
                reset += 1;
            }
        }
        self.persist(&inner).await;
        let progress = Self::snapshot(&inner);
        drop(inner);
        self.notify(progress);

        if reset > 0 {
            tracing::info!("Retrying {} failed jobs", reset);
            self.resume().await?;
        }
        Ok(())
    }

    pub async fn progress(&self) -> QueueProgress {
        let inner = self.inner.lock().await;
        Self::snapshot(&inner)
    }

    pub async fn state(&self) -> QueueState {
        self.inner.lock().await.state.clone()
    }

    pub async fn items(&self) -> Vec<QueueItem> {
        self.inner.lock().await.items.clone()
    }

    /// Registers a progress subscriber; returns a token for `unsubscribe`.
    pub fn on_progress<F>(&self, callback: F) -> u64
    where
        F: Fn(QueueProgress) + Send + Sync + 'static,
    {
        let id = self
            .next_sub_id
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.subscribers
            .lock()
            .expect("subscriber lock poisoned")
            .insert(id, Arc::new(callback));
        id
    }

    pub fn unsubscribe(&self, token: u64) {
        self.subscribers
            .lock()
            .expect("subscriber lock poisoned")
            .remove(&token);
    }

    fn snapshot(inner: &Inner) -> QueueProgress {
        let completed = inner
            .items
            .iter()
            .filter(|i| i.status == ItemStatus::Completed)
            .count();
        let failed = inner
            .items
            .iter()
            .filter(|i| i.status == ItemStatus::Failed)
            .count();
        let pending = inner
            .items
            .iter()
            .filter(|i| i.status == ItemStatus::Pending)
            .count();
        let currently_processing = inner.state.current_processing.len();

        // ETA only once this run has at least one completion to extrapolate
        // from.
        let estimated_time_remaining_secs = match (inner.processing_started, inner.completed_this_run)
        {
            (Some(started), done) if done > 0 => {
                let per_item = started.elapsed().as_secs_f64() / done as f64;
                Some((pending + currently_processing) as f64 * per_item)
            }
            _ => None,
        };

        QueueProgress {
            total: inner.items.len(),
            completed,
            failed,
            pending,
            currently_processing,
            estimated_time_remaining_secs,
        }
    }

    fn notify(&self, progress: QueueProgress) {
        let callbacks: Vec<ProgressCallback> = self
            .subscribers
            .lock()
            .expect("subscriber lock poisoned")
            .values()
            .cloned()
            .collect();

        for callback in callbacks {
            // A misbehaving subscriber must never take down the driver.
            if let Err(e) =
                std::panic::catch_unwind(AssertUnwindSafe(|| callback(progress.clone())))
            {
                tracing::error!("Progress subscriber panicked: {:?}", e);
            }
        }
    }

    async fn persist(&self, inner: &Inner) {
        match serde_json::to_string(&inner.items) {
            Ok(raw) => {
                if let Err(e) = self.store.set_item(ITEMS_KEY, &raw).await {
                    tracing::error!("Failed to persist queue items: {}", e);
                }
            }
            Err(e) => tracing::error!("Failed to encode queue items: {}", e),
        }
        match serde_json::to_string(&inner.state) {
            Ok(raw) => {
                if let Err(e) = self.store.set_item(STATE_KEY, &raw).await {
                    tracing::error!("Failed to persist queue state: {}", e);
                }
            }
            Err(e) => tracing::error!("Failed to encode queue state: {}", e),
        }
    }
}
