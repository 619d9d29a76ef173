//! Hydration scheduling.
//!
//! A hydration job takes the ordered list of items a view wants thumbnails
//! for, answers what it can from the cache straight away and renders the
//! rest in small batches. Each job key (one per view) has a generation
//! counter; issuing a new job for the same key revokes the previous job's
//! token, and workers check their token before and after every unit of work.

use crate::cache::{Thumbnail, ThumbnailCache, Tier};
use crate::key::{CacheKey, Transform};
use crate::render::Renderer;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Live generation per job key.
#[derive(Debug, Default)]
pub struct JobTokens {
    generations: Mutex<HashMap<String, Arc<AtomicU64>>>,
}

/// Proof that a job is still the latest one for its key.
#[derive(Debug, Clone)]
pub struct JobToken {
    generation: u64,
    active: Arc<AtomicU64>,
}

impl JobTokens {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a fresh token for `key`, revoking any earlier one.
    pub fn issue(&self, key: &str) -> JobToken {
        let active = {
            let mut generations = self.generations.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(generations.entry(key.to_string()).or_default())
        };
        let generation = active.fetch_add(1, Ordering::SeqCst) + 1;
        JobToken { generation, active }
    }

    /// Revoke whatever token is live for `key`. Returns `false` if no job
    /// was ever issued for it.
    pub fn revoke(&self, key: &str) -> bool {
        let generations = self.generations.lock().unwrap_or_else(PoisonError::into_inner);
        match generations.get(key) {
            Some(active) => {
                active.fetch_add(1, Ordering::SeqCst);
                true
            },
            None => false,
        }
    }
}

impl JobToken {
    pub fn is_live(&self) -> bool {
        self.active.load(Ordering::SeqCst) == self.generation
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HydrationItem {
    /// Entry id, echoed back in [`HydrationEvent::Resolved`].
    pub id: String,
    /// Source image reference.
    pub source: String,
    /// Currently on screen. Visible items are served first.
    #[serde(default)]
    pub visible: bool,
}
impl HydrationItem {
    pub fn new(id: impl Into<String>, source: impl Into<String>, visible: bool) -> Self {
        Self { id: id.into(), source: source.into(), visible }
    }
}

/// Where a resolved thumbnail came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Memory,
    Durable,
    Rendered,
    /// Rendering failed; the thumbnail is the configured placeholder.
    Placeholder,
}
impl From<Tier> for Origin {
    fn from(tier: Tier) -> Self {
        match tier {
            Tier::Memory => Self::Memory,
            Tier::Durable => Self::Durable,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metrics {
    pub total: usize,
    pub memory_hits: usize,
    pub durable_hits: usize,
    pub built: usize,
    pub failed: usize,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Completed(Metrics),
    /// Superseded by a newer job for the same key, or cancelled outright.
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HydrationEvent {
    /// `pending` of the `total` items need rendering.
    Started { total: usize, pending: usize },
    /// One item has a thumbnail. Rendered items resolve in completion order.
    Resolved { id: String, thumbnail: Thumbnail, origin: Origin },
    Finished(Outcome),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerOptions {
    pub transform: Transform,
    pub concurrency: usize,
    pub batch_size: usize,
    pub batch_delay: Duration,
    pub placeholder: PathBuf,
}
impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            transform: Transform::default(),
            concurrency: 2,
            batch_size: 4,
            batch_delay: Duration::from_millis(70),
            placeholder: PathBuf::from("icons/svg/mystery-man.svg"),
        }
    }
}

/// A running hydration job.
pub struct JobHandle {
    key: String,
    events: mpsc::UnboundedReceiver<HydrationEvent>,
}

impl JobHandle {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Next event, or `None` once the job has finished.
    pub async fn next(&mut self) -> Option<HydrationEvent> {
        self.events.recv().await
    }

    /// Drain the job and return how it ended.
    pub async fn wait(mut self) -> Outcome {
        while let Some(event) = self.events.recv().await {
            if let HydrationEvent::Finished(outcome) = event {
                return outcome;
            }
        }
        // The job task went away without reporting.
        Outcome::Cancelled
    }

    pub fn into_stream(mut self) -> impl Stream<Item = HydrationEvent> {
        async_stream::stream! {
            while let Some(event) = self.events.recv().await {
                yield event;
            }
        }
    }
}

/// Feeds thumbnail cache misses to a renderer.
#[derive(Clone)]
pub struct Scheduler {
    cache: Arc<ThumbnailCache>,
    renderer: Arc<dyn Renderer>,
    tokens: Arc<JobTokens>,
    options: Arc<SchedulerOptions>,
}

struct Job {
    cache: Arc<ThumbnailCache>,
    renderer: Arc<dyn Renderer>,
    options: Arc<SchedulerOptions>,
    token: JobToken,
    events: mpsc::UnboundedSender<HydrationEvent>,
}

struct Pending {
    item: HydrationItem,
    key: CacheKey,
}

impl Scheduler {
    pub fn new(cache: Arc<ThumbnailCache>, renderer: Arc<dyn Renderer>, options: SchedulerOptions) -> Self {
        Self {
            cache,
            renderer,
            tokens: Arc::new(JobTokens::new()),
            options: Arc::new(options),
        }
    }

    pub fn options(&self) -> &SchedulerOptions {
        &self.options
    }

    pub fn cache(&self) -> &Arc<ThumbnailCache> {
        &self.cache
    }

    /// Start hydrating `items` under `job_key`, superseding any job already
    /// running under that key.
    pub fn request(&self, job_key: impl Into<String>, items: Vec<HydrationItem>) -> JobHandle {
        let key = job_key.into();
        let (sender, receiver) = mpsc::unbounded_channel();
        let job = Job {
            cache: Arc::clone(&self.cache),
            renderer: Arc::clone(&self.renderer),
            options: Arc::clone(&self.options),
            token: self.tokens.issue(&key),
            events: sender,
        };
        tracing::debug!(job = %key, items = items.len(), "Hydration requested");
        tokio::spawn(job.run(key.clone(), items));
        JobHandle { key, events: receiver }
    }

    /// Cancel the live job for `job_key`, if any.
    pub fn cancel(&self, job_key: &str) -> bool {
        self.tokens.revoke(job_key)
    }
}

impl Job {
    fn emit(&self, event: HydrationEvent) {
        // Nobody listening is fine; the cache is still filled.
        let _ = self.events.send(event);
    }

    fn finish(&self, key: &str, outcome: Outcome) {
        match &outcome {
            Outcome::Completed(metrics) => tracing::info!(
                job = key,
                total = metrics.total,
                memory_hits = metrics.memory_hits,
                durable_hits = metrics.durable_hits,
                built = metrics.built,
                failed = metrics.failed,
                elapsed_ms = metrics.elapsed.as_millis() as u64,
                "Hydration complete"
            ),
            Outcome::Cancelled => tracing::debug!(job = key, "Hydration superseded"),
        }
        self.emit(HydrationEvent::Finished(outcome));
    }

    async fn run(self, key: String, mut items: Vec<HydrationItem>) {
        let started = Instant::now();
        // Stable: order within each group is preserved.
        items.sort_by_key(|item| !item.visible);
        let mut metrics = Metrics { total: items.len(), ..Metrics::default() };

        let mut hits = Vec::new();
        let mut misses = Vec::new();
        for item in items {
            if !self.token.is_live() {
                return self.finish(&key, Outcome::Cancelled);
            }
            let cache_key = CacheKey::new(&item.source, &self.options.transform);
            match self.cache.lookup(&cache_key).await {
                Some((thumbnail, tier)) => {
                    match tier {
                        Tier::Memory => metrics.memory_hits += 1,
                        Tier::Durable => metrics.durable_hits += 1,
                    }
                    hits.push((item.id, thumbnail, Origin::from(tier)));
                },
                None => misses.push(Pending { item, key: cache_key }),
            }
        }

        self.emit(HydrationEvent::Started { total: metrics.total, pending: misses.len() });
        for (id, thumbnail, origin) in hits {
            self.emit(HydrationEvent::Resolved { id, thumbnail, origin });
        }

        for (index, batch) in misses.chunks(self.options.batch_size.max(1)).enumerate() {
            if index > 0 && !self.options.batch_delay.is_zero() {
                tokio::time::sleep(self.options.batch_delay).await;
            }
            if !self.token.is_live() {
                return self.finish(&key, Outcome::Cancelled);
            }
            let (built, failed) = self.run_batch(batch).await;
            metrics.built += built;
            metrics.failed += failed;
        }

        if !self.token.is_live() {
            return self.finish(&key, Outcome::Cancelled);
        }
        metrics.elapsed = started.elapsed();
        self.finish(&key, Outcome::Completed(metrics));
    }

    /// Render one batch with up to `concurrency` workers pulling from a
    /// shared cursor. Returns `(built, failed)`.
    async fn run_batch(&self, batch: &[Pending]) -> (usize, usize) {
        let cursor = AtomicUsize::new(0);
        let workers = self.options.concurrency.clamp(1, batch.len().max(1));
        let results = futures::future::join_all((0..workers).map(|_| self.worker(batch, &cursor))).await;
        results.into_iter().fold((0, 0), |(built, failed), (b, f)| (built + b, failed + f))
    }

    async fn worker(&self, batch: &[Pending], cursor: &AtomicUsize) -> (usize, usize) {
        let (mut built, mut failed) = (0, 0);
        loop {
            if !self.token.is_live() {
                break;
            }
            let index = cursor.fetch_add(1, Ordering::SeqCst);
            let Some(Pending { item, key }) = batch.get(index) else {
                break;
            };
            let (thumbnail, origin) = match self.renderer.render(&item.source, &self.options.transform).await {
                Ok(rendered) => {
                    built += 1;
                    (self.cache.store(key, rendered).await, Origin::Rendered)
                },
                Err(err) => {
                    failed += 1;
                    tracing::debug!(source = %item.source, error = ?err, "Render failed, using placeholder");
                    (Thumbnail::Location(self.options.placeholder.clone()), Origin::Placeholder)
                },
            };
            self.emit(HydrationEvent::Resolved { id: item.id.clone(), thumbnail, origin });
        }
        (built, failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Rendered;
    use crate::error::{ErrorKind, Result};
    use crate::manifest::Manifest;
    use async_trait::async_trait;
    use futures::StreamExt;
    use librarian_config::MemorySettings;
    use std::collections::HashSet;

    /// Renders after a delay, failing for sources containing "broken".
    struct SlowRenderer {
        delay: Duration,
        calls: Mutex<Vec<String>>,
    }

    impl SlowRenderer {
        fn new(delay: Duration) -> Arc<Self> {
            Arc::new(Self { delay, calls: Mutex::new(Vec::new()) })
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Renderer for SlowRenderer {
        async fn render(&self, source: &str, _transform: &Transform) -> Result<Rendered> {
            self.calls.lock().unwrap().push(source.to_string());
            tokio::time::sleep(self.delay).await;
            if source.contains("broken") {
                exn::bail!(ErrorKind::Render(source.to_string()));
            }
            Ok(Rendered::Bytes(source.as_bytes().to_vec()))
        }
    }

    fn scheduler(renderer: Arc<SlowRenderer>, options: SchedulerOptions) -> Scheduler {
        let manifest = Manifest::new(Arc::new(MemorySettings::new()), Duration::from_millis(400));
        let cache = Arc::new(ThumbnailCache::new(100, manifest, None, "thumbs"));
        Scheduler::new(cache, renderer, options)
    }

    fn items(sources: &[(&str, bool)]) -> Vec<HydrationItem> {
        sources.iter().map(|(source, visible)| HydrationItem::new(*source, *source, *visible)).collect()
    }

    #[test]
    fn test_tokens_supersede() {
        let tokens = JobTokens::new();
        let first = tokens.issue("world:Image");
        assert!(first.is_live());
        let second = tokens.issue("world:Image");
        assert!(!first.is_live());
        assert!(second.is_live());
        let other = tokens.issue("world:Item");
        assert!(other.is_live() && second.is_live());
        assert!(tokens.revoke("world:Image"));
        assert!(!second.is_live());
        assert!(!tokens.revoke("never"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_misses_are_built_and_hits_are_not() {
        let renderer = SlowRenderer::new(Duration::from_millis(10));
        let scheduler = scheduler(renderer.clone(), SchedulerOptions::default());
        let list = items(&[("a.png", true), ("b.png", true), ("c.png", false)]);

        let Outcome::Completed(first) = scheduler.request("world:Image", list.clone()).wait().await else {
            panic!("first job was cancelled");
        };
        assert_eq!((first.total, first.built, first.memory_hits, first.failed), (3, 3, 0, 0));

        let Outcome::Completed(second) = scheduler.request("world:Image", list).wait().await else {
            panic!("second job was cancelled");
        };
        assert_eq!((second.total, second.built, second.memory_hits), (3, 0, 3));
        assert_eq!(renderer.calls().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_store_write_leaves_no_manifest_entry() {
        let store = Arc::new(librarian_storage::backend::MockBackend::default());
        store.fail_writes(true);
        let manifest = Manifest::new(Arc::new(MemorySettings::new()), Duration::from_millis(400));
        let cache = Arc::new(ThumbnailCache::new(100, manifest, Some(store.clone() as librarian_storage::BackendHandle), "thumbs"));
        let scheduler = Scheduler::new(cache, SlowRenderer::new(Duration::from_millis(10)), SchedulerOptions::default());

        let Outcome::Completed(metrics) = scheduler.request("world:Image", items(&[("a.png", true)])).wait().await else {
            panic!("job was cancelled");
        };
        assert_eq!((metrics.built, metrics.failed), (1, 0));
        assert!(scheduler.cache().manifest().is_empty().await);
        assert_eq!(store.write_count(), 0);
        // Still served from memory.
        let key = CacheKey::new("a.png", &SchedulerOptions::default().transform);
        assert!(matches!(scheduler.cache().lookup(&key).await, Some((Thumbnail::Inline(_), _))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_visible_items_render_first() {
        let renderer = SlowRenderer::new(Duration::from_millis(10));
        let options = SchedulerOptions { concurrency: 1, batch_size: 2, ..SchedulerOptions::default() };
        let scheduler = scheduler(renderer.clone(), options);
        let list = items(&[("off-1.png", false), ("on-1.png", true), ("off-2.png", false), ("on-2.png", true)]);
        scheduler.request("world:Image", list).wait().await;
        assert_eq!(renderer.calls(), vec!["on-1.png", "on-2.png", "off-1.png", "off-2.png"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_resolves_to_placeholder() {
        let renderer = SlowRenderer::new(Duration::from_millis(10));
        let scheduler = scheduler(renderer, SchedulerOptions::default());
        let events: Vec<HydrationEvent> = scheduler
            .request("world:Image", items(&[("ok.png", true), ("broken.png", true)]))
            .into_stream()
            .collect()
            .await;

        assert_eq!(events.first(), Some(&HydrationEvent::Started { total: 2, pending: 2 }));
        assert!(events.contains(&HydrationEvent::Resolved {
            id: "broken.png".into(),
            thumbnail: Thumbnail::Location(PathBuf::from("icons/svg/mystery-man.svg")),
            origin: Origin::Placeholder,
        }));
        let Some(HydrationEvent::Finished(Outcome::Completed(metrics))) = events.last() else {
            panic!("job did not complete");
        };
        assert_eq!((metrics.built, metrics.failed), (1, 1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_request_supersedes_running_job() {
        let renderer = SlowRenderer::new(Duration::from_millis(50));
        let options = SchedulerOptions { concurrency: 1, batch_size: 1, ..SchedulerOptions::default() };
        let scheduler = scheduler(renderer.clone(), options);

        let sources: Vec<String> = (0..20).map(|n| format!("old-{n}.png")).collect();
        let old: Vec<HydrationItem> = sources.iter().map(|source| HydrationItem::new(source, source, true)).collect();
        let first = scheduler.request("world:Image", old);
        tokio::time::sleep(Duration::from_millis(120)).await;
        let second = scheduler.request("world:Image", items(&[("new.png", true)]));

        assert_eq!(first.wait().await, Outcome::Cancelled);
        assert!(matches!(second.wait().await, Outcome::Completed(_)));

        let calls = renderer.calls();
        let old_calls = calls.iter().filter(|source| source.starts_with("old-")).count();
        assert!(old_calls < 20, "superseded job kept rendering: {old_calls}");
        assert!(calls.contains(&"new.png".to_string()));
        // The render in flight when superseded still landed in the cache.
        let cached: HashSet<&str> = calls.iter().map(String::as_str).collect();
        for source in cached {
            let key = CacheKey::new(source, &Transform::default());
            assert!(scheduler.cache().lookup(&key).await.is_some(), "{source} missing from cache");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel() {
        let renderer = SlowRenderer::new(Duration::from_millis(50));
        let options = SchedulerOptions { concurrency: 1, batch_size: 1, ..SchedulerOptions::default() };
        let scheduler = scheduler(renderer, options);
        let job = scheduler.request("world:Image", items(&[("a.png", true), ("b.png", true), ("c.png", true)]));
        assert!(scheduler.cancel("world:Image"));
        assert_eq!(job.wait().await, Outcome::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_request_completes() {
        let scheduler = scheduler(SlowRenderer::new(Duration::ZERO), SchedulerOptions::default());
        let outcome = scheduler.request("world:Image", Vec::new()).wait().await;
        assert!(matches!(outcome, Outcome::Completed(Metrics { total: 0, .. })));
    }
}
