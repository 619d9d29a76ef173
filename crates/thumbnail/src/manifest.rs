//! Durable index of rendered thumbnails.
//!
//! The manifest maps [`CacheKey`]s to the location a thumbnail was persisted
//! at. It is loaded from the settings store on first use, mutated in memory,
//! and written back after a quiet period. At most one write is in flight at
//! a time; a write that fails transiently is retried after another quiet
//! period, a refused write is not.

use crate::error::{ErrorKind, Result};
use crate::key::CacheKey;
use exn::ResultExt;
use librarian_config::SettingsStore;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Settings key the manifest is stored under.
pub const MANIFEST_KEY: &str = "thumbnails.manifest";

type Entries = HashMap<CacheKey, PathBuf>;

#[derive(Default)]
struct State {
    /// `None` until loaded from the settings store.
    entries: Option<Entries>,
    dirty: bool,
    /// When the scheduled flush should run.
    deadline: Option<Instant>,
    flusher: Option<JoinHandle<()>>,
}

struct Inner {
    settings: Arc<dyn SettingsStore>,
    key: String,
    debounce: Duration,
    state: Mutex<State>,
    /// Serialises writes to the settings store.
    writing: Mutex<()>,
}

#[derive(Clone)]
pub struct Manifest {
    inner: Arc<Inner>,
}

impl Manifest {
    pub fn new(settings: Arc<dyn SettingsStore>, debounce: Duration) -> Self {
        Self::with_key(settings, MANIFEST_KEY, debounce)
    }

    pub fn with_key(settings: Arc<dyn SettingsStore>, key: impl Into<String>, debounce: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                settings,
                key: key.into(),
                debounce,
                state: Mutex::new(State::default()),
                writing: Mutex::new(()),
            }),
        }
    }

    pub async fn get(&self, key: &CacheKey) -> Option<PathBuf> {
        let mut state = self.inner.state.lock().await;
        self.inner.loaded(&mut state).await.get(key).cloned()
    }

    pub async fn len(&self) -> usize {
        let mut state = self.inner.state.lock().await;
        self.inner.loaded(&mut state).await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn entries(&self) -> Vec<(CacheKey, PathBuf)> {
        let mut state = self.inner.state.lock().await;
        let mut entries: Vec<_> = self
            .inner
            .loaded(&mut state)
            .await
            .iter()
            .map(|(key, location)| (key.clone(), location.clone()))
            .collect();
        entries.sort();
        entries
    }

    /// Record a persisted thumbnail and schedule a flush.
    pub async fn insert(&self, key: CacheKey, location: PathBuf) {
        let mut state = self.inner.state.lock().await;
        self.inner.loaded(&mut state).await.insert(key, location);
        self.schedule(&mut state);
    }

    pub async fn remove(&self, key: &CacheKey) -> Option<PathBuf> {
        self.remove_where(|candidate, _| candidate == key).await.pop().map(|(_, location)| location)
    }

    /// Remove every entry matching the predicate. A flush is scheduled only
    /// if something was removed.
    pub async fn remove_where(&self, mut matches: impl FnMut(&CacheKey, &PathBuf) -> bool) -> Vec<(CacheKey, PathBuf)> {
        let mut state = self.inner.state.lock().await;
        let entries = self.inner.loaded(&mut state).await;
        let doomed: Vec<CacheKey> =
            entries.iter().filter(|&(key, location)| matches(key, location)).map(|(key, _)| key.clone()).collect();
        let removed: Vec<(CacheKey, PathBuf)> = doomed
            .into_iter()
            .filter_map(|key| entries.remove(&key).map(|location| (key, location)))
            .collect();
        if !removed.is_empty() {
            self.schedule(&mut state);
        }
        removed
    }

    /// Drop every entry and schedule a flush of the empty manifest.
    pub async fn clear(&self) -> Vec<(CacheKey, PathBuf)> {
        self.remove_where(|_, _| true).await
    }

    fn schedule(&self, state: &mut State) {
        state.dirty = true;
        state.deadline = Some(Instant::now() + self.inner.debounce);
        if state.flusher.is_none() {
            state.flusher = Some(tokio::spawn(Inner::flusher(Arc::clone(&self.inner))));
        }
    }

    /// Persist now, cancelling any pending debounce. A clean manifest is not
    /// written.
    pub async fn flush(&self) -> Result<()> {
        {
            let mut state = self.inner.state.lock().await;
            state.deadline = None;
        }
        self.inner.persist().await.map(|_| ())
    }
}

impl Inner {
    async fn loaded<'a>(&self, state: &'a mut State) -> &'a mut Entries {
        if state.entries.is_none() {
            let entries = match self.load().await {
                Ok(entries) => entries,
                Err(err) => {
                    tracing::warn!(key = %self.key, error = ?err, "Starting with an empty thumbnail manifest");
                    Entries::new()
                },
            };
            tracing::debug!(key = %self.key, entries = entries.len(), "Loaded thumbnail manifest");
            state.entries = Some(entries);
        }
        state.entries.get_or_insert_default()
    }

    async fn load(&self) -> Result<Entries> {
        let Some(value) = self.settings.get(&self.key).await.or_raise(|| ErrorKind::Manifest)? else {
            return Ok(Entries::new());
        };
        let raw: HashMap<String, String> = serde_json::from_value(value).or_raise(|| ErrorKind::Manifest)?;
        Ok(raw.into_iter().map(|(key, location)| (CacheKey::from_raw(key), PathBuf::from(location))).collect())
    }

    /// Write the current entries if they are dirty. Returns whether anything
    /// was written.
    async fn persist(&self) -> Result<bool> {
        let _writing = self.writing.lock().await;
        let snapshot = {
            let mut state = self.state.lock().await;
            if !state.dirty {
                return Ok(false);
            }
            state.dirty = false;
            let entries = state.entries.as_ref().map(|entries| {
                entries
                    .iter()
                    .map(|(key, location)| (key.as_str().to_string(), Value::String(location.to_string_lossy().into_owned())))
                    .collect::<serde_json::Map<_, _>>()
            });
            Value::Object(entries.unwrap_or_default())
        };
        let written = snapshot.as_object().map_or(0, serde_json::Map::len);
        match self.settings.set(&self.key, snapshot).await {
            Ok(()) => {
                tracing::debug!(key = %self.key, entries = written, "Persisted thumbnail manifest");
                Ok(true)
            },
            Err(err) => {
                // Nothing newer was written, so the in-memory state is still unsaved.
                self.state.lock().await.dirty = true;
                let kind = if err.is_refusal() {
                    ErrorKind::PermissionDenied(self.key.clone())
                } else {
                    ErrorKind::Storage(self.key.clone())
                };
                Err(err).or_raise(|| kind)
            },
        }
    }

    async fn flusher(self: Arc<Self>) {
        loop {
            let deadline = {
                let mut state = self.state.lock().await;
                match state.deadline {
                    Some(deadline) => deadline,
                    None => {
                        state.flusher = None;
                        return;
                    },
                }
            };
            tokio::time::sleep_until(deadline).await;
            {
                let mut state = self.state.lock().await;
                match state.deadline {
                    // Rescheduled while sleeping.
                    Some(current) if current > Instant::now() => continue,
                    Some(_) => state.deadline = None,
                    // Flushed by hand while sleeping.
                    None => continue,
                }
            }
            match self.persist().await {
                Ok(_) => {},
                Err(err) if err.is_refusal() => {
                    tracing::warn!(key = %self.key, error = ?err, "Thumbnail manifest write refused, not retrying");
                    let mut state = self.state.lock().await;
                    // A change made during the refused write has its own flush scheduled.
                    if state.deadline.is_none() {
                        state.dirty = false;
                    }
                },
                Err(err) => {
                    tracing::warn!(key = %self.key, error = ?err, "Thumbnail manifest write failed, retrying");
                    let mut state = self.state.lock().await;
                    if state.deadline.is_none() {
                        state.deadline = Some(Instant::now() + self.debounce);
                    }
                },
            }
        }
    }
}
