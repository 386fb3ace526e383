//! Tagger service
//!
//! `Tagger` owns the state of a tagging session: the source registry, the
//! result cache, the loading flags and the batch cancellation token. Its
//! operations are spread over the sibling modules:
//! - `dispatch`: queries, fragment scrapes, batch scrapes
//! - `entities`: creating and linking tags, performers and studios
//! - `save`: applying results to scenes and fingerprint submission
//!
//! Operations never return recoverable failures to the caller. They publish
//! an error notification and return `None` instead.

use crate::core::error::{Result, TaggerError};
use crate::core::notify::Notifier;
use crate::tagger::backend::StashBackend;
use crate::tagger::reconcile;
use crate::tagger::results::ResultCache;
use crate::tagger::settings::{TaggerConfig, TaggerSettings};
use crate::tagger::sources::SourceRegistry;
use crate::tagger::types::{QueryResult, ScrapedScene, Source};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Batch metadata reconciliation service
pub struct Tagger {
    pub(crate) backend: Arc<dyn StashBackend>,
    pub(crate) settings: Arc<TaggerSettings>,
    pub(crate) notifier: Arc<Notifier>,
    registry: RwLock<SourceRegistry>,
    pub(crate) results: ResultCache,
    loading: AtomicUsize,
    loading_multi: AtomicBool,
    pub(crate) multi_error: Mutex<Option<String>>,
    pub(crate) stop_token: Mutex<CancellationToken>,
}

/// Marks the tagger as loading until dropped
pub(crate) struct LoadingGuard<'a>(&'a AtomicUsize);

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Raises a flag until dropped
pub(crate) struct FlagGuard<'a>(&'a AtomicBool);

impl Drop for FlagGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Tagger {
    pub fn new(
        backend: Arc<dyn StashBackend>,
        settings: Arc<TaggerSettings>,
        notifier: Arc<Notifier>,
    ) -> Self {
        Self {
            backend,
            settings,
            notifier,
            registry: RwLock::new(SourceRegistry::default()),
            results: ResultCache::new(),
            loading: AtomicUsize::new(0),
            loading_multi: AtomicBool::new(false),
            multi_error: Mutex::new(None),
            stop_token: Mutex::new(CancellationToken::new()),
        }
    }

    /// Build the source registry and select the default source
    pub async fn initialize(&self) -> Result<()> {
        let stash_boxes = self.backend.configured_stash_boxes().await?;
        let scrapers = self.backend.list_scene_scrapers().await?;
        let registry = SourceRegistry::build(&stash_boxes, &scrapers);

        let selected_endpoint = self.settings.get().selected_endpoint;
        let default_id = registry
            .default_source(selected_endpoint.as_deref())
            .map(|s| s.id.clone());

        info!(
            stash_boxes = stash_boxes.len(),
            sources = registry.sources().len(),
            "Tagger sources loaded"
        );

        *self.registry.write().map_err(|e| {
            TaggerError::Internal(format!("Failed to acquire registry lock: {}", e))
        })? = registry;

        if let Some(id) = default_id {
            self.select_source(&id)?;
        }
        Ok(())
    }

    fn with_registry<R>(&self, f: impl FnOnce(&SourceRegistry) -> R) -> R {
        match self.registry.read() {
            Ok(guard) => f(&guard),
            Err(poisoned) => f(&poisoned.into_inner()),
        }
    }

    pub fn sources(&self) -> Vec<Source> {
        self.with_registry(|r| r.sources().to_vec())
    }

    pub fn current_source(&self) -> Option<Source> {
        self.with_registry(|r| r.current().cloned())
    }

    /// Stash-box endpoint of the current source
    pub fn current_endpoint(&self) -> Option<String> {
        self.current_source()
            .and_then(|s| s.stash_box_endpoint().map(str::to_string))
    }

    pub(crate) fn stash_box_index(&self, endpoint: &str) -> Option<usize> {
        self.with_registry(|r| r.stash_box_index(endpoint))
    }

    /// Make a source current
    ///
    /// Clears every cached result and stops a running batch scrape.
    /// Selecting a stash-box also persists its endpoint as the default for
    /// the next session.
    pub fn select_source(&self, id: &str) -> Result<Source> {
        let source = {
            let mut registry = self.registry.write().map_err(|e| {
                TaggerError::Internal(format!("Failed to acquire registry lock: {}", e))
            })?;
            registry.select(id)?.clone()
        };

        lock(&self.stop_token).cancel();
        self.results.clear_all();

        if let Some(endpoint) = source.stash_box_endpoint() {
            if self.settings.get().selected_endpoint.as_deref() != Some(endpoint) {
                self.settings
                    .update(|c| c.selected_endpoint = Some(endpoint.to_string()))?;
            }
        }

        info!(source_id = %source.id, "Selected scrape source");
        Ok(source)
    }

    pub fn config(&self) -> TaggerConfig {
        self.settings.get()
    }

    /// Replace the persisted tagger settings
    pub fn set_config(&self, config: TaggerConfig) -> Result<()> {
        self.settings.set(config)
    }

    pub fn notifier(&self) -> &Arc<Notifier> {
        &self.notifier
    }

    pub fn result(&self, scene_id: &str) -> Option<QueryResult> {
        self.results.get(scene_id)
    }

    pub fn results(&self) -> BTreeMap<String, QueryResult> {
        self.results.snapshot()
    }

    /// Apply a transform to every cached scraped scene
    pub fn map_results<F>(&self, transform: F)
    where
        F: FnMut(ScrapedScene) -> ScrapedScene,
    {
        self.results.map_results(transform);
    }

    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::SeqCst) > 0
    }

    pub fn is_loading_multi(&self) -> bool {
        self.loading_multi.load(Ordering::SeqCst)
    }

    /// Error of the last stash-box multi-scene scrape
    pub fn multi_error(&self) -> Option<String> {
        lock(&self.multi_error).clone()
    }

    pub(crate) fn begin_loading(&self) -> LoadingGuard<'_> {
        self.loading.fetch_add(1, Ordering::SeqCst);
        LoadingGuard(&self.loading)
    }

    pub(crate) fn begin_loading_multi(&self) -> FlagGuard<'_> {
        self.loading_multi.store(true, Ordering::SeqCst);
        FlagGuard(&self.loading_multi)
    }

    /// Publish a failed operation as an error notification
    pub(crate) fn report<T>(&self, outcome: Result<T>) -> Option<T> {
        match outcome {
            Ok(value) => Some(value),
            Err(e) => {
                self.notifier.error(&e);
                None
            }
        }
    }

    pub fn pending_tags_count(&self) -> usize {
        let config = self.settings.get();
        if !config.set_tags {
            return 0;
        }
        reconcile::pending_tags(&self.results.snapshot(), self.current_endpoint().as_deref()).len()
    }

    pub fn pending_performers_count(&self) -> usize {
        let config = self.settings.get();
        reconcile::pending_performers(
            &self.results.snapshot(),
            self.current_endpoint().as_deref(),
            &config.allowed_genders(),
        )
        .len()
    }

    pub fn pending_studios_count(&self) -> usize {
        reconcile::pending_studios(&self.results.snapshot(), self.current_endpoint().as_deref())
            .len()
    }

    pub fn pending_scenes_count(&self) -> usize {
        self.results.pending_scenes_count()
    }

    /// Scene ids queued for fingerprint submission to the current endpoint
    pub fn pending_fingerprints(&self) -> Vec<String> {
        match self.current_endpoint() {
            Some(endpoint) => self.settings.get().pending_fingerprints(&endpoint).to_vec(),
            None => Vec::new(),
        }
    }
}
