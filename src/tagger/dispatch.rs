//! Query dispatch
//!
//! Single-scene queries, result resolution and batch fragment scrapes
//! against the current source.

use crate::core::error::TaggerError;
use crate::tagger::pool::{BatchReport, WorkerPool};
use crate::tagger::query::default_query;
use crate::tagger::service::{lock, Tagger};
use crate::tagger::types::{
    QueryResult, Resolution, SceneFragmentInput, ScrapedScene, Source, StoredScene,
};
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

fn unsupported(source: &Source, operation: &str) -> TaggerError {
    TaggerError::UnsupportedOperation {
        source_id: source.id.clone(),
        operation: operation.to_string(),
    }
}

impl Tagger {
    /// Search the current source by free text and cache the outcome
    ///
    /// Stash-box results are final and marked resolved; scraper results must
    /// be resolved before they are applied. Returns `None` when no source is
    /// selected.
    pub async fn query_by_text(&self, scene_id: &str, text: &str) -> Option<QueryResult> {
        let source = self.current_source()?;
        let _loading = self.begin_loading();
        self.results.clear(scene_id);

        let outcome = if source.supports_query {
            self.backend
                .scrape_scene_query(&source.source_input, text)
                .await
        } else {
            Err(unsupported(&source, "query"))
        };

        let resolution = if source.is_stash_box() {
            Resolution::Resolved
        } else {
            Resolution::Unresolved
        };
        let result = QueryResult::from_scrape(outcome, resolution);

        debug!(
            scene_id = %scene_id,
            source_id = %source.id,
            results = result.results().map_or(0, |r| r.len()),
            "Text query finished"
        );

        if !self.is_current(&source) {
            return None;
        }
        self.results.set(scene_id, result.clone());
        Some(result)
    }

    /// Scrape the current source using the scene's own stored data
    pub async fn fragment_scrape(&self, scene_id: &str) -> Option<QueryResult> {
        let source = self.current_source()?;
        let _loading = self.begin_loading();
        self.results.clear(scene_id);

        let result = self.scrape_fragment_result(&source, scene_id).await;
        if !self.is_current(&source) {
            return None;
        }
        self.results.set(scene_id, result.clone());
        Some(result)
    }

    async fn scrape_fragment_result(&self, source: &Source, scene_id: &str) -> QueryResult {
        let outcome = if source.supports_fragment {
            self.backend
                .scrape_scene(&source.source_input, scene_id)
                .await
        } else {
            Err(unsupported(source, "fragment"))
        };

        if let Err(e) = &outcome {
            warn!(scene_id = %scene_id, error = %e, "Fragment scrape failed");
        }
        QueryResult::from_scrape(outcome, Resolution::Resolved)
    }

    /// Fully scrape one unresolved result and replace it in place
    ///
    /// Does nothing when no source is selected, when the scene is already
    /// resolved or when the cache holds no results for the id. On failure
    /// the slot is marked resolved as it stands so it is not retried.
    pub async fn resolve_scene(&self, scene_id: &str, index: usize, scene: &ScrapedScene) {
        let Some(source) = self.current_source() else {
            return;
        };
        if scene.is_resolved() || !self.results.has_results(scene_id) {
            return;
        }

        let input = SceneFragmentInput::from(scene);
        let outcome = self
            .backend
            .scrape_scene_fragment(&source.source_input, &input)
            .await;
        if !self.is_current(&source) {
            return;
        }
        match outcome {
            Ok(scenes) => {
                let replacement = scenes.into_iter().next();
                if replacement.is_none() {
                    debug!(scene_id = %scene_id, index, "Resolve returned no scene");
                }
                self.results.update_slot(scene_id, index, |slot| match replacement {
                    Some(resolved) => *slot = resolved.with_resolution(Resolution::Resolved),
                    None => slot.resolution = Resolution::Resolved,
                });
            }
            Err(e) => {
                self.notifier.error(&e);
                self.results.update_slot(scene_id, index, |slot| {
                    slot.resolution = Resolution::Resolved;
                });
            }
        }
    }

    /// Fragment-scrape many scenes
    ///
    /// Clears the whole cache first. A stash-box source answers all scenes
    /// in one call; any other source goes through the worker pool and can
    /// be stopped with [`Tagger::stop_batch_scrape`].
    pub async fn batch_fragment_scrape(&self, scene_ids: &[String]) -> Option<BatchReport> {
        let source = self.current_source()?;
        self.results.clear_all();
        let _loading = self.begin_loading();
        let _loading_multi = self.begin_loading_multi();
        *lock(&self.multi_error) = None;

        if let Some(endpoint) = source.stash_box_endpoint() {
            return Some(self.scrape_multi(&source, endpoint, scene_ids).await);
        }

        let token = CancellationToken::new();
        *lock(&self.stop_token) = token.clone();

        info!(
            source_id = %source.id,
            scenes = scene_ids.len(),
            "Starting batch fragment scrape"
        );

        let pool = WorkerPool::new(token);
        let report = pool
            .run(
                scene_ids.to_vec(),
                |id| {
                    let source = &source;
                    async move { self.scrape_fragment_result(source, &id).await }
                },
                |batch| {
                    if self.is_current(&source) {
                        self.results.merge(batch);
                    }
                },
            )
            .await;

        Some(report)
    }

    async fn scrape_multi(
        &self,
        source: &Source,
        endpoint: &str,
        scene_ids: &[String],
    ) -> BatchReport {
        let mut report = BatchReport {
            requested: scene_ids.len(),
            ..Default::default()
        };

        let outcome = self
            .backend
            .scrape_multi_scenes(endpoint, scene_ids)
            .await
            .and_then(|lists| {
                if lists.len() == scene_ids.len() {
                    Ok(lists)
                } else {
                    Err(TaggerError::InvalidResponse(format!(
                        "expected {} result lists, got {}",
                        scene_ids.len(),
                        lists.len()
                    )))
                }
            });
        if !self.is_current(source) {
            return report;
        }

        match outcome {
            Ok(lists) => {
                let batch: BTreeMap<String, QueryResult> = scene_ids
                    .iter()
                    .cloned()
                    .zip(lists)
                    .map(|(id, scenes)| {
                        (id, QueryResult::from_scrape(Ok(scenes), Resolution::Resolved))
                    })
                    .collect();
                report.completed = batch.len();
                report.flushes = 1;
                self.results.merge(batch);
            }
            Err(e) => {
                warn!(endpoint = %endpoint, error = %e, "Multi-scene scrape failed");
                *lock(&self.multi_error) = Some(e.to_string());
            }
        }

        report
    }

    /// Whether `source` is still the selected source
    ///
    /// Results that arrive after a switch belong to the old source and are
    /// dropped.
    fn is_current(&self, source: &Source) -> bool {
        let current = self.current_source().map(|s| s.id);
        if current.as_deref() == Some(source.id.as_str()) {
            return true;
        }
        debug!(source_id = %source.id, "Source changed, dropping results");
        false
    }

    /// Stop the running batch scrape after the in-flight scrapes finish
    pub fn stop_batch_scrape(&self) {
        lock(&self.stop_token).cancel();
    }

    /// Query every scene with its default query string plus an override
    ///
    /// Scenes are queried one after another. Nothing happens when the
    /// override or the scene list is empty.
    pub async fn search_all(&self, scenes: &[StoredScene], global_override: &str) -> usize {
        let global_override = global_override.trim();
        if global_override.is_empty() || scenes.is_empty() {
            return 0;
        }

        let config = self.settings.get();
        let mut searched = 0;
        for scene in scenes {
            let query = format!("{} {}", default_query(scene, &config), global_override);
            if self.query_by_text(&scene.id, query.trim()).await.is_some() {
                searched += 1;
            }
        }

        if searched > 0 {
            self.notifier.success(format!("Searched {} scenes", searched));
        }
        searched
    }
}
