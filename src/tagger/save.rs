//! Saving scraped results to scenes

use crate::core::error::Result;
use crate::tagger::apply::{self, ApplyOptions, SAVE_CHUNK_SIZE};
use crate::tagger::service::Tagger;
use crate::tagger::settings::SceneField;
use crate::tagger::types::{SceneUpdateInput, StoredScene};
use chrono::Utc;
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Outcome of a mass save
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveReport {
    pub saved: Vec<String>,
    pub failed: Vec<String>,
}

impl Tagger {
    /// Apply the chosen result of every cached scene
    ///
    /// Scenes are saved in chunks. A failed chunk is reported and its scenes
    /// stay cached for another attempt; saved scenes leave the cache and are
    /// queued for fingerprint submission when the source is a stash-box.
    pub async fn mass_save(&self) -> Option<SaveReport> {
        let _loading = self.begin_loading();
        let outcome = self.try_mass_save().await;
        self.report(outcome)
    }

    async fn try_mass_save(&self) -> Result<SaveReport> {
        let targets = apply::collect_targets(&self.results.snapshot());
        if targets.is_empty() {
            self.notifier.success("No scenes to save");
            return Ok(SaveReport::default());
        }

        let ids: Vec<String> = targets.iter().map(|(id, _)| id.clone()).collect();
        let originals = self.backend.find_scenes_by_ids(&ids).await?;
        let originals: HashMap<&str, &StoredScene> =
            originals.iter().map(|s| (s.id.as_str(), s)).collect();

        let config = self.settings.get();
        let endpoint = self.current_endpoint();
        let options = ApplyOptions {
            config: &config,
            endpoint: endpoint.as_deref(),
            now: Utc::now(),
        };
        let fetch_covers = config.set_cover_image && !config.is_excluded(SceneField::CoverImage);

        let mut updates: Vec<SceneUpdateInput> = Vec::with_capacity(targets.len());
        for (scene_id, target) in &targets {
            let Some(original) = originals.get(scene_id.as_str()) else {
                debug!(scene_id = %scene_id, "Scene no longer exists, skipping");
                continue;
            };

            let cover_image = match (fetch_covers, target.image.as_deref()) {
                (true, Some(url)) => self.fetch_cover_image(url).await,
                _ => None,
            };

            updates.push(apply::build_scene_update(original, target, &options, cover_image));
        }

        let mut report = SaveReport::default();
        for chunk in updates.chunks(SAVE_CHUNK_SIZE) {
            let chunk_ids: Vec<String> = chunk.iter().map(|u| u.id.clone()).collect();
            match self.backend.update_scenes(chunk).await {
                Ok(_) => report.saved.extend(chunk_ids),
                Err(e) => {
                    warn!(scenes = ?chunk_ids, error = %e, "Failed to save scene chunk");
                    self.notifier.error(&e);
                    report.failed.extend(chunk_ids);
                }
            }
        }

        self.results.remove_many(&report.saved);
        if let Some(endpoint) = endpoint.as_deref() {
            self.settings
                .update(|c| c.queue_fingerprints(endpoint, &report.saved))?;
        }

        info!(
            saved = report.saved.len(),
            failed = report.failed.len(),
            "Mass save finished"
        );
        self.notifier
            .success(format!("Saved {} scenes", report.saved.len()));
        Ok(report)
    }

    async fn fetch_cover_image(&self, url: &str) -> Option<String> {
        match self.backend.fetch_image(url).await {
            Ok(image) => {
                let encoded = apply::encode_cover_image(&image);
                if encoded.is_none() {
                    debug!(url = %url, size = image.bytes.len(), "Dropping cover image");
                }
                encoded
            }
            Err(e) => {
                warn!(url = %url, error = %e, "Failed to fetch cover image");
                None
            }
        }
    }

    /// Save a single scene
    ///
    /// Marks the scene organized when configured, and optionally queues it
    /// for fingerprint submission to the current stash-box.
    pub async fn save_scene(&self, input: SceneUpdateInput, queue_fingerprint: bool) -> Option<String> {
        let _loading = self.begin_loading();
        let outcome = self.try_save_scene(input, queue_fingerprint).await;
        self.report(outcome)
    }

    async fn try_save_scene(&self, mut input: SceneUpdateInput, queue_fingerprint: bool) -> Result<String> {
        let config = self.settings.get();
        if config.mark_scene_as_organized_on_save {
            input.organized = Some(true);
        }

        let id = self.backend.update_scene(&input).await?;
        self.results.clear(&input.id);

        if queue_fingerprint {
            if let Some(endpoint) = self.current_endpoint() {
                let scene_ids = [input.id.clone()];
                self.settings
                    .update(|c| c.queue_fingerprints(&endpoint, &scene_ids))?;
            }
        }

        debug!(scene_id = %id, "Scene saved");
        Ok(id)
    }

    /// Submit the queued fingerprints of the current stash-box
    ///
    /// The queue is only cleared once the submission succeeds. Returns the
    /// number of submitted scenes.
    pub async fn submit_fingerprints(&self) -> Option<usize> {
        let _loading = self.begin_loading();
        let outcome = self.try_submit_fingerprints().await;
        self.report(outcome)
    }

    async fn try_submit_fingerprints(&self) -> Result<usize> {
        let Some(endpoint) = self.current_endpoint() else {
            return Ok(0);
        };
        let queued = self.settings.get().pending_fingerprints(&endpoint).to_vec();
        if queued.is_empty() {
            return Ok(0);
        }

        if !self.backend.submit_fingerprints(&endpoint, &queued).await? {
            warn!(endpoint = %endpoint, "Stash-box rejected fingerprint submission");
            return Ok(0);
        }

        self.settings
            .update(|c| c.clear_fingerprints(&endpoint, &queued))?;

        info!(endpoint = %endpoint, count = queued.len(), "Submitted fingerprints");
        self.notifier
            .success(format!("Submitted fingerprints for {} scenes", queued.len()));
        Ok(queued.len())
    }

    /// Create missing tags, performers and studios, then save every scene
    pub async fn run_all(&self) -> Option<SaveReport> {
        self.mass_create_tags().await;
        self.mass_create_performers().await;
        self.mass_create_studios().await;
        self.mass_save().await
    }
}
