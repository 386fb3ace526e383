//! Tag, performer and studio reconciliation
//!
//! Mass creation of the entities still missing from the local library, and
//! the single-entity create, link and update operations.

use crate::core::error::{Result, TaggerError};
use crate::tagger::apply::{merge_stash_ids, union_stash_ids};
use crate::tagger::reconcile::{self, Backfill};
use crate::tagger::service::Tagger;
use crate::tagger::types::{
    PerformerBatchTagInput, PerformerCreateInput, PerformerUpdateInput, ScrapedPerformer,
    ScrapedStudio, ScrapedTag, StashId, StudioCreateInput, StudioUpdateInput, TagCreateInput,
    TagUpdateInput,
};
use chrono::Utc;
use tracing::{info, warn};

impl Tagger {
    /// Create every unmatched scraped tag, once per name
    ///
    /// Returns the number of tags created.
    pub async fn mass_create_tags(&self) -> Option<usize> {
        let _loading = self.begin_loading();
        let outcome = self.try_mass_create_tags().await;
        self.report(outcome)
    }

    async fn try_mass_create_tags(&self) -> Result<usize> {
        if !self.settings.get().set_tags {
            return Ok(0);
        }

        let endpoint = self.current_endpoint();
        let pending = reconcile::pending_tags(&self.results.snapshot(), endpoint.as_deref());
        if pending.is_empty() {
            self.notifier.success("No new tags to create");
            return Ok(0);
        }

        let created = self.backend.create_tags(&pending).await?;
        let backfill = Backfill::from_created(&created);
        self.results.map_results(|scene| backfill.apply_tags(scene));

        info!(count = created.len(), "Created tags");
        self.notifier.success(format!("Created {} tags", created.len()));
        Ok(created.len())
    }

    /// Create every unmatched scraped performer whose gender is allowed
    ///
    /// When the source is a stash-box, the new performers are then refreshed
    /// from it by a server-side job.
    pub async fn mass_create_performers(&self) -> Option<usize> {
        let _loading = self.begin_loading();
        let outcome = self.try_mass_create_performers().await;
        self.report(outcome)
    }

    async fn try_mass_create_performers(&self) -> Result<usize> {
        let config = self.settings.get();
        let endpoint = self.current_endpoint();
        let pending = reconcile::pending_performers(
            &self.results.snapshot(),
            endpoint.as_deref(),
            &config.allowed_genders(),
        );
        if pending.is_empty() {
            self.notifier.success("No new performers to create");
            return Ok(0);
        }

        let created = self.backend.create_performers(&pending).await?;
        let backfill = Backfill::from_created(&created);
        self.results.map_results(|scene| backfill.apply_performers(scene));

        info!(count = created.len(), "Created performers");
        self.notifier
            .success(format!("Created {} performers", created.len()));

        if let Some(endpoint) = endpoint.as_deref() {
            match self.stash_box_index(endpoint) {
                Some(index) => {
                    let input = PerformerBatchTagInput {
                        endpoint: index,
                        performer_ids: created.iter().map(|c| c.id.clone()).collect(),
                        refresh: true,
                        exclude_fields: config.excluded_performer_fields.clone(),
                        create_parent: false,
                    };
                    if let Err(e) = self.backend.batch_tag_performers(&input).await {
                        warn!(error = %e, "Failed to start performer refresh");
                    }
                }
                None => warn!(endpoint = %endpoint, "Endpoint is not a configured stash-box"),
            }
        }

        Ok(created.len())
    }

    /// Create every unmatched scraped studio, once per name
    pub async fn mass_create_studios(&self) -> Option<usize> {
        let _loading = self.begin_loading();
        let outcome = self.try_mass_create_studios().await;
        self.report(outcome)
    }

    async fn try_mass_create_studios(&self) -> Result<usize> {
        let endpoint = self.current_endpoint();
        let pending = reconcile::pending_studios(&self.results.snapshot(), endpoint.as_deref());
        if pending.is_empty() {
            self.notifier.success("No new studios to create");
            return Ok(0);
        }

        let created = self.backend.create_studios(&pending).await?;
        let backfill = Backfill::from_created(&created);
        self.results.map_results(|scene| backfill.apply_studios(scene));

        info!(count = created.len(), "Created studios");
        self.notifier
            .success(format!("Created {} studios", created.len()));
        Ok(created.len())
    }

    /// Create one tag and match it to every scraped tag with its name
    pub async fn create_new_tag(&self, tag: &ScrapedTag, input: TagCreateInput) -> Option<String> {
        let outcome = self.backend.create_tag(&input).await;
        let id = self.report(outcome)?;

        let backfill = Backfill::name(tag.name.clone(), id.clone());
        self.results.map_results(|scene| backfill.apply_tags(scene));

        self.notifier
            .success(format!("Created tag: {}", input.name));
        Some(id)
    }

    /// Update an existing tag, keeping the remote ids it already has
    pub async fn update_tag(&self, tag: &ScrapedTag, input: TagUpdateInput) -> Option<String> {
        let outcome = self.try_update_tag(tag, input).await;
        self.report(outcome)
    }

    async fn try_update_tag(&self, tag: &ScrapedTag, mut input: TagUpdateInput) -> Result<String> {
        if let Some(incoming) = input.stash_ids.take() {
            let existing = match self.backend.find_tag(&input.id).await {
                Ok(found) => found.map(|t| t.stash_ids).unwrap_or_default(),
                Err(e) => {
                    warn!(tag_id = %input.id, error = %e, "Failed to look up tag, not merging remote ids");
                    Vec::new()
                }
            };
            input.stash_ids = Some(union_stash_ids(&existing, &incoming));
        }

        let id = self.backend.update_tag(&input).await?;

        let backfill = Backfill::remote_id_or_name(tag.remote_site_id.as_deref(), &tag.name, id.clone());
        self.results.map_results(|scene| backfill.apply_tags(scene));

        let name = input.name.as_deref().unwrap_or(&tag.name);
        self.notifier.success(format!("Updated tag: {}", name));
        Ok(id)
    }

    /// Create one performer and match it to the scraped performers it stands for
    pub async fn create_new_performer(
        &self,
        performer: &ScrapedPerformer,
        input: PerformerCreateInput,
    ) -> Option<String> {
        let outcome = self.backend.create_performer(&input).await;
        let id = self.report(outcome)?;

        let backfill = Backfill::remote_id_or_name(
            performer.remote_site_id.as_deref(),
            &performer.name,
            id.clone(),
        );
        self.results.map_results(|scene| backfill.apply_performers(scene));

        self.notifier
            .success(format!("Created performer: {}", input.name));
        Some(id)
    }

    /// Attach the scraped performer's remote id to an existing performer
    ///
    /// Needs a stash-box source and a scraped remote id; returns `None`
    /// without a remote call otherwise.
    pub async fn link_performer(&self, performer: &ScrapedPerformer, stored_id: &str) -> Option<String> {
        let endpoint = self.current_endpoint()?;
        let remote_id = performer.remote_site_id.as_deref().filter(|r| !r.is_empty())?;
        let outcome = self.try_link_performer(&endpoint, remote_id, stored_id).await;
        let id = self.report(outcome)?;

        self.notifier.success("Added stash-id to performer");
        Some(id)
    }

    async fn try_link_performer(&self, endpoint: &str, remote_id: &str, stored_id: &str) -> Result<String> {
        let existing = self
            .backend
            .find_performer(stored_id)
            .await?
            .ok_or_else(|| TaggerError::NotFound(format!("Performer {}", stored_id)))?;

        let stash_ids = merge_stash_ids(&existing.stash_ids, &[linked_stash_id(endpoint, remote_id)]);
        let id = self
            .backend
            .update_performer(&PerformerUpdateInput {
                id: stored_id.to_string(),
                stash_ids: Some(stash_ids),
            })
            .await?;

        let backfill = Backfill::remote_id(remote_id, id.clone());
        self.results.map_results(|scene| backfill.apply_performers(scene));
        Ok(id)
    }

    /// Create one studio and match it to scraped studios and parents with its name
    pub async fn create_new_studio(&self, studio: &ScrapedStudio, input: StudioCreateInput) -> Option<String> {
        let outcome = self.backend.create_studio(&input).await;
        let id = self.report(outcome)?;

        let backfill = Backfill::name(studio.name.clone(), id.clone());
        self.results.map_results(|scene| backfill.apply_studios(scene));

        self.notifier
            .success(format!("Created studio: {}", input.name));
        Some(id)
    }

    /// Update an existing studio, replacing its remote ids per endpoint
    pub async fn update_studio(&self, input: StudioUpdateInput) -> Option<String> {
        let outcome = self.try_update_studio(input).await;
        self.report(outcome)
    }

    async fn try_update_studio(&self, mut input: StudioUpdateInput) -> Result<String> {
        if let Some(incoming) = input.stash_ids.take() {
            let existing = match self.backend.find_studio(&input.id).await {
                Ok(found) => found.map(|s| s.stash_ids).unwrap_or_default(),
                Err(e) => {
                    warn!(studio_id = %input.id, error = %e, "Failed to look up studio, not merging remote ids");
                    Vec::new()
                }
            };
            input.stash_ids = Some(merge_stash_ids(&existing, &incoming));
        }

        let id = self.backend.update_studio(&input).await?;

        let remote_id = self.current_endpoint().and_then(|endpoint| {
            input
                .stash_ids
                .iter()
                .flatten()
                .find(|s| s.endpoint == endpoint)
                .map(|s| s.stash_id.clone())
        });
        if let Some(remote_id) = remote_id {
            let backfill = Backfill::remote_id(remote_id, id.clone());
            self.results.map_results(|scene| backfill.apply_studios(scene));
        }

        let name = input.name.clone().unwrap_or_else(|| id.clone());
        self.notifier.success(format!("Updated studio: {}", name));
        Ok(id)
    }

    /// Attach the scraped studio's remote id to an existing studio
    pub async fn link_studio(&self, studio: &ScrapedStudio, stored_id: &str) -> Option<String> {
        let endpoint = self.current_endpoint()?;
        let remote_id = studio.remote_site_id.as_deref().filter(|r| !r.is_empty())?;
        let outcome = self.try_link_studio(&endpoint, remote_id, stored_id).await;
        let id = self.report(outcome)?;

        self.notifier.success("Added stash-id to studio");
        Some(id)
    }

    async fn try_link_studio(&self, endpoint: &str, remote_id: &str, stored_id: &str) -> Result<String> {
        let existing = self
            .backend
            .find_studio(stored_id)
            .await?
            .ok_or_else(|| TaggerError::NotFound(format!("Studio {}", stored_id)))?;

        let stash_ids = merge_stash_ids(&existing.stash_ids, &[linked_stash_id(endpoint, remote_id)]);
        let id = self
            .backend
            .update_studio(&StudioUpdateInput {
                id: stored_id.to_string(),
                stash_ids: Some(stash_ids),
                ..Default::default()
            })
            .await?;

        let backfill = Backfill::remote_id(remote_id, id.clone());
        self.results.map_results(|scene| backfill.apply_studios(scene));
        Ok(id)
    }
}

fn linked_stash_id(endpoint: &str, remote_id: &str) -> StashId {
    StashId {
        endpoint: endpoint.to_string(),
        stash_id: remote_id.to_string(),
        updated_at: Some(Utc::now()),
    }
}
