//! Remote backend interface
//!
//! This module defines the operations the tagger needs from the local media
//! server. The server owns the scrapers, the stash-box connections and the
//! stored library; the tagger only orchestrates calls against it.
//!
//! Implementations must be safe to share between concurrent workers. Every
//! failure is returned as a `TaggerError`; a response carrying a list of
//! remote errors maps to `TaggerError::RemoteError`.

use crate::core::error::Result;
use crate::tagger::types::{
    CreatedEntity, FetchedImage, PerformerBatchTagInput, PerformerCreateInput,
    PerformerUpdateInput, SceneFragmentInput, SceneUpdateInput, ScrapedScene, ScraperInfo,
    SourceInput, StashBoxInfo, StoredEntity, StoredScene, StudioCreateInput, StudioUpdateInput,
    TagCreateInput, TagUpdateInput,
};
use async_trait::async_trait;

#[async_trait]
pub trait StashBackend: Send + Sync {
    /// List the stash-box endpoints configured on the server, in server order
    async fn configured_stash_boxes(&self) -> Result<Vec<StashBoxInfo>>;

    /// List the scraper plugins that support scenes
    async fn list_scene_scrapers(&self) -> Result<Vec<ScraperInfo>>;

    /// Search a source by free text
    ///
    /// # Arguments
    /// * `source` - Source to query
    /// * `query` - Free-text search string
    ///
    /// # Returns
    /// Candidate scenes, best match first
    async fn scrape_scene_query(&self, source: &SourceInput, query: &str)
        -> Result<Vec<ScrapedScene>>;

    /// Scrape a source using the stored data of a local scene
    async fn scrape_scene(&self, source: &SourceInput, scene_id: &str)
        -> Result<Vec<ScrapedScene>>;

    /// Scrape a source using a partial scraped scene
    ///
    /// Used to fully resolve a candidate returned by a scraper query.
    async fn scrape_scene_fragment(
        &self,
        source: &SourceInput,
        input: &SceneFragmentInput,
    ) -> Result<Vec<ScrapedScene>>;

    /// Scrape many local scenes against a stash-box in a single call
    ///
    /// # Returns
    /// One result list per requested scene id, in request order
    async fn scrape_multi_scenes(
        &self,
        endpoint: &str,
        scene_ids: &[String],
    ) -> Result<Vec<Vec<ScrapedScene>>>;

    /// Fetch the stored state of local scenes
    ///
    /// Unknown ids are omitted from the result.
    async fn find_scenes_by_ids(&self, ids: &[String]) -> Result<Vec<StoredScene>>;

    async fn find_tag(&self, id: &str) -> Result<Option<StoredEntity>>;

    async fn find_performer(&self, id: &str) -> Result<Option<StoredEntity>>;

    async fn find_studio(&self, id: &str) -> Result<Option<StoredEntity>>;

    /// Create a tag, returning its new id
    async fn create_tag(&self, input: &TagCreateInput) -> Result<String>;

    /// Create many tags in one call
    async fn create_tags(&self, inputs: &[TagCreateInput]) -> Result<Vec<CreatedEntity>>;

    async fn update_tag(&self, input: &TagUpdateInput) -> Result<String>;

    async fn create_performer(&self, input: &PerformerCreateInput) -> Result<String>;

    async fn create_performers(
        &self,
        inputs: &[PerformerCreateInput],
    ) -> Result<Vec<CreatedEntity>>;

    async fn update_performer(&self, input: &PerformerUpdateInput) -> Result<String>;

    async fn create_studio(&self, input: &StudioCreateInput) -> Result<String>;

    async fn create_studios(&self, inputs: &[StudioCreateInput]) -> Result<Vec<CreatedEntity>>;

    async fn update_studio(&self, input: &StudioUpdateInput) -> Result<String>;

    async fn update_scene(&self, input: &SceneUpdateInput) -> Result<String>;

    /// Update many scenes in one call, returning the updated ids
    async fn update_scenes(&self, inputs: &[SceneUpdateInput]) -> Result<Vec<String>>;

    /// Start a server-side job that refreshes performers from a stash-box
    async fn batch_tag_performers(&self, input: &PerformerBatchTagInput) -> Result<()>;

    /// Submit the fingerprints of the given scenes to a stash-box
    ///
    /// # Returns
    /// Whether the stash-box accepted the submission
    async fn submit_fingerprints(&self, endpoint: &str, scene_ids: &[String]) -> Result<bool>;

    /// Download an image
    ///
    /// # Errors
    /// Returns an error for transport failures and non-success statuses
    async fn fetch_image(&self, url: &str) -> Result<FetchedImage>;
}
