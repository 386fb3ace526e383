//! In-memory backend for tests

use crate::core::error::{Result, TaggerError};
use crate::tagger::backend::StashBackend;
use crate::tagger::types::{
    CreatedEntity, FetchedImage, PerformerBatchTagInput, PerformerCreateInput,
    PerformerUpdateInput, SceneFragmentInput, SceneUpdateInput, ScrapeType, ScrapedScene,
    ScraperInfo, SourceInput, StashBoxInfo, StoredEntity, StoredScene, StudioCreateInput,
    StudioUpdateInput, TagCreateInput, TagUpdateInput,
};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

/// Canned responses and a log of the calls made
#[derive(Debug, Default)]
pub struct FakeState {
    pub query_results: HashMap<String, Vec<ScrapedScene>>,
    pub scene_results: HashMap<String, Vec<ScrapedScene>>,
    pub failing_scenes: HashSet<String>,
    pub fragment_results: Vec<ScrapedScene>,
    pub fail_fragment: bool,
    pub fail_multi: bool,
    /// Drop the last list from multi-scene answers
    pub short_multi: bool,
    /// Yield to the runtime once before answering a scene scrape
    pub yield_scrapes: bool,
    pub stored_scenes: HashMap<String, StoredScene>,
    pub tags: HashMap<String, StoredEntity>,
    pub performers: HashMap<String, StoredEntity>,
    pub studios: HashMap<String, StoredEntity>,
    pub images: HashMap<String, FetchedImage>,
    /// Scene ids whose chunk fails to save
    pub failing_saves: HashSet<String>,
    pub reject_fingerprints: bool,
    next_id: usize,

    pub query_calls: Vec<String>,
    pub multi_calls: Vec<Vec<String>>,
    pub created_tags: Vec<Vec<TagCreateInput>>,
    pub created_performers: Vec<Vec<PerformerCreateInput>>,
    pub created_studios: Vec<Vec<StudioCreateInput>>,
    pub tag_updates: Vec<TagUpdateInput>,
    pub performer_updates: Vec<PerformerUpdateInput>,
    pub studio_updates: Vec<StudioUpdateInput>,
    pub scene_updates: Vec<SceneUpdateInput>,
    pub scene_update_batches: Vec<Vec<String>>,
    pub batch_tag_inputs: Vec<PerformerBatchTagInput>,
    pub submitted: Vec<(String, Vec<String>)>,
}

impl FakeState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{}", prefix, self.next_id)
    }
}

#[derive(Debug, Default)]
pub struct FakeBackend {
    stash_boxes: Vec<StashBoxInfo>,
    scrapers: Vec<ScraperInfo>,
    state: Mutex<FakeState>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stash_box(mut self, endpoint: &str) -> Self {
        self.stash_boxes.push(StashBoxInfo {
            endpoint: endpoint.to_string(),
            name: None,
        });
        self
    }

    pub fn with_scraper(mut self, id: &str) -> Self {
        self.scrapers.push(ScraperInfo {
            id: id.to_string(),
            name: id.to_string(),
            scene_scrapes: vec![ScrapeType::Name, ScrapeType::Fragment],
        });
        self
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }
}

fn remote_error(message: &str) -> TaggerError {
    TaggerError::RemoteError(vec![message.to_string()])
}

fn create_all<I>(
    state: &mut FakeState,
    prefix: &str,
    names: I,
) -> Vec<CreatedEntity>
where
    I: IntoIterator<Item = String>,
{
    names
        .into_iter()
        .map(|name| CreatedEntity {
            id: state.next_id(prefix),
            name,
        })
        .collect()
}

#[async_trait]
impl StashBackend for FakeBackend {
    async fn configured_stash_boxes(&self) -> Result<Vec<StashBoxInfo>> {
        Ok(self.stash_boxes.clone())
    }

    async fn list_scene_scrapers(&self) -> Result<Vec<ScraperInfo>> {
        Ok(self.scrapers.clone())
    }

    async fn scrape_scene_query(&self, _source: &SourceInput, query: &str) -> Result<Vec<ScrapedScene>> {
        let mut state = self.state();
        state.query_calls.push(query.to_string());
        Ok(state.query_results.get(query).cloned().unwrap_or_default())
    }

    async fn scrape_scene(&self, _source: &SourceInput, scene_id: &str) -> Result<Vec<ScrapedScene>> {
        let pause = self.state().yield_scrapes;
        if pause {
            tokio::task::yield_now().await;
        }
        let state = self.state();
        if state.failing_scenes.contains(scene_id) {
            return Err(remote_error("scrape failed"));
        }
        Ok(state.scene_results.get(scene_id).cloned().unwrap_or_default())
    }

    async fn scrape_scene_fragment(
        &self,
        _source: &SourceInput,
        _input: &SceneFragmentInput,
    ) -> Result<Vec<ScrapedScene>> {
        let state = self.state();
        if state.fail_fragment {
            return Err(remote_error("fragment scrape failed"));
        }
        Ok(state.fragment_results.clone())
    }

    async fn scrape_multi_scenes(&self, _endpoint: &str, scene_ids: &[String]) -> Result<Vec<Vec<ScrapedScene>>> {
        let mut state = self.state();
        state.multi_calls.push(scene_ids.to_vec());
        if state.fail_multi {
            return Err(remote_error("multi scrape failed"));
        }
        let mut lists: Vec<_> = scene_ids
            .iter()
            .map(|id| state.scene_results.get(id).cloned().unwrap_or_default())
            .collect();
        if state.short_multi {
            lists.pop();
        }
        Ok(lists)
    }

    async fn find_scenes_by_ids(&self, ids: &[String]) -> Result<Vec<StoredScene>> {
        let state = self.state();
        Ok(ids
            .iter()
            .filter_map(|id| state.stored_scenes.get(id).cloned())
            .collect())
    }

    async fn find_tag(&self, id: &str) -> Result<Option<StoredEntity>> {
        Ok(self.state().tags.get(id).cloned())
    }

    async fn find_performer(&self, id: &str) -> Result<Option<StoredEntity>> {
        Ok(self.state().performers.get(id).cloned())
    }

    async fn find_studio(&self, id: &str) -> Result<Option<StoredEntity>> {
        Ok(self.state().studios.get(id).cloned())
    }

    async fn create_tag(&self, input: &TagCreateInput) -> Result<String> {
        let mut state = self.state();
        state.created_tags.push(vec![input.clone()]);
        Ok(state.next_id("tag"))
    }

    async fn create_tags(&self, inputs: &[TagCreateInput]) -> Result<Vec<CreatedEntity>> {
        let mut state = self.state();
        state.created_tags.push(inputs.to_vec());
        Ok(create_all(&mut state, "tag", inputs.iter().map(|i| i.name.clone())))
    }

    async fn update_tag(&self, input: &TagUpdateInput) -> Result<String> {
        self.state().tag_updates.push(input.clone());
        Ok(input.id.clone())
    }

    async fn create_performer(&self, input: &PerformerCreateInput) -> Result<String> {
        let mut state = self.state();
        state.created_performers.push(vec![input.clone()]);
        Ok(state.next_id("perf"))
    }

    async fn create_performers(&self, inputs: &[PerformerCreateInput]) -> Result<Vec<CreatedEntity>> {
        let mut state = self.state();
        state.created_performers.push(inputs.to_vec());
        Ok(create_all(&mut state, "perf", inputs.iter().map(|i| i.name.clone())))
    }

    async fn update_performer(&self, input: &PerformerUpdateInput) -> Result<String> {
        self.state().performer_updates.push(input.clone());
        Ok(input.id.clone())
    }

    async fn create_studio(&self, input: &StudioCreateInput) -> Result<String> {
        let mut state = self.state();
        state.created_studios.push(vec![input.clone()]);
        Ok(state.next_id("studio"))
    }

    async fn create_studios(&self, inputs: &[StudioCreateInput]) -> Result<Vec<CreatedEntity>> {
        let mut state = self.state();
        state.created_studios.push(inputs.to_vec());
        Ok(create_all(&mut state, "studio", inputs.iter().map(|i| i.name.clone())))
    }

    async fn update_studio(&self, input: &StudioUpdateInput) -> Result<String> {
        self.state().studio_updates.push(input.clone());
        Ok(input.id.clone())
    }

    async fn update_scene(&self, input: &SceneUpdateInput) -> Result<String> {
        self.state().scene_updates.push(input.clone());
        Ok(input.id.clone())
    }

    async fn update_scenes(&self, inputs: &[SceneUpdateInput]) -> Result<Vec<String>> {
        let mut state = self.state();
        let ids: Vec<String> = inputs.iter().map(|i| i.id.clone()).collect();
        state.scene_update_batches.push(ids.clone());
        if ids.iter().any(|id| state.failing_saves.contains(id)) {
            return Err(remote_error("scene update failed"));
        }
        state.scene_updates.extend(inputs.iter().cloned());
        Ok(ids)
    }

    async fn batch_tag_performers(&self, input: &PerformerBatchTagInput) -> Result<()> {
        self.state().batch_tag_inputs.push(input.clone());
        Ok(())
    }

    async fn submit_fingerprints(&self, endpoint: &str, scene_ids: &[String]) -> Result<bool> {
        let mut state = self.state();
        state
            .submitted
            .push((endpoint.to_string(), scene_ids.to_vec()));
        Ok(!state.reject_fingerprints)
    }

    async fn fetch_image(&self, url: &str) -> Result<FetchedImage> {
        self.state()
            .images
            .get(url)
            .cloned()
            .ok_or_else(|| TaggerError::NetworkError(format!("HTTP 404 for {}", url)))
    }
}
