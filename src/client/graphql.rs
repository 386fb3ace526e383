//! GraphQL client for the local media server
//!
//! Every request goes to a single endpoint. The top-level field of each
//! operation is aliased to `result` so one response envelope serves all of
//! them.

use crate::core::config::StashConfig;
use crate::core::error::{Result, TaggerError};
use crate::tagger::backend::StashBackend;
use crate::tagger::types::{
    null_as_default, CreatedEntity, FetchedImage, PerformerBatchTagInput, PerformerCreateInput,
    PerformerUpdateInput, SceneFragmentInput, SceneUpdateInput, ScrapeType, ScrapedScene,
    ScraperInfo, SourceInput, StashBoxInfo, StashId, StoredEntity, StoredScene,
    StudioCreateInput, StudioUpdateInput, TagCreateInput, TagUpdateInput,
};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

const API_KEY_HEADER: &str = "ApiKey";

macro_rules! scraped_scene_fields {
    () => {
        "title code details director urls date image remote_site_id duration
        studio { stored_id name url image remote_site_id
            parent { stored_id name url image remote_site_id } }
        tags { stored_id name remote_site_id }
        performers { stored_id name disambiguation gender urls birthdate country images remote_site_id }"
    };
}

const CONFIGURED_STASH_BOXES: &str =
    "query { result: configuration { general { stashBoxes { endpoint name } } } }";

const LIST_SCENE_SCRAPERS: &str =
    "query { result: listScrapers(types: [SCENE]) { id name scene { supported_scrapes } } }";

const SCRAPE_SINGLE_SCENE: &str = concat!(
    "query ScrapeSingleScene($source: ScraperSourceInput!, $input: ScrapeSingleSceneInput!) {
        result: scrapeSingleScene(source: $source, input: $input) { ",
    scraped_scene_fields!(),
    " } }"
);

const SCRAPE_MULTI_SCENES: &str = concat!(
    "query ScrapeMultiScenes($source: ScraperSourceInput!, $input: ScrapeMultiScenesInput!) {
        result: scrapeMultiScenes(source: $source, input: $input) { ",
    scraped_scene_fields!(),
    " } }"
);

const FIND_SCENES: &str = "query FindScenes($ids: [ID!]) {
    result: findScenes(ids: $ids, filter: { per_page: -1 }) {
        scenes {
            id title details date urls code director
            studio { id name }
            tags { id }
            performers { id name }
            stash_ids { endpoint stash_id updated_at }
            files { path }
        }
    }
}";

const FIND_TAG: &str =
    "query FindTag($id: ID!) { result: findTag(id: $id) { id name stash_ids { endpoint stash_id updated_at } } }";

const FIND_PERFORMER: &str =
    "query FindPerformer($id: ID!) { result: findPerformer(id: $id) { id name stash_ids { endpoint stash_id updated_at } } }";

const FIND_STUDIO: &str =
    "query FindStudio($id: ID!) { result: findStudio(id: $id) { id name stash_ids { endpoint stash_id updated_at } } }";

const TAG_CREATE: &str =
    "mutation TagCreate($input: TagCreateInput!) { result: tagCreate(input: $input) { id name } }";

const TAGS_CREATE: &str =
    "mutation TagsCreate($input: [TagCreateInput!]!) { result: tagsCreate(input: $input) { id name } }";

const TAG_UPDATE: &str =
    "mutation TagUpdate($input: TagUpdateInput!) { result: tagUpdate(input: $input) { id name } }";

const PERFORMER_CREATE: &str = "mutation PerformerCreate($input: PerformerCreateInput!) {
    result: performerCreate(input: $input) { id name } }";

const PERFORMERS_CREATE: &str = "mutation PerformersCreate($input: [PerformerCreateInput!]!) {
    result: performersCreate(input: $input) { id name } }";

const PERFORMER_UPDATE: &str = "mutation PerformerUpdate($input: PerformerUpdateInput!) {
    result: performerUpdate(input: $input) { id name } }";

const STUDIO_CREATE: &str =
    "mutation StudioCreate($input: StudioCreateInput!) { result: studioCreate(input: $input) { id name } }";

const STUDIOS_CREATE: &str = "mutation StudiosCreate($input: [StudioCreateInput!]!) {
    result: studiosCreate(input: $input) { id name } }";

const STUDIO_UPDATE: &str =
    "mutation StudioUpdate($input: StudioUpdateInput!) { result: studioUpdate(input: $input) { id name } }";

const SCENE_UPDATE: &str =
    "mutation SceneUpdate($input: SceneUpdateInput!) { result: sceneUpdate(input: $input) { id } }";

const SCENES_UPDATE: &str =
    "mutation ScenesUpdate($input: [SceneUpdateInput!]!) { result: scenesUpdate(input: $input) { id } }";

const BATCH_PERFORMER_TAG: &str = "mutation StashBoxBatchPerformerTag($input: StashBoxBatchTagInput!) {
    result: stashBoxBatchPerformerTag(input: $input) }";

const SUBMIT_FINGERPRINTS: &str = "mutation SubmitStashBoxFingerprints($input: StashBoxFingerprintSubmissionInput!) {
    result: submitStashBoxFingerprints(input: $input) }";

#[derive(Debug, Serialize)]
struct GraphqlRequest<'a, V> {
    query: &'a str,
    variables: V,
}

#[derive(Debug, Deserialize)]
struct GraphqlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct GraphqlResponse<T> {
    data: Option<T>,
    #[serde(default, deserialize_with = "null_as_default")]
    errors: Vec<GraphqlError>,
}

impl<T> GraphqlResponse<T> {
    /// Any reported error wins over partial data
    fn into_data(self) -> Result<T> {
        if !self.errors.is_empty() {
            return Err(TaggerError::RemoteError(
                self.errors.into_iter().map(|e| e.message).collect(),
            ));
        }
        self.data
            .ok_or_else(|| TaggerError::InvalidResponse("response carried no data".to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct Aliased<T> {
    result: T,
}

#[derive(Debug, Deserialize)]
struct WireConfiguration {
    general: WireGeneral,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireGeneral {
    #[serde(default, deserialize_with = "null_as_default")]
    stash_boxes: Vec<StashBoxInfo>,
}

#[derive(Debug, Deserialize)]
struct WireScraper {
    id: String,
    name: String,
    #[serde(default)]
    scene: Option<WireScraperSpec>,
}

#[derive(Debug, Deserialize)]
struct WireScraperSpec {
    #[serde(default, deserialize_with = "null_as_default")]
    supported_scrapes: Vec<ScrapeType>,
}

impl From<WireScraper> for ScraperInfo {
    fn from(wire: WireScraper) -> Self {
        Self {
            id: wire.id,
            name: wire.name,
            scene_scrapes: wire.scene.map(|s| s.supported_scrapes).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireSceneList {
    #[serde(default, deserialize_with = "null_as_default")]
    scenes: Vec<WireScene>,
}

#[derive(Debug, Deserialize)]
struct WireRef {
    id: String,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireFile {
    path: String,
}

#[derive(Debug, Deserialize)]
struct WireScene {
    id: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    details: Option<String>,
    #[serde(default)]
    date: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    urls: Vec<String>,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    director: Option<String>,
    #[serde(default)]
    studio: Option<WireRef>,
    #[serde(default, deserialize_with = "null_as_default")]
    tags: Vec<WireRef>,
    #[serde(default, deserialize_with = "null_as_default")]
    performers: Vec<WireRef>,
    #[serde(default, deserialize_with = "null_as_default")]
    stash_ids: Vec<StashId>,
    #[serde(default, deserialize_with = "null_as_default")]
    files: Vec<WireFile>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

impl From<WireScene> for StoredScene {
    fn from(wire: WireScene) -> Self {
        Self {
            id: wire.id,
            title: non_empty(wire.title),
            details: non_empty(wire.details),
            date: non_empty(wire.date),
            urls: wire.urls,
            code: non_empty(wire.code),
            director: non_empty(wire.director),
            studio_id: wire.studio.as_ref().map(|s| s.id.clone()),
            studio_name: wire.studio.and_then(|s| s.name),
            tag_ids: wire.tags.into_iter().map(|t| t.id).collect(),
            performer_ids: wire.performers.iter().map(|p| p.id.clone()).collect(),
            performer_names: wire.performers.into_iter().filter_map(|p| p.name).collect(),
            stash_ids: wire.stash_ids,
            path: wire.files.into_iter().next().map(|f| f.path).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireId {
    id: String,
}

/// Scraper source selector as the server expects it
fn source_json(source: &SourceInput) -> Value {
    match source {
        SourceInput::StashBox { endpoint } => json!({ "stash_box_endpoint": endpoint }),
        SourceInput::Scraper { scraper_id } => json!({ "scraper_id": scraper_id }),
    }
}

fn batch_tag_json(input: &PerformerBatchTagInput) -> Value {
    json!({
        "endpoint": input.endpoint,
        "ids": input.performer_ids,
        "refresh": input.refresh,
        "exclude_fields": input.exclude_fields,
        "createParent": input.create_parent,
    })
}

/// Client for the media server's GraphQL API
#[derive(Clone)]
pub struct GraphqlClient {
    client: Client,
    /// Client for cover downloads; carries no credentials
    images: Client,
    endpoint: Url,
}

impl GraphqlClient {
    pub fn new(config: &StashConfig) -> Result<Self> {
        let endpoint = Url::parse(&config.url)
            .map_err(|e| TaggerError::ConfigError(format!("Invalid stash url: {}", e)))?;

        let mut headers = HeaderMap::new();
        if let Some(api_key) = config.api_key() {
            let value = HeaderValue::from_str(api_key)
                .map_err(|e| TaggerError::ConfigError(format!("Invalid API key: {}", e)))?;
            headers.insert(API_KEY_HEADER, value);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout))
            .default_headers(headers)
            .build()
            .map_err(|e| TaggerError::InitializationError(format!("HTTP client: {}", e)))?;

        // Cover urls come from scraped payloads and may point at any host
        let images = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout))
            .build()
            .map_err(|e| TaggerError::InitializationError(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            images,
            endpoint,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn execute<V, R>(&self, query: &str, variables: V) -> Result<R>
    where
        V: Serialize + Send,
        R: DeserializeOwned,
    {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&GraphqlRequest { query, variables })
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            // Validation failures still come back as a GraphQL error list
            if let Ok(envelope) = serde_json::from_str::<GraphqlResponse<Value>>(&body) {
                if !envelope.errors.is_empty() {
                    return Err(TaggerError::RemoteError(
                        envelope.errors.into_iter().map(|e| e.message).collect(),
                    ));
                }
            }
            warn!(status = %status, "GraphQL request failed");
            return Err(TaggerError::NetworkError(format!("HTTP {}: {}", status, body)));
        }

        let envelope: GraphqlResponse<Aliased<R>> = serde_json::from_str(&body)?;
        envelope.into_data().map(|d| d.result)
    }
}

#[async_trait]
impl StashBackend for GraphqlClient {
    async fn configured_stash_boxes(&self) -> Result<Vec<StashBoxInfo>> {
        let configuration: WireConfiguration = self.execute(CONFIGURED_STASH_BOXES, json!({})).await?;
        Ok(configuration.general.stash_boxes)
    }

    async fn list_scene_scrapers(&self) -> Result<Vec<ScraperInfo>> {
        let scrapers: Vec<WireScraper> = self.execute(LIST_SCENE_SCRAPERS, json!({})).await?;
        Ok(scrapers.into_iter().map(ScraperInfo::from).collect())
    }

    async fn scrape_scene_query(&self, source: &SourceInput, query: &str) -> Result<Vec<ScrapedScene>> {
        debug!(query = %query, "Scraping scene by query");
        self.execute(
            SCRAPE_SINGLE_SCENE,
            json!({ "source": source_json(source), "input": { "query": query } }),
        )
        .await
    }

    async fn scrape_scene(&self, source: &SourceInput, scene_id: &str) -> Result<Vec<ScrapedScene>> {
        self.execute(
            SCRAPE_SINGLE_SCENE,
            json!({ "source": source_json(source), "input": { "scene_id": scene_id } }),
        )
        .await
    }

    async fn scrape_scene_fragment(
        &self,
        source: &SourceInput,
        input: &SceneFragmentInput,
    ) -> Result<Vec<ScrapedScene>> {
        self.execute(
            SCRAPE_SINGLE_SCENE,
            json!({ "source": source_json(source), "input": { "scene_input": input } }),
        )
        .await
    }

    async fn scrape_multi_scenes(&self, endpoint: &str, scene_ids: &[String]) -> Result<Vec<Vec<ScrapedScene>>> {
        self.execute(
            SCRAPE_MULTI_SCENES,
            json!({
                "source": { "stash_box_endpoint": endpoint },
                "input": { "scene_ids": scene_ids },
            }),
        )
        .await
    }

    async fn find_scenes_by_ids(&self, ids: &[String]) -> Result<Vec<StoredScene>> {
        let list: WireSceneList = self.execute(FIND_SCENES, json!({ "ids": ids })).await?;
        Ok(list.scenes.into_iter().map(StoredScene::from).collect())
    }

    async fn find_tag(&self, id: &str) -> Result<Option<StoredEntity>> {
        self.execute(FIND_TAG, json!({ "id": id })).await
    }

    async fn find_performer(&self, id: &str) -> Result<Option<StoredEntity>> {
        self.execute(FIND_PERFORMER, json!({ "id": id })).await
    }

    async fn find_studio(&self, id: &str) -> Result<Option<StoredEntity>> {
        self.execute(FIND_STUDIO, json!({ "id": id })).await
    }

    async fn create_tag(&self, input: &TagCreateInput) -> Result<String> {
        let created: CreatedEntity = self.execute(TAG_CREATE, json!({ "input": input })).await?;
        Ok(created.id)
    }

    async fn create_tags(&self, inputs: &[TagCreateInput]) -> Result<Vec<CreatedEntity>> {
        self.execute(TAGS_CREATE, json!({ "input": inputs })).await
    }

    async fn update_tag(&self, input: &TagUpdateInput) -> Result<String> {
        let updated: CreatedEntity = self.execute(TAG_UPDATE, json!({ "input": input })).await?;
        Ok(updated.id)
    }

    async fn create_performer(&self, input: &PerformerCreateInput) -> Result<String> {
        let created: CreatedEntity = self
            .execute(PERFORMER_CREATE, json!({ "input": input }))
            .await?;
        Ok(created.id)
    }

    async fn create_performers(&self, inputs: &[PerformerCreateInput]) -> Result<Vec<CreatedEntity>> {
        self.execute(PERFORMERS_CREATE, json!({ "input": inputs })).await
    }

    async fn update_performer(&self, input: &PerformerUpdateInput) -> Result<String> {
        let updated: CreatedEntity = self
            .execute(PERFORMER_UPDATE, json!({ "input": input }))
            .await?;
        Ok(updated.id)
    }

    async fn create_studio(&self, input: &StudioCreateInput) -> Result<String> {
        let created: CreatedEntity = self.execute(STUDIO_CREATE, json!({ "input": input })).await?;
        Ok(created.id)
    }

    async fn create_studios(&self, inputs: &[StudioCreateInput]) -> Result<Vec<CreatedEntity>> {
        self.execute(STUDIOS_CREATE, json!({ "input": inputs })).await
    }

    async fn update_studio(&self, input: &StudioUpdateInput) -> Result<String> {
        let updated: CreatedEntity = self.execute(STUDIO_UPDATE, json!({ "input": input })).await?;
        Ok(updated.id)
    }

    async fn update_scene(&self, input: &SceneUpdateInput) -> Result<String> {
        let updated: WireId = self.execute(SCENE_UPDATE, json!({ "input": input })).await?;
        Ok(updated.id)
    }

    async fn update_scenes(&self, inputs: &[SceneUpdateInput]) -> Result<Vec<String>> {
        let updated: Vec<Option<WireId>> = self.execute(SCENES_UPDATE, json!({ "input": inputs })).await?;
        Ok(updated.into_iter().flatten().map(|s| s.id).collect())
    }

    async fn batch_tag_performers(&self, input: &PerformerBatchTagInput) -> Result<()> {
        let job_id: Value = self
            .execute(BATCH_PERFORMER_TAG, json!({ "input": batch_tag_json(input) }))
            .await?;
        debug!(job_id = %job_id, "Started performer batch tag job");
        Ok(())
    }

    async fn submit_fingerprints(&self, endpoint: &str, scene_ids: &[String]) -> Result<bool> {
        self.execute(
            SUBMIT_FINGERPRINTS,
            json!({ "input": { "stash_box_endpoint": endpoint, "scene_ids": scene_ids } }),
        )
        .await
    }

    async fn fetch_image(&self, url: &str) -> Result<FetchedImage> {
        let response = self.images.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TaggerError::NetworkError(format!("HTTP {} for {}", status, url)));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response.bytes().await?;

        Ok(FetchedImage {
            content_type,
            bytes: bytes.to_vec(),
        })
    }
}
