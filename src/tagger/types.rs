//! Tagger data model
//!
//! Scraped payloads, query results, scrape sources and the inputs sent back
//! to the local media server.

use crate::core::error::TaggerError;
use crate::tagger::gender::Gender;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Prefix of source ids backed by a stash-box endpoint
pub const STASH_BOX_PREFIX: &str = "stashbox:";

/// Prefix of source ids backed by a local scraper plugin
pub const SCRAPER_PREFIX: &str = "scraper:";

/// Treat an explicit `null` the same as a missing field
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Where a source sends its scrape requests
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceInput {
    StashBox { endpoint: String },
    Scraper { scraper_id: String },
}

impl SourceInput {
    pub fn stash_box_endpoint(&self) -> Option<&str> {
        match self {
            SourceInput::StashBox { endpoint } => Some(endpoint),
            SourceInput::Scraper { .. } => None,
        }
    }
}

/// A scrape provider the user can select
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub id: String,
    pub source_input: SourceInput,
    pub display_name: String,
    pub supports_query: bool,
    pub supports_fragment: bool,
}

impl Source {
    pub fn stash_box_endpoint(&self) -> Option<&str> {
        self.source_input.stash_box_endpoint()
    }

    pub fn is_stash_box(&self) -> bool {
        self.stash_box_endpoint().is_some()
    }
}

/// A stash-box endpoint configured on the local server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StashBoxInfo {
    pub endpoint: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScrapeType {
    Name,
    Fragment,
    Url,
}

/// A scraper plugin registered on the local server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScraperInfo {
    pub id: String,
    pub name: String,
    /// Scrape types supported for scenes; empty when the scraper has no
    /// scene support
    #[serde(default)]
    pub scene_scrapes: Vec<ScrapeType>,
}

/// Identity of a local entity on a remote stash-box
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StashId {
    pub endpoint: String,
    pub stash_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl StashId {
    pub fn new(endpoint: impl Into<String>, stash_id: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            stash_id: stash_id.into(),
            updated_at: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapedTag {
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default)]
    pub remote_site_id: Option<String>,
    #[serde(default)]
    pub stored_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapedPerformer {
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default)]
    pub remote_site_id: Option<String>,
    #[serde(default)]
    pub stored_id: Option<String>,
    #[serde(default)]
    pub disambiguation: Option<String>,
    /// Free-form gender string as returned by the scraper
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub birthdate: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub urls: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub images: Vec<String>,
}

impl ScrapedPerformer {
    pub fn image(&self) -> Option<&str> {
        self.images.first().map(String::as_str)
    }

    /// The scraped gender parsed leniently
    pub fn parsed_gender(&self) -> Option<Gender> {
        self.gender.as_deref().and_then(Gender::parse)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapedStudio {
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default)]
    pub remote_site_id: Option<String>,
    #[serde(default)]
    pub stored_id: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub parent: Option<Box<ScrapedStudio>>,
}

/// Whether a scraped scene has gone through fragment-level enrichment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resolution {
    #[default]
    Unresolved,
    Resolved,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapedScene {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default)]
    pub director: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub urls: Vec<String>,
    #[serde(default)]
    pub date: Option<String>,
    /// Cover image URL
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub remote_site_id: Option<String>,
    #[serde(default)]
    pub duration: Option<i64>,
    #[serde(default)]
    pub studio: Option<ScrapedStudio>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: Vec<ScrapedTag>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub performers: Vec<ScrapedPerformer>,
    #[serde(skip)]
    pub resolution: Resolution,
}

impl ScrapedScene {
    pub fn is_resolved(&self) -> bool {
        self.resolution == Resolution::Resolved
    }

    pub fn with_resolution(mut self, resolution: Resolution) -> Self {
        self.resolution = resolution;
        self
    }
}

/// Cached outcome of a query for one local scene
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryResult {
    Results(Vec<ScrapedScene>),
    Error(String),
}

impl QueryResult {
    /// Convert a scrape outcome into a cache entry, marking every returned
    /// scene with the given resolution
    pub fn from_scrape(
        outcome: std::result::Result<Vec<ScrapedScene>, TaggerError>,
        resolution: Resolution,
    ) -> Self {
        match outcome {
            Ok(scenes) => QueryResult::Results(
                scenes
                    .into_iter()
                    .map(|s| s.with_resolution(resolution))
                    .collect(),
            ),
            Err(e) => QueryResult::Error(e.to_string()),
        }
    }

    pub fn results(&self) -> Option<&[ScrapedScene]> {
        match self {
            QueryResult::Results(scenes) => Some(scenes),
            QueryResult::Error(_) => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            QueryResult::Results(_) => None,
            QueryResult::Error(e) => Some(e),
        }
    }
}

/// Fields of a scraped scene used to re-scrape it in full
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneFragmentInput {
    pub title: Option<String>,
    pub date: Option<String>,
    pub details: Option<String>,
    pub urls: Vec<String>,
    pub remote_site_id: Option<String>,
}

impl From<&ScrapedScene> for SceneFragmentInput {
    fn from(scene: &ScrapedScene) -> Self {
        Self {
            title: scene.title.clone(),
            date: scene.date.clone(),
            details: scene.details.clone(),
            urls: scene.urls.clone(),
            remote_site_id: scene.remote_site_id.clone(),
        }
    }
}

/// A scene as currently stored on the local server
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredScene {
    pub id: String,
    pub title: Option<String>,
    pub details: Option<String>,
    pub date: Option<String>,
    pub urls: Vec<String>,
    pub code: Option<String>,
    pub director: Option<String>,
    pub studio_id: Option<String>,
    pub studio_name: Option<String>,
    pub tag_ids: Vec<String>,
    pub performer_ids: Vec<String>,
    pub performer_names: Vec<String>,
    pub stash_ids: Vec<StashId>,
    /// Path of the primary file, empty when the scene has no files
    pub path: String,
}

/// A local tag, performer or studio with its remote identities
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEntity {
    pub id: String,
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub stash_ids: Vec<StashId>,
}

/// Id and name of an entity returned by a create call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedEntity {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagCreateInput {
    pub name: String,
    pub stash_ids: Vec<StashId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagUpdateInput {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stash_ids: Option<Vec<StashId>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerformerCreateInput {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disambiguation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<Gender>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub urls: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub birthdate: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub stash_ids: Vec<StashId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerformerUpdateInput {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stash_ids: Option<Vec<StashId>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudioCreateInput {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub stash_ids: Vec<StashId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudioUpdateInput {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stash_ids: Option<Vec<StashId>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneUpdateInput {
    pub id: String,
    pub title: Option<String>,
    pub details: Option<String>,
    pub date: Option<String>,
    pub url: Option<String>,
    pub code: Option<String>,
    pub director: Option<String>,
    pub studio_id: Option<String>,
    pub tag_ids: Vec<String>,
    pub performer_ids: Vec<String>,
    pub stash_ids: Vec<StashId>,
    /// Base64 data URI of the new cover image
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organized: Option<bool>,
}

/// Request to refresh newly created performers from a stash-box
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerformerBatchTagInput {
    /// Index of the endpoint in the server's stash-box list
    pub endpoint: usize,
    pub performer_ids: Vec<String>,
    pub refresh: bool,
    pub exclude_fields: Vec<String>,
    pub create_parent: bool,
}

/// Raw bytes of a downloaded image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedImage {
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scraped_scene_accepts_null_lists() {
        let json = r#"{
            "title": "Sunset",
            "urls": null,
            "tags": [{"name": "Outdoor", "stored_id": null}],
            "performers": null,
            "studio": {"name": "Studio A", "parent": {"name": "Network"}}
        }"#;
        let scene: ScrapedScene = serde_json::from_str(json).unwrap();

        assert_eq!(scene.title.as_deref(), Some("Sunset"));
        assert!(scene.urls.is_empty());
        assert!(scene.performers.is_empty());
        assert_eq!(scene.tags[0].name, "Outdoor");
        assert_eq!(
            scene.studio.unwrap().parent.unwrap().name,
            "Network".to_string()
        );
        assert_eq!(scene.resolution, Resolution::Unresolved);
    }

    #[test]
    fn test_query_result_from_scrape() {
        let ok = QueryResult::from_scrape(Ok(vec![ScrapedScene::default()]), Resolution::Resolved);
        assert!(ok.results().unwrap()[0].is_resolved());

        let err = QueryResult::from_scrape(
            Err(TaggerError::RemoteError(vec!["a".into(), "b".into()])),
            Resolution::Resolved,
        );
        assert_eq!(err.error(), Some("a, b"));
        assert!(err.results().is_none());
    }
}
