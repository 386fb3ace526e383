//! Scene update payloads
//!
//! Pure functions that pick the result to apply for each cached scene and
//! combine it with the scene's stored state.

use crate::tagger::settings::{SceneField, TagOperation, TaggerConfig};
use crate::tagger::types::{FetchedImage, QueryResult, SceneUpdateInput, ScrapedScene, StashId, StoredScene};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};

/// Scenes are saved in chunks of this size
pub const SAVE_CHUNK_SIZE: usize = 5;

/// Cover images at or above this size are dropped
pub const MAX_COVER_IMAGE_BYTES: usize = 5 * 1024 * 1024;

/// The result to apply for a cache entry: the first resolved result, else
/// the only result
pub fn select_target(result: &QueryResult) -> Option<&ScrapedScene> {
    let scenes = result.results()?;
    scenes
        .iter()
        .find(|s| s.is_resolved())
        .or_else(|| match scenes {
            [only] => Some(only),
            _ => None,
        })
}

/// Every cache entry with a target, in scene id order
pub fn collect_targets(results: &BTreeMap<String, QueryResult>) -> Vec<(String, ScrapedScene)> {
    results
        .iter()
        .filter_map(|(id, result)| select_target(result).map(|t| (id.clone(), t.clone())))
        .collect()
}

/// Order-preserving union, existing values first
pub fn union_ids(existing: &[String], incoming: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    existing
        .iter()
        .chain(incoming)
        .filter(|id| seen.insert(id.as_str()))
        .cloned()
        .collect()
}

/// Replace the entries of every endpoint present in `incoming`
pub fn merge_stash_ids(existing: &[StashId], incoming: &[StashId]) -> Vec<StashId> {
    existing
        .iter()
        .filter(|e| !incoming.iter().any(|i| i.endpoint == e.endpoint))
        .chain(incoming)
        .cloned()
        .collect()
}

/// Append stash ids not already present for the same endpoint and id
pub fn union_stash_ids(existing: &[StashId], incoming: &[StashId]) -> Vec<StashId> {
    let mut merged = existing.to_vec();
    for id in incoming {
        if !merged
            .iter()
            .any(|e| e.endpoint == id.endpoint && e.stash_id == id.stash_id)
        {
            merged.push(id.clone());
        }
    }
    merged
}

/// Encode a downloaded cover as a data URI, dropping empty or oversized
/// images
pub fn encode_cover_image(image: &FetchedImage) -> Option<String> {
    if image.bytes.is_empty() || image.bytes.len() >= MAX_COVER_IMAGE_BYTES {
        return None;
    }
    let content_type = image
        .content_type
        .as_deref()
        .filter(|c| !c.is_empty())
        .unwrap_or("image/jpeg");
    Some(format!(
        "data:{};base64,{}",
        content_type,
        STANDARD.encode(&image.bytes)
    ))
}

/// Per-save settings that shape the update payload
#[derive(Debug, Clone)]
pub struct ApplyOptions<'a> {
    pub config: &'a TaggerConfig,
    /// Stash-box endpoint of the current source, if any
    pub endpoint: Option<&'a str>,
    pub now: DateTime<Utc>,
}

fn pick(excluded: bool, scraped: Option<&String>, stored: &Option<String>) -> Option<String> {
    if excluded {
        return stored.clone();
    }
    scraped.cloned().or_else(|| stored.clone())
}

/// Build the update for one scene from its stored state and chosen result
pub fn build_scene_update(
    original: &StoredScene,
    target: &ScrapedScene,
    options: &ApplyOptions<'_>,
    cover_image: Option<String>,
) -> SceneUpdateInput {
    let config = options.config;
    let excluded = |field| config.is_excluded(field);

    let scraped_tag_ids: Vec<String> = target
        .tags
        .iter()
        .filter_map(|t| t.stored_id.clone())
        .collect();
    let tag_ids = match config.tag_operation {
        TagOperation::Overwrite => union_ids(&[], &scraped_tag_ids),
        TagOperation::Merge => union_ids(&original.tag_ids, &scraped_tag_ids),
    };

    let scraped_performer_ids: Vec<String> = target
        .performers
        .iter()
        .filter_map(|p| p.stored_id.clone())
        .collect();
    let performer_ids = union_ids(&original.performer_ids, &scraped_performer_ids);

    let stash_ids = match (options.endpoint, target.remote_site_id.as_deref()) {
        (Some(endpoint), Some(remote)) if !remote.is_empty() => merge_stash_ids(
            &original.stash_ids,
            &[StashId {
                endpoint: endpoint.to_string(),
                stash_id: remote.to_string(),
                updated_at: Some(options.now),
            }],
        ),
        _ => original.stash_ids.clone(),
    };

    SceneUpdateInput {
        id: original.id.clone(),
        title: pick(excluded(SceneField::Title), target.title.as_ref(), &original.title),
        details: pick(excluded(SceneField::Details), target.details.as_ref(), &original.details),
        date: pick(excluded(SceneField::Date), target.date.as_ref(), &original.date),
        url: pick(
            excluded(SceneField::Url),
            target.urls.first(),
            &original.urls.first().cloned(),
        ),
        code: pick(excluded(SceneField::Code), target.code.as_ref(), &original.code),
        director: pick(excluded(SceneField::Director), target.director.as_ref(), &original.director),
        studio_id: pick(
            excluded(SceneField::Studio),
            target.studio.as_ref().and_then(|s| s.stored_id.as_ref()),
            &original.studio_id,
        ),
        tag_ids,
        performer_ids,
        stash_ids,
        cover_image: if excluded(SceneField::CoverImage) {
            None
        } else {
            cover_image
        },
        organized: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tagger::types::{Resolution, ScrapedPerformer, ScrapedStudio, ScrapedTag};
    use proptest::prelude::*;

    const ENDPOINT: &str = "https://stashdb.org/graphql";

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    fn stored_tag(id: &str) -> ScrapedTag {
        ScrapedTag {
            name: format!("tag {}", id),
            remote_site_id: None,
            stored_id: Some(id.to_string()),
        }
    }

    fn original() -> StoredScene {
        StoredScene {
            id: "scene-1".to_string(),
            title: Some("Old title".to_string()),
            details: Some("Old details".to_string()),
            urls: strings(&["https://old.example"]),
            studio_id: Some("s-old".to_string()),
            tag_ids: strings(&["A", "B"]),
            performer_ids: strings(&["p1"]),
            stash_ids: vec![
                StashId::new(ENDPOINT, "stale"),
                StashId::new("https://other.example", "keep"),
            ],
            ..Default::default()
        }
    }

    fn target() -> ScrapedScene {
        ScrapedScene {
            title: Some("New title".to_string()),
            urls: strings(&["https://new.example", "https://mirror.example"]),
            remote_site_id: Some("remote-1".to_string()),
            studio: Some(ScrapedStudio {
                name: "Studio".to_string(),
                stored_id: Some("s-new".to_string()),
                ..Default::default()
            }),
            tags: vec![stored_tag("B"), stored_tag("C"), ScrapedTag::default()],
            performers: vec![ScrapedPerformer {
                name: "Jane".to_string(),
                stored_id: Some("p2".to_string()),
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    fn options(config: &TaggerConfig) -> ApplyOptions<'_> {
        ApplyOptions {
            config,
            endpoint: Some(ENDPOINT),
            now: Utc::now(),
        }
    }

    #[test]
    fn test_select_target() {
        let unresolved = ScrapedScene::default();
        let resolved = ScrapedScene {
            title: Some("resolved".to_string()),
            ..Default::default()
        }
        .with_resolution(Resolution::Resolved);

        let many = QueryResult::Results(vec![unresolved.clone(), resolved.clone()]);
        assert_eq!(select_target(&many), Some(&resolved));

        let ambiguous = QueryResult::Results(vec![unresolved.clone(), unresolved.clone()]);
        assert_eq!(select_target(&ambiguous), None);

        let single = QueryResult::Results(vec![unresolved.clone()]);
        assert_eq!(select_target(&single), Some(&unresolved));

        assert_eq!(select_target(&QueryResult::Results(vec![])), None);
        assert_eq!(select_target(&QueryResult::Error("x".to_string())), None);
    }

    #[test]
    fn test_merge_and_overwrite_tag_policies() {
        let mut config = TaggerConfig::default();
        let merged = build_scene_update(&original(), &target(), &options(&config), None);
        assert_eq!(merged.tag_ids, strings(&["A", "B", "C"]));

        config.tag_operation = TagOperation::Overwrite;
        let overwritten = build_scene_update(&original(), &target(), &options(&config), None);
        assert_eq!(overwritten.tag_ids, strings(&["B", "C"]));
    }

    #[test]
    fn test_scalars_and_relations() {
        let config = TaggerConfig::default();
        let update = build_scene_update(&original(), &target(), &options(&config), None);

        assert_eq!(update.id, "scene-1");
        assert_eq!(update.title.as_deref(), Some("New title"));
        assert_eq!(update.details.as_deref(), Some("Old details"));
        assert_eq!(update.url.as_deref(), Some("https://new.example"));
        assert_eq!(update.studio_id.as_deref(), Some("s-new"));
        assert_eq!(update.performer_ids, strings(&["p1", "p2"]));
        assert_eq!(update.organized, None);
    }

    #[test]
    fn test_stash_ids_replace_current_endpoint_only() {
        let config = TaggerConfig::default();
        let update = build_scene_update(&original(), &target(), &options(&config), None);

        let ids: Vec<(&str, &str)> = update
            .stash_ids
            .iter()
            .map(|s| (s.endpoint.as_str(), s.stash_id.as_str()))
            .collect();
        assert_eq!(
            ids,
            vec![("https://other.example", "keep"), (ENDPOINT, "remote-1")]
        );

        let scraper_source = ApplyOptions {
            endpoint: None,
            ..options(&config)
        };
        let untouched = build_scene_update(&original(), &target(), &scraper_source, None);
        assert_eq!(untouched.stash_ids, original().stash_ids);
    }

    #[test]
    fn test_excluded_fields_keep_stored_values() {
        let mut config = TaggerConfig::default();
        config.excluded_scene_fields.insert(SceneField::Title);
        config.excluded_scene_fields.insert(SceneField::Studio);
        config.excluded_scene_fields.insert(SceneField::CoverImage);

        let update = build_scene_update(
            &original(),
            &target(),
            &options(&config),
            Some("data:image/png;base64,AA==".to_string()),
        );
        assert_eq!(update.title.as_deref(), Some("Old title"));
        assert_eq!(update.studio_id.as_deref(), Some("s-old"));
        assert_eq!(update.cover_image, None);
    }

    #[test]
    fn test_encode_cover_image() {
        let image = FetchedImage {
            content_type: Some("image/png".to_string()),
            bytes: vec![1, 2, 3],
        };
        assert_eq!(
            encode_cover_image(&image).as_deref(),
            Some("data:image/png;base64,AQID")
        );

        let empty = FetchedImage {
            content_type: None,
            bytes: vec![],
        };
        assert_eq!(encode_cover_image(&empty), None);

        let huge = FetchedImage {
            content_type: None,
            bytes: vec![0; MAX_COVER_IMAGE_BYTES],
        };
        assert_eq!(encode_cover_image(&huge), None);
    }

    #[test]
    fn test_union_stash_ids_dedups_on_endpoint_and_id() {
        let existing = vec![StashId::new(ENDPOINT, "a")];
        let incoming = vec![StashId::new(ENDPOINT, "a"), StashId::new(ENDPOINT, "b")];
        assert_eq!(
            union_stash_ids(&existing, &incoming),
            vec![StashId::new(ENDPOINT, "a"), StashId::new(ENDPOINT, "b")]
        );
        assert_eq!(
            merge_stash_ids(&existing, &[StashId::new(ENDPOINT, "b")]),
            vec![StashId::new(ENDPOINT, "b")]
        );
    }

    proptest! {
        #[test]
        fn prop_union_keeps_existing_prefix_without_duplicates(
            existing in proptest::collection::vec("[a-e]", 0..8),
            incoming in proptest::collection::vec("[a-e]", 0..8),
        ) {
            let merged = union_ids(&existing, &incoming);

            let unique: HashSet<&String> = merged.iter().collect();
            prop_assert_eq!(unique.len(), merged.len());

            for id in existing.iter().chain(&incoming) {
                prop_assert!(merged.contains(id));
            }

            let mut deduped_existing = Vec::new();
            for id in &existing {
                if !deduped_existing.contains(id) {
                    deduped_existing.push(id.clone());
                }
            }
            prop_assert_eq!(&merged[..deduped_existing.len()], &deduped_existing[..]);
        }
    }
}
