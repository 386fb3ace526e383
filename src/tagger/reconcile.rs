//! Entity reconciliation
//!
//! Collects the scraped tags, performers and studios that have no stored
//! counterpart yet, folds duplicates by name into one create input each, and
//! writes created ids back into scraped scenes.
//!
//! Pending counts and mass creation share the same collection functions, so
//! a count always equals the number of inputs a create call would send.

use crate::tagger::gender::Gender;
use crate::tagger::types::{
    CreatedEntity, PerformerCreateInput, QueryResult, ScrapedPerformer, ScrapedScene,
    ScrapedStudio, ScrapedTag, StashId, StudioCreateInput, TagCreateInput,
};
use std::collections::{BTreeMap, HashMap};
use tracing::warn;

/// A create input that can absorb a duplicate with the same name
pub trait PendingEntity {
    const KIND: &'static str;

    fn name(&self) -> &str;

    fn stash_ids_mut(&mut self) -> &mut Vec<StashId>;

    /// Copy optional fields from `incoming` that are still unset here
    fn fill_gaps(&mut self, incoming: Self);
}

impl PendingEntity for TagCreateInput {
    const KIND: &'static str = "tag";

    fn name(&self) -> &str {
        &self.name
    }

    fn stash_ids_mut(&mut self) -> &mut Vec<StashId> {
        &mut self.stash_ids
    }

    fn fill_gaps(&mut self, _incoming: Self) {}
}

impl PendingEntity for PerformerCreateInput {
    const KIND: &'static str = "performer";

    fn name(&self) -> &str {
        &self.name
    }

    fn stash_ids_mut(&mut self) -> &mut Vec<StashId> {
        &mut self.stash_ids
    }

    fn fill_gaps(&mut self, incoming: Self) {
        self.disambiguation = self.disambiguation.take().or(incoming.disambiguation);
        self.gender = self.gender.or(incoming.gender);
        self.birthdate = self.birthdate.take().or(incoming.birthdate);
        self.country = self.country.take().or(incoming.country);
        self.image = self.image.take().or(incoming.image);
        if self.urls.is_empty() {
            self.urls = incoming.urls;
        }
    }
}

impl PendingEntity for StudioCreateInput {
    const KIND: &'static str = "studio";

    fn name(&self) -> &str {
        &self.name
    }

    fn stash_ids_mut(&mut self) -> &mut Vec<StashId> {
        &mut self.stash_ids
    }

    fn fill_gaps(&mut self, incoming: Self) {
        self.url = self.url.take().or(incoming.url);
        self.image = self.image.take().or(incoming.image);
        self.parent_id = self.parent_id.take().or(incoming.parent_id);
    }
}

/// Fold a duplicate into the first-seen entity with the same name
///
/// Optional fields keep their first value. Remote identities are unioned by
/// stash id; two distinct remote ids under one name are kept together and
/// reported, since the name stays the identity of the created entity.
pub fn merge<T: PendingEntity>(existing: &mut T, mut incoming: T) {
    let incoming_ids = std::mem::take(incoming.stash_ids_mut());
    let name = existing.name().to_string();
    let ids = existing.stash_ids_mut();
    for id in incoming_ids {
        if ids.iter().any(|e| e.stash_id == id.stash_id) {
            continue;
        }
        if !ids.is_empty() {
            warn!(
                kind = T::KIND,
                name = %name,
                stash_id = %id.stash_id,
                "Scraped entities share a name but have different remote ids"
            );
        }
        ids.push(id);
    }
    existing.fill_gaps(incoming);
}

/// Deduplicate by exact name, keeping first-seen order
pub fn dedup_by_name<T, I>(items: I) -> Vec<T>
where
    T: PendingEntity,
    I: IntoIterator<Item = T>,
{
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut merged: Vec<T> = Vec::new();

    for item in items {
        match index.get(item.name()) {
            Some(&i) => merge(&mut merged[i], item),
            None => {
                index.insert(item.name().to_string(), merged.len());
                merged.push(item);
            }
        }
    }

    merged
}

/// Remote identity stub for a newly created entity
pub fn stash_id_stub(endpoint: Option<&str>, remote_site_id: Option<&str>) -> Vec<StashId> {
    match (endpoint, remote_site_id) {
        (Some(endpoint), Some(remote)) if !remote.is_empty() => {
            vec![StashId::new(endpoint, remote)]
        }
        _ => Vec::new(),
    }
}

/// Whether a scraped performer passes the gender allow-list
///
/// Performers without a recognizable gender always pass.
pub fn gender_allowed(performer: &ScrapedPerformer, allowed: &[Gender]) -> bool {
    match performer.parsed_gender() {
        Some(gender) => allowed.contains(&gender),
        None => true,
    }
}

fn scraped_scenes(results: &BTreeMap<String, QueryResult>) -> impl Iterator<Item = &ScrapedScene> {
    results
        .values()
        .filter_map(QueryResult::results)
        .flatten()
}

fn is_unmatched(name: &str, stored_id: &Option<String>) -> bool {
    stored_id.is_none() && !name.is_empty()
}

pub fn tag_input(tag: &ScrapedTag, endpoint: Option<&str>) -> TagCreateInput {
    TagCreateInput {
        name: tag.name.clone(),
        stash_ids: stash_id_stub(endpoint, tag.remote_site_id.as_deref()),
    }
}

pub fn performer_input(performer: &ScrapedPerformer, endpoint: Option<&str>) -> PerformerCreateInput {
    PerformerCreateInput {
        name: performer.name.clone(),
        disambiguation: performer.disambiguation.clone(),
        gender: performer.parsed_gender(),
        urls: performer.urls.clone(),
        birthdate: performer.birthdate.clone(),
        country: performer.country.clone(),
        image: performer.image().map(str::to_string),
        stash_ids: stash_id_stub(endpoint, performer.remote_site_id.as_deref()),
    }
}

pub fn studio_input(studio: &ScrapedStudio, endpoint: Option<&str>) -> StudioCreateInput {
    StudioCreateInput {
        name: studio.name.clone(),
        url: studio.url.clone(),
        image: studio.image.clone(),
        parent_id: studio.parent.as_ref().and_then(|p| p.stored_id.clone()),
        stash_ids: stash_id_stub(endpoint, studio.remote_site_id.as_deref()),
    }
}

/// Tags awaiting creation across all cached results
pub fn pending_tags(
    results: &BTreeMap<String, QueryResult>,
    endpoint: Option<&str>,
) -> Vec<TagCreateInput> {
    dedup_by_name(
        scraped_scenes(results)
            .flat_map(|scene| scene.tags.iter())
            .filter(|t| is_unmatched(&t.name, &t.stored_id))
            .map(|t| tag_input(t, endpoint)),
    )
}

/// Performers awaiting creation whose gender is allowed
pub fn pending_performers(
    results: &BTreeMap<String, QueryResult>,
    endpoint: Option<&str>,
    allowed_genders: &[Gender],
) -> Vec<PerformerCreateInput> {
    dedup_by_name(
        scraped_scenes(results)
            .flat_map(|scene| scene.performers.iter())
            .filter(|p| is_unmatched(&p.name, &p.stored_id))
            .filter(|p| gender_allowed(p, allowed_genders))
            .map(|p| performer_input(p, endpoint)),
    )
}

/// Studios awaiting creation
pub fn pending_studios(
    results: &BTreeMap<String, QueryResult>,
    endpoint: Option<&str>,
) -> Vec<StudioCreateInput> {
    dedup_by_name(
        scraped_scenes(results)
            .filter_map(|scene| scene.studio.as_ref())
            .filter(|s| is_unmatched(&s.name, &s.stored_id))
            .map(|s| studio_input(s, endpoint)),
    )
}

/// Stored ids to write back into scraped entities
#[derive(Debug, Clone, Default)]
pub struct Backfill {
    by_name: HashMap<String, String>,
    by_remote_id: HashMap<String, String>,
}

impl Backfill {
    /// Match unmatched entities by name against created entities
    pub fn from_created(created: &[CreatedEntity]) -> Self {
        Self {
            by_name: created
                .iter()
                .map(|c| (c.name.clone(), c.id.clone()))
                .collect(),
            by_remote_id: HashMap::new(),
        }
    }

    pub fn name(name: impl Into<String>, stored_id: impl Into<String>) -> Self {
        let mut backfill = Self::default();
        backfill.by_name.insert(name.into(), stored_id.into());
        backfill
    }

    pub fn remote_id(remote_site_id: impl Into<String>, stored_id: impl Into<String>) -> Self {
        let mut backfill = Self::default();
        backfill
            .by_remote_id
            .insert(remote_site_id.into(), stored_id.into());
        backfill
    }

    /// Match by remote id when there is one, else by name
    pub fn remote_id_or_name(
        remote_site_id: Option<&str>,
        name: &str,
        stored_id: impl Into<String>,
    ) -> Self {
        match remote_site_id {
            Some(remote) if !remote.is_empty() => Self::remote_id(remote, stored_id),
            _ => Self::name(name, stored_id),
        }
    }

    fn lookup(&self, name: &str, remote_site_id: Option<&str>, stored_id: &Option<String>) -> Option<String> {
        if let Some(id) = remote_site_id.and_then(|r| self.by_remote_id.get(r)) {
            return Some(id.clone());
        }
        if stored_id.is_none() {
            return self.by_name.get(name).cloned();
        }
        None
    }

    pub fn apply_tags(&self, mut scene: ScrapedScene) -> ScrapedScene {
        for tag in &mut scene.tags {
            if let Some(id) = self.lookup(&tag.name, tag.remote_site_id.as_deref(), &tag.stored_id) {
                tag.stored_id = Some(id);
            }
        }
        scene
    }

    pub fn apply_performers(&self, mut scene: ScrapedScene) -> ScrapedScene {
        for performer in &mut scene.performers {
            if let Some(id) = self.lookup(
                &performer.name,
                performer.remote_site_id.as_deref(),
                &performer.stored_id,
            ) {
                performer.stored_id = Some(id);
            }
        }
        scene
    }

    /// Apply to the scene's studio and to its parent studio reference
    pub fn apply_studios(&self, mut scene: ScrapedScene) -> ScrapedScene {
        if let Some(studio) = scene.studio.as_mut() {
            self.apply_studio(studio);
            if let Some(parent) = studio.parent.as_mut() {
                self.apply_studio(parent);
            }
        }
        scene
    }

    fn apply_studio(&self, studio: &mut ScrapedStudio) {
        if let Some(id) = self.lookup(&studio.name, studio.remote_site_id.as_deref(), &studio.stored_id) {
            studio.stored_id = Some(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENDPOINT: &str = "https://stashdb.org/graphql";

    fn tag(name: &str, remote: Option<&str>) -> ScrapedTag {
        ScrapedTag {
            name: name.to_string(),
            remote_site_id: remote.map(str::to_string),
            stored_id: None,
        }
    }

    fn performer(name: &str, gender: Option<&str>) -> ScrapedPerformer {
        ScrapedPerformer {
            name: name.to_string(),
            gender: gender.map(str::to_string),
            ..Default::default()
        }
    }

    fn studio(name: &str, parent: Option<ScrapedStudio>) -> ScrapedStudio {
        ScrapedStudio {
            name: name.to_string(),
            parent: parent.map(Box::new),
            ..Default::default()
        }
    }

    fn results(scenes: Vec<ScrapedScene>) -> BTreeMap<String, QueryResult> {
        scenes
            .into_iter()
            .enumerate()
            .map(|(i, s)| (i.to_string(), QueryResult::Results(vec![s])))
            .collect()
    }

    fn with_tags(tags: Vec<ScrapedTag>) -> ScrapedScene {
        ScrapedScene {
            tags,
            ..Default::default()
        }
    }

    #[test]
    fn test_same_tag_in_many_scenes_creates_once() {
        let cache = results(vec![
            with_tags(vec![tag("Outdoor", None)]),
            with_tags(vec![tag("Outdoor", Some("r1")), tag("Indoor", None)]),
            with_tags(vec![tag("Outdoor", None)]),
        ]);

        let pending = pending_tags(&cache, Some(ENDPOINT));
        let names: Vec<&str> = pending.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["Outdoor", "Indoor"]);
        assert_eq!(pending[0].stash_ids, vec![StashId::new(ENDPOINT, "r1")]);
    }

    #[test]
    fn test_matched_and_unnamed_tags_are_skipped() {
        let mut matched = tag("Matched", None);
        matched.stored_id = Some("7".to_string());
        let mut cache = results(vec![with_tags(vec![matched, tag("", None)])]);
        cache.insert("err".to_string(), QueryResult::Error("boom".to_string()));

        assert!(pending_tags(&cache, None).is_empty());
    }

    #[test]
    fn test_stash_id_stub_requires_endpoint() {
        assert!(stash_id_stub(None, Some("r1")).is_empty());
        assert!(stash_id_stub(Some(ENDPOINT), None).is_empty());
        assert!(stash_id_stub(Some(ENDPOINT), Some("")).is_empty());
        assert_eq!(stash_id_stub(Some(ENDPOINT), Some("r1")).len(), 1);
    }

    #[test]
    fn test_gender_filter_excludes_disallowed() {
        let scene = ScrapedScene {
            performers: vec![
                performer("A", Some("FEMALE")),
                performer("B", Some("Trans Male")),
                performer("C", Some("MALE")),
                performer("D", Some("something else")),
            ],
            ..Default::default()
        };
        let cache = results(vec![scene]);
        let allowed = vec![Gender::Female, Gender::TransgenderMale];

        let pending = pending_performers(&cache, None, &allowed);
        let names: Vec<&str> = pending.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B", "D"]);
        assert_eq!(pending[1].gender, Some(Gender::TransgenderMale));
        assert_eq!(pending[2].gender, None);
    }

    #[test]
    fn test_performer_merge_first_seen_wins() {
        let mut first = performer("Jane Doe", None);
        first.birthdate = Some("1990-01-01".to_string());
        let mut second = performer("Jane Doe", Some("female"));
        second.birthdate = Some("1991-02-02".to_string());
        second.urls = vec!["https://example.org/jane".to_string()];

        let cache = results(vec![
            ScrapedScene {
                performers: vec![first],
                ..Default::default()
            },
            ScrapedScene {
                performers: vec![second],
                ..Default::default()
            },
        ]);

        let pending = pending_performers(&cache, None, &Gender::all());
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].birthdate.as_deref(), Some("1990-01-01"));
        assert_eq!(pending[0].gender, Some(Gender::Female));
        assert_eq!(pending[0].urls, vec!["https://example.org/jane"]);
    }

    #[test]
    fn test_conflicting_remote_ids_are_kept_together() {
        let cache = results(vec![
            with_tags(vec![tag("Outdoor", Some("r1"))]),
            with_tags(vec![tag("Outdoor", Some("r2"))]),
            with_tags(vec![tag("Outdoor", Some("r1"))]),
        ]);

        let pending = pending_tags(&cache, Some(ENDPOINT));
        assert_eq!(pending.len(), 1);
        assert_eq!(
            pending[0].stash_ids,
            vec![StashId::new(ENDPOINT, "r1"), StashId::new(ENDPOINT, "r2")]
        );
    }

    #[test]
    fn test_studio_backfill_reaches_parent() {
        let scene = ScrapedScene {
            studio: Some(studio("Studio A", Some(studio("Network", None)))),
            ..Default::default()
        };
        let other = ScrapedScene {
            studio: Some(studio("Network", None)),
            ..Default::default()
        };
        let cache = results(vec![scene.clone(), other]);

        let pending = pending_studios(&cache, None);
        let names: Vec<&str> = pending.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Studio A", "Network"]);

        let backfill = Backfill::from_created(&[
            CreatedEntity {
                id: "10".to_string(),
                name: "Studio A".to_string(),
            },
            CreatedEntity {
                id: "11".to_string(),
                name: "Network".to_string(),
            },
        ]);
        let filled = backfill.apply_studios(scene);
        let studio = filled.studio.unwrap();
        assert_eq!(studio.stored_id.as_deref(), Some("10"));
        assert_eq!(studio.parent.unwrap().stored_id.as_deref(), Some("11"));
    }

    #[test]
    fn test_backfill_by_remote_id_overrides() {
        let mut linked = performer("Jane", None);
        linked.remote_site_id = Some("perf-remote".to_string());
        linked.stored_id = Some("old".to_string());
        let scene = ScrapedScene {
            performers: vec![linked, performer("Jane", None)],
            ..Default::default()
        };

        let filled = Backfill::remote_id_or_name(Some("perf-remote"), "Jane", "42")
            .apply_performers(scene);
        assert_eq!(filled.performers[0].stored_id.as_deref(), Some("42"));
        assert_eq!(filled.performers[1].stored_id, None);
    }
}
