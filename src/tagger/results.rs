//! Result cache
//!
//! Holds the latest query outcome for each local scene. The orchestrator is
//! the only writer; consumers read snapshots.

use crate::tagger::types::{QueryResult, ScrapedScene};
use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Map of scene id to query result
#[derive(Debug, Default)]
pub struct ResultCache {
    entries: RwLock<BTreeMap<String, QueryResult>>,
}

impl ResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, QueryResult>> {
        self.entries.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, QueryResult>> {
        self.entries.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get(&self, scene_id: &str) -> Option<QueryResult> {
        self.read().get(scene_id).cloned()
    }

    pub fn set(&self, scene_id: impl Into<String>, result: QueryResult) {
        self.write().insert(scene_id.into(), result);
    }

    /// Remove the entry for a scene, returning it
    pub fn clear(&self, scene_id: &str) -> Option<QueryResult> {
        self.write().remove(scene_id)
    }

    pub fn clear_all(&self) {
        self.write().clear();
    }

    /// Remove the entries of several scenes
    pub fn remove_many(&self, scene_ids: &[String]) {
        let mut entries = self.write();
        for id in scene_ids {
            entries.remove(id);
        }
    }

    /// Insert a batch of results, replacing existing entries for the same ids
    pub fn merge(&self, batch: BTreeMap<String, QueryResult>) {
        self.write().extend(batch);
    }

    /// Apply a transform to every scraped scene in every result list
    ///
    /// Error entries are left alone. The whole cache is rewritten under one
    /// write lock, so readers never observe a partially transformed cache.
    pub fn map_results<F>(&self, mut transform: F)
    where
        F: FnMut(ScrapedScene) -> ScrapedScene,
    {
        let mut entries = self.write();
        for result in entries.values_mut() {
            if let QueryResult::Results(scenes) = result {
                let taken = std::mem::take(scenes);
                *scenes = taken.into_iter().map(&mut transform).collect();
            }
        }
    }

    /// Mutate a single result slot of a scene
    ///
    /// Returns false when the scene has no result list or the index is out
    /// of range.
    pub fn update_slot<F>(&self, scene_id: &str, index: usize, f: F) -> bool
    where
        F: FnOnce(&mut ScrapedScene),
    {
        let mut entries = self.write();
        match entries.get_mut(scene_id) {
            Some(QueryResult::Results(scenes)) => match scenes.get_mut(index) {
                Some(scene) => {
                    f(scene);
                    true
                }
                None => false,
            },
            _ => false,
        }
    }

    pub fn has_results(&self, scene_id: &str) -> bool {
        matches!(self.read().get(scene_id), Some(QueryResult::Results(_)))
    }

    pub fn snapshot(&self) -> BTreeMap<String, QueryResult> {
        self.read().clone()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Number of scenes with at least one scraped result
    pub fn pending_scenes_count(&self) -> usize {
        self.read()
            .values()
            .filter(|r| r.results().map_or(false, |s| !s.is_empty()))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scene(title: &str) -> ScrapedScene {
        ScrapedScene {
            title: Some(title.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_map_results_skips_errors_and_keeps_order() {
        let cache = ResultCache::new();
        cache.set("1", QueryResult::Results(vec![scene("a"), scene("b")]));
        cache.set("2", QueryResult::Error("boom".to_string()));

        cache.map_results(|mut s| {
            s.title = s.title.map(|t| t.to_uppercase());
            s
        });

        let titles: Vec<_> = cache.get("1").unwrap().results().unwrap()
            .iter()
            .map(|s| s.title.clone().unwrap())
            .collect();
        assert_eq!(titles, vec!["A", "B"]);
        assert_eq!(cache.get("2"), Some(QueryResult::Error("boom".to_string())));
    }

    #[test]
    fn test_pending_scenes_count() {
        let cache = ResultCache::new();
        cache.set("1", QueryResult::Results(vec![scene("a")]));
        cache.set("2", QueryResult::Results(vec![]));
        cache.set("3", QueryResult::Error("boom".to_string()));
        assert_eq!(cache.pending_scenes_count(), 1);
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_update_slot() {
        let cache = ResultCache::new();
        cache.set("1", QueryResult::Results(vec![scene("a"), scene("b")]));

        assert!(cache.update_slot("1", 1, |s| *s = scene("c")));
        assert!(!cache.update_slot("1", 5, |s| *s = scene("x")));
        assert!(!cache.update_slot("missing", 0, |s| *s = scene("x")));

        let results = cache.get("1").unwrap();
        assert_eq!(results.results().unwrap()[1].title.as_deref(), Some("c"));
    }

    #[test]
    fn test_merge_and_remove() {
        let cache = ResultCache::new();
        cache.set("1", QueryResult::Error("old".to_string()));

        let mut batch = BTreeMap::new();
        batch.insert("1".to_string(), QueryResult::Results(vec![]));
        batch.insert("2".to_string(), QueryResult::Results(vec![]));
        cache.merge(batch);
        assert_eq!(cache.get("1"), Some(QueryResult::Results(vec![])));

        cache.remove_many(&["1".to_string(), "2".to_string()]);
        assert!(cache.is_empty());
    }
}
