//! Persisted tagger settings
//!
//! The settings are a flat JSON document that is loaded once and written
//! back after every mutation.

use crate::core::error::{Result, TaggerError};
use crate::tagger::gender::Gender;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// Patterns stripped from file names before they are used as a query
pub const DEFAULT_BLACKLIST: &[&str] = &[
    r"\sXXX\s",
    "1080p",
    "720p",
    "2160p",
    "KTR",
    "RARBG",
    r"\scom\s",
    r"\[",
    r"\]",
];

/// Performer fields left untouched when refreshing from a stash-box
pub const DEFAULT_EXCLUDED_PERFORMER_FIELDS: &[&str] = &["name"];

/// How the default query string of a scene is derived
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParseMode {
    #[default]
    Auto,
    Filename,
    Dir,
    Path,
    Metadata,
}

/// How scraped tags are combined with the tags already on a scene
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagOperation {
    #[default]
    Merge,
    Overwrite,
}

/// Scene fields the user can exclude from saving
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SceneField {
    Title,
    Code,
    Details,
    Director,
    Url,
    Date,
    Studio,
    CoverImage,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaggerConfig {
    pub mode: ParseMode,
    pub blacklist: Vec<String>,
    pub set_cover_image: bool,
    pub set_tags: bool,
    pub tag_operation: TagOperation,
    /// Genders of performers that may be created; `None` allows all
    pub performer_genders: Option<Vec<Gender>>,
    pub selected_endpoint: Option<String>,
    /// Scene ids awaiting fingerprint submission, per stash-box endpoint
    pub fingerprint_queue: BTreeMap<String, Vec<String>>,
    pub excluded_performer_fields: Vec<String>,
    pub excluded_scene_fields: BTreeSet<SceneField>,
    pub mark_scene_as_organized_on_save: bool,
}

impl Default for TaggerConfig {
    fn default() -> Self {
        Self {
            mode: ParseMode::Auto,
            blacklist: DEFAULT_BLACKLIST.iter().map(|s| s.to_string()).collect(),
            set_cover_image: true,
            set_tags: false,
            tag_operation: TagOperation::Merge,
            performer_genders: None,
            selected_endpoint: None,
            fingerprint_queue: BTreeMap::new(),
            excluded_performer_fields: DEFAULT_EXCLUDED_PERFORMER_FIELDS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            excluded_scene_fields: BTreeSet::new(),
            mark_scene_as_organized_on_save: false,
        }
    }
}

impl TaggerConfig {
    /// The performer gender allow-list, with `None` expanded to every gender
    pub fn allowed_genders(&self) -> Vec<Gender> {
        self.performer_genders.clone().unwrap_or_else(Gender::all)
    }

    pub fn is_excluded(&self, field: SceneField) -> bool {
        self.excluded_scene_fields.contains(&field)
    }

    pub fn pending_fingerprints(&self, endpoint: &str) -> &[String] {
        self.fingerprint_queue
            .get(endpoint)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Append scene ids to an endpoint's queue, skipping ids already queued
    pub fn queue_fingerprints(&mut self, endpoint: &str, scene_ids: &[String]) {
        if scene_ids.is_empty() {
            return;
        }
        let queue = self
            .fingerprint_queue
            .entry(endpoint.to_string())
            .or_default();
        for id in scene_ids {
            if !queue.contains(id) {
                queue.push(id.clone());
            }
        }
    }

    /// Remove submitted scene ids from an endpoint's queue
    pub fn clear_fingerprints(&mut self, endpoint: &str, scene_ids: &[String]) {
        if let Some(queue) = self.fingerprint_queue.get_mut(endpoint) {
            queue.retain(|id| !scene_ids.contains(id));
            if queue.is_empty() {
                self.fingerprint_queue.remove(endpoint);
            }
        }
    }
}

/// Store for the tagger settings, optionally backed by a JSON file
pub struct TaggerSettings {
    path: Option<PathBuf>,
    current: RwLock<TaggerConfig>,
}

impl TaggerSettings {
    /// Settings that live only in memory
    pub fn in_memory(config: TaggerConfig) -> Self {
        Self {
            path: None,
            current: RwLock::new(config),
        }
    }

    /// Load settings from a JSON file, falling back to defaults when the
    /// file does not exist yet
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let config = if path.exists() {
            let content = std::fs::read_to_string(&path).map_err(|e| {
                TaggerError::ConfigError(format!("Failed to read tagger settings: {}", e))
            })?;
            serde_json::from_str(&content).map_err(|e| {
                TaggerError::ConfigError(format!("Failed to parse tagger settings: {}", e))
            })?
        } else {
            tracing::debug!(path = ?path, "No tagger settings found, using defaults");
            TaggerConfig::default()
        };

        Ok(Self {
            path: Some(path),
            current: RwLock::new(config),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Snapshot of the current settings
    pub fn get(&self) -> TaggerConfig {
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Replace the settings and persist them
    pub fn set(&self, config: TaggerConfig) -> Result<()> {
        self.update(|current| *current = config).map(|_| ())
    }

    /// Mutate the settings in place and persist them
    pub fn update<F>(&self, f: F) -> Result<TaggerConfig>
    where
        F: FnOnce(&mut TaggerConfig),
    {
        let mut current = self.current.write().map_err(|e| {
            TaggerError::Internal(format!("Failed to acquire settings lock: {}", e))
        })?;
        f(&mut current);
        self.save(&current)?;
        Ok(current.clone())
    }

    fn save(&self, config: &TaggerConfig) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(config).map_err(|e| {
            TaggerError::SerializationError(format!("Failed to serialize tagger settings: {}", e))
        })?;

        // Write then rename; the settings file is never left half written
        let temp_path = path.with_extension("json.tmp");
        std::fs::write(&temp_path, content).map_err(|e| {
            TaggerError::ConfigError(format!("Failed to write tagger settings: {}", e))
        })?;
        std::fs::rename(&temp_path, path)?;

        tracing::debug!(path = ?path, "Tagger settings saved");
        Ok(())
    }
}
