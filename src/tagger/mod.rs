//! Scene tagger
//!
//! Scrapes metadata for many local scenes from a selected source, reconciles
//! the scraped tags, performers and studios with the local library and saves
//! the results back in bulk.

pub mod apply;
pub mod backend;
pub mod dispatch;
pub mod entities;
pub mod gender;
pub mod pool;
pub mod query;
pub mod reconcile;
pub mod results;
pub mod save;
pub mod service;
pub mod settings;
pub mod sources;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;


pub use backend::StashBackend;
pub use gender::Gender;
pub use pool::{BatchReport, WorkerPool, BATCH_SIZE, CONCURRENCY};
pub use results::ResultCache;
pub use save::SaveReport;
pub use service::Tagger;
pub use settings::{ParseMode, SceneField, TagOperation, TaggerConfig, TaggerSettings};
pub use sources::SourceRegistry;
pub use types::{QueryResult, Resolution, ScrapedScene, Source, SourceInput};
