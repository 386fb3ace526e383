//! Scrape source registry

use crate::core::error::{Result, TaggerError};
use crate::tagger::types::{
    ScrapeType, ScraperInfo, Source, SourceInput, StashBoxInfo, SCRAPER_PREFIX, STASH_BOX_PREFIX,
};

/// The scrape sources available to the tagger and the current selection
#[derive(Debug, Clone, Default)]
pub struct SourceRegistry {
    sources: Vec<Source>,
    current: Option<usize>,
}

impl SourceRegistry {
    /// Build the registry from the configured stash-boxes and the scraper
    /// listing
    ///
    /// Stash-box sources come first, in server order. Scrapers that support
    /// neither name queries nor fragment scrapes are left out.
    pub fn build(stash_boxes: &[StashBoxInfo], scrapers: &[ScraperInfo]) -> Self {
        let mut sources: Vec<Source> = stash_boxes
            .iter()
            .enumerate()
            .map(|(i, stash_box)| {
                let name = stash_box
                    .name
                    .as_deref()
                    .filter(|n| !n.is_empty())
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("#{}", i + 1));
                Source {
                    id: format!("{}{}", STASH_BOX_PREFIX, stash_box.endpoint),
                    source_input: SourceInput::StashBox {
                        endpoint: stash_box.endpoint.clone(),
                    },
                    display_name: format!("stash-box: {}", name),
                    supports_query: true,
                    supports_fragment: true,
                }
            })
            .collect();

        for scraper in scrapers {
            let supports_query = scraper.scene_scrapes.contains(&ScrapeType::Name);
            let supports_fragment = scraper.scene_scrapes.contains(&ScrapeType::Fragment);
            if !supports_query && !supports_fragment {
                continue;
            }
            sources.push(Source {
                id: format!("{}{}", SCRAPER_PREFIX, scraper.id),
                source_input: SourceInput::Scraper {
                    scraper_id: scraper.id.clone(),
                },
                display_name: scraper.name.clone(),
                supports_query,
                supports_fragment,
            });
        }

        Self {
            sources,
            current: None,
        }
    }

    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    pub fn find(&self, id: &str) -> Option<&Source> {
        self.sources.iter().find(|s| s.id == id)
    }

    /// The source to select on startup: the stash-box matching the persisted
    /// endpoint if any, else the first source
    pub fn default_source(&self, selected_endpoint: Option<&str>) -> Option<&Source> {
        selected_endpoint
            .and_then(|endpoint| {
                self.sources
                    .iter()
                    .find(|s| s.stash_box_endpoint() == Some(endpoint))
            })
            .or_else(|| self.sources.first())
    }

    pub fn current(&self) -> Option<&Source> {
        self.current.and_then(|i| self.sources.get(i))
    }

    /// Make the source with the given id current
    pub fn select(&mut self, id: &str) -> Result<&Source> {
        let index = self
            .sources
            .iter()
            .position(|s| s.id == id)
            .ok_or_else(|| TaggerError::SourceNotFound(id.to_string()))?;
        self.current = Some(index);
        Ok(&self.sources[index])
    }

    /// Position of an endpoint among the stash-box sources
    pub fn stash_box_index(&self, endpoint: &str) -> Option<usize> {
        self.sources
            .iter()
            .filter(|s| s.is_stash_box())
            .position(|s| s.stash_box_endpoint() == Some(endpoint))
    }
}
