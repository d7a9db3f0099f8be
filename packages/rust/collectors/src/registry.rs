//! Official-registry lookups.
//!
//! A registry is reached through a site-restricted web search. The first hit
//! on the registry's own domain is scraped; when that yields nothing the
//! hits' snippets are used instead.

use std::sync::Arc;

use tracing::{debug, info};
use url::Url;

use crate::scrape::PageScraper;
use crate::search::{SearchProvider, format_hits};

/// Hits requested from the site-restricted search.
const REGISTRY_SEARCH_RESULTS: usize = 3;

/// Entity name in, raw registry text out.
pub trait RegistryLookup: Send + Sync {
    /// Label used as the heading of the registry's section in prompts.
    fn name(&self) -> &str;

    fn lookup(&self, entity: &str) -> Option<String>;
}

/// A registry website queried with `"<entity>" site:<domain>`.
pub struct SiteRegistry {
    label: String,
    domain: String,
    search: Arc<dyn SearchProvider>,
    scraper: Arc<dyn PageScraper>,
}

impl SiteRegistry {
    pub fn new(
        label: impl Into<String>,
        domain: impl Into<String>,
        search: Arc<dyn SearchProvider>,
        scraper: Arc<dyn PageScraper>,
    ) -> Self {
        Self {
            label: label.into(),
            domain: domain.into(),
            search,
            scraper,
        }
    }

    fn is_on_site(&self, url: &str) -> bool {
        Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_lowercase))
            .is_some_and(|host| host == self.domain || host.ends_with(&format!(".{}", self.domain)))
    }
}

impl RegistryLookup for SiteRegistry {
    fn name(&self) -> &str {
        &self.label
    }

    fn lookup(&self, entity: &str) -> Option<String> {
        let query = format!("\"{entity}\" site:{}", self.domain);
        let hits = self.search.search(&query, REGISTRY_SEARCH_RESULTS);
        if hits.is_empty() {
            debug!(registry = %self.label, "no registry hits");
            return None;
        }

        if let Some(hit) = hits.iter().find(|h| self.is_on_site(&h.url)) {
            if let Some(text) = self.scraper.fetch_text(&hit.url) {
                info!(registry = %self.label, url = %hit.url, "registry page scraped");
                return Some(text);
            }
        }

        Some(format_hits(&hits))
    }
}

/// The Italian chamber-of-commerce and energy-regulator registries.
pub fn default_registries(
    search: Arc<dyn SearchProvider>,
    scraper: Arc<dyn PageScraper>,
) -> Vec<Arc<dyn RegistryLookup>> {
    vec![
        Arc::new(SiteRegistry::new(
            "UfficioCamerale",
            "ufficiocamerale.it",
            Arc::clone(&search),
            Arc::clone(&scraper),
        )),
        Arc::new(SiteRegistry::new("Arera", "arera.it", search, scraper)),
    ]
}
