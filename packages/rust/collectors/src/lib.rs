//! External collaborators consumed by the workers.
//!
//! Everything here degrades to "no data" on failure: search returns no hits,
//! scraping and registry lookups return `None`.

pub mod registry;
pub mod scrape;
pub mod search;
pub mod text;

pub use registry::{RegistryLookup, SiteRegistry, default_registries};
pub use scrape::{CONTACT_PATHS, HttpScraper, PageScraper, contact_page_urls, normalize_url};
pub use search::{SearchHit, SearchProvider, TavilySearch, format_hits};
pub use text::{html_to_text, truncate_chars};
