//! Page fetching collaborator.
//!
//! Timeouts, HTTP errors and empty pages all collapse to `None`.

use std::time::Duration;

use reqwest::blocking::Client;
use tracing::{debug, info, warn};
use url::Url;

use dossier_shared::{DossierError, Result, ScrapeConfig};

use crate::text::{CHROME_TAGS, SCRIPT_TAGS, html_to_text_skipping, mailto_addresses};

/// Paths commonly used by Italian and English company sites for contact info.
pub const CONTACT_PATHS: &[&str] = &[
    "/contatti",
    "/contact",
    "/contatti/",
    "/contact/",
    "/chi-siamo",
    "/about",
    "/chi-siamo/",
    "/about-us",
    "/team",
    "/staff",
    "/azienda",
    "/company",
];

/// URL in, cleaned page text out.
pub trait PageScraper: Send + Sync {
    /// Cleaned text of a single page.
    fn fetch_text(&self, url: &str) -> Option<String>;

    /// Text gathered from a site's homepage and likely contact pages.
    fn contact_page_text(&self, website: &str) -> Option<String> {
        gather_pages(contact_page_urls(website), |url| self.fetch_text(url))
    }
}

/// Prefix `https://` when the scheme is missing.
pub fn normalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed.trim_start_matches('/'))
    }
}

/// The homepage followed by every contact path, resolved against the site root.
pub fn contact_page_urls(website: &str) -> Vec<String> {
    let base = normalize_url(website);
    let Ok(base_url) = Url::parse(&base) else {
        debug!(website, "unparseable website, skipping contact pages");
        return Vec::new();
    };

    let mut urls = vec![base_url.to_string()];
    urls.extend(
        CONTACT_PATHS
            .iter()
            .filter_map(|path| base_url.join(path).ok())
            .map(|u| u.to_string()),
    );
    urls
}

/// Fetch each URL and join the distinct texts under `[url]` headings.
fn gather_pages(
    urls: Vec<String>,
    mut fetch: impl FnMut(&str) -> Option<String>,
) -> Option<String> {
    let mut sections: Vec<String> = Vec::new();

    for url in urls {
        let Some(text) = fetch(&url) else {
            continue;
        };
        // `/contatti` and `/contatti/` often serve the same page.
        if !sections.iter().any(|s| s.ends_with(&text)) {
            sections.push(format!("[{url}]\n{text}"));
        }
    }

    (!sections.is_empty()).then(|| sections.join("\n\n"))
}

// ---------------------------------------------------------------------------
// HttpScraper
// ---------------------------------------------------------------------------

/// Blocking HTTP scraper.
pub struct HttpScraper {
    client: Client,
}

impl HttpScraper {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(timeout)
            .build()
            .map_err(|e| DossierError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    pub fn from_config(config: &ScrapeConfig) -> Result<Self> {
        Self::new(&config.user_agent, Duration::from_secs(config.timeout_secs))
    }

    fn fetch_html(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .header(
                reqwest::header::ACCEPT,
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            )
            .send()
            .map_err(|e| DossierError::CollaboratorUnavailable(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DossierError::CollaboratorUnavailable(format!("{url}: HTTP {status}")));
        }

        response
            .text()
            .map_err(|e| DossierError::CollaboratorUnavailable(format!("{url}: failed to read body: {e}")))
    }

    fn page_text(&self, url: &str, skip: &[&str]) -> Option<String> {
        let url = normalize_url(url);
        let html = match self.fetch_html(&url) {
            Ok(html) => html,
            Err(e) => {
                warn!(error = %e, "scrape failed");
                return None;
            }
        };

        let mut text = html_to_text_skipping(&html, skip);
        let emails = mailto_addresses(&html);
        if !emails.is_empty() {
            text.push_str("\nEmail links: ");
            text.push_str(&emails.join(", "));
        }

        if text.trim().is_empty() {
            debug!(%url, "page had no readable text");
            return None;
        }

        info!(%url, chars = text.len(), "scraped page");
        Some(text)
    }
}

impl PageScraper for HttpScraper {
    fn fetch_text(&self, url: &str) -> Option<String> {
        self.page_text(url, CHROME_TAGS)
    }

    /// Contact pages keep header and footer text, where addresses usually live.
    fn contact_page_text(&self, website: &str) -> Option<String> {
        gather_pages(contact_page_urls(website), |url| self.page_text(url, SCRIPT_TAGS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn html(body: &str) -> ResponseTemplate {
        ResponseTemplate::new(200)
            .insert_header("content-type", "text/html; charset=utf-8")
            .set_body_string(format!("<html><body>{body}</body></html>"))
    }

    async fn with_scraper<T: Send + 'static>(f: impl FnOnce(&HttpScraper) -> T + Send + 'static) -> T {
        tokio::task::spawn_blocking(move || {
            let scraper = HttpScraper::new("dossier-test", Duration::from_secs(5)).expect("client");
            f(&scraper)
        })
        .await
        .expect("join")
    }

    #[test]
    fn scheme_is_added_when_missing() {
        assert_eq!(normalize_url("acme.it"), "https://acme.it");
        assert_eq!(normalize_url(" http://acme.it/x "), "http://acme.it/x");
    }

    #[test]
    fn contact_urls_start_with_homepage() {
        let urls = contact_page_urls("acme.it");
        assert_eq!(urls[0], "https://acme.it/");
        assert_eq!(urls[1], "https://acme.it/contatti");
        assert_eq!(urls.len(), CONTACT_PATHS.len() + 1);
        assert!(urls.contains(&"https://acme.it/about-us".to_string()));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn fetch_text_strips_chrome() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/about"))
            .respond_with(html("<nav>Menu</nav><p>Acme makes widgets.</p><footer>(c) Acme</footer>"))
            .mount(&server)
            .await;

        let url = format!("{}/about", server.uri());
        let text = with_scraper(move |s| s.fetch_text(&url)).await.expect("text");
        assert_eq!(text, "Acme makes widgets.");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn http_errors_become_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let url = format!("{}/missing", server.uri());
        assert!(with_scraper(move |s| s.fetch_text(&url)).await.is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn contact_pages_are_combined() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(html("<p>Benvenuti in Acme</p>"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/contatti"))
            .respond_with(html(
                r#"<p>Mario Rossi, CEO</p><footer><a href="mailto:mario@acme.it">scrivi</a></footer>"#,
            ))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let site = server.uri();
        let text = with_scraper(move |s| s.contact_page_text(&site))
            .await
            .expect("contact text");
        assert!(text.contains("Benvenuti in Acme"));
        assert!(text.contains("Mario Rossi, CEO"));
        assert!(text.contains("Email links: mario@acme.it"));
    }
}
