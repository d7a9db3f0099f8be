//! Web search collaborator.
//!
//! Search failures never reach the caller: every problem is logged and
//! turned into an empty hit list.

use std::time::Duration;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};

use dossier_shared::{DossierError, Result, SearchConfig};

/// One search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub snippet: String,
    pub url: String,
}

impl SearchHit {
    pub fn new(title: impl Into<String>, snippet: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            snippet: snippet.into(),
            url: url.into(),
        }
    }
}

/// Query in, ordered hits out.
pub trait SearchProvider: Send + Sync {
    fn search(&self, query: &str, max_results: usize) -> Vec<SearchHit>;
}

/// Render hits as prompt context, one `- title: snippet (url)` line each.
pub fn format_hits(hits: &[SearchHit]) -> String {
    hits.iter()
        .map(|hit| {
            let title = if hit.title.trim().is_empty() { "No Title" } else { hit.title.as_str() };
            let snippet = if hit.snippet.trim().is_empty() { "No Content" } else { hit.snippet.as_str() };
            format!("- {title}: {snippet} ({})", hit.url)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ---------------------------------------------------------------------------
// Tavily
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct TavilyRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    max_results: usize,
    search_depth: &'a str,
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Debug, Deserialize)]
struct TavilyResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    url: String,
}

/// Tavily search API client.
pub struct TavilySearch {
    api_key: Option<String>,
    endpoint: String,
    search_depth: String,
    client: Client,
}

impl TavilySearch {
    pub fn new(
        api_key: Option<String>,
        endpoint: impl Into<String>,
        search_depth: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let api_key = api_key.filter(|k| !k.trim().is_empty());
        if api_key.is_none() {
            error!("Tavily API key not found; search will return no results");
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DossierError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            api_key,
            endpoint: endpoint.into(),
            search_depth: search_depth.into(),
            client,
        })
    }

    /// Build from `[search]`, reading the key from `api_key_env`.
    pub fn from_config(config: &SearchConfig) -> Result<Self> {
        Self::new(
            std::env::var(&config.api_key_env).ok(),
            &config.endpoint,
            &config.search_depth,
            Duration::from_secs(config.timeout_secs),
        )
    }

    fn try_search(&self, api_key: &str, query: &str, max_results: usize) -> Result<Vec<SearchHit>> {
        let body = TavilyRequest {
            api_key,
            query,
            max_results,
            search_depth: &self.search_depth,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .map_err(|e| DossierError::CollaboratorUnavailable(format!("tavily: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DossierError::CollaboratorUnavailable(format!("tavily: HTTP {status}")));
        }

        let parsed: TavilyResponse = response
            .json()
            .map_err(|e| DossierError::CollaboratorUnavailable(format!("tavily: bad body: {e}")))?;

        Ok(parsed
            .results
            .into_iter()
            .take(max_results)
            .map(|r| SearchHit::new(r.title, r.content, r.url))
            .collect())
    }
}

impl SearchProvider for TavilySearch {
    #[instrument(skip_all, fields(query = %query))]
    fn search(&self, query: &str, max_results: usize) -> Vec<SearchHit> {
        let Some(api_key) = self.api_key.as_deref() else {
            error!("Tavily client not initialized");
            return Vec::new();
        };

        info!(limit = max_results, "tavily search");
        match self.try_search(api_key, query, max_results) {
            Ok(hits) => {
                info!(found = hits.len(), "tavily search finished");
                hits
            }
            Err(e) => {
                error!(error = %e, "tavily search failed");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn run_search(
        api_key: Option<&str>,
        endpoint: String,
        query: &'static str,
    ) -> Vec<SearchHit> {
        let api_key = api_key.map(str::to_string);
        tokio::task::spawn_blocking(move || {
            let search = TavilySearch::new(api_key, endpoint, "advanced", Duration::from_secs(5))
                .expect("client");
            search.search(query, 5)
        })
        .await
        .expect("join")
    }

    #[test]
    fn hits_render_as_bullets() {
        let hits = vec![
            SearchHit::new("Acme Srl", "Widgets since 1990", "https://acme.it"),
            SearchHit::new("", "", "https://example.com"),
        ];
        assert_eq!(
            format_hits(&hits),
            "- Acme Srl: Widgets since 1990 (https://acme.it)\n- No Title: No Content (https://example.com)"
        );
        assert_eq!(format_hits(&[]), "");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn tavily_results_are_mapped() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .and(body_partial_json(json!({
                "api_key": "tvly-test",
                "query": "Acme Srl official website",
                "max_results": 5,
                "search_depth": "advanced",
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [
                    {"title": "Acme Srl", "content": "Widget maker in Milano", "url": "https://acme.it", "score": 0.9},
                    {"title": "Acme on LinkedIn", "content": "120 employees", "url": "https://linkedin.com/company/acme"}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let hits = run_search(
            Some("tvly-test"),
            format!("{}/search", server.uri()),
            "Acme Srl official website",
        )
        .await;
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].snippet, "Widget maker in Milano");
        assert_eq!(hits[1].url, "https://linkedin.com/company/acme");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn http_failure_yields_no_hits() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let hits = run_search(Some("tvly-test"), format!("{}/search", server.uri()), "x").await;
        assert!(hits.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn missing_key_never_calls_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": []})))
            .expect(0)
            .mount(&server)
            .await;

        let hits = run_search(None, format!("{}/search", server.uri()), "x").await;
        assert!(hits.is_empty());
    }
}
