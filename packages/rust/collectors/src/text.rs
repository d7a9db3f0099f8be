//! HTML-to-text cleanup.

use std::sync::LazyLock;

use regex::Regex;
use scraper::Html;

/// Elements whose text is page chrome rather than content.
pub const CHROME_TAGS: &[&str] = &[
    "script", "style", "noscript", "template", "header", "footer", "nav", "aside", "form",
];

/// Elements that never carry readable text.
pub const SCRIPT_TAGS: &[&str] = &["script", "style", "noscript", "template"];

/// Readable text of a page with chrome removed, one text run per line.
pub fn html_to_text(html: &str) -> String {
    html_to_text_skipping(html, CHROME_TAGS)
}

/// Readable text of a page, skipping text nested under any of `skip`.
pub fn html_to_text_skipping(html: &str, skip: &[&str]) -> String {
    let doc = Html::parse_document(html);
    let mut lines: Vec<String> = Vec::new();

    for node in doc.root_element().descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };

        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|el| skip.contains(&el.name()))
        });
        if hidden {
            continue;
        }

        let cleaned = collapse_whitespace(text);
        if !cleaned.is_empty() {
            lines.push(cleaned);
        }
    }

    lines.join("\n")
}

/// Addresses from `mailto:` links, in document order, without duplicates.
pub fn mailto_addresses(html: &str) -> Vec<String> {
    let doc = Html::parse_document(html);
    let mut emails: Vec<String> = Vec::new();

    for node in doc.root_element().descendants() {
        let Some(href) = node
            .value()
            .as_element()
            .filter(|el| el.name() == "a")
            .and_then(|el| el.attr("href"))
        else {
            continue;
        };

        if let Some(rest) = href.trim().strip_prefix("mailto:") {
            let email = rest.split('?').next().unwrap_or_default().trim().to_string();
            if !email.is_empty() && !emails.contains(&email) {
                emails.push(email);
            }
        }
    }

    emails
}

/// Collapse runs of whitespace into single spaces and trim.
pub fn collapse_whitespace(text: &str) -> String {
    static WS_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"\s+").expect("valid regex")
    });

    WS_RE.replace_all(text, " ").trim().to_string()
}

/// At most `max` characters of `text`, never splitting a character.
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><title>Acme Srl</title><style>body { color: red; }</style></head>
<body>
  <header><nav><a href="/">Home</a></nav></header>
  <main>
    <h1>Chi siamo</h1>
    <p>Acme   Srl produce
       widget dal 1990.</p>
    <script>var tracking = true;</script>
    <p>Scrivici: <a href="mailto:info@acme.it?subject=Ciao">info@acme.it</a></p>
  </main>
  <footer>Via Roma 1, Milano</footer>
</body>
</html>"#;

    #[test]
    fn chrome_and_scripts_are_dropped() {
        let text = html_to_text(PAGE);
        assert!(text.contains("Chi siamo"));
        assert!(text.contains("Acme Srl produce widget dal 1990."));
        assert!(!text.contains("tracking"));
        assert!(!text.contains("color: red"));
        assert!(!text.contains("Home"));
        assert!(!text.contains("Via Roma"));
    }

    #[test]
    fn footer_kept_when_only_scripts_skipped() {
        let text = html_to_text_skipping(PAGE, SCRIPT_TAGS);
        assert!(text.contains("Via Roma 1, Milano"));
        assert!(text.contains("Home"));
        assert!(!text.contains("tracking"));
    }

    #[test]
    fn mailto_links_are_collected_once() {
        let html = r#"<a href="mailto:info@acme.it?subject=x">a</a>
                      <a href="mailto:info@acme.it">b</a>
                      <a href="mailto:ceo@acme.it">c</a>
                      <a href="tel:+39021234">d</a>"#;
        assert_eq!(mailto_addresses(html), ["info@acme.it", "ceo@acme.it"]);
    }

    #[test]
    fn truncation_is_char_safe() {
        assert_eq!(truncate_chars("perché sì", 6), "perché");
        assert_eq!(truncate_chars("short", 100), "short");
        assert_eq!(truncate_chars("", 3), "");
    }
}
