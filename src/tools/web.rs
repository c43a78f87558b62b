use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Url;
use scraper::{ElementRef, Html, Node, Selector};
use serde_json::Value;

use super::{required_tool_string, ToolHandler};
use crate::types::ToolPayload;

const SEARCH_ENDPOINT: &str = "https://html.duckduckgo.com/html/";
const SEARCH_RESULTS: usize = 5;
const SEARCH_TIMEOUT: Duration = Duration::from_secs(15);
const FETCH_TIMEOUT: Duration = Duration::from_secs(15);
const USER_AGENT: &str = concat!("agentdesk/", env!("CARGO_PKG_VERSION"));

const SKIPPED_TAGS: &[&str] = &["script", "style", "noscript", "template"];
const BLOCK_TAGS: &[&str] = &[
    "p", "br", "div", "h1", "h2", "h3", "h4", "h5", "h6", "li", "tr",
];

/// `web_search`: queries the DuckDuckGo HTML endpoint.
#[derive(Debug, Clone)]
pub struct WebSearchTool {
    endpoint: String,
    max_results: usize,
}

impl Default for WebSearchTool {
    fn default() -> Self {
        Self::with_endpoint(SEARCH_ENDPOINT)
    }
}

impl WebSearchTool {
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            max_results: SEARCH_RESULTS,
        }
    }
}

impl ToolHandler for WebSearchTool {
    fn execute(&self, arguments: &Value) -> Result<ToolPayload> {
        let query = required_tool_string(arguments, "web_search", "query")?;
        // Blocking clients must be built off the async executor.
        let client = reqwest::blocking::Client::builder()
            .timeout(SEARCH_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .context("failed to build HTTP client")?;
        let body = client
            .get(&self.endpoint)
            .query(&[("q", query)])
            .send()
            .and_then(|response| response.error_for_status())
            .and_then(|response| response.text())
            .with_context(|| format!("search request to {} failed", self.endpoint))?;

        let results = parse_search_results(&body, self.max_results);
        if results.is_empty() {
            return Ok(ToolPayload::text("No results found."));
        }
        let formatted: Vec<String> = results
            .iter()
            .map(|result| {
                format!(
                    "Title: {}\nURL: {}\nSnippet: {}\n",
                    result.title, result.url, result.snippet
                )
            })
            .collect();
        Ok(ToolPayload::Text(formatted.join("\n")))
    }

    fn activity(&self, arguments: &Value) -> Option<String> {
        let query = arguments.get("query")?.as_str()?;
        Some(format!("Searching: {query}"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

pub(crate) fn parse_search_results(html: &str, limit: usize) -> Vec<SearchResult> {
    let document = Html::parse_document(html);
    let (Ok(result_sel), Ok(link_sel), Ok(snippet_sel)) = (
        Selector::parse(".result"),
        Selector::parse("a.result__a"),
        Selector::parse(".result__snippet"),
    ) else {
        return Vec::new();
    };

    document
        .select(&result_sel)
        .filter_map(|result| {
            let link = result.select(&link_sel).next()?;
            let href = link.value().attr("href")?;
            let snippet = result
                .select(&snippet_sel)
                .next()
                .map(|node| collapse_whitespace(&node.text().collect::<String>()))
                .unwrap_or_default();
            Some(SearchResult {
                title: collapse_whitespace(&link.text().collect::<String>()),
                url: unwrap_redirect(href),
                snippet,
            })
        })
        .take(limit)
        .collect()
}

/// DuckDuckGo wraps result links as `//duckduckgo.com/l/?uddg=<target>`.
fn unwrap_redirect(href: &str) -> String {
    let absolute = if href.starts_with("//") {
        format!("https:{href}")
    } else {
        href.to_string()
    };
    Url::parse(&absolute)
        .ok()
        .and_then(|url| {
            url.query_pairs()
                .find(|(key, _)| key == "uddg")
                .map(|(_, target)| target.into_owned())
        })
        .unwrap_or(absolute)
}

/// `fetch_webpage`: GET a URL and reduce HTML to its visible text.
#[derive(Debug, Clone)]
pub struct FetchWebpageTool {
    timeout: Duration,
}

impl Default for FetchWebpageTool {
    fn default() -> Self {
        Self {
            timeout: FETCH_TIMEOUT,
        }
    }
}

impl ToolHandler for FetchWebpageTool {
    fn execute(&self, arguments: &Value) -> Result<ToolPayload> {
        let url = required_tool_string(arguments, "fetch_webpage", "url")?;
        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .user_agent(USER_AGENT)
            .build()
            .context("failed to build HTTP client")?;
        let response = client
            .get(url)
            .send()
            .and_then(|response| response.error_for_status())
            .with_context(|| format!("Error fetching URL {url}"))?;

        let is_html = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.contains("html"));
        let body = response
            .text()
            .with_context(|| format!("failed to read body of {url}"))?;

        let text = if is_html { html_to_text(&body) } else { body };
        Ok(ToolPayload::Text(text))
    }

    fn activity(&self, arguments: &Value) -> Option<String> {
        let url = arguments.get("url")?.as_str()?;
        Some(format!("Fetching: {url}"))
    }
}

/// Visible text of an HTML document; block elements end with a newline.
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut out = String::new();
    collect_text(document.root_element(), &mut out);
    out.trim().to_string()
}

fn collect_text(element: ElementRef<'_>, out: &mut String) {
    let name = element.value().name();
    if SKIPPED_TAGS.contains(&name) {
        return;
    }
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(_) => {
                if let Some(child_element) = ElementRef::wrap(child) {
                    collect_text(child_element, out);
                }
            }
            _ => {}
        }
    }
    if BLOCK_TAGS.contains(&name) {
        out.push('\n');
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
