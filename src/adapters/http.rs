use crate::domain::ports::PageFetcher;
use crate::utils::error::{EtlError, Result};
use async_trait::async_trait;
use reqwest::Client;
use scraper::{Html, Selector};
use std::time::Duration;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

// 這些標籤裡的文字不算頁面內容
const SKIPPED_TAGS: &[&str] = &["script", "style", "noscript"];

// 給 AI 的文字再去掉版頭版尾
const CHROME_TAGS: &[&str] = &["nav", "header", "footer"];

const EXCLUDED_HOSTS: &[&str] = &[
    "google.",
    "youtube.com",
    "facebook.com/tr",
    "gstatic.com",
    "googleusercontent.com",
];

#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        tracing::debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| EtlError::FetchError {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(EtlError::FetchError {
                url: url.to_string(),
                message: format!("HTTP {}", status),
            });
        }
        Ok(response.text().await?)
    }
}

fn visible_text(html: &str, skipped: &[&str]) -> String {
    let document = Html::parse_document(html);
    let mut lines = Vec::new();

    for node in document.tree.root().descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .is_some_and(|e| skipped.contains(&e.name()))
        });
        if hidden {
            continue;
        }
        lines.extend(text.lines().map(str::trim).filter(|l| !l.is_empty()));
    }

    lines.join("\n")
}

/// Visible text of an HTML page, one trimmed non-empty line per text run.
/// Header and footer text is kept; contact blocks usually live there.
pub fn html_to_text(html: &str) -> String {
    visible_text(html, SKIPPED_TAGS)
}

/// Like [`html_to_text`] but without `nav`, `header` and `footer`.
pub fn html_to_main_text(html: &str) -> String {
    let skipped: Vec<&str> = SKIPPED_TAGS.iter().chain(CHROME_TAGS).copied().collect();
    visible_text(html, &skipped)
}

/// Prefix schemeless homepages with `http://`.
pub fn normalize_homepage(url: &str) -> String {
    let url = url.trim();
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("http://{}", url.trim_start_matches('/'))
    }
}

/// Fill the `{query}` placeholder of a search URL template.
pub fn search_url(template: &str, query: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(query.as_bytes()).collect();
    template.replace("{query}", &encoded)
}

/// Resolve a search-result href, unwrapping `/url?q=<target>` redirects.
fn result_target(href: &str) -> String {
    href.strip_prefix("/url?")
        .and_then(|query| {
            url::form_urlencoded::parse(query.as_bytes())
                .find(|(key, _)| key == "q")
                .map(|(_, target)| target.into_owned())
        })
        .unwrap_or_else(|| href.to_string())
}

/// Outbound links on a search result page, in page order, without
/// search/video/tracking hosts and without duplicates.
pub fn result_links(html: &str, limit: usize) -> Vec<String> {
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse("a[href]") else {
        return Vec::new();
    };

    let mut links: Vec<String> = Vec::new();
    for href in document.select(&selector).filter_map(|a| a.value().attr("href")) {
        if links.len() >= limit {
            break;
        }
        let target = result_target(href);
        let lower = target.to_lowercase();
        let outbound = (lower.starts_with("http://") || lower.starts_with("https://"))
            && url::Url::parse(&target).is_ok()
            && !EXCLUDED_HOSTS.iter().any(|h| lower.contains(h));
        if outbound && !links.contains(&target) {
            links.push(target);
        }
    }
    links
}

/// First outbound link on a search result page that looks like a homepage.
pub fn discover_homepage_link(html: &str) -> Option<String> {
    result_links(html, 1).into_iter().next()
}

/// Title plus snippet of the top search results (`div.g` blocks). Pages
/// without that layout yield their whole visible text as one entry.
pub fn search_snippets(html: &str, limit: usize) -> Vec<String> {
    let document = Html::parse_document(html);
    let (Ok(block), Ok(title), Ok(span)) = (
        Selector::parse("div.g"),
        Selector::parse("h3"),
        Selector::parse("span"),
    ) else {
        return Vec::new();
    };

    let squash = |el: scraper::ElementRef<'_>| {
        el.text().collect::<Vec<_>>().join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
    };

    let snippets: Vec<String> = document
        .select(&block)
        .take(limit)
        .map(|result| {
            [
                result.select(&title).next().map(squash),
                result.select(&span).next().map(squash),
            ]
            .into_iter()
            .flatten()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
        })
        .filter(|text| !text.is_empty())
        .collect();

    if snippets.is_empty() {
        let text = html_to_text(html);
        return if text.is_empty() { Vec::new() } else { vec![text] };
    }
    snippets
}
