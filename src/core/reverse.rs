//! Reverse lookup: which institution a phone or fax number belongs to.

use crate::adapters::http::{html_to_main_text, html_to_text, result_links, search_snippets, search_url};
use crate::domain::model::{OwnerMatch, OwnerMethod};
use crate::domain::ports::{NameOracle, PageFetcher};
use crate::domain::services::owner::{find_owner_name, owner_queries};
use crate::domain::services::phone::{is_valid_format, normalize};
use crate::domain::services::reference::ContactKind;
use crate::utils::error::Result;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Search results handed to the name oracle per query.
pub const MAX_SNIPPETS: usize = 5;
/// Result pages crawled when the snippets were not enough.
pub const MAX_LINKS: usize = 3;

/// Shared by all workers; remembers every number it has settled.
pub struct OwnerLookup {
    fetcher: Arc<dyn PageFetcher>,
    oracle: Option<Arc<dyn NameOracle>>,
    search_url: String,
    cache: Mutex<HashMap<String, Option<OwnerMatch>>>,
}

impl OwnerLookup {
    pub fn new(fetcher: Arc<dyn PageFetcher>, search_url: &str) -> Self {
        Self {
            fetcher,
            oracle: None,
            search_url: search_url.to_string(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_oracle(mut self, oracle: Arc<dyn NameOracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    /// Search the number and name its owner. Per query: oracle over the
    /// snippets, oracle over the linked pages, then keyword matching.
    /// Fails only when no search page could be fetched at all.
    pub async fn resolve(&self, number: &str, kind: ContactKind) -> Result<Option<OwnerMatch>> {
        let number = normalize(number);
        if !is_valid_format(&number) {
            return Ok(None);
        }
        if let Some(known) = self.cached(&number) {
            tracing::debug!("💾 owner of {} from cache", number);
            return Ok(known);
        }

        let mut last_error = None;
        let mut searched = false;

        for query in owner_queries(&number, kind) {
            tracing::debug!("🔍 owner search: {}", query);
            let html = match self.fetcher.fetch(&search_url(&self.search_url, &query)).await {
                Ok(html) => html,
                Err(e) => {
                    tracing::warn!("⚠️ owner search '{}' failed: {}", query, e);
                    last_error = Some(e);
                    continue;
                }
            };
            searched = true;

            if let Some(found) = self.from_results(&number, &html).await {
                tracing::info!("🏢 {} belongs to {} ({})", number, found.name, found.method);
                self.remember(&number, Some(found.clone()));
                return Ok(Some(found));
            }
        }

        match last_error {
            Some(e) if !searched => Err(e),
            _ => {
                tracing::info!("❌ no owner found for {}", number);
                self.remember(&number, None);
                Ok(None)
            }
        }
    }

    async fn from_results(&self, number: &str, html: &str) -> Option<OwnerMatch> {
        let snippets = search_snippets(html, MAX_SNIPPETS);

        if let Some(oracle) = &self.oracle {
            if let Some(name) = self.ask(oracle.as_ref(), number, &snippets).await {
                return Some(OwnerMatch::new(name, OwnerMethod::SearchAi));
            }

            let mut pages = Vec::new();
            for link in result_links(html, MAX_LINKS) {
                match self.fetcher.fetch(&link).await {
                    Ok(page) => {
                        let text = html_to_main_text(&page);
                        if !text.is_empty() {
                            pages.push(text);
                        }
                    }
                    Err(e) => tracing::debug!("skipping {}: {}", link, e),
                }
            }
            if let Some(name) = self.ask(oracle.as_ref(), number, &pages).await {
                return Some(OwnerMatch::new(name, OwnerMethod::LinkAi));
            }
        }

        let text = format!("{}\n{}", snippets.join("\n"), html_to_text(html));
        find_owner_name(&text, number).map(|name| OwnerMatch::new(name, OwnerMethod::Keyword))
    }

    async fn ask(&self, oracle: &dyn NameOracle, number: &str, texts: &[String]) -> Option<String> {
        if texts.is_empty() {
            return None;
        }
        match oracle.owner_name(number, texts).await {
            Ok(name) => name,
            Err(e) => {
                tracing::warn!("⚠️ owner oracle failed for {}: {}", number, e);
                None
            }
        }
    }

    fn cached(&self, number: &str) -> Option<Option<OwnerMatch>> {
        self.cache.lock().ok()?.get(number).cloned()
    }

    fn remember(&self, number: &str, found: Option<OwnerMatch>) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(number.to_string(), found);
        }
    }
}

impl std::fmt::Debug for OwnerLookup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OwnerLookup")
            .field("search_url", &self.search_url)
            .field("oracle", &self.oracle.is_some())
            .finish()
    }
}
