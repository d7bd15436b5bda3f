//! Per-row lookup: reference dataset, homepage, search fallback, validation.

use crate::adapters::gemini::GeminiOracle;
use crate::adapters::http::{
    discover_homepage_link, html_to_main_text, html_to_text, normalize_homepage, search_url,
    HttpFetcher,
};
use crate::adapters::RegexOracle;
use crate::core::reverse::OwnerLookup;
use crate::domain::model::{
    ContactCandidates, ContactResult, ContactSource, InstitutionRow, OwnerMatch, OwnerMethod,
};
use crate::domain::ports::{ConfigProvider, LookupOptions, PageFetcher, TextOracle};
use crate::domain::services::extract::{extract_fax_numbers, extract_phone_numbers};
use crate::domain::services::phone::{is_blank, normalize};
use crate::domain::services::reference::{ContactKind, ReferenceIndex};
use crate::domain::services::region::search_location;
use crate::domain::services::{classify, validate_fax, PhoneClass};
use crate::utils::error::Result;
use std::sync::Arc;
use std::time::Duration;

/// Looks up one row at a time. Cheap to clone; workers share the fetcher and oracles.
#[derive(Clone)]
pub struct RowProcessor {
    fetcher: Arc<dyn PageFetcher>,
    oracles: Vec<(ContactSource, Arc<dyn TextOracle>)>,
    reference: Option<Arc<ReferenceIndex>>,
    owners: Option<Arc<OwnerLookup>>,
    options: LookupOptions,
}

impl RowProcessor {
    pub fn new(fetcher: Arc<dyn PageFetcher>, options: LookupOptions) -> Self {
        Self {
            fetcher,
            oracles: Vec::new(),
            reference: None,
            owners: None,
            options,
        }
    }

    /// Oracles run over homepage text in the order they are added.
    pub fn with_oracle(mut self, source: ContactSource, oracle: Arc<dyn TextOracle>) -> Self {
        self.oracles.push((source, oracle));
        self
    }

    pub fn with_reference(mut self, index: Arc<ReferenceIndex>) -> Self {
        self.reference = Some(index);
        self
    }

    /// Name the owners of the reported numbers after each lookup.
    pub fn with_owner_lookup(mut self, owners: Arc<OwnerLookup>) -> Self {
        self.owners = Some(owners);
        self
    }

    /// HTTP fetcher, regex oracle, and the Gemini oracle when AI is configured.
    /// With `reverse_lookup` the same fetcher and Gemini client also name owners.
    pub fn from_config<C: ConfigProvider + ?Sized>(config: &C) -> Result<Self> {
        let timeout = Duration::from_secs(config.timeout_seconds());
        let options = config.lookup_options();
        let fetcher: Arc<dyn PageFetcher> = Arc::new(HttpFetcher::new(config.user_agent(), timeout)?);
        let mut owners = options
            .reverse_lookup
            .then(|| OwnerLookup::new(fetcher.clone(), &options.search_url));
        let mut processor = Self::new(fetcher, options)
            .with_oracle(ContactSource::Homepage, Arc::new(RegexOracle));

        if let Some(ai) = config.ai_settings() {
            let keys = GeminiOracle::keys_from_env(&ai.api_key_envs);
            let oracle = Arc::new(GeminiOracle::new(&ai.endpoint, &ai.model, keys, ai.max_chars, timeout)?);
            processor = processor.with_oracle(ContactSource::Ai, oracle.clone());
            owners = owners.map(|lookup| lookup.with_oracle(oracle));
        }
        if let Some(lookup) = owners {
            processor = processor.with_owner_lookup(Arc::new(lookup));
        }
        Ok(processor)
    }

    pub fn options(&self) -> &LookupOptions {
        &self.options
    }

    /// Never fails: per-row problems end up in `ContactResult::error`.
    pub async fn process(&self, row: InstitutionRow) -> ContactResult {
        let mut result = ContactResult::new(row);
        let mut errors = Vec::new();

        if result.row.name.is_empty() {
            errors.push("기관명이 비어 있습니다".to_string());
        } else if !self.apply_reference(&mut result) {
            self.lookup_web(&mut result, &mut errors).await;
        }

        self.validate(&mut result);
        self.lookup_owners(&mut result, &mut errors).await;

        if !errors.is_empty() {
            result.error = Some(errors.join("; "));
        }
        result.processed_at = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();

        tracing::info!(
            "📞 [{}] {} → phone={} fax={} ({:.0})",
            result.row.index + 1,
            result.row.name,
            result.extracted_phone.as_deref().unwrap_or("-"),
            result.extracted_fax.as_deref().unwrap_or("-"),
            result.confidence
        );
        result
    }

    /// Returns true when the reference dataset settled the row.
    fn apply_reference(&self, result: &mut ContactResult) -> bool {
        let Some(index) = &self.reference else {
            return false;
        };
        let outcome = index.lookup(&result.row.phone, &result.row.fax);
        if !outcome.matched() {
            return false;
        }

        if let Some(m) = &outcome.phone {
            tracing::debug!("🔎 reference {} for {}", m.match_type(), result.row.name);
            if m.found_as == ContactKind::Phone {
                result.extracted_phone = Some(normalize(&result.row.phone));
                result.phone_source = Some(ContactSource::Reference);
            }
        }
        if let Some(m) = &outcome.fax {
            tracing::debug!("🔎 reference {} for {}", m.match_type(), result.row.name);
            if m.found_as == ContactKind::Fax {
                result.extracted_fax = Some(normalize(&result.row.fax));
                result.fax_source = Some(ContactSource::Reference);
            }
        }
        result.reference_label = Some(outcome.label());
        result.confidence = outcome.confidence();
        true
    }

    async fn lookup_owners(&self, result: &mut ContactResult, errors: &mut Vec<String>) {
        let Some(owners) = &self.owners else {
            return;
        };

        let phone = result
            .extracted_phone
            .clone()
            .unwrap_or_else(|| result.row.phone.clone());
        let existing = result.row.phone_owner.clone();
        result.phone_owner = owner_of(owners, &phone, &existing, ContactKind::Phone, errors).await;

        let fax = result.reported_fax().to_string();
        let existing = result.row.fax_owner.clone();
        result.fax_owner = owner_of(owners, &fax, &existing, ContactKind::Fax, errors).await;
    }

    async fn lookup_web(&self, result: &mut ContactResult, errors: &mut Vec<String>) {
        if self.options.use_homepage {
            match self.homepage_for(result).await {
                Ok(Some(url)) => {
                    if let Err(e) = self.scan_homepage(result, &url).await {
                        tracing::warn!("⚠️ {} homepage failed: {}", result.row.name, e);
                        errors.push(e.to_string());
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!("⚠️ {} homepage discovery failed: {}", result.row.name, e);
                    errors.push(e.to_string());
                }
            }
        }

        if self.options.use_search && !has_both(result) {
            self.search(result, errors).await;
        }

        result.confidence = [result.phone_source, result.fax_source]
            .into_iter()
            .flatten()
            .map(ContactSource::confidence)
            .fold(0.0, f32::max);
    }

    async fn homepage_for(&self, result: &mut ContactResult) -> Result<Option<String>> {
        if !result.row.homepage.is_empty() {
            return Ok(Some(normalize_homepage(&result.row.homepage)));
        }
        if !self.options.discover_homepage {
            return Ok(None);
        }

        let query = self.query(&result.row, "홈페이지");
        let html = self.fetcher.fetch(&search_url(&self.options.search_url, &query)).await?;
        let found = discover_homepage_link(&html);
        if let Some(url) = &found {
            tracing::debug!("🌐 discovered homepage for {}: {}", result.row.name, url);
            result.discovered_homepage = Some(url.clone());
        }
        Ok(found)
    }

    async fn scan_homepage(&self, result: &mut ContactResult, url: &str) -> Result<()> {
        let html = self.fetcher.fetch(url).await?;
        let full_text = html_to_text(&html);
        let main_text = html_to_main_text(&html);
        let mut failure = None;

        for (i, (source, oracle)) in self.oracles.iter().enumerate() {
            // 後面的 oracle 只補前面沒找到的欄位
            if i > 0 && has_both(result) {
                break;
            }
            let text = match source {
                ContactSource::Ai => &main_text,
                _ => &full_text,
            };
            match oracle.extract(&result.row.name, text).await {
                Ok(candidates) => self.adopt(result, candidates, *source),
                Err(e) => {
                    tracing::warn!("⚠️ {} oracle failed for {}: {}", oracle.name(), result.row.name, e);
                    failure = Some(e);
                }
            }
        }

        match failure {
            Some(e) if !has_both(result) => Err(e),
            _ => Ok(()),
        }
    }

    /// Fax and phone searches run independently; a failed one is recorded
    /// in `errors` and does not stop the other.
    async fn search(&self, result: &mut ContactResult, errors: &mut Vec<String>) {
        if result.extracted_fax.is_none() {
            match self.search_text(&result.row, "팩스번호").await {
                Ok(text) => {
                    let candidates = ContactCandidates {
                        phones: Vec::new(),
                        faxes: extract_fax_numbers(&text),
                    };
                    self.adopt(result, candidates, ContactSource::Search);
                }
                Err(e) => {
                    tracing::warn!("⚠️ {} fax search failed: {}", result.row.name, e);
                    errors.push(e.to_string());
                }
            }
        }
        if result.extracted_phone.is_none() {
            match self.search_text(&result.row, "전화번호").await {
                Ok(text) => {
                    let candidates = ContactCandidates {
                        phones: extract_phone_numbers(&text),
                        faxes: Vec::new(),
                    };
                    self.adopt(result, candidates, ContactSource::Search);
                }
                Err(e) => {
                    tracing::warn!("⚠️ {} phone search failed: {}", result.row.name, e);
                    errors.push(e.to_string());
                }
            }
        }
    }

    async fn search_text(&self, row: &InstitutionRow, suffix: &str) -> Result<String> {
        let query = self.query(row, suffix);
        tracing::debug!("🔍 search: {}", query);
        let html = self.fetcher.fetch(&search_url(&self.options.search_url, &query)).await?;
        Ok(html_to_text(&html))
    }

    fn query(&self, row: &InstitutionRow, suffix: &str) -> String {
        let location = search_location(&row.address);
        [location.as_str(), row.name.as_str(), suffix]
            .iter()
            .filter(|s| !s.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Fill whichever of phone/fax is still missing from `candidates`.
    fn adopt(&self, result: &mut ContactResult, candidates: ContactCandidates, source: ContactSource) {
        let address = result.row.address.clone();

        if result.extracted_phone.is_none() {
            let best = candidates
                .phones
                .iter()
                .map(|p| (classify(p, &address), p))
                .filter(|(class, _)| class.rank() <= PhoneClass::Mobile.rank())
                .min_by_key(|(class, _)| class.rank());
            if let Some((_, phone)) = best {
                result.extracted_phone = Some(phone.clone());
                result.phone_source = Some(source);
            }
        }

        if result.extracted_fax.is_none() {
            let known_phone = self.known_phone(result);
            let accepted = candidates
                .faxes
                .iter()
                .find(|f| validate_fax(f, &known_phone, &address, self.options.strict).accepted);
            if let Some(fax) = accepted {
                result.extracted_fax = Some(normalize(fax));
                result.fax_source = Some(source);
            }
        }
    }

    fn known_phone(&self, result: &ContactResult) -> String {
        if !is_blank(&result.row.phone) {
            result.row.phone.clone()
        } else {
            result.extracted_phone.clone().unwrap_or_default()
        }
    }

    fn validate(&self, result: &mut ContactResult) {
        let address = result.row.address.clone();
        let strict = self.options.strict;

        if let Some(fax) = result.extracted_fax.clone() {
            let verdict = validate_fax(&fax, &self.known_phone(result), &address, strict);
            if !verdict.accepted {
                result.extracted_fax = None;
                result.fax_source = None;
            }
            result.fax_verdict = Some(verdict);
        }

        let phone = result
            .extracted_phone
            .clone()
            .unwrap_or_else(|| result.row.phone.clone());
        if !is_blank(&phone) {
            result.phone_class = Some(classify(&normalize(&phone), &address));
        }

        if !is_blank(&result.row.fax) {
            result.existing_fax_verdict = Some(validate_fax(
                &result.row.fax,
                &result.row.phone,
                &address,
                strict,
            ));
        }
    }
}

fn has_both(result: &ContactResult) -> bool {
    result.extracted_phone.is_some() && result.extracted_fax.is_some()
}

/// A name already in the sheet wins; otherwise search for one.
async fn owner_of(
    owners: &OwnerLookup,
    number: &str,
    existing: &str,
    kind: ContactKind,
    errors: &mut Vec<String>,
) -> Option<OwnerMatch> {
    if !is_blank(existing) {
        return Some(OwnerMatch::new(existing.trim(), OwnerMethod::Existing));
    }
    if is_blank(number) {
        return None;
    }
    match owners.resolve(number, kind).await {
        Ok(found) => found,
        Err(e) => {
            tracing::warn!("⚠️ owner lookup for {} failed: {}", number, e);
            errors.push(e.to_string());
            None
        }
    }
}

impl std::fmt::Debug for RowProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowProcessor")
            .field(
                "oracles",
                &self.oracles.iter().map(|(_, o)| o.name()).collect::<Vec<_>>(),
            )
            .field("reference", &self.reference.as_ref().map(|r| r.len()))
            .field("owners", &self.owners)
            .field("options", &self.options)
            .finish()
    }
}
