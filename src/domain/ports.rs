use crate::domain::model::{ColumnMapping, ContactCandidates, InputSheet, TransformResult};
use crate::utils::error::Result;
use async_trait::async_trait;

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

/// Returns raw page content for a URL.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String>;
}

/// Maps page text to phone/fax candidates (regex or LLM).
#[async_trait]
pub trait TextOracle: Send + Sync {
    fn name(&self) -> &str;

    async fn extract(&self, institution: &str, text: &str) -> Result<ContactCandidates>;
}

/// Names the institution a number belongs to, given texts found for it.
#[async_trait]
pub trait NameOracle: Send + Sync {
    async fn owner_name(&self, number: &str, texts: &[String]) -> Result<Option<String>>;
}

pub const DEFAULT_SEARCH_URL: &str = "https://www.google.com/search?q={query}";

/// Knobs for the per-row lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct LookupOptions {
    pub use_homepage: bool,
    pub use_search: bool,
    pub discover_homepage: bool,
    /// Also name the institution behind each phone/fax number.
    pub reverse_lookup: bool,
    pub strict: bool,
    pub delay_ms: u64,
    pub search_url: String,
}

impl Default for LookupOptions {
    fn default() -> Self {
        Self {
            use_homepage: true,
            use_search: true,
            discover_homepage: false,
            reverse_lookup: false,
            strict: false,
            delay_ms: 2000,
            search_url: DEFAULT_SEARCH_URL.to_string(),
        }
    }
}

/// Gemini oracle settings; `None` from the provider disables the AI step.
#[derive(Debug, Clone, PartialEq)]
pub struct AiSettings {
    pub model: String,
    pub endpoint: String,
    pub api_key_envs: Vec<String>,
    pub max_chars: usize,
}

pub trait ConfigProvider: Send + Sync {
    fn input_path(&self) -> &str;
    fn output_path(&self) -> &str;
    fn output_prefix(&self) -> &str;
    fn lookup_files(&self) -> &[String];
    fn concurrent_requests(&self) -> usize;
    fn batch_size(&self) -> usize;
    fn max_records(&self) -> Option<usize>;
    fn compress_output(&self) -> bool;
    fn columns(&self) -> ColumnMapping;
    fn lookup_options(&self) -> LookupOptions;
    fn user_agent(&self) -> &str;
    fn timeout_seconds(&self) -> u64;
    fn ai_settings(&self) -> Option<AiSettings>;
}

#[async_trait]
pub trait Pipeline: Send + Sync {
    async fn extract(&self) -> Result<InputSheet>;
    async fn transform(&self, sheet: InputSheet) -> Result<TransformResult>;
    async fn load(&self, result: TransformResult) -> Result<String>;
}
