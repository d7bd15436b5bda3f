use crate::adapters::gemini::{default_key_envs, DEFAULT_ENDPOINT, DEFAULT_MAX_CHARS, DEFAULT_MODEL};
use crate::adapters::http::DEFAULT_USER_AGENT;
use crate::domain::model::ColumnMapping;
use crate::domain::ports::{AiSettings, ConfigProvider, LookupOptions, DEFAULT_SEARCH_URL};
use crate::utils::error::{EtlError, Result};
use crate::utils::validation::{self, Validate};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

static ENV_VAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$\{([^}]+)\}").unwrap());

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlConfig {
    pub pipeline: PipelineConfig,
    pub source: SourceConfig,
    #[serde(default)]
    pub columns: ColumnMapping,
    #[serde(default)]
    pub extract: ExtractConfig,
    pub ai: Option<AiConfig>,
    #[serde(default)]
    pub validation: ValidationConfig,
    pub load: LoadConfig,
    pub monitoring: Option<MonitoringConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub name: String,
    pub description: Option<String>,
    pub version: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub input: String,
    #[serde(default)]
    pub lookup_files: Vec<String>,
    pub user_agent: Option<String>,
    pub timeout_seconds: Option<u64>,
    pub search_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractConfig {
    pub workers: Option<usize>,
    pub max_records: Option<usize>,
    pub delay_ms: Option<u64>,
    pub use_homepage: Option<bool>,
    pub use_search: Option<bool>,
    pub discover_homepage: Option<bool>,
    pub reverse_lookup: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    pub enabled: bool,
    pub model: Option<String>,
    pub endpoint: Option<String>,
    pub api_key_envs: Option<Vec<String>>,
    pub max_chars: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationConfig {
    pub strict: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadConfig {
    pub output_path: String,
    pub output_prefix: Option<String>,
    pub batch_size: Option<usize>,
    pub compression: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    pub enabled: bool,
    pub log_level: Option<String>,
    pub log_file: Option<String>,
}

impl TomlConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(EtlError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content);

        toml::from_str(&processed_content).map_err(|e| EtlError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${INPUT_DIR})，未設定的保持原樣
    fn substitute_env_vars(content: &str) -> String {
        ENV_VAR
            .replace_all(content, |caps: &regex::Captures| {
                let var_name = &caps[1];
                std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
            })
            .to_string()
    }

    /// 驗證配置的合理性
    pub fn validate_config(&self) -> Result<()> {
        validation::validate_non_empty_string("pipeline.name", &self.pipeline.name)?;
        validation::validate_path("source.input", &self.source.input)?;
        validation::validate_file_extensions(
            "source.input",
            std::slice::from_ref(&self.source.input),
            &["csv", "xlsx"],
        )?;
        validation::validate_file_extensions(
            "source.lookup_files",
            &self.source.lookup_files,
            &["csv", "xlsx"],
        )?;
        validation::validate_search_template("source.search_url", &self.search_url())?;
        validation::validate_range("source.timeout_seconds", self.timeout_seconds(), 1, 300)?;

        validation::validate_range("extract.workers", self.workers(), 1, 32)?;

        validation::validate_path("load.output_path", &self.load.output_path)?;
        validation::validate_non_empty_string("load.output_prefix", self.output_prefix())?;

        if let Some(ai) = self.ai_settings() {
            validation::validate_url("ai.endpoint", &ai.endpoint)?;
            validation::validate_non_empty_string("ai.model", &ai.model)?;
            validation::validate_range("ai.max_chars", ai.max_chars, 1_000, 1_000_000)?;
            if ai.api_key_envs.is_empty() {
                return Err(EtlError::MissingConfigError {
                    field: "ai.api_key_envs".to_string(),
                });
            }
        }

        Ok(())
    }

    pub fn workers(&self) -> usize {
        self.extract.workers.unwrap_or(1)
    }

    pub fn search_url(&self) -> String {
        self.source
            .search_url
            .clone()
            .unwrap_or_else(|| DEFAULT_SEARCH_URL.to_string())
    }

    /// 取得監控設定
    pub fn monitoring_enabled(&self) -> bool {
        self.monitoring.as_ref().map(|m| m.enabled).unwrap_or(false)
    }

    pub fn log_file(&self) -> Option<&str> {
        self.monitoring.as_ref().and_then(|m| m.log_file.as_deref())
    }

    pub fn verbose(&self) -> bool {
        self.monitoring
            .as_ref()
            .and_then(|m| m.log_level.as_deref())
            .is_some_and(|level| level.eq_ignore_ascii_case("debug"))
    }
}

impl ConfigProvider for TomlConfig {
    fn input_path(&self) -> &str {
        &self.source.input
    }

    fn output_path(&self) -> &str {
        &self.load.output_path
    }

    fn output_prefix(&self) -> &str {
        self.load.output_prefix.as_deref().unwrap_or("contacts")
    }

    fn lookup_files(&self) -> &[String] {
        &self.source.lookup_files
    }

    fn concurrent_requests(&self) -> usize {
        self.workers()
    }

    fn batch_size(&self) -> usize {
        self.load.batch_size.unwrap_or(50)
    }

    fn max_records(&self) -> Option<usize> {
        self.extract.max_records
    }

    fn compress_output(&self) -> bool {
        self.load.compression.unwrap_or(false)
    }

    fn columns(&self) -> ColumnMapping {
        self.columns.clone()
    }

    fn lookup_options(&self) -> LookupOptions {
        let defaults = LookupOptions::default();
        LookupOptions {
            use_homepage: self.extract.use_homepage.unwrap_or(defaults.use_homepage),
            use_search: self.extract.use_search.unwrap_or(defaults.use_search),
            discover_homepage: self
                .extract
                .discover_homepage
                .unwrap_or(defaults.discover_homepage),
            reverse_lookup: self.extract.reverse_lookup.unwrap_or(defaults.reverse_lookup),
            strict: self.validation.strict.unwrap_or(defaults.strict),
            delay_ms: self.extract.delay_ms.unwrap_or(defaults.delay_ms),
            search_url: self.search_url(),
        }
    }

    fn user_agent(&self) -> &str {
        self.source.user_agent.as_deref().unwrap_or(DEFAULT_USER_AGENT)
    }

    fn timeout_seconds(&self) -> u64 {
        self.source.timeout_seconds.unwrap_or(30)
    }

    fn ai_settings(&self) -> Option<AiSettings> {
        let ai = self.ai.as_ref().filter(|ai| ai.enabled)?;
        Some(AiSettings {
            model: ai.model.clone().unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            endpoint: ai
                .endpoint
                .clone()
                .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            api_key_envs: ai.api_key_envs.clone().unwrap_or_else(default_key_envs),
            max_chars: ai.max_chars.unwrap_or(DEFAULT_MAX_CHARS),
        })
    }
}

impl Validate for TomlConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}
