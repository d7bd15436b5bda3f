use crate::adapters::gemini::{default_key_envs, DEFAULT_ENDPOINT, DEFAULT_MAX_CHARS, DEFAULT_MODEL};
use crate::adapters::http::DEFAULT_USER_AGENT;
use crate::domain::model::ColumnMapping;
use crate::domain::ports::{AiSettings, ConfigProvider, LookupOptions, DEFAULT_SEARCH_URL};
use crate::utils::error::Result;
use crate::utils::validation::{
    validate_file_extensions, validate_non_empty_string, validate_path, validate_range,
    validate_search_template, Validate,
};
use clap::Parser;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Parser)]
#[command(name = "contact-etl")]
#[command(about = "Look up and validate phone/fax numbers for Korean institutions")]
pub struct CliConfig {
    #[arg(long, help = "Input CSV with one institution per row")]
    pub input: String,

    #[arg(long, default_value = "./output")]
    pub output_path: String,

    #[arg(long, default_value = "contacts")]
    pub output_prefix: String,

    #[arg(long, value_delimiter = ',', help = "Reference CSVs checked before any web lookup")]
    pub lookup_files: Vec<String>,

    #[arg(long, default_value = "1")]
    pub workers: usize,

    #[arg(long, default_value = "2000", help = "Pause between rows in milliseconds")]
    pub delay_ms: u64,

    #[arg(long, help = "Reject faxes with any area-code or region finding")]
    pub strict: bool,

    #[arg(long, help = "Use Gemini when regex finds nothing on a homepage")]
    pub ai: bool,

    #[arg(long, default_value = DEFAULT_MODEL)]
    pub ai_model: String,

    #[arg(long, help = "Skip homepage fetching")]
    pub no_homepage: bool,

    #[arg(long, help = "Skip the search fallback")]
    pub no_search: bool,

    #[arg(long, help = "Search for a homepage when the row has none")]
    pub discover_homepage: bool,

    #[arg(long, help = "Name the institution behind each phone and fax number")]
    pub reverse_lookup: bool,

    #[arg(long, default_value = DEFAULT_SEARCH_URL)]
    pub search_url: String,

    #[arg(long, default_value = "30")]
    pub timeout_seconds: u64,

    #[arg(long, default_value = "50", help = "Rows between progress files (0 disables)")]
    pub batch_size: usize,

    #[arg(long)]
    pub max_records: Option<usize>,

    #[arg(long, help = "Bundle the result CSV and summary.json into a ZIP")]
    pub compress: bool,

    #[arg(long, help = "Also write logs to this file")]
    pub log_file: Option<String>,

    #[arg(long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Log CPU and memory usage per phase")]
    pub monitor: bool,
}

impl ConfigProvider for CliConfig {
    fn input_path(&self) -> &str {
        &self.input
    }

    fn output_path(&self) -> &str {
        &self.output_path
    }

    fn output_prefix(&self) -> &str {
        &self.output_prefix
    }

    fn lookup_files(&self) -> &[String] {
        &self.lookup_files
    }

    fn concurrent_requests(&self) -> usize {
        self.workers
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn max_records(&self) -> Option<usize> {
        self.max_records
    }

    fn compress_output(&self) -> bool {
        self.compress
    }

    fn columns(&self) -> ColumnMapping {
        ColumnMapping::default()
    }

    fn lookup_options(&self) -> LookupOptions {
        LookupOptions {
            use_homepage: !self.no_homepage,
            use_search: !self.no_search,
            discover_homepage: self.discover_homepage,
            reverse_lookup: self.reverse_lookup,
            strict: self.strict,
            delay_ms: self.delay_ms,
            search_url: self.search_url.clone(),
        }
    }

    fn user_agent(&self) -> &str {
        DEFAULT_USER_AGENT
    }

    fn timeout_seconds(&self) -> u64 {
        self.timeout_seconds
    }

    fn ai_settings(&self) -> Option<AiSettings> {
        self.ai.then(|| AiSettings {
            model: self.ai_model.clone(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key_envs: default_key_envs(),
            max_chars: DEFAULT_MAX_CHARS,
        })
    }
}

const SHEET_EXTENSIONS: &[&str] = &["csv", "xlsx"];

impl Validate for CliConfig {
    fn validate(&self) -> Result<()> {
        validate_path("input", &self.input)?;
        validate_file_extensions("input", std::slice::from_ref(&self.input), SHEET_EXTENSIONS)?;
        validate_path("output_path", &self.output_path)?;
        validate_non_empty_string("output_prefix", &self.output_prefix)?;
        validate_file_extensions("lookup_files", &self.lookup_files, SHEET_EXTENSIONS)?;
        validate_range("workers", self.workers, 1, 32)?;
        validate_range("timeout_seconds", self.timeout_seconds, 1, 300)?;
        validate_search_template("search_url", &self.search_url)?;
        if self.ai {
            validate_non_empty_string("ai_model", &self.ai_model)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> CliConfig {
        let mut argv = vec!["contact-etl"];
        argv.extend_from_slice(args);
        CliConfig::parse_from(argv)
    }

    #[test]
    fn test_defaults() {
        let config = parse(&["--input", "centers.csv"]);
        assert_eq!(config.output_path, "./output");
        assert_eq!(config.concurrent_requests(), 1);
        assert_eq!(config.batch_size(), 50);
        assert!(config.ai_settings().is_none());

        let options = config.lookup_options();
        assert!(options.use_homepage);
        assert!(options.use_search);
        assert!(!options.strict);
        assert_eq!(options.delay_ms, 2000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_flags_map_to_options() {
        let config = parse(&[
            "--input",
            "church.csv",
            "--lookup-files",
            "a.csv,b.csv",
            "--workers",
            "4",
            "--strict",
            "--no-search",
            "--ai",
            "--delay-ms",
            "0",
            "--reverse-lookup",
        ]);
        assert_eq!(config.lookup_files(), ["a.csv", "b.csv"]);
        assert_eq!(config.concurrent_requests(), 4);

        let options = config.lookup_options();
        assert!(options.strict);
        assert!(!options.use_search);
        assert!(options.reverse_lookup);
        assert_eq!(options.delay_ms, 0);

        let ai = config.ai_settings().unwrap();
        assert_eq!(ai.model, DEFAULT_MODEL);
        assert!(ai.api_key_envs.contains(&"GEMINI_API_KEY_1".to_string()));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        assert!(parse(&["--input", "centers.json"]).validate().is_err());
        assert!(parse(&["--input", "centers.xlsx", "--lookup-files", "ref.XLSX"])
            .validate()
            .is_ok());
        assert!(parse(&["--input", "a.csv", "--workers", "0"]).validate().is_err());
        assert!(parse(&["--input", "a.csv", "--lookup-files", "ref.json"])
            .validate()
            .is_err());
        assert!(parse(&["--input", "a.csv", "--search-url", "https://x.test/"])
            .validate()
            .is_err());
    }
}
