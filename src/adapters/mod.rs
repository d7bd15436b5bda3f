// Adapters layer: concrete implementations of the domain ports.

pub mod gemini;
pub mod http;
pub mod regex_oracle;
pub mod spreadsheet;
pub mod storage;

pub use gemini::GeminiOracle;
pub use http::HttpFetcher;
pub use regex_oracle::RegexOracle;
pub use storage::LocalStorage;
