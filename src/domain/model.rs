use crate::domain::services::{FaxVerdict, PhoneClass, ValidationSummary};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One target row of the input spreadsheet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstitutionRow {
    pub index: usize,
    pub name: String,
    pub address: String,
    pub phone: String,
    pub fax: String,
    pub homepage: String,
    /// Owner names already present in the sheet.
    pub phone_owner: String,
    pub fax_owner: String,
    /// Original cell values, in header order.
    pub cells: Vec<String>,
}

/// Header names (first match wins) for each logical column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnMapping {
    pub name: Vec<String>,
    pub address: Vec<String>,
    pub phone: Vec<String>,
    pub fax: Vec<String>,
    pub homepage: Vec<String>,
    pub phone_owner: Vec<String>,
    pub fax_owner: Vec<String>,
}

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

impl Default for ColumnMapping {
    fn default() -> Self {
        Self {
            name: names(&["기관명", "교회명", "읍면동", "센터명", "name"]),
            address: names(&["주소", "도로명주소", "address"]),
            phone: names(&["전화번호", "전화", "phone"]),
            fax: names(&["팩스번호", "팩스", "fax"]),
            homepage: names(&["홈페이지", "홈페이지주소", "homepage", "url"]),
            phone_owner: names(&["전화번호_실제기관명", "전화_실제기관명"]),
            fax_owner: names(&["팩스번호_실제기관명", "팩스_실제기관명"]),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct InputSheet {
    pub headers: Vec<String>,
    pub rows: Vec<InstitutionRow>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContactSource {
    Reference,
    Homepage,
    Ai,
    Search,
}

impl ContactSource {
    pub fn confidence(self) -> f32 {
        match self {
            ContactSource::Reference => 100.0,
            ContactSource::Homepage => 90.0,
            ContactSource::Ai => 75.0,
            ContactSource::Search => 60.0,
        }
    }
}

impl fmt::Display for ContactSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ContactSource::Reference => "reference",
            ContactSource::Homepage => "homepage",
            ContactSource::Ai => "ai",
            ContactSource::Search => "search",
        };
        f.write_str(s)
    }
}

/// How the owner of a number was determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnerMethod {
    /// Already filled in on the input row.
    Existing,
    /// LLM over search result snippets.
    SearchAi,
    /// LLM over pages linked from the search results.
    LinkAi,
    /// Keyword match on lines carrying the number.
    Keyword,
}

impl fmt::Display for OwnerMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OwnerMethod::Existing => "existing",
            OwnerMethod::SearchAi => "search_ai",
            OwnerMethod::LinkAi => "link_ai",
            OwnerMethod::Keyword => "keyword",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerMatch {
    pub name: String,
    pub method: OwnerMethod,
}

impl OwnerMatch {
    pub fn new(name: impl Into<String>, method: OwnerMethod) -> Self {
        Self {
            name: name.into(),
            method,
        }
    }
}

/// Raw candidates returned by a text extraction oracle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactCandidates {
    pub phones: Vec<String>,
    pub faxes: Vec<String>,
}

impl ContactCandidates {
    pub fn is_empty(&self) -> bool {
        self.phones.is_empty() && self.faxes.is_empty()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContactResult {
    pub row: InstitutionRow,
    pub extracted_phone: Option<String>,
    pub extracted_fax: Option<String>,
    pub phone_source: Option<ContactSource>,
    pub fax_source: Option<ContactSource>,
    pub phone_class: Option<PhoneClass>,
    pub fax_verdict: Option<FaxVerdict>,
    pub existing_fax_verdict: Option<FaxVerdict>,
    pub reference_label: Option<String>,
    pub discovered_homepage: Option<String>,
    pub phone_owner: Option<OwnerMatch>,
    pub fax_owner: Option<OwnerMatch>,
    pub confidence: f32,
    pub error: Option<String>,
    pub processed_at: String,
}

impl ContactResult {
    pub fn new(row: InstitutionRow) -> Self {
        Self {
            row,
            ..Default::default()
        }
    }

    pub fn found_anything(&self) -> bool {
        self.extracted_phone.is_some() || self.extracted_fax.is_some() || self.reference_label.is_some()
    }

    /// The fax value reported for this row: the extracted one, else the row's own.
    pub fn reported_fax(&self) -> &str {
        self.extracted_fax.as_deref().unwrap_or(&self.row.fax)
    }
}

#[derive(Debug, Clone)]
pub struct TransformResult {
    pub headers: Vec<String>,
    pub results: Vec<ContactResult>,
    pub summary: ValidationSummary,
    /// Files written by workers while transforming.
    pub worker_outputs: Vec<String>,
}
