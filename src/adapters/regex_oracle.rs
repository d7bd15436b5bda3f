use crate::domain::model::ContactCandidates;
use crate::domain::ports::TextOracle;
use crate::domain::services::extract::{extract_fax_numbers, extract_phone_numbers};
use crate::utils::error::Result;
use async_trait::async_trait;

/// Pattern-based oracle; never fails, may return nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegexOracle;

#[async_trait]
impl TextOracle for RegexOracle {
    fn name(&self) -> &str {
        "regex"
    }

    async fn extract(&self, _institution: &str, text: &str) -> Result<ContactCandidates> {
        Ok(ContactCandidates {
            phones: extract_phone_numbers(text),
            faxes: extract_fax_numbers(text),
        })
    }
}
