// Pure helpers: no I/O, no async.

pub mod extract;
pub mod fax;
pub mod owner;
pub mod phone;
pub mod reference;
pub mod region;

pub use fax::{validate_fax, FaxIssue, FaxVerdict, ValidationSummary};
pub use region::{classify, is_regional_match, PhoneClass};
