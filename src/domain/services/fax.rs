use super::phone::{area_code, is_blank, is_valid_format, normalize, same_area_code, too_similar};
use super::region::{is_regional_match, region_name};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FaxIssue {
    Missing,
    BadFormat { normalized: String },
    SameAsPhone,
    AreaCodeMismatch { fax: String, phone: String },
    TooSimilar { phone: String },
    RegionMismatch { area_code: String },
}

impl FaxIssue {
    /// Issues that reject a fax regardless of strictness.
    fn is_fatal(&self) -> bool {
        matches!(self, FaxIssue::Missing | FaxIssue::BadFormat { .. })
    }
}

impl fmt::Display for FaxIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaxIssue::Missing => write!(f, "팩스번호 없음"),
            FaxIssue::BadFormat { normalized } => write!(f, "형식 오류: {}", normalized),
            FaxIssue::SameAsPhone => write!(f, "전화번호와 동일"),
            FaxIssue::AreaCodeMismatch { fax, phone } => {
                write!(f, "지역번호 불일치: 팩스={}, 전화={}", fax, phone)
            }
            FaxIssue::TooSimilar { phone } => write!(f, "전화번호와 유사: {}", phone),
            FaxIssue::RegionMismatch { area_code } => write!(
                f,
                "주소-지역 불일치: {}({})",
                area_code,
                region_name(area_code).unwrap_or("알 수 없음")
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaxVerdict {
    pub accepted: bool,
    pub normalized: String,
    pub issues: Vec<FaxIssue>,
}

impl fmt::Display for FaxVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let head = if self.accepted { "유효" } else { "무효" };
        if self.issues.is_empty() {
            return write!(f, "{}: {}", head, self.normalized);
        }
        let notes: Vec<String> = self.issues.iter().map(ToString::to_string).collect();
        write!(f, "{} ({})", head, notes.join("; "))
    }
}

/// Check a fax candidate against the institution's known phone and address.
///
/// Non-strict mode only rejects missing or malformed numbers and keeps the
/// other findings as notes; strict mode rejects on any finding.
pub fn validate_fax(fax: &str, known_phone: &str, address: &str, strict: bool) -> FaxVerdict {
    if is_blank(fax) {
        return FaxVerdict {
            accepted: false,
            normalized: String::new(),
            issues: vec![FaxIssue::Missing],
        };
    }

    let normalized = normalize(fax);
    if !is_valid_format(&normalized) {
        return FaxVerdict {
            accepted: false,
            issues: vec![FaxIssue::BadFormat {
                normalized: normalized.clone(),
            }],
            normalized,
        };
    }

    let mut issues = Vec::new();

    if !is_blank(known_phone) {
        let phone = normalize(known_phone);
        if is_valid_format(&phone) {
            if phone == normalized {
                issues.push(FaxIssue::SameAsPhone);
            } else {
                if !same_area_code(&normalized, &phone) {
                    issues.push(FaxIssue::AreaCodeMismatch {
                        fax: area_code(&normalized),
                        phone: area_code(&phone),
                    });
                }
                if too_similar(&normalized, &phone) {
                    issues.push(FaxIssue::TooSimilar { phone });
                }
            }
        }
    }

    if !is_regional_match(&normalized, address) {
        issues.push(FaxIssue::RegionMismatch {
            area_code: area_code(&normalized),
        });
    }

    let accepted = if strict {
        issues.is_empty()
    } else {
        !issues.iter().any(FaxIssue::is_fatal)
    };

    FaxVerdict {
        accepted,
        normalized,
        issues,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationSummary {
    pub total: usize,
    pub valid: usize,
    pub invalid: usize,
    pub valid_rate: f64,
    pub area_distribution: BTreeMap<String, usize>,
}

/// Shape statistics over a list of numbers, grouped by region name.
pub fn summarize<'a, I>(numbers: I) -> ValidationSummary
where
    I: IntoIterator<Item = &'a str>,
{
    let mut summary = ValidationSummary::default();
    for number in numbers {
        summary.total += 1;
        if is_valid_format(number) {
            summary.valid += 1;
            let region = region_name(&area_code(number)).unwrap_or("기타");
            *summary
                .area_distribution
                .entry(region.to_string())
                .or_insert(0) += 1;
        } else {
            summary.invalid += 1;
        }
    }
    if summary.total > 0 {
        summary.valid_rate = summary.valid as f64 / summary.total as f64 * 100.0;
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fax_identical_to_phone_is_accepted() {
        let verdict = validate_fax("02-1234-5678", "02) 1234-5678", "서울 종로구", false);
        assert!(verdict.accepted);
        assert_eq!(verdict.issues, vec![FaxIssue::SameAsPhone]);
    }

    #[test]
    fn test_fax_identical_to_phone_rejected_when_strict() {
        let verdict = validate_fax("02-1234-5678", "02-1234-5678", "서울 종로구", true);
        assert!(!verdict.accepted);
    }

    #[test]
    fn test_fax_digit_count_out_of_range() {
        let verdict = validate_fax("123-4567", "", "", false);
        assert!(!verdict.accepted);
        assert!(matches!(verdict.issues[0], FaxIssue::BadFormat { .. }));

        let verdict = validate_fax("02-12345-678901", "", "", false);
        assert!(!verdict.accepted);
    }

    #[test]
    fn test_missing_fax() {
        let verdict = validate_fax("nan", "02-123-4567", "서울", false);
        assert!(!verdict.accepted);
        assert_eq!(verdict.issues, vec![FaxIssue::Missing]);
    }

    #[test]
    fn test_region_mismatch_is_a_note_unless_strict() {
        let lenient = validate_fax("051-123-4567", "", "서울특별시 중구", false);
        assert!(lenient.accepted);
        assert_eq!(
            lenient.issues,
            vec![FaxIssue::RegionMismatch {
                area_code: "051".to_string()
            }]
        );

        let strict = validate_fax("051-123-4567", "", "서울특별시 중구", true);
        assert!(!strict.accepted);
    }

    #[test]
    fn test_clean_fax_in_strict_mode() {
        let verdict = validate_fax("02-2100-3399", "02-2100-2114", "서울특별시 종로구", true);
        assert!(verdict.accepted);
        assert!(verdict.issues.is_empty());
        assert_eq!(verdict.normalized, "02-2100-3399");
    }

    #[test]
    fn test_similar_and_area_mismatch_notes() {
        let similar = validate_fax("02-1234-5679", "02-1234-5678", "서울", true);
        assert!(!similar.accepted);
        assert!(matches!(similar.issues[0], FaxIssue::TooSimilar { .. }));

        let other_area = validate_fax("031-123-4567", "02-123-4567", "경기도 수원시", false);
        assert!(other_area.accepted);
        assert!(matches!(other_area.issues[0], FaxIssue::AreaCodeMismatch { .. }));
    }

    #[test]
    fn test_summary() {
        let summary = summarize(["02-123-4567", "051-123-4567", "123", "02-987-6543"]);
        assert_eq!(summary.total, 4);
        assert_eq!(summary.valid, 3);
        assert_eq!(summary.invalid, 1);
        assert_eq!(summary.area_distribution.get("서울"), Some(&2));
        assert!((summary.valid_rate - 75.0).abs() < f64::EPSILON);
    }
}
