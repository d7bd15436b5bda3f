//! Area-code tables and the area-code/address consistency checks.

use super::phone::{area_code, digits, is_valid_format};
use serde::{Deserialize, Serialize};
use std::fmt;

const REGION_NAMES: &[(&str, &str)] = &[
    ("02", "서울"),
    ("031", "경기"),
    ("032", "인천"),
    ("033", "강원"),
    ("041", "충남"),
    ("042", "대전"),
    ("043", "충북"),
    ("044", "세종"),
    ("051", "부산"),
    ("052", "울산"),
    ("053", "대구"),
    ("054", "경북"),
    ("055", "경남"),
    ("061", "전남"),
    ("062", "광주"),
    ("063", "전북"),
    ("064", "제주"),
    ("070", "인터넷전화"),
    ("010", "핸드폰"),
    ("017", "핸드폰"),
];

// 地址中可接受的地名；鄰近區域共用號段的也一併列入
const ADDRESS_TOKENS: &[(&str, &[&str])] = &[
    ("02", &["서울", "서울특별시", "서울시"]),
    ("031", &["경기", "경기도", "인천", "인천광역시"]),
    ("032", &["인천", "인천광역시", "경기", "경기도"]),
    ("033", &["강원", "강원도", "강원특별자치도"]),
    ("041", &["충남", "충청남도", "세종", "세종특별자치시"]),
    ("042", &["대전", "대전광역시", "충남", "충청남도"]),
    (
        "043",
        &[
            "충북", "충청북도", "청주", "제천", "충주", "음성", "진천", "괴산", "증평", "영동",
            "옥천", "보은", "단양",
        ],
    ),
    ("044", &["세종", "세종특별자치시", "충남", "충청남도"]),
    ("051", &["부산", "부산광역시"]),
    ("052", &["울산", "울산광역시"]),
    ("053", &["대구", "대구광역시"]),
    ("054", &["경북", "경상북도", "대구", "대구광역시"]),
    ("055", &["경남", "경상남도", "부산", "부산광역시"]),
    ("061", &["전남", "전라남도", "광주", "광주광역시"]),
    ("062", &["광주", "광주광역시", "전남", "전라남도"]),
    ("063", &["전북", "전라북도", "전북특별자치도"]),
    ("064", &["제주", "제주도", "제주특별자치도"]),
];

const MOBILE_PREFIXES: &[&str] = &["010", "011", "016", "017", "018", "019"];

/// Region name for an area code, e.g. `"02"` → `"서울"`.
pub fn region_name(code: &str) -> Option<&'static str> {
    REGION_NAMES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, name)| *name)
}

fn address_tokens(code: &str) -> Option<&'static [&'static str]> {
    ADDRESS_TOKENS
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, tokens)| *tokens)
}

/// Whether the area code of `phone` is consistent with `address`.
///
/// Missing input, internet numbers (070) and area codes without an address
/// table all pass.
pub fn is_regional_match(phone: &str, address: &str) -> bool {
    if phone.trim().is_empty() || address.trim().is_empty() {
        return true;
    }
    let code = area_code(phone);
    if code == "070" {
        return true;
    }
    match address_tokens(&code) {
        Some(tokens) => tokens.iter().any(|t| address.contains(t)),
        None => true,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhoneClass {
    Valid,
    Suspicious,
    Mobile,
    Invalid,
}

impl PhoneClass {
    /// Lower is better when picking among search candidates.
    pub fn rank(self) -> u8 {
        match self {
            PhoneClass::Valid => 0,
            PhoneClass::Mobile => 1,
            PhoneClass::Suspicious => 2,
            PhoneClass::Invalid => 3,
        }
    }
}

impl fmt::Display for PhoneClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PhoneClass::Valid => "valid",
            PhoneClass::Suspicious => "suspicious",
            PhoneClass::Mobile => "mobile",
            PhoneClass::Invalid => "invalid",
        };
        f.write_str(s)
    }
}

/// Classify a phone number against the institution's address.
pub fn classify(phone: &str, address: &str) -> PhoneClass {
    if !is_valid_format(phone) {
        return PhoneClass::Invalid;
    }
    let d = digits(phone);
    if MOBILE_PREFIXES.iter().any(|p| d.starts_with(p)) {
        return PhoneClass::Mobile;
    }
    let code = area_code(&d);
    match address_tokens(&code) {
        Some(tokens) if tokens.iter().any(|t| address.contains(t)) => PhoneClass::Valid,
        Some(_) => PhoneClass::Suspicious,
        // 070/080/15xx 沒有地區限制
        None => PhoneClass::Valid,
    }
}

/// Search-friendly location prefix taken from the first two address tokens.
///
/// `"경기도 수원시 팔달구 ..."` → `"수원"`, `"인천광역시 남동구 ..."` → `"인천 남동구"`.
pub fn search_location(address: &str) -> String {
    let head: Vec<&str> = address.split_whitespace().take(2).collect();
    let location = head.join(" ");
    if location.contains("서울") {
        return location;
    }
    if location.contains("경기") {
        let rest = location
            .replace("경기도 ", "")
            .replace("경기도", "")
            .trim()
            .to_string();
        return rest.strip_suffix('시').unwrap_or(rest.as_str()).to_string();
    }
    if location.contains("인천") {
        return location.replace("인천광역시", "인천");
    }
    location
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seoul_address_with_seoul_area_code() {
        assert!(is_regional_match("02-1234-5678", "서울특별시 종로구 세종대로 209"));
        assert_eq!(classify("02-1234-5678", "서울 종로구"), PhoneClass::Valid);
    }

    #[test]
    fn test_mismatched_region() {
        assert!(!is_regional_match("051-123-4567", "서울특별시 중구"));
        assert_eq!(classify("051-123-4567", "서울특별시 중구"), PhoneClass::Suspicious);
    }

    #[test]
    fn test_neighbouring_regions_share_codes() {
        assert!(is_regional_match("031-123-4567", "인천광역시 부평구"));
        assert!(is_regional_match("043-123-4567", "청주시 상당구"));
    }

    #[test]
    fn test_lenient_cases_pass() {
        assert!(is_regional_match("", "서울"));
        assert!(is_regional_match("02-123-4567", ""));
        assert!(is_regional_match("070-1234-5678", "부산광역시"));
        assert!(is_regional_match("1588-1234", "부산광역시"));
    }

    #[test]
    fn test_classify_mobile_and_invalid() {
        assert_eq!(classify("010-1234-5678", "서울"), PhoneClass::Mobile);
        assert_eq!(classify("123", "서울"), PhoneClass::Invalid);
        assert_eq!(classify("070-1234-5678", "대구"), PhoneClass::Valid);
    }

    #[test]
    fn test_region_name() {
        assert_eq!(region_name("064"), Some("제주"));
        assert_eq!(region_name("099"), None);
    }

    #[test]
    fn test_search_location() {
        assert_eq!(search_location("서울특별시 종로구 세종대로 209"), "서울특별시 종로구");
        assert_eq!(search_location("경기도 수원시 팔달구 효원로"), "수원");
        assert_eq!(search_location("인천광역시 남동구 정각로"), "인천 남동구");
        assert_eq!(search_location("부산광역시 해운대구"), "부산광역시 해운대구");
        assert_eq!(search_location(""), "");
    }
}
