//! Regex extraction of phone and fax candidates from page text.

use super::phone::{is_valid_format, normalize};
use once_cell::sync::Lazy;
use regex::Regex;

// 號碼本體：區碼、局號、號碼之間允許 - . ) 或空白
const NUMBER: &str = r"(\d{2,4}[ \t]*[-.)]?[ \t]*\d{3,4}[ \t]*[-.]?[ \t]*\d{4})";

fn compile(patterns: &[String]) -> Vec<Regex> {
    patterns.iter().map(|p| Regex::new(p).unwrap()).collect()
}

static FAX_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        format!(r"팩스(?:번호)?[\s:：.]*{NUMBER}"),
        format!(r"(?i)fax[\s:：.]*{NUMBER}"),
        // 排除 3F 這類樓層標示
        format!(r"(?:^|[^A-Za-z0-9])F[\s:：.]+{NUMBER}"),
        format!(r"전송[\s:：]*{NUMBER}"),
        format!(r"{NUMBER}[ \t]*\((?:팩스|(?i:fax))\)"),
    ])
});

static PHONE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        format!(r"(?:전화|연락처|대표번호)(?:번호)?[\s:：.]*{NUMBER}"),
        format!(r"(?i)tel[\s:：.]*{NUMBER}"),
        format!(r"(?:^|[^A-Za-z0-9])T[\s:：.]+{NUMBER}"),
    ])
});

static BARE_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(NUMBER).unwrap());

/// Matches of every pattern, ordered by where the number starts in `text`.
fn collect(text: &str, patterns: &[Regex], out: &mut Vec<String>) {
    let mut found: Vec<(usize, String)> = patterns
        .iter()
        .flat_map(|re| re.captures_iter(text))
        .filter_map(|caps| caps.get(1))
        .map(|m| (m.start(), normalize(m.as_str())))
        .filter(|(_, candidate)| is_valid_format(candidate))
        .collect();
    found.sort_by_key(|(start, _)| *start);

    for (_, candidate) in found {
        if !out.contains(&candidate) {
            out.push(candidate);
        }
    }
}

/// Fax numbers found next to a fax label, normalized and de-duplicated.
pub fn extract_fax_numbers(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    collect(text, &FAX_PATTERNS, &mut out);
    out
}

/// Phone numbers found next to a phone label. When no labelled number exists,
/// falls back to any well-shaped number that is not claimed as a fax.
pub fn extract_phone_numbers(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    collect(text, &PHONE_PATTERNS, &mut out);
    if !out.is_empty() {
        return out;
    }

    let faxes = extract_fax_numbers(text);
    for m in BARE_NUMBER.find_iter(text) {
        let candidate = normalize(m.as_str());
        if is_valid_format(&candidate) && !faxes.contains(&candidate) && !out.contains(&candidate)
        {
            out.push(candidate);
        }
    }
    out
}
