//! Phone/fax number normalization and shape checks.

use once_cell::sync::Lazy;
use regex::Regex;

static DIGIT_GROUPS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").unwrap());

// 韓國號碼的合法形狀 (只看數字)
static VALID_SHAPES: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"^02\d{7,8}$",
        r"^0[3-6][1-5]\d{7,8}$",
        r"^070\d{7,8}$",
        r"^080\d{7,8}$",
        r"^010\d{7,8}$",
        r"^01[1679]\d{7,8}$",
        r"^1[5-9]\d{6,7}$",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// Keep only the ASCII digits of `s`.
pub fn digits(s: &str) -> String {
    s.chars().filter(char::is_ascii_digit).collect()
}

/// Reduce a free-text phone-like string to a canonical hyphenated grouping.
///
/// `"02) 1234-5678"` becomes `"02-1234-5678"`, `"0311234567"` becomes
/// `"031-123-4567"`. Empty or digit-free input yields an empty string.
pub fn normalize(s: &str) -> String {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    // +82 國碼換回 0
    let local;
    let text = if let Some(rest) = trimmed.strip_prefix("+82") {
        local = format!("0{}", rest.trim_start_matches([' ', '-', '(', ')', '0']));
        local.as_str()
    } else {
        trimmed
    };

    let groups: Vec<&str> = DIGIT_GROUPS.find_iter(text).map(|m| m.as_str()).collect();
    match groups.len() {
        0 => String::new(),
        n if n >= 3 => format!("{}-{}-{}", groups[0], groups[1], groups[2]),
        _ => {
            let all: String = groups.concat();
            split_canonical(&all).unwrap_or(all)
        }
    }
}

fn split_canonical(d: &str) -> Option<String> {
    let len = d.len();
    if d.starts_with("02") && (9..=10).contains(&len) {
        return Some(format!("02-{}-{}", &d[2..len - 4], &d[len - 4..]));
    }
    if d.starts_with('0') && (10..=11).contains(&len) {
        return Some(format!("{}-{}-{}", &d[..3], &d[3..len - 4], &d[len - 4..]));
    }
    if d.starts_with('1') && len == 8 {
        return Some(format!("{}-{}", &d[..4], &d[4..]));
    }
    None
}

/// True when `s` has 8–11 digits arranged like a Korean landline, mobile,
/// internet or service number.
pub fn is_valid_format(s: &str) -> bool {
    let d = digits(s);
    if !(8..=11).contains(&d.len()) {
        return false;
    }
    VALID_SHAPES.iter().any(|re| re.is_match(&d))
}

/// Area code of a number: `02` for Seoul, otherwise the first three digits of
/// 9+ digit numbers and the first two of shorter ones.
pub fn area_code(s: &str) -> String {
    let d = digits(s);
    if d.len() < 2 {
        return String::new();
    }
    if d.starts_with("02") {
        return "02".to_string();
    }
    if d.len() >= 9 {
        d[..3].to_string()
    } else {
        d[..2].to_string()
    }
}

pub fn same_area_code(a: &str, b: &str) -> bool {
    let area = area_code(a);
    !area.is_empty() && area == area_code(b)
}

/// Two numbers of equal length that share an area code and differ in at most
/// one subscriber digit, e.g. a fax line next to the main line.
pub fn too_similar(a: &str, b: &str) -> bool {
    let (da, db) = (digits(a), digits(b));
    if da.len() != db.len() || da.len() < 8 {
        return false;
    }
    let (area_a, area_b) = (area_code(&da), area_code(&db));
    if area_a != area_b {
        return false;
    }
    let diff = da[area_a.len()..]
        .chars()
        .zip(db[area_b.len()..].chars())
        .filter(|(x, y)| x != y)
        .count();
    diff <= 1
}

/// Spreadsheet cells that stand for "no value".
pub fn is_blank(s: &str) -> bool {
    let t = s.trim();
    t.is_empty() || ["nan", "none", "null", "#n/a"].contains(&t.to_lowercase().as_str())
}
