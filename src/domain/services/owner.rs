//! Naming the institution that owns a phone or fax number.

use super::phone::digits;
use super::reference::ContactKind;
use once_cell::sync::Lazy;
use regex::Regex;

// 依序比對，先找到的關鍵字優先
const NAME_KEYWORDS: &[&str] = &[
    "주민센터",
    "행정복지센터",
    "동사무소",
    "면사무소",
    "읍사무소",
    "시청",
    "구청",
    "군청",
    "청사",
    "교회",
    "병원",
    "의원",
    "보건소",
    "보건센터",
    "클리닉",
    "학교",
    "대학",
    "교육청",
    "교육지원청",
    "경찰서",
    "파출소",
    "지구대",
    "소방서",
    "법원",
    "검찰청",
    "세무서",
    "등기소",
    "우체국",
    "체신청",
    "공사",
    "공단",
    "센터",
    "사업소",
];

static NAME_SHAPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"[가-힣]{2,10}(?:구청|시청|군청|센터|사무소|병원|의원|학교|대학|교회|청|서|소|원|관|공사|공단)",
    )
    .unwrap()
});

static REPLY_SHAPE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[가-힣0-9\s]{2,30}$").unwrap());

const NO_ANSWER: &[&str] = &["없음", "정보없음", "찾을 수 없음"];
const FORBIDDEN_WORDS: &[&str] = &["검색결과", "정보없음", "확인불가", "ERROR", "error"];

/// Search queries for a number, most specific first.
pub fn owner_queries(number: &str, kind: ContactKind) -> Vec<String> {
    match kind {
        ContactKind::Phone => vec![format!("\"{number}\" 전화번호")],
        ContactKind::Fax => vec![
            format!("\"{number}\" 팩스번호"),
            format!("\"{number}\" 팩스"),
            format!("\"{number}\" FAX"),
            format!("\"{number}\" 주민센터"),
            format!("\"{number}\""),
        ],
    }
}

fn is_hangul(c: char) -> bool {
    ('가'..='힣').contains(&c)
}

/// Up to ten Hangul syllables right before `keyword`, joined to it.
fn name_before(line: &str, keyword: &str) -> Option<String> {
    line.match_indices(keyword).find_map(|(at, _)| {
        let prefix: Vec<char> = line[..at]
            .trim_end()
            .chars()
            .rev()
            .take_while(|c| is_hangul(*c))
            .take(10)
            .collect();
        if prefix.len() < 2 {
            return None;
        }
        let name: String = prefix.into_iter().rev().chain(keyword.chars()).collect();
        (name.chars().count() <= 20).then_some(name)
    })
}

/// Institution name found on the lines of `text` that mention `number`.
pub fn find_owner_name(text: &str, number: &str) -> Option<String> {
    let wanted = digits(number);
    if wanted.len() < 8 {
        return None;
    }
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|line| digits(line).contains(&wanted))
        .collect();

    lines
        .iter()
        .find_map(|line| {
            NAME_KEYWORDS
                .iter()
                .filter(|k| line.contains(*k))
                .find_map(|k| name_before(line, k))
        })
        .or_else(|| {
            lines
                .iter()
                .find_map(|line| NAME_SHAPE.find(line).map(|m| m.as_str().to_string()))
        })
}

/// An LLM answer reduced to an institution name, or `None` when it is not one.
pub fn clean_name_reply(reply: &str) -> Option<String> {
    let name = reply
        .trim()
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '`')
        .trim();

    if name.is_empty() || NO_ANSWER.contains(&name) || name.chars().count() > 50 {
        return None;
    }
    if !REPLY_SHAPE.is_match(name) || FORBIDDEN_WORDS.iter().any(|w| name.contains(w)) {
        return None;
    }
    Some(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fax_queries_widen() {
        let queries = owner_queries("02-2148-5039", ContactKind::Fax);
        assert_eq!(queries.len(), 5);
        assert_eq!(queries[0], "\"02-2148-5039\" 팩스번호");
        assert_eq!(queries[4], "\"02-2148-5039\"");
        assert_eq!(
            owner_queries("02-2148-5033", ContactKind::Phone),
            vec!["\"02-2148-5033\" 전화번호"]
        );
    }

    #[test]
    fn test_keyword_name_next_to_number() {
        let text = "종로구 안내\n청운효자동 주민센터 팩스 02-2148-5039\n사직동주민센터 02-2148-5044";
        assert_eq!(
            find_owner_name(text, "02-2148-5039").as_deref(),
            Some("청운효자동주민센터")
        );
        assert_eq!(
            find_owner_name(text, "0221485044").as_deref(),
            Some("사직동주민센터")
        );
    }

    #[test]
    fn test_only_lines_with_the_number_count() {
        let text = "종로구청 대표전화 02-2148-1114\n문의 02-2148-5039";
        assert_eq!(find_owner_name(text, "02-2148-5039"), None);
        assert_eq!(find_owner_name(text, "02-2148-1114").as_deref(), Some("종로구청"));
        assert_eq!(find_owner_name(text, "1114"), None);
    }

    #[test]
    fn test_shape_fallback() {
        let text = "서울특별시 종로구 평창동 가나다복지관 02-391-0000";
        assert_eq!(
            find_owner_name(text, "02-391-0000").as_deref(),
            Some("가나다복지관")
        );
    }

    #[test]
    fn test_clean_name_reply() {
        assert_eq!(
            clean_name_reply(" \"서귀포시 송산동주민센터\"\n").as_deref(),
            Some("서귀포시 송산동주민센터")
        );
        assert_eq!(clean_name_reply("없음"), None);
        assert_eq!(clean_name_reply("검색결과 종로구청"), None);
        assert_eq!(clean_name_reply("The number belongs to Jongno-gu Office"), None);
        assert_eq!(clean_name_reply(""), None);
    }
}
