//! Sub-place qualifier extraction from stop titles
//!
//! "Namsan Cable Car" with base "Namsan" yields "cable car"; "경복궁 근정전" with
//! base "경복궁" yields "근정전". A title that only repeats the base name, or whose
//! remainder names no recognizable kind of place ("Introduction", "History"),
//! yields nothing.

use tourgen_common::text::name_tokens;

/// Latin-script words that mark a distinct sub-place
const PLACE_KEYWORDS: &[&str] = &[
    "gate", "hall", "pavilion", "tower", "station", "bridge", "museum", "temple", "shrine",
    "garden", "gardens", "pond", "lake", "square", "plaza", "cable", "market", "park",
    "street", "cathedral", "church", "chapel", "castle", "fortress", "wall", "observatory",
    "fountain", "palace", "courtyard", "pagoda", "statue", "monument", "library", "theatre",
    "theater", "arch", "quarter", "harbour", "harbor", "pier", "beach", "peak", "summit",
    "porte", "pont", "jardin", "musée", "église",
];

/// Trailing characters of CJK place names (gate, station, hall, pavilion, ...)
const CJK_SUFFIXES: &[char] = &[
    '문', '역', '전', '각', '루', '궁', '탑', '교', '관',
    '門', '駅', '站', '殿', '閣', '楼', '亭', '堂', '宮', '塔', '橋', '寺', '園', '池', '館', '台',
];

fn is_cjk(c: char) -> bool {
    matches!(c,
        '\u{1100}'..='\u{11FF}'
        | '\u{3040}'..='\u{30FF}'
        | '\u{3130}'..='\u{318F}'
        | '\u{4E00}'..='\u{9FFF}'
        | '\u{AC00}'..='\u{D7AF}')
}

fn is_place_token(token: &str) -> bool {
    if PLACE_KEYWORDS.contains(&token) {
        return true;
    }
    let mut chars = token.chars();
    match chars.next_back() {
        Some(last) => token.chars().count() >= 2 && is_cjk(last) && CJK_SUFFIXES.contains(&last),
        None => false,
    }
}

/// Sub-place qualifier named in `title` beyond the base name, if any
pub fn extract_qualifier(title: &str, base_name: &str) -> Option<String> {
    let base_tokens = name_tokens(base_name);
    let remainder: Vec<String> = name_tokens(title)
        .into_iter()
        .filter(|t| !base_tokens.contains(t))
        .filter(|t| !(t.chars().count() == 1 && t.is_ascii()))
        .collect();

    if remainder.iter().any(|t| is_place_token(t)) {
        Some(remainder.join(" "))
    } else {
        None
    }
}
