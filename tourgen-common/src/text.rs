//! Text normalization
//!
//! Normalized names are used as dedup keys inside one fact source and as the
//! persistence key for generated guides, so the rules must stay stable.

/// Normalize a place or subject name for equality matching
///
/// Lowercases, drops punctuation and symbols, and collapses whitespace runs into a
/// single space. Letters and digits from any script are kept, so Hangul, kana and
/// accented Latin survive unchanged apart from case folding.
pub fn normalize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_space = false;

    for ch in name.chars() {
        if ch.is_alphanumeric() {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.extend(ch.to_lowercase());
        } else {
            pending_space = true;
        }
    }

    out
}

/// Split a normalized name into tokens
pub fn name_tokens(name: &str) -> Vec<String> {
    normalize_name(name)
        .split(' ')
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// True if the two names share at least one normalized token, or one contains the other
///
/// Scripts without word spacing (e.g. "경복궁 근정전" vs "근정전") are covered by the
/// containment check.
pub fn names_overlap(a: &str, b: &str) -> bool {
    let na = normalize_name(a);
    let nb = normalize_name(b);
    if na.is_empty() || nb.is_empty() {
        return false;
    }
    if na.contains(&nb) || nb.contains(&na) {
        return true;
    }
    let tokens_b = name_tokens(&nb);
    name_tokens(&na).iter().any(|t| tokens_b.contains(t))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_collapses_case_and_punctuation() {
        assert_eq!(normalize_name("  Gyeongbok-gung  Palace! "), "gyeongbok gung palace");
        assert_eq!(normalize_name("경복궁"), "경복궁");
        assert_eq!(normalize_name("Musée du Louvre"), "musée du louvre");
        assert_eq!(normalize_name("..."), "");
    }

    #[test]
    fn test_normalize_equivalence() {
        assert_eq!(normalize_name("N Seoul Tower"), normalize_name("n-seoul  tower"));
    }

    #[test]
    fn test_names_overlap() {
        assert!(names_overlap("Namsan Cable Car", "namsan"));
        assert!(names_overlap("경복궁 근정전", "근정전"));
        assert!(!names_overlap("Louvre", "Namsan"));
        assert!(!names_overlap("", "Namsan"));
    }
}
