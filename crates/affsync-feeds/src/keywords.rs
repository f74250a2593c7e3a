//! Keyword filtering with OR semantics.

/// Split a comma-separated keyword list, dropping blanks.
#[must_use]
pub fn parse_keywords(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Return every keyword phrase that appears, case-insensitively, as a
/// substring of any of `fields`. Keywords keep their supplied spelling and
/// order; duplicates are reported once.
#[must_use]
pub fn matched_keywords(keywords: &[String], fields: &[&str]) -> Vec<String> {
    let haystacks: Vec<String> = fields.iter().map(|f| f.to_lowercase()).collect();
    let mut matched: Vec<String> = Vec::new();

    for keyword in keywords {
        let needle = keyword.trim().to_lowercase();
        if needle.is_empty() || matched.iter().any(|m| m.to_lowercase() == needle) {
            continue;
        }
        if haystacks.iter().any(|h| h.contains(&needle)) {
            matched.push(keyword.trim().to_string());
        }
    }

    matched
}

/// Apply the filter: `None` means the record is dropped. With no keywords
/// every record passes with an empty match list.
#[must_use]
pub fn keyword_filter(keywords: &[String], fields: &[&str]) -> Option<Vec<String>> {
    if keywords.iter().all(|k| k.trim().is_empty()) {
        return Some(Vec::new());
    }
    let matched = matched_keywords(keywords, fields);
    (!matched.is_empty()).then_some(matched)
}
