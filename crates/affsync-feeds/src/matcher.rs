//! Find the raw feed record a canonical product came from.
//!
//! Tiers are tried in order and the first tier with a hit wins:
//! exact source id, normalized title containment, brand plus token overlap,
//! then Jaccard similarity over longer tokens.

use std::collections::HashSet;
use std::sync::LazyLock;

use affsync_core::CanonicalProduct;
use regex::Regex;

use crate::types::RawRecord;

const OVERLAP_THRESHOLD: f64 = 0.3;
const FUZZY_THRESHOLD: f64 = 0.2;

static BRACKETED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\([^)]*\)|\[[^\]]*\]").expect("valid regex"));

/// Anything a product can be matched against.
pub trait MatchCandidate {
    fn candidate_id(&self) -> Option<String>;
    fn candidate_title(&self) -> &str;
    /// Advertiser or program name used by the brand-gated tiers.
    fn candidate_merchant(&self) -> &str;
}

impl MatchCandidate for RawRecord {
    fn candidate_id(&self) -> Option<String> {
        self.record_id()
    }

    fn candidate_title(&self) -> &str {
        self.title()
    }

    fn candidate_merchant(&self) -> &str {
        self.merchant_name()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MatchTier {
    ExactId,
    TitleContainment,
    BrandOverlap,
    Fuzzy(f64),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Match<'a, T> {
    pub record: &'a T,
    pub tier: MatchTier,
}

/// Best match for `product` among `records`, or `None`.
pub fn match_record<'a, T: MatchCandidate>(
    product: &CanonicalProduct,
    brand_name: &str,
    records: &'a [T],
) -> Option<Match<'a, T>> {
    let wanted_id = product.source_record_id.trim();
    if !wanted_id.is_empty() {
        if let Some(record) = records
            .iter()
            .find(|r| r.candidate_id().as_deref() == Some(wanted_id))
        {
            return Some(Match {
                record,
                tier: MatchTier::ExactId,
            });
        }
    }

    let title = normalize_title(&product.title);
    if !title.is_empty() {
        let contained = records.iter().find(|r| {
            let other = normalize_title(r.candidate_title());
            !other.is_empty() && (title.contains(&other) || other.contains(&title))
        });
        if let Some(record) = contained {
            return Some(Match {
                record,
                tier: MatchTier::TitleContainment,
            });
        }
    }

    let brand = brand_name.trim().to_lowercase();
    if brand.is_empty() {
        return None;
    }
    let branded: Vec<&T> = records
        .iter()
        .filter(|r| r.candidate_merchant().to_lowercase().contains(&brand))
        .collect();
    if branded.is_empty() {
        return None;
    }

    let wanted: Vec<&str> = title.split_whitespace().filter(|t| t.len() > 2).collect();
    if !wanted.is_empty() {
        let mut best: Option<(&T, f64)> = None;
        for record in &branded {
            let other = normalize_title(record.candidate_title());
            let tokens: Vec<&str> = other.split_whitespace().collect();
            let present = wanted
                .iter()
                .filter(|w| tokens.iter().any(|t| t.contains(*w)))
                .count();
            #[allow(clippy::cast_precision_loss)]
            let share = present as f64 / wanted.len() as f64;
            if share >= OVERLAP_THRESHOLD && best.is_none_or(|(_, s)| share > s) {
                best = Some((record, share));
            }
        }
        if let Some((record, _)) = best {
            return Some(Match {
                record,
                tier: MatchTier::BrandOverlap,
            });
        }
    }

    let mut best: Option<(&T, f64)> = None;
    for record in branded {
        let score = jaccard(&title, &normalize_title(record.candidate_title()));
        if score > FUZZY_THRESHOLD && best.is_none_or(|(_, s)| score > s) {
            best = Some((record, score));
        }
    }
    best.map(|(record, score)| Match {
        record,
        tier: MatchTier::Fuzzy(score),
    })
}

/// Lowercase, drop bracketed qualifiers, strip punctuation, collapse spaces.
/// A `.` between two digits survives so versions like `2.0` stay intact.
#[must_use]
pub fn normalize_title(title: &str) -> String {
    let lowered = title.to_lowercase();
    let unbracketed = BRACKETED.replace_all(&lowered, " ");
    let chars: Vec<char> = unbracketed.chars().collect();

    let mut out = String::with_capacity(chars.len());
    for (i, &c) in chars.iter().enumerate() {
        if c.is_alphanumeric() || c.is_whitespace() {
            out.push(c);
        } else if c == '\'' || c == '\u{2019}' {
            continue;
        } else if c == '.'
            && i > 0
            && chars[i - 1].is_ascii_digit()
            && chars.get(i + 1).is_some_and(char::is_ascii_digit)
        {
            out.push(c);
        } else {
            out.push(' ');
        }
    }

    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn jaccard(a: &str, b: &str) -> f64 {
    let left: HashSet<&str> = a.split_whitespace().filter(|t| t.len() > 3).collect();
    let right: HashSet<&str> = b.split_whitespace().filter(|t| t.len() > 3).collect();
    let union = left.union(&right).count();
    if union == 0 {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let score = left.intersection(&right).count() as f64 / union as f64;
    score
}
