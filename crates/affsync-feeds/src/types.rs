//! Wire types for both affiliate feeds.
//!
//! Every field the feeds may omit is optional or defaulted so a sparse
//! record still deserializes; the normalizer decides what is required.

use affsync_core::FeedSource;
use serde::{Deserialize, Deserializer, Serialize};

// ---------------------------------------------------------------------------
// Feed A: CJ product search (GraphQL)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct CjGraphqlResponse {
    #[serde(default)]
    pub data: Option<CjData>,
    #[serde(default)]
    pub errors: Vec<CjGraphqlError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CjGraphqlError {
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CjData {
    #[serde(default)]
    pub products: Option<CjProductPage>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CjProductPage {
    #[serde(default)]
    pub total_count: u64,
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub result_list: Vec<CjProduct>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CjProduct {
    #[serde(deserialize_with = "string_or_number")]
    pub id: Option<String>,
    #[serde(deserialize_with = "string_or_number")]
    pub advertiser_id: Option<String>,
    pub advertiser_name: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub brand: Option<String>,
    pub price: Option<CjMoney>,
    pub sale_price: Option<CjMoney>,
    pub image_link: Option<String>,
    pub link: Option<String>,
    pub availability: Option<String>,
    pub google_product_category: Option<CjCategory>,
    pub product_type: Vec<String>,
    pub link_code: Option<CjLinkCode>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CjMoney {
    #[serde(deserialize_with = "string_or_number")]
    pub amount: Option<String>,
    pub currency: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CjCategory {
    #[serde(deserialize_with = "string_or_number")]
    pub id: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CjLinkCode {
    pub click_url: Option<String>,
}

// ---------------------------------------------------------------------------
// Feed B: Pepperjam publisher product creatives (REST)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct PepperjamResponse {
    pub meta: PepperjamMeta,
    #[serde(default)]
    pub data: Vec<PepperjamProduct>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PepperjamMeta {
    pub status: PepperjamStatus,
    #[serde(default)]
    pub pagination: Option<PepperjamPagination>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PepperjamStatus {
    pub code: u16,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PepperjamPagination {
    pub total_results: Option<u64>,
    pub total_pages: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PepperjamProduct {
    #[serde(deserialize_with = "string_or_number")]
    pub id: Option<String>,
    #[serde(deserialize_with = "string_or_number")]
    pub program_id: Option<String>,
    pub program_name: Option<String>,
    pub name: Option<String>,
    pub manufacturer: Option<String>,
    pub description_long: Option<String>,
    pub description_short: Option<String>,
    #[serde(deserialize_with = "string_or_number")]
    pub price: Option<String>,
    #[serde(deserialize_with = "string_or_number")]
    pub price_sale: Option<String>,
    pub currency: Option<String>,
    pub currency_symbol: Option<String>,
    pub buy_url: Option<String>,
    pub image_url: Option<String>,
    pub stock_availability: Option<String>,
    pub categories: Vec<PepperjamCategory>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PepperjamCategory {
    pub name: Option<String>,
}

impl PepperjamProduct {
    /// Natural identity for dedup: the record id, falling back to the name.
    #[must_use]
    pub fn dedup_key(&self) -> Option<String> {
        non_blank(self.id.as_deref()).or_else(|| non_blank(self.name.as_deref()))
    }
}

// ---------------------------------------------------------------------------
// Feed-agnostic raw record
// ---------------------------------------------------------------------------

/// A feed record kept as fetched, for snapshots and matching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "feed", rename_all = "lowercase")]
pub enum RawRecord {
    Cj(CjProduct),
    Pepperjam(PepperjamProduct),
}

impl RawRecord {
    #[must_use]
    pub fn feed(&self) -> FeedSource {
        match self {
            RawRecord::Cj(_) => FeedSource::Cj,
            RawRecord::Pepperjam(_) => FeedSource::Pepperjam,
        }
    }

    /// The feed's natural record id.
    #[must_use]
    pub fn record_id(&self) -> Option<String> {
        match self {
            RawRecord::Cj(p) => non_blank(p.id.as_deref()),
            RawRecord::Pepperjam(p) => p.dedup_key(),
        }
    }

    #[must_use]
    pub fn title(&self) -> &str {
        match self {
            RawRecord::Cj(p) => p.title.as_deref().unwrap_or_default(),
            RawRecord::Pepperjam(p) => p.name.as_deref().unwrap_or_default(),
        }
    }

    #[must_use]
    pub fn description(&self) -> &str {
        match self {
            RawRecord::Cj(p) => p.description.as_deref().unwrap_or_default(),
            RawRecord::Pepperjam(p) => p
                .description_long
                .as_deref()
                .or(p.description_short.as_deref())
                .unwrap_or_default(),
        }
    }

    /// Advertiser (CJ) or program (Pepperjam) display name.
    #[must_use]
    pub fn merchant_name(&self) -> &str {
        match self {
            RawRecord::Cj(p) => p.advertiser_name.as_deref().unwrap_or_default(),
            RawRecord::Pepperjam(p) => p.program_name.as_deref().unwrap_or_default(),
        }
    }

    /// Product brand as listed by the feed, when it carries one.
    #[must_use]
    pub fn brand(&self) -> &str {
        match self {
            RawRecord::Cj(p) => p.brand.as_deref().unwrap_or_default(),
            RawRecord::Pepperjam(p) => p.manufacturer.as_deref().unwrap_or_default(),
        }
    }

    /// Serialize for storage as an opaque snapshot.
    ///
    /// # Errors
    ///
    /// Returns the serializer error; plain data structs should never hit it.
    pub fn to_snapshot(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    /// Restore a record from a stored snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error when the payload is not a recognised raw record.
    pub fn from_snapshot(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }
}

pub(crate) fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Accept JSON strings and numbers for id-like and price-like fields.
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}
