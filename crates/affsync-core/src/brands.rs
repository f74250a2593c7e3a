use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::products::FeedSource;
use crate::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrandConfig {
    pub name: String,
    pub feed: FeedSource,
    /// Advertiser id for CJ brands, program id for Pepperjam brands.
    pub account_id: String,
    /// Default keyword filter applied when a run does not supply one.
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl BrandConfig {
    /// Generate a URL-safe slug from the brand name.
    #[must_use]
    pub fn slug(&self) -> String {
        slugify(&self.name)
    }
}

/// Lowercase, keep ASCII alphanumerics, and join words with single hyphens.
#[must_use]
pub fn slugify(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' {
                c
            } else if c.is_whitespace() {
                '-'
            } else {
                '\0'
            }
        })
        .filter(|&c| c != '\0')
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

#[derive(Debug, Deserialize)]
pub struct BrandsFile {
    pub brands: Vec<BrandConfig>,
}

/// Load and validate the brands configuration from a YAML file.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or fails validation.
pub fn load_brands(path: &Path) -> Result<BrandsFile, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::BrandsFileIo {
        path: path.display().to_string(),
        source: e,
    })?;

    parse_brands(&content)
}

/// Parse and validate brands YAML already in memory.
///
/// # Errors
///
/// Returns `ConfigError` if the YAML is malformed or fails validation.
pub fn parse_brands(content: &str) -> Result<BrandsFile, ConfigError> {
    let brands_file: BrandsFile = serde_yaml::from_str(content)?;
    validate_brands(&brands_file)?;
    Ok(brands_file)
}

fn validate_brands(brands_file: &BrandsFile) -> Result<(), ConfigError> {
    let mut seen_names = HashSet::new();
    let mut seen_slugs = HashSet::new();

    for brand in &brands_file.brands {
        if brand.name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "brand name must be non-empty".to_string(),
            ));
        }

        if brand.account_id.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "brand '{}' has an empty account_id",
                brand.name
            )));
        }

        let slug = brand.slug();
        if slug.is_empty() {
            return Err(ConfigError::Validation(format!(
                "brand '{}' does not produce a usable slug",
                brand.name
            )));
        }

        if !seen_names.insert(brand.name.to_lowercase()) {
            return Err(ConfigError::Validation(format!(
                "duplicate brand name: '{}'",
                brand.name
            )));
        }

        if !seen_slugs.insert(slug.clone()) {
            return Err(ConfigError::Validation(format!(
                "duplicate brand slug: '{}' (from brand '{}')",
                slug, brand.name
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn brand(name: &str) -> BrandConfig {
        BrandConfig {
            name: name.to_string(),
            feed: FeedSource::Cj,
            account_id: "5550001".to_string(),
            keywords: Vec::new(),
        }
    }

    #[test]
    fn slug_simple_name() {
        assert_eq!(brand("Trail Co").slug(), "trail-co");
    }

    #[test]
    fn slug_special_characters() {
        assert_eq!(brand("Arnie's  Outdoor & Co.").slug(), "arnies-outdoor-co");
    }

    #[test]
    fn parses_valid_yaml() {
        let yaml = r"
brands:
  - name: Trail Co
    feed: cj
    account_id: '5550001'
    keywords: [hiking, boot]
  - name: Garden Goods
    feed: pepperjam
    account_id: '8123'
";
        let file = parse_brands(yaml).unwrap();
        assert_eq!(file.brands.len(), 2);
        assert_eq!(file.brands[0].feed, FeedSource::Cj);
        assert_eq!(file.brands[0].keywords, vec!["hiking", "boot"]);
        assert_eq!(file.brands[1].feed, FeedSource::Pepperjam);
        assert!(file.brands[1].keywords.is_empty());
    }

    #[test]
    fn rejects_unknown_feed() {
        let yaml = "brands:\n  - name: X\n    feed: rakuten\n    account_id: '1'\n";
        assert!(matches!(
            parse_brands(yaml),
            Err(ConfigError::BrandsFileParse(_))
        ));
    }

    #[test]
    fn rejects_duplicate_slugs() {
        let file = BrandsFile {
            brands: vec![brand("Trail Co"), brand("Trail  Co!")],
        };
        let err = validate_brands(&file).unwrap_err();
        assert!(
            matches!(err, ConfigError::Validation(ref m) if m.contains("duplicate brand slug")),
            "got: {err:?}"
        );
    }

    #[test]
    fn rejects_empty_account_id() {
        let mut b = brand("Trail Co");
        b.account_id = "  ".to_string();
        let file = BrandsFile { brands: vec![b] };
        assert!(matches!(
            validate_brands(&file),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn load_brands_reports_missing_file() {
        let err = load_brands(Path::new("/nonexistent/brands.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::BrandsFileIo { .. }));
    }
}
