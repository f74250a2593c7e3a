//! Tracked outbound link construction.
//!
//! Building a link never fails: anything unexpected degrades to the raw,
//! untracked product link.

use affsync_core::{AppConfig, FeedSource};
use reqwest::Url;

/// How the tracking network encodes the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkFormat {
    /// `{base}/links/{trackingId}/type/dlg/sid/{productId}/{destination}`
    DeepLinkPath,
    /// `{base}/t/{trackingId}?url={destination}&sid={productId}`
    RedirectQuery,
}

#[derive(Debug, Clone)]
pub struct AffiliateLinkBuilder {
    base: String,
    format: LinkFormat,
    tracking_id: Option<String>,
}

pub const CJ_TRACKING_BASE: &str = "https://www.anrdoezrs.net";
pub const PEPPERJAM_TRACKING_BASE: &str = "https://www.gopjn.com";

impl AffiliateLinkBuilder {
    #[must_use]
    pub fn new(base: impl Into<String>, format: LinkFormat, tracking_id: Option<String>) -> Self {
        Self {
            base: base.into(),
            format,
            tracking_id: tracking_id.filter(|id| !id.trim().is_empty()),
        }
    }

    /// The builder for `feed` using credentials from `config`.
    #[must_use]
    pub fn for_feed(feed: FeedSource, config: &AppConfig) -> Self {
        match feed {
            FeedSource::Cj => Self::new(
                CJ_TRACKING_BASE,
                LinkFormat::DeepLinkPath,
                config.cj_publisher_id.clone(),
            ),
            FeedSource::Pepperjam => Self::new(
                PEPPERJAM_TRACKING_BASE,
                LinkFormat::RedirectQuery,
                config.pepperjam_creative_id.clone(),
            ),
        }
    }

    fn tracking_host(&self) -> Option<String> {
        Url::parse(&self.base)
            .ok()
            .and_then(|u| u.host_str().map(str::to_ascii_lowercase))
    }

    /// Whether `url` already points at this builder's tracking host.
    #[must_use]
    pub fn is_tracked(&self, url: &str) -> bool {
        let Some(host) = self.tracking_host() else {
            return false;
        };
        Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_ascii_lowercase))
            .is_some_and(|h| h == host)
    }

    /// Build the tracked URL for `raw_link`, identifying the product by
    /// `product_id` (the SKU when known, else the source id).
    ///
    /// Returns `raw_link` unchanged when no tracking id is configured, the
    /// raw link is not an absolute http(s) URL, or the built URL does not
    /// land on the tracking host.
    #[must_use]
    pub fn build(&self, raw_link: &str, product_id: &str) -> String {
        let Some(tracking_id) = self.tracking_id.as_deref() else {
            return raw_link.to_string();
        };

        let destination = match Url::parse(raw_link.trim()) {
            Ok(u) if matches!(u.scheme(), "http" | "https") => u,
            _ => return raw_link.to_string(),
        };

        let built = match self.format {
            LinkFormat::DeepLinkPath => self.deep_link(tracking_id, product_id, &destination),
            LinkFormat::RedirectQuery => self.redirect_link(tracking_id, product_id, &destination),
        };

        match built {
            Some(url) if self.is_tracked(&url) => url,
            _ => {
                tracing::debug!(raw_link, "tracked link build failed, using raw link");
                raw_link.to_string()
            }
        }
    }

    fn deep_link(&self, tracking_id: &str, product_id: &str, destination: &Url) -> Option<String> {
        let mut url = Url::parse(&self.base).ok()?;
        url.path_segments_mut()
            .ok()?
            .pop_if_empty()
            .extend(["links", tracking_id, "type", "dlg", "sid", product_id]);
        Some(format!("{}/{}", url.as_str().trim_end_matches('/'), destination))
    }

    fn redirect_link(
        &self,
        tracking_id: &str,
        product_id: &str,
        destination: &Url,
    ) -> Option<String> {
        let mut url = Url::parse(&self.base).ok()?;
        url.path_segments_mut()
            .ok()?
            .pop_if_empty()
            .extend(["t", tracking_id]);
        url.query_pairs_mut()
            .append_pair("url", destination.as_str())
            .append_pair("sid", product_id);
        Some(url.to_string())
    }
}
