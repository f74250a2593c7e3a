pub mod affiliate;
pub mod client;
pub mod error;
pub mod image;
pub mod keywords;
pub mod matcher;
pub mod normalize;
pub mod planner;
mod retry;
pub mod types;

pub use affiliate::{AffiliateLinkBuilder, LinkFormat};
pub use client::{
    build_connector, CjConnector, CjCredentials, FeedConnector, FeedFilter, FetchReport, Fetched,
    HttpSettings, PepperjamConnector, PepperjamCredentials,
};
pub use error::FeedError;
pub use image::{ImageCheckConfig, ImageChecker};
pub use matcher::{match_record, Match, MatchCandidate, MatchTier};
pub use normalize::{BrandContext, Normalizer, SkipReason};
pub use planner::{PageWindow, RateLimitPlanner, ValidatedWindow};
pub use types::RawRecord;
