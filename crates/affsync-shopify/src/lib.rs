pub mod client;
pub mod error;
mod retry;
pub mod types;

pub use client::{ShopifyAdminClient, ShopifySettings};
pub use error::ShopifyError;
