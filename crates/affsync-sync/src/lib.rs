pub mod dedup;
pub mod error;
pub mod ingest;
pub mod machine;
#[cfg(any(test, feature = "test-support"))]
pub mod memory;
pub mod webhook;

#[cfg(test)]
pub(crate) mod test_support;

pub use dedup::{spawn_eviction, InMemoryEventCache};
pub use error::{IngestError, SyncError, WebhookError};
pub use ingest::{
    brand_context, configured_connectors, IngestionPipeline, ReconcileSummary, RunRequest,
};
pub use machine::{
    draft_collection_title, ImportOutcome, InventoryOutcome, PublishOutcome, Reconciled,
    SyncSettings, SyncStateMachine, UpdateOutcome,
};
#[cfg(any(test, feature = "test-support"))]
pub use memory::{MemoryCatalog, MemoryStore};
pub use webhook::{InboundWebhook, WebhookIngestor, WebhookOutcome, WebhookSettings};
