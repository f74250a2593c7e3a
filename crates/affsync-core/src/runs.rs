use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(RunStatus::Running),
            "completed" => Ok(RunStatus::Completed),
            "failed" => Ok(RunStatus::Failed),
            other => Err(CoreError::InvalidRunStatus(other.to_string())),
        }
    }
}

/// Parameters an ingestion run was launched with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunFilter {
    #[serde(default)]
    pub keywords: Vec<String>,
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
    pub max_pages: u32,
}

impl Default for RunFilter {
    fn default() -> Self {
        Self {
            keywords: Vec::new(),
            limit: 75,
            offset: 0,
            max_pages: 10,
        }
    }
}

/// Run-level statistics. Per-record failures land here instead of aborting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounts {
    pub found: u32,
    pub imported: u32,
    pub updated: u32,
    pub no_changes: u32,
    pub failed: u32,
    pub skipped_missing_data: u32,
    pub skipped_invalid_price: u32,
    pub skipped_invalid_image: u32,
    pub skipped_other: u32,
    pub skipped_keyword: u32,
}

impl RunCounts {
    #[must_use]
    pub fn skipped(&self) -> u32 {
        self.skipped_missing_data
            + self.skipped_invalid_price
            + self.skipped_invalid_image
            + self.skipped_other
            + self.skipped_keyword
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestionRun {
    pub id: Uuid,
    pub brand_id: Uuid,
    pub status: RunStatus,
    pub filter: RunFilter,
    pub counts: RunCounts,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl IngestionRun {
    #[must_use]
    pub fn start(brand_id: Uuid, filter: RunFilter) -> Self {
        Self {
            id: Uuid::new_v4(),
            brand_id,
            status: RunStatus::Running,
            filter,
            counts: RunCounts::default(),
            error_message: None,
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status != RunStatus::Running
    }

    /// Returns `false` without touching the run if it already finished.
    pub fn complete(&mut self, counts: RunCounts) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.status = RunStatus::Completed;
        self.counts = counts;
        self.completed_at = Some(Utc::now());
        true
    }

    /// Returns `false` without touching the run if it already finished.
    pub fn fail(&mut self, counts: RunCounts, message: impl Into<String>) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.status = RunStatus::Failed;
        self.counts = counts;
        self.error_message = Some(message.into());
        self.completed_at = Some(Utc::now());
        true
    }
}
