//! Reconciliation pass reports

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of reconciliation pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassKind {
    Validation,
    Refresh,
}

impl fmt::Display for PassKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PassKind::Validation => write!(f, "validation"),
            PassKind::Refresh => write!(f, "refresh"),
        }
    }
}

/// Counters for one completed pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassReport {
    pub kind: PassKind,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,

    /// Identities looked at
    pub examined: usize,

    /// Identities sent through the eviction path
    pub evicted: usize,

    /// Identities whose tickers were updated
    pub renamed: usize,

    /// Access tokens replaced
    pub refreshed: usize,

    /// Tokens Discord reported as revoked
    pub revoked: usize,

    /// Individual step failures (logged, not fatal)
    pub failures: usize,

    /// Verdicts that matched no stored identity
    pub unmatched: usize,

    /// Pass stopped early at an identity boundary
    pub cancelled: bool,
}

impl PassReport {
    pub fn begin(kind: PassKind) -> Self {
        Self {
            kind,
            started_at: Utc::now(),
            finished_at: None,
            examined: 0,
            evicted: 0,
            renamed: 0,
            refreshed: 0,
            revoked: 0,
            failures: 0,
            unmatched: 0,
            cancelled: false,
        }
    }

    pub fn finish(mut self) -> Self {
        self.finished_at = Some(Utc::now());
        self
    }

    /// Number of guild or store mutations the pass attempted
    pub fn mutations(&self) -> usize {
        self.evicted + self.renamed + self.refreshed + self.revoked
    }
}
