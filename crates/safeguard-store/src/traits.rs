//! Store trait definitions

use chrono::{DateTime, Local, NaiveDate};
use safeguard_util::PackageId;
use serde::{Deserialize, Serialize};

use crate::{AuditEvent, StoreResult};

/// Main store trait
pub trait Store: Send + Sync {
    // Audit log

    /// Append an audit event
    fn append_audit(&self, event: AuditEvent) -> StoreResult<()>;

    /// Get recent audit events, newest first
    fn get_recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>>;

    // Block log

    /// Record that `package` was blocked at `at`
    fn record_block(&self, package: &PackageId, at: DateTime<Local>) -> StoreResult<()>;

    /// Most recent blocks, newest first
    fn recent_blocks(&self, limit: usize) -> StoreResult<Vec<BlockRecord>>;

    /// Blocks with `start <= timestamp < end`, newest first
    fn blocks_between(
        &self,
        start: DateTime<Local>,
        end: DateTime<Local>,
    ) -> StoreResult<Vec<BlockRecord>>;

    /// Summary of one local calendar day
    fn block_stats_for_day(&self, day: NaiveDate) -> StoreResult<BlockStats>;

    /// Delete every block record
    fn clear_block_log(&self) -> StoreResult<()>;

    // Health

    /// Check if store is healthy
    fn is_healthy(&self) -> bool;
}

/// One row of the block log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRecord {
    pub id: i64,
    pub package: PackageId,
    pub timestamp: DateTime<Local>,
}

/// Per-day block summary for the settings screen
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockStats {
    pub total_blocks: u64,
    pub unique_packages: u64,
    /// Package blocked most often, with its count
    pub most_blocked: Option<(PackageId, u64)>,
}
