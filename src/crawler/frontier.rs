//! Crawl frontier
//!
//! A persistent, priority-ordered queue of players to crawl. The frontier
//! owns the depth bound: candidates deeper than `max_depth` are dropped at
//! enqueue time and never handed out by `dequeue_next`.

use crate::state::QueueStatus;
use crate::storage::{EnqueueOutcome, FrontierStore, QueueItem, SqliteStorage, StorageResult};
use crate::{RallyError, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Snapshot for the operator status view
#[derive(Debug, Clone)]
pub struct FrontierSummary {
    pub by_status: HashMap<QueueStatus, u64>,
    pub by_depth: Vec<(u32, u64)>,
    pub recent_failures: Vec<QueueItem>,
}

impl FrontierSummary {
    /// Reads counts and the most recent failures straight from a store
    pub fn load(store: &impl FrontierStore, failure_limit: usize) -> StorageResult<Self> {
        Ok(Self {
            by_status: store.count_by_status()?,
            by_depth: store.count_by_depth()?,
            recent_failures: store.recent_failures(failure_limit)?,
        })
    }

    pub fn total(&self) -> u64 {
        self.by_status.values().sum()
    }

    pub fn count(&self, status: QueueStatus) -> u64 {
        self.by_status.get(&status).copied().unwrap_or(0)
    }
}

/// Depth-bounded work queue backed by the shared store
pub struct Frontier {
    storage: Arc<Mutex<SqliteStorage>>,
    max_depth: Option<u32>,
}

impl Frontier {
    /// `max_depth` of None means unlimited
    pub fn new(storage: Arc<Mutex<SqliteStorage>>, max_depth: Option<u32>) -> Self {
        Self { storage, max_depth }
    }

    fn lock(&self) -> Result<MutexGuard<'_, SqliteStorage>> {
        self.storage
            .lock()
            .map_err(|_| RallyError::Storage("storage lock poisoned".to_string()))
    }

    /// Adds a player, or leaves/resets an existing item per `force_reset`
    ///
    /// Candidates beyond the depth bound are skipped silently.
    pub fn enqueue(
        &self,
        player_id: i64,
        priority: i64,
        depth: u32,
        origin_id: Option<i64>,
        force_reset: bool,
    ) -> Result<EnqueueOutcome> {
        if let Some(max) = self.max_depth {
            if depth > max {
                tracing::trace!(
                    "Not queueing player {} at depth {} (max {})",
                    player_id,
                    depth,
                    max
                );
                return Ok(EnqueueOutcome::TooDeep);
            }
        }

        let outcome =
            self.lock()?
                .enqueue_item(player_id, priority, depth, origin_id, force_reset)?;
        if outcome == EnqueueOutcome::Inserted {
            tracing::debug!("Queued player {} at depth {}", player_id, depth);
        }
        Ok(outcome)
    }

    /// Highest-priority pending item, FIFO within a priority
    pub fn dequeue_next(&self) -> Result<Option<QueueItem>> {
        Ok(self.lock()?.next_pending(self.max_depth)?)
    }

    /// Claims an item; bumps attempts and stamps the attempt time
    pub fn mark_processing(&self, player_id: i64) -> Result<()> {
        Ok(self
            .lock()?
            .transition(player_id, QueueStatus::Processing, None)?)
    }

    pub fn mark_completed(&self, player_id: i64) -> Result<()> {
        Ok(self
            .lock()?
            .transition(player_id, QueueStatus::Completed, None)?)
    }

    /// Records the failure reason; the item waits for an operator reset
    pub fn mark_failed(&self, player_id: i64, reason: &str) -> Result<()> {
        Ok(self
            .lock()?
            .transition(player_id, QueueStatus::Failed, Some(reason))?)
    }

    /// Operator retry: failed → pending
    pub fn reset_failed(&self) -> Result<usize> {
        Ok(self.lock()?.reset_to_pending(QueueStatus::Failed)?)
    }

    /// Operator recovery after an interrupted run: processing → pending
    pub fn reset_stuck(&self) -> Result<usize> {
        Ok(self.lock()?.reset_to_pending(QueueStatus::Processing)?)
    }

    pub fn clear(&self) -> Result<usize> {
        Ok(self.lock()?.clear_queue()?)
    }

    pub fn summary(&self, failure_limit: usize) -> Result<FrontierSummary> {
        Ok(FrontierSummary::load(&*self.lock()?, failure_limit)?)
    }
}
