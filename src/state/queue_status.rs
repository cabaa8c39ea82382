/// Queue status definitions for crawl work items
///
/// Items move pending → processing → {completed | failed}. Returning an item
/// to pending is an operator action and never happens on its own.
use std::fmt;

/// Represents the current status of a Frontier item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueStatus {
    /// Waiting to be picked up
    Pending,

    /// Claimed by the crawl loop; stays here if the run is interrupted
    Processing,

    /// Player cycle finished (possibly with degraded seasons)
    Completed,

    /// Player cycle aborted; waits for an explicit reset
    Failed,
}

impl QueueStatus {
    /// Checks whether the crawl loop may move an item from `self` to `next`
    ///
    /// Operator resets bypass this check on purpose; see `Frontier::reset_*`.
    pub fn can_transition_to(&self, next: QueueStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Processing)
                | (Self::Processing, Self::Completed)
                | (Self::Processing, Self::Failed)
        )
    }

    /// Statuses an item must currently be in to move to `next`
    pub fn predecessors(next: QueueStatus) -> &'static [QueueStatus] {
        match next {
            Self::Processing => &[Self::Pending],
            Self::Completed | Self::Failed => &[Self::Processing],
            Self::Pending => &[],
        }
    }

    /// Converts the status to its database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Parses a status from its database string representation
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Returns all possible statuses
    pub fn all() -> [Self; 4] {
        [
            Self::Pending,
            Self::Processing,
            Self::Completed,
            Self::Failed,
        ]
    }
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
