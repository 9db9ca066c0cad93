/// Page state definitions for tracking page tasks within a crawl
///
/// Each page of the listing gets its own task; a failed or abandoned task
/// never moves the crawl as a whole out of the fetching phase.
use std::fmt;

/// Represents the current state of one page task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageState {
    // ===== Active States =====
    /// Task is dispatched and waiting for, or holding, an admission permit
    Queued,

    /// Page is being fetched by the coordinator itself (including retry waits)
    Fetching,

    // ===== Terminal States =====
    /// Page was fetched and parsed; it may still have yielded zero quotes
    Completed,

    /// Retries were exhausted, the upstream rejected the page, or the wait was interrupted
    Failed,

    /// Cut off by the soft timeout or a shutdown, or never dispatched
    Abandoned,
}

impl PageState {
    /// Returns true if this is a terminal state
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Queued | Self::Fetching)
    }

    /// Returns true if the page contributed its records
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Converts the page state to its string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Fetching => "fetching",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Abandoned => "abandoned",
        }
    }
}

impl fmt::Display for PageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
