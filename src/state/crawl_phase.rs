/// Crawl phase definitions for tracking a single crawl invocation
///
/// A crawl moves `Idle -> PlanningPages -> Fetching -> Aggregating ->
/// Persisting -> Done`. Single-page crawls skip `PlanningPages`.
use crate::HarvestError;
use std::fmt;

/// Represents the current phase of a crawl invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrawlPhase {
    /// Nothing has started yet
    Idle,

    /// Fetching page 1 to derive the page count
    PlanningPages,

    /// Page tasks are in flight
    Fetching,

    /// All page tasks resolved (or the soft timeout elapsed)
    Aggregating,

    /// Writing the aggregate batch to storage
    Persisting,

    /// The batch has been handed to storage
    Done,
}

impl CrawlPhase {
    /// Returns true if `next` is a legal successor of this phase
    pub fn can_transition_to(&self, next: CrawlPhase) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::PlanningPages)
                | (Self::Idle, Self::Fetching)
                | (Self::PlanningPages, Self::Fetching)
                | (Self::PlanningPages, Self::Aggregating)
                | (Self::Fetching, Self::Aggregating)
                | (Self::Aggregating, Self::Persisting)
                | (Self::Persisting, Self::Done)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::PlanningPages => "planning_pages",
            Self::Fetching => "fetching",
            Self::Aggregating => "aggregating",
            Self::Persisting => "persisting",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for CrawlPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Tracks the phase of one crawl and rejects illegal transitions
#[derive(Debug, Clone)]
pub struct PhaseTracker {
    current: CrawlPhase,
}

impl Default for PhaseTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl PhaseTracker {
    pub fn new() -> Self {
        Self {
            current: CrawlPhase::Idle,
        }
    }

    pub fn current(&self) -> CrawlPhase {
        self.current
    }

    /// Moves to `next`, failing if the transition is not allowed
    pub fn advance(&mut self, next: CrawlPhase) -> Result<(), HarvestError> {
        if !self.current.can_transition_to(next) {
            return Err(HarvestError::InvalidTransition {
                from: self.current,
                to: next,
            });
        }

        tracing::debug!("Crawl phase {} -> {}", self.current, next);
        self.current = next;
        Ok(())
    }
}
