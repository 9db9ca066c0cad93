//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `CrawlPhase`: Phase of one crawl invocation, with a `PhaseTracker` that enforces legal transitions
//! - `PageState`: Outcome of an individual page task (queued, fetching, completed, failed, abandoned)

mod crawl_phase;
mod page_state;

// Re-export main types
pub use crawl_phase::{CrawlPhase, PhaseTracker};
pub use page_state::PageState;
