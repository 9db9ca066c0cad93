//! Batch persistence of aggregated quotes

use crate::quote::Quote;
use crate::storage::QuoteSink;

/// Outcome of one batch write
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PersistSummary {
    pub saved: u64,
    pub failed: u64,
}

/// Inserts every quote individually
///
/// A failed insert is logged and counted; it never stops the batch, and
/// there is no enclosing transaction.
pub fn persist_batch(sink: &mut dyn QuoteSink, quotes: &[Quote]) -> PersistSummary {
    let mut summary = PersistSummary::default();

    if quotes.is_empty() {
        tracing::info!("No quotes to save");
        return summary;
    }

    for quote in quotes {
        match sink.insert_quote(quote) {
            Ok(_) => summary.saved += 1,
            Err(e) => {
                summary.failed += 1;
                tracing::warn!("Failed to save quote {}: {}", quote.code, e);
            }
        }
    }

    tracing::info!(
        "Saved {} of {} quotes ({} failed)",
        summary.saved,
        quotes.len(),
        summary.failed
    );

    summary
}
