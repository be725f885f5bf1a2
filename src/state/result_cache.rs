use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::types::{ResultSnapshot, ScanEntry, ScanOutcome};

// ---------------------------------------------------------------------------
// ResultCache
// ---------------------------------------------------------------------------

/// Latest published results, swapped whole on every commit.
///
/// Readers clone the `Arc` under a read lock and never see a half-built
/// snapshot. The scheduler is the only writer; the write lock is held just
/// long enough to replace the pointer.
#[derive(Debug, Default)]
pub struct ResultCache {
    current: RwLock<Arc<ResultSnapshot>>,
}

impl ResultCache {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn snapshot(&self) -> Arc<ResultSnapshot> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Publish one cycle's outcomes as the new snapshot.
    ///
    /// Scans that failed keep their previous rows with the error attached.
    /// Scans absent from `outcomes` (no longer active) are dropped.
    pub fn commit(
        &self,
        cycle: u64,
        outcomes: BTreeMap<String, ScanOutcome>,
        now_secs: u64,
    ) -> Arc<ResultSnapshot> {
        let previous = self.snapshot();
        let all_ok = outcomes.values().all(|o| o.is_ok());

        let scans = outcomes
            .into_iter()
            .map(|(name, outcome)| {
                let entry = match outcome {
                    Ok(scan) => ScanEntry {
                        rows: scan.rows,
                        dropped_rows: scan.dropped_rows,
                        rows_cycle: cycle,
                        error: None,
                    },
                    Err(error) => {
                        let last_good = previous.scans.get(&name).cloned().unwrap_or_default();
                        ScanEntry { error: Some(error), ..last_good }
                    }
                };
                (name, entry)
            })
            .collect();

        let next = Arc::new(ResultSnapshot {
            cycle,
            committed_at: Some(now_secs),
            last_success_at: if all_ok { Some(now_secs) } else { previous.last_success_at },
            scans,
        });

        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::clone(&next);
        next
    }
}
