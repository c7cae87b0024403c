// ===============================
// src/state.rs (Aggregation State)
// ===============================
//
// Satu instance per sesi dashboard. Subscriber (layar/CLI) pakai
// `subscribe()` -> watch::Receiver; setiap perubahan nilai dikirim sekali.
//
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;

use crate::domain::{AggregationSnapshot, DeltaRow};
use crate::error::RefreshError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Freshness {
    /// Last applied refresh is the newest one issued.
    Fresh,
    /// Optimistic deltas or an in-flight refresh are not yet confirmed.
    Pending,
    /// The newest refresh failed; values are optimistic until one succeeds.
    Stale,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregationView {
    pub snapshot: AggregationSnapshot,
    pub applied_seq: u64,
    pub issued_seq: u64,
    /// Newest refresh that failed; staleness clears only past it.
    pub failed_seq: u64,
    pub freshness: Freshness,
    pub closed: bool,
    /// Optimistic rows not yet covered by an applied refresh, tagged with
    /// the `issued_seq` in force when each was applied.
    #[serde(skip)]
    unconfirmed: Vec<(u64, DeltaRow)>,
}

impl AggregationView {
    pub fn unconfirmed(&self) -> usize {
        self.unconfirmed.len()
    }
}

#[derive(Clone)]
pub struct AggregationState {
    tx: Arc<watch::Sender<AggregationView>>,
}

impl AggregationState {
    pub fn new(initial: AggregationSnapshot) -> Self {
        let (tx, _rx) = watch::channel(AggregationView {
            snapshot: initial,
            applied_seq: 0,
            issued_seq: 0,
            failed_seq: 0,
            freshness: Freshness::Pending,
            closed: false,
            unconfirmed: Vec::new(),
        });
        Self { tx: Arc::new(tx) }
    }

    pub fn read(&self) -> AggregationSnapshot {
        self.tx.borrow().snapshot
    }

    pub fn view(&self) -> AggregationView {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AggregationView> {
        self.tx.subscribe()
    }

    /// Field-wise add. Optimistic updates only.
    pub fn apply_delta(&self, row: &DeltaRow) -> bool {
        self.tx.send_if_modified(|v| {
            if v.closed {
                return false;
            }
            v.snapshot = v.snapshot.apply(row);
            v.unconfirmed.push((v.issued_seq, *row));
            if v.freshness == Freshness::Fresh {
                v.freshness = Freshness::Pending;
            }
            true
        })
    }

    /// Records that refresh `seq` has been sent.
    pub fn mark_issued(&self, seq: u64) {
        self.tx.send_if_modified(|v| {
            if v.closed || seq <= v.issued_seq {
                return false;
            }
            v.issued_seq = seq;
            if v.freshness == Freshness::Fresh {
                v.freshness = Freshness::Pending;
            }
            true
        });
    }

    /// Atomic full replacement from an authoritative response; last-write-wins
    /// on `seq`. Rows applied before `seq` was issued are covered by the
    /// response and dropped. Later rows are folded back on top.
    pub fn replace(&self, seq: u64, snapshot: AggregationSnapshot) -> Result<(), RefreshError> {
        let mut outcome = Ok(());
        self.tx.send_if_modified(|v| {
            if v.closed {
                outcome = Err(RefreshError::SessionClosed { seq });
                return false;
            }
            if seq <= v.applied_seq {
                outcome = Err(RefreshError::OrderingConflict { seq, applied: v.applied_seq });
                return false;
            }
            v.unconfirmed.retain(|(tag, _)| *tag >= seq);
            v.snapshot = v.unconfirmed.iter().fold(snapshot, |acc, (_, row)| acc.apply(row));
            v.applied_seq = seq;
            v.issued_seq = v.issued_seq.max(seq);
            v.freshness = if seq <= v.failed_seq {
                Freshness::Stale
            } else if seq >= v.issued_seq && v.unconfirmed.is_empty() {
                Freshness::Fresh
            } else {
                Freshness::Pending
            };
            true
        });
        outcome
    }

    /// Refresh `seq` failed. Ignored when something newer already landed.
    /// Only a refresh issued after `seq` clears the mark.
    pub fn mark_stale(&self, seq: u64) -> bool {
        self.tx.send_if_modified(|v| {
            if v.closed || seq <= v.applied_seq || seq <= v.failed_seq {
                return false;
            }
            v.failed_seq = seq;
            v.freshness = Freshness::Stale;
            true
        })
    }

    pub fn is_stale(&self) -> bool {
        self.tx.borrow().freshness == Freshness::Stale
    }

    /// Session teardown: later deltas and responses are dropped on arrival.
    pub fn close(&self) {
        self.tx.send_if_modified(|v| {
            let changed = !v.closed;
            v.closed = true;
            changed
        });
    }

    pub fn is_closed(&self) -> bool {
        self.tx.borrow().closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{LedgerCategory, MutationIntent};
    use crate::delta;

    fn snap(g: i64, i: i64, e: i64, p: i64) -> AggregationSnapshot {
        AggregationSnapshot { gross_sales: g, inventory_cost: i, shop_expense: e, available_profit: p }
    }

    #[test]
    fn replace_is_last_write_wins_by_seq() {
        let state = AggregationState::new(AggregationSnapshot::ZERO);
        state.mark_issued(1);
        state.mark_issued(2);
        state.replace(2, snap(10, 0, 0, 10)).unwrap();
        let err = state.replace(1, snap(99, 0, 0, 99)).unwrap_err();
        assert!(matches!(err, RefreshError::OrderingConflict { seq: 1, applied: 2 }));
        assert_eq!(state.read(), snap(10, 0, 0, 10));
        assert_eq!(state.view().freshness, Freshness::Fresh);
    }

    #[test]
    fn older_response_leaves_state_pending() {
        let state = AggregationState::new(AggregationSnapshot::ZERO);
        state.mark_issued(1);
        state.mark_issued(2);
        state.replace(1, snap(1, 0, 0, 1)).unwrap();
        assert_eq!(state.view().freshness, Freshness::Pending);
        state.replace(2, snap(2, 0, 0, 2)).unwrap();
        assert_eq!(state.view().freshness, Freshness::Fresh);
    }

    #[test]
    fn replace_supersedes_optimistic_deltas() {
        let state = AggregationState::new(AggregationSnapshot::ZERO);
        for _ in 0..5 {
            state.apply_delta(&delta::row(&MutationIntent::create(LedgerCategory::Sales, 40)));
        }
        assert_eq!(state.read().gross_sales, 200);
        state.mark_issued(1);
        state.replace(1, snap(40, 0, 0, 40)).unwrap();
        assert_eq!(state.read(), snap(40, 0, 0, 40));
    }

    #[test]
    fn stale_until_a_newer_refresh_lands() {
        let state = AggregationState::new(AggregationSnapshot::ZERO);
        state.mark_issued(1);
        state.replace(1, AggregationSnapshot::ZERO).unwrap();
        state.mark_issued(2);
        assert!(state.mark_stale(2));
        assert!(state.is_stale());
        // a failure older than what is applied does not count
        assert!(!state.mark_stale(1));
        state.mark_issued(3);
        assert!(state.is_stale());
        state.replace(3, snap(5, 0, 0, 5)).unwrap();
        assert!(!state.is_stale());
    }

    #[test]
    fn closed_state_ignores_everything() {
        let state = AggregationState::new(AggregationSnapshot::ZERO);
        state.close();
        assert!(!state.apply_delta(&delta::row(&MutationIntent::create(LedgerCategory::Expense, 1))));
        assert!(matches!(state.replace(1, snap(1, 1, 1, 1)), Err(RefreshError::SessionClosed { seq: 1 })));
        assert_eq!(state.read(), AggregationSnapshot::ZERO);
    }

    #[test]
    fn older_refresh_keeps_rows_applied_after_it_was_issued() {
        let state = AggregationState::new(AggregationSnapshot::ZERO);
        let sale = |n| delta::row(&MutationIntent::create(LedgerCategory::Sales, n));
        state.apply_delta(&sale(100));
        state.mark_issued(1);
        state.apply_delta(&sale(50));
        state.mark_issued(2);
        assert!(state.mark_stale(2));

        // #1 was computed before the second sale was written
        state.replace(1, snap(100, 0, 0, 100)).unwrap();
        assert_eq!(state.read(), snap(150, 0, 0, 150));
        assert_eq!(state.view().freshness, Freshness::Stale);
        assert_eq!(state.view().unconfirmed(), 1);

        state.mark_issued(3);
        state.replace(3, snap(150, 0, 0, 150)).unwrap();
        assert_eq!(state.read(), snap(150, 0, 0, 150));
        assert_eq!(state.view().freshness, Freshness::Fresh);
        assert_eq!(state.view().unconfirmed(), 0);
    }

    #[test]
    fn row_applied_after_the_last_issue_keeps_state_pending() {
        let state = AggregationState::new(AggregationSnapshot::ZERO);
        state.mark_issued(1);
        state.apply_delta(&delta::row(&MutationIntent::create(LedgerCategory::Expense, 30)));
        state.replace(1, AggregationSnapshot::ZERO).unwrap();
        assert_eq!(state.read(), snap(0, 0, 30, -30));
        assert_eq!(state.view().freshness, Freshness::Pending);
    }

    #[tokio::test]
    async fn subscribers_see_every_change() {
        let state = AggregationState::new(AggregationSnapshot::ZERO);
        let mut rx = state.subscribe();
        state.apply_delta(&delta::row(&MutationIntent::create(LedgerCategory::Sales, 7)));
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().snapshot.gross_sales, 7);
    }
}
