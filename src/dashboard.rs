// ===============================
// src/dashboard.rs
// ===============================
//
// Composition root for one operator session: exactly one AggregationState,
// one engine handle injected into every controller.
//
use std::sync::Arc;

use futures_util::future::join_all;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::controller::{EntryController, LoanController, ReportController};
use crate::domain::{AggregationSnapshot, LedgerCategory, Money, PeriodKey};
use crate::engine::{ReconciliationEngine, RetryPolicy};
use crate::state::{AggregationState, AggregationView, Freshness};
use crate::store::{AggregateQuery, RecordStore};

/// What the navbar shows: stored totals plus the derived figures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub period: PeriodKey,
    #[serde(flatten)]
    pub snapshot: AggregationSnapshot,
    pub amount_in_hand: Money,
    pub total_profit: Money,
    /// Some total is below zero; shown as is until the next refresh.
    pub has_negative: bool,
    pub freshness: Freshness,
}

impl Summary {
    pub fn new(period: PeriodKey, view: &AggregationView) -> Self {
        Self {
            period,
            snapshot: view.snapshot,
            amount_in_hand: view.snapshot.amount_in_hand(),
            total_profit: view.snapshot.total_profit(),
            has_negative: view.snapshot.has_negative(),
            freshness: view.freshness,
        }
    }
}

pub struct Dashboard {
    engine: ReconciliationEngine,
    pub inventory: EntryController,
    pub expenses: EntryController,
    pub sales: EntryController,
    pub loans: LoanController,
    pub reports: ReportController,
}

impl Dashboard {
    /// Starts zeroed, then pulls the authoritative snapshot and every list.
    /// Load failures are logged; the session still opens.
    pub async fn open(
        store: Arc<dyn RecordStore>,
        query: Arc<dyn AggregateQuery>,
        period: PeriodKey,
        policy: RetryPolicy,
    ) -> Self {
        let dash = Self::new(store, query, period, policy);
        if let Err(e) = dash.engine.refresh().await {
            warn!(error = %e, "initial aggregate unavailable");
        }

        let lists = [&dash.inventory, &dash.expenses, &dash.sales];
        let loaded = join_all(lists.iter().map(|c| c.load())).await;
        for (c, res) in lists.iter().zip(loaded) {
            if let Err(e) = res {
                warn!(category = %c.category(), error = %e, "list load failed");
            }
        }
        let (loans, reports) = tokio::join!(dash.loans.load(), dash.reports.load());
        if let Err(e) = loans {
            warn!(error = %e, "loan list load failed");
        }
        if let Err(e) = reports {
            warn!(error = %e, "report list load failed");
        }

        info!(%period, freshness = ?dash.view().freshness, "dashboard open");
        dash
    }

    /// Wires the session without touching the network.
    pub fn new(
        store: Arc<dyn RecordStore>,
        query: Arc<dyn AggregateQuery>,
        period: PeriodKey,
        policy: RetryPolicy,
    ) -> Self {
        let state = AggregationState::new(AggregationSnapshot::ZERO);
        let engine = ReconciliationEngine::new(state, query, period, policy);
        Self {
            inventory: EntryController::new(LedgerCategory::InventoryCost, store.clone(), engine.clone()),
            expenses: EntryController::new(LedgerCategory::Expense, store.clone(), engine.clone()),
            sales: EntryController::new(LedgerCategory::Sales, store.clone(), engine.clone()),
            loans: LoanController::new(store.clone()),
            reports: ReportController::new(store, engine.clone()),
            engine,
        }
    }

    pub fn entries(&self, category: LedgerCategory) -> &EntryController {
        match category {
            LedgerCategory::InventoryCost => &self.inventory,
            LedgerCategory::Expense => &self.expenses,
            LedgerCategory::Sales => &self.sales,
        }
    }

    pub fn engine(&self) -> &ReconciliationEngine {
        &self.engine
    }

    pub fn snapshot(&self) -> AggregationSnapshot {
        self.engine.state().read()
    }

    pub fn view(&self) -> AggregationView {
        self.engine.state().view()
    }

    pub fn summary(&self) -> Summary {
        Summary::new(self.engine.period(), &self.view())
    }

    pub fn subscribe(&self) -> watch::Receiver<AggregationView> {
        self.engine.state().subscribe()
    }

    pub fn teardown(&self) {
        self.engine.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::NewRecord;
    use crate::memory_store::MemoryLedger;
    use chrono::NaiveDate;

    fn period() -> PeriodKey {
        PeriodKey::new(2026, 10).unwrap()
    }

    #[tokio::test]
    async fn open_pulls_existing_state() {
        let store = Arc::new(MemoryLedger::new());
        let d = NaiveDate::from_ymd_opt(2026, 10, 12).unwrap();
        store.create_entry(LedgerCategory::Sales, &NewRecord::new("phone", 900, d)).await.unwrap();

        let dash = Dashboard::open(store.clone(), store.clone(), period(), RetryPolicy::default()).await;
        assert_eq!(dash.snapshot().gross_sales, 900);
        assert_eq!(dash.sales.records().await.len(), 1);
        assert_eq!(dash.view().freshness, Freshness::Fresh);
        let s = dash.summary();
        assert_eq!(s.amount_in_hand, 900);
        assert_eq!(s.total_profit, 900);
    }

    #[tokio::test]
    async fn all_controllers_share_one_state() {
        let store = Arc::new(MemoryLedger::new());
        let dash = Dashboard::open(store.clone(), store.clone(), period(), RetryPolicy::default()).await;
        let mut rx = dash.subscribe();
        let d = NaiveDate::from_ymd_opt(2026, 10, 1).unwrap();

        dash.sales.create(NewRecord::new("phone", 1_000, d)).await.unwrap();
        dash.expenses.create(NewRecord::new("bill", 100, d)).await.unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().snapshot, dash.snapshot());
        assert_eq!(dash.snapshot().available_profit, 900);
    }

    #[tokio::test]
    async fn summary_serializes_flat() {
        let store = Arc::new(MemoryLedger::new());
        let dash = Dashboard::new(store.clone(), store, period(), RetryPolicy::default());
        let v = serde_json::to_value(dash.summary()).unwrap();
        assert_eq!(v["period"], "2026-10");
        assert_eq!(v["grossSales"], 0);
        assert_eq!(v["amountInHand"], 0);
        assert_eq!(v["freshness"], "pending");
        assert_eq!(v["hasNegative"], false);
    }

    #[tokio::test]
    async fn summary_flags_negative_totals() {
        let store = Arc::new(MemoryLedger::new());
        let dash = Dashboard::open(store.clone(), store.clone(), period(), RetryPolicy::default()).await;
        let d = NaiveDate::from_ymd_opt(2026, 10, 3).unwrap();
        dash.inventory.create(NewRecord::new("stock", 800, d)).await.unwrap();
        let s = dash.summary();
        assert!(s.has_negative);
        assert_eq!(s.snapshot.inventory_cost, -800);
        assert_eq!(s.amount_in_hand, -800);
    }

    #[tokio::test]
    async fn teardown_keeps_writes_but_stops_updates() {
        let store = Arc::new(MemoryLedger::new());
        let dash = Dashboard::open(store.clone(), store.clone(), period(), RetryPolicy::default()).await;
        dash.teardown();
        let d = NaiveDate::from_ymd_opt(2026, 10, 1).unwrap();
        let done = dash.sales.create(NewRecord::new("late sale", 50, d)).await.unwrap();
        assert!(done.reconciliation.refresh.is_err());
        assert_eq!(dash.snapshot(), AggregationSnapshot::ZERO);
        assert_eq!(store.list_entries(LedgerCategory::Sales, period()).await.unwrap().len(), 1);
    }
}
