// ===============================
// src/controller.rs (Category Controllers)
// ===============================
//
// Setiap controller memegang satu record store + list lokal (terbaru di
// depan). Intent baru dikirim ke engine SETELAH tulis ke store sukses; delete
// selalu memakai amount yang tersimpan di record, bukan input user.
//
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::domain::{
    self, CategoryRecord, LedgerCategory, LoanKind, LoanRecord, Money, MonthlyReport,
    MutationIntent, NewLoan, NewMonthlyReport, NewRecord,
};
use crate::engine::{Reconciliation, ReconciliationEngine};
use crate::error::{LedgerError, StoreError};
use crate::store::{RecordStore, LOANS, REPORTS};

/// A durable write plus what the engine made of it.
#[derive(Debug)]
pub struct Committed<R> {
    pub record: R,
    pub reconciliation: Reconciliation,
}

fn write_failed(resource: &'static str, source: StoreError) -> LedgerError {
    error!(resource, error = %source, "store write failed; aggregate untouched");
    LedgerError::StoreWrite { resource, source }
}

fn gone(resource: &'static str, id: &str) -> LedgerError {
    LedgerError::NotFound { resource, id: id.to_string() }
}

// -----------------------------------------------------------------------------
// Inventory cost / expense / sales
// -----------------------------------------------------------------------------
pub struct EntryController {
    category: LedgerCategory,
    store: Arc<dyn RecordStore>,
    engine: ReconciliationEngine,
    records: RwLock<Vec<CategoryRecord>>,
}

impl EntryController {
    pub fn new(category: LedgerCategory, store: Arc<dyn RecordStore>, engine: ReconciliationEngine) -> Self {
        Self { category, store, engine, records: RwLock::new(Vec::new()) }
    }

    pub fn category(&self) -> LedgerCategory {
        self.category
    }

    /// Reloads the open period's records from the store.
    pub async fn load(&self) -> Result<Vec<CategoryRecord>, LedgerError> {
        let rows = self
            .store
            .list_entries(self.category, self.engine.period())
            .await
            .map_err(|source| LedgerError::StoreRead { resource: self.category.slug(), source })?;
        *self.records.write().await = rows.clone();
        Ok(rows)
    }

    pub async fn records(&self) -> Vec<CategoryRecord> {
        self.records.read().await.clone()
    }

    /// Sum of the listed records ("spent on stock this month").
    pub async fn total(&self) -> Money {
        domain::total(self.records.read().await.iter().map(|r| r.amount))
    }

    pub async fn create(&self, form: NewRecord) -> Result<Committed<CategoryRecord>, LedgerError> {
        form.validate()?;
        let record = self
            .store
            .create_entry(self.category, &form)
            .await
            .map_err(|e| write_failed(self.category.slug(), e))?;
        info!(category = %self.category, id = %record.id, amount = record.amount, "record created");

        if self.engine.period().contains(record.date) {
            self.records.write().await.insert(0, record.clone());
        }
        let reconciliation = self
            .engine
            .reconcile(MutationIntent::create(self.category, record.amount))
            .await?;
        Ok(Committed { record, reconciliation })
    }

    pub async fn delete(&self, id: &str) -> Result<Committed<CategoryRecord>, LedgerError> {
        let record = self.find(id).await?;
        match self.store.delete_entry(self.category, id).await {
            Ok(()) => {}
            Err(StoreError::NotFound { .. }) => {
                // removed elsewhere; our write never happened so no intent
                warn!(category = %self.category, %id, "record already gone");
                self.forget(id).await;
                return Err(gone(self.category.slug(), id));
            }
            Err(e) => return Err(write_failed(self.category.slug(), e)),
        }
        self.forget(id).await;
        info!(category = %self.category, %id, amount = record.amount, "record deleted");

        let reconciliation = self
            .engine
            .reconcile(MutationIntent::delete(self.category, record.amount))
            .await?;
        Ok(Committed { record, reconciliation })
    }

    /// Cached copy first, one reload otherwise.
    async fn find(&self, id: &str) -> Result<CategoryRecord, LedgerError> {
        if let Some(r) = self.records.read().await.iter().find(|r| r.id == id) {
            return Ok(r.clone());
        }
        self.load()
            .await?
            .into_iter()
            .find(|r| r.id == id)
            .ok_or_else(|| gone(self.category.slug(), id))
    }

    async fn forget(&self, id: &str) {
        self.records.write().await.retain(|r| r.id != id);
    }
}

// -----------------------------------------------------------------------------
// Loans: own list only, never emit a mutation intent
// -----------------------------------------------------------------------------
pub struct LoanController {
    store: Arc<dyn RecordStore>,
    loans: RwLock<Vec<LoanRecord>>,
}

impl LoanController {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store, loans: RwLock::new(Vec::new()) }
    }

    pub async fn load(&self) -> Result<Vec<LoanRecord>, LedgerError> {
        let rows = self
            .store
            .list_loans()
            .await
            .map_err(|source| LedgerError::StoreRead { resource: LOANS, source })?;
        *self.loans.write().await = rows.clone();
        Ok(rows)
    }

    pub async fn records(&self, kind: LoanKind) -> Vec<LoanRecord> {
        self.loans.read().await.iter().filter(|l| l.kind == kind).cloned().collect()
    }

    pub async fn amount_due(&self, kind: LoanKind) -> Money {
        domain::total(self.loans.read().await.iter().filter(|l| l.kind == kind).map(|l| l.amount))
    }

    pub async fn create(&self, form: NewLoan) -> Result<LoanRecord, LedgerError> {
        form.validate()?;
        let loan = self.store.create_loan(&form).await.map_err(|e| write_failed(LOANS, e))?;
        info!(id = %loan.id, kind = ?loan.kind, amount = loan.amount, "loan recorded");
        self.loans.write().await.insert(0, loan.clone());
        Ok(loan)
    }

    pub async fn delete(&self, id: &str) -> Result<(), LedgerError> {
        let res = self.store.delete_loan(id).await;
        if matches!(res, Ok(()) | Err(StoreError::NotFound { .. })) {
            self.loans.write().await.retain(|l| l.id != id);
        }
        match res {
            Ok(()) => Ok(()),
            Err(StoreError::NotFound { .. }) => Err(gone(LOANS, id)),
            Err(e) => Err(write_failed(LOANS, e)),
        }
    }
}

// -----------------------------------------------------------------------------
// Monthly archive
// -----------------------------------------------------------------------------
pub struct ReportController {
    store: Arc<dyn RecordStore>,
    engine: ReconciliationEngine,
    reports: RwLock<Vec<MonthlyReport>>,
}

impl ReportController {
    pub fn new(store: Arc<dyn RecordStore>, engine: ReconciliationEngine) -> Self {
        Self { store, engine, reports: RwLock::new(Vec::new()) }
    }

    pub async fn load(&self) -> Result<Vec<MonthlyReport>, LedgerError> {
        let rows = self
            .store
            .list_reports()
            .await
            .map_err(|source| LedgerError::StoreRead { resource: REPORTS, source })?;
        *self.reports.write().await = rows.clone();
        Ok(rows)
    }

    pub async fn records(&self) -> Vec<MonthlyReport> {
        self.reports.read().await.clone()
    }

    pub async fn create(&self, form: NewMonthlyReport) -> Result<MonthlyReport, LedgerError> {
        form.validate()?;
        let report = self.store.create_report(&form).await.map_err(|e| write_failed(REPORTS, e))?;
        info!(id = %report.id, month = %report.month_name, "month archived");
        self.reports.write().await.insert(0, report.clone());
        Ok(report)
    }

    /// Archives the open period from freshly reconciled totals. Refuses to
    /// archive optimistic numbers when the aggregate cannot be recomputed.
    pub async fn close_month(&self, month_name: &str) -> Result<MonthlyReport, LedgerError> {
        if let Err(e) = self.engine.refresh().await {
            if e.leaves_stale() || self.engine.state().is_closed() {
                return Err(e.into());
            }
        }
        let stock = self
            .store
            .list_entries(LedgerCategory::InventoryCost, self.engine.period())
            .await
            .map_err(|source| LedgerError::StoreRead { resource: LedgerCategory::InventoryCost.slug(), source })?;
        let purchased = domain::total(stock.iter().map(|r| r.amount));
        let snapshot = self.engine.state().read();
        self.create(NewMonthlyReport::from_snapshot(month_name, &snapshot, purchased)).await
    }

    pub async fn delete(&self, id: &str) -> Result<(), LedgerError> {
        let res = self.store.delete_report(id).await;
        if matches!(res, Ok(()) | Err(StoreError::NotFound { .. })) {
            self.reports.write().await.retain(|r| r.id != id);
        }
        match res {
            Ok(()) => Ok(()),
            Err(StoreError::NotFound { .. }) => Err(gone(REPORTS, id)),
            Err(e) => Err(write_failed(REPORTS, e)),
        }
    }
}
