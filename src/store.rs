// ===============================
// src/store.rs
// ===============================
//
// Seams to the outside world. Record stores own individual transactions;
// the aggregate query service recomputes the four totals from them.
//
use async_trait::async_trait;

use crate::domain::{
    AggregationSnapshot, CategoryRecord, LedgerCategory, LoanRecord, MonthlyReport, NewLoan,
    NewMonthlyReport, NewRecord, PeriodKey,
};
use crate::error::StoreError;

pub const LOANS: &str = "loans";
pub const REPORTS: &str = "reports";

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn create_entry(&self, category: LedgerCategory, record: &NewRecord) -> Result<CategoryRecord, StoreError>;
    /// Newest first, restricted to `period`.
    async fn list_entries(&self, category: LedgerCategory, period: PeriodKey) -> Result<Vec<CategoryRecord>, StoreError>;
    async fn delete_entry(&self, category: LedgerCategory, id: &str) -> Result<(), StoreError>;

    async fn create_loan(&self, loan: &NewLoan) -> Result<LoanRecord, StoreError>;
    async fn list_loans(&self) -> Result<Vec<LoanRecord>, StoreError>;
    async fn delete_loan(&self, id: &str) -> Result<(), StoreError>;

    async fn create_report(&self, report: &NewMonthlyReport) -> Result<MonthlyReport, StoreError>;
    async fn list_reports(&self) -> Result<Vec<MonthlyReport>, StoreError>;
    async fn delete_report(&self, id: &str) -> Result<(), StoreError>;
}

/// Must be idempotent and side-effect free, always derived fresh from the
/// records of `period` (never from a persisted running counter).
#[async_trait]
pub trait AggregateQuery: Send + Sync {
    async fn compute_snapshot(&self, period: PeriodKey) -> Result<AggregationSnapshot, StoreError>;
}
