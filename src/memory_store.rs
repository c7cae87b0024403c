// ===============================
// src/memory_store.rs
// ===============================
//
// In-memory record stores + aggregate query, backing the `serve` API and tests.
// Aggregate selalu dihitung ulang dari record (tidak ada counter berjalan).
//
use ahash::AHashMap as HashMap;
use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use tokio::sync::RwLock;
use tracing::debug;

use crate::delta;
use crate::domain::{
    AggregationSnapshot, CategoryRecord, LedgerCategory, LoanRecord, MonthlyReport, NewLoan,
    NewMonthlyReport, NewRecord, PeriodKey,
};
use crate::error::StoreError;
use crate::store::{AggregateQuery, RecordStore, LOANS, REPORTS};

fn next_id(prefix: &str) -> String {
    let now = Utc::now().timestamp_nanos_opt().unwrap_or(0);
    format!("{}-{}-{}", prefix, now, rand::thread_rng().gen::<u32>())
}

#[derive(Debug, Default)]
struct Tables {
    // newest first
    entries: HashMap<LedgerCategory, Vec<CategoryRecord>>,
    loans: Vec<LoanRecord>,
    reports: Vec<MonthlyReport>,
}

fn remove_by_id<T>(rows: &mut Vec<T>, id: &str, id_of: impl Fn(&T) -> &str) -> bool {
    let before = rows.len();
    rows.retain(|r| id_of(r) != id);
    rows.len() != before
}

#[derive(Debug, Default)]
pub struct MemoryLedger {
    tables: RwLock<Tables>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryLedger {
    async fn create_entry(&self, category: LedgerCategory, record: &NewRecord) -> Result<CategoryRecord, StoreError> {
        record.validate()?;
        let row = CategoryRecord {
            id: next_id(category.id_prefix()),
            name: record.name.trim().to_string(),
            amount: record.amount,
            note: record.note.clone().filter(|n| !n.trim().is_empty()),
            date: record.date,
        };
        let mut t = self.tables.write().await;
        t.entries.entry(category).or_default().insert(0, row.clone());
        debug!(category = %category, id = %row.id, amount = row.amount, "entry stored");
        Ok(row)
    }

    async fn list_entries(&self, category: LedgerCategory, period: PeriodKey) -> Result<Vec<CategoryRecord>, StoreError> {
        let t = self.tables.read().await;
        Ok(t.entries
            .get(&category)
            .map(|rows| rows.iter().filter(|r| period.contains(r.date)).cloned().collect())
            .unwrap_or_default())
    }

    async fn delete_entry(&self, category: LedgerCategory, id: &str) -> Result<(), StoreError> {
        let mut t = self.tables.write().await;
        let removed = t
            .entries
            .get_mut(&category)
            .map(|rows| remove_by_id(rows, id, |r| r.id.as_str()))
            .unwrap_or(false);
        if !removed {
            return Err(StoreError::NotFound { resource: category.slug(), id: id.to_string() });
        }
        debug!(category = %category, %id, "entry deleted");
        Ok(())
    }

    async fn create_loan(&self, loan: &NewLoan) -> Result<LoanRecord, StoreError> {
        loan.validate()?;
        let row = LoanRecord {
            id: next_id("LOAN"),
            name: loan.name.trim().to_string(),
            amount: loan.amount,
            reason: loan.reason.clone().filter(|r| !r.trim().is_empty()),
            issue_date: loan.issue_date,
            kind: loan.kind,
        };
        self.tables.write().await.loans.insert(0, row.clone());
        Ok(row)
    }

    async fn list_loans(&self) -> Result<Vec<LoanRecord>, StoreError> {
        Ok(self.tables.read().await.loans.clone())
    }

    async fn delete_loan(&self, id: &str) -> Result<(), StoreError> {
        let mut t = self.tables.write().await;
        if !remove_by_id(&mut t.loans, id, |r| r.id.as_str()) {
            return Err(StoreError::NotFound { resource: LOANS, id: id.to_string() });
        }
        Ok(())
    }

    async fn create_report(&self, report: &NewMonthlyReport) -> Result<MonthlyReport, StoreError> {
        report.validate()?;
        let row = MonthlyReport {
            id: next_id("RPT"),
            month_name: report.month_name.trim().to_string(),
            total_sale: report.total_sale,
            items_cost_price: report.items_cost_price,
            items_purchased_price: report.items_purchased_price,
            shop_expense: report.shop_expense,
            total_profit: report.total_profit,
            available_profit: report.available_profit,
        };
        self.tables.write().await.reports.insert(0, row.clone());
        Ok(row)
    }

    async fn list_reports(&self) -> Result<Vec<MonthlyReport>, StoreError> {
        Ok(self.tables.read().await.reports.clone())
    }

    async fn delete_report(&self, id: &str) -> Result<(), StoreError> {
        let mut t = self.tables.write().await;
        if !remove_by_id(&mut t.reports, id, |r| r.id.as_str()) {
            return Err(StoreError::NotFound { resource: REPORTS, id: id.to_string() });
        }
        Ok(())
    }
}

#[async_trait]
impl AggregateQuery for MemoryLedger {
    async fn compute_snapshot(&self, period: PeriodKey) -> Result<AggregationSnapshot, StoreError> {
        let t = self.tables.read().await;
        let entries = t.entries.iter().flat_map(|(category, rows)| {
            rows.iter()
                .filter(move |r| period.contains(r.date))
                .map(move |r| (*category, r.amount))
        });
        Ok(delta::replay(entries)?)
    }
}
