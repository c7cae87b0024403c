// ===============================
// src/domain.rs
// ===============================
use std::fmt;
use std::ops::{Add, Neg};
use std::str::FromStr;

use chrono::{Datelike, Local, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Whole currency units. Formatting is left to whoever renders it.
pub type Money = i64;

/// Open accounting period: one calendar month, `YYYY-MM` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PeriodKey {
    year: i32,
    month: u32,
}

impl PeriodKey {
    pub fn new(year: i32, month: u32) -> Result<Self, ValidationError> {
        if !(1..=12).contains(&month) || !(1..=9999).contains(&year) {
            return Err(ValidationError::InvalidPeriod(format!("{year}-{month}")));
        }
        Ok(Self { year, month })
    }

    pub fn current() -> Self {
        Self::of(Local::now().date_naive())
    }

    pub fn of(date: NaiveDate) -> Self {
        Self { year: date.year(), month: date.month() }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date.year() == self.year && date.month() == self.month
    }
}

impl fmt::Display for PeriodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for PeriodKey {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || ValidationError::InvalidPeriod(s.to_string());
        let (y, m) = s.trim().split_once('-').ok_or_else(bad)?;
        if y.len() != 4 || m.len() != 2 {
            return Err(bad());
        }
        let year = y.parse().map_err(|_| bad())?;
        let month = m.parse().map_err(|_| bad())?;
        Self::new(year, month).map_err(|_| bad())
    }
}

impl TryFrom<String> for PeriodKey {
    type Error = ValidationError;
    fn try_from(s: String) -> Result<Self, Self::Error> { s.parse() }
}

impl From<PeriodKey> for String {
    fn from(p: PeriodKey) -> String { p.to_string() }
}

// ---------------------------------------------------------------------------
// Aggregate
// ---------------------------------------------------------------------------

/// The four running totals of the open period.
///
/// Fields may be negative: inventory purchases are carried as outflows on
/// `inventory_cost` and `gross_sales`, and optimistic values may be ahead of
/// or behind the store until the next authoritative refresh.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregationSnapshot {
    pub gross_sales: Money,
    pub inventory_cost: Money,
    pub shop_expense: Money,
    pub available_profit: Money,
}

impl AggregationSnapshot {
    pub const ZERO: AggregationSnapshot = AggregationSnapshot {
        gross_sales: 0,
        inventory_cost: 0,
        shop_expense: 0,
        available_profit: 0,
    };

    /// Cash in the drawer.
    pub fn amount_in_hand(&self) -> Money {
        self.available_profit.saturating_add(self.inventory_cost)
    }

    pub fn total_profit(&self) -> Money {
        self.gross_sales.saturating_sub(self.inventory_cost)
    }

    pub fn has_negative(&self) -> bool {
        self.gross_sales < 0 || self.inventory_cost < 0 || self.shop_expense < 0 || self.available_profit < 0
    }

    /// Folds one delta-table row into the snapshot. Saturates at the `i64`
    /// bounds; optimistic values are replaced by the next refresh anyway.
    pub fn apply(&self, row: &DeltaRow) -> AggregationSnapshot {
        let d = row.delta;
        let next = AggregationSnapshot {
            gross_sales: self.gross_sales.saturating_add(d.gross_sales),
            inventory_cost: self.inventory_cost.saturating_add(d.inventory_cost),
            shop_expense: self.shop_expense.saturating_add(d.shop_expense),
            available_profit: self.available_profit.saturating_add(d.available_profit),
        };
        next.floored(row)
    }

    /// Like [`apply`](Self::apply) but `None` on overflow.
    pub fn checked_apply(&self, row: &DeltaRow) -> Option<AggregationSnapshot> {
        let d = row.delta;
        let next = AggregationSnapshot {
            gross_sales: self.gross_sales.checked_add(d.gross_sales)?,
            inventory_cost: self.inventory_cost.checked_add(d.inventory_cost)?,
            shop_expense: self.shop_expense.checked_add(d.shop_expense)?,
            available_profit: self.available_profit.checked_add(d.available_profit)?,
        };
        Some(next.floored(row))
    }

    fn floored(mut self, row: &DeltaRow) -> AggregationSnapshot {
        if row.floor_shop_expense && self.shop_expense < 0 {
            self.shop_expense = 0;
        }
        self
    }
}

/// Field-wise change to an [`AggregationSnapshot`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotDelta {
    pub gross_sales: Money,
    pub inventory_cost: Money,
    pub shop_expense: Money,
    pub available_profit: Money,
}

impl Neg for SnapshotDelta {
    type Output = SnapshotDelta;
    fn neg(self) -> SnapshotDelta {
        SnapshotDelta {
            gross_sales: -self.gross_sales,
            inventory_cost: -self.inventory_cost,
            shop_expense: -self.shop_expense,
            available_profit: -self.available_profit,
        }
    }
}

impl Add for SnapshotDelta {
    type Output = SnapshotDelta;
    fn add(self, o: SnapshotDelta) -> SnapshotDelta {
        SnapshotDelta {
            gross_sales: self.gross_sales.saturating_add(o.gross_sales),
            inventory_cost: self.inventory_cost.saturating_add(o.inventory_cost),
            shop_expense: self.shop_expense.saturating_add(o.shop_expense),
            available_profit: self.available_profit.saturating_add(o.available_profit),
        }
    }
}

/// One row of the delta table: the delta plus the `shop_expense` floor that
/// only an expense delete carries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeltaRow {
    pub delta: SnapshotDelta,
    pub floor_shop_expense: bool,
}

// ---------------------------------------------------------------------------
// Mutation intents
// ---------------------------------------------------------------------------

/// Ledger categories that move the aggregate. Loans are deliberately absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LedgerCategory {
    InventoryCost,
    Expense,
    Sales,
}

impl LedgerCategory {
    pub const ALL: [LedgerCategory; 3] =
        [LedgerCategory::InventoryCost, LedgerCategory::Expense, LedgerCategory::Sales];

    /// Path segment on the REST API.
    pub fn slug(&self) -> &'static str {
        match self {
            LedgerCategory::InventoryCost => "items-cost",
            LedgerCategory::Expense => "expenses",
            LedgerCategory::Sales => "sales",
        }
    }

    /// Label for logs / metrics.
    pub fn label(&self) -> &'static str {
        match self {
            LedgerCategory::InventoryCost => "inventory_cost",
            LedgerCategory::Expense => "expense",
            LedgerCategory::Sales => "sales",
        }
    }

    pub fn id_prefix(&self) -> &'static str {
        match self {
            LedgerCategory::InventoryCost => "INV",
            LedgerCategory::Expense => "EXP",
            LedgerCategory::Sales => "SAL",
        }
    }

    pub fn from_slug(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.slug() == s)
    }
}

impl fmt::Display for LedgerCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for LedgerCategory {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "items-cost" | "inventory_cost" | "inventory" | "cost" | "inv" => Ok(LedgerCategory::InventoryCost),
            "expenses" | "expense" | "exp" => Ok(LedgerCategory::Expense),
            "sales" | "sale" => Ok(LedgerCategory::Sales),
            other => Err(ValidationError::UnknownCategory(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    Create,
    Delete,
}

impl Operation {
    pub fn label(&self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Delete => "delete",
        }
    }
}

/// Emitted by a category controller only after its store write is durable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationIntent {
    pub category: LedgerCategory,
    pub operation: Operation,
    pub amount: Money,
}

impl MutationIntent {
    pub fn create(category: LedgerCategory, amount: Money) -> Self {
        Self { category, operation: Operation::Create, amount }
    }

    pub fn delete(category: LedgerCategory, amount: Money) -> Self {
        Self { category, operation: Operation::Delete, amount }
    }
}

// ---------------------------------------------------------------------------
// Records (owned by the stores)
// ---------------------------------------------------------------------------

/// Largest amount a single record may carry (minor units).
pub const MAX_AMOUNT: Money = 1_000_000_000_000_000;

pub fn validate_amount(amount: Money) -> Result<(), ValidationError> {
    if amount <= 0 {
        return Err(ValidationError::NonPositiveAmount(amount));
    }
    if amount > MAX_AMOUNT {
        return Err(ValidationError::AmountTooLarge(amount));
    }
    Ok(())
}

fn validate_name_amount(name: &str, amount: Money) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::EmptyName);
    }
    validate_amount(amount)
}

/// Saturating sum for list totals.
pub fn total<I: IntoIterator<Item = Money>>(amounts: I) -> Money {
    amounts.into_iter().fold(0, Money::saturating_add)
}

/// Strict `YYYY-MM-DD`.
pub fn parse_date(s: &str) -> Result<NaiveDate, ValidationError> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|_| ValidationError::InvalidDate(s.to_string()))
}

/// Inventory purchase, expense or sale as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryRecord {
    pub id: String,
    pub name: String,
    pub amount: Money,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub date: NaiveDate,
}

/// POST body for a ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRecord {
    pub name: String,
    pub amount: Money,
    pub date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl NewRecord {
    pub fn new(name: impl Into<String>, amount: Money, date: NaiveDate) -> Self {
        Self { name: name.into(), amount, date, note: None }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_name_amount(&self.name, self.amount)
    }
}

/// "given" = money owed to the shop, "taken" = money the shop owes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoanKind {
    #[default]
    Given,
    Taken,
}

impl FromStr for LoanKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "given" | "to_take" => Ok(LoanKind::Given),
            "taken" | "to_give" => Ok(LoanKind::Taken),
            other => Err(ValidationError::UnknownLoanKind(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoanRecord {
    pub id: String,
    pub name: String,
    pub amount: Money,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub issue_date: NaiveDate,
    // older records were saved without a kind
    #[serde(default, rename = "type")]
    pub kind: LoanKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewLoan {
    pub name: String,
    pub amount: Money,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub issue_date: NaiveDate,
    #[serde(default, rename = "type")]
    pub kind: LoanKind,
}

impl NewLoan {
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_name_amount(&self.name, self.amount)
    }
}

/// Archived month-level totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyReport {
    pub id: String,
    pub month_name: String,
    pub total_sale: Money,
    pub items_cost_price: Money,
    pub items_purchased_price: Money,
    pub shop_expense: Money,
    pub total_profit: Money,
    pub available_profit: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMonthlyReport {
    pub month_name: String,
    pub total_sale: Money,
    pub items_cost_price: Money,
    pub items_purchased_price: Money,
    pub shop_expense: Money,
    pub total_profit: Money,
    pub available_profit: Money,
}

impl NewMonthlyReport {
    /// Prefills a month record from a reconciled snapshot.
    pub fn from_snapshot(month_name: impl Into<String>, s: &AggregationSnapshot, purchased: Money) -> Self {
        Self {
            month_name: month_name.into(),
            total_sale: s.gross_sales,
            items_cost_price: s.inventory_cost,
            items_purchased_price: purchased,
            shop_expense: s.shop_expense,
            total_profit: s.total_profit(),
            available_profit: s.available_profit,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.month_name.trim().is_empty() {
            return Err(ValidationError::EmptyMonthName);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn period_key_parses_and_displays() {
        let p: PeriodKey = "2026-03".parse().unwrap();
        assert_eq!(p.to_string(), "2026-03");
        assert!(p.contains(NaiveDate::from_ymd_opt(2026, 3, 31).unwrap()));
        assert!(!p.contains(NaiveDate::from_ymd_opt(2026, 4, 1).unwrap()));
        assert!("2026-13".parse::<PeriodKey>().is_err());
        assert!("2026/03".parse::<PeriodKey>().is_err());
        assert!("26-3".parse::<PeriodKey>().is_err());
    }

    #[test]
    fn period_key_is_a_json_string() {
        let p = PeriodKey::new(2026, 10).unwrap();
        assert_eq!(serde_json::to_string(&p).unwrap(), "\"2026-10\"");
        let back: PeriodKey = serde_json::from_str("\"2026-10\"").unwrap();
        assert_eq!(back, p);
    }

    #[test]
    fn derived_figures() {
        let s = AggregationSnapshot { gross_sales: 9000, inventory_cost: -1000, shop_expense: 2000, available_profit: 8000 };
        assert_eq!(s.amount_in_hand(), 7000);
        assert_eq!(s.total_profit(), 10000);
        assert!(s.has_negative());
    }

    #[test]
    fn snapshot_uses_camel_case_on_the_wire() {
        let v = serde_json::to_value(AggregationSnapshot::ZERO).unwrap();
        for key in ["grossSales", "inventoryCost", "shopExpense", "availableProfit"] {
            assert!(v.get(key).is_some(), "missing {key}");
        }
    }

    #[test]
    fn loan_without_type_defaults_to_given() {
        let raw = r#"{"id":"L-1","name":"Ali","amount":300,"issueDate":"2026-10-01"}"#;
        let loan: LoanRecord = serde_json::from_str(raw).unwrap();
        assert_eq!(loan.kind, LoanKind::Given);
    }

    #[test]
    fn new_record_validation() {
        let d = NaiveDate::from_ymd_opt(2026, 10, 2).unwrap();
        assert_eq!(NewRecord::new("  ", 10, d).validate(), Err(ValidationError::EmptyName));
        assert_eq!(NewRecord::new("rent", 0, d).validate(), Err(ValidationError::NonPositiveAmount(0)));
        assert!(NewRecord::new("rent", 1, d).validate().is_ok());
        assert!(NewRecord::new("rent", MAX_AMOUNT, d).validate().is_ok());
        assert_eq!(
            NewRecord::new("rent", MAX_AMOUNT + 1, d).validate(),
            Err(ValidationError::AmountTooLarge(MAX_AMOUNT + 1))
        );
    }

    #[test]
    fn dates_parse_strictly() {
        assert_eq!(parse_date(" 2026-10-02 ").unwrap(), NaiveDate::from_ymd_opt(2026, 10, 2).unwrap());
        assert_eq!(parse_date("2026-02-30"), Err(ValidationError::InvalidDate("2026-02-30".into())));
        assert!(parse_date("02/10/2026").is_err());
    }

    #[test]
    fn arithmetic_saturates_instead_of_wrapping() {
        let s = AggregationSnapshot { gross_sales: i64::MAX, available_profit: i64::MAX, ..AggregationSnapshot::ZERO };
        let sale = DeltaRow {
            delta: SnapshotDelta { gross_sales: 1, available_profit: 1, ..SnapshotDelta::default() },
            floor_shop_expense: false,
        };
        assert_eq!(s.apply(&sale).gross_sales, i64::MAX);
        assert_eq!(s.checked_apply(&sale), None);
        assert_eq!(total([i64::MAX, 1]), i64::MAX);
        let deep = AggregationSnapshot { inventory_cost: i64::MIN, ..AggregationSnapshot::ZERO };
        assert_eq!(deep.total_profit(), i64::MAX);
        assert!(deep.has_negative());
    }

    #[test]
    fn category_parses_from_slug_and_label() {
        for c in LedgerCategory::ALL {
            assert_eq!(c.slug().parse::<LedgerCategory>().unwrap(), c);
            assert_eq!(c.label().parse::<LedgerCategory>().unwrap(), c);
            assert_eq!(LedgerCategory::from_slug(c.slug()), Some(c));
        }
        assert!("loans".parse::<LedgerCategory>().is_err());
    }
}
