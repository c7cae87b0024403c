// ===============================
// src/delta.rs
// ===============================
//
// Which boxes does the money move.
//
//   category       op      grossSales  inventoryCost  shopExpense        availableProfit
//   InventoryCost  Create  -amount     -amount        0                  0
//   InventoryCost  Delete  +amount     +amount        0                  0
//   Expense        Create  0           0              +amount            -amount
//   Expense        Delete  0           0              -amount (>= 0)     +amount
//   Sales          Create  +amount     0              0                  +amount
//   Sales          Delete  -amount     0              0                  -amount
//
// The optimistic step and the authoritative recomputation both go through
// this file, so a category without a row here cannot be wired in.
//
use crate::domain::{
    AggregationSnapshot, DeltaRow, LedgerCategory, Money, MutationIntent, Operation, SnapshotDelta,
};
use crate::error::ValidationError;

fn create_delta(category: LedgerCategory, amount: Money) -> SnapshotDelta {
    match category {
        LedgerCategory::InventoryCost => SnapshotDelta {
            gross_sales: -amount,
            inventory_cost: -amount,
            ..SnapshotDelta::default()
        },
        LedgerCategory::Expense => SnapshotDelta {
            shop_expense: amount,
            available_profit: -amount,
            ..SnapshotDelta::default()
        },
        LedgerCategory::Sales => SnapshotDelta {
            gross_sales: amount,
            available_profit: amount,
            ..SnapshotDelta::default()
        },
    }
}

/// Delete is the exact negation of create for the same amount.
pub fn row(intent: &MutationIntent) -> DeltaRow {
    let create = create_delta(intent.category, intent.amount);
    match intent.operation {
        Operation::Create => DeltaRow { delta: create, floor_shop_expense: false },
        Operation::Delete => DeltaRow {
            delta: -create,
            floor_shop_expense: intent.category == LedgerCategory::Expense,
        },
    }
}

/// Rebuilds the aggregate from scratch out of the records currently stored.
pub fn replay<I>(entries: I) -> Result<AggregationSnapshot, ValidationError>
where
    I: IntoIterator<Item = (LedgerCategory, Money)>,
{
    entries.into_iter().try_fold(AggregationSnapshot::ZERO, |acc, (category, amount)| {
        acc.checked_apply(&row(&MutationIntent::create(category, amount)))
            .ok_or(ValidationError::TotalOverflow)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use LedgerCategory::*;

    fn d(g: Money, i: Money, e: Money, p: Money) -> SnapshotDelta {
        SnapshotDelta { gross_sales: g, inventory_cost: i, shop_expense: e, available_profit: p }
    }

    #[test]
    fn table_rows() {
        let a = 100;
        assert_eq!(row(&MutationIntent::create(InventoryCost, a)).delta, d(-a, -a, 0, 0));
        assert_eq!(row(&MutationIntent::delete(InventoryCost, a)).delta, d(a, a, 0, 0));
        assert_eq!(row(&MutationIntent::create(Expense, a)).delta, d(0, 0, a, -a));
        assert_eq!(row(&MutationIntent::delete(Expense, a)).delta, d(0, 0, -a, a));
        assert_eq!(row(&MutationIntent::create(Sales, a)).delta, d(a, 0, 0, a));
        assert_eq!(row(&MutationIntent::delete(Sales, a)).delta, d(-a, 0, 0, -a));
    }

    #[test]
    fn only_expense_delete_floors() {
        for c in LedgerCategory::ALL {
            assert!(!row(&MutationIntent::create(c, 5)).floor_shop_expense);
            assert_eq!(row(&MutationIntent::delete(c, 5)).floor_shop_expense, c == Expense);
        }
    }

    #[test]
    fn delete_cancels_create_from_any_starting_point() {
        let start = AggregationSnapshot { gross_sales: 70, inventory_cost: -3, shop_expense: 40, available_profit: 12 };
        for c in LedgerCategory::ALL {
            let created = start.apply(&row(&MutationIntent::create(c, 25)));
            let back = created.apply(&row(&MutationIntent::delete(c, 25)));
            assert_eq!(back, start, "category {c}");
        }
    }

    #[test]
    fn expense_delete_larger_than_total_floors_at_zero() {
        let s = AggregationSnapshot { shop_expense: 100, available_profit: 0, ..AggregationSnapshot::ZERO };
        let next = s.apply(&row(&MutationIntent::delete(Expense, 300)));
        assert_eq!(next.shop_expense, 0);
        assert_eq!(next.available_profit, 300);
    }

    #[test]
    fn replay_mixed_ledger() {
        let s = replay([(Sales, 10_000), (Expense, 2_000), (InventoryCost, 1_000)]).unwrap();
        assert_eq!(s, AggregationSnapshot { gross_sales: 9_000, inventory_cost: -1_000, shop_expense: 2_000, available_profit: 8_000 });
        assert_eq!(s.amount_in_hand(), 7_000);
    }

    #[test]
    fn replay_is_order_independent() {
        let a = replay([(Sales, 5), (InventoryCost, 7), (Expense, 3)]).unwrap();
        let b = replay([(Expense, 3), (Sales, 5), (InventoryCost, 7)]).unwrap();
        assert_eq!(a, b);
        assert_eq!(replay(Vec::new()).unwrap(), AggregationSnapshot::ZERO);
    }

    #[test]
    fn replay_reports_overflow() {
        assert_eq!(replay([(Sales, i64::MAX), (Sales, 1)]), Err(ValidationError::TotalOverflow));
    }
}
