use crate::models::{BudgetSummary, CategoryTotal, ExpenseCategory, ExpenseRecord};

pub fn summarize_budget(
    trip_id: &str,
    total_budget: Option<f64>,
    expenses: &[ExpenseRecord],
) -> BudgetSummary {
    let total_expenses = round_cents(expenses.iter().map(|expense| expense.amount).sum());

    BudgetSummary {
        trip_id: trip_id.to_string(),
        total_budget,
        total_expenses,
        remaining_budget: total_budget.map(|budget| round_cents(budget - total_expenses)),
    }
}

pub fn category_totals(expenses: &[ExpenseRecord]) -> Vec<CategoryTotal> {
    ExpenseCategory::ALL
        .into_iter()
        .filter_map(|category| {
            let matching = expenses
                .iter()
                .filter(|expense| expense.category == category)
                .collect::<Vec<_>>();
            if matching.is_empty() {
                return None;
            }
            Some(CategoryTotal {
                category,
                amount: round_cents(matching.iter().map(|expense| expense.amount).sum()),
                count: matching.len(),
            })
        })
        .collect()
}

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
