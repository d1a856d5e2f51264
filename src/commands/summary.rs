//! The read-only commands:
//! - `summary`: this month's totals and the latest entries
//! - `list`: this month's transactions

use crate::api::Backend;
use crate::commands::Out;
use crate::model::{date, Amount, CategoryKey, Transaction};
use crate::orchestrator::{Orchestrator, RefreshReport};
use crate::summary::{SummarySnapshot, TotalValue};
use crate::{Result, Settings};
use std::sync::Arc;
use tracing::warn;

const NO_ACTIVITY: &str = "No income or expenses this month";
const RECENT_ENTRIES: usize = 5;

const SCALARS: [(CategoryKey, &str); 8] = [
    (CategoryKey::Income, "Income"),
    (CategoryKey::Expense, "Expense"),
    (CategoryKey::Savings, "Savings"),
    (CategoryKey::Food, "Food"),
    (CategoryKey::AverageDayPerMonth, "Food per day"),
    (
        CategoryKey::AverageDayUntilEndOfMonth,
        "Available per day until month end",
    ),
    (
        CategoryKey::SumSpendingFoodBeginningOfYear,
        "Food since January",
    ),
    (CategoryKey::SumIncomeYear, "Income this year"),
];

/// Refreshes every category and shows the totals, with the food budget left for each person.
pub async fn summary(
    settings: Settings,
    backend: Arc<dyn Backend>,
) -> Result<Out<SummarySnapshot>> {
    let report = refresh(&settings, backend).await;
    let message = render_summary(&report.snapshot);
    Ok(Out::new(message, report.snapshot))
}

/// Refreshes every category and shows the transactions in the multi-line list format that `edit`
/// reads back.
pub async fn list(settings: Settings, backend: Arc<dyn Backend>) -> Result<Out<Vec<Transaction>>> {
    let report = refresh(&settings, backend).await;
    let transactions = report.snapshot.transactions().to_vec();
    let message = if transactions.is_empty() {
        "No transactions this month".to_string()
    } else {
        transactions
            .iter()
            .map(Transaction::render)
            .collect::<Vec<_>>()
            .join("\n\n")
    };
    Ok(Out::new(message, transactions))
}

async fn refresh(settings: &Settings, backend: Arc<dyn Backend>) -> RefreshReport {
    let orchestrator = Orchestrator::from_settings(backend, settings);
    let report = orchestrator.refresh_all().await;
    for failure in report.surfaced() {
        warn!("{failure}");
    }
    report
}

fn render_summary(snapshot: &SummarySnapshot) -> String {
    if snapshot.is_fully_zero() {
        return NO_ACTIVITY.to_string();
    }
    let mut lines = Vec::new();
    for (key, label) in &SCALARS {
        lines.push(line(label, snapshot, key));
    }
    let persons = snapshot.person_food();
    if !persons.is_empty() {
        lines.push("Food budget left:".to_string());
        for (person, _) in persons {
            let key = CategoryKey::SumFoodPersonMonth(person.clone());
            lines.push(format!("  {}", line(&person, snapshot, &key)));
        }
    }
    let recent = snapshot.recent(RECENT_ENTRIES);
    if !recent.is_empty() {
        lines.push("Recent entries:".to_string());
        for t in &recent {
            lines.push(format!("  {}", recent_line(t)));
        }
    }
    lines.join("\n")
}

fn recent_line(t: &Transaction) -> String {
    let amount = if t.income().is_positive() {
        format!("+{}", t.income().grouped())
    } else {
        format!("-{}", t.expense().grouped())
    };
    format!(
        "{} {} {}: {amount}",
        date::format_wire(t.date()),
        t.person(),
        t.position()
    )
}

fn line(label: &str, snapshot: &SummarySnapshot, key: &CategoryKey) -> String {
    let value = snapshot.value(key);
    let amount = Amount::new(value.or_zero()).grouped();
    let stale = snapshot.total(key).is_some_and(|t| t.is_stale());
    match (value, stale) {
        (TotalValue::Unset, _) => format!("{label}: {amount} (not available)"),
        (TotalValue::Fetched(_), true) => format!("{label}: {amount} (outdated)"),
        (TotalValue::Fetched(_), false) => format!("{label}: {amount}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Script;
    use crate::test::TestEnv;
    use serde_json::json;

    #[tokio::test]
    async fn test_summary() {
        let env = TestEnv::new().await;
        let out = summary(env.settings(), env.backend()).await.unwrap();
        let message = out.message();
        assert!(message.contains("Income: 3,200.00"), "{message}");
        assert!(message.contains("Food since January: 3,841.07"), "{message}");
        assert!(message.contains("  Bernd: -12.40"), "{message}");
        assert!(message.contains("  Julia: 87.10"), "{message}");
        assert_eq!(out.structure().unwrap().transactions().len(), 5);
    }

    #[tokio::test]
    async fn test_summary_shows_recent_entries() {
        let env = TestEnv::new().await;
        let out = summary(env.settings(), env.backend()).await.unwrap();
        let message = out.message();
        let recent: Vec<&str> = message
            .split("Recent entries:\n")
            .nth(1)
            .unwrap()
            .lines()
            .collect();
        assert_eq!(
            recent,
            [
                "  2025-04-06 Bernd Essen: -23.75",
                "  2025-04-05 Julia Garage A1/12: +85.00",
                "  2025-04-03 Bernd Internet: -39.90",
                "  2025-04-02 Julia Essen: -64.20",
                "  2025-04-01 Bernd Mieteinkommen: +950.00",
            ]
        );
    }

    #[tokio::test]
    async fn test_summary_without_activity() {
        let env = TestEnv::new().await;
        for key in CategoryKey::HEADLINE {
            env.test_backend().set_total(&key, json!("null"));
        }
        let out = summary(env.settings(), env.backend()).await.unwrap();
        assert_eq!(out.message(), NO_ACTIVITY);
    }

    #[tokio::test]
    async fn test_summary_with_failed_category() {
        let env = TestEnv::new().await;
        env.test_backend()
            .script_key(&CategoryKey::Savings, Script::respond(404, "{}"));
        let out = summary(env.settings(), env.backend()).await.unwrap();
        assert!(out.message().contains("Savings: 0.00 (not available)"));
        assert_eq!(out.structure().unwrap().issues().len(), 1);
    }

    #[tokio::test]
    async fn test_list_renders_every_transaction() {
        let env = TestEnv::new().await;
        let out = list(env.settings(), env.backend()).await.unwrap();
        let blocks: Vec<&str> = out.message().split("\n\n").collect();
        assert_eq!(blocks.len(), 5);
        let parsed = Transaction::parse_rendered(blocks[2]).unwrap();
        assert_eq!(parsed.id(), "3");
        assert_eq!(parsed.comment(), "");
        assert_eq!(&parsed, &out.structure().unwrap()[2]);
    }
}
