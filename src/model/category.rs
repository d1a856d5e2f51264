//! Category keys name the figures a refresh fetches, and map each one to its backend endpoint.

use anyhow::bail;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

pub const BASE_PATH: &str = "/incomeexpense";
pub const ADD_PATH: &str = "/incomeexpense/add";
pub const PUT_PATH: &str = "/incomeexpense/put";

const PERSON_PREFIX: &str = "sumFoodPersonMonth";

/// Identifies one figure on the summary screens, or the transaction list (`All`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CategoryKey {
    Income,
    Expense,
    Savings,
    Food,
    /// The list of this month's transactions.
    All,
    AverageDayPerMonth,
    AverageDayUntilEndOfMonth,
    SumSpendingFoodBeginningOfYear,
    SumIncomeYear,
    /// Remaining monthly food budget of one person.
    SumFoodPersonMonth(String),
}

impl CategoryKey {
    /// The four totals that decide whether there was any activity at all.
    pub const HEADLINE: [CategoryKey; 4] = [
        CategoryKey::Income,
        CategoryKey::Expense,
        CategoryKey::Savings,
        CategoryKey::Food,
    ];

    /// Every key a refresh fetches, with one per-person key for each of `persons`.
    pub fn refresh_set(persons: &[String]) -> Vec<CategoryKey> {
        let mut keys = vec![
            CategoryKey::Income,
            CategoryKey::Expense,
            CategoryKey::Savings,
            CategoryKey::Food,
            CategoryKey::All,
            CategoryKey::AverageDayPerMonth,
            CategoryKey::AverageDayUntilEndOfMonth,
            CategoryKey::SumSpendingFoodBeginningOfYear,
            CategoryKey::SumIncomeYear,
        ];
        keys.extend(
            persons
                .iter()
                .map(|p| CategoryKey::SumFoodPersonMonth(p.clone())),
        );
        keys
    }

    pub fn is_list(&self) -> bool {
        matches!(self, CategoryKey::All)
    }

    /// The person of a per-person key.
    pub fn person(&self) -> Option<&str> {
        match self {
            CategoryKey::SumFoodPersonMonth(person) => Some(person.as_str()),
            _ => None,
        }
    }

    /// The path and query of the endpoint serving this key. `reserve` is the monthly food budget,
    /// only used by per-person keys.
    pub fn path(&self, reserve: Decimal) -> String {
        let endpoint = match self {
            CategoryKey::Income => "sum_income",
            CategoryKey::Expense => "sum_expense",
            CategoryKey::Savings => "sum_savings",
            CategoryKey::Food => "sum_food",
            CategoryKey::All => "all",
            CategoryKey::AverageDayPerMonth => "sum_average_spending_day_of_month",
            CategoryKey::AverageDayUntilEndOfMonth => "sum_reserved_per_day_until_end_of_month",
            CategoryKey::SumSpendingFoodBeginningOfYear => {
                "sum_spending_food_since_beginning_of_year"
            }
            CategoryKey::SumIncomeYear => "sum_income_year",
            CategoryKey::SumFoodPersonMonth(person) => {
                // The backend splices the person into its query as a quoted literal
                let query = url::form_urlencoded::Serializer::new(String::new())
                    .append_pair("person", &format!("'{person}'"))
                    .append_pair("reserve", &reserve.to_string())
                    .finish();
                return format!("{BASE_PATH}/sum_spending_food_per_person_per_month?{query}");
            }
        };
        format!("{BASE_PATH}/{endpoint}")
    }
}

impl Display for CategoryKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CategoryKey::Income => "income",
            CategoryKey::Expense => "expense",
            CategoryKey::Savings => "savings",
            CategoryKey::Food => "food",
            CategoryKey::All => "all",
            CategoryKey::AverageDayPerMonth => "averageDayPerMonth",
            CategoryKey::AverageDayUntilEndOfMonth => "averageDayUntilEndOfMonth",
            CategoryKey::SumSpendingFoodBeginningOfYear => "sumSpendingFoodBeginningOfYear",
            CategoryKey::SumIncomeYear => "sumIncomeYear",
            CategoryKey::SumFoodPersonMonth(person) => {
                return write!(f, "{PERSON_PREFIX}:{person}");
            }
        };
        f.write_str(s)
    }
}

impl FromStr for CategoryKey {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = match s {
            "income" => CategoryKey::Income,
            "expense" => CategoryKey::Expense,
            "savings" => CategoryKey::Savings,
            "food" => CategoryKey::Food,
            "all" => CategoryKey::All,
            "averageDayPerMonth" => CategoryKey::AverageDayPerMonth,
            "averageDayUntilEndOfMonth" => CategoryKey::AverageDayUntilEndOfMonth,
            "sumSpendingFoodBeginningOfYear" => CategoryKey::SumSpendingFoodBeginningOfYear,
            "sumIncomeYear" => CategoryKey::SumIncomeYear,
            other => match other.split_once(':') {
                Some((PERSON_PREFIX, person)) if !person.is_empty() => {
                    CategoryKey::SumFoodPersonMonth(person.to_string())
                }
                _ => bail!("Unknown category key '{other}'"),
            },
        };
        Ok(key)
    }
}

impl Serialize for CategoryKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for CategoryKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        CategoryKey::from_str(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_display_and_parse() {
        for key in CategoryKey::refresh_set(&["Bernd".to_string()]) {
            let parsed = CategoryKey::from_str(&key.to_string()).unwrap();
            assert_eq!(parsed, key);
        }
        assert_eq!(
            CategoryKey::SumFoodPersonMonth("Julia".into()).to_string(),
            "sumFoodPersonMonth:Julia"
        );
    }

    #[test]
    fn test_unknown_key() {
        assert!(CategoryKey::from_str("sumFoodPersonMonth:").is_err());
        assert!(CategoryKey::from_str("balance").is_err());
    }

    #[test]
    fn test_refresh_set() {
        let persons = vec!["Bernd".to_string(), "Julia".to_string()];
        let keys = CategoryKey::refresh_set(&persons);
        assert_eq!(keys.len(), 11);
        assert_eq!(keys.iter().filter(|k| k.is_list()).count(), 1);
        assert_eq!(keys.iter().filter(|k| k.person().is_some()).count(), 2);
    }

    #[test]
    fn test_paths() {
        assert_eq!(
            CategoryKey::Savings.path(dec!(350)),
            "/incomeexpense/sum_savings"
        );
        assert_eq!(CategoryKey::All.path(dec!(350)), "/incomeexpense/all");
        assert_eq!(
            CategoryKey::SumFoodPersonMonth("Bernd".into()).path(dec!(350)),
            "/incomeexpense/sum_spending_food_per_person_per_month?person=%27Bernd%27&reserve=350"
        );
    }

    #[test]
    fn test_serde() {
        let json = serde_json::to_string(&CategoryKey::AverageDayPerMonth).unwrap();
        assert_eq!(json, "\"averageDayPerMonth\"");
    }
}
