//! The summary aggregator merges independently arriving fetch results into one snapshot.
//!
//! Every refresh is a batch with an increasing `BatchId`. Starting a batch clears the transaction
//! list, and results tagged with an older batch are discarded when they arrive, so a straggler
//! from a superseded refresh can neither duplicate list entries nor overwrite a newer total.
//! Within a batch, scalar results are idempotent per key and can arrive in any order.

use crate::error::FinanceError;
use crate::model::{Amount, CategoryKey, Transaction};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::{debug, trace, warn};

/// Sequence number of a refresh. Batch `0` means no refresh has started yet.
pub type BatchId = u64;

/// A figure that was either never fetched or fetched with a value. A figure the backend reports
/// as `"null"` is `Fetched(0)`, never `Unset`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum TotalValue {
    #[default]
    Unset,
    Fetched(Decimal),
}

impl TotalValue {
    pub fn fetched(&self) -> Option<Decimal> {
        match self {
            TotalValue::Unset => None,
            TotalValue::Fetched(value) => Some(*value),
        }
    }

    /// What a screen shows: the value, or zero if it was never fetched.
    pub fn or_zero(&self) -> Decimal {
        self.fetched().unwrap_or(Decimal::ZERO)
    }

    pub fn is_fetched_zero(&self) -> bool {
        matches!(self, TotalValue::Fetched(value) if value.is_zero())
    }
}

/// One named figure of the summary screens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryTotal {
    key: CategoryKey,
    value: TotalValue,
    /// The batch that last stored `value`.
    last_updated: BatchId,
    /// Set when the latest fetch of this key failed and `value` is left over from before.
    stale: bool,
}

impl CategoryTotal {
    fn new(key: CategoryKey) -> Self {
        Self {
            key,
            value: TotalValue::Unset,
            last_updated: 0,
            stale: false,
        }
    }

    pub fn key(&self) -> &CategoryKey {
        &self.key
    }

    pub fn value(&self) -> TotalValue {
        self.value
    }

    pub fn last_updated(&self) -> BatchId {
        self.last_updated
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }
}

/// The result of one fetch, as handed to `Aggregator::apply`.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    /// The backend's "no rows" answer.
    Null,
    /// A scalar as sent by the backend, not yet parsed.
    Scalar(String),
    /// One entry of the list endpoint.
    Record(Value),
}

/// A piece of the chart on the summary screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChartSlice {
    pub key: CategoryKey,
    pub value: Decimal,
    pub color: &'static str,
}

const CHART_COLORS: [(CategoryKey, &str); 4] = [
    (CategoryKey::Income, "#00FF00"),
    (CategoryKey::Expense, "#FF0000"),
    (CategoryKey::Savings, "#0000FF"),
    (CategoryKey::Food, "#FFFF00"),
];

/// The externally visible state of the aggregator. Always a copy, never a view into live state.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct SummarySnapshot {
    batch: BatchId,
    totals: BTreeMap<CategoryKey, CategoryTotal>,
    transactions: Vec<Transaction>,
    issues: Vec<FinanceError>,
}

impl SummarySnapshot {
    /// The batch this snapshot belongs to.
    pub fn batch(&self) -> BatchId {
        self.batch
    }

    pub fn value(&self, key: &CategoryKey) -> TotalValue {
        self.totals
            .get(key)
            .map(CategoryTotal::value)
            .unwrap_or_default()
    }

    pub fn total(&self, key: &CategoryKey) -> Option<&CategoryTotal> {
        self.totals.get(key)
    }

    pub fn totals(&self) -> impl Iterator<Item = &CategoryTotal> {
        self.totals.values()
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    /// The `n` latest transactions, newest first. Transactions of the same day keep their list
    /// order.
    pub fn recent(&self, n: usize) -> Vec<Transaction> {
        let mut recent = self.transactions.clone();
        recent.sort_by(|a, b| b.date().cmp(&a.date()));
        recent.truncate(n);
        recent
    }

    /// Problems recorded during the current batch: malformed records and failed categories.
    pub fn issues(&self) -> &[FinanceError] {
        &self.issues
    }

    /// True only when income, expense, savings and food were all fetched and are all zero.
    pub fn is_fully_zero(&self) -> bool {
        CategoryKey::HEADLINE
            .iter()
            .all(|key| self.value(key).is_fetched_zero())
    }

    /// The remaining monthly food budget of each person.
    pub fn person_food(&self) -> Vec<(String, TotalValue)> {
        self.totals
            .values()
            .filter_map(|total| {
                total
                    .key
                    .person()
                    .map(|person| (person.to_string(), total.value))
            })
            .collect()
    }

    /// The headline figures with their fixed chart colors.
    pub fn chart_slices(&self) -> Vec<ChartSlice> {
        CHART_COLORS
            .iter()
            .map(|(key, color)| ChartSlice {
                key: key.clone(),
                value: self.value(key).or_zero(),
                color: *color,
            })
            .collect()
    }
}

/// What `apply` did with a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Stored,
    /// The result belongs to a superseded batch.
    Discarded,
    /// The result could not be read. It was recorded as an issue and nothing else changed.
    Rejected,
}

/// Owns the summary state. Mutated only through `begin_batch`, `apply` and `fail`.
#[derive(Debug, Default)]
pub struct Aggregator {
    snapshot: SummarySnapshot,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_batch(&self) -> BatchId {
        self.snapshot.batch
    }

    /// Starts a new batch over `keys`. The transaction list and the issues of the previous batch
    /// are cleared, totals keep their values until new ones arrive.
    pub fn begin_batch(&mut self, keys: &[CategoryKey]) -> BatchId {
        let snapshot = &mut self.snapshot;
        snapshot.batch += 1;
        snapshot.transactions.clear();
        snapshot.issues.clear();
        for key in keys.iter().filter(|key| !key.is_list()) {
            snapshot
                .totals
                .entry(key.clone())
                .or_insert_with(|| CategoryTotal::new(key.clone()));
        }
        debug!("Started batch {}", snapshot.batch);
        snapshot.batch
    }

    /// Applies the result of one fetch of `key` made for `batch`.
    ///
    /// - A result for an older batch is discarded.
    /// - `Null` stores zero, a `Scalar` is parsed as a decimal.
    /// - For the list key each `Record` appends one transaction.
    ///
    /// Unreadable values are recorded as issues and leave everything else untouched.
    pub fn apply(&mut self, batch: BatchId, key: &CategoryKey, raw: RawValue) -> Applied {
        if batch != self.snapshot.batch {
            debug!(
                "Discarding {key} from batch {batch}, current batch is {}",
                self.snapshot.batch
            );
            return Applied::Discarded;
        }

        match (key.is_list(), raw) {
            (true, RawValue::Record(record)) => match Transaction::from_record(&record) {
                Ok(transaction) => {
                    self.snapshot.transactions.push(transaction);
                    Applied::Stored
                }
                Err(e) => {
                    warn!("Skipping a list entry: {e}");
                    self.snapshot.issues.push(e);
                    Applied::Rejected
                }
            },
            (true, RawValue::Null) => Applied::Stored,
            (true, RawValue::Scalar(s)) => {
                self.reject(key, format!("expected list entries, got the scalar '{s}'"))
            }
            (false, RawValue::Record(record)) => {
                self.reject(key, format!("expected a scalar, got the record {record}"))
            }
            (false, RawValue::Null) => self.store(key, Decimal::ZERO),
            (false, RawValue::Scalar(s)) => match Amount::from_str(&s) {
                Ok(amount) => self.store(key, amount.value()),
                Err(e) => self.reject(key, format!("'{s}' is not a number: {e}")),
            },
        }
    }

    /// Records that the fetch of `key` for `batch` failed for good. The last known value stays
    /// and is flagged stale.
    pub fn fail(&mut self, batch: BatchId, key: &CategoryKey, reason: impl Into<String>) -> Applied {
        if batch != self.snapshot.batch {
            debug!("Discarding the failure of {key} from batch {batch}");
            return Applied::Discarded;
        }
        let error = FinanceError::category(key, reason);
        warn!("{error}");
        if let Some(total) = self.snapshot.totals.get_mut(key) {
            total.stale = true;
        }
        self.snapshot.issues.push(error);
        Applied::Stored
    }

    /// A copy of the current state. Safe to call at any time, including mid-batch.
    pub fn snapshot(&self) -> SummarySnapshot {
        self.snapshot.clone()
    }

    fn store(&mut self, key: &CategoryKey, value: Decimal) -> Applied {
        let batch = self.snapshot.batch;
        let total = self
            .snapshot
            .totals
            .entry(key.clone())
            .or_insert_with(|| CategoryTotal::new(key.clone()));
        trace!("{key} = {value} in batch {batch}");
        total.value = TotalValue::Fetched(value);
        total.last_updated = batch;
        total.stale = false;
        Applied::Stored
    }

    fn reject(&mut self, key: &CategoryKey, reason: String) -> Applied {
        let error = FinanceError::category(key, reason);
        warn!("{error}");
        self.snapshot.issues.push(error);
        Applied::Rejected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn headline_batch() -> (Aggregator, BatchId) {
        let mut aggregator = Aggregator::new();
        let batch = aggregator.begin_batch(&CategoryKey::HEADLINE);
        (aggregator, batch)
    }

    fn record(id: u32) -> RawValue {
        RawValue::Record(json!({
            "id": id, "orderdate": "2025-04-13", "who": "Bernd", "location": "Hollgasse 1/1",
            "position": "Essen", "income": 0, "expense": "4.20", "comment": ""
        }))
    }

    fn scalar(s: &str) -> RawValue {
        RawValue::Scalar(s.to_string())
    }

    fn permutations(items: &[usize]) -> Vec<Vec<usize>> {
        if items.len() <= 1 {
            return vec![items.to_vec()];
        }
        let mut all = Vec::new();
        for (i, first) in items.iter().enumerate() {
            let mut rest = items.to_vec();
            rest.remove(i);
            for mut tail in permutations(&rest) {
                tail.insert(0, *first);
                all.push(tail);
            }
        }
        all
    }

    fn dated(id: u32, date: &str) -> RawValue {
        RawValue::Record(json!({
            "id": id, "orderdate": date, "who": "Bernd", "income": 0, "expense": "1"
        }))
    }

    #[test]
    fn test_recent_newest_first() {
        let mut aggregator = Aggregator::new();
        let batch = aggregator.begin_batch(&[CategoryKey::All]);
        for (id, date) in [
            (1, "2025-04-03"),
            (2, "2025-04-09"),
            (3, "2025-04-01"),
            (4, "2025-04-09"),
            (5, "2025-04-05"),
            (6, "2025-04-07"),
            (7, "2025-04-02"),
        ] {
            aggregator.apply(batch, &CategoryKey::All, dated(id, date));
        }
        let snapshot = aggregator.snapshot();
        let recent = snapshot.recent(5);
        let ids: Vec<&str> = recent.iter().map(Transaction::id).collect();
        assert_eq!(ids, ["2", "4", "6", "5", "1"]);
        assert_eq!(snapshot.recent(20).len(), 7);
        assert!(snapshot.recent(0).is_empty());
        assert_eq!(snapshot.transactions().len(), 7);
    }

    #[test]
    fn test_null_is_fetched_zero() {
        let (mut aggregator, batch) = headline_batch();
        assert_eq!(aggregator.snapshot().value(&CategoryKey::Food), TotalValue::Unset);
        aggregator.apply(batch, &CategoryKey::Food, RawValue::Null);
        let snapshot = aggregator.snapshot();
        assert_eq!(
            snapshot.value(&CategoryKey::Food),
            TotalValue::Fetched(Decimal::ZERO)
        );
        aggregator.apply(batch, &CategoryKey::Income, scalar("null"));
        assert!(aggregator
            .snapshot()
            .value(&CategoryKey::Income)
            .is_fetched_zero());
    }

    #[test]
    fn test_arrival_order_does_not_matter() {
        let results = [
            (CategoryKey::Income, scalar("2500")),
            (CategoryKey::Expense, scalar("1200.40")),
            (CategoryKey::Savings, scalar("1299.60")),
            (CategoryKey::Food, RawValue::Null),
        ];
        let orders = permutations(&[0, 1, 2, 3]);
        assert_eq!(orders.len(), 24);
        let mut snapshots = Vec::new();
        for order in orders {
            let (mut aggregator, batch) = headline_batch();
            for i in order {
                let (key, raw) = &results[i];
                aggregator.apply(batch, key, raw.clone());
            }
            snapshots.push(aggregator.snapshot());
        }
        for snapshot in &snapshots[1..] {
            assert_eq!(snapshot, &snapshots[0]);
        }
        assert_eq!(
            snapshots[0].value(&CategoryKey::Expense),
            TotalValue::Fetched(dec!(1200.40))
        );
    }

    #[test]
    fn test_repeated_result_is_idempotent() {
        let (mut aggregator, batch) = headline_batch();
        aggregator.apply(batch, &CategoryKey::Income, scalar("10"));
        let once = aggregator.snapshot();
        aggregator.apply(batch, &CategoryKey::Income, scalar("10"));
        assert_eq!(aggregator.snapshot(), once);
    }

    #[test]
    fn test_is_fully_zero() {
        let (mut aggregator, batch) = headline_batch();
        for key in &CategoryKey::HEADLINE[..3] {
            aggregator.apply(batch, key, RawValue::Null);
        }
        // food is still unset
        assert!(!aggregator.snapshot().is_fully_zero());
        aggregator.apply(batch, &CategoryKey::Food, scalar("0.00"));
        assert!(aggregator.snapshot().is_fully_zero());
        aggregator.apply(batch, &CategoryKey::Savings, scalar("-3"));
        assert!(!aggregator.snapshot().is_fully_zero());
    }

    #[test]
    fn test_unreadable_scalar_keeps_last_value() {
        let (mut aggregator, batch) = headline_batch();
        aggregator.apply(batch, &CategoryKey::Income, scalar("100"));
        aggregator.apply(batch, &CategoryKey::Expense, scalar("7"));
        let batch = aggregator.begin_batch(&CategoryKey::HEADLINE);
        let applied = aggregator.apply(batch, &CategoryKey::Income, scalar("a lot"));
        assert_eq!(applied, Applied::Rejected);
        aggregator.apply(batch, &CategoryKey::Expense, scalar("8"));

        let snapshot = aggregator.snapshot();
        assert_eq!(
            snapshot.value(&CategoryKey::Income),
            TotalValue::Fetched(dec!(100))
        );
        assert_eq!(
            snapshot.value(&CategoryKey::Expense),
            TotalValue::Fetched(dec!(8))
        );
        assert!(matches!(
            snapshot.issues(),
            [FinanceError::CategoryFetchError { key: CategoryKey::Income, .. }]
        ));
    }

    #[test]
    fn test_malformed_record_is_skipped() {
        let mut aggregator = Aggregator::new();
        let batch = aggregator.begin_batch(&[CategoryKey::All]);
        for id in 0..10 {
            if id == 4 {
                let broken = json!({"id": id, "orderdate": "2025-04-13", "who": "Bernd", "expense": 1});
                aggregator.apply(batch, &CategoryKey::All, RawValue::Record(broken));
            } else {
                aggregator.apply(batch, &CategoryKey::All, record(id));
            }
        }
        let snapshot = aggregator.snapshot();
        assert_eq!(snapshot.transactions().len(), 9);
        assert_eq!(snapshot.issues().len(), 1);
        assert!(matches!(
            snapshot.issues()[0],
            FinanceError::MalformedRecord { .. }
        ));
    }

    #[test]
    fn test_new_batch_clears_list_and_discards_stragglers() {
        let mut aggregator = Aggregator::new();
        let first = aggregator.begin_batch(&[CategoryKey::All, CategoryKey::Income]);
        aggregator.apply(first, &CategoryKey::All, record(1));
        aggregator.apply(first, &CategoryKey::All, record(2));

        let second = aggregator.begin_batch(&[CategoryKey::All, CategoryKey::Income]);
        assert!(aggregator.snapshot().transactions().is_empty());
        aggregator.apply(second, &CategoryKey::All, record(3));
        aggregator.apply(second, &CategoryKey::Income, scalar("50"));

        assert_eq!(
            aggregator.apply(first, &CategoryKey::All, record(4)),
            Applied::Discarded
        );
        assert_eq!(
            aggregator.apply(first, &CategoryKey::Income, scalar("10")),
            Applied::Discarded
        );

        let snapshot = aggregator.snapshot();
        let ids: Vec<&str> = snapshot.transactions().iter().map(|t| t.id()).collect();
        assert_eq!(ids, vec!["3"]);
        assert_eq!(
            snapshot.value(&CategoryKey::Income),
            TotalValue::Fetched(dec!(50))
        );
        assert_eq!(
            snapshot.total(&CategoryKey::Income).unwrap().last_updated(),
            second
        );
    }

    #[test]
    fn test_failure_marks_stale() {
        let (mut aggregator, batch) = headline_batch();
        aggregator.apply(batch, &CategoryKey::Savings, scalar("12"));
        let batch = aggregator.begin_batch(&CategoryKey::HEADLINE);
        aggregator.fail(batch, &CategoryKey::Savings, "timed out");

        let snapshot = aggregator.snapshot();
        let savings = snapshot.total(&CategoryKey::Savings).unwrap();
        assert!(savings.is_stale());
        assert_eq!(savings.value(), TotalValue::Fetched(dec!(12)));
        assert_eq!(snapshot.issues().len(), 1);

        aggregator.apply(batch, &CategoryKey::Savings, scalar("13"));
        assert!(!aggregator
            .snapshot()
            .total(&CategoryKey::Savings)
            .unwrap()
            .is_stale());
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let (mut aggregator, batch) = headline_batch();
        let before = aggregator.snapshot();
        aggregator.apply(batch, &CategoryKey::Income, scalar("1"));
        assert_eq!(before.value(&CategoryKey::Income), TotalValue::Unset);
    }

    #[test]
    fn test_person_food_and_chart() {
        let persons = vec!["Bernd".to_string(), "Julia".to_string()];
        let keys = CategoryKey::refresh_set(&persons);
        let mut aggregator = Aggregator::new();
        let batch = aggregator.begin_batch(&keys);
        aggregator.apply(
            batch,
            &CategoryKey::SumFoodPersonMonth("Julia".into()),
            scalar("-20.5"),
        );
        aggregator.apply(batch, &CategoryKey::Income, scalar("300"));

        let snapshot = aggregator.snapshot();
        assert_eq!(
            snapshot.person_food(),
            vec![
                ("Bernd".to_string(), TotalValue::Unset),
                ("Julia".to_string(), TotalValue::Fetched(dec!(-20.5))),
            ]
        );
        let slices = snapshot.chart_slices();
        assert_eq!(slices.len(), 4);
        assert_eq!(slices[0].key, CategoryKey::Income);
        assert_eq!(slices[0].value, dec!(300));
        assert_eq!(slices[0].color, "#00FF00");
        assert_eq!(slices[3].value, Decimal::ZERO);
    }
}
