//! The fetch orchestrator issues the requests of a refresh, an add or an update, retries them
//! under a fixed policy and feeds the results to the `Aggregator`.
//!
//! Each request is a small state machine, `Pending -> (Retrying ->)* Succeeded | Failed`, tracked
//! in the in-flight table until it is terminal. Every request carries the `Operation` that issued
//! it so that failures can be surfaced per operation: a refresh that races with an add cannot turn
//! into an add error.

use crate::api::{is_duplicate, parse_list, parse_scalar, Backend, Response};
use crate::error::FinanceError;
use crate::model::{CategoryKey, NewEntry, Payload, ADD_PATH, PUT_PATH};
use crate::summary::{Aggregator, Applied, BatchId, RawValue, SummarySnapshot};
use crate::{Result, Settings};
use anyhow::{anyhow, bail, Context};
use futures::future::join_all;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

const RETRY_DELAY: Duration = Duration::from_secs(1);

/// How long one attempt may take and how often a transient failure is retried. The delay between
/// attempts is fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub timeout: Duration,
    pub retries: u32,
    pub retry_delay: Duration,
}

impl RetryPolicy {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            timeout: settings.timeout(),
            retries: settings.retries(),
            retry_delay: RETRY_DELAY,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            retries: 1,
            retry_delay: RETRY_DELAY,
        }
    }
}

/// What started a refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    /// The user asked for it.
    User,
    /// It follows a successful add.
    AfterAdd,
    /// It follows a successful update.
    AfterUpdate,
}

serde_plain::derive_display_from_serialize!(Trigger);

/// The operation a request belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Refresh { batch: BatchId, trigger: Trigger },
    Add { transaction_id: String },
    Update { id: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchState {
    Pending,
    Retrying,
    Succeeded,
    Failed,
}

serde_plain::derive_display_from_serialize!(FetchState);

/// One outstanding call to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchRequest {
    /// The category key, or what is being added or updated.
    pub label: String,
    pub path: String,
    pub attempts: u32,
    pub state: FetchState,
    pub operation: Operation,
}

/// The outcome of a refresh.
#[derive(Debug, Clone, Serialize)]
pub struct RefreshReport {
    pub batch: BatchId,
    pub trigger: Trigger,
    /// The categories of this batch that could not be fetched or read.
    pub failures: Vec<FinanceError>,
    /// The snapshot right after the last request of this batch completed.
    pub snapshot: SummarySnapshot,
}

impl RefreshReport {
    /// The failures to show as errors. Only a refresh the user asked for reports its own
    /// failures, those of a refresh following an add or an update stay in the snapshot.
    pub fn surfaced(&self) -> &[FinanceError] {
        match self.trigger {
            Trigger::User => &self.failures,
            Trigger::AfterAdd | Trigger::AfterUpdate => &[],
        }
    }

    /// Whether a later refresh started before this one completed.
    pub fn is_superseded(&self) -> bool {
        self.snapshot.batch() != self.batch
    }
}

/// The answer of the backend to an add.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AddOutcome {
    Added,
    /// The backend already had this transaction id, typically from a retried submission.
    Duplicate { transaction_id: String },
}

impl AddOutcome {
    /// The informational notice of a duplicate.
    pub fn notice(&self) -> Option<FinanceError> {
        match self {
            AddOutcome::Added => None,
            AddOutcome::Duplicate { transaction_id } => Some(FinanceError::DuplicateSubmission {
                transaction_id: transaction_id.clone(),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AddReport {
    pub outcome: AddOutcome,
    pub refresh: RefreshReport,
}

enum Call<'a> {
    Get(&'a str),
    Post(&'a str, &'a Payload),
    Put(&'a str, &'a Payload),
}

impl Call<'_> {
    fn path(&self) -> &str {
        match self {
            Call::Get(path) | Call::Post(path, _) | Call::Put(path, _) => path,
        }
    }

    async fn send(&self, backend: &dyn Backend) -> Result<Response> {
        match self {
            Call::Get(path) => backend.get(path).await,
            Call::Post(path, payload) => backend.post(path, payload).await,
            Call::Put(path, payload) => backend.put(path, payload).await,
        }
    }
}

/// Issues requests and owns the aggregator they feed.
pub struct Orchestrator {
    backend: Arc<dyn Backend>,
    policy: RetryPolicy,
    persons: Vec<String>,
    food_budget: Decimal,
    aggregator: Mutex<Aggregator>,
    in_flight: Mutex<BTreeMap<u64, FetchRequest>>,
    next_request: AtomicU64,
}

impl Orchestrator {
    pub fn new(
        backend: Arc<dyn Backend>,
        persons: Vec<String>,
        food_budget: Decimal,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            backend,
            policy,
            persons,
            food_budget,
            aggregator: Mutex::new(Aggregator::new()),
            in_flight: Mutex::new(BTreeMap::new()),
            next_request: AtomicU64::new(1),
        }
    }

    pub fn from_settings(backend: Arc<dyn Backend>, settings: &Settings) -> Self {
        Self::new(
            backend,
            settings.persons().to_vec(),
            settings.food_budget().value(),
            RetryPolicy::from_settings(settings),
        )
    }

    /// A copy of the current summary.
    pub fn snapshot(&self) -> SummarySnapshot {
        self.aggregator().snapshot()
    }

    /// The requests that have not completed yet.
    pub fn in_flight(&self) -> Vec<FetchRequest> {
        self.in_flight_table().values().cloned().collect()
    }

    /// Fetches every category concurrently as a new batch.
    pub async fn refresh_all(&self) -> RefreshReport {
        self.refresh_with(Trigger::User).await
    }

    /// Fetches every category concurrently as a new batch started by `trigger`.
    ///
    /// Results of batches started earlier are discarded from now on, even if their requests are
    /// still running.
    pub async fn refresh_with(&self, trigger: Trigger) -> RefreshReport {
        let keys = CategoryKey::refresh_set(&self.persons);
        let batch = self.aggregator().begin_batch(&keys);
        info!(
            "Refreshing {} categories in batch {batch}, triggered by {trigger}",
            keys.len()
        );
        let operation = Operation::Refresh { batch, trigger };

        let fetches = keys
            .iter()
            .map(|key| self.fetch(key, batch, operation.clone()));
        let failures: Vec<FinanceError> = join_all(fetches).await.into_iter().flatten().collect();

        RefreshReport {
            batch,
            trigger,
            failures,
            snapshot: self.snapshot(),
        }
    }

    /// Submits `entry` and refreshes on success. A duplicate transaction id is not an error.
    ///
    /// # Errors
    /// Returns an error if the backend cannot be reached or rejects the entry. No refresh is
    /// started in that case.
    pub async fn add(&self, entry: &NewEntry) -> Result<AddReport> {
        let transaction_id = entry.transaction_id().to_string();
        let payload = entry.to_payload();
        let operation = Operation::Add {
            transaction_id: transaction_id.clone(),
        };
        let response = self
            .execute(operation, "add", Call::Post(ADD_PATH, &payload))
            .await
            .map_err(|reason| anyhow!(reason))
            .with_context(|| format!("Unable to add transaction '{transaction_id}'"))?;

        let outcome = if response.is_conflict() && is_duplicate(response.body()) {
            info!("Transaction '{transaction_id}' was already submitted");
            AddOutcome::Duplicate { transaction_id }
        } else if response.is_success() {
            AddOutcome::Added
        } else {
            bail!(
                "The backend rejected transaction '{transaction_id}' with status {}: {}",
                response.status(),
                response.body()
            )
        };

        let refresh = self.refresh_with(Trigger::AfterAdd).await;
        Ok(AddReport { outcome, refresh })
    }

    /// Sends `payload` as the new state of transaction `id`. Does not refresh.
    pub async fn update(&self, id: &str, payload: &Payload) -> Result<()> {
        let path = format!("{PUT_PATH}/{id}");
        let operation = Operation::Update { id: id.to_string() };
        let response = self
            .execute(operation, "update", Call::Put(&path, payload))
            .await
            .map_err(|reason| anyhow!(reason))
            .with_context(|| format!("Unable to update transaction '{id}'"))?;
        if !response.is_success() {
            bail!(
                "The backend rejected the update of transaction '{id}' with status {}: {}",
                response.status(),
                response.body()
            )
        }
        Ok(())
    }

    /// Fetches `key` and applies the result. Returns the failure, if there is one to report.
    async fn fetch(
        &self,
        key: &CategoryKey,
        batch: BatchId,
        operation: Operation,
    ) -> Option<FinanceError> {
        let path = key.path(self.food_budget);
        let response = match self
            .execute(operation, &key.to_string(), Call::Get(&path))
            .await
        {
            Ok(response) if response.is_success() => response,
            Ok(response) => {
                let reason = format!("the backend answered with status {}", response.status());
                return self.fail(batch, key, reason);
            }
            Err(reason) => return self.fail(batch, key, reason),
        };

        if key.is_list() {
            let records = match parse_list(response.body()) {
                Ok(records) => records,
                Err(e) => return self.fail(batch, key, format!("{e:#}")),
            };
            debug!("{key}: {} records for batch {batch}", records.len());
            let mut aggregator = self.aggregator();
            for record in records {
                if aggregator.apply(batch, key, RawValue::Record(record)) == Applied::Discarded {
                    break;
                }
            }
            None
        } else {
            let raw = match parse_scalar(response.body()) {
                Ok(raw) => raw,
                Err(e) => return self.fail(batch, key, format!("{e:#}")),
            };
            match self.aggregator().apply(batch, key, raw) {
                Applied::Rejected => Some(FinanceError::category(key, "unreadable value")),
                Applied::Stored | Applied::Discarded => None,
            }
        }
    }

    fn fail(&self, batch: BatchId, key: &CategoryKey, reason: String) -> Option<FinanceError> {
        match self.aggregator().fail(batch, key, reason.clone()) {
            Applied::Discarded => None,
            Applied::Stored | Applied::Rejected => Some(FinanceError::category(key, reason)),
        }
    }

    /// Runs `call` under the retry policy. A missing response, a timeout and a 5xx status are
    /// transient and retried, any other response is returned as is. The error is the reason of
    /// the last failed attempt.
    async fn execute(
        &self,
        operation: Operation,
        label: &str,
        call: Call<'_>,
    ) -> std::result::Result<Response, String> {
        let id = self.next_request.fetch_add(1, Ordering::Relaxed);
        self.in_flight_table().insert(
            id,
            FetchRequest {
                label: label.to_string(),
                path: call.path().to_string(),
                attempts: 0,
                state: FetchState::Pending,
                operation,
            },
        );

        let max_attempts = self.policy.retries + 1;
        let mut attempts = 0;
        let result = loop {
            attempts += 1;
            self.set_attempts(id, attempts);
            debug!("{label}: attempt {attempts} of {max_attempts}, {}", call.path());

            let reason = match tokio::time::timeout(
                self.policy.timeout,
                call.send(self.backend.as_ref()),
            )
            .await
            {
                Ok(Ok(response)) if !response.is_server_error() => break Ok(response),
                Ok(Ok(response)) => format!("the backend answered with status {}", response.status()),
                Ok(Err(e)) => format!("{e:#}"),
                Err(_) => format!("no response within {:?}", self.policy.timeout),
            };

            if attempts >= max_attempts {
                break Err(reason);
            }
            debug!("{label}: {reason}, retrying in {:?}", self.policy.retry_delay);
            self.set_state(id, FetchState::Retrying);
            tokio::time::sleep(self.policy.retry_delay).await;
        };

        let state = match &result {
            Ok(response) if response.is_success() => FetchState::Succeeded,
            Ok(_) => FetchState::Failed,
            Err(reason) => {
                warn!("{label}: giving up after {attempts} attempts, {reason}");
                FetchState::Failed
            }
        };
        if let Some(request) = self.in_flight_table().remove(&id) {
            debug!(
                "{}: {state} after {} attempts",
                request.label, request.attempts
            );
        }
        result
    }

    fn set_attempts(&self, id: u64, attempts: u32) {
        if let Some(request) = self.in_flight_table().get_mut(&id) {
            request.attempts = attempts;
        }
    }

    fn set_state(&self, id: u64, state: FetchState) {
        if let Some(request) = self.in_flight_table().get_mut(&id) {
            request.state = state;
        }
    }

    fn aggregator(&self) -> MutexGuard<'_, Aggregator> {
        self.aggregator.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn in_flight_table(&self) -> MutexGuard<'_, BTreeMap<u64, FetchRequest>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
