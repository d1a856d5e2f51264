//! Implements the `Backend` trait in memory, for tests and for running the binary without a server.
//!
//! Note: this is compiled even in the "production" version of this app so that the whole app can
//! be run, top-to-bottom, with `BALANCE_SHEET_TEST_MODE` set.

use crate::api::{Backend, Response};
use crate::model::{CategoryKey, Payload, ADD_PATH, BASE_PATH, PUT_PATH};
use crate::Result;
use anyhow::bail;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::trace;

/// A scripted behavior for the next request to a route, used to inject failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Script {
    /// Answer with `status` and `body` after `delay`, regardless of the stored data.
    Respond {
        status: u16,
        body: String,
        delay: Duration,
    },
    /// Serve the stored data, but only after `delay`.
    Delay(Duration),
    /// Fail as if the connection broke.
    Fail(String),
    /// Never answer.
    Hang,
}

impl Script {
    pub fn respond(status: u16, body: impl Into<String>) -> Self {
        Script::Respond {
            status,
            body: body.into(),
            delay: Duration::ZERO,
        }
    }
}

/// A request as the backend received it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recorded {
    pub method: &'static str,
    pub path: String,
    pub payload: Option<Payload>,
}

/// An in-memory backend. The list endpoint serves live records that `add` and `put` modify, the
/// sum endpoints serve canned values.
#[derive(Debug)]
pub struct TestBackend {
    state: Mutex<State>,
}

#[derive(Debug, Default)]
struct State {
    records: Vec<Value>,
    /// Scalar answers by route.
    scalars: HashMap<String, Value>,
    /// Scalar answers of the per-person route, by person.
    person_food: HashMap<String, Value>,
    /// Scripts by route, consumed one per request.
    scripts: HashMap<String, VecDeque<Script>>,
    requests: Vec<Recorded>,
    transaction_ids: HashSet<String>,
    next_id: u64,
}

impl TestBackend {
    /// A backend without any data. Every sum answers 404 until it is set.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                next_id: 1,
                ..State::default()
            }),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sets the answer of the endpoint serving `key`. `value` goes into the envelope as is, so
    /// pass `json!("null")` for the backend's "no rows" answer.
    pub fn set_total(&self, key: &CategoryKey, value: Value) {
        let mut state = self.state();
        match key.person() {
            Some(person) => {
                state.person_food.insert(person.to_string(), value);
            }
            None => {
                state.scalars.insert(route(&key.path(Decimal::ZERO)).to_string(), value);
            }
        }
    }

    /// Replaces the records served by the list endpoint.
    pub fn set_records(&self, records: Vec<Value>) {
        let mut state = self.state();
        state.next_id = records.len() as u64 + 1;
        state.records = records;
    }

    pub fn records(&self) -> Vec<Value> {
        self.state().records.clone()
    }

    /// Queues `script` for the next request to the route of `path`. Scripts queue up, so
    /// scripting twice affects the next two requests.
    pub fn script(&self, path: &str, script: Script) {
        self.state()
            .scripts
            .entry(route(path).to_string())
            .or_default()
            .push_back(script);
    }

    /// Queues `script` for the next fetch of `key`.
    pub fn script_key(&self, key: &CategoryKey, script: Script) {
        self.script(&key.path(Decimal::ZERO), script)
    }

    /// Every request received so far, in order of arrival.
    pub fn requests(&self) -> Vec<Recorded> {
        self.state().requests.clone()
    }

    /// How many `method` requests went to the route of `path`.
    pub fn count(&self, method: &str, path: &str) -> usize {
        let wanted = route(path);
        self.state()
            .requests
            .iter()
            .filter(|r| r.method == method && route(&r.path) == wanted)
            .count()
    }

    async fn handle(
        &self,
        method: &'static str,
        path: &str,
        payload: Option<&Payload>,
    ) -> Result<Response> {
        let script = {
            let mut state = self.state();
            state.requests.push(Recorded {
                method,
                path: path.to_string(),
                payload: payload.cloned(),
            });
            state
                .scripts
                .get_mut(route(path))
                .and_then(VecDeque::pop_front)
        };
        trace!("{method} {path}, script {script:?}");

        match script {
            None => {}
            Some(Script::Respond {
                status,
                body,
                delay,
            }) => {
                tokio::time::sleep(delay).await;
                return Ok(Response::new(status, body));
            }
            Some(Script::Delay(delay)) => tokio::time::sleep(delay).await,
            Some(Script::Fail(reason)) => bail!("{method} {path} failed: {reason}"),
            Some(Script::Hang) => return futures::future::pending().await,
        }

        let mut state = self.state();
        Ok(match method {
            "GET" => state.get(path),
            "POST" => state.post(path, payload),
            "PUT" => state.put(path, payload),
            _ => not_found(path),
        })
    }
}

impl Default for TestBackend {
    /// Seeded with a small month of data for two persons.
    fn default() -> Self {
        let backend = Self::new();
        backend.set_records(seed_records());
        for (key, value) in [
            (CategoryKey::Income, "3200.00"),
            (CategoryKey::Expense, "1452.85"),
            (CategoryKey::Savings, "1747.15"),
            (CategoryKey::Food, "412.30"),
            (CategoryKey::AverageDayPerMonth, "13.74"),
            (CategoryKey::AverageDayUntilEndOfMonth, "9.15"),
            (CategoryKey::SumSpendingFoodBeginningOfYear, "3841.07"),
            (CategoryKey::SumIncomeYear, "28800.00"),
            (CategoryKey::SumFoodPersonMonth("Bernd".into()), "-12.40"),
            (CategoryKey::SumFoodPersonMonth("Julia".into()), "87.10"),
        ] {
            backend.set_total(&key, json!(value));
        }
        backend
    }
}

#[async_trait::async_trait]
impl Backend for TestBackend {
    async fn get(&self, path: &str) -> Result<Response> {
        self.handle("GET", path, None).await
    }

    async fn post(&self, path: &str, payload: &Payload) -> Result<Response> {
        self.handle("POST", path, Some(payload)).await
    }

    async fn put(&self, path: &str, payload: &Payload) -> Result<Response> {
        self.handle("PUT", path, Some(payload)).await
    }
}

const PER_PERSON_ROUTE: &str = "/incomeexpense/sum_spending_food_per_person_per_month";
const RECORD_FIELDS: [&str; 9] = [
    "orderdate",
    "who",
    "location",
    "position",
    "income",
    "expense",
    "comment",
    "taxable",
    "export_to",
];
const OPTIONAL_FIELDS: [&str; 3] = ["comment", "taxable", "export_to"];

impl State {
    fn get(&self, path: &str) -> Response {
        let route = route(path);
        if route == CategoryKey::All.path(Decimal::ZERO) {
            return Response::ok(json!({ "incomeexpense": self.records }).to_string());
        }
        let value = if route == PER_PERSON_ROUTE {
            query_person(path).and_then(|person| self.person_food.get(&person))
        } else {
            self.scalars.get(route)
        };
        match value {
            Some(value) => Response::ok(json!({ "incomeexpense": { "Total income": [value] } }).to_string()),
            None => not_found(path),
        }
    }

    fn post(&mut self, path: &str, payload: Option<&Payload>) -> Response {
        let Some(payload) = payload else {
            return bad_request("missing form");
        };
        if path != ADD_PATH {
            return not_found(path);
        }
        let Some(transaction_id) = payload.get("transaction_id") else {
            return bad_request("missing transaction_id");
        };
        if !self.transaction_ids.insert(transaction_id.to_string()) {
            return Response::new(409, json!({ "duplicate": true }).to_string());
        }
        if let Some(missing) = RECORD_FIELDS
            .iter()
            .find(|field| !OPTIONAL_FIELDS.contains(*field) && payload.get(field).is_none())
        {
            return bad_request(&format!("missing {missing}"));
        }

        let id = self.next_id;
        self.next_id += 1;
        let mut record = serde_json::Map::new();
        record.insert("id".to_string(), json!(id));
        for field in RECORD_FIELDS {
            if let Some(value) = payload.get(field) {
                record.insert(field.to_string(), json!(value));
            }
        }
        self.records.push(Value::Object(record));
        Response::new(201, json!({ "id": id, "duplicate": false }).to_string())
    }

    fn put(&mut self, path: &str, payload: Option<&Payload>) -> Response {
        let Some(payload) = payload else {
            return bad_request("missing form");
        };
        let Some(id) = path
            .strip_prefix(PUT_PATH)
            .and_then(|rest| rest.strip_prefix('/'))
        else {
            return not_found(path);
        };
        let Some(record) = self
            .records
            .iter_mut()
            .find(|r| record_id(r).as_deref() == Some(id))
            .and_then(Value::as_object_mut)
        else {
            return not_found(path);
        };
        for field in RECORD_FIELDS {
            if let Some(value) = payload.get(field) {
                record.insert(field.to_string(), json!(value));
            }
        }
        Response::ok(json!({ "updated": true }).to_string())
    }
}

/// The path without its query.
fn route(path: &str) -> &str {
    path.split_once('?').map_or(path, |(route, _)| route)
}

/// The `person` query parameter without the quotes the backend expects around it.
fn query_person(path: &str) -> Option<String> {
    let (_, query) = path.split_once('?')?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(name, _)| name == "person")
        .map(|(_, value)| value.trim_matches('\'').to_string())
}

fn record_id(record: &Value) -> Option<String> {
    match record.get("id")? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn not_found(path: &str) -> Response {
    Response::new(
        404,
        json!({ "error": format!("no route {path} under {BASE_PATH}") }).to_string(),
    )
}

fn bad_request(reason: &str) -> Response {
    Response::new(400, json!({ "error": reason }).to_string())
}

fn seed_records() -> Vec<Value> {
    vec![
        json!({"id": 1, "orderdate": "2025-04-01", "who": "Bernd", "location": "Hollgasse 1/1",
               "position": "Mieteinkommen", "income": "950.00", "expense": "0", "comment": "April rent",
               "taxable": 1, "export_to": "hollgasse"}),
        json!({"id": 2, "orderdate": "2025-04-02", "who": "Julia", "location": "Personal",
               "position": "Essen", "income": "0", "expense": "64.20", "comment": "weekly shopping"}),
        json!({"id": 3, "orderdate": "Thu, 03 Apr 2025 00:00:00 GMT", "who": "Bernd",
               "location": "Hollgasse 1/54", "position": "Internet", "income": 0, "expense": 39.9,
               "comment": null}),
        json!({"id": 4, "orderdate": "2025-04-05", "who": "Julia", "location": "Stipcakgasse 8",
               "position": "Garage A1/12", "income": "85.00", "expense": "0", "comment": ""}),
        json!({"id": 5, "orderdate": "2025-04-06", "who": "Bernd", "location": "Personal",
               "position": "Essen", "income": "0", "expense": "23.75", "comment": "market"}),
    ]
}
