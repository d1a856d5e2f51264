//! An edit session holds the in-progress edit of one transaction from the list, from opening it
//! to the PUT that stores the result.

use crate::error::FinanceError;
use crate::model::{date, Amount, ExportTo, Payload, Transaction};
use crate::orchestrator::{Orchestrator, RefreshReport, Trigger};
use crate::Result;
use anyhow::{anyhow, bail};
use serde::Serialize;
use std::str::FromStr;
use tracing::{debug, info};

/// `Idle -> Open -> Submitting -> Closed`, or back to `Open` when the submit fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Open,
    Submitting,
    Closed,
}

serde_plain::derive_display_from_serialize!(SessionState);

/// The editable inputs of the edit screen. The id is not editable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Date,
    Person,
    Location,
    Position,
    Income,
    Expense,
    Comment,
    Taxable,
    ExportTo,
}

/// The text of every editable input, as typed.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct Buffers {
    pub date: String,
    pub person: String,
    pub location: String,
    pub position: String,
    pub income: String,
    pub expense: String,
    pub comment: String,
    pub taxable: String,
    pub export_to: String,
}

impl Buffers {
    fn from_transaction(t: &Transaction) -> Self {
        Self {
            date: date::format_form(t.date()),
            person: t.person().to_string(),
            location: t.location().to_string(),
            position: t.position().to_string(),
            income: t.income().to_string(),
            expense: t.expense().to_string(),
            comment: t.comment().to_string(),
            taxable: t.taxable().to_string(),
            export_to: t.export_to().to_string(),
        }
    }

    fn get(&self, field: Field) -> &str {
        match field {
            Field::Date => &self.date,
            Field::Person => &self.person,
            Field::Location => &self.location,
            Field::Position => &self.position,
            Field::Income => &self.income,
            Field::Expense => &self.expense,
            Field::Comment => &self.comment,
            Field::Taxable => &self.taxable,
            Field::ExportTo => &self.export_to,
        }
    }

    fn get_mut(&mut self, field: Field) -> &mut String {
        match field {
            Field::Date => &mut self.date,
            Field::Person => &mut self.person,
            Field::Location => &mut self.location,
            Field::Position => &mut self.position,
            Field::Income => &mut self.income,
            Field::Expense => &mut self.expense,
            Field::Comment => &mut self.comment,
            Field::Taxable => &mut self.taxable,
            Field::ExportTo => &mut self.export_to,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EditSession {
    state: SessionState,
    transaction: Option<Transaction>,
    buffers: Buffers,
    dirty: bool,
}

impl Default for EditSession {
    fn default() -> Self {
        Self::new()
    }
}

impl EditSession {
    pub fn new() -> Self {
        Self {
            state: SessionState::Idle,
            transaction: None,
            buffers: Buffers::default(),
            dirty: false,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn transaction(&self) -> Option<&Transaction> {
        self.transaction.as_ref()
    }

    pub fn buffers(&self) -> &Buffers {
        &self.buffers
    }

    pub fn get(&self, field: Field) -> &str {
        self.buffers.get(field)
    }

    /// Whether any buffer was changed since the session was opened.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Opens `transaction` for editing and fills the buffers from it. An open session is
    /// replaced, a submitting one cannot be.
    pub fn open(&mut self, transaction: Transaction) -> Result<()> {
        if self.state == SessionState::Submitting {
            bail!("Unable to open a transaction while a submit is in progress")
        }
        debug!("Editing transaction '{}'", transaction.id());
        self.buffers = Buffers::from_transaction(&transaction);
        self.transaction = Some(transaction);
        self.dirty = false;
        self.state = SessionState::Open;
        Ok(())
    }

    /// Opens a transaction given in the multi-line list rendering.
    pub fn open_rendered(&mut self, text: &str) -> Result<()> {
        let transaction = Transaction::parse_rendered(text)?;
        self.open(transaction)
    }

    /// Replaces the content of one buffer.
    pub fn set(&mut self, field: Field, value: impl Into<String>) -> Result<()> {
        if self.state != SessionState::Open {
            bail!("No transaction is open for editing")
        }
        let value = value.into();
        let buffer = self.buffers.get_mut(field);
        if *buffer != value {
            *buffer = value;
            self.dirty = true;
        }
        Ok(())
    }

    /// Builds the fields of the PUT from the buffers and the unchanged id. The opened transaction
    /// itself is left as it is.
    ///
    /// # Errors
    /// - `FinanceError::InvalidDate` if the date buffer is not a date.
    /// - `FinanceError::InvalidAmount` if an amount buffer is not a non-negative decimal.
    /// - An error if the taxable buffer is not `true` or `false`, or the export target is unknown.
    pub fn build_update_payload(&self) -> Result<Payload> {
        let Some(original) = &self.transaction else {
            bail!("No transaction is open for editing")
        };
        let b = &self.buffers;
        let date = date::parse_input(&b.date).ok_or_else(|| FinanceError::InvalidDate {
            input: b.date.clone(),
        })?;
        let edited = Transaction::new(
            original.id(),
            date,
            b.person.trim(),
            catalog(&b.location),
            catalog(&b.position),
            buffer_amount("income", &b.income)?,
            buffer_amount("expense", &b.expense)?,
            b.comment.as_str(),
        )
        .with_tax(buffer_flag(&b.taxable)?, buffer_export_to(&b.export_to)?);
        Ok(edited.to_payload())
    }

    /// Sends the update and refreshes. On success the session is closed. On failure it is open
    /// again with every buffer as it was, and the error is returned for display.
    ///
    /// If the returned future is dropped before the PUT completes, the session is open again as
    /// well. Whether the backend applied the update is then unknown.
    pub async fn submit(&mut self, orchestrator: &Orchestrator) -> Result<RefreshReport> {
        if self.state != SessionState::Open {
            bail!("No transaction is open for editing")
        }
        let payload = self.build_update_payload()?;
        let id = payload.get("id").unwrap_or_default().to_string();

        let submitting = Submitting::enter(&mut self.state);
        let result = orchestrator.update(&id, &payload).await;
        drop(submitting);
        result?;
        info!("Updated transaction '{id}'");

        self.close();
        Ok(orchestrator.refresh_with(Trigger::AfterUpdate).await)
    }

    /// Discards the edits and closes the session.
    pub fn cancel(&mut self) -> Result<()> {
        if self.state == SessionState::Submitting {
            bail!("Unable to cancel while a submit is in progress")
        }
        self.close();
        Ok(())
    }

    fn close(&mut self) {
        self.transaction = None;
        self.buffers = Buffers::default();
        self.dirty = false;
        self.state = SessionState::Closed;
    }
}

/// Holds a session in `Submitting` and puts it back to `Open` when dropped, also when the submit
/// future is dropped mid-flight.
struct Submitting<'a> {
    state: &'a mut SessionState,
}

impl<'a> Submitting<'a> {
    fn enter(state: &'a mut SessionState) -> Self {
        *state = SessionState::Submitting;
        Self { state }
    }
}

impl Drop for Submitting<'_> {
    fn drop(&mut self) {
        *self.state = SessionState::Open;
    }
}

/// Locations and positions typed into the edit screen are free text and never rejected.
fn catalog<T: FromStr<Err = std::convert::Infallible>>(s: &str) -> T {
    T::from_str(s.trim()).unwrap_or_else(|never| match never {})
}

fn buffer_amount(field: &str, input: &str) -> Result<Amount> {
    match Amount::from_str(input.trim()) {
        Ok(amount) if !amount.is_negative() => Ok(amount),
        _ => Err(FinanceError::InvalidAmount {
            field: field.to_string(),
            input: input.to_string(),
        }
        .into()),
    }
}

fn buffer_flag(input: &str) -> Result<bool> {
    match input.trim() {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(anyhow!("Taxable must be true or false, not '{other}'")),
    }
}

fn buffer_export_to(input: &str) -> Result<ExportTo> {
    ExportTo::from_str(input.trim()).map_err(|_| anyhow!("'{input}' is not an export target"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{Script, TestBackend};
    use crate::model::PUT_PATH;
    use crate::orchestrator::RetryPolicy;
    use rust_decimal_macros::dec;
    use std::sync::Arc;
    use std::time::Duration;

    const RENDERED: &str = "Id: 2\nDate: 2025-04-02\nPerson: Julia\nLocation: Personal\n\
                            Position: Essen\nIncome: 0.00\nExpense: 64.20\nComment: weekly shopping";

    fn opened() -> EditSession {
        let mut session = EditSession::new();
        session.open_rendered(RENDERED).unwrap();
        session
    }

    fn orchestrator(backend: &Arc<TestBackend>) -> Orchestrator {
        let policy = RetryPolicy {
            timeout: Duration::from_millis(200),
            retries: 1,
            retry_delay: Duration::from_millis(10),
        };
        Orchestrator::new(
            backend.clone(),
            vec!["Bernd".to_string(), "Julia".to_string()],
            dec!(350),
            policy,
        )
    }

    #[test]
    fn test_open_fills_buffers() {
        let session = opened();
        assert_eq!(session.state(), SessionState::Open);
        assert_eq!(session.get(Field::Date), "02/04/2025");
        assert_eq!(session.get(Field::Expense), "64.20");
        assert_eq!(session.get(Field::Comment), "weekly shopping");
        assert!(!session.is_dirty());
    }

    #[test]
    fn test_unchanged_payload_matches_transaction() {
        let session = opened();
        let payload = session.build_update_payload().unwrap();
        assert_eq!(payload, session.transaction().unwrap().to_payload());
    }

    #[test]
    fn test_edited_payload() {
        let mut session = opened();
        session.set(Field::Date, "03/04/2025").unwrap();
        session.set(Field::Expense, "70").unwrap();
        session.set(Field::Location, "Hollgasse 1/54").unwrap();
        assert!(session.is_dirty());

        let payload = session.build_update_payload().unwrap();
        assert_eq!(payload.get("id"), Some("2"));
        assert_eq!(payload.get("orderdate"), Some("2025-04-03"));
        assert_eq!(payload.get("expense"), Some("70.00"));
        assert_eq!(payload.get("location"), Some("Hollgasse 1/54"));
        // the opened transaction is not touched
        assert_eq!(session.transaction().unwrap().expense().value(), dec!(64.20));
    }

    #[test]
    fn test_untouched_amount_is_sent_back_unchanged() {
        let record = serde_json::json!({
            "id": 12, "orderdate": "2025-04-13", "who": "Bernd", "income": "0",
            "expense": "4.125", "comment": "note\n", "taxable": true, "export_to": "both"
        });
        let mut session = EditSession::new();
        session
            .open_rendered(&Transaction::from_record(&record).unwrap().render())
            .unwrap();
        assert_eq!(session.get(Field::Expense), "4.125");
        session.set(Field::Person, "Julia").unwrap();

        let payload = session.build_update_payload().unwrap();
        assert_eq!(payload.get("expense"), Some("4.125"));
        assert_eq!(payload.get("income"), Some("0.00"));
        assert_eq!(payload.get("comment"), Some("note\n"));
        assert_eq!(payload.get("taxable"), Some("true"));
        assert_eq!(payload.get("export_to"), Some("both"));
    }

    #[test]
    fn test_tax_buffers() {
        let mut session = opened();
        assert_eq!(session.get(Field::Taxable), "false");
        assert_eq!(session.get(Field::ExportTo), "auto");
        session.set(Field::Taxable, "true").unwrap();
        session.set(Field::ExportTo, "hollgasse").unwrap();
        let payload = session.build_update_payload().unwrap();
        assert_eq!(payload.get("taxable"), Some("true"));
        assert_eq!(payload.get("export_to"), Some("hollgasse"));

        session.set(Field::Taxable, "yes").unwrap();
        assert!(session.build_update_payload().is_err());
        session.set(Field::Taxable, "false").unwrap();
        session.set(Field::ExportTo, "Hollgasse 1/1").unwrap();
        assert!(session.build_update_payload().is_err());
    }

    #[test]
    fn test_setting_the_same_value_is_not_an_edit() {
        let mut session = opened();
        session.set(Field::Person, "Julia").unwrap();
        assert!(!session.is_dirty());
    }

    #[test]
    fn test_invalid_date() {
        let mut session = opened();
        session.set(Field::Date, "32/13/2025").unwrap();
        let err = session.build_update_payload().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FinanceError>(),
            Some(FinanceError::InvalidDate { .. })
        ));
    }

    #[test]
    fn test_invalid_amount() {
        let mut session = opened();
        session.set(Field::Income, "-3").unwrap();
        let err = session.build_update_payload().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FinanceError>(),
            Some(FinanceError::InvalidAmount { .. })
        ));
    }

    #[test]
    fn test_idle_session_rejects_edits() {
        let mut session = EditSession::new();
        assert!(session.set(Field::Comment, "x").is_err());
        assert!(session.build_update_payload().is_err());
    }

    #[test]
    fn test_cancel() {
        let mut session = opened();
        session.set(Field::Comment, "changed").unwrap();
        session.cancel().unwrap();
        assert_eq!(session.state(), SessionState::Closed);
        assert!(session.transaction().is_none());
    }

    #[tokio::test]
    async fn test_submit_updates_and_refreshes() {
        let backend = Arc::new(TestBackend::default());
        let orchestrator = orchestrator(&backend);
        let mut session = opened();
        session.set(Field::Comment, "monthly shopping").unwrap();

        let report = session.submit(&orchestrator).await.unwrap();
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(report.trigger, Trigger::AfterUpdate);
        assert_eq!(backend.count("PUT", &format!("{PUT_PATH}/2")), 1);
        let updated = report
            .snapshot
            .transactions()
            .iter()
            .find(|t| t.id() == "2")
            .unwrap();
        assert_eq!(updated.comment(), "monthly shopping");
    }

    #[tokio::test]
    async fn test_failed_submit_keeps_edits() {
        let backend = Arc::new(TestBackend::default());
        backend.script(&format!("{PUT_PATH}/2"), Script::respond(400, "{}"));
        let orchestrator = orchestrator(&backend);
        let mut session = opened();
        session.set(Field::Comment, "monthly shopping").unwrap();

        assert!(session.submit(&orchestrator).await.is_err());
        assert_eq!(session.state(), SessionState::Open);
        assert_eq!(session.get(Field::Comment), "monthly shopping");
        assert!(session.is_dirty());
        assert_eq!(backend.count("GET", "/incomeexpense/all"), 0);

        session.submit(&orchestrator).await.unwrap();
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn test_dropped_submit_reopens_the_session() {
        let backend = Arc::new(TestBackend::default());
        backend.script(&format!("{PUT_PATH}/2"), Script::Hang);
        let orchestrator = orchestrator(&backend);
        let mut session = opened();
        session.set(Field::Comment, "monthly shopping").unwrap();

        let dropped =
            tokio::time::timeout(Duration::from_millis(50), session.submit(&orchestrator)).await;
        assert!(dropped.is_err());
        assert_eq!(session.state(), SessionState::Open);
        assert_eq!(session.get(Field::Comment), "monthly shopping");

        session.submit(&orchestrator).await.unwrap();
        assert_eq!(session.state(), SessionState::Closed);

        let mut abandoned = opened();
        backend.script(&format!("{PUT_PATH}/2"), Script::Hang);
        let dropped =
            tokio::time::timeout(Duration::from_millis(50), abandoned.submit(&orchestrator)).await;
        assert!(dropped.is_err());
        abandoned.cancel().unwrap();
        assert_eq!(abandoned.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn test_invalid_date_blocks_submit() {
        let backend = Arc::new(TestBackend::default());
        let orchestrator = orchestrator(&backend);
        let mut session = opened();
        session.set(Field::Date, "someday").unwrap();
        assert!(session.submit(&orchestrator).await.is_err());
        assert_eq!(session.state(), SessionState::Open);
        assert!(backend.requests().is_empty());
    }
}
