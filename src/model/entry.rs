//! The entry form: what the user has typed so far, and the validated entry it turns into.

use crate::error::FinanceError;
use crate::model::{date, Amount, ExportTo, Location, Payload, Position};
use crate::{utils, Result};
use anyhow::bail;
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// The raw input of the entry form. Amount and date fields are kept as typed.
///
/// The transaction id is fixed when the draft is created, so submitting the same draft twice lets
/// the backend recognize the second attempt as a duplicate.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct EntryDraft {
    pub person: String,
    pub position: Position,
    pub location: Location,
    /// `dd/MM/yyyy`, `yyyy-MM-dd` is accepted as well.
    pub date: String,
    pub income: String,
    pub expense: String,
    pub comment: String,
    pub taxable: bool,
    pub export_to: ExportTo,
    transaction_id: String,
}

impl EntryDraft {
    /// A blank form dated today, preselecting the configured defaults. New entries are taxable
    /// and leave the export target to the backend.
    pub fn new(position: Position, location: Location) -> Self {
        Self {
            person: String::new(),
            position,
            location,
            date: date::format_form(Local::now().date_naive()),
            income: "0".to_string(),
            expense: "0".to_string(),
            comment: String::new(),
            taxable: true,
            export_to: ExportTo::Auto,
            transaction_id: utils::generate_transaction_id(),
        }
    }

    pub fn transaction_id(&self) -> &str {
        &self.transaction_id
    }

    /// Whether the add button should be enabled.
    pub fn can_submit(&self) -> bool {
        self.validate().is_ok()
    }

    /// Checks the draft and converts it into a `NewEntry`.
    ///
    /// # Errors
    /// - `FinanceError::InvalidDate` if the date does not parse.
    /// - `FinanceError::InvalidAmount` if an amount is not a non-negative decimal.
    /// - An error if the person is empty, or if not exactly one of income and expense is positive.
    pub fn validate(&self) -> Result<NewEntry> {
        let person = self.person.trim();
        if person.is_empty() {
            bail!("A person is required");
        }
        let date = date::parse_input(&self.date).ok_or_else(|| FinanceError::InvalidDate {
            input: self.date.clone(),
        })?;
        let income = form_amount("income", &self.income)?;
        let expense = form_amount("expense", &self.expense)?;
        if income.is_positive() == expense.is_positive() {
            bail!("Enter either an income or an expense");
        }
        Ok(NewEntry {
            transaction_id: self.transaction_id.clone(),
            date,
            person: person.to_string(),
            location: self.location.clone(),
            position: self.position.clone(),
            income,
            expense,
            comment: self.comment.clone(),
            taxable: self.taxable,
            export_to: self.export_to,
        })
    }
}

fn form_amount(field: &str, input: &str) -> Result<Amount> {
    match Amount::from_str(input) {
        Ok(amount) if !amount.is_negative() => Ok(amount),
        _ => Err(FinanceError::InvalidAmount {
            field: field.to_string(),
            input: input.to_string(),
        }
        .into()),
    }
}

/// A validated entry, ready to be posted to `/incomeexpense/add`.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct NewEntry {
    transaction_id: String,
    date: NaiveDate,
    person: String,
    location: Location,
    position: Position,
    income: Amount,
    expense: Amount,
    comment: String,
    taxable: bool,
    export_to: ExportTo,
}

impl NewEntry {
    pub fn transaction_id(&self) -> &str {
        &self.transaction_id
    }

    pub fn to_payload(&self) -> Payload {
        let mut payload = Payload::default();
        payload.push("orderdate", date::format_wire(self.date));
        payload.push("who", &self.person);
        payload.push("position", self.position.display_name());
        payload.push("income", self.income.to_string());
        payload.push("expense", self.expense.to_string());
        payload.push("location", self.location.display_name());
        payload.push("comment", &self.comment);
        payload.push("taxable", self.taxable.to_string());
        payload.push("export_to", self.export_to.to_string());
        payload.push("transaction_id", &self.transaction_id);
        payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> EntryDraft {
        let mut draft = EntryDraft::new(
            Position::from_str("Food").unwrap(),
            Location::from_str("L1").unwrap(),
        );
        draft.person = "Bernd".to_string();
        draft.date = "01/06/2024".to_string();
        draft.income = "100".to_string();
        draft.expense = "0".to_string();
        draft
    }

    #[test]
    fn test_payload_fields() {
        let entry = draft().validate().unwrap();
        let payload = entry.to_payload();
        assert_eq!(payload.get("orderdate"), Some("2024-06-01"));
        assert_eq!(payload.get("who"), Some("Bernd"));
        assert_eq!(payload.get("position"), Some("Food"));
        assert_eq!(payload.get("location"), Some("L1"));
        assert_eq!(payload.get("income"), Some("100.00"));
        assert_eq!(payload.get("expense"), Some("0.00"));
        assert_eq!(payload.get("comment"), Some(""));
        assert_eq!(payload.get("taxable"), Some("true"));
        assert_eq!(payload.get("export_to"), Some("auto"));
        assert_eq!(payload.get("transaction_id"), Some(entry.transaction_id()));
    }

    #[test]
    fn test_tax_flags_reach_the_payload() {
        let mut d = draft();
        d.taxable = false;
        d.export_to = ExportTo::Hollgasse;
        let payload = d.validate().unwrap().to_payload();
        assert_eq!(payload.get("taxable"), Some("false"));
        assert_eq!(payload.get("export_to"), Some("hollgasse"));
    }

    #[test]
    fn test_amount_places_are_kept() {
        let mut d = draft();
        d.income = "100.125".to_string();
        let payload = d.validate().unwrap().to_payload();
        assert_eq!(payload.get("income"), Some("100.125"));
    }

    #[test]
    fn test_transaction_id_is_stable_per_draft() {
        let d = draft();
        let a = d.validate().unwrap();
        let b = d.validate().unwrap();
        assert_eq!(a.transaction_id(), b.transaction_id());
        assert_ne!(d.transaction_id(), draft().transaction_id());
    }

    #[test]
    fn test_requires_person() {
        let mut d = draft();
        d.person = "  ".to_string();
        assert!(!d.can_submit());
    }

    #[test]
    fn test_invalid_date() {
        let mut d = draft();
        d.date = "2024/06/01x".to_string();
        let err = d.validate().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FinanceError>(),
            Some(FinanceError::InvalidDate { .. })
        ));
    }

    #[test]
    fn test_invalid_amount() {
        let mut d = draft();
        d.income = "-5".to_string();
        let err = d.validate().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FinanceError>(),
            Some(FinanceError::InvalidAmount { .. })
        ));
    }

    #[test]
    fn test_exactly_one_amount() {
        let mut both = draft();
        both.expense = "3".to_string();
        assert!(!both.can_submit());

        let mut neither = draft();
        neither.income = String::new();
        assert!(!neither.can_submit());

        let mut expense_only = draft();
        expense_only.income = "0".to_string();
        expense_only.expense = "12.40".to_string();
        assert!(expense_only.can_submit());
    }
}
