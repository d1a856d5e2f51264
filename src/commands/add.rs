use crate::api::Backend;
use crate::args::AddArgs;
use crate::commands::Out;
use crate::model::EntryDraft;
use crate::orchestrator::{AddOutcome, AddReport, Orchestrator};
use crate::{Result, Settings};
use anyhow::Context;
use std::sync::Arc;
use tracing::warn;

/// Validates the entry described by `args`, submits it and refreshes.
///
/// Position and location fall back to the defaults from the settings, the date to today. A
/// duplicate submission is reported in the message, it is not an error.
///
/// # Errors
/// - Returns an error if the entry is invalid or if the backend does not accept it.
pub async fn add(
    settings: Settings,
    backend: Arc<dyn Backend>,
    args: AddArgs,
) -> Result<Out<AddReport>> {
    let mut draft = EntryDraft::new(
        args.position
            .unwrap_or_else(|| settings.default_position().clone()),
        args.location
            .unwrap_or_else(|| settings.default_location().clone()),
    );
    draft.person = args.person;
    if let Some(date) = args.date {
        draft.date = date;
    }
    draft.income = args.income.unwrap_or_else(|| "0".to_string());
    draft.expense = args.expense.unwrap_or_else(|| "0".to_string());
    draft.comment = args.comment;
    draft.taxable = !args.not_taxable;
    draft.export_to = args.export_to.unwrap_or_default();

    let entry = draft.validate().context("The entry cannot be submitted")?;
    if !settings.persons().is_empty() && !settings.persons().iter().any(|p| *p == draft.person) {
        warn!("'{}' is not one of the configured persons", draft.person);
    }

    let orchestrator = Orchestrator::from_settings(backend, &settings);
    let report = orchestrator.add(&entry).await?;
    let message = match report.outcome.notice() {
        Some(notice) => notice.to_string(),
        None => format!("Added transaction '{}'", entry.transaction_id()),
    };
    if report.outcome == AddOutcome::Added && !report.refresh.failures.is_empty() {
        // the entry is stored, only the refresh after it fell short
        warn!(
            "{} categories could not be refreshed",
            report.refresh.failures.len()
        );
    }
    Ok(Out::new(message, report))
}
