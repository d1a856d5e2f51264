use crate::api::Backend;
use crate::args::EditArgs;
use crate::commands::Out;
use crate::edit::{EditSession, Field};
use crate::orchestrator::{Orchestrator, RefreshReport};
use crate::{utils, Result, Settings};
use anyhow::Context;
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tracing::debug;

/// Opens the transaction in `args.record`, applies the field overrides and submits the update.
///
/// # Errors
/// - Returns an error if the record cannot be read or parsed, if an edited value is invalid, or
///   if the backend rejects the update.
pub async fn edit(
    settings: Settings,
    backend: Arc<dyn Backend>,
    args: EditArgs,
) -> Result<Out<RefreshReport>> {
    let text = read_record(&args.record).await?;
    let mut session = EditSession::new();
    session
        .open_rendered(&text)
        .context("Unable to read the transaction to edit")?;
    let id = session
        .transaction()
        .map(|t| t.id().to_string())
        .unwrap_or_default();

    for (field, value) in [
        (Field::Date, args.date),
        (Field::Person, args.person),
        (Field::Location, args.location),
        (Field::Position, args.position),
        (Field::Income, args.income),
        (Field::Expense, args.expense),
        (Field::Comment, args.comment),
        (Field::Taxable, args.taxable),
        (Field::ExportTo, args.export_to),
    ] {
        if let Some(value) = value {
            session.set(field, value)?;
        }
    }
    if !session.is_dirty() {
        return Ok(format!("Nothing to change in transaction '{id}'").into());
    }

    let orchestrator = Orchestrator::from_settings(backend, &settings);
    let report = session.submit(&orchestrator).await;
    debug!("The edit session of '{id}' is {}", session.state());
    Ok(Out::new(format!("Updated transaction '{id}'"), report?))
}

async fn read_record(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut text = String::new();
        tokio::io::stdin()
            .read_to_string(&mut text)
            .await
            .context("Unable to read the transaction from stdin")?;
        Ok(text)
    } else {
        utils::read(path).await
    }
}
