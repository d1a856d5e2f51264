use crate::model::CategoryKey;
use serde::Serialize;

pub type Error = anyhow::Error;
pub type Result<T> = std::result::Result<T, Error>;

/// The failures that callers are expected to tell apart. They are carried inside an
/// `anyhow::Error` where they cross an API boundary and can be recovered with `downcast_ref`.
///
/// None of these abort sibling work: a malformed record drops only that record, a failed
/// category leaves only that category stale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FinanceError {
    /// A record from the backend, or a legacy text rendering of one, is missing a required field
    /// or has a field that cannot be read as its expected type.
    #[error("malformed record: {reason}")]
    MalformedRecord { reason: String },

    /// A single category could not be fetched or its value could not be read.
    #[error("unable to fetch '{key}': {reason}")]
    CategoryFetchError { key: CategoryKey, reason: String },

    /// The date buffer of an edit session, or the date of an entry form, is not a date.
    #[error("'{input}' is not a valid date, expected dd/MM/yyyy or yyyy-MM-dd")]
    InvalidDate { input: String },

    /// An amount typed into a form is not a non-negative decimal.
    #[error("'{input}' is not a valid amount for {field}")]
    InvalidAmount { field: String, input: String },

    /// The backend has already processed this transaction id. Informational only.
    #[error("transaction '{transaction_id}' was already submitted")]
    DuplicateSubmission { transaction_id: String },
}

impl FinanceError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        FinanceError::MalformedRecord {
            reason: reason.into(),
        }
    }

    pub(crate) fn category(key: &CategoryKey, reason: impl Into<String>) -> Self {
        FinanceError::CategoryFetchError {
            key: key.clone(),
            reason: reason.into(),
        }
    }
}
