//! Types that represent the core data model, such as `Transaction` and `CategoryKey`.
mod amount;
mod catalog;
mod category;
pub mod date;
mod entry;
mod transaction;

pub use amount::{Amount, AmountError, NULL_LITERAL};
pub use catalog::{ExportTo, Location, Position, PositionGroup};
pub use category::{CategoryKey, ADD_PATH, BASE_PATH, PUT_PATH};
pub use entry::{EntryDraft, NewEntry};
pub use transaction::{Payload, Transaction};
