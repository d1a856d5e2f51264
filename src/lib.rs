pub mod api;
pub mod args;
pub mod commands;
mod config;
pub mod edit;
mod error;
pub mod model;
pub mod orchestrator;
pub mod summary;
mod utils;


pub use api::Mode;
pub use config::Settings;
pub use error::Error;
pub use error::FinanceError;
pub use error::Result;
