//! The `Backend` trait is the seam between this crate and the income/expense REST service.
//!
//! `HttpBackend` talks to the real service. `TestBackend` serves the same routes from memory so
//! that the whole program, top-to-bottom, can run without a server.

mod envelope;
mod http;
mod test_backend;

use crate::model::Payload;
use crate::{Result, Settings};
use std::sync::Arc;

pub(crate) use envelope::{is_duplicate, parse_list, parse_scalar};
pub use http::HttpBackend;
pub use test_backend::{Recorded, Script, TestBackend};

/// When this variable is set to a non-empty value the binary runs against `TestBackend`.
pub const TEST_MODE_ENV: &str = "BALANCE_SHEET_TEST_MODE";

/// Which backend implementation to use.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    #[default]
    Http,
    Testing,
}

impl Mode {
    /// `Mode::Testing` if `BALANCE_SHEET_TEST_MODE` is set and non-empty, otherwise `Mode::Http`.
    pub fn from_env() -> Self {
        match std::env::var(TEST_MODE_ENV) {
            Ok(value) if !value.is_empty() => Mode::Testing,
            _ => Mode::Http,
        }
    }
}

/// A response that arrived, whatever its status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    status: u16,
    body: String,
}

impl Response {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn ok(body: impl Into<String>) -> Self {
        Self::new(200, body)
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_server_error(&self) -> bool {
        self.status >= 500
    }

    pub fn is_conflict(&self) -> bool {
        self.status == 409
    }
}

/// The REST surface of the backend. `path` is relative to the base URL and may carry a query.
///
/// An `Err` means no response arrived (connection refused, reset, unreadable body). A response
/// with an error status is still an `Ok`.
#[async_trait::async_trait]
pub trait Backend: Send + Sync {
    async fn get(&self, path: &str) -> Result<Response>;

    /// POST `payload` as a form.
    async fn post(&self, path: &str, payload: &Payload) -> Result<Response>;

    /// PUT `payload` as a form.
    async fn put(&self, path: &str, payload: &Payload) -> Result<Response>;
}

/// Creates the backend for `mode`.
pub fn backend(settings: &Settings, mode: Mode) -> Result<Arc<dyn Backend>> {
    Ok(match mode {
        Mode::Http => Arc::new(HttpBackend::new(settings)?),
        Mode::Testing => Arc::new(TestBackend::default()),
    })
}
