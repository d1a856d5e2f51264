//! Implements the `Backend` trait with `reqwest` against the real service.

use crate::api::{Backend, Response};
use crate::model::Payload;
use crate::{Result, Settings};
use anyhow::Context;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, RequestBuilder};
use std::time::Duration;
use tracing::trace;
use url::Url;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Talks to the backend at `Settings::base_url`. Request deadlines are left to the caller.
pub struct HttpBackend {
    client: Client,
    base: Url,
}

impl HttpBackend {
    pub fn new(settings: &Settings) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .context("Unable to create the HTTP client")?;
        Ok(Self {
            client,
            base: settings.base_url()?,
        })
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .with_context(|| format!("Unable to build a URL from '{}' and '{path}'", self.base))
    }

    async fn send(&self, request: RequestBuilder, description: String) -> Result<Response> {
        trace!("{description}");
        let response = request
            .send()
            .await
            .with_context(|| format!("{description} failed"))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .with_context(|| format!("Unable to read the response body of {description}"))?;
        trace!("{description} answered {status}: {body}");
        Ok(Response::new(status, body))
    }
}

#[async_trait::async_trait]
impl Backend for HttpBackend {
    async fn get(&self, path: &str) -> Result<Response> {
        let url = self.url(path)?;
        let description = format!("GET {url}");
        self.send(self.client.get(url), description).await
    }

    async fn post(&self, path: &str, payload: &Payload) -> Result<Response> {
        let url = self.url(path)?;
        let description = format!("POST {url}");
        let request = self
            .client
            .post(url)
            .header(CONTENT_TYPE, FORM_CONTENT_TYPE)
            .body(form(payload));
        self.send(request, description).await
    }

    async fn put(&self, path: &str, payload: &Payload) -> Result<Response> {
        let url = self.url(path)?;
        let description = format!("PUT {url}");
        let request = self
            .client
            .put(url)
            .header(CONTENT_TYPE, FORM_CONTENT_TYPE)
            .body(form(payload));
        self.send(request, description).await
    }
}

fn form(payload: &Payload) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(
            payload
                .fields()
                .iter()
                .map(|(name, value)| (name.as_str(), value.as_str())),
        )
        .finish()
}
