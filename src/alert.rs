use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Serialize;

use crate::error::IngestError;

/// Out-of-band notification for fatal feed errors. Delivery is best effort;
/// implementations log their own failures and never return them.
pub trait Alerter: Send + Sync {
    fn notify(&self, title: &str, message: &str);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LogAlerter;

impl Alerter for LogAlerter {
    fn notify(&self, title: &str, message: &str) {
        tracing::error!(alert = title, "{message}");
    }
}

#[derive(Serialize)]
struct AlertBody<'a> {
    title: &'a str,
    message: &'a str,
}

#[derive(Clone)]
pub struct WebhookAlerter {
    client: Client,
    url: String,
}

impl WebhookAlerter {
    pub fn new(url: impl Into<String>) -> Result<Self, IngestError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("ratings-ingest/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| IngestError::InvalidConfig(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|err| IngestError::Transport(err.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

impl Alerter for WebhookAlerter {
    fn notify(&self, title: &str, message: &str) {
        tracing::error!(alert = title, "{message}");
        let result = self
            .client
            .post(&self.url)
            .json(&AlertBody { title, message })
            .send();
        match result {
            Ok(resp) if resp.status().is_success() => {}
            Ok(resp) => tracing::warn!(
                status = resp.status().as_u16(),
                "alert webhook rejected notification"
            ),
            Err(err) => tracing::warn!("alert webhook unreachable: {err}"),
        }
    }
}

/// Chosen at startup from configuration.
pub enum ConfiguredAlerter {
    Log(LogAlerter),
    Webhook(WebhookAlerter),
}

impl ConfiguredAlerter {
    pub fn from_webhook(url: Option<&str>) -> Result<Self, IngestError> {
        match url {
            Some(url) => Ok(Self::Webhook(WebhookAlerter::new(url)?)),
            None => Ok(Self::Log(LogAlerter)),
        }
    }
}

impl Alerter for ConfiguredAlerter {
    fn notify(&self, title: &str, message: &str) {
        match self {
            Self::Log(alerter) => alerter.notify(title, message),
            Self::Webhook(alerter) => alerter.notify(title, message),
        }
    }
}
