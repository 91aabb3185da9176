//! Delivery of run reports.
//!
//! Reports are always written to the log by the caller; a notifier is an
//! extra channel. Delivery problems are logged by [`deliver`] and never
//! change the outcome of a run.

use crate::config::NotifyConfig;
use crate::utils::errors::{BackupError, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tracing::{error, info};

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(30);

/// Subject line for a report
pub fn subject(has_errors: bool) -> String {
    if has_errors {
        "Backup Copy Summary - WITH ERRORS".to_string()
    } else {
        "Backup Copy Summary".to_string()
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, subject: &str, body: &str, has_errors: bool) -> Result<()>;
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    subject: &'a str,
    body: &'a str,
    has_errors: bool,
    host: String,
}

/// POSTs reports as JSON to a webhook
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(WEBHOOK_TIMEOUT).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

fn host_name() -> String {
    hostname::get()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unknown".to_string())
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, subject: &str, body: &str, has_errors: bool) -> Result<()> {
        let payload = WebhookPayload {
            subject,
            body,
            has_errors,
            host: host_name(),
        };

        let response = self.client.post(&self.url).json(&payload).send().await?;
        if !response.status().is_success() {
            return Err(BackupError::Transfer(format!(
                "Webhook returned HTTP {}",
                response.status()
            )));
        }

        info!("Notification sent to {}", self.url);
        Ok(())
    }
}

/// Notifier for the configured channel, if any.
pub fn from_config(config: &NotifyConfig) -> Result<Option<Box<dyn Notifier>>> {
    let Some(url) = &config.webhook_url else {
        return Ok(None);
    };
    let notifier: Box<dyn Notifier> = Box::new(WebhookNotifier::new(url.clone())?);
    Ok(Some(notifier))
}

/// Send a report, logging instead of failing when delivery goes wrong.
pub async fn deliver(notifier: &dyn Notifier, body: &str, has_errors: bool) {
    if let Err(e) = notifier.send(&subject(has_errors), body, has_errors).await {
        error!("Failed to send notification: {}", e);
    }
}
