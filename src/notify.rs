//! Notification boundary. Delivery proper (email, push) is an external
//! collaborator — this posts to a webhook when one is configured and
//! otherwise just records the request in the log.

use std::time::Duration;

use serde_json::json;
use tracing::info;

use crate::error::Result;

pub struct Notifier {
    client: reqwest::Client,
    webhook_url: Option<String>,
}

impl Notifier {
    pub fn new(webhook_url: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { client, webhook_url })
    }

    pub async fn send(&self, listing_id: &str, template: &str) -> Result<()> {
        let Some(url) = &self.webhook_url else {
            info!(listing_id, template, "notification requested (no webhook configured)");
            return Ok(());
        };

        self.client
            .post(url)
            .json(&json!({ "listing_id": listing_id, "template": template }))
            .send()
            .await?
            .error_for_status()?;

        info!(listing_id, template, "notification dispatched");
        Ok(())
    }
}
