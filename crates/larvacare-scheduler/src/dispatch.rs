//! Notification dispatch — actually delivers reminders.
//! Supports: Twilio SMS, generic HTTP webhook, and a log-only dry run.

use std::time::Duration;

use async_trait::async_trait;
use larvacare_core::config::{SmsConfig, SmsProvider};

use crate::notify::NotificationGateway;

/// Twilio Programmable SMS.
pub struct TwilioGateway {
    client: reqwest::Client,
    api_base: String,
    account_sid: String,
    auth_token: String,
    from_number: String,
    timeout: Duration,
}

impl TwilioGateway {
    pub fn new(config: &SmsConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            account_sid: config.account_sid.clone(),
            auth_token: config.auth_token.clone(),
            from_number: config.from_number.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.api_base, self.account_sid
        )
    }

    async fn try_send(&self, to: &str, message: &str) -> Result<String, String> {
        if self.account_sid.is_empty() || self.auth_token.is_empty() || self.from_number.is_empty() {
            return Err(
                "Twilio credentials not configured. Set TWILIO_ACCOUNT_SID, TWILIO_AUTH_TOKEN and TWILIO_PHONE_NUMBER."
                    .into(),
            );
        }

        let resp = self
            .client
            .post(self.messages_url())
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[("To", to), ("From", self.from_number.as_str()), ("Body", message)])
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| format!("Twilio send failed: {e}"))?;

        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(format!("Twilio API error {status}: {body}"));
        }
        let sid = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| v["sid"].as_str().map(str::to_string))
            .unwrap_or_default();
        Ok(sid)
    }
}

#[async_trait]
impl NotificationGateway for TwilioGateway {
    async fn send(&self, to: &str, message: &str) -> bool {
        match self.try_send(to, message).await {
            Ok(sid) => {
                tracing::info!("✅ SMS sent to {to} (sid: {sid})");
                true
            }
            Err(e) => {
                tracing::error!("❌ SMS to {to} failed: {e}");
                false
            }
        }
    }

    fn name(&self) -> &str {
        "twilio"
    }
}

/// Generic HTTP webhook — POST with a JSON body.
pub struct WebhookGateway {
    client: reqwest::Client,
    url: String,
    headers: Vec<(String, String)>,
    timeout: Duration,
}

impl WebhookGateway {
    pub fn new(url: &str, timeout_secs: u64) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.to_string(),
            headers: Vec::new(),
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// Add a header sent with every request (e.g. an auth token).
    pub fn with_header(mut self, key: &str, value: &str) -> Self {
        self.headers.push((key.to_string(), value.to_string()));
        self
    }

    async fn try_send(&self, to: &str, message: &str) -> Result<(), String> {
        let mut req = self
            .client
            .post(&self.url)
            .json(&serde_json::json!({
                "to": to,
                "message": message,
                "timestamp": chrono::Utc::now().to_rfc3339(),
            }))
            .timeout(self.timeout);

        for (key, value) in &self.headers {
            req = req.header(key.as_str(), value.as_str());
        }

        let resp = req
            .send()
            .await
            .map_err(|e| format!("Webhook send failed: {e}"))?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(format!("Webhook error {}", resp.status()))
        }
    }
}

#[async_trait]
impl NotificationGateway for WebhookGateway {
    async fn send(&self, to: &str, message: &str) -> bool {
        match self.try_send(to, message).await {
            Ok(()) => {
                tracing::info!("✅ Webhook notification for {to} sent to {}", self.url);
                true
            }
            Err(e) => {
                tracing::warn!("⚠️ Webhook notification for {to} failed: {e}");
                false
            }
        }
    }

    fn name(&self) -> &str {
        "webhook"
    }
}

/// Dry run: writes the message to the log and reports success.
#[derive(Default)]
pub struct LogGateway;

#[async_trait]
impl NotificationGateway for LogGateway {
    async fn send(&self, to: &str, message: &str) -> bool {
        tracing::info!("📨 [dry-run] to {to}: {}", message.replace('\n', " | "));
        true
    }

    fn name(&self) -> &str {
        "log"
    }
}

/// Build the gateway selected in config.
pub fn gateway_from_config(config: &SmsConfig) -> Box<dyn NotificationGateway> {
    if !config.is_configured() {
        tracing::warn!("⚠️ SMS provider {:?} is not fully configured; sends will fail", config.provider);
    }
    match config.provider {
        SmsProvider::Twilio => Box::new(TwilioGateway::new(config)),
        SmsProvider::Webhook => Box::new(WebhookGateway::new(&config.webhook_url, config.timeout_secs)),
        SmsProvider::Log => Box::new(LogGateway),
    }
}
