//! Operator alerts
//!
//! Raised when an ingester's consecutive failures reach its threshold.


use crate::error::{FabricError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;

/// One threshold crossing for one source
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    pub source_name: String,
    pub consecutive_errors: u32,
    pub last_error: String,
    pub raised_at: DateTime<Utc>,
}

impl Alert {
    pub fn new(
        source_name: &str,
        consecutive_errors: u32,
        last_error: &dyn std::fmt::Display,
    ) -> Self {
        Self {
            source_name: source_name.to_string(),
            consecutive_errors,
            last_error: last_error.to_string(),
            raised_at: Utc::now(),
        }
    }

    /// HTML body for chat channels
    pub fn to_html(&self) -> String {
        format!(
            "🚨 <b>Ingestion alert: {}</b>\n\n\
             Consecutive failures: <code>{}</code>\n\
             Last error: <code>{}</code>\n\
             Raised at: {}",
            escape_html(&self.source_name),
            self.consecutive_errors,
            escape_html(&self.last_error),
            self.raised_at.format("%Y-%m-%d %H:%M:%S UTC"),
        )
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn send_alert(&self, alert: &Alert) -> Result<()>;
}

/// Writes alerts to the log at error level
#[derive(Debug, Clone, Default)]
pub struct LogAlertSink;

#[async_trait]
impl AlertSink for LogAlertSink {
    async fn send_alert(&self, alert: &Alert) -> Result<()> {
        tracing::error!(
            source = %alert.source_name,
            consecutive_errors = alert.consecutive_errors,
            "ALERT: {} failed {} times in a row, last error: {}",
            alert.source_name,
            alert.consecutive_errors,
            alert.last_error
        );
        Ok(())
    }
}

/// Telegram notifier
#[derive(Clone)]
pub struct TelegramAlertSink {
    http: Client,
    bot_token: String,
    chat_id: String,
}

#[derive(Debug, Serialize)]
struct TelegramMessage {
    chat_id: String,
    text: String,
    parse_mode: String,
}

impl TelegramAlertSink {
    pub fn new(bot_token: String, chat_id: String) -> Self {
        Self {
            http: Client::new(),
            bot_token,
            chat_id,
        }
    }
}

#[async_trait]
impl AlertSink for TelegramAlertSink {
    async fn send_alert(&self, alert: &Alert) -> Result<()> {
        let url = format!(
            "https://api.telegram.org/bot{}/sendMessage",
            self.bot_token
        );

        let msg = TelegramMessage {
            chat_id: self.chat_id.clone(),
            text: alert.to_html(),
            parse_mode: "HTML".to_string(),
        };

        let response = self.http.post(&url).json(&msg).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(FabricError::Alert(format!(
                "Telegram send failed ({}): {}",
                status, error_text
            )));
        }

        Ok(())
    }
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
