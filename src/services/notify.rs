use crate::db::EmailConfig;
use anyhow::Result;
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Webhook delivery failed for {url}: {reason}")]
    Webhook { url: String, reason: String },

    #[error("Email delivery failed for {to}: {reason}")]
    Email { to: String, reason: String },
}

/// What gets pushed to a channel when an alert matches a fare.
#[derive(Debug, Clone, Serialize)]
pub struct NotificationPayload {
    pub alert_id: i32,
    pub origin: String,
    pub destination: String,
    pub flight_date: String,
    pub flight_no: Option<String>,
    pub departure: Option<String>,
    pub arrival: Option<String>,
    pub cabin: String,
    pub program: String,
    pub miles: i64,
    pub taxes_usd: f64,
    pub is_new_low: bool,
    pub previous_low_miles: Option<i64>,
}

impl NotificationPayload {
    #[must_use]
    pub fn subject(&self) -> String {
        let marker = if self.is_new_low { "NEW LOW " } else { "" };
        format!(
            "[milewatch] {}{} -> {} {} for {} miles",
            marker, self.origin, self.destination, self.cabin, self.miles
        )
    }

    #[must_use]
    pub fn body_text(&self) -> String {
        let mut lines = vec![
            format!("Route:   {} -> {}", self.origin, self.destination),
            format!("Date:    {}", self.flight_date),
        ];
        if let Some(flight_no) = &self.flight_no {
            lines.push(format!("Flight:  {flight_no}"));
        }
        if let (Some(dep), Some(arr)) = (&self.departure, &self.arrival) {
            lines.push(format!("Times:   {dep} -> {arr}"));
        }
        lines.push(format!("Cabin:   {}", self.cabin));
        lines.push(format!("Program: {}", self.program));
        lines.push(format!("Miles:   {}", self.miles));
        lines.push(format!("Taxes:   ${:.2}", self.taxes_usd));
        if self.is_new_low {
            let prev = self
                .previous_low_miles
                .map_or_else(|| "n/a".to_string(), |m| m.to_string());
            lines.push(format!("New low! Previous best: {prev} miles"));
        }
        lines.join("\n")
    }
}

/// Delivery seam, mocked in engine tests.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send_webhook(&self, url: &str, payload: &NotificationPayload) -> Result<()>;

    async fn send_email(
        &self,
        config: &EmailConfig,
        to: &str,
        payload: &NotificationPayload,
    ) -> Result<()>;
}

/// Production sender: JSON POST for webhooks, SMTP for email.
pub struct HttpNotifier {
    client: reqwest::Client,
}

impl HttpNotifier {
    pub fn new(timeout: std::time::Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    fn smtp_transport(config: &EmailConfig) -> Result<AsyncSmtpTransport<Tokio1Executor>> {
        let builder = if config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)?
                .port(config.smtp_port)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.smtp_host)
                .port(config.smtp_port)
        };

        let builder = builder.credentials(Credentials::new(
            config.username.clone(),
            config.password.clone(),
        ));

        Ok(builder.build())
    }
}

#[async_trait]
impl NotificationSender for HttpNotifier {
    async fn send_webhook(&self, url: &str, payload: &NotificationPayload) -> Result<()> {
        let response = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .json(payload)
            .send()
            .await
            .map_err(|e| NotifyError::Webhook {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(NotifyError::Webhook {
                url: url.to_string(),
                reason: format!("HTTP {}", response.status()),
            }
            .into());
        }

        debug!("Webhook delivered to {}", url);
        Ok(())
    }

    async fn send_email(
        &self,
        config: &EmailConfig,
        to: &str,
        payload: &NotificationPayload,
    ) -> Result<()> {
        let map_err = |reason: String| NotifyError::Email {
            to: to.to_string(),
            reason,
        };

        let email = Message::builder()
            .from(config.from_addr.parse().map_err(|e| {
                map_err(format!("invalid from address '{}': {e}", config.from_addr))
            })?)
            .to(to.parse().map_err(|e| map_err(format!("invalid to address: {e}")))?)
            .subject(payload.subject())
            .header(ContentType::TEXT_PLAIN)
            .body(payload.body_text())
            .map_err(|e| map_err(format!("failed to build message: {e}")))?;

        let transport = Self::smtp_transport(config)?;
        transport
            .send(email)
            .await
            .map_err(|e| map_err(format!("SMTP send failed: {e}")))?;

        info!("Email alert sent to {}", to);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_payload() -> NotificationPayload {
        NotificationPayload {
            alert_id: 3,
            origin: "SFO".to_string(),
            destination: "NRT".to_string(),
            flight_date: "2026-10-01".to_string(),
            flight_no: Some("NH7".to_string()),
            departure: Some("2026-10-01T11:05:00".to_string()),
            arrival: Some("2026-10-02T14:15:00".to_string()),
            cabin: "business".to_string(),
            program: "ana".to_string(),
            miles: 75_000,
            taxes_usd: 42.50,
            is_new_low: true,
            previous_low_miles: Some(85_000),
        }
    }

    #[test]
    fn subject_flags_new_lows() {
        let payload = sample_payload();
        assert!(payload.subject().contains("NEW LOW"));

        let ordinary = NotificationPayload {
            is_new_low: false,
            ..payload
        };
        assert!(!ordinary.subject().contains("NEW LOW"));
    }

    #[test]
    fn body_includes_flight_and_previous_low() {
        let body = sample_payload().body_text();
        assert!(body.contains("NH7"));
        assert!(body.contains("2026-10-01T11:05:00 -> 2026-10-02T14:15:00"));
        assert!(body.contains("Previous best: 85000 miles"));
    }

    #[tokio::test]
    async fn webhook_failure_is_reported() {
        let notifier = HttpNotifier::new(std::time::Duration::from_millis(200)).unwrap();
        let result = notifier
            .send_webhook("http://127.0.0.1:1/unreachable", &sample_payload())
            .await;
        assert!(result.is_err());
    }
}
