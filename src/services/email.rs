use std::time::Duration;

use serde_json::json;
use tracing::debug;

use crate::config::EmailConfig;
use crate::error::{AppError, AppResult};
use crate::models::user::DeviceSessionDraft;

const MAIL_ENDPOINT: &str = "https://api.sendgrid.com/v3/mail/send";

/// Transactional mail over the provider's HTTP API. Callers run this off the
/// request path; with no API key configured (local development) sends are
/// logged and skipped.
pub struct EmailService {
    http: reqwest::Client,
    api_key: String,
    sender: String,
    sender_name: String,
}

impl EmailService {
    pub fn new(cfg: &EmailConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_default();

        Self {
            http,
            api_key: cfg.api_key.clone(),
            sender: cfg.sender.clone(),
            sender_name: cfg.sender_name.clone(),
        }
    }

    async fn send(&self, to: &str, subject: &str, text: &str, html: &str) -> AppResult<()> {
        if self.api_key.is_empty() {
            debug!(to, subject, "email provider not configured, skipping send");
            return Ok(());
        }

        let body = json!({
            "personalizations": [{ "to": [{ "email": to }] }],
            "from": { "email": self.sender, "name": self.sender_name },
            "subject": subject,
            "content": [
                { "type": "text/plain", "value": text },
                { "type": "text/html", "value": html },
            ],
        });

        let response = self
            .http
            .post(MAIL_ENDPOINT)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Internal(format!("mail send: {e}")))?;

        if !response.status().is_success() {
            return Err(AppError::Internal(format!(
                "mail provider returned {}",
                response.status()
            )));
        }
        Ok(())
    }

    pub async fn send_verification_email(&self, to: &str, code: &str) -> AppResult<()> {
        self.send(
            to,
            "Verify your email",
            &format!("Your verification code is: {code}"),
            &format!("<p>Your verification code is: <strong>{code}</strong></p>"),
        )
        .await
    }

    pub async fn send_login_notification(
        &self,
        to: &str,
        device: &DeviceSessionDraft,
    ) -> AppResult<()> {
        self.send(
            to,
            "New Login Detected",
            &format!(
                "New login detected from {} using {}",
                device.location, device.device_type
            ),
            &format!(
                "<p>New login detected from <strong>{}</strong> using <strong>{}</strong></p>",
                device.location, device.device_type
            ),
        )
        .await
    }

    pub async fn send_password_reset_email(&self, to: &str, code: &str) -> AppResult<()> {
        self.send(
            to,
            "Reset Your Password",
            &format!("Your password reset code is: {code}\nThis code will expire in 1 hour."),
            &format!(
                "<p>Your password reset code is: <strong>{code}</strong></p>\
                 <p>This code will expire in 1 hour.</p>"
            ),
        )
        .await
    }
}
