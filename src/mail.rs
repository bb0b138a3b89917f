//! Outbound email. The OTP flow only ever sends one kind of message, so the
//! contract is a single `send` of an HTML body over authenticated SMTP.

use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, header::ContentType},
    transport::smtp::authentication::Credentials,
};

use crate::{config::SmtpConfig, error::AppError};

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, html_body: String) -> Result<(), AppError>;
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> Result<Self, anyhow::Error> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)?
            .credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ))
            .build();

        Ok(Self {
            transport,
            from: config.from.parse()?,
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, to: &str, subject: &str, html_body: String) -> Result<(), AppError> {
        let to: Mailbox = to
            .parse()
            .map_err(|_| AppError::Validation("invalid email address".into()))?;

        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(html_body)
            .map_err(|e| AppError::Delivery(format!("could not build message: {e}")))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| AppError::Delivery(format!("smtp send failed: {e}")))?;
        Ok(())
    }
}

pub fn otp_email_subject() -> &'static str {
    "Your password reset code"
}

pub fn otp_email_body(otp: &str) -> String {
    format!(
        r#"<div style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto; padding: 20px;">
  <h2 style="text-align: center;">Password Reset</h2>
  <p style="font-size: 16px; line-height: 1.6;">Your one-time code for resetting your password is:</p>
  <div style="text-align: center; margin: 30px 0;">
    <span style="font-size: 32px; font-weight: bold; letter-spacing: 6px;">{otp}</span>
  </div>
  <p>This code is valid for <strong>10 minutes</strong> only.</p>
  <p style="font-size: 14px;">If you didn't request this, please ignore this email.</p>
</div>"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_contains_the_code_verbatim() {
        let body = otp_email_body("042519");
        assert!(body.contains("042519"));
        assert!(body.contains("10 minutes"));
    }
}
