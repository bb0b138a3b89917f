//! Email OTP password-reset flow: request, verify, reset. Each operation
//! works on the single record keyed by the caller's email, so a repeated
//! request overwrites rather than appends.
//!
//! Lifecycle per email: Absent -> Pending -> Verified -> Absent, where the
//! last transition happens on reset, on expiry detection, or by overwrite.

use chrono::{Duration, Utc};
use rand::Rng;
use validator::ValidateEmail;

use crate::{
    auth::AuthService,
    db::RecordStore,
    error::AppError,
    mail::{Mailer, otp_email_body, otp_email_subject},
    models::OtpRecord,
};

pub const OTP_TTL_MINUTES: i64 = 10;
const MIN_PASSWORD_LEN: usize = 6;

/// Uniformly random 6-digit code; leading zeros allowed.
pub fn generate_code() -> String {
    format!("{:06}", rand::rng().random_range(0..=999_999u32))
}

/// Stores a fresh code for `email` (overwriting any prior one) and mails it.
/// The stored code stays valid when delivery fails; requesting again simply
/// overwrites it.
pub async fn request_code(
    store: &dyn RecordStore,
    mailer: &dyn Mailer,
    email: &str,
) -> Result<(), AppError> {
    let email = email.trim();
    if email.is_empty() {
        return Err(AppError::Validation("email is required".into()));
    }
    if !email.validate_email() {
        return Err(AppError::Validation("invalid email address".into()));
    }

    let otp = generate_code();
    let now = Utc::now();
    let record = OtpRecord {
        email: email.to_string(),
        otp: otp.clone(),
        created_at: now,
        expires_at: now + Duration::minutes(OTP_TTL_MINUTES),
        verified: false,
        verified_at: None,
    };
    store.put_otp(&record).await?;

    mailer
        .send(email, otp_email_subject(), otp_email_body(&otp))
        .await
}

/// Exact string match, no normalization, no attempt counter. A correct code
/// marks the record verified without deleting it; detecting expiry deletes
/// the record as a side effect.
pub async fn verify_code(
    store: &dyn RecordStore,
    email: &str,
    code: &str,
) -> Result<(), AppError> {
    let email = email.trim();
    if email.is_empty() || code.is_empty() {
        return Err(AppError::Validation("email and otp are required".into()));
    }

    let record = store.get_otp(email).await?.ok_or(AppError::NotFound)?;

    if Utc::now() > record.expires_at {
        store.delete_otp(email).await?;
        return Err(AppError::Expired);
    }

    if record.otp != code {
        return Err(AppError::Mismatch);
    }

    store.mark_otp_verified(email, Utc::now()).await
}

/// The verified record is the only gate; success consumes it by deletion.
pub async fn reset_password(
    store: &dyn RecordStore,
    auth: &AuthService,
    email: &str,
    new_password: &str,
) -> Result<(), AppError> {
    let email = email.trim();
    if email.is_empty() || new_password.is_empty() {
        return Err(AppError::Validation(
            "email and new password are required".into(),
        ));
    }
    if new_password.len() < MIN_PASSWORD_LEN {
        return Err(AppError::Validation(
            "password must be at least 6 characters long".into(),
        ));
    }

    match store.get_otp(email).await? {
        Some(record) if record.verified => {}
        _ => return Err(AppError::NotVerified),
    }

    auth.update_password(email, new_password).await?;
    store.delete_otp(email).await
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use super::*;
    use crate::db::memory::MemoryStore;

    /// Captures outbound mail instead of sending it.
    #[derive(Default)]
    struct RecordingMailer {
        sent: Mutex<Vec<(String, String)>>,
        fail: bool,
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send(&self, to: &str, _subject: &str, body: String) -> Result<(), AppError> {
            if self.fail {
                return Err(AppError::Delivery("smtp down".into()));
            }
            self.sent.lock().await.push((to.to_string(), body));
            Ok(())
        }
    }

    fn auth_service(store: &Arc<MemoryStore>) -> AuthService {
        AuthService::new(store.clone(), "test-secret")
    }

    #[test]
    fn generated_codes_are_six_digits() {
        for _ in 0..100 {
            let code = generate_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[tokio::test]
    async fn request_persists_a_pending_record() {
        let store = MemoryStore::new();
        let mailer = RecordingMailer::default();

        request_code(&store, &mailer, "a@b.com").await.unwrap();

        let record = store.get_otp("a@b.com").await.unwrap().unwrap();
        assert_eq!(record.otp.len(), 6);
        assert!(!record.verified);
        assert_eq!(
            (record.expires_at - record.created_at).num_minutes(),
            OTP_TTL_MINUTES
        );

        let sent = mailer.sent.lock().await;
        assert_eq!(sent.len(), 1);
        assert!(sent[0].1.contains(&record.otp));
    }

    #[tokio::test]
    async fn missing_email_is_a_validation_error() {
        let store = MemoryStore::new();
        let mailer = RecordingMailer::default();

        assert!(matches!(
            request_code(&store, &mailer, "  ").await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            request_code(&store, &mailer, "not-an-email").await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn delivery_failure_leaves_the_stored_code_valid() {
        let store = MemoryStore::new();
        let mailer = RecordingMailer {
            fail: true,
            ..Default::default()
        };

        assert!(matches!(
            request_code(&store, &mailer, "a@b.com").await,
            Err(AppError::Delivery(_))
        ));

        let record = store.get_otp("a@b.com").await.unwrap().unwrap();
        verify_code(&store, "a@b.com", &record.otp).await.unwrap();
    }

    #[tokio::test]
    async fn second_request_invalidates_the_first_code() {
        let store = MemoryStore::new();
        let mailer = RecordingMailer::default();

        request_code(&store, &mailer, "a@b.com").await.unwrap();
        let first = store.get_otp("a@b.com").await.unwrap().unwrap().otp;

        // Astronomically unlikely to collide forever; bail after a bound.
        let mut second = first.clone();
        for _ in 0..20 {
            request_code(&store, &mailer, "a@b.com").await.unwrap();
            second = store.get_otp("a@b.com").await.unwrap().unwrap().otp;
            if second != first {
                break;
            }
        }
        assert_ne!(first, second);

        assert!(matches!(
            verify_code(&store, "a@b.com", &first).await,
            Err(AppError::Mismatch)
        ));
    }

    #[tokio::test]
    async fn verify_unknown_email_is_not_found() {
        let store = MemoryStore::new();

        assert!(matches!(
            verify_code(&store, "ghost@b.com", "123456").await,
            Err(AppError::NotFound)
        ));
    }

    #[tokio::test]
    async fn expired_code_is_deleted_on_detection() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store
            .put_otp(&OtpRecord {
                email: "a@b.com".into(),
                otp: "123456".into(),
                created_at: now - Duration::minutes(11),
                expires_at: now - Duration::minutes(1),
                verified: false,
                verified_at: None,
            })
            .await
            .unwrap();

        assert!(matches!(
            verify_code(&store, "a@b.com", "123456").await,
            Err(AppError::Expired)
        ));

        // The record is gone, so a retry is NotFound rather than Expired.
        assert!(matches!(
            verify_code(&store, "a@b.com", "123456").await,
            Err(AppError::NotFound)
        ));
    }

    #[tokio::test]
    async fn correct_code_marks_verified_without_deleting() {
        let store = MemoryStore::new();
        let mailer = RecordingMailer::default();

        request_code(&store, &mailer, "a@b.com").await.unwrap();
        let otp = store.get_otp("a@b.com").await.unwrap().unwrap().otp;

        verify_code(&store, "a@b.com", &otp).await.unwrap();

        let record = store.get_otp("a@b.com").await.unwrap().unwrap();
        assert!(record.verified);
        assert!(record.verified_at.is_some());
    }

    #[tokio::test]
    async fn reset_without_verify_is_rejected() {
        let store = Arc::new(MemoryStore::new());
        let auth = auth_service(&store);
        let mailer = RecordingMailer::default();

        // No record at all.
        assert!(matches!(
            reset_password(store.as_ref(), &auth, "a@b.com", "longenough").await,
            Err(AppError::NotVerified)
        ));

        // Pending but unverified record.
        request_code(store.as_ref(), &mailer, "a@b.com").await.unwrap();
        assert!(matches!(
            reset_password(store.as_ref(), &auth, "a@b.com", "longenough").await,
            Err(AppError::NotVerified)
        ));
    }

    #[tokio::test]
    async fn short_password_fails_validation() {
        let store = Arc::new(MemoryStore::new());
        let auth = auth_service(&store);

        assert!(matches!(
            reset_password(store.as_ref(), &auth, "a@b.com", "five5").await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn reset_requires_a_matching_account() {
        let store = Arc::new(MemoryStore::new());
        let auth = auth_service(&store);
        let mailer = RecordingMailer::default();

        request_code(store.as_ref(), &mailer, "a@b.com").await.unwrap();
        let otp = store.get_otp("a@b.com").await.unwrap().unwrap().otp;
        verify_code(store.as_ref(), "a@b.com", &otp).await.unwrap();

        assert!(matches!(
            reset_password(store.as_ref(), &auth, "a@b.com", "longenough").await,
            Err(AppError::AccountNotFound)
        ));
    }

    #[tokio::test]
    async fn full_reset_consumes_the_record() {
        let store = Arc::new(MemoryStore::new());
        let auth = auth_service(&store);
        let mailer = RecordingMailer::default();

        auth.sign_up("a@b.com", "original-pw").await.unwrap();

        request_code(store.as_ref(), &mailer, "a@b.com").await.unwrap();
        let otp = store.get_otp("a@b.com").await.unwrap().unwrap().otp;
        verify_code(store.as_ref(), "a@b.com", &otp).await.unwrap();

        reset_password(store.as_ref(), &auth, "a@b.com", "password8").await.unwrap();

        // One-time use: the record no longer exists.
        assert!(store.get_otp("a@b.com").await.unwrap().is_none());
        assert!(auth.sign_in("a@b.com", "password8").await.is_ok());
        assert!(auth.sign_in("a@b.com", "original-pw").await.is_err());
    }
}
