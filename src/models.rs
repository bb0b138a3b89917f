//! Record types for the three collections (tags, profiles, OTP codes), the
//! auth accounts backing them, and the request payloads of the HTTP surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// A physical NFC tag, keyed by the code printed into it.
///
/// Created unlinked; linked exactly once when a profile claims it. Never
/// unlinked or deleted afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TagRecord {
    pub code: String,
    pub is_linked: bool,
    pub linked_to: Option<Uuid>,
}

impl TagRecord {
    pub fn unlinked(code: &str) -> Self {
        Self {
            code: code.to_string(),
            is_linked: false,
            linked_to: None,
        }
    }
}

/// A user's public contact card. `user_id` is the owning account and never
/// changes; `linked_codes` is append-only.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub user_id: Uuid,
    pub name: String,
    pub username: String,
    pub email: String,
    pub bio: Option<String>,
    pub photo: Option<String>,
    pub phone: Option<String>,
    pub whatsapp: Option<String>,
    pub instagram: Option<String>,
    pub facebook: Option<String>,
    pub linked_codes: Vec<String>,
}

/// Mutable portion of a profile, written as a whole by the edit flow.
/// `None` clears the field.
#[derive(Debug, Clone)]
pub struct ProfileChanges {
    pub name: String,
    pub username: String,
    pub email: String,
    pub bio: Option<String>,
    pub photo: Option<String>,
    pub phone: Option<String>,
    pub whatsapp: Option<String>,
    pub instagram: Option<String>,
    pub facebook: Option<String>,
}

/// Credential record behind the auth contract. Not exposed on the profile
/// surface.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Account {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// One-time password-reset code, keyed by email. A new request overwrites
/// the previous record; at most one live code per email.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct OtpRecord {
    pub email: String,
    pub otp: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub verified: bool,
    pub verified_at: Option<DateTime<Utc>>,
}

/// Authenticated caller, resolved once at request entry from the bearer
/// token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: Uuid,
    pub email: String,
}

// --- request payloads ---

#[derive(Debug, Deserialize, Validate)]
pub struct SignupRequest {
    #[validate(email(message = "invalid email address"))]
    pub email: String,
    #[validate(length(min = 6, message = "password must be at least 6 characters long"))]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub token: String,
    pub user_id: Uuid,
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct SendOtpRequest {
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyOtpRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub otp: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default, rename = "newPassword")]
    pub new_password: String,
}

/// Form fields shared by the create and edit flows. Empty strings mean
/// "no value", not "no change".
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileInput {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub photo: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub whatsapp: String,
    #[serde(default)]
    pub instagram: String,
    #[serde(default)]
    pub facebook: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateProfileRequest {
    #[serde(default)]
    pub code: String,
    #[serde(flatten)]
    pub profile: ProfileInput,
}

#[derive(Debug, Deserialize)]
pub struct ProvisionTagRequest {
    #[serde(default)]
    pub code: String,
}
