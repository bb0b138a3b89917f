//! Narrow record-store contract. Two public collections (tags, profiles),
//! the OTP side store, and the accounts collection behind the auth service.
//!
//! The two linking writes (tag update + profile update) are deliberately a
//! single claim operation so a half-applied link can never be observed.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{Account, OtpRecord, Profile, ProfileChanges, TagRecord},
};

#[async_trait]
pub trait RecordStore: Send + Sync {
    // tags
    async fn get_tag(&self, code: &str) -> Result<Option<TagRecord>, AppError>;

    /// Provisions an unlinked tag. `Conflict` if the code already exists.
    async fn create_tag(&self, code: &str) -> Result<(), AppError>;

    /// Atomically appends `code` to the owner's `linked_codes` and marks the
    /// tag linked, conditional on the tag still being unlinked. `Conflict`
    /// when the tag was claimed in the meantime.
    async fn claim_tag(&self, code: &str, profile_id: Uuid) -> Result<(), AppError>;

    // profiles
    async fn get_profile(&self, user_id: Uuid) -> Result<Option<Profile>, AppError>;

    /// Array-membership lookup: the profile whose `linked_codes` contains
    /// `code`.
    async fn find_profile_by_code(&self, code: &str) -> Result<Option<Profile>, AppError>;

    async fn username_taken(&self, username: &str, exclude: Option<Uuid>)
    -> Result<bool, AppError>;

    async fn email_taken(&self, email: &str, exclude: Option<Uuid>) -> Result<bool, AppError>;

    /// Inserts a new profile and links its first tag in one atomic step; on
    /// any failure the tag stays unlinked and no profile is written.
    async fn insert_profile_linked(&self, profile: &Profile, code: &str) -> Result<(), AppError>;

    async fn update_profile(&self, user_id: Uuid, changes: &ProfileChanges)
    -> Result<(), AppError>;

    // otp codes
    async fn put_otp(&self, record: &OtpRecord) -> Result<(), AppError>;
    async fn get_otp(&self, email: &str) -> Result<Option<OtpRecord>, AppError>;
    async fn mark_otp_verified(&self, email: &str, at: DateTime<Utc>) -> Result<(), AppError>;
    async fn delete_otp(&self, email: &str) -> Result<(), AppError>;

    // accounts
    async fn insert_account(&self, account: &Account) -> Result<(), AppError>;
    async fn get_account(&self, id: Uuid) -> Result<Option<Account>, AppError>;
    async fn get_account_by_email(&self, email: &str) -> Result<Option<Account>, AppError>;
    async fn update_account_password(&self, id: Uuid, password_hash: &str)
    -> Result<(), AppError>;
}

/// Provisions the configured demo tag codes at startup. Idempotent: codes
/// that already exist are left untouched.
pub async fn seed_tags(store: &dyn RecordStore, codes: &[String]) -> Result<(), AppError> {
    for code in codes {
        if store.get_tag(code).await?.is_none() {
            store.create_tag(code).await?;
            info!(%code, "seeded unlinked tag");
        }
    }
    Ok(())
}
