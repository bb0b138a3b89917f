//! In-memory record store. Used by the test suite and by local demo runs
//! without a `DATABASE_URL`. One lock over all collections, so the claim
//! operations are trivially atomic.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{Account, OtpRecord, Profile, ProfileChanges, TagRecord},
};

use super::RecordStore;

#[derive(Default)]
struct Collections {
    tags: HashMap<String, TagRecord>,
    profiles: HashMap<Uuid, Profile>,
    otp_codes: HashMap<String, OtpRecord>,
    accounts: HashMap<Uuid, Account>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Collections>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
impl MemoryStore {
    /// Test hook: link a tag without touching any profile, producing the
    /// inconsistent state the resolver must tolerate.
    pub async fn force_link(&self, code: &str, profile_id: Uuid) {
        let mut inner = self.inner.write().await;
        let tag = inner
            .tags
            .entry(code.to_string())
            .or_insert_with(|| TagRecord::unlinked(code));
        tag.is_linked = true;
        tag.linked_to = Some(profile_id);
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn get_tag(&self, code: &str) -> Result<Option<TagRecord>, AppError> {
        Ok(self.inner.read().await.tags.get(code).cloned())
    }

    async fn create_tag(&self, code: &str) -> Result<(), AppError> {
        let mut inner = self.inner.write().await;
        if inner.tags.contains_key(code) {
            return Err(AppError::Conflict("tag"));
        }
        inner.tags.insert(code.to_string(), TagRecord::unlinked(code));
        Ok(())
    }

    async fn claim_tag(&self, code: &str, profile_id: Uuid) -> Result<(), AppError> {
        let mut inner = self.inner.write().await;

        match inner.tags.get(code) {
            None => return Err(AppError::NotFound),
            Some(tag) if tag.is_linked => return Err(AppError::Conflict("tag")),
            Some(_) => {}
        }

        let profile = inner
            .profiles
            .get_mut(&profile_id)
            .ok_or(AppError::Inconsistent)?;
        profile.linked_codes.push(code.to_string());

        let tag = inner.tags.get_mut(code).ok_or(AppError::Inconsistent)?;
        tag.is_linked = true;
        tag.linked_to = Some(profile_id);
        Ok(())
    }

    async fn get_profile(&self, user_id: Uuid) -> Result<Option<Profile>, AppError> {
        Ok(self.inner.read().await.profiles.get(&user_id).cloned())
    }

    async fn find_profile_by_code(&self, code: &str) -> Result<Option<Profile>, AppError> {
        let inner = self.inner.read().await;
        Ok(inner
            .profiles
            .values()
            .find(|p| p.linked_codes.iter().any(|c| c == code))
            .cloned())
    }

    async fn username_taken(
        &self,
        username: &str,
        exclude: Option<Uuid>,
    ) -> Result<bool, AppError> {
        let inner = self.inner.read().await;
        Ok(inner
            .profiles
            .values()
            .any(|p| p.username == username && Some(p.user_id) != exclude))
    }

    async fn email_taken(&self, email: &str, exclude: Option<Uuid>) -> Result<bool, AppError> {
        let inner = self.inner.read().await;
        Ok(inner
            .profiles
            .values()
            .any(|p| p.email == email && Some(p.user_id) != exclude))
    }

    async fn insert_profile_linked(&self, profile: &Profile, code: &str) -> Result<(), AppError> {
        let mut inner = self.inner.write().await;

        match inner.tags.get(code) {
            None => return Err(AppError::NotFound),
            Some(tag) if tag.is_linked => return Err(AppError::Conflict("tag")),
            Some(_) => {}
        }
        if inner
            .profiles
            .values()
            .any(|p| p.username == profile.username)
        {
            return Err(AppError::Conflict("username"));
        }

        inner.profiles.insert(profile.user_id, profile.clone());
        let tag = inner.tags.get_mut(code).ok_or(AppError::Inconsistent)?;
        tag.is_linked = true;
        tag.linked_to = Some(profile.user_id);
        Ok(())
    }

    async fn update_profile(
        &self,
        user_id: Uuid,
        changes: &ProfileChanges,
    ) -> Result<(), AppError> {
        let mut inner = self.inner.write().await;
        let profile = inner.profiles.get_mut(&user_id).ok_or(AppError::NotFound)?;

        profile.name = changes.name.clone();
        profile.username = changes.username.clone();
        profile.email = changes.email.clone();
        profile.bio = changes.bio.clone();
        profile.photo = changes.photo.clone();
        profile.phone = changes.phone.clone();
        profile.whatsapp = changes.whatsapp.clone();
        profile.instagram = changes.instagram.clone();
        profile.facebook = changes.facebook.clone();
        Ok(())
    }

    async fn put_otp(&self, record: &OtpRecord) -> Result<(), AppError> {
        self.inner
            .write()
            .await
            .otp_codes
            .insert(record.email.clone(), record.clone());
        Ok(())
    }

    async fn get_otp(&self, email: &str) -> Result<Option<OtpRecord>, AppError> {
        Ok(self.inner.read().await.otp_codes.get(email).cloned())
    }

    async fn mark_otp_verified(&self, email: &str, at: DateTime<Utc>) -> Result<(), AppError> {
        let mut inner = self.inner.write().await;
        let record = inner.otp_codes.get_mut(email).ok_or(AppError::NotFound)?;
        record.verified = true;
        record.verified_at = Some(at);
        Ok(())
    }

    async fn delete_otp(&self, email: &str) -> Result<(), AppError> {
        self.inner.write().await.otp_codes.remove(email);
        Ok(())
    }

    async fn insert_account(&self, account: &Account) -> Result<(), AppError> {
        let mut inner = self.inner.write().await;
        if inner.accounts.values().any(|a| a.email == account.email) {
            return Err(AppError::Conflict("account"));
        }
        inner.accounts.insert(account.id, account.clone());
        Ok(())
    }

    async fn get_account(&self, id: Uuid) -> Result<Option<Account>, AppError> {
        Ok(self.inner.read().await.accounts.get(&id).cloned())
    }

    async fn get_account_by_email(&self, email: &str) -> Result<Option<Account>, AppError> {
        let inner = self.inner.read().await;
        Ok(inner.accounts.values().find(|a| a.email == email).cloned())
    }

    async fn update_account_password(
        &self,
        id: Uuid,
        password_hash: &str,
    ) -> Result<(), AppError> {
        let mut inner = self.inner.write().await;
        let account = inner.accounts.get_mut(&id).ok_or(AppError::AccountNotFound)?;
        account.password_hash = password_hash.to_string();
        Ok(())
    }
}
