//! Postgres-backed record store (Supabase-compatible). Pool setup, schema
//! migrations, and the transactional claim operations live here; everything
//! else is single-statement CRUD.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{Account, OtpRecord, Profile, ProfileChanges, TagRecord},
};

use super::RecordStore;

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connects, verifies the connection, and applies pending migrations.
    pub async fn connect(database_url: &str) -> Result<Self, anyhow::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;
        info!("connected to record store");

        Ok(Self { pool })
    }
}

#[async_trait]
impl RecordStore for PgStore {
    async fn get_tag(&self, code: &str) -> Result<Option<TagRecord>, AppError> {
        let tag = sqlx::query_as::<_, TagRecord>(
            "SELECT code, is_linked, linked_to FROM nfc_tags WHERE code = $1",
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;
        Ok(tag)
    }

    async fn create_tag(&self, code: &str) -> Result<(), AppError> {
        let result = sqlx::query(
            "INSERT INTO nfc_tags (code) VALUES ($1) ON CONFLICT (code) DO NOTHING",
        )
        .bind(code)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::Conflict("tag"));
        }
        Ok(())
    }

    async fn claim_tag(&self, code: &str, profile_id: Uuid) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        // Conditional on the tag still being unclaimed; a lost race rolls
        // back with nothing written.
        let claimed = sqlx::query(
            "UPDATE nfc_tags SET is_linked = TRUE, linked_to = $2 \
             WHERE code = $1 AND is_linked = FALSE",
        )
        .bind(code)
        .bind(profile_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if claimed == 0 {
            let exists = sqlx::query_scalar::<_, bool>(
                "SELECT EXISTS(SELECT 1 FROM nfc_tags WHERE code = $1)",
            )
            .bind(code)
            .fetch_one(&mut *tx)
            .await?;
            return Err(if exists {
                AppError::Conflict("tag")
            } else {
                AppError::NotFound
            });
        }

        let appended = sqlx::query(
            "UPDATE profiles SET linked_codes = array_append(linked_codes, $2) \
             WHERE user_id = $1",
        )
        .bind(profile_id)
        .bind(code)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if appended == 0 {
            return Err(AppError::Inconsistent);
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_profile(&self, user_id: Uuid) -> Result<Option<Profile>, AppError> {
        let profile =
            sqlx::query_as::<_, Profile>("SELECT * FROM profiles WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(profile)
    }

    async fn find_profile_by_code(&self, code: &str) -> Result<Option<Profile>, AppError> {
        let profile = sqlx::query_as::<_, Profile>(
            "SELECT * FROM profiles WHERE $1 = ANY(linked_codes) LIMIT 1",
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;
        Ok(profile)
    }

    async fn username_taken(
        &self,
        username: &str,
        exclude: Option<Uuid>,
    ) -> Result<bool, AppError> {
        let taken = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM profiles \
             WHERE username = $1 AND ($2::uuid IS NULL OR user_id <> $2))",
        )
        .bind(username)
        .bind(exclude)
        .fetch_one(&self.pool)
        .await?;
        Ok(taken)
    }

    async fn email_taken(&self, email: &str, exclude: Option<Uuid>) -> Result<bool, AppError> {
        let taken = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM profiles \
             WHERE email = $1 AND ($2::uuid IS NULL OR user_id <> $2))",
        )
        .bind(email)
        .bind(exclude)
        .fetch_one(&self.pool)
        .await?;
        Ok(taken)
    }

    async fn insert_profile_linked(&self, profile: &Profile, code: &str) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO profiles \
             (user_id, name, username, email, bio, photo, phone, whatsapp, instagram, facebook, linked_codes) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(profile.user_id)
        .bind(&profile.name)
        .bind(&profile.username)
        .bind(&profile.email)
        .bind(&profile.bio)
        .bind(&profile.photo)
        .bind(&profile.phone)
        .bind(&profile.whatsapp)
        .bind(&profile.instagram)
        .bind(&profile.facebook)
        .bind(&profile.linked_codes)
        .execute(&mut *tx)
        .await?;

        let claimed = sqlx::query(
            "UPDATE nfc_tags SET is_linked = TRUE, linked_to = $2 \
             WHERE code = $1 AND is_linked = FALSE",
        )
        .bind(code)
        .bind(profile.user_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        // Rolls the profile insert back with it, so the tag can never end
        // up orphaned on a half-applied create.
        if claimed == 0 {
            return Err(AppError::Conflict("tag"));
        }

        tx.commit().await?;
        Ok(())
    }

    async fn update_profile(
        &self,
        user_id: Uuid,
        changes: &ProfileChanges,
    ) -> Result<(), AppError> {
        let updated = sqlx::query(
            "UPDATE profiles SET name = $2, username = $3, email = $4, bio = $5, \
             photo = $6, phone = $7, whatsapp = $8, instagram = $9, facebook = $10 \
             WHERE user_id = $1",
        )
        .bind(user_id)
        .bind(&changes.name)
        .bind(&changes.username)
        .bind(&changes.email)
        .bind(&changes.bio)
        .bind(&changes.photo)
        .bind(&changes.phone)
        .bind(&changes.whatsapp)
        .bind(&changes.instagram)
        .bind(&changes.facebook)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated == 0 {
            return Err(AppError::NotFound);
        }
        Ok(())
    }

    async fn put_otp(&self, record: &OtpRecord) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO otp_codes (email, otp, created_at, expires_at, verified, verified_at) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (email) DO UPDATE SET otp = $2, created_at = $3, \
             expires_at = $4, verified = $5, verified_at = $6",
        )
        .bind(&record.email)
        .bind(&record.otp)
        .bind(record.created_at)
        .bind(record.expires_at)
        .bind(record.verified)
        .bind(record.verified_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_otp(&self, email: &str) -> Result<Option<OtpRecord>, AppError> {
        let record =
            sqlx::query_as::<_, OtpRecord>("SELECT * FROM otp_codes WHERE email = $1")
                .bind(email)
                .fetch_optional(&self.pool)
                .await?;
        Ok(record)
    }

    async fn mark_otp_verified(&self, email: &str, at: DateTime<Utc>) -> Result<(), AppError> {
        let updated = sqlx::query(
            "UPDATE otp_codes SET verified = TRUE, verified_at = $2 WHERE email = $1",
        )
        .bind(email)
        .bind(at)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated == 0 {
            return Err(AppError::NotFound);
        }
        Ok(())
    }

    async fn delete_otp(&self, email: &str) -> Result<(), AppError> {
        sqlx::query("DELETE FROM otp_codes WHERE email = $1")
            .bind(email)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_account(&self, account: &Account) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO accounts (id, email, password_hash, created_at) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(account.id)
        .bind(&account.email)
        .bind(&account.password_hash)
        .bind(account.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_account(&self, id: Uuid) -> Result<Option<Account>, AppError> {
        let account = sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(account)
    }

    async fn get_account_by_email(&self, email: &str) -> Result<Option<Account>, AppError> {
        let account = sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(account)
    }

    async fn update_account_password(
        &self,
        id: Uuid,
        password_hash: &str,
    ) -> Result<(), AppError> {
        let updated =
            sqlx::query("UPDATE accounts SET password_hash = $2 WHERE id = $1")
                .bind(id)
                .bind(password_hash)
                .execute(&self.pool)
                .await?
                .rows_affected();

        if updated == 0 {
            return Err(AppError::AccountNotFound);
        }
        Ok(())
    }
}
