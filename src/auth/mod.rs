//! Auth provider: accounts with argon2-hashed credentials and JWT sessions.
//! Exposes the narrow contract the rest of the service needs — sign-up,
//! sign-in, lookup-by-email, update-password — plus the request extractors
//! that resolve the caller once at flow entry.

pub mod jwt;

use std::sync::Arc;

use argon2::{
    Argon2, PasswordHasher, PasswordVerifier,
    password_hash::{PasswordHash, SaltString, rand_core::OsRng},
};
use axum::{extract::FromRequestParts, http::header::AUTHORIZATION, http::request::Parts};
use chrono::Utc;
use std::convert::Infallible;
use uuid::Uuid;

use crate::{
    db::RecordStore,
    error::AppError,
    linking::Caller,
    models::{Account, Identity},
    state::AppState,
};

use jwt::JwtKeys;

pub struct AuthService {
    store: Arc<dyn RecordStore>,
    keys: JwtKeys,
}

impl AuthService {
    pub fn new(store: Arc<dyn RecordStore>, jwt_secret: &str) -> Self {
        Self {
            store,
            keys: JwtKeys::new(jwt_secret),
        }
    }

    pub async fn sign_up(&self, email: &str, password: &str) -> Result<(Identity, String), AppError> {
        let email = email.trim();
        if self.store.get_account_by_email(email).await?.is_some() {
            return Err(AppError::Conflict("account"));
        }

        let account = Account {
            id: Uuid::new_v4(),
            email: email.to_string(),
            password_hash: hash_password(password)?,
            created_at: Utc::now(),
        };
        self.store.insert_account(&account).await?;

        let identity = Identity {
            id: account.id,
            email: account.email,
        };
        let token = self.keys.issue(&identity)?;
        Ok((identity, token))
    }

    /// Unknown email and wrong password are indistinguishable to the caller.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<(Identity, String), AppError> {
        let account = self
            .store
            .get_account_by_email(email.trim())
            .await?
            .ok_or(AppError::Unauthorized)?;

        if !verify_password(password, &account.password_hash)? {
            return Err(AppError::Unauthorized);
        }

        let identity = Identity {
            id: account.id,
            email: account.email,
        };
        let token = self.keys.issue(&identity)?;
        Ok((identity, token))
    }

    pub fn verify_token(&self, token: &str) -> Result<Identity, AppError> {
        self.keys.verify(token)
    }

    /// Credential update behind the OTP reset flow.
    pub async fn update_password(&self, email: &str, new_password: &str) -> Result<(), AppError> {
        let account = self
            .store
            .get_account_by_email(email)
            .await?
            .ok_or(AppError::AccountNotFound)?;

        let hash = hash_password(new_password)?;
        self.store.update_account_password(account.id, &hash).await
    }
}

fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(anyhow::anyhow!("password hashing failed: {e}")))
}

pub(crate) fn verify_password(password: &str, hash: &str) -> Result<bool, AppError> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("stored hash is malformed: {e}")))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

impl FromRequestParts<Arc<AppState>> for Identity {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or(AppError::Unauthorized)?;
        state.auth.verify_token(token)
    }
}

impl FromRequestParts<Arc<AppState>> for Caller {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        Ok(
            match bearer_token(parts).and_then(|t| state.auth.verify_token(t).ok()) {
                Some(identity) => Caller::Authenticated(identity),
                None => Caller::Anonymous,
            },
        )
    }
}
