//! HTTP handlers. Thin: payload validation happens in the flow modules;
//! here we only translate between the wire and the operations.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::Redirect,
};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::error;
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::{AppError, validation_error},
    linking::{Caller, resolve_scan},
    models::{
        CreateProfileRequest, Identity, LoginRequest, Profile, ProfileInput,
        ProvisionTagRequest, ResetPasswordRequest, SendOtpRequest, SessionResponse,
        SignupRequest, TagRecord, VerifyOtpRequest,
    },
    otp, profile,
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct ScanParams {
    pub code: Option<String>,
}

/// Entry point of a physical scan. Always answers with a redirect; any
/// failure collapses into the invalid page rather than an error payload.
pub async fn scan_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ScanParams>,
    caller: Caller,
) -> Redirect {
    match resolve_scan(state.store.as_ref(), params.code.as_deref(), &caller).await {
        Ok(outcome) => Redirect::to(&outcome.redirect_path()),
        Err(e) => {
            error!(error = %e, "scan resolution failed");
            Redirect::to("/invalid")
        }
    }
}

pub async fn signup_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SignupRequest>,
) -> Result<(StatusCode, Json<SessionResponse>), AppError> {
    req.validate().map_err(validation_error)?;
    let (identity, token) = state.auth.sign_up(&req.email, &req.password).await?;
    Ok((
        StatusCode::CREATED,
        Json(SessionResponse {
            token,
            user_id: identity.id,
            email: identity.email,
        }),
    ))
}

pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<SessionResponse>, AppError> {
    if req.email.trim().is_empty() || req.password.is_empty() {
        return Err(AppError::Validation("email and password are required".into()));
    }
    let (identity, token) = state.auth.sign_in(&req.email, &req.password).await?;
    Ok(Json(SessionResponse {
        token,
        user_id: identity.id,
        email: identity.email,
    }))
}

pub async fn send_otp_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SendOtpRequest>,
) -> Result<Json<Value>, AppError> {
    otp::request_code(state.store.as_ref(), state.mailer.as_ref(), &req.email).await?;
    Ok(Json(json!({ "message": "OTP sent successfully" })))
}

pub async fn verify_otp_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<VerifyOtpRequest>,
) -> Result<Json<Value>, AppError> {
    otp::verify_code(state.store.as_ref(), &req.email, &req.otp).await?;
    Ok(Json(
        json!({ "success": true, "message": "OTP verified successfully" }),
    ))
}

pub async fn reset_password_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ResetPasswordRequest>,
) -> Result<Json<Value>, AppError> {
    otp::reset_password(
        state.store.as_ref(),
        &state.auth,
        &req.email,
        &req.new_password,
    )
    .await?;
    Ok(Json(json!({ "message": "Password reset successfully" })))
}

pub async fn create_profile_handler(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Json(req): Json<CreateProfileRequest>,
) -> Result<(StatusCode, Json<Profile>), AppError> {
    let code = req.code.trim();
    if code.is_empty() {
        return Err(AppError::Validation("code is required".into()));
    }
    let profile =
        profile::create_profile(state.store.as_ref(), &identity, code, &req.profile).await?;
    Ok((StatusCode::CREATED, Json(profile)))
}

pub async fn get_profile_handler(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Profile>, AppError> {
    state
        .store
        .get_profile(user_id)
        .await?
        .map(Json)
        .ok_or(AppError::NotFound)
}

pub async fn update_profile_handler(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(user_id): Path<Uuid>,
    Json(req): Json<ProfileInput>,
) -> Result<Json<Profile>, AppError> {
    if identity.id != user_id {
        return Err(AppError::Forbidden);
    }
    let profile = profile::update_profile(state.store.as_ref(), user_id, &req).await?;
    Ok(Json(profile))
}

pub async fn upload_image_handler(
    State(state): State<Arc<AppState>>,
    _identity: Identity,
    mut multipart: Multipart,
) -> Result<Json<Value>, AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| AppError::Validation("malformed multipart body".into()))?
    {
        if field.name() == Some("image") {
            let filename = field.file_name().unwrap_or("upload").to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|_| AppError::Validation("could not read image field".into()))?;

            let url = state.images.upload(&filename, bytes.to_vec()).await?;
            return Ok(Json(json!({ "url": url })));
        }
    }

    Err(AppError::Validation("image field is required".into()))
}

pub async fn provision_tag_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ProvisionTagRequest>,
) -> Result<(StatusCode, Json<TagRecord>), AppError> {
    let code = req.code.trim();
    if code.is_empty() {
        return Err(AppError::Validation("code is required".into()));
    }
    state.store.create_tag(code).await?;
    Ok((StatusCode::CREATED, Json(TagRecord::unlinked(code))))
}
