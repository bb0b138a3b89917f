//! NFC tag-to-profile linking service.
//!
//! A scan of a tag code hits `/scan`, which resolves through the linking
//! state machine to the auth, create-profile, view-profile, or invalid
//! route. Profile creation and editing, image uploads, and the email-OTP
//! password-reset flow are JSON endpoints on the same router. Persistence,
//! mail, and image hosting sit behind traits so the flows can be exercised
//! against in-memory doubles.

use axum::{
    Router,
    http::{
        Method,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    routing::{get, post},
};
use tokio::{
    net::TcpListener,
    signal::{
        ctrl_c,
        unix::{SignalKind, signal},
    },
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod images;
pub mod linking;
pub mod mail;
pub mod models;
pub mod otp;
pub mod profile;
pub mod routes;
pub mod state;

use std::sync::Arc;

use config::Config;
use routes::{
    create_profile_handler, get_profile_handler, login_handler, provision_tag_handler,
    reset_password_handler, scan_handler, send_otp_handler, signup_handler,
    update_profile_handler, upload_image_handler, verify_otp_handler,
};
use state::AppState;

pub fn app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION]);

    Router::new()
        .route("/scan", get(scan_handler))
        .route("/tags", post(provision_tag_handler))
        .route("/profiles", post(create_profile_handler))
        .route(
            "/profiles/{user_id}",
            get(get_profile_handler).put(update_profile_handler),
        )
        .route("/images", post(upload_image_handler))
        .route("/auth/signup", post(signup_handler))
        .route("/auth/login", post(login_handler))
        .route("/auth/send-otp", post(send_otp_handler))
        .route("/auth/verify-otp", post(verify_otp_handler))
        .route("/auth/reset-password", post(reset_password_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

pub async fn start_server() -> anyhow::Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let config = Config::from_env()?;
    let state = AppState::from_config(&config).await?;

    let address = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&address).await?;
    info!("listening on {address}");

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        ctrl_c().await.expect("failed to install Ctrl+C handler");
        info!("received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        signal(SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
        info!("received terminate signal, shutting down");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
