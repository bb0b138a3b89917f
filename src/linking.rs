//! Scan resolution: from a tag code and the (possibly absent) caller
//! identity, decide whether the request ends at the invalid page, the auth
//! page, the create-profile page, or an existing profile.
//!
//! The only side-effecting transition is an authenticated caller with an
//! existing profile scanning an unclaimed tag, which claims it atomically.

use tracing::warn;
use uuid::Uuid;

use crate::{db::RecordStore, error::AppError, models::Identity};

/// Caller identity, resolved once at request entry.
#[derive(Debug, Clone)]
pub enum Caller {
    Anonymous,
    Authenticated(Identity),
}

/// Terminal outcome of a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    /// Missing, unknown, or unprocessable code. Unknown codes are
    /// indistinguishable from invalid ones by design.
    Invalid,
    /// Unclaimed tag, anonymous caller: sign in first, code carried through.
    RequireAuth { code: String },
    /// Unclaimed tag, authenticated caller without a profile yet.
    CreateProfile { code: String },
    /// Tag resolves to an existing profile.
    ViewProfile { profile_id: Uuid },
}

impl ScanOutcome {
    /// Navigation contract of the outcome.
    pub fn redirect_path(&self) -> String {
        match self {
            ScanOutcome::Invalid => "/invalid".to_string(),
            ScanOutcome::RequireAuth { code } => format!("/auth?code={code}"),
            ScanOutcome::CreateProfile { code } => format!("/create-profile?code={code}"),
            ScanOutcome::ViewProfile { profile_id } => format!("/profile/{profile_id}"),
        }
    }
}

pub async fn resolve_scan(
    store: &dyn RecordStore,
    code: Option<&str>,
    caller: &Caller,
) -> Result<ScanOutcome, AppError> {
    let Some(code) = code.map(str::trim).filter(|c| !c.is_empty()) else {
        return Ok(ScanOutcome::Invalid);
    };

    let Some(tag) = store.get_tag(code).await? else {
        return Ok(ScanOutcome::Invalid);
    };

    if tag.is_linked {
        return view_linked(store, code).await;
    }

    let Caller::Authenticated(identity) = caller else {
        return Ok(ScanOutcome::RequireAuth { code: code.to_string() });
    };

    match store.get_profile(identity.id).await? {
        // Multi-tag path: the caller's profile claims this code too.
        Some(profile) => match store.claim_tag(code, profile.user_id).await {
            Ok(()) => Ok(ScanOutcome::ViewProfile {
                profile_id: profile.user_id,
            }),
            // Lost the race to another claimant; fall back to the linked path.
            Err(AppError::Conflict(_)) => view_linked(store, code).await,
            Err(e) => Err(e),
        },
        None => Ok(ScanOutcome::CreateProfile { code: code.to_string() }),
    }
}

async fn view_linked(store: &dyn RecordStore, code: &str) -> Result<ScanOutcome, AppError> {
    match store.find_profile_by_code(code).await? {
        Some(profile) => Ok(ScanOutcome::ViewProfile {
            profile_id: profile.user_id,
        }),
        None => {
            // Linked tag with no owning profile: the lookup paths disagree.
            warn!(code, "inconsistent record state: linked tag has no profile");
            Ok(ScanOutcome::Invalid)
        }
    }
}
