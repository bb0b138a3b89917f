//! Profile create and edit flows: field validation, uniqueness checks, and
//! assembly of the stored record.
//!
//! Usernames are normalized (trim + ASCII lowercase) here, before both the
//! uniqueness check and the write, so the create and edit paths can never
//! diverge on case.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;
use uuid::Uuid;
use validator::ValidateEmail;

use crate::{
    db::RecordStore,
    error::AppError,
    models::{Identity, Profile, ProfileChanges, ProfileInput},
};

static USERNAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9._]{1,50}$").expect("valid regex"));

fn normalize_username(raw: &str) -> Result<String, AppError> {
    let username = raw.trim().to_ascii_lowercase();
    if username.is_empty() {
        return Err(AppError::Validation("username is required".into()));
    }
    if !USERNAME_RE.is_match(&username) {
        return Err(AppError::Validation(
            "username may only contain letters, digits, dots and underscores".into(),
        ));
    }
    Ok(username)
}

/// Empty or whitespace-only input means "no value".
fn clean(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn clean_photo(raw: &str) -> Result<Option<String>, AppError> {
    match clean(raw) {
        None => Ok(None),
        Some(photo) => {
            Url::parse(&photo)
                .map_err(|_| AppError::Validation("photo must be a valid URL".into()))?;
            Ok(Some(photo))
        }
    }
}

/// Creates the caller's profile and links its first tag. Precondition: the
/// scan resolved to the create-profile outcome, so the tag exists and is
/// unclaimed — both are re-checked here since time has passed.
pub async fn create_profile(
    store: &dyn RecordStore,
    caller: &Identity,
    code: &str,
    input: &ProfileInput,
) -> Result<Profile, AppError> {
    let name = input.name.trim();
    if name.is_empty() {
        return Err(AppError::Validation("name is required".into()));
    }
    let username = normalize_username(&input.username)?;

    match store.get_tag(code).await? {
        None => return Err(AppError::NotFound),
        Some(tag) if tag.is_linked => return Err(AppError::Conflict("tag")),
        Some(_) => {}
    }
    if store.get_profile(caller.id).await?.is_some() {
        return Err(AppError::Conflict("profile"));
    }
    if store.username_taken(&username, Some(caller.id)).await? {
        return Err(AppError::Conflict("username"));
    }

    let profile = Profile {
        user_id: caller.id,
        name: name.to_string(),
        username,
        // Defaults to the authenticated account's email.
        email: clean(&input.email).unwrap_or_else(|| caller.email.clone()),
        bio: clean(&input.bio),
        photo: clean_photo(&input.photo)?,
        phone: clean(&input.phone),
        whatsapp: clean(&input.whatsapp),
        instagram: clean(&input.instagram),
        facebook: clean(&input.facebook),
        linked_codes: vec![code.to_string()],
    };

    // Profile insert and tag link are one atomic store operation: on any
    // failure the tag stays unlinked and no profile is written.
    store.insert_profile_linked(&profile, code).await?;
    Ok(profile)
}

/// Edits every field except `user_id` and `linked_codes`. Both uniqueness
/// checks run (concurrently) before any write; each failure is reported as
/// its own conflict.
pub async fn update_profile(
    store: &dyn RecordStore,
    user_id: Uuid,
    input: &ProfileInput,
) -> Result<Profile, AppError> {
    let name = input.name.trim();
    if name.is_empty() {
        return Err(AppError::Validation("name is required".into()));
    }
    let username = normalize_username(&input.username)?;
    let email = input.email.trim();
    if email.is_empty() {
        return Err(AppError::Validation("email is required".into()));
    }
    if !email.validate_email() {
        return Err(AppError::Validation("invalid email address".into()));
    }

    let (username_taken, email_taken) = futures::try_join!(
        store.username_taken(&username, Some(user_id)),
        store.email_taken(email, Some(user_id)),
    )?;
    if username_taken {
        return Err(AppError::Conflict("username"));
    }
    if email_taken {
        return Err(AppError::Conflict("email"));
    }

    let changes = ProfileChanges {
        name: name.to_string(),
        username,
        email: email.to_string(),
        bio: clean(&input.bio),
        photo: clean_photo(&input.photo)?,
        phone: clean(&input.phone),
        whatsapp: clean(&input.whatsapp),
        instagram: clean(&input.instagram),
        facebook: clean(&input.facebook),
    };
    store.update_profile(user_id, &changes).await?;

    store.get_profile(user_id).await?.ok_or(AppError::NotFound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryStore;

    fn identity(email: &str) -> Identity {
        Identity {
            id: Uuid::new_v4(),
            email: email.into(),
        }
    }

    fn input(name: &str, username: &str) -> ProfileInput {
        ProfileInput {
            name: name.into(),
            username: username.into(),
            ..Default::default()
        }
    }

    async fn store_with_tag(code: &str) -> MemoryStore {
        let store = MemoryStore::new();
        store.create_tag(code).await.unwrap();
        store
    }

    #[tokio::test]
    async fn create_links_the_tag_and_defaults_email() {
        let store = store_with_tag("DEMO123").await;
        let ada = identity("ada@example.com");

        let profile = create_profile(&store, &ada, "DEMO123", &input("Ada", "Ada "))
            .await
            .unwrap();

        assert_eq!(profile.username, "ada");
        assert_eq!(profile.email, "ada@example.com");
        assert_eq!(profile.linked_codes, vec!["DEMO123"]);

        let tag = store.get_tag("DEMO123").await.unwrap().unwrap();
        assert!(tag.is_linked);
        assert_eq!(tag.linked_to, Some(ada.id));
    }

    #[tokio::test]
    async fn create_rejects_blank_required_fields() {
        let store = store_with_tag("DEMO123").await;
        let ada = identity("ada@example.com");

        assert!(matches!(
            create_profile(&store, &ada, "DEMO123", &input("  ", "ada")).await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            create_profile(&store, &ada, "DEMO123", &input("Ada", "")).await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn duplicate_username_leaves_the_tag_unlinked() {
        let store = store_with_tag("TAG1").await;
        store.create_tag("TAG2").await.unwrap();
        let ada = identity("ada@example.com");
        let grace = identity("grace@example.com");

        create_profile(&store, &ada, "TAG1", &input("Ada", "ada")).await.unwrap();

        assert!(matches!(
            create_profile(&store, &grace, "TAG2", &input("Grace", "ADA")).await,
            Err(AppError::Conflict("username"))
        ));

        // No partial commit: the second tag is still unclaimed.
        let tag = store.get_tag("TAG2").await.unwrap().unwrap();
        assert!(!tag.is_linked);
        assert!(store.get_profile(grace.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn create_rejects_unknown_or_claimed_tags() {
        let store = store_with_tag("TAG1").await;
        let ada = identity("ada@example.com");
        let grace = identity("grace@example.com");

        assert!(matches!(
            create_profile(&store, &ada, "MISSING", &input("Ada", "ada")).await,
            Err(AppError::NotFound)
        ));

        create_profile(&store, &ada, "TAG1", &input("Ada", "ada")).await.unwrap();
        assert!(matches!(
            create_profile(&store, &grace, "TAG1", &input("Grace", "grace")).await,
            Err(AppError::Conflict("tag"))
        ));
    }

    #[tokio::test]
    async fn one_profile_per_account() {
        let store = store_with_tag("TAG1").await;
        store.create_tag("TAG2").await.unwrap();
        let ada = identity("ada@example.com");

        create_profile(&store, &ada, "TAG1", &input("Ada", "ada")).await.unwrap();

        assert!(matches!(
            create_profile(&store, &ada, "TAG2", &input("Ada", "ada2")).await,
            Err(AppError::Conflict("profile"))
        ));
    }

    #[tokio::test]
    async fn edit_keeps_own_username_without_conflict() {
        let store = store_with_tag("TAG1").await;
        let ada = identity("ada@example.com");
        create_profile(&store, &ada, "TAG1", &input("Ada", "ada")).await.unwrap();

        // Unchanged username and email must not be rejected as conflicts.
        let mut edit = input("Ada Lovelace", "ada");
        edit.email = "ada@example.com".into();
        let profile = update_profile(&store, ada.id, &edit).await.unwrap();

        assert_eq!(profile.name, "Ada Lovelace");
        assert_eq!(profile.username, "ada");
    }

    #[tokio::test]
    async fn edit_conflicts_are_distinguishable() {
        let store = store_with_tag("TAG1").await;
        store.create_tag("TAG2").await.unwrap();
        let ada = identity("ada@example.com");
        let grace = identity("grace@example.com");
        create_profile(&store, &ada, "TAG1", &input("Ada", "ada")).await.unwrap();
        create_profile(&store, &grace, "TAG2", &input("Grace", "grace")).await.unwrap();

        let mut take_username = input("Grace", "ada");
        take_username.email = "grace@example.com".into();
        assert!(matches!(
            update_profile(&store, grace.id, &take_username).await,
            Err(AppError::Conflict("username"))
        ));

        let mut take_email = input("Grace", "grace");
        take_email.email = "ada@example.com".into();
        assert!(matches!(
            update_profile(&store, grace.id, &take_email).await,
            Err(AppError::Conflict("email"))
        ));

        // Neither rejected edit wrote anything.
        let unchanged = store.get_profile(grace.id).await.unwrap().unwrap();
        assert_eq!(unchanged.username, "grace");
        assert_eq!(unchanged.email, "grace@example.com");
    }

    #[tokio::test]
    async fn empty_contact_fields_clear_stored_values() {
        let store = store_with_tag("TAG1").await;
        let ada = identity("ada@example.com");

        let mut with_phone = input("Ada", "ada");
        with_phone.phone = "+15551234".into();
        create_profile(&store, &ada, "TAG1", &with_phone).await.unwrap();

        let mut edit = input("Ada", "ada");
        edit.email = "ada@example.com".into();
        let profile = update_profile(&store, ada.id, &edit).await.unwrap();

        assert_eq!(profile.phone, None);
        // linked_codes are untouched by edits.
        assert_eq!(profile.linked_codes, vec!["TAG1"]);
    }

    #[tokio::test]
    async fn photo_must_be_a_url() {
        let store = store_with_tag("TAG1").await;
        let ada = identity("ada@example.com");

        let mut bad = input("Ada", "ada");
        bad.photo = "not a url".into();
        assert!(matches!(
            create_profile(&store, &ada, "TAG1", &bad).await,
            Err(AppError::Validation(_))
        ));
    }
}
