use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, warn};

use super::{dto::NewUser, repo::User};
use crate::error::{AppError, Result};
use crate::state::AppState;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Trims fields and lower-cases the email; rejects blanks and malformed addresses.
pub(crate) fn normalize(mut draft: NewUser) -> Result<NewUser> {
    draft.username = draft.username.trim().to_string();
    draft.fullname = draft.fullname.trim().to_string();
    draft.email = draft.email.trim().to_lowercase();

    if draft.username.is_empty() {
        return Err(AppError::BadRequest("Username is required".into()));
    }
    if draft.fullname.is_empty() {
        return Err(AppError::BadRequest("Full name is required".into()));
    }
    if draft.password.is_empty() {
        return Err(AppError::BadRequest("Password is required".into()));
    }
    if !is_valid_email(&draft.email) {
        return Err(AppError::BadRequest("Invalid email".into()));
    }
    Ok(draft)
}

/// Registers a user unless the email is already taken. No write happens on conflict.
pub async fn register(state: &AppState, draft: NewUser) -> Result<User> {
    let draft = normalize(draft)?;

    if User::find_by_email(&state.db, &draft.email).await?.is_some() {
        warn!(email = %draft.email, "email already registered");
        return Err(AppError::Conflict("Email already registered".into()));
    }

    let user = User::create(&state.db, state.hasher.as_ref(), &draft).await?;
    info!(user_id = user.id, email = %user.email, "user registered");
    Ok(user)
}
