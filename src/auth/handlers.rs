use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{info, instrument, warn};

use super::{
    dto::{AuthResponse, LoginRequest, MeResponse, MessageResponse, RegisterRequest},
    extractors::CurrentUser,
    jwt::JwtKeys,
    password::{hash_password, verify_password},
    repo::User,
};
use crate::{error::ApiError, state::AppState};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/me", get(me))
        .route("/auth/logout", post(logout))
}

// Empty strings count as missing, matching how the reference client submits
// untouched form fields.
fn present(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|s| !s.is_empty())
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    let (Some(username), Some(email), Some(password), Some(confirm_password)) = (
        present(&payload.username),
        present(&payload.email),
        present(&payload.password),
        present(&payload.confirm_password),
    ) else {
        return Err(ApiError::Validation("Please fill in all fields".into()));
    };

    if password != confirm_password {
        return Err(ApiError::Validation("Passwords do not match".into()));
    }

    // Character count, not byte count, so multibyte passwords are measured
    // the way the client's form counts them.
    if password.chars().count() < 6 {
        return Err(ApiError::Validation(
            "Password must be at least 6 characters long".into(),
        ));
    }

    // One existence probe for both unique fields; email wins when both collide.
    if let Some(existing) = User::find_by_email_or_username(&state.db, email, username).await? {
        let message = if existing.email == email {
            "Email already registered"
        } else {
            "Username already taken"
        };
        warn!(%username, "registration conflict");
        return Err(ApiError::Conflict(message.into()));
    }

    let hash = hash_password(password)?;
    let user = User::create(&state.db, username, email, &hash).await?;

    let token = JwtKeys::from_ref(&state).sign(user.id)?;

    info!(user_id = %user.id, "user registered");
    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            success: true,
            message: "User registered successfully".into(),
            token,
            user,
        }),
    ))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let (Some(email), Some(password)) = (present(&payload.email), present(&payload.password))
    else {
        return Err(ApiError::Validation(
            "Please provide email and password".into(),
        ));
    };

    // Unknown email and wrong password share one message so the endpoint
    // cannot be used to enumerate accounts.
    let invalid = || ApiError::Unauthenticated("Invalid email or password".into());

    let user = User::find_by_email(&state.db, email).await?.ok_or_else(|| {
        warn!("login with unknown email");
        invalid()
    })?;

    if !verify_password(password, &user.password_hash)? {
        warn!(user_id = %user.id, "login with invalid password");
        return Err(invalid());
    }

    let token = JwtKeys::from_ref(&state).sign(user.id)?;

    info!(user_id = %user.id, "user logged in");
    Ok(Json(AuthResponse {
        success: true,
        message: "Login successful".into(),
        token,
        user,
    }))
}

#[instrument(skip_all)]
pub async fn me(CurrentUser(user): CurrentUser) -> Json<MeResponse> {
    Json(MeResponse {
        success: true,
        user,
    })
}

/// Logout is client-side token discard; the server only acknowledges.
#[instrument(skip_all)]
pub async fn logout(CurrentUser(user): CurrentUser) -> Json<MessageResponse> {
    info!(user_id = %user.id, "user logged out");
    Json(MessageResponse {
        success: true,
        message: "Logged out successfully".into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn register_payload(password: &str) -> RegisterRequest {
        RegisterRequest {
            username: Some("al".into()),
            email: Some("al@x.com".into()),
            password: Some(password.into()),
            confirm_password: Some(password.into()),
        }
    }

    // These payloads are rejected before any database access, so the fake
    // state's lazy pool is never exercised.

    #[tokio::test]
    async fn register_rejects_short_password() {
        let err = register(State(AppState::fake()), Json(register_payload("five5")))
            .await
            .err()
            .expect("registration should fail");
        assert_eq!(
            err.to_string(),
            "Password must be at least 6 characters long"
        );
    }

    #[tokio::test]
    async fn register_counts_password_characters_not_bytes() {
        // Five characters, eight bytes.
        let err = register(State(AppState::fake()), Json(register_payload("ñañañ")))
            .await
            .err()
            .expect("registration should fail");
        assert_eq!(
            err.to_string(),
            "Password must be at least 6 characters long"
        );
    }

    #[tokio::test]
    async fn register_rejects_mismatched_passwords() {
        let mut payload = register_payload("secret1");
        payload.confirm_password = Some("secret2".into());
        let err = register(State(AppState::fake()), Json(payload))
            .await
            .err()
            .expect("registration should fail");
        assert_eq!(err.to_string(), "Passwords do not match");
    }

    #[tokio::test]
    async fn register_requires_every_field() {
        let mut payload = register_payload("secret1");
        payload.email = Some(String::new());
        let err = register(State(AppState::fake()), Json(payload))
            .await
            .err()
            .expect("registration should fail");
        assert_eq!(err.to_string(), "Please fill in all fields");
    }
}
