use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use tracing::warn;

use super::{
    jwt::{JwtKeys, TokenError},
    repo::{Role, User},
};
use crate::{error::ApiError, state::AppState};

/// The auth gateway. Extracts the bearer token, verifies it and resolves the
/// subject to a stored user, which is handed to the handler as an explicit
/// argument. Any failure short-circuits with a 401 envelope before the
/// handler runs.
pub struct CurrentUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or_else(|| {
                ApiError::Unauthenticated("Not authorized, no token provided".into())
            })?;

        let claims = JwtKeys::from_ref(state).verify(token).map_err(|e| {
            warn!("token rejected");
            match e {
                TokenError::Expired => ApiError::Unauthenticated("Token expired".into()),
                _ => ApiError::Unauthenticated("Invalid token".into()),
            }
        })?;

        let user = User::find_by_id(&state.db, claims.sub)
            .await?
            .ok_or_else(|| ApiError::Unauthenticated("User not found".into()))?;

        Ok(CurrentUser(user))
    }
}

/// Role gate: admin only.
pub struct RequireAdmin(pub User);

#[async_trait]
impl FromRequestParts<AppState> for RequireAdmin {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let CurrentUser(user) = CurrentUser::from_request_parts(parts, state).await?;
        if user.role == Role::Admin {
            Ok(RequireAdmin(user))
        } else {
            Err(ApiError::Forbidden(
                "Access denied. Admin privileges required.".into(),
            ))
        }
    }
}

/// Role gate: normal user or admin.
pub struct RequireUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for RequireUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let CurrentUser(user) = CurrentUser::from_request_parts(parts, state).await?;
        if matches!(user.role, Role::User | Role::Admin) {
            Ok(RequireUser(user))
        } else {
            Err(ApiError::Forbidden("Access denied.".into()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use uuid::Uuid;

    fn parts_with_auth(value: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/api/movie");
        if let Some(v) = value {
            builder = builder.header(axum::http::header::AUTHORIZATION, v);
        }
        let (parts, _) = builder.body(()).unwrap().into_parts();
        parts
    }

    async fn rejection_message(value: Option<&str>) -> String {
        let state = AppState::fake();
        let mut parts = parts_with_auth(value);
        let err = CurrentUser::from_request_parts(&mut parts, &state)
            .await
            .err()
            .expect("extraction should fail");
        err.to_string()
    }

    // These paths all fail before any database access, so the fake state's
    // lazy pool is never exercised.

    #[tokio::test]
    async fn missing_header_is_rejected() {
        assert_eq!(
            rejection_message(None).await,
            "Not authorized, no token provided"
        );
    }

    #[tokio::test]
    async fn non_bearer_scheme_is_rejected() {
        assert_eq!(
            rejection_message(Some("Basic dXNlcjpwdw==")).await,
            "Not authorized, no token provided"
        );
    }

    #[tokio::test]
    async fn garbage_token_is_rejected() {
        assert_eq!(
            rejection_message(Some("Bearer not.a.token")).await,
            "Invalid token"
        );
    }

    #[tokio::test]
    async fn expired_token_is_reported_as_expired() {
        let state = AppState::fake();
        let keys = JwtKeys::from_ref(&state);
        let now = time::OffsetDateTime::now_utc().unix_timestamp();
        let claims = crate::auth::claims::Claims {
            sub: Uuid::new_v4(),
            iat: (now - 7200) as usize,
            exp: (now - 3600) as usize,
            iss: keys.issuer.clone(),
            aud: keys.audience.clone(),
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret("test-secret".as_bytes()),
        )
        .unwrap();
        let msg = rejection_message(Some(&format!("Bearer {token}"))).await;
        assert_eq!(msg, "Token expired");
    }

    #[tokio::test]
    async fn wrong_secret_is_reported_as_invalid() {
        let state = AppState::fake();
        let keys = JwtKeys::from_ref(&state);
        let now = time::OffsetDateTime::now_utc().unix_timestamp();
        let claims = crate::auth::claims::Claims {
            sub: Uuid::new_v4(),
            iat: now as usize,
            exp: (now + 3600) as usize,
            iss: keys.issuer.clone(),
            aud: keys.audience.clone(),
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"some-other-secret"),
        )
        .unwrap();
        let msg = rejection_message(Some(&format!("Bearer {token}"))).await;
        assert_eq!(msg, "Invalid token");
    }
}
