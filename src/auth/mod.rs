//! Bearer-token authentication.
//!
//! There is exactly one token per daemon instance (no user identity). The
//! `RequireAuth` extractor pulls the `Authorization: Bearer` header off
//! every mutating request and compares it against `AppState::auth_token` in
//! constant time; success yields a unit value, since there is no principal
//! to attach.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::request::Parts,
    RequestPartsExt,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};

use crate::error::AppError;
use crate::security;
use crate::state::AppState;

/// Marker extractor proving the request carried a valid bearer token.
/// Handlers that require auth take this as a parameter; handlers that
/// don't, simply omit it.
pub struct RequireAuth;

#[async_trait]
impl FromRequestParts<AppState> for RequireAuth {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Some(expected) = &state.auth_token else {
            return Err(AppError::NoAuthConfigured);
        };

        let presented = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map_err(|_| AppError::MissingAuth)?;

        if security::tokens_match(presented.token(), expected) {
            Ok(RequireAuth)
        } else {
            Err(AppError::InvalidAuth)
        }
    }
}

/// Validates a token presented out-of-band (e.g. the WebSocket upgrade's
/// `token` query parameter, which cannot use an `Authorization` header).
pub fn check_token(state: &AppState, presented: &str) -> Result<(), AppError> {
    match &state.auth_token {
        Some(expected) if security::tokens_match(presented, expected) => Ok(()),
        Some(_) => Err(AppError::InvalidAuth),
        None => Err(AppError::NoAuthConfigured),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_state;

    #[tokio::test]
    async fn check_token_accepts_matching_token() {
        let state = test_state().await;
        assert!(check_token(&state, "test-token").is_ok());
    }

    #[tokio::test]
    async fn check_token_rejects_mismatch() {
        let state = test_state().await;
        let err = check_token(&state, "wrong").unwrap_err();
        assert_eq!(err.code(), "INVALID_AUTH");
    }
}
