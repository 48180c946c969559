//! Request-scoped identity extractor.

use axum::RequestPartsExt;
use axum::extract::{FromRequestParts, Query};
use axum::http::request::Parts;
use axum_extra::headers::{Authorization, authorization::Bearer};
use axum_extra::TypedHeader;
use serde::Deserialize;

use crate::api::server::AppState;
use crate::api::types::ApiError;
use crate::domain::AuthenticatedUser;

#[derive(Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// The authenticated caller, extracted from either a `Bearer` header or a
/// `?token=` query parameter. The query fallback exists for `/ws`: browser
/// WebSocket clients cannot set arbitrary headers during the handshake.
pub struct AuthUser(pub AuthenticatedUser);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = match parts.extract::<TypedHeader<Authorization<Bearer>>>().await {
            Ok(TypedHeader(auth)) => auth.token().to_string(),
            Err(_) => {
                let Query(query) = parts
                    .extract::<Query<TokenQuery>>()
                    .await
                    .map_err(|_| ApiError::Unauthorized("missing bearer token".into()))?;
                query
                    .token
                    .ok_or_else(|| ApiError::Unauthorized("missing bearer token".into()))?
            }
        };

        let claims = crate::api::auth::jwt::validate_session_token(&token, &state.jwt_secret_key)
            .map_err(|e| ApiError::Unauthorized(e.to_string()))?;

        Ok(AuthUser(claims.into()))
    }
}
