//! Middlewares for routes.

use axum::extract::{FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderValue, Uri, header};
use axum::middleware::Next;
use axum::response::Response;

use crate::auth::JwtAuth;
use crate::claims::ClaimSet;
use crate::error::{AuthError, Result};
use crate::token::Token;
use crate::user::Principal;

const QUERY_PARAMETER: &str = "token";

/// Find the token of a request, in the `Authorization` header first, then
/// in the `token` query parameter.
pub fn extract_token(headers: &HeaderMap, uri: &Uri) -> Result<Token> {
    let from_header = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(JwtAuth::parse_token);

    match from_header {
        Some(Err(AuthError::TokenAbsent)) | None => {},
        Some(result) => return result,
    }

    uri.query()
        .and_then(|query| {
            url::form_urlencoded::parse(query.as_bytes())
                .find(|(name, _)| name == QUERY_PARAMETER)
                .map(|(_, value)| value.into_owned())
        })
        .filter(|value| !value.is_empty())
        .ok_or(AuthError::TokenAbsent)
        .and_then(|value| Ok(Token::new(value)?))
}

/// Refuse requests without a valid token. The [`Principal`] and the
/// [`ClaimSet`] are made available to handlers as extensions.
pub async fn authenticate(
    State(auth): State<JwtAuth>,
    mut req: Request,
    next: Next,
) -> Result<Response> {
    let token = extract_token(req.headers(), req.uri())
        .inspect_err(crate::telemetry::record_failure)?;
    let (principal, claims) = auth
        .resolve(&token)
        .await
        .inspect_err(crate::telemetry::record_failure)?;

    req.extensions_mut().insert::<Principal>(principal);
    req.extensions_mut().insert::<ClaimSet>(claims);
    Ok(next.run(req).await)
}

/// Exchange the request token for a new one, sent back in the
/// `Authorization` header of the response.
pub async fn refresh(
    State(auth): State<JwtAuth>,
    req: Request,
    next: Next,
) -> Result<Response> {
    let token = extract_token(req.headers(), req.uri())
        .inspect_err(crate::telemetry::record_failure)?;
    let renewed = auth.refresh(&token).await?;

    let mut response = next.run(req).await;
    // A token only holds url-safe characters.
    if let Ok(value) = HeaderValue::from_str(&format!("Bearer {renewed}")) {
        response.headers_mut().insert(header::AUTHORIZATION, value);
    }

    Ok(response)
}

/// Principal authenticated by [`authenticate`].
#[derive(Debug, Clone)]
pub struct AuthUser(pub Principal);

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Principal>()
            .cloned()
            .map(AuthUser)
            .ok_or(AuthError::Unauthenticated)
    }
}
