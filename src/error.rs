//! Error handler for jwtauth.

use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

use crate::claims::ClaimError;
use crate::config::ConfigError;
use crate::crypto::CryptoError;
use crate::signer::SignatureError;
use crate::storage::StorageError;

pub type Result<T> = std::result::Result<T, AuthError>;

/// Everything that can go wrong while handling a token.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error(transparent)]
    Signature(#[from] SignatureError),

    #[error(transparent)]
    Claim(#[from] ClaimError),

    #[error("token has been revoked")]
    TokenRevoked,

    #[error("user not found")]
    UserNotFound,

    #[error("revocation state cannot be checked")]
    RevocationCheckUnavailable(#[source] StorageError),

    #[error("no token was provided")]
    TokenAbsent,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("no authenticated user")]
    Unauthenticated,

    #[error("blacklist must be enabled to invalidate a token")]
    BlacklistDisabled,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

impl AuthError {
    /// Stable label used in logs, metrics and problem responses.
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::Signature(SignatureError::MalformedToken) => {
                "malformed_token"
            },
            AuthError::Signature(SignatureError::SignatureMismatch) => {
                "signature_mismatch"
            },
            AuthError::Signature(SignatureError::UnsupportedAlgorithm) => {
                "unsupported_algorithm"
            },
            AuthError::Signature(_) => "signing_failure",
            AuthError::Claim(ClaimError::MissingClaim(_)) => "missing_claim",
            AuthError::Claim(ClaimError::InvalidClaimType(_)) => {
                "invalid_claim_type"
            },
            AuthError::Claim(ClaimError::TokenExpired) => "token_expired",
            AuthError::Claim(ClaimError::TokenNotYetValid) => {
                "token_not_yet_valid"
            },
            AuthError::Claim(ClaimError::RefreshWindowExceeded) => {
                "refresh_window_exceeded"
            },
            AuthError::TokenRevoked => "token_revoked",
            AuthError::UserNotFound => "user_not_found",
            AuthError::RevocationCheckUnavailable(_) => {
                "revocation_check_unavailable"
            },
            AuthError::TokenAbsent => "token_absent",
            AuthError::InvalidCredentials => "invalid_credentials",
            AuthError::Unauthenticated => "unauthenticated",
            AuthError::BlacklistDisabled => "blacklist_disabled",
            AuthError::Config(_) => "configuration",
            AuthError::Crypto(_) => "crypto",
        }
    }

    /// HTTP status the host should answer with.
    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::RevocationCheckUnavailable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            },
            AuthError::Signature(SignatureError::Key(_))
            | AuthError::Signature(SignatureError::Encoding(_))
            | AuthError::BlacklistDisabled
            | AuthError::Config(_)
            | AuthError::Crypto(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::UNAUTHORIZED,
        }
    }

    /// Short description safe to send to a client.
    fn title(&self) -> &'static str {
        match self {
            AuthError::TokenAbsent => "Missing 'Authorization' header.",
            AuthError::Claim(ClaimError::TokenExpired) => "Token has expired.",
            AuthError::Claim(ClaimError::RefreshWindowExceeded) => {
                "Token can no longer be refreshed."
            },
            AuthError::TokenRevoked => "Token has been revoked.",
            AuthError::InvalidCredentials => "Invalid credentials.",
            AuthError::UserNotFound | AuthError::Unauthenticated => {
                "Unknown user."
            },
            AuthError::RevocationCheckUnavailable(_) => {
                "Token cannot be verified right now."
            },
            err if err.status() == StatusCode::INTERNAL_SERVER_ERROR => {
                "Internal server error."
            },
            _ => "Invalid token.",
        }
    }
}

/// Structure for detailed error responses.
#[derive(Debug, Serialize)]
pub struct ResponseError {
    r#type: Option<String>,
    title: String,
    status: u16,
    detail: String,
    instance: Option<String>,
}

impl ResponseError {
    /// Update error status code.
    pub fn status(mut self, code: StatusCode) -> Self {
        self.status = code.as_u16();
        self
    }

    /// Update `title` field.
    pub fn title(mut self, title: &str) -> Self {
        self.title = title.into();
        self
    }

    /// Add detailed error.
    pub fn details(mut self, description: &str) -> Self {
        self.detail = description.into();
        self
    }

    /// Transform [`ResponseError`] into axum [`Response`].
    pub fn into_response(
        self,
    ) -> std::result::Result<Response, axum::http::Error> {
        if let Ok(body) = serde_json::to_string(&self) {
            Response::builder()
                .status(self.status)
                .header(header::CONTENT_TYPE, "application/problem+json")
                .body(body.into())
        } else {
            Ok(internal_server_error())
        }
    }
}

impl Default for ResponseError {
    fn default() -> Self {
        Self {
            r#type: None,
            title: "Internal server error.".to_owned(),
            status: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
            detail: String::default(),
            instance: None,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, kind = self.kind(), "authentication failed on server side");
        }

        let mut response = ResponseError::default()
            .status(status)
            .title(self.title())
            .details(self.kind())
            .into_response()
            .unwrap_or_else(|_| internal_server_error());

        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                header::HeaderValue::from_static("Bearer"),
            );
        }

        response
    }
}

fn internal_server_error() -> Response {
    Response::builder()
        .status(StatusCode::INTERNAL_SERVER_ERROR)
        .header(header::CONTENT_TYPE, "application/problem+json")
        .body(
            serde_json::json!({
                "type": null,
                "title": "Internal server error.",
                "status": StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
                "detail": null,
                "instance": null,
            })
            .to_string()
            .into(),
        )
        .unwrap_or_else(|_| Response::new("Internal server error".into()))
}
