//! Semantic checks on decoded claims.
//!
//! Nothing here looks at revocation state, see [`crate::blacklist`].

use super::{
    ClaimSet, ClaimValue, EXPIRATION, ISSUED_AT, ISSUER, JWT_ID, NOT_BEFORE,
    SUBJECT,
};

/// Claims required by default.
pub const DEFAULT_REQUIRED_CLAIMS: [&str; 6] =
    [ISSUER, ISSUED_AT, EXPIRATION, NOT_BEFORE, SUBJECT, JWT_ID];

/// Reasons a claim set is rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClaimError {
    #[error("required claim `{0}` is missing")]
    MissingClaim(String),
    #[error("claim `{0}` has an invalid type")]
    InvalidClaimType(String),
    #[error("token has expired")]
    TokenExpired,
    #[error("token is not valid yet")]
    TokenNotYetValid,
    #[error("token can no longer be refreshed")]
    RefreshWindowExceeded,
}

type Result<T> = std::result::Result<T, ClaimError>;

/// Validator for token payloads.
#[derive(Debug, Clone)]
pub struct PayloadValidator {
    required: Vec<String>,
    leeway: i64,
}

impl Default for PayloadValidator {
    fn default() -> Self {
        Self::new(DEFAULT_REQUIRED_CLAIMS)
    }
}

impl PayloadValidator {
    /// Create a new [`PayloadValidator`] requiring `required` claims.
    pub fn new<I, S>(required: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            required: required.into_iter().map(Into::into).collect(),
            leeway: 0,
        }
    }

    /// Tolerated clock skew, in seconds.
    pub fn with_leeway(mut self, leeway: u64) -> Self {
        self.leeway = i64::try_from(leeway).unwrap_or(i64::MAX);
        self
    }

    pub fn required_claims(&self) -> &[String] {
        &self.required
    }

    /// Check required claims are present and registered claims are well
    /// typed. Time is not looked at.
    pub fn validate_structure(&self, claims: &ClaimSet) -> Result<()> {
        if let Some(missing) =
            self.required.iter().find(|name| !claims.contains(name))
        {
            return Err(ClaimError::MissingClaim(missing.clone()));
        }

        for (name, value) in claims.iter() {
            let well_typed = match name.as_str() {
                ISSUED_AT | EXPIRATION | NOT_BEFORE => {
                    value.as_timestamp().is_some()
                },
                ISSUER | JWT_ID => matches!(value, ClaimValue::Text(_)),
                SUBJECT => value.as_identifier().is_some(),
                _ => true,
            };

            if !well_typed {
                return Err(ClaimError::InvalidClaimType(name.clone()));
            }
        }

        Ok(())
    }

    /// Full validation for a token presented to access a resource.
    pub fn validate(&self, claims: &ClaimSet, now: i64) -> Result<()> {
        self.validate_structure(claims)?;
        self.check_not_before(claims, now)?;

        if let Some(exp) = claims.expiration() {
            if exp <= now.saturating_sub(self.leeway) {
                return Err(ClaimError::TokenExpired);
            }
        }

        Ok(())
    }

    /// Validation for a token presented to be refreshed. An expired token is
    /// accepted as long as `iat + refresh_ttl` is still ahead.
    pub fn validate_refresh(
        &self,
        claims: &ClaimSet,
        now: i64,
        refresh_ttl: u64,
    ) -> Result<()> {
        self.validate_structure(claims)?;
        self.check_not_before(claims, now)?;

        let iat = claims
            .issued_at()
            .ok_or_else(|| ClaimError::MissingClaim(ISSUED_AT.to_owned()))?;
        let refresh_ttl = i64::try_from(refresh_ttl).unwrap_or(i64::MAX);
        if iat.saturating_add(refresh_ttl) <= now.saturating_sub(self.leeway) {
            return Err(ClaimError::RefreshWindowExceeded);
        }

        Ok(())
    }

    fn check_not_before(&self, claims: &ClaimSet, now: i64) -> Result<()> {
        let horizon = now.saturating_add(self.leeway);

        if claims.not_before().is_some_and(|nbf| nbf > horizon)
            || claims.issued_at().is_some_and(|iat| iat > horizon)
        {
            return Err(ClaimError::TokenNotYetValid);
        }

        Ok(())
    }
}
