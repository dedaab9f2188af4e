//! Manage json web tokens.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::blacklist::{Blacklist, Revocation};
use crate::claims::{ClaimSet, ClaimsFactory, PayloadValidator};
use crate::clock::Clock;
use crate::error::{AuthError, Result};
use crate::signer::{SignatureError, SigningProvider};

/// Compact serialized json web token: `header.payload.signature`.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Token(String);

impl Token {
    /// Check the shape of a compact token. Nothing is verified.
    pub fn new(value: impl Into<String>) -> std::result::Result<Self, SignatureError> {
        let value = value.into();
        let segments = value.split('.').collect::<Vec<_>>();

        let well_formed = segments.len() == 3
            && segments.iter().all(|segment| {
                !segment.is_empty()
                    && segment
                        .bytes()
                        .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
            });

        if well_formed {
            Ok(Self(value))
        } else {
            Err(SignatureError::MalformedToken)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Base64url encoded header.
    pub fn header(&self) -> &str {
        self.segment(0)
    }

    /// Base64url encoded claims.
    pub fn payload(&self) -> &str {
        self.segment(1)
    }

    /// Base64url encoded signature.
    pub fn signature(&self) -> &str {
        self.segment(2)
    }

    fn segment(&self, index: usize) -> &str {
        self.0.split('.').nth(index).unwrap_or_default()
    }
}

impl FromStr for Token {
    type Err = SignatureError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// Tokens are credentials, keep them out of logs.
impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Token").field(&"***").finish()
    }
}

/// Issue, decode, refresh and invalidate tokens.
#[derive(Clone)]
pub struct TokenManager {
    signer: Arc<dyn SigningProvider>,
    blacklist: Blacklist,
    factory: ClaimsFactory,
    validator: PayloadValidator,
    clock: Arc<dyn Clock>,
    blacklist_enabled: bool,
}

impl TokenManager {
    /// Create a new [`TokenManager`] with the blacklist enabled.
    pub fn new(
        signer: Arc<dyn SigningProvider>,
        blacklist: Blacklist,
        factory: ClaimsFactory,
        validator: PayloadValidator,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            signer,
            blacklist,
            factory,
            validator,
            clock,
            blacklist_enabled: true,
        }
    }

    pub fn with_blacklist_enabled(mut self, enabled: bool) -> Self {
        self.blacklist_enabled = enabled;
        self
    }

    pub fn set_blacklist_enabled(&mut self, enabled: bool) {
        self.blacklist_enabled = enabled;
    }

    pub fn blacklist_enabled(&self) -> bool {
        self.blacklist_enabled
    }

    pub fn factory(&self) -> &ClaimsFactory {
        &self.factory
    }

    pub fn validator(&self) -> &PayloadValidator {
        &self.validator
    }

    /// Sign `claims` after checking they form a currently valid token.
    pub fn issue(&self, claims: &ClaimSet) -> Result<Token> {
        self.validator.validate(claims, self.clock.now())?;
        let token = self.signer.encode(claims)?;

        metrics::counter!("jwt_tokens_issued_total").increment(1);
        tracing::debug!(jti = claims.jti(), sub = ?claims.subject(), "token issued");

        Ok(token)
    }

    /// Verify `token` and return its claims.
    ///
    /// When `check_revocation` is set and the blacklist is enabled, a
    /// token with a revocation record is refused, grace period or not.
    pub async fn decode(&self, token: &Token, check_revocation: bool) -> Result<ClaimSet> {
        let claims = self.signer.decode(token)?;
        self.validator.validate(&claims, self.clock.now())?;

        if check_revocation
            && self.blacklist_enabled
            && self
                .blacklist
                .is_revoked(&claims, token)
                .await
                .map_err(AuthError::RevocationCheckUnavailable)?
        {
            return Err(AuthError::TokenRevoked);
        }

        Ok(claims)
    }

    /// Exchange `token` for a new one carrying the same claims.
    ///
    /// An expired token is accepted as long as it was issued less than
    /// the refresh ttl ago. The old token is revoked, and can still be
    /// refreshed during the blacklist grace period unless it was invalidated.
    pub async fn refresh(&self, token: &Token) -> Result<Token> {
        let claims = self.signer.decode(token)?;
        self.validator
            .validate_refresh(&claims, self.clock.now(), self.blacklist.refresh_ttl())?;

        if self.blacklist_enabled {
            if self
                .blacklist
                .is_revoked_for_refresh(&claims, token)
                .await
                .map_err(AuthError::RevocationCheckUnavailable)?
            {
                return Err(AuthError::TokenRevoked);
            }

            let created = self
                .blacklist
                .revoke(&claims, token, Revocation::Refreshed)
                .await
                .map_err(AuthError::RevocationCheckUnavailable)?;

            if created {
                metrics::counter!("jwt_tokens_revoked_total").increment(1);
            } else if self
                .blacklist
                .is_revoked_for_refresh(&claims, token)
                .await
                .map_err(AuthError::RevocationCheckUnavailable)?
            {
                // Revoked by a concurrent request since the first check.
                return Err(AuthError::TokenRevoked);
            }
        }

        let renewed = self.issue(&self.factory.refresh(&claims))?;
        metrics::counter!("jwt_tokens_refreshed_total").increment(1);
        tracing::info!(sub = ?claims.subject(), "token refreshed");

        Ok(renewed)
    }

    /// Revoke `token`. Expired tokens can be revoked too.
    pub async fn invalidate(&self, token: &Token) -> Result<()> {
        if !self.blacklist_enabled {
            return Err(AuthError::BlacklistDisabled);
        }

        let claims = self.signer.decode(token)?;
        self.validator.validate_structure(&claims)?;

        let created = self
            .blacklist
            .revoke(&claims, token, Revocation::Invalidated)
            .await
            .map_err(AuthError::RevocationCheckUnavailable)?;

        if created {
            metrics::counter!("jwt_tokens_revoked_total").increment(1);
            tracing::info!(jti = claims.jti(), sub = ?claims.subject(), "token revoked");
        } else {
            tracing::debug!(jti = claims.jti(), "token already revoked");
        }

        Ok(())
    }
}
