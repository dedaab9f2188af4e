//! Entry point tying users, claims and tokens together.

use std::sync::Arc;

use crate::claims::{ClaimError, ClaimSet, SUBJECT};
use crate::error::{AuthError, Result};
use crate::telemetry;
use crate::token::{Token, TokenManager};
use crate::user::{AuthBridge, Credentials, Principal, UserDirectory};

const BEARER: &str = "bearer";

/// Json web token authentication.
#[derive(Clone)]
pub struct JwtAuth {
    manager: TokenManager,
    users: Arc<dyn UserDirectory>,
    bridge: Arc<dyn AuthBridge>,
    identifier: String,
}

impl JwtAuth {
    /// Create a new [`JwtAuth`] identifying users with `sub`.
    pub fn new(
        manager: TokenManager,
        users: Arc<dyn UserDirectory>,
        bridge: Arc<dyn AuthBridge>,
    ) -> Self {
        Self {
            manager,
            users,
            bridge,
            identifier: SUBJECT.to_owned(),
        }
    }

    /// Claim holding the user primary key.
    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = identifier.into();
        self
    }

    pub fn manager(&self) -> &TokenManager {
        &self.manager
    }

    /// Issue a token for `principal`.
    pub fn login(&self, principal: &Principal) -> Result<Token> {
        let mut custom = principal.claims.clone();
        if self.identifier != SUBJECT {
            custom.insert(self.identifier.clone(), principal.id.as_str().into());
        }

        let claims = self.manager.factory().build(&principal.id, custom);
        let token = self.manager.issue(&claims)?;
        tracing::info!(user = %principal.id, "user logged in");

        Ok(token)
    }

    /// Issue a token for the user matching `credentials`.
    pub async fn attempt(&self, credentials: &Credentials) -> Result<Token> {
        match self.users.find_by_credentials(credentials).await? {
            Some(principal) => self.login(&principal),
            None => {
                let err = AuthError::InvalidCredentials;
                telemetry::record_failure(&err);
                Err(err)
            },
        }
    }

    /// Issue a token for the principal authenticated by the host.
    pub async fn from_current(&self) -> Result<Token> {
        let principal = self
            .bridge
            .current_principal()
            .await
            .ok_or(AuthError::Unauthenticated)?;

        self.login(&principal)
    }

    /// Verify `token` and resolve the user it was issued for.
    pub async fn authenticate(&self, token: &Token) -> Result<Principal> {
        self.resolve(token)
            .await
            .inspect_err(telemetry::record_failure)
            .map(|(principal, _)| principal)
    }

    /// Same as [`JwtAuth::authenticate`], also returning the claims.
    pub async fn resolve(&self, token: &Token) -> Result<(Principal, ClaimSet)> {
        let claims = self.manager.decode(token, true).await?;
        let id = claims
            .get(&self.identifier)
            .and_then(|value| value.as_identifier())
            .ok_or_else(|| ClaimError::MissingClaim(self.identifier.clone()))?;

        let principal = self
            .users
            .find_by_id(&id)
            .await?
            .ok_or(AuthError::UserNotFound)?;
        tracing::debug!(user = %principal.id, "token authenticated");

        Ok((principal, claims))
    }

    /// Verify `token` and return its claims.
    pub async fn payload(&self, token: &Token) -> Result<ClaimSet> {
        self.manager
            .decode(token, true)
            .await
            .inspect_err(telemetry::record_failure)
    }

    /// Exchange `token` for a fresh one, revoking it.
    pub async fn refresh(&self, token: &Token) -> Result<Token> {
        self.manager
            .refresh(token)
            .await
            .inspect_err(telemetry::record_failure)
    }

    /// Revoke `token`.
    pub async fn invalidate(&self, token: &Token) -> Result<()> {
        self.manager.invalidate(token).await
    }

    /// Extract the token of an `Authorization: Bearer <token>` header.
    pub fn parse_token(header: &str) -> Result<Token> {
        let Some((scheme, token)) = header.trim().split_once(' ') else {
            return Err(AuthError::TokenAbsent);
        };

        let token = token.trim();
        if !scheme.eq_ignore_ascii_case(BEARER) || token.is_empty() {
            return Err(AuthError::TokenAbsent);
        }

        Ok(Token::new(token)?)
    }
}

#[cfg(test)]
mod tests {
    use jsonwebtoken::Algorithm;

    use super::*;
    use crate::blacklist::Blacklist;
    use crate::claims::{ClaimsFactory, PayloadValidator};
    use crate::clock::FixedClock;
    use crate::config::Argon2;
    use crate::crypto::PasswordManager;
    use crate::signer::{JwtSigner, SignatureError};
    use crate::storage::MemoryStore;
    use crate::user::{MemoryDirectory, SessionBridge};

    const NOW: i64 = 1_700_000_000;

    struct Fixture {
        clock: Arc<FixedClock>,
        bridge: SessionBridge,
        auth: JwtAuth,
    }

    async fn fixture() -> Fixture {
        let clock = Arc::new(FixedClock::new(NOW));
        let signer = JwtSigner::hmac(Algorithm::HS256, b"secret").unwrap();
        let manager = TokenManager::new(
            Arc::new(signer),
            Blacklist::new(Arc::new(MemoryStore::new()), clock.clone(), 7200),
            ClaimsFactory::new("jwtauth", 3600, clock.clone()),
            PayloadValidator::default(),
            clock.clone(),
        );

        let passwords = PasswordManager::new(Some(Argon2 {
            memory_cost: 1024,
            iterations: 1,
            parallelism: 1,
            hash_length: 32,
        }))
        .unwrap();
        let users = MemoryDirectory::new(passwords);
        users
            .insert(Principal::new("42", "alice").with_claim("role", "admin"), "hunter2")
            .await
            .unwrap();

        let bridge = SessionBridge::new();
        Fixture {
            clock,
            auth: JwtAuth::new(manager, Arc::new(users), Arc::new(bridge.clone())),
            bridge,
        }
    }

    #[tokio::test]
    async fn test_login_then_authenticate() {
        let fixture = fixture().await;
        let token = fixture.auth.login(&Principal::new("42", "alice")).unwrap();

        let principal = fixture.auth.authenticate(&token).await.unwrap();
        assert_eq!(principal.id, "42");
        assert_eq!(principal.username, "alice");
    }

    #[tokio::test]
    async fn test_expired_login() {
        let fixture = fixture().await;
        let token = fixture.auth.login(&Principal::new("42", "alice")).unwrap();

        fixture.clock.advance(3600);
        assert!(matches!(
            fixture.auth.authenticate(&token).await,
            Err(AuthError::Claim(ClaimError::TokenExpired))
        ));
    }

    #[tokio::test]
    async fn test_attempt() {
        let fixture = fixture().await;

        let token = fixture
            .auth
            .attempt(&Credentials::new("alice", "hunter2"))
            .await
            .unwrap();
        let claims = fixture.auth.payload(&token).await.unwrap();
        assert_eq!(claims.subject().as_deref(), Some("42"));
        assert_eq!(claims.get("role").and_then(|v| v.as_str()), Some("admin"));

        assert!(matches!(
            fixture
                .auth
                .attempt(&Credentials::new("alice", "nope"))
                .await,
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn test_from_current() {
        let fixture = fixture().await;
        assert!(matches!(
            fixture.auth.from_current().await,
            Err(AuthError::Unauthenticated)
        ));

        fixture.bridge.sign_in(Principal::new("42", "alice")).await;
        let token = fixture.auth.from_current().await.unwrap();
        assert_eq!(fixture.auth.authenticate(&token).await.unwrap().id, "42");
    }

    #[tokio::test]
    async fn test_unknown_user() {
        let fixture = fixture().await;
        let token = fixture.auth.login(&Principal::new("404", "ghost")).unwrap();

        assert!(matches!(
            fixture.auth.authenticate(&token).await,
            Err(AuthError::UserNotFound)
        ));
    }

    #[tokio::test]
    async fn test_custom_identifier() {
        let fixture = fixture().await;
        let auth = fixture.auth.with_identifier("uid");
        let token = auth.login(&Principal::new("42", "alice")).unwrap();

        let claims = auth.payload(&token).await.unwrap();
        assert_eq!(claims.get("uid").and_then(|v| v.as_str()), Some("42"));
        assert_eq!(auth.authenticate(&token).await.unwrap().id, "42");
    }

    #[tokio::test]
    async fn test_logout() {
        let fixture = fixture().await;
        let token = fixture.auth.login(&Principal::new("42", "alice")).unwrap();

        fixture.clock.advance(1);
        let renewed = fixture.auth.refresh(&token).await.unwrap();
        fixture.auth.invalidate(&renewed).await.unwrap();

        assert!(matches!(
            fixture.auth.authenticate(&renewed).await,
            Err(AuthError::TokenRevoked)
        ));
    }

    #[test]
    fn test_parse_token() {
        let token = JwtAuth::parse_token("Bearer aaa.bbb.ccc").unwrap();
        assert_eq!(token.as_str(), "aaa.bbb.ccc");
        assert!(JwtAuth::parse_token("bearer  aaa.bbb.ccc ").is_ok());

        assert!(matches!(
            JwtAuth::parse_token("Basic dXNlcjpwYXNz"),
            Err(AuthError::TokenAbsent)
        ));
        assert!(matches!(
            JwtAuth::parse_token("Bearer "),
            Err(AuthError::TokenAbsent)
        ));
        assert!(matches!(
            JwtAuth::parse_token("Bearer not-a-token"),
            Err(AuthError::Signature(SignatureError::MalformedToken))
        ));
    }
}
