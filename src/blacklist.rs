//! Revocation records for tokens that must no longer be accepted.
//!
//! A record is keyed by the token `jti`, or by a digest of its signature
//! when it has none. It holds why the token was revoked and the Unix
//! timestamp at which it was, e.g. `refreshed:1700000000`. Records outlive
//! the token's refresh window so a revoked token cannot come back through a
//! refresh.

use std::sync::Arc;
use std::time::Duration;

use crate::claims::ClaimSet;
use crate::clock::Clock;
use crate::crypto;
use crate::storage::{CacheStore, Result};
use crate::token::Token;

const KEY_PREFIX: &str = "jwt:revoked:";
/// Lifetime of a record for a token without `exp`.
const FOREVER: Duration = Duration::from_secs(60 * 60 * 24 * 365 * 5);

/// Why a token was revoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Revocation {
    /// Exchanged for a new token. Still refreshable during the grace period.
    Refreshed,
    /// Logged out. Never accepted again.
    Invalidated,
}

impl Revocation {
    fn as_str(self) -> &'static str {
        match self {
            Revocation::Refreshed => "refreshed",
            Revocation::Invalidated => "invalidated",
        }
    }

    fn record(self, revoked_at: i64) -> String {
        format!("{}:{revoked_at}", self.as_str())
    }

    /// Parse a stored record into its kind and timestamp.
    fn parse(record: &str) -> Option<(Self, i64)> {
        let (kind, revoked_at) = record.split_once(':')?;
        let kind = match kind {
            "refreshed" => Revocation::Refreshed,
            "invalidated" => Revocation::Invalidated,
            _ => return None,
        };

        Some((kind, revoked_at.parse().ok()?))
    }
}

/// Set of revoked tokens, stored in a [`CacheStore`].
#[derive(Clone)]
pub struct Blacklist {
    store: Arc<dyn CacheStore>,
    clock: Arc<dyn Clock>,
    grace_period: u64,
    refresh_ttl: u64,
}

impl Blacklist {
    /// Create a new [`Blacklist`] without grace period.
    pub fn new(
        store: Arc<dyn CacheStore>,
        clock: Arc<dyn Clock>,
        refresh_ttl: u64,
    ) -> Self {
        Self {
            store,
            clock,
            grace_period: 0,
            refresh_ttl,
        }
    }

    /// Seconds during which a revoked token can still be refreshed.
    pub fn with_grace_period(mut self, seconds: u64) -> Self {
        self.grace_period = seconds;
        self
    }

    /// Seconds after `iat` during which a token can be refreshed.
    pub fn refresh_ttl(&self) -> u64 {
        self.refresh_ttl
    }

    pub fn grace_period(&self) -> u64 {
        self.grace_period
    }

    /// Key of the revocation record of a token.
    pub fn key(claims: &ClaimSet, token: &Token) -> String {
        match claims.jti() {
            Some(jti) => format!("{KEY_PREFIX}{jti}"),
            None => format!("{KEY_PREFIX}{}", crypto::digest(token.signature())),
        }
    }

    /// Record `token` as revoked. Returns whether this call revoked it.
    ///
    /// A token revoked by a refresh keeps its first record when refreshed
    /// again. Invalidating it replaces that record, since an invalidated
    /// token must never be refreshed.
    pub async fn revoke(
        &self,
        claims: &ClaimSet,
        token: &Token,
        kind: Revocation,
    ) -> Result<bool> {
        let now = self.clock.now();
        let key = Self::key(claims, token);
        let ttl = self.ttl(claims, now);

        if self.store.add(&key, kind.record(now), ttl).await? {
            return Ok(true);
        }
        if kind == Revocation::Refreshed {
            return Ok(false);
        }

        let previous = self.store.get(&key).await?;
        if previous
            .as_deref()
            .and_then(Revocation::parse)
            .is_some_and(|(kind, _)| kind == Revocation::Invalidated)
        {
            return Ok(false);
        }

        self.store.put(&key, kind.record(now), ttl).await?;
        Ok(true)
    }

    /// Whether a revocation record exists for `token`.
    pub async fn is_revoked(&self, claims: &ClaimSet, token: &Token) -> Result<bool> {
        Ok(self.store.get(&Self::key(claims, token)).await?.is_some())
    }

    /// Whether `token` can no longer be refreshed.
    ///
    /// A token revoked by a refresh stays refreshable for the grace period,
    /// so that clients racing on the same token are all given a fresh one.
    /// An invalidated token never is.
    pub async fn is_revoked_for_refresh(
        &self,
        claims: &ClaimSet,
        token: &Token,
    ) -> Result<bool> {
        let Some(record) = self.store.get(&Self::key(claims, token)).await? else {
            return Ok(false);
        };

        match Revocation::parse(&record) {
            Some((Revocation::Refreshed, revoked_at)) => {
                let grace = i64::try_from(self.grace_period).unwrap_or(i64::MAX);
                Ok(self.clock.now() >= revoked_at.saturating_add(grace))
            },
            Some((Revocation::Invalidated, _)) => Ok(true),
            None => {
                tracing::warn!(record = %record, "unreadable revocation record");
                Ok(true)
            },
        }
    }

    /// Keep the record until neither the token nor its refresh window
    /// can be used anymore.
    fn ttl(&self, claims: &ClaimSet, now: i64) -> Duration {
        let Some(exp) = claims.expiration() else {
            return FOREVER;
        };

        let refresh_ttl = i64::try_from(self.refresh_ttl).unwrap_or(i64::MAX);
        let refreshable_until = claims
            .issued_at()
            .map_or(exp, |iat| iat.saturating_add(refresh_ttl));
        let seconds = exp.max(refreshable_until).saturating_sub(now).max(1);

        Duration::from_secs(seconds.unsigned_abs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::storage::{MemoryStore, UnavailableStore};

    const NOW: i64 = 1_700_000_000;

    fn token() -> Token {
        Token::new("aGVhZGVy.cGF5bG9hZA.c2lnbmF0dXJl").unwrap()
    }

    fn claims() -> ClaimSet {
        ClaimSet::new()
            .with("jti", "abc")
            .with("iat", NOW)
            .with("exp", NOW + 60)
    }

    fn blacklist(clock: Arc<FixedClock>) -> Blacklist {
        Blacklist::new(Arc::new(MemoryStore::new()), clock, 3600)
            .with_grace_period(30)
    }

    #[test]
    fn test_key() {
        assert_eq!(Blacklist::key(&claims(), &token()), "jwt:revoked:abc");

        let without_jti = ClaimSet::new().with("exp", NOW);
        assert_eq!(
            Blacklist::key(&without_jti, &token()),
            format!("jwt:revoked:{}", crypto::digest("c2lnbmF0dXJl"))
        );
    }

    #[test]
    fn test_ttl_covers_refresh_window() {
        let blacklist = blacklist(Arc::new(FixedClock::new(NOW)));

        assert_eq!(blacklist.ttl(&claims(), NOW), Duration::from_secs(3600));
        assert_eq!(
            blacklist.ttl(&claims(), NOW + 3600),
            Duration::from_secs(1)
        );
        assert_eq!(
            blacklist.ttl(&ClaimSet::new().with("exp", NOW + 7200), NOW),
            Duration::from_secs(7200)
        );
        assert_eq!(blacklist.ttl(&ClaimSet::new(), NOW), FOREVER);
    }

    #[tokio::test]
    async fn test_revoke() {
        let blacklist = blacklist(Arc::new(FixedClock::new(NOW)));

        assert!(!blacklist.is_revoked(&claims(), &token()).await.unwrap());
        assert!(
            blacklist
                .revoke(&claims(), &token(), Revocation::Refreshed)
                .await
                .unwrap()
        );
        assert!(
            !blacklist
                .revoke(&claims(), &token(), Revocation::Refreshed)
                .await
                .unwrap()
        );
        assert!(blacklist.is_revoked(&claims(), &token()).await.unwrap());

        // Invalidating replaces a refresh record, once.
        assert!(
            blacklist
                .revoke(&claims(), &token(), Revocation::Invalidated)
                .await
                .unwrap()
        );
        assert!(
            !blacklist
                .revoke(&claims(), &token(), Revocation::Invalidated)
                .await
                .unwrap()
        );
        assert!(
            !blacklist
                .revoke(&claims(), &token(), Revocation::Refreshed)
                .await
                .unwrap()
        );
        assert!(
            blacklist
                .is_revoked_for_refresh(&claims(), &token())
                .await
                .unwrap()
        );
    }

    #[test]
    fn test_record() {
        assert_eq!(Revocation::Refreshed.record(NOW), "refreshed:1700000000");
        assert_eq!(
            Revocation::parse("invalidated:1700000000"),
            Some((Revocation::Invalidated, NOW))
        );
        assert_eq!(Revocation::parse("1700000000"), None);
        assert_eq!(Revocation::parse("refreshed:soon"), None);
    }

    #[tokio::test]
    async fn test_grace_period() {
        let clock = Arc::new(FixedClock::new(NOW));
        let blacklist = blacklist(Arc::clone(&clock));
        blacklist
            .revoke(&claims(), &token(), Revocation::Refreshed)
            .await
            .unwrap();

        assert!(
            !blacklist
                .is_revoked_for_refresh(&claims(), &token())
                .await
                .unwrap()
        );

        clock.advance(29);
        assert!(
            !blacklist
                .is_revoked_for_refresh(&claims(), &token())
                .await
                .unwrap()
        );

        clock.advance(1);
        assert!(
            blacklist
                .is_revoked_for_refresh(&claims(), &token())
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_invalidated_ignores_grace_period() {
        let clock = Arc::new(FixedClock::new(NOW));
        let blacklist = blacklist(Arc::clone(&clock));
        blacklist
            .revoke(&claims(), &token(), Revocation::Invalidated)
            .await
            .unwrap();

        assert!(
            blacklist
                .is_revoked_for_refresh(&claims(), &token())
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_unreadable_record() {
        let store = Arc::new(MemoryStore::new());
        let blacklist = Blacklist::new(store.clone(), Arc::new(FixedClock::new(NOW)), 3600)
            .with_grace_period(30);
        store
            .put(
                &Blacklist::key(&claims(), &token()),
                NOW.to_string(),
                Duration::from_secs(60),
            )
            .await
            .unwrap();

        assert!(
            blacklist
                .is_revoked_for_refresh(&claims(), &token())
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_unavailable_store() {
        let blacklist = Blacklist::new(
            Arc::new(UnavailableStore),
            Arc::new(FixedClock::new(NOW)),
            3600,
        );

        assert!(blacklist.is_revoked(&claims(), &token()).await.is_err());
        assert!(
            blacklist
                .revoke(&claims(), &token(), Revocation::Invalidated)
                .await
                .is_err()
        );
    }
}
