//! Claims carried by a json web token.

pub mod validator;

use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::crypto;

pub use validator::{ClaimError, PayloadValidator};

/// Issuer claim.
pub const ISSUER: &str = "iss";
/// Subject claim.
pub const SUBJECT: &str = "sub";
/// Issued at claim.
pub const ISSUED_AT: &str = "iat";
/// Expiration claim.
pub const EXPIRATION: &str = "exp";
/// Not before claim.
pub const NOT_BEFORE: &str = "nbf";
/// Unique token identifier claim.
pub const JWT_ID: &str = "jti";

/// Registered claims. Custom claims can never overwrite them.
pub const REGISTERED: [&str; 6] =
    [ISSUER, SUBJECT, ISSUED_AT, EXPIRATION, NOT_BEFORE, JWT_ID];

const JTI_LENGTH: usize = 16;

/// Value of a single claim.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClaimValue {
    Integer(i64),
    Float(f64),
    Text(String),
    List(Vec<String>),
    /// Anything else a third party put in the payload.
    Other(serde_json::Value),
}

impl ClaimValue {
    /// Return the value as text, if it is text.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ClaimValue::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Return the value as a NumericDate in seconds.
    pub fn as_timestamp(&self) -> Option<i64> {
        match self {
            ClaimValue::Integer(value) => Some(*value),
            ClaimValue::Float(value) if value.is_finite() => Some(*value as i64),
            _ => None,
        }
    }

    /// Render a text or integer value as an identifier.
    pub fn as_identifier(&self) -> Option<String> {
        match self {
            ClaimValue::Text(text) => Some(text.clone()),
            ClaimValue::Integer(value) => Some(value.to_string()),
            _ => None,
        }
    }
}

impl From<&str> for ClaimValue {
    fn from(value: &str) -> Self {
        ClaimValue::Text(value.to_owned())
    }
}

impl From<String> for ClaimValue {
    fn from(value: String) -> Self {
        ClaimValue::Text(value)
    }
}

impl From<i64> for ClaimValue {
    fn from(value: i64) -> Self {
        ClaimValue::Integer(value)
    }
}

impl From<Vec<String>> for ClaimValue {
    fn from(value: Vec<String>) -> Self {
        ClaimValue::List(value)
    }
}

/// Insertion-ordered set of claims.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClaimSet(IndexMap<String, ClaimValue>);

impl ClaimSet {
    /// Create an empty [`ClaimSet`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a claim, returning the previous value.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        value: impl Into<ClaimValue>,
    ) -> Option<ClaimValue> {
        self.0.insert(name.into(), value.into())
    }

    /// Builder flavour of [`ClaimSet::insert`].
    pub fn with(mut self, name: impl Into<String>, value: impl Into<ClaimValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&ClaimValue> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<ClaimValue> {
        self.0.shift_remove(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ClaimValue)> {
        self.0.iter()
    }

    /// Claims that are not part of [`REGISTERED`].
    pub fn custom(&self) -> impl Iterator<Item = (&String, &ClaimValue)> {
        self.0
            .iter()
            .filter(|(name, _)| !REGISTERED.contains(&name.as_str()))
    }

    /// Subject of the token.
    pub fn subject(&self) -> Option<String> {
        self.get(SUBJECT).and_then(ClaimValue::as_identifier)
    }

    /// Unique identifier of the token.
    pub fn jti(&self) -> Option<&str> {
        self.get(JWT_ID).and_then(ClaimValue::as_str)
    }

    pub fn issued_at(&self) -> Option<i64> {
        self.get(ISSUED_AT).and_then(ClaimValue::as_timestamp)
    }

    pub fn expiration(&self) -> Option<i64> {
        self.get(EXPIRATION).and_then(ClaimValue::as_timestamp)
    }

    pub fn not_before(&self) -> Option<i64> {
        self.get(NOT_BEFORE).and_then(ClaimValue::as_timestamp)
    }
}

impl FromIterator<(String, ClaimValue)> for ClaimSet {
    fn from_iter<T: IntoIterator<Item = (String, ClaimValue)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Build claim sets for new and refreshed tokens.
#[derive(Clone)]
pub struct ClaimsFactory {
    issuer: String,
    ttl: u64,
    defaults: IndexMap<String, ClaimValue>,
    clock: Arc<dyn Clock>,
}

impl ClaimsFactory {
    /// Create a new [`ClaimsFactory`].
    pub fn new(issuer: impl Into<String>, ttl: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            issuer: issuer.into(),
            ttl,
            defaults: IndexMap::new(),
            clock,
        }
    }

    /// Static custom claims added to every token.
    pub fn with_claims(mut self, claims: IndexMap<String, ClaimValue>) -> Self {
        self.defaults = claims;
        self
    }

    /// Default lifetime of a token, in seconds.
    pub fn ttl(&self) -> u64 {
        self.ttl
    }

    /// Build claims with the default lifetime.
    pub fn build<I>(&self, subject: &str, custom: I) -> ClaimSet
    where
        I: IntoIterator<Item = (String, ClaimValue)>,
    {
        self.build_with_ttl(subject, custom, self.ttl)
    }

    /// Build claims expiring `ttl` seconds from now.
    pub fn build_with_ttl<I>(&self, subject: &str, custom: I, ttl: u64) -> ClaimSet
    where
        I: IntoIterator<Item = (String, ClaimValue)>,
    {
        let mut claims = ClaimSet::new()
            .with(ISSUER, self.issuer.as_str())
            .with(SUBJECT, subject);
        self.stamp(&mut claims, ttl);

        let custom = self
            .defaults
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .chain(custom);
        for (name, value) in custom {
            if REGISTERED.contains(&name.as_str()) {
                tracing::debug!(claim = %name, "ignoring custom claim overriding a registered one");
                continue;
            }
            claims.insert(name, value);
        }

        claims
    }

    /// Claims of a refreshed token: everything is kept except the time
    /// claims and `jti`, which are renewed.
    pub fn refresh(&self, previous: &ClaimSet) -> ClaimSet {
        let mut claims = previous.clone();
        self.stamp(&mut claims, self.ttl);
        claims
    }

    fn stamp(&self, claims: &mut ClaimSet, ttl: u64) {
        let now = self.clock.now();
        let ttl = i64::try_from(ttl).unwrap_or(i64::MAX);

        claims.insert(ISSUED_AT, now);
        claims.insert(NOT_BEFORE, now);
        claims.insert(EXPIRATION, now.saturating_add(ttl));
        claims.insert(JWT_ID, crypto::random_string(JTI_LENGTH));
    }
}
