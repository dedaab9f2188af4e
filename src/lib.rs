//! jwtauth issues, validates, refreshes and revokes json web tokens.
//!
//! Tokens are signed with a [`signer::SigningProvider`], their claims checked
//! by a [`claims::PayloadValidator`] and revoked ones kept in a
//! [`blacklist::Blacklist`]. [`auth::JwtAuth`] ties them to the users of a
//! [`user::UserDirectory`].

#![forbid(unsafe_code)]

pub mod auth;
pub mod blacklist;
pub mod claims;
pub mod clock;
pub mod config;
pub mod crypto;
pub mod error;
pub mod middleware;
pub mod signer;
pub mod storage;
pub mod telemetry;
pub mod token;
pub mod user;

use std::sync::Arc;

pub use auth::JwtAuth;
pub use claims::{ClaimSet, ClaimValue};
pub use config::Configuration;
pub use error::{AuthError, Result};
pub use token::{Token, TokenManager};
pub use user::{Credentials, Principal};

use crate::blacklist::Blacklist;
use crate::claims::{ClaimsFactory, PayloadValidator};
use crate::clock::{Clock, SystemClock};
use crate::config::{AuthProvider, JwtProvider, StorageProvider, UserProvider};
use crate::crypto::PasswordManager;
use crate::signer::{JwtSigner, SigningProvider};
use crate::storage::{CacheStore, MemoryStore};
use crate::user::{AuthBridge, MemoryDirectory, SessionBridge, UserDirectory};

/// Build a [`JwtAuth`] from `config`, picking each provider it names.
pub fn initialize(config: &Configuration) -> Result<JwtAuth> {
    config.validate()?;
    telemetry::describe_metrics();
    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());

    let signer: Arc<dyn SigningProvider> = match config.providers.jwt {
        JwtProvider::Jsonwebtoken => Arc::new(JwtSigner::from_config(config)?),
    };
    let store: Arc<dyn CacheStore> = match config.providers.storage {
        StorageProvider::Memory => Arc::new(MemoryStore::new()),
    };
    let users: Arc<dyn UserDirectory> = match config.providers.user {
        UserProvider::Memory => {
            let passwords = PasswordManager::new(config.argon2.clone())?;
            Arc::new(MemoryDirectory::from_users(&config.users, passwords))
        },
    };
    let bridge: Arc<dyn AuthBridge> = match config.providers.auth {
        AuthProvider::Session => Arc::new(SessionBridge::new()),
    };

    let blacklist = Blacklist::new(store, Arc::clone(&clock), config.refresh_ttl)
        .with_grace_period(config.blacklist_grace_period);
    let factory = ClaimsFactory::new(&config.issuer, config.ttl, Arc::clone(&clock))
        .with_claims(config.claims.clone());
    let validator = PayloadValidator::new(config.required_claims.iter().cloned())
        .with_leeway(config.leeway);

    let manager = TokenManager::new(signer, blacklist, factory, validator, clock)
        .with_blacklist_enabled(config.blacklist_enabled);

    tracing::info!(
        algorithm = %config.algo,
        ttl = config.ttl,
        blacklist = config.blacklist_enabled,
        "token authentication initialized"
    );

    Ok(JwtAuth::new(manager, users, bridge).with_identifier(&config.identifier))
}
