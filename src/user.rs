//! User lookup and current-session bridge.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::Serialize;
use tokio::sync::RwLock;

use crate::claims::ClaimValue;
use crate::config::User;
use crate::crypto::PasswordManager;
use crate::error::Result;

/// Resolved user identity.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct Principal {
    pub id: String,
    pub username: String,
    /// Claims added to every token issued for this user.
    pub claims: IndexMap<String, ClaimValue>,
}

impl Principal {
    /// Create a new [`Principal`] without custom claims.
    pub fn new(id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
            claims: IndexMap::new(),
        }
    }

    /// Add a custom claim.
    pub fn with_claim(
        mut self,
        name: impl Into<String>,
        value: impl Into<ClaimValue>,
    ) -> Self {
        self.claims.insert(name.into(), value.into());
        self
    }
}

/// Pair of username and clear password.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// Port for user lookups.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Find a user by primary key.
    async fn find_by_id(&self, id: &str) -> Result<Option<Principal>>;

    /// Find a user whose password matches.
    async fn find_by_credentials(
        &self,
        credentials: &Credentials,
    ) -> Result<Option<Principal>>;
}

/// Port for the principal authenticated by the host application.
#[async_trait]
pub trait AuthBridge: Send + Sync {
    async fn current_principal(&self) -> Option<Principal>;
}

#[derive(Debug, Clone)]
struct Account {
    principal: Principal,
    /// Argon2 PHC string.
    password: String,
}

/// User directory kept in memory.
pub struct MemoryDirectory {
    accounts: RwLock<HashMap<String, Account>>,
    passwords: PasswordManager,
}

impl MemoryDirectory {
    /// Create an empty [`MemoryDirectory`].
    pub fn new(passwords: PasswordManager) -> Self {
        Self {
            accounts: RwLock::new(HashMap::new()),
            passwords,
        }
    }

    /// Create a [`MemoryDirectory`] holding configured users. Passwords
    /// must already be hashed.
    pub fn from_users(users: &[User], passwords: PasswordManager) -> Self {
        let accounts = users
            .iter()
            .map(|user| {
                let account = Account {
                    principal: Principal {
                        id: user.id.clone(),
                        username: user.username.clone(),
                        claims: user.claims.clone(),
                    },
                    password: user.password.clone(),
                };
                (user.id.clone(), account)
            })
            .collect();

        Self {
            accounts: RwLock::new(accounts),
            passwords,
        }
    }

    /// Add a user, hashing its clear `password`.
    pub async fn insert(&self, principal: Principal, password: &str) -> Result<()> {
        let password = self.passwords.hash_password(password)?;
        self.accounts.write().await.insert(
            principal.id.clone(),
            Account {
                principal,
                password,
            },
        );

        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.accounts.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.accounts.read().await.is_empty()
    }
}

#[async_trait]
impl UserDirectory for MemoryDirectory {
    async fn find_by_id(&self, id: &str) -> Result<Option<Principal>> {
        Ok(self
            .accounts
            .read()
            .await
            .get(id)
            .map(|account| account.principal.clone()))
    }

    async fn find_by_credentials(
        &self,
        credentials: &Credentials,
    ) -> Result<Option<Principal>> {
        let account = self
            .accounts
            .read()
            .await
            .values()
            .find(|account| account.principal.username == credentials.username)
            .cloned();

        Ok(account
            .filter(|account| {
                self.passwords
                    .verify_password(&credentials.password, &account.password)
            })
            .map(|account| account.principal))
    }
}

/// Bridge over a session the host signs users in and out of.
#[derive(Debug, Default, Clone)]
pub struct SessionBridge {
    current: Arc<RwLock<Option<Principal>>>,
}

impl SessionBridge {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sign_in(&self, principal: Principal) {
        *self.current.write().await = Some(principal);
    }

    pub async fn sign_out(&self) {
        *self.current.write().await = None;
    }
}

#[async_trait]
impl AuthBridge for SessionBridge {
    async fn current_principal(&self) -> Option<Principal> {
        self.current.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Argon2;

    fn passwords() -> PasswordManager {
        PasswordManager::new(Some(Argon2 {
            memory_cost: 1024,
            iterations: 1,
            parallelism: 1,
            hash_length: 32,
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_find_by_credentials() {
        let directory = MemoryDirectory::new(passwords());
        directory
            .insert(Principal::new("42", "alice").with_claim("role", "admin"), "hunter2")
            .await
            .unwrap();

        let found = directory
            .find_by_credentials(&Credentials::new("alice", "hunter2"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, "42");
        assert_eq!(found.claims.get("role"), Some(&ClaimValue::from("admin")));

        assert!(
            directory
                .find_by_credentials(&Credentials::new("alice", "wrong"))
                .await
                .unwrap()
                .is_none()
        );
        assert!(
            directory
                .find_by_credentials(&Credentials::new("bob", "hunter2"))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_from_users() {
        let passwords = passwords();
        let users = vec![User {
            id: "7".into(),
            username: "carol".into(),
            password: passwords.hash_password("secret").unwrap(),
            claims: IndexMap::new(),
        }];
        let directory = MemoryDirectory::from_users(&users, passwords);

        assert_eq!(directory.len().await, 1);
        assert_eq!(
            directory.find_by_id("7").await.unwrap().map(|p| p.username),
            Some("carol".to_owned())
        );
        assert!(directory.find_by_id("8").await.unwrap().is_none());
        assert!(
            directory
                .find_by_credentials(&Credentials::new("carol", "secret"))
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn test_session_bridge() {
        let bridge = SessionBridge::new();
        assert!(bridge.current_principal().await.is_none());

        bridge.sign_in(Principal::new("42", "alice")).await;
        assert_eq!(
            bridge.current_principal().await.map(|p| p.id),
            Some("42".to_owned())
        );

        bridge.sign_out().await;
        assert!(bridge.current_principal().await.is_none());
    }

    #[test]
    fn test_credentials_debug_hides_password() {
        let credentials = Credentials::new("alice", "hunter2");
        assert!(!format!("{credentials:?}").contains("hunter2"));
    }
}
