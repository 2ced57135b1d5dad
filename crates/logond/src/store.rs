// AccountStore - read-only adapter over the auth database
//
// The login path and the realm reloader are the only callers. Every query
// binds its parameters; account names are uppercase-normalized before the
// lookup so the comparison is case-insensitive ASCII regardless of the
// backend's collation.

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::any::AnyRow;
use thiserror::Error;

use logon_shared::database::{Database, FieldExt};

use crate::realm_list::BuildInfo;

/// Failure talking to the backing store. Distinct from a lookup that
/// simply finds nothing, which is `Ok(None)` / an empty collection.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for StorageError {
    fn from(e: sqlx::Error) -> Self {
        StorageError::Unavailable(e.to_string())
    }
}

impl From<anyhow::Error> for StorageError {
    fn from(e: anyhow::Error) -> Self {
        StorageError::Unavailable(e.to_string())
    }
}

/// One account row, immutable within a login attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: u32,
    pub username: String,
    pub salt: [u8; 32],
    pub verifier: [u8; 32],
}

/// One realm row as stored, addresses unresolved.
#[derive(Debug, Clone, PartialEq)]
pub struct RealmRow {
    pub id: u32,
    pub name: String,
    pub address: String,
    pub local_address: String,
    pub local_subnet_mask: String,
    pub port: u16,
    pub realm_type: u8,
    pub flags: u8,
    pub category: u8,
    pub population: f32,
    pub build: u32,
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn find_account(&self, username: &str) -> Result<Option<Account>, StorageError>;

    /// All supported client builds.
    async fn list_builds(&self) -> Result<Vec<BuildInfo>, StorageError>;

    /// All realm rows except those flagged offline + invalid.
    async fn list_realms(&self) -> Result<Vec<RealmRow>, StorageError>;

    /// Character counts per realm for one account.
    async fn characters_per_realm(
        &self,
        account_id: u32,
    ) -> Result<HashMap<u32, u8>, StorageError>;
}

pub struct SqlAccountStore {
    db: Database,
}

impl SqlAccountStore {
    pub fn new(db: Database) -> Self {
        SqlAccountStore { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }
}

#[async_trait]
impl AccountStore for SqlAccountStore {
    async fn find_account(&self, username: &str) -> Result<Option<Account>, StorageError> {
        let row: Option<AnyRow> =
            sqlx::query("SELECT id, username, salt, verifier FROM account WHERE username = ?")
                .bind(username.to_ascii_uppercase())
                .fetch_optional(self.db.pool()?)
                .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let salt: [u8; 32] = match row.get_bytes(2).try_into() {
            Ok(salt) => salt,
            Err(_) => {
                tracing::error!("Account '{}' has a malformed salt column", username);
                return Ok(None);
            }
        };
        let verifier: [u8; 32] = match row.get_bytes(3).try_into() {
            Ok(verifier) => verifier,
            Err(_) => {
                tracing::error!("Account '{}' has a malformed verifier column", username);
                return Ok(None);
            }
        };

        Ok(Some(Account {
            id: row.get_u32(0),
            username: row.get_string(1),
            salt,
            verifier,
        }))
    }

    async fn list_builds(&self) -> Result<Vec<BuildInfo>, StorageError> {
        let rows = sqlx::query("SELECT build, major, minor, revision FROM build_information")
            .fetch_all(self.db.pool()?)
            .await?;

        Ok(rows
            .iter()
            .map(|row| BuildInfo {
                build: row.get_u32(0),
                major: row.get_u32(1),
                minor: row.get_u32(2),
                revision: row.get_u32(3),
            })
            .collect())
    }

    async fn list_realms(&self) -> Result<Vec<RealmRow>, StorageError> {
        let rows = sqlx::query(
            "SELECT id, name, address, local_address, local_subnet_mask, \
             port, type, flags, category, population, build \
             FROM realmlist WHERE flags <> 3",
        )
        .fetch_all(self.db.pool()?)
        .await?;

        Ok(rows
            .iter()
            .map(|row| RealmRow {
                id: row.get_u32(0),
                name: row.get_string(1),
                address: row.get_string(2),
                local_address: row.get_string(3),
                local_subnet_mask: row.get_string(4),
                port: row.get_u16(5),
                realm_type: row.get_u8(6),
                flags: row.get_u8(7),
                category: row.get_u8(8),
                population: row.get_f32(9),
                build: row.get_u32(10),
            })
            .collect())
    }

    async fn characters_per_realm(
        &self,
        account_id: u32,
    ) -> Result<HashMap<u32, u8>, StorageError> {
        let rows = sqlx::query(
            "SELECT realm_id, `count` FROM characters WHERE account_id = ?",
        )
        .bind(account_id as i64)
        .fetch_all(self.db.pool()?)
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let count = row.get_u16(1).min(u8::MAX as u16) as u8;
                (row.get_u32(0), count)
            })
            .collect())
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use parking_lot::RwLock;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// In-memory store for driving the state machine and catalog without
    /// a database. `set_unavailable` simulates a backend outage.
    #[derive(Default)]
    pub struct MemoryStore {
        accounts: RwLock<Vec<Account>>,
        builds: RwLock<Vec<BuildInfo>>,
        realms: RwLock<Vec<RealmRow>>,
        characters: RwLock<HashMap<u32, HashMap<u32, u8>>>,
        unavailable: AtomicBool,
    }

    impl MemoryStore {
        pub fn with_accounts(self, accounts: Vec<Account>) -> Self {
            *self.accounts.write() = accounts;
            self
        }

        pub fn with_builds(self, builds: Vec<BuildInfo>) -> Self {
            *self.builds.write() = builds;
            self
        }

        pub fn with_realms(self, realms: Vec<RealmRow>) -> Self {
            *self.realms.write() = realms;
            self
        }

        pub fn with_characters(self, account_id: u32, counts: HashMap<u32, u8>) -> Self {
            self.characters.write().insert(account_id, counts);
            self
        }

        pub fn set_realms(&self, realms: Vec<RealmRow>) {
            *self.realms.write() = realms;
        }

        pub fn set_unavailable(&self, unavailable: bool) {
            self.unavailable.store(unavailable, Ordering::SeqCst);
        }

        fn check_available(&self) -> Result<(), StorageError> {
            if self.unavailable.load(Ordering::SeqCst) {
                return Err(StorageError::Unavailable("simulated outage".to_string()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl AccountStore for MemoryStore {
        async fn find_account(&self, username: &str) -> Result<Option<Account>, StorageError> {
            self.check_available()?;
            Ok(self
                .accounts
                .read()
                .iter()
                .find(|a| a.username.eq_ignore_ascii_case(username))
                .cloned())
        }

        async fn list_builds(&self) -> Result<Vec<BuildInfo>, StorageError> {
            self.check_available()?;
            Ok(self.builds.read().clone())
        }

        async fn list_realms(&self) -> Result<Vec<RealmRow>, StorageError> {
            self.check_available()?;
            Ok(self
                .realms
                .read()
                .iter()
                .filter(|r| r.flags != 3)
                .cloned()
                .collect())
        }

        async fn characters_per_realm(
            &self,
            account_id: u32,
        ) -> Result<HashMap<u32, u8>, StorageError> {
            self.check_available()?;
            Ok(self
                .characters
                .read()
                .get(&account_id)
                .cloned()
                .unwrap_or_default())
        }
    }
}
