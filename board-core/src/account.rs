//! Account collaborator: signup and login with hashed passwords.
//!
//! Accounts only exist to mint bearer tokens for the board API. Passwords
//! are stored as bcrypt hashes and never leave this module in clear text.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::current_timestamp_ms;
use crate::error::{CanvasError, CanvasResult};
use crate::identity::Identity;

/// bcrypt work factor for new password hashes.
pub const DEFAULT_HASH_COST: u32 = 12;

/// A registered account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Stable id; the principal that owns saved boards.
    pub id: String,
    /// Unique, user-chosen name.
    pub username: String,
    /// Unique login email.
    pub email: String,
    /// bcrypt hash of the password.
    pub password_hash: String,
    /// Creation time (Unix milliseconds).
    pub created_at: u64,
}

impl Account {
    /// The identity this account authenticates as.
    #[must_use]
    pub fn identity(&self) -> Identity {
        Identity {
            principal_id: self.id.clone(),
            display_name: self.username.clone(),
        }
    }
}

/// Storage for accounts.
pub trait AccountStore: Send + Sync {
    /// Register a new account.
    ///
    /// # Errors
    ///
    /// [`CanvasError::InvalidAccount`] if a field is blank,
    /// [`CanvasError::AccountExists`] if the username or email is taken.
    fn signup(&self, username: &str, email: &str, password: &str) -> CanvasResult<Account>;

    /// Check an email/password pair.
    ///
    /// # Errors
    ///
    /// [`CanvasError::InvalidCredential`] if the email is unknown or the
    /// password does not match.
    fn login(&self, email: &str, password: &str) -> CanvasResult<Account>;
}

#[derive(Debug, Clone, Default)]
struct AccountTable {
    accounts: Arc<RwLock<Vec<Account>>>,
}

impl AccountTable {
    fn read(&self) -> RwLockReadGuard<'_, Vec<Account>> {
        self.accounts
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Account>> {
        self.accounts
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Add an account once `persist` accepts the grown table.
    fn signup(
        &self,
        username: &str,
        email: &str,
        password: &str,
        cost: u32,
        persist: impl FnOnce(&[Account]) -> CanvasResult<()>,
    ) -> CanvasResult<Account> {
        let username = required("username", username)?;
        let email = required("email", email)?;
        if password.is_empty() {
            return Err(CanvasError::InvalidAccount("password is required".to_string()));
        }
        // Hash outside the lock.
        let password_hash = bcrypt::hash(password, cost)?;

        let mut accounts = self.write();
        if accounts
            .iter()
            .any(|a| a.username == username || a.email == email)
        {
            return Err(CanvasError::AccountExists);
        }
        let account = Account {
            id: Uuid::new_v4().to_string(),
            username,
            email,
            password_hash,
            created_at: current_timestamp_ms(),
        };
        let mut grown = accounts.clone();
        grown.push(account.clone());
        persist(&grown)?;
        *accounts = grown;
        tracing::info!(account_id = %account.id, "Account created");
        Ok(account)
    }

    fn login(&self, email: &str, password: &str) -> CanvasResult<Account> {
        let account = self
            .read()
            .iter()
            .find(|a| a.email == email.trim())
            .cloned()
            .ok_or(CanvasError::InvalidCredential)?;
        if bcrypt::verify(password, &account.password_hash)? {
            Ok(account)
        } else {
            Err(CanvasError::InvalidCredential)
        }
    }
}

fn required(field: &str, value: &str) -> CanvasResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(CanvasError::InvalidAccount(format!("{field} is required")));
    }
    Ok(value.to_string())
}

/// Account store that lives only as long as the process.
#[derive(Debug, Clone)]
pub struct MemoryAccountStore {
    table: AccountTable,
    cost: u32,
}

impl Default for MemoryAccountStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryAccountStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::with_cost(DEFAULT_HASH_COST)
    }

    /// Create an empty store hashing with the given bcrypt cost.
    #[must_use]
    pub fn with_cost(cost: u32) -> Self {
        Self {
            table: AccountTable::default(),
            cost,
        }
    }
}

impl AccountStore for MemoryAccountStore {
    fn signup(&self, username: &str, email: &str, password: &str) -> CanvasResult<Account> {
        self.table
            .signup(username, email, password, self.cost, |_| Ok(()))
    }

    fn login(&self, email: &str, password: &str) -> CanvasResult<Account> {
        self.table.login(email, password)
    }
}

/// Account store kept in a single JSON file.
///
/// The whole table is rewritten on each signup; a signup that cannot be
/// written is not registered.
#[derive(Debug, Clone)]
pub struct FileAccountStore {
    table: AccountTable,
    path: PathBuf,
    cost: u32,
}

impl FileAccountStore {
    /// Open (or start) the account file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::Io`] or [`CanvasError::Serialization`] if an
    /// existing file cannot be read or parsed.
    pub fn open(path: impl Into<PathBuf>) -> CanvasResult<Self> {
        let path = path.into();
        let table = AccountTable::default();
        if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            let accounts: Vec<Account> = serde_json::from_str(&contents)?;
            tracing::info!("Loaded {} accounts from {}", accounts.len(), path.display());
            *table.write() = accounts;
        }
        Ok(Self {
            table,
            path,
            cost: DEFAULT_HASH_COST,
        })
    }

    /// Override the bcrypt cost for new hashes.
    #[must_use]
    pub fn with_cost(mut self, cost: u32) -> Self {
        self.cost = cost;
        self
    }

    /// File the store writes to.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, accounts: &[Account]) -> CanvasResult<()> {
        let json = serde_json::to_string_pretty(accounts)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }
}

impl AccountStore for FileAccountStore {
    fn signup(&self, username: &str, email: &str, password: &str) -> CanvasResult<Account> {
        self.table
            .signup(username, email, password, self.cost, |accounts| {
                self.persist(accounts)
            })
    }

    fn login(&self, email: &str, password: &str) -> CanvasResult<Account> {
        self.table.login(email, password)
    }
}
