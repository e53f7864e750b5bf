//! Authentication provider contract and a file-backed account registry.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::error::AuthError;

/// Shortest password `create_account` accepts.
pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignInMethod {
    Password,
    Federated,
}

/// The signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub uid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub method: SignInMethod,
    pub signed_in_at: DateTime<Utc>,
}

impl Session {
    pub fn new(uid: impl Into<String>, email: Option<String>, method: SignInMethod) -> Self {
        Session {
            uid: uid.into(),
            email,
            method,
            signed_in_at: Utc::now(),
        }
    }

    /// Email if there is one, otherwise the uid.
    pub fn display_name(&self) -> &str {
        self.email.as_deref().unwrap_or(&self.uid)
    }
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthError>;

    /// Exchange a token from a federated identity provider for a session.
    async fn sign_in_with_federated_token(&self, token: &str) -> Result<Session, AuthError>;

    async fn sign_out(&self) -> Result<(), AuthError>;

    async fn create_account(&self, email: &str, password: &str) -> Result<Session, AuthError>;

    /// The persisted session, if any.
    async fn current_session(&self) -> Option<Session>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Account {
    uid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    salt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    password_hash: Option<String>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct AccountsFile {
    #[serde(default)]
    accounts: Vec<Account>,
}

/// Accounts kept in `accounts.json`, the current session in `session.json`.
pub struct LocalAccounts {
    accounts_file: PathBuf,
    session_file: PathBuf,
    lock: Mutex<()>,
}

impl LocalAccounts {
    pub fn new(accounts_file: impl Into<PathBuf>, session_file: impl Into<PathBuf>) -> Self {
        LocalAccounts {
            accounts_file: accounts_file.into(),
            session_file: session_file.into(),
            lock: Mutex::new(()),
        }
    }

    fn with_accounts<T>(
        &self,
        op: impl FnOnce(&mut AccountsFile) -> Result<(T, bool), AuthError>,
    ) -> Result<T, AuthError> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| AuthError::Unavailable("account registry lock poisoned".into()))?;

        let mut file: AccountsFile = read_json(&self.accounts_file)?.unwrap_or_default();
        let (output, dirty) = op(&mut file)?;
        if dirty {
            write_json(&self.accounts_file, &file)?;
        }
        Ok(output)
    }

    fn start_session(&self, session: Session) -> Result<Session, AuthError> {
        write_json(&self.session_file, &session)?;
        info!(uid = %session.uid, "signed in");
        Ok(session)
    }
}

#[async_trait]
impl AuthProvider for LocalAccounts {
    #[instrument(skip(self, password))]
    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        let email = normalize_email(email);
        if email.is_empty() || password.is_empty() {
            return Err(AuthError::InvalidCredentials);
        }

        let uid = self.with_accounts(|file| {
            let account = file
                .accounts
                .iter()
                .find(|a| a.email.as_deref() == Some(email.as_str()))
                .ok_or(AuthError::InvalidCredentials)?;

            match (&account.salt, &account.password_hash) {
                (Some(salt), Some(hash)) if *hash == hash_password(salt, password) => {
                    Ok((account.uid.clone(), false))
                }
                _ => Err(AuthError::InvalidCredentials),
            }
        })?;

        self.start_session(Session::new(uid, Some(email), SignInMethod::Password))
    }

    #[instrument(skip(self, token))]
    async fn sign_in_with_federated_token(&self, token: &str) -> Result<Session, AuthError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError::Cancelled);
        }

        let uid = federated_uid(token);
        self.with_accounts(|file| {
            if file.accounts.iter().any(|a| a.uid == uid) {
                return Ok(((), false));
            }
            debug!(uid = %uid, "first federated sign-in, creating account");
            file.accounts.push(Account {
                uid: uid.clone(),
                email: None,
                salt: None,
                password_hash: None,
                created_at: Utc::now(),
            });
            Ok(((), true))
        })?;

        self.start_session(Session::new(uid, None, SignInMethod::Federated))
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        match fs::remove_file(&self.session_file) {
            Ok(()) => {
                info!("signed out");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AuthError::Unavailable(format!(
                "Failed to remove {}: {}",
                self.session_file.display(),
                e
            ))),
        }
    }

    #[instrument(skip(self, password))]
    async fn create_account(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        let email = normalize_email(email);
        if email.is_empty() || password.is_empty() {
            return Err(AuthError::InvalidCredentials);
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AuthError::WeakPassword {
                min: MIN_PASSWORD_LEN,
            });
        }

        let uid = self.with_accounts(|file| {
            if file
                .accounts
                .iter()
                .any(|a| a.email.as_deref() == Some(email.as_str()))
            {
                return Err(AuthError::EmailInUse(email.clone()));
            }

            let salt = new_salt();
            let account = Account {
                uid: Uuid::new_v4().to_string(),
                email: Some(email.clone()),
                password_hash: Some(hash_password(&salt, password)),
                salt: Some(salt),
                created_at: Utc::now(),
            };
            let uid = account.uid.clone();
            file.accounts.push(account);
            Ok((uid, true))
        })?;

        info!(uid = %uid, "account created");
        self.start_session(Session::new(uid, Some(email), SignInMethod::Password))
    }

    async fn current_session(&self) -> Option<Session> {
        read_json(&self.session_file).ok().flatten()
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn new_salt() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn hash_password(salt: &str, password: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    hasher.finalize().to_hex().to_string()
}

fn federated_uid(token: &str) -> String {
    let hash = blake3::hash(token.as_bytes()).to_hex();
    format!("federated-{}", &hash[..16])
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>, AuthError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)
        .map_err(|e| AuthError::Unavailable(format!("Failed to read {}: {}", path.display(), e)))?;
    serde_json::from_str(&content)
        .map(Some)
        .map_err(|e| AuthError::Unavailable(format!("Failed to parse {}: {}", path.display(), e)))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), AuthError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            AuthError::Unavailable(format!("Failed to create {}: {}", parent.display(), e))
        })?;
    }
    let content =
        serde_json::to_string_pretty(value).map_err(|e| AuthError::Unavailable(e.to_string()))?;
    fs::write(path, content)
        .map_err(|e| AuthError::Unavailable(format!("Failed to write {}: {}", path.display(), e)))
}
