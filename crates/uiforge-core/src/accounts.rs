use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::RwLock;
use tokio::task;
use uuid::Uuid;

use uiforge_observability::redact_text;
use uiforge_types::{AuthResult, AuthenticatedUser};

pub const MIN_PASSWORD_LENGTH: usize = 8;

const USERS_FILE: &str = "users.json";

/// Credential checks and account creation. Domain failures come back as
/// `AuthResult::Failure`; `Err` is reserved for transport/storage problems.
#[async_trait]
pub trait AccountActions: Send + Sync {
    async fn sign_in(&self, email: &str, password: &str) -> anyhow::Result<AuthResult>;
    async fn sign_up(&self, email: &str, password: &str) -> anyhow::Result<AuthResult>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct UserRecord {
    id: String,
    email: String,
    password_hash: String,
    created_at: DateTime<Utc>,
}

impl UserRecord {
    fn to_user(&self) -> AuthenticatedUser {
        AuthenticatedUser {
            user_id: self.id.clone(),
            email: self.email.clone(),
        }
    }
}

/// File-backed accounts with Argon2 password hashes, keyed by normalized email.
pub struct LocalAccounts {
    base: PathBuf,
    users: RwLock<HashMap<String, UserRecord>>,
}

impl LocalAccounts {
    pub async fn new(base: impl AsRef<Path>) -> anyhow::Result<Self> {
        let base = base.as_ref().to_path_buf();
        fs::create_dir_all(&base).await?;
        let users_file = base.join(USERS_FILE);
        let users = if users_file.exists() {
            let raw = fs::read_to_string(&users_file).await?;
            serde_json::from_str::<HashMap<String, UserRecord>>(&raw)
                .with_context(|| format!("failed to parse {}", users_file.display()))?
        } else {
            HashMap::new()
        };
        Ok(Self {
            base,
            users: RwLock::new(users),
        })
    }

    pub async fn user_count(&self) -> usize {
        self.users.read().await.len()
    }

    async fn write_snapshot(&self, snapshot: &HashMap<String, UserRecord>) -> anyhow::Result<()> {
        let payload = serde_json::to_string_pretty(snapshot)?;
        fs::write(self.base.join(USERS_FILE), payload).await?;
        Ok(())
    }
}

#[async_trait]
impl AccountActions for LocalAccounts {
    async fn sign_in(&self, email: &str, password: &str) -> anyhow::Result<AuthResult> {
        let email = normalize_email(email);
        if let Some(rejection) = validate_credentials(&email, password) {
            return Ok(rejection);
        }
        let Some(record) = self.users.read().await.get(&email).cloned() else {
            tracing::info!("sign-in rejected for unknown account {}", redact_text(&email));
            return Ok(AuthResult::failure("Invalid credentials"));
        };
        let matches = verify_password(password.to_string(), record.password_hash.clone()).await?;
        if !matches {
            tracing::info!("sign-in rejected for {}", redact_text(&email));
            return Ok(AuthResult::failure("Invalid credentials"));
        }
        Ok(AuthResult::Success(record.to_user()))
    }

    async fn sign_up(&self, email: &str, password: &str) -> anyhow::Result<AuthResult> {
        let email = normalize_email(email);
        if let Some(rejection) = validate_credentials(&email, password) {
            return Ok(rejection);
        }
        if self.users.read().await.contains_key(&email) {
            return Ok(AuthResult::failure("Email already registered"));
        }
        let password_hash = hash_password(password.to_string()).await?;
        let record = UserRecord {
            id: Uuid::new_v4().to_string(),
            email: email.clone(),
            password_hash,
            created_at: Utc::now(),
        };
        let mut users = self.users.write().await;
        // Re-check under the write lock; hashing ran without it.
        if users.contains_key(&email) {
            return Ok(AuthResult::failure("Email already registered"));
        }
        // The account only exists in memory once it is on disk.
        let mut next = users.clone();
        next.insert(email, record.clone());
        self.write_snapshot(&next).await?;
        *users = next;
        drop(users);
        Ok(AuthResult::Success(record.to_user()))
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

fn validate_credentials(email: &str, password: &str) -> Option<AuthResult> {
    if email.is_empty() || password.is_empty() {
        return Some(AuthResult::failure("Email and password are required"));
    }
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Some(AuthResult::failure(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        )));
    }
    None
}

async fn hash_password(password: String) -> anyhow::Result<String> {
    task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| anyhow!("failed to hash password: {}", e))
    })
    .await
    .map_err(|err| anyhow!("password hash task join error: {}", err))?
}

async fn verify_password(password: String, stored: String) -> anyhow::Result<bool> {
    task::spawn_blocking(move || {
        let parsed =
            PasswordHash::new(&stored).map_err(|e| anyhow!("corrupt password hash: {}", e))?;
        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok())
    })
    .await
    .map_err(|err| anyhow!("password verify task join error: {}", err))?
}
