//! # mc-auth-simple
//!
//! Argon2-based implementation of `AuthProvider`.
//! Keeps an in-process account directory and a `Session` that answers
//! `IdentityProvider` for the signed-in user.

use std::collections::HashMap;
use std::sync::{Arc, RwLock as StdRwLock};

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;
use mc_core::{
    AppError, AuthProvider, Identity, IdentityProvider, ProfileUpdate, Result, Role, UserProfile,
};
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

const BAD_CREDENTIALS: &str = "invalid email or password";

struct Account {
    profile: UserProfile,
    password_hash: String,
}

/// Accounts keyed by user id.
#[derive(Default)]
pub struct SimpleAuthProvider {
    accounts: RwLock<HashMap<String, Account>>,
}

impl SimpleAuthProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the admin account unless it already exists.
    ///
    /// An existing non-admin account with the same email is a `Conflict`.
    pub async fn seed_admin(&self, name: &str, email: &str, password: &str) -> Result<UserProfile> {
        if let Some(existing) = self.find_by_email(email).await {
            return match existing.role {
                Role::Admin => Ok(existing),
                Role::User => Err(AppError::Conflict(format!(
                    "{email} is registered as a regular user"
                ))),
            };
        }
        let profile = self.create_account(name, email, password, Role::Admin).await?;
        info!(user_id = %profile.id, "admin account seeded");
        Ok(profile)
    }

    async fn find_by_email(&self, email: &str) -> Option<UserProfile> {
        let key = normalize_email(email);
        self.accounts
            .read()
            .await
            .values()
            .find(|a| normalize_email(&a.profile.email) == key)
            .map(|a| a.profile.clone())
    }

    async fn create_account(
        &self,
        name: &str,
        email: &str,
        password: &str,
        role: Role,
    ) -> Result<UserProfile> {
        require("name", name)?;
        require_email(email)?;
        require("password", password)?;

        let password_hash = hash_password(password.to_string()).await?;
        let key = normalize_email(email);

        let mut accounts = self.accounts.write().await;
        if accounts
            .values()
            .any(|a| normalize_email(&a.profile.email) == key)
        {
            return Err(AppError::Conflict(format!("{email} is already registered")));
        }

        let profile = UserProfile {
            id: Uuid::now_v7().to_string(),
            name: name.trim().to_string(),
            email: email.trim().to_string(),
            bio: None,
            role,
        };
        accounts.insert(
            profile.id.clone(),
            Account {
                profile: profile.clone(),
                password_hash,
            },
        );
        Ok(profile)
    }
}

#[async_trait]
impl AuthProvider for SimpleAuthProvider {
    async fn register(&self, name: &str, email: &str, password: &str) -> Result<UserProfile> {
        let profile = self.create_account(name, email, password, Role::User).await?;
        info!(user_id = %profile.id, "account registered");
        Ok(profile)
    }

    /// Verifies the password against the stored Argon2 hash.
    async fn authenticate(&self, email: &str, password: &str) -> Result<UserProfile> {
        let key = normalize_email(email);
        let (profile, password_hash) = {
            let accounts = self.accounts.read().await;
            let account = accounts
                .values()
                .find(|a| normalize_email(&a.profile.email) == key)
                .ok_or_else(|| AppError::Unauthorized(BAD_CREDENTIALS.into()))?;
            (account.profile.clone(), account.password_hash.clone())
        };

        if !verify_password(password.to_string(), password_hash).await? {
            debug!(user_id = %profile.id, "password mismatch");
            return Err(AppError::Unauthorized(BAD_CREDENTIALS.into()));
        }
        Ok(profile)
    }

    async fn profile(&self, user_id: &str) -> Result<UserProfile> {
        self.accounts
            .read()
            .await
            .get(user_id)
            .map(|a| a.profile.clone())
            .ok_or_else(|| AppError::not_found("User", user_id))
    }

    async fn update_profile(&self, user_id: &str, update: ProfileUpdate) -> Result<UserProfile> {
        require("name", &update.name)?;
        require_email(&update.email)?;

        let key = normalize_email(&update.email);
        let mut accounts = self.accounts.write().await;
        if accounts
            .iter()
            .any(|(id, a)| id != user_id && normalize_email(&a.profile.email) == key)
        {
            return Err(AppError::Conflict(format!(
                "{} is already registered",
                update.email
            )));
        }

        let account = accounts
            .get_mut(user_id)
            .ok_or_else(|| AppError::not_found("User", user_id))?;
        account.profile.name = update.name.trim().to_string();
        account.profile.email = update.email.trim().to_string();
        account.profile.bio = update.bio.filter(|b| !b.trim().is_empty());

        info!(user_id, "profile updated");
        Ok(account.profile.clone())
    }
}

/// The signed-in user of one client.
pub struct Session {
    auth: Arc<dyn AuthProvider>,
    current: StdRwLock<Option<Identity>>,
}

impl Session {
    pub fn new(auth: Arc<dyn AuthProvider>) -> Self {
        Self {
            auth,
            current: StdRwLock::new(None),
        }
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<Identity> {
        let identity = self.auth.authenticate(email, password).await?.identity();
        self.replace(Some(identity.clone()));
        Ok(identity)
    }

    /// Registers and signs in the new account.
    pub async fn register(&self, name: &str, email: &str, password: &str) -> Result<Identity> {
        let identity = self.auth.register(name, email, password).await?.identity();
        self.replace(Some(identity.clone()));
        Ok(identity)
    }

    pub fn logout(&self) {
        self.replace(None);
    }

    /// Edits the signed-in user's profile and refreshes the session's identity.
    pub async fn update_profile(&self, update: ProfileUpdate) -> Result<UserProfile> {
        let me = self
            .current_identity()
            .ok_or(AppError::AuthenticationRequired)?;
        let profile = self.auth.update_profile(&me.id, update).await?;
        self.replace(Some(profile.identity()));
        Ok(profile)
    }

    fn replace(&self, next: Option<Identity>) {
        let mut guard = match self.current.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = next;
    }
}

impl IdentityProvider for Session {
    fn current_identity(&self) -> Option<Identity> {
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(AppError::InvalidArgument(format!("{field} must not be empty")));
    }
    Ok(())
}

fn require_email(email: &str) -> Result<()> {
    require("email", email)?;
    if !email.contains('@') {
        return Err(AppError::InvalidArgument(format!("'{email}' is not an email address")));
    }
    Ok(())
}

/// Argon2 work runs on the blocking pool.
async fn hash_password(password: String) -> Result<String> {
    let hash = tokio::task::spawn_blocking(move || -> anyhow::Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| anyhow::anyhow!("hashing password: {e}"))?;
        Ok(hash.to_string())
    })
    .await
    .map_err(anyhow::Error::from)??;
    Ok(hash)
}

async fn verify_password(password: String, hash: String) -> Result<bool> {
    let matched = tokio::task::spawn_blocking(move || {
        let parsed_hash = match PasswordHash::new(&hash) {
            Ok(p) => p,
            Err(_) => return false,
        };
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok()
    })
    .await
    .map_err(anyhow::Error::from)?;
    Ok(matched)
}
