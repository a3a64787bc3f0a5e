use std::time::Duration;

use argon2::password_hash::{PasswordHash, SaltString};
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use chrono::Utc;
use rand::rngs::OsRng;
use tracing::{info, warn};

use crate::io::store::{Persistence, StoreError};
use crate::model::user::{PublicUser, User};

/// Error type for session operations
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("a user with email {0} already exists")]
    DuplicateEmail(String),
    #[error("not logged in (try `td login`)")]
    NotLoggedIn,
    #[error("{0} must not be empty")]
    InvalidInput(&'static str),
    #[error("could not hash password: {0}")]
    Hash(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The logged-in user and the operations that change it.
///
/// Created with [`Session::init`], which restores whatever session was
/// persisted last; [`Session::logout`] tears it down. Login and registration
/// wait `auth_delay` before touching the user collection.
pub struct Session {
    persistence: Persistence,
    auth_delay: Duration,
    hasher: Argon2<'static>,
    user: Option<PublicUser>,
}

impl Session {
    /// Restore the persisted session, if any
    pub fn init(persistence: Persistence, auth_delay: Duration) -> Self {
        let user = persistence.load_session();
        Session {
            persistence,
            auth_delay,
            hasher: Argon2::default(),
            user,
        }
    }

    /// Use a different argon2 configuration for new password hashes
    pub fn with_hasher(mut self, hasher: Argon2<'static>) -> Self {
        self.hasher = hasher;
        self
    }

    pub fn current(&self) -> Option<&PublicUser> {
        self.user.as_ref()
    }

    pub fn require_user(&self) -> Result<&PublicUser, AuthError> {
        self.user.as_ref().ok_or(AuthError::NotLoggedIn)
    }

    pub async fn login(&mut self, email: &str, password: &str) -> Result<PublicUser, AuthError> {
        tokio::time::sleep(self.auth_delay).await;

        let users = self.persistence.load_users();
        let found = users
            .iter()
            .find(|u| same_email(&u.email, email))
            .filter(|u| self.verify(u, password))
            .ok_or(AuthError::InvalidCredentials)?;

        let public = found.public();
        self.persistence.save_session(&public)?;
        info!(user_id = public.id, "logged in");
        self.user = Some(public.clone());
        Ok(public)
    }

    /// Create a user and log in as it
    pub async fn register(
        &mut self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<PublicUser, AuthError> {
        let name = name.trim();
        let email = email.trim();
        if name.is_empty() {
            return Err(AuthError::InvalidInput("name"));
        }
        if email.is_empty() {
            return Err(AuthError::InvalidInput("email"));
        }
        if password.is_empty() {
            return Err(AuthError::InvalidInput("password"));
        }

        tokio::time::sleep(self.auth_delay).await;

        let mut users = self.persistence.load_users();
        if users.iter().any(|u| same_email(&u.email, email)) {
            return Err(AuthError::DuplicateEmail(email.to_string()));
        }

        let salt = SaltString::generate(&mut OsRng);
        let password_hash = self
            .hasher
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| AuthError::Hash(e.to_string()))?
            .to_string();

        let last_id = users.iter().map(|u| u.id).max().unwrap_or(0);
        let user = User {
            id: Utc::now().timestamp_millis().max(last_id + 1),
            name: name.to_string(),
            email: email.to_string(),
            password_hash,
        };
        users.push(user.clone());
        self.persistence.save_users(&users)?;

        let public = user.public();
        self.persistence.save_session(&public)?;
        info!(user_id = public.id, "registered");
        self.user = Some(public.clone());
        Ok(public)
    }

    /// Forget the current user, in memory and on disk
    pub fn logout(&mut self) -> Result<(), AuthError> {
        self.persistence.clear_session()?;
        if let Some(user) = self.user.take() {
            info!(user_id = user.id, "logged out");
        }
        Ok(())
    }

    fn verify(&self, user: &User, password: &str) -> bool {
        match PasswordHash::new(&user.password_hash) {
            Ok(parsed) => self
                .hasher
                .verify_password(password.as_bytes(), &parsed)
                .is_ok(),
            Err(e) => {
                warn!(user_id = user.id, error = %e, "stored password hash is unreadable");
                false
            }
        }
    }
}

fn same_email(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}
