//! Authentication service.
//!
//! Email and password accounts. Every method hands back the credential-free
//! [`User`] projection; the stored hash never leaves this module.

mod error;

pub use error::AuthError;

use std::sync::Arc;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use tracing::instrument;

use sole_core::{Email, UserId};

use crate::db::{IdentityStore, RepositoryError};
use crate::models::User;

/// Minimum password length.
const MIN_PASSWORD_LENGTH: usize = 8;

/// Authentication service.
#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn IdentityStore>,
}

impl AuthService {
    /// Create a new authentication service.
    #[must_use]
    pub fn new(users: Arc<dyn IdentityStore>) -> Self {
        Self { users }
    }

    /// Register a new user with email and password.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidEmail` if the email format is invalid.
    /// Returns `AuthError::WeakPassword` if the password doesn't meet requirements.
    /// Returns `AuthError::UserAlreadyExists` if the email is already registered.
    #[instrument(skip(self, password))]
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        name: Option<&str>,
    ) -> Result<User, AuthError> {
        let email = Email::parse(email)?;
        validate_password(password)?;

        let password_hash = hash_password(password)?;
        let name = name.map(str::trim).filter(|n| !n.is_empty());

        let user_id = self
            .users
            .create_user(&email, &password_hash, name)
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict(_) => AuthError::UserAlreadyExists,
                other => AuthError::Repository(other),
            })?;

        tracing::info!(user_id = %user_id, "User registered");
        self.get_user(user_id).await
    }

    /// Login with email and password.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` if the email/password is wrong.
    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let email = Email::parse(email).map_err(|_| AuthError::InvalidCredentials)?;

        let (user, password_hash) = self
            .users
            .credential_for_email(&email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        verify_password(password, &password_hash)?;

        Ok(user)
    }

    /// Get a user by ID.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::UserNotFound` if the user doesn't exist.
    pub async fn get_user(&self, user_id: UserId) -> Result<User, AuthError> {
        self.users
            .get_user(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)
    }

    /// Mark the account's email verified. The caller must repeat the
    /// account's own address.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::EmailMismatch` if `email` is not the account's address.
    #[instrument(skip(self, email))]
    pub async fn verify_email(&self, user_id: UserId, email: &str) -> Result<User, AuthError> {
        let email = Email::parse(email).map_err(|_| AuthError::EmailMismatch)?;

        self.users
            .verify_email(user_id, &email)
            .await
            .map_err(|e| match e {
                RepositoryError::NotFound => AuthError::EmailMismatch,
                other => AuthError::Repository(other),
            })?;

        self.get_user(user_id).await
    }
}

/// Validate password meets requirements.
fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.len() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::WeakPassword(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }

    Ok(())
}

/// Hash a password using Argon2id.
fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AuthError::PasswordHash)
}

/// Verify a password against a hash.
fn verify_password(password: &str, hash: &str) -> Result<(), AuthError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| AuthError::InvalidCredentials)?;
    let argon2 = Argon2::default();

    argon2
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| AuthError::InvalidCredentials)
}
