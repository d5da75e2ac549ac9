//! User repository for database operations.
//!
//! Credential hashes live in `storefront.user_password` and are only read by
//! [`IdentityStore::credential_for_email`]; every other query selects from
//! `storefront.user` alone, so the projection handed to callers can never
//! carry the hash.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{FromRow, PgPool};

use sole_core::{Email, UserId};

use super::{IdentityStore, RepositoryError, conflict_on_unique};
use crate::models::User;
use crate::models::user::ProfileUpdate;

const USER_COLUMNS: &str =
    "u.id, u.email, u.name, u.first_name, u.last_name, u.dob, u.age, u.email_verified, u.created_at";

#[derive(Debug, FromRow)]
struct UserRow {
    id: i32,
    email: String,
    name: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
    dob: Option<NaiveDate>,
    age: Option<i32>,
    email_verified: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = RepositoryError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let email = Email::parse(&row.email).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid email in database: {e}"))
        })?;
        let age = row
            .age
            .map(u32::try_from)
            .transpose()
            .map_err(|_| RepositoryError::DataCorruption("negative age in database".to_owned()))?;

        Ok(Self {
            id: UserId::new(row.id),
            email,
            name: row.name,
            first_name: row.first_name,
            last_name: row.last_name,
            dob: row.dob,
            age,
            email_verified: row.email_verified,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct CredentialRow {
    #[sqlx(flatten)]
    user: UserRow,
    password_hash: String,
}

fn age_param(age: Option<u32>) -> Result<Option<i32>, RepositoryError> {
    age.map(i32::try_from)
        .transpose()
        .map_err(|_| RepositoryError::Conflict("age out of range".to_owned()))
}

/// `PostgreSQL`-backed [`IdentityStore`].
#[derive(Debug, Clone)]
pub struct PgIdentityStore {
    pool: PgPool,
}

impl PgIdentityStore {
    /// Create a new identity store.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdentityStore for PgIdentityStore {
    async fn find_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError> {
        let row: Option<UserRow> = sqlx::query_as(&format!(
            "SELECT {USER_COLUMNS} FROM storefront.user u WHERE u.email = $1"
        ))
        .bind(email.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(User::try_from).transpose()
    }

    async fn create_user(
        &self,
        email: &Email,
        credential_hash: &str,
        name: Option<&str>,
    ) -> Result<UserId, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let id: i32 = sqlx::query_scalar(
            "INSERT INTO storefront.user (email, name) VALUES ($1, $2) RETURNING id",
        )
        .bind(email.as_str())
        .bind(name)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| conflict_on_unique(e, "email"))?;

        sqlx::query("INSERT INTO storefront.user_password (user_id, password_hash) VALUES ($1, $2)")
            .bind(id)
            .bind(credential_hash)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(UserId::new(id))
    }

    async fn update_profile(
        &self,
        user_id: UserId,
        update: &ProfileUpdate,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE storefront.user
            SET first_name = $2, last_name = $3, dob = $4, age = $5, updated_at = NOW()
            WHERE id = $1
            ",
        )
        .bind(user_id)
        .bind(update.first_name.as_deref())
        .bind(update.last_name.as_deref())
        .bind(update.dob)
        .bind(age_param(update.age)?)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn patch_profile(
        &self,
        user_id: UserId,
        patch: &ProfileUpdate,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE storefront.user
            SET first_name = COALESCE($2, first_name),
                last_name  = COALESCE($3, last_name),
                dob        = COALESCE($4, dob),
                age        = COALESCE($5, age),
                updated_at = NOW()
            WHERE id = $1
            ",
        )
        .bind(user_id)
        .bind(patch.first_name.as_deref())
        .bind(patch.last_name.as_deref())
        .bind(patch.dob)
        .bind(age_param(patch.age)?)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn verify_email(&self, user_id: UserId, email: &Email) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE storefront.user
            SET email_verified = TRUE, updated_at = NOW()
            WHERE id = $1 AND email = $2
            ",
        )
        .bind(user_id)
        .bind(email.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn get_user(&self, user_id: UserId) -> Result<Option<User>, RepositoryError> {
        let row: Option<UserRow> = sqlx::query_as(&format!(
            "SELECT {USER_COLUMNS} FROM storefront.user u WHERE u.id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(User::try_from).transpose()
    }

    async fn credential_for_email(
        &self,
        email: &Email,
    ) -> Result<Option<(User, String)>, RepositoryError> {
        let row: Option<CredentialRow> = sqlx::query_as(&format!(
            r"
            SELECT {USER_COLUMNS}, p.password_hash
            FROM storefront.user u
            JOIN storefront.user_password p ON p.user_id = u.id
            WHERE u.email = $1
            "
        ))
        .bind(email.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| Ok((User::try_from(r.user)?, r.password_hash)))
            .transpose()
    }
}
