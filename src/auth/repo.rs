use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::repo_types::{NewUser, User};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("email already registered")]
    DuplicateEmail,
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Persistence for users. Email uniqueness is enforced here, not by callers.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create(&self, user: NewUser) -> Result<User, StoreError>;
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;
    async fn find_by_verification_token(&self, token: &str) -> Result<Option<User>, StoreError>;
    /// Misses when the hash is unknown and when the stored pair has expired.
    async fn find_by_valid_reset_token_hash(
        &self,
        hash: &str,
        now: OffsetDateTime,
    ) -> Result<Option<User>, StoreError>;
    /// Verifies the account holding `token` and clears the token. Misses once it is used.
    async fn mark_verified(&self, token: &str) -> Result<Option<User>, StoreError>;
    /// Replaces the pending reset pair and touches no other column.
    async fn set_reset_token(
        &self,
        id: Uuid,
        hash: &str,
        expires_at: OffsetDateTime,
    ) -> Result<Option<User>, StoreError>;
    /// Swaps in `password_hash` and clears the reset pair, only while the pair is valid at `now`.
    async fn consume_reset_token(
        &self,
        hash: &str,
        now: OffsetDateTime,
        password_hash: &str,
    ) -> Result<Option<User>, StoreError>;
}

const USER_COLUMNS: &str = "id, name, email, password_hash, verification_token, is_verified, \
     reset_token_hash, reset_token_expires_at, created_at, updated_at";

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    async fn fetch_one_where(
        &self,
        predicate: &str,
        bind: &str,
    ) -> Result<Option<User>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {predicate}");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(bind)
            .fetch_optional(&self.db)
            .await
            .map_err(map_sqlx)?;
        Ok(user)
    }
}

fn map_sqlx(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            return StoreError::DuplicateEmail;
        }
    }
    StoreError::Backend(e.into())
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn create(&self, user: NewUser) -> Result<User, StoreError> {
        let sql = format!(
            r#"
            INSERT INTO users (name, email, password_hash, verification_token, is_verified)
            VALUES ($1, $2, $3, $4, FALSE)
            RETURNING {USER_COLUMNS}
            "#
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(&user.name)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(&user.verification_token)
            .fetch_one(&self.db)
            .await
            .map_err(map_sqlx)?;
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        self.fetch_one_where("lower(email) = lower($1)", email).await
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await
            .map_err(map_sqlx)?;
        Ok(user)
    }

    async fn find_by_verification_token(&self, token: &str) -> Result<Option<User>, StoreError> {
        self.fetch_one_where("verification_token = $1", token).await
    }

    async fn find_by_valid_reset_token_hash(
        &self,
        hash: &str,
        now: OffsetDateTime,
    ) -> Result<Option<User>, StoreError> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users \
             WHERE reset_token_hash = $1 AND reset_token_expires_at > $2"
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(hash)
            .bind(now)
            .fetch_optional(&self.db)
            .await
            .map_err(map_sqlx)?;
        Ok(user)
    }

    async fn mark_verified(&self, token: &str) -> Result<Option<User>, StoreError> {
        // is_verified only ever moves false -> true
        let sql = format!(
            r#"
            UPDATE users
               SET is_verified = TRUE,
                   verification_token = NULL,
                   updated_at = now()
             WHERE verification_token = $1
            RETURNING {USER_COLUMNS}
            "#
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(token)
            .fetch_optional(&self.db)
            .await
            .map_err(map_sqlx)?;
        Ok(user)
    }

    async fn set_reset_token(
        &self,
        id: Uuid,
        hash: &str,
        expires_at: OffsetDateTime,
    ) -> Result<Option<User>, StoreError> {
        let sql = format!(
            r#"
            UPDATE users
               SET reset_token_hash = $2,
                   reset_token_expires_at = $3,
                   updated_at = now()
             WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(hash)
            .bind(expires_at)
            .fetch_optional(&self.db)
            .await
            .map_err(map_sqlx)?;
        Ok(user)
    }

    async fn consume_reset_token(
        &self,
        hash: &str,
        now: OffsetDateTime,
        password_hash: &str,
    ) -> Result<Option<User>, StoreError> {
        // the predicate is re-checked on the locked row, so one token redeems once
        let sql = format!(
            r#"
            UPDATE users
               SET password_hash = $3,
                   reset_token_hash = NULL,
                   reset_token_expires_at = NULL,
                   updated_at = now()
             WHERE reset_token_hash = $1 AND reset_token_expires_at > $2
            RETURNING {USER_COLUMNS}
            "#
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(hash)
            .bind(now)
            .bind(password_hash)
            .fetch_optional(&self.db)
            .await
            .map_err(map_sqlx)?;
        Ok(user)
    }
}
