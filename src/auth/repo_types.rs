use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// User record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,                       // assigned by the store
    pub name: String,                   // display name
    pub email: String,                  // lower-cased, unique
    #[serde(skip_serializing)]
    pub password_hash: String,          // Argon2 hash, not exposed in JSON
    #[serde(skip_serializing)]
    pub verification_token: Option<String>, // set until the email is verified
    pub is_verified: bool,
    #[serde(skip_serializing)]
    pub reset_token_hash: Option<String>,   // SHA-256 of the emailed reset token
    #[serde(skip_serializing)]
    pub reset_token_expires_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Attributes for a user that does not exist yet.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub verification_token: String,
}
