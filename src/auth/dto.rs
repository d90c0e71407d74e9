use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::repo_types::User;

/// JSON envelope shared by every response.
#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub error: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> Envelope<T> {
    pub fn success(message: impl Into<String>, data: Option<T>) -> Self {
        Self {
            error: false,
            message: message.into(),
            token: None,
            data,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            error: true,
            message: message.into(),
            token: None,
            data: None,
        }
    }

    pub fn with_token(mut self, token: String) -> Self {
        self.token = Some(token);
        self
    }
}

/// Request body for signup. Missing fields deserialize as empty and fail validation.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SignupRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ResetPasswordRequest {
    pub password: String,
}

/// Public part of the user returned to the client.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PublicUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
}

impl From<&User> for PublicUser {
    fn from(u: &User) -> Self {
        Self {
            id: u.id,
            name: u.name.clone(),
            email: u.email.clone(),
        }
    }
}

/// Signup result. The verification token is echoed for development visibility.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupData {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub is_verified: bool,
    pub verification_token: String,
}
