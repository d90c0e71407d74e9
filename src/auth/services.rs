use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;
use time::{Duration, OffsetDateTime};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    auth::{
        dto::{PublicUser, SignupData},
        jwt::JwtKeys,
        mail::Notifier,
        password::{hash_password_blocking, verify_password_blocking},
        repo::{StoreError, UserStore},
        repo_types::NewUser,
        tokens::{generate_opaque_token, hash_token},
    },
    error::AccountError,
};

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

impl From<StoreError> for AccountError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::DuplicateEmail => AccountError::DuplicateEmail,
            StoreError::Backend(e) => AccountError::Internal(e),
        }
    }
}

/// Builds the absolute links embedded in emails.
#[derive(Debug, Clone)]
pub struct Links {
    base_url: String,
}

impl Links {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn verification(&self, token: &str) -> String {
        format!("{}/api/v1/user/verify/{}", self.base_url, token)
    }

    pub fn password_reset(&self, token: &str) -> String {
        format!("{}/api/v1/user/reset/{}", self.base_url, token)
    }
}

/// Signup, verification, login, profile and password reset.
#[derive(Clone)]
pub struct AccountService {
    users: Arc<dyn UserStore>,
    keys: JwtKeys,
    notifier: Notifier,
    links: Links,
    reset_ttl: Duration,
}

impl AccountService {
    pub fn new(
        users: Arc<dyn UserStore>,
        keys: JwtKeys,
        notifier: Notifier,
        links: Links,
        reset_ttl: Duration,
    ) -> Self {
        Self {
            users,
            keys,
            notifier,
            links,
            reset_ttl,
        }
    }

    pub fn keys(&self) -> &JwtKeys {
        &self.keys
    }

    pub fn users(&self) -> &Arc<dyn UserStore> {
        &self.users
    }

    pub async fn signup(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<SignupData, AccountError> {
        let name = name.trim();
        let email = normalize_email(email);
        if name.is_empty() || email.is_empty() || password.is_empty() {
            return Err(AccountError::Validation(
                "Name, email, and password are required.",
            ));
        }
        if !is_valid_email(&email) {
            warn!(email = %email, "invalid email");
            return Err(AccountError::Validation("Invalid email address."));
        }

        if self.users.find_by_email(&email).await?.is_some() {
            warn!(email = %email, "email already registered");
            return Err(AccountError::DuplicateEmail);
        }

        let password_hash = hash_password_blocking(password.to_string()).await?;
        let verification_token = generate_opaque_token();

        // the unique index backstops a concurrent signup racing past the check above
        let user = self
            .users
            .create(NewUser {
                name: name.to_string(),
                email,
                password_hash,
                verification_token: verification_token.clone(),
            })
            .await?;
        info!(user_id = %user.id, email = %user.email, "user registered");

        let url = self.links.verification(&verification_token);
        if let Err(e) = self.notifier.send_verification_email(&user, &url).await {
            warn!(error = %e, user_id = %user.id, "verification email not sent");
        }

        Ok(SignupData {
            id: user.id,
            name: user.name,
            email: user.email,
            is_verified: user.is_verified,
            verification_token,
        })
    }

    pub async fn verify_email(&self, token: &str) -> Result<(), AccountError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AccountError::Validation("Token not found."));
        }
        if self.users.find_by_verification_token(token).await?.is_none() {
            return Err(AccountError::InvalidToken);
        }
        // a concurrent verification of the same token leaves nothing to update
        let user = self
            .users
            .mark_verified(token)
            .await?
            .ok_or(AccountError::InvalidToken)?;
        info!(user_id = %user.id, "email verified");
        Ok(())
    }

    /// Returns a session token for a verified account with matching credentials.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
    ) -> Result<(String, PublicUser), AccountError> {
        let email = normalize_email(email);
        if email.is_empty() || password.is_empty() {
            return Err(AccountError::Validation("Email and password are required."));
        }

        let user = match self.users.find_by_email(&email).await? {
            Some(u) => u,
            None => {
                warn!(email = %email, "login unknown email");
                return Err(AccountError::NotRegistered);
            }
        };

        let ok =
            verify_password_blocking(password.to_string(), user.password_hash.clone()).await?;
        if !ok {
            warn!(user_id = %user.id, "login invalid password");
            return Err(AccountError::InvalidCredentials);
        }

        // checked before signing so an unverified account never receives a session
        if !user.is_verified {
            warn!(user_id = %user.id, "login on unverified account");
            return Err(AccountError::Unverified);
        }

        let token = self.keys.sign_session(user.id)?;
        info!(user_id = %user.id, "user logged in");
        Ok((token, PublicUser::from(&user)))
    }

    pub async fn profile(&self, user_id: Uuid) -> Result<PublicUser, AccountError> {
        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(AccountError::NotFound)?;
        Ok(PublicUser::from(&user))
    }

    pub async fn forgot_password(&self, email: &str) -> Result<(), AccountError> {
        self.forgot_password_at(email, OffsetDateTime::now_utc()).await
    }

    pub(crate) async fn forgot_password_at(
        &self,
        email: &str,
        now: OffsetDateTime,
    ) -> Result<(), AccountError> {
        let email = normalize_email(email);
        if email.is_empty() {
            return Err(AccountError::Validation("Email is required."));
        }
        let user = self
            .users
            .find_by_email(&email)
            .await?
            .ok_or(AccountError::UnknownEmail)?;

        let raw = generate_opaque_token();
        let user = self
            .users
            .set_reset_token(user.id, &hash_token(&raw), now + self.reset_ttl)
            .await?
            .ok_or(AccountError::UnknownEmail)?;
        info!(user_id = %user.id, "password reset requested");

        let url = self.links.password_reset(&raw);
        if let Err(e) = self
            .notifier
            .send_password_reset_email(&user, &url, self.reset_ttl.whole_minutes())
            .await
        {
            warn!(error = %e, user_id = %user.id, "password reset email not sent");
        }
        Ok(())
    }

    pub async fn reset_password(
        &self,
        raw_token: &str,
        new_password: &str,
    ) -> Result<(), AccountError> {
        self.reset_password_at(raw_token, new_password, OffsetDateTime::now_utc())
            .await
    }

    pub(crate) async fn reset_password_at(
        &self,
        raw_token: &str,
        new_password: &str,
        now: OffsetDateTime,
    ) -> Result<(), AccountError> {
        let raw_token = raw_token.trim();
        if raw_token.is_empty() || new_password.is_empty() {
            return Err(AccountError::Validation("Token and password are required."));
        }

        let token_hash = hash_token(raw_token);
        if self
            .users
            .find_by_valid_reset_token_hash(&token_hash, now)
            .await?
            .is_none()
        {
            return Err(AccountError::InvalidOrExpiredToken);
        }

        let password_hash = hash_password_blocking(new_password.to_string()).await?;
        let user = self
            .users
            .consume_reset_token(&token_hash, now, &password_hash)
            .await?
            .ok_or(AccountError::InvalidOrExpiredToken)?;
        info!(user_id = %user.id, "password reset");
        Ok(())
    }
}
