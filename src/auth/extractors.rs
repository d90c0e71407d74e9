use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use tracing::warn;

use crate::{
    auth::{dto::PublicUser, jwt::JwtKeys, repo::UserStore},
    error::AccountError,
    state::AppState,
};

pub const SESSION_COOKIE: &str = "token";

/// Finds `name` in a `Cookie` request header value.
pub(crate) fn cookie_value<'a>(cookie_header: &'a str, name: &str) -> Option<&'a str> {
    cookie_header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v.trim().trim_matches('"'))
        .filter(|v| !v.is_empty())
}

/// Resolves the session cookie to a live user or rejects as unauthenticated.
pub async fn authenticate(
    parts: &Parts,
    keys: &JwtKeys,
    users: &dyn UserStore,
) -> Result<PublicUser, AccountError> {
    let token = parts
        .headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(|h| cookie_value(h, SESSION_COOKIE))
        .ok_or(AccountError::Unauthenticated("Unauthorized: No token provided."))?;

    let user_id = keys.verify_session(token).map_err(|e| {
        warn!(error = %e, "session token rejected");
        AccountError::Unauthenticated("Invalid or expired token.")
    })?;

    match users.find_by_id(user_id).await? {
        Some(user) => Ok(PublicUser::from(&user)),
        None => {
            warn!(user_id = %user_id, "session for missing user");
            Err(AccountError::Unauthenticated("Invalid or expired token."))
        }
    }
}

/// The user behind a valid session cookie.
pub struct AuthUser(pub PublicUser);

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AccountError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let accounts = &state.accounts;
        let user = authenticate(parts, accounts.keys(), accounts.users().as_ref()).await?;
        Ok(AuthUser(user))
    }
}
