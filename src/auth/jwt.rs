use std::time::Duration;

use jsonwebtoken::{
    decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation,
};
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::debug;
use uuid::Uuid;

use super::claims::Claims;
use crate::config::JwtConfig;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("invalid session token")]
    Invalid,
    #[error("session token expired")]
    Expired,
}

/// Signing and verification keys for session tokens, built once from config.
#[derive(Clone)]
pub struct JwtKeys {
    pub encoding: EncodingKey,
    pub decoding: DecodingKey,
    pub issuer: String,
    pub audience: String,
    pub session_ttl: Duration,
}

impl From<&JwtConfig> for JwtKeys {
    fn from(cfg: &JwtConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
            session_ttl: Duration::from_secs(
                (cfg.ttl_days.max(0) as u64).saturating_mul(24 * 60 * 60),
            ),
        }
    }
}

impl JwtKeys {
    pub fn sign_session(&self, user_id: Uuid) -> anyhow::Result<String> {
        self.sign_session_at(user_id, OffsetDateTime::now_utc())
    }

    pub(crate) fn sign_session_at(
        &self,
        user_id: Uuid,
        issued_at: OffsetDateTime,
    ) -> anyhow::Result<String> {
        let exp = TimeDuration::try_from(self.session_ttl)
            .ok()
            .and_then(|ttl| issued_at.checked_add(ttl))
            .ok_or_else(|| anyhow::anyhow!("session ttl out of range"))?;
        let claims = Claims {
            sub: user_id,
            iat: issued_at.unix_timestamp().max(0) as usize,
            exp: exp.unix_timestamp().max(0) as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };
        let token = encode(&Header::default(), &claims, &self.encoding)?;
        debug!(user_id = %user_id, "session token signed");
        Ok(token)
    }

    pub fn verify_session(&self, token: &str) -> Result<Uuid, SessionError> {
        let mut validation = Validation::default();
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => SessionError::Expired,
                _ => SessionError::Invalid,
            }
        })?;
        debug!(user_id = %data.claims.sub, "session token verified");
        Ok(data.claims.sub)
    }
}
