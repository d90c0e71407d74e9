use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_days: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub starttls: bool,
    pub from: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt: JwtConfig,
    pub mail: MailConfig,
    pub public_base_url: String,
    pub host: String,
    pub port: u16,
    /// Turns on the `Secure` cookie attribute.
    pub production: bool,
    pub reset_ttl_minutes: i64,
}

const MAX_SESSION_TTL_DAYS: i64 = 365;
const MAX_RESET_TTL_MINUTES: i64 = 24 * 60;

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is not set")?;
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET").context("JWT_SECRET is not set")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "account-service".into()),
            audience: std::env::var("JWT_AUDIENCE")
                .unwrap_or_else(|_| "account-service-users".into()),
            ttl_days: env_or("SESSION_TTL_DAYS", 7),
        };

        let smtp_username = std::env::var("SMTP_USERNAME").ok().filter(|v| !v.is_empty());
        let smtp_password = std::env::var("SMTP_PASSWORD").ok().filter(|v| !v.is_empty());
        if smtp_username.is_some() != smtp_password.is_some() {
            anyhow::bail!("SMTP_USERNAME and SMTP_PASSWORD must be set together");
        }
        let mail = MailConfig {
            smtp_host: std::env::var("SMTP_HOST").context("SMTP_HOST is not set")?,
            smtp_port: env_or("SMTP_PORT", 587),
            smtp_username,
            smtp_password,
            starttls: env_or("SMTP_STARTTLS", true),
            from: std::env::var("MAIL_FROM").context("MAIL_FROM is not set")?,
            timeout_secs: env_or("MAIL_TIMEOUT_SECS", 10),
        };

        let host = std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port = env_or("APP_PORT", 8080u16);
        let public_base_url = std::env::var("PUBLIC_BASE_URL")
            .unwrap_or_else(|_| format!("http://localhost:{}", port))
            .trim_end_matches('/')
            .to_string();
        let production = std::env::var("APP_ENV")
            .map(|v| v.eq_ignore_ascii_case("production"))
            .unwrap_or(false);

        let config = Self {
            database_url,
            jwt,
            mail,
            public_base_url,
            host,
            port,
            production,
            reset_ttl_minutes: env_or("RESET_TOKEN_TTL_MINUTES", 15),
        };
        config.validate()?;
        Ok(config)
    }

    /// Rejects token lifetimes that are already expired or too long to represent.
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(1..=MAX_SESSION_TTL_DAYS).contains(&self.jwt.ttl_days) {
            anyhow::bail!(
                "SESSION_TTL_DAYS must be between 1 and {MAX_SESSION_TTL_DAYS}, got {}",
                self.jwt.ttl_days
            );
        }
        if !(1..=MAX_RESET_TTL_MINUTES).contains(&self.reset_ttl_minutes) {
            anyhow::bail!(
                "RESET_TOKEN_TTL_MINUTES must be between 1 and {MAX_RESET_TTL_MINUTES}, got {}",
                self.reset_ttl_minutes
            );
        }
        Ok(())
    }
}
