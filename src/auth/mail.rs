use std::{sync::Arc, time::Duration};

use anyhow::Context;
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox}, transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tracing::{info, warn};

use crate::{auth::repo_types::User, config::MailConfig};

/// Outbound mail transport.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, html: &str) -> anyhow::Result<()>;
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
}

impl SmtpMailer {
    pub fn from_config(cfg: &MailConfig) -> anyhow::Result<Self> {
        let builder = if cfg.starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&cfg.smtp_host)
                .context("smtp relay")?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&cfg.smtp_host)
        };
        let mut builder = builder
            .port(cfg.smtp_port)
            .timeout(Some(Duration::from_secs(cfg.timeout_secs)));
        if let (Some(user), Some(pass)) = (&cfg.smtp_username, &cfg.smtp_password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }
        Ok(Self {
            transport: builder.build(),
            from: cfg.from.clone(),
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, to: &str, subject: &str, html: &str) -> anyhow::Result<()> {
        let email = Message::builder()
            .from(self.from.parse::<Mailbox>().context("parse sender address")?)
            .to(to.parse::<Mailbox>().context("parse recipient address")?)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(html.to_string())?;
        self.transport.send(email).await.context("smtp send")?;
        Ok(())
    }
}

/// Builds the transactional emails and sends them with a bounded wait.
/// Delivery is best-effort: failures are returned for logging only.
#[derive(Clone)]
pub struct Notifier {
    mailer: Arc<dyn Mailer>,
    timeout: Duration,
}

impl Notifier {
    pub fn new(mailer: Arc<dyn Mailer>, timeout: Duration) -> Self {
        Self { mailer, timeout }
    }

    pub async fn send_verification_email(&self, user: &User, url: &str) -> anyhow::Result<()> {
        let subject = format!("Hello {}, verify your email", user.name);
        let html = format!(
            r#"<p>Hello <b>{name}</b>,</p>
<p>Click the button below to verify your email:</p>
<a href="{url}" style="display: inline-block; padding: 10px 20px; background-color: #afad4c; color: white; text-decoration: none; border-radius: 5px;">Verify Email</a>
<p>If the button doesn't work, copy and paste the following link into your browser:</p>
<code>{url}</code>"#,
            name = escape_html(&user.name),
            url = url,
        );
        self.deliver(&user.email, &subject, &html).await
    }

    pub async fn send_password_reset_email(
        &self,
        user: &User,
        url: &str,
        valid_minutes: i64,
    ) -> anyhow::Result<()> {
        let html = format!(
            r#"<p>Hello <b>{name}</b>,</p>
<p>Click the button below to reset your password:</p>
<a href="{url}" style="display: inline-block; padding: 10px 20px; background-color: #333; color: white; text-decoration: none; border-radius: 5px;">Reset Password</a>
<p>{url}</p>
<p>This link will expire in {valid_minutes} minutes.</p>"#,
            name = escape_html(&user.name),
            url = url,
            valid_minutes = valid_minutes,
        );
        self.deliver(&user.email, "Reset Your Password", &html).await
    }

    async fn deliver(&self, to: &str, subject: &str, html: &str) -> anyhow::Result<()> {
        match tokio::time::timeout(self.timeout, self.mailer.send(to, subject, html)).await {
            Ok(Ok(())) => {
                info!(to = %to, subject = %subject, "email sent");
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(_) => {
                warn!(to = %to, timeout = ?self.timeout, "email send timed out");
                anyhow::bail!("mail relay timed out after {:?}", self.timeout)
            }
        }
    }
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
