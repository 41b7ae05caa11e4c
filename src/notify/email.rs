use anyhow::{anyhow, Context, Result};
use lettre::message::{header, Mailbox, Message};
use lettre::transport::smtp::{authentication::Credentials, AsyncSmtpTransport};
use lettre::{AsyncTransport, Tokio1Executor};

use super::{Notifier, Recipients};
use crate::config::SmtpSettings;

pub struct EmailNotifier {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl EmailNotifier {
    pub fn new(cfg: &SmtpSettings) -> Result<Self> {
        let creds = Credentials::new(cfg.user.clone(), cfg.pass.clone());
        let mailer = AsyncSmtpTransport::<Tokio1Executor>::relay(&cfg.host)
            .with_context(|| format!("invalid smtp host {}", cfg.host))?
            .credentials(creds)
            .build();
        let from = cfg
            .from
            .parse()
            .with_context(|| format!("invalid smtp from address {}", cfg.from))?;
        Ok(Self { mailer, from })
    }
}

fn subject_of(text: &str) -> String {
    let first = text.lines().next().unwrap_or_default();
    let mut subject: String = first.chars().take(78).collect();
    if subject.is_empty() {
        subject.push_str("special-finder");
    }
    subject
}

#[async_trait::async_trait]
impl Notifier for EmailNotifier {
    fn name(&self) -> &'static str {
        "email"
    }

    async fn send(&self, text: &str, recipients: &Recipients) -> Result<()> {
        let mut failed = Vec::new();
        for (name, r) in recipients {
            let Some(addr) = r.email.as_deref() else {
                continue;
            };
            let to: Mailbox = match addr.parse() {
                Ok(m) => m,
                Err(e) => {
                    tracing::warn!(recipient = %name, error = %e, "invalid email address");
                    failed.push(name.as_str());
                    continue;
                }
            };
            let msg = Message::builder()
                .from(self.from.clone())
                .to(to)
                .subject(subject_of(text))
                .header(header::ContentType::TEXT_PLAIN)
                .body(text.to_string())
                .context("build email")?;
            if let Err(e) = self.mailer.send(msg).await {
                tracing::debug!(recipient = %name, error = %e, "email delivery failed");
                failed.push(name.as_str());
            }
        }
        if failed.is_empty() {
            Ok(())
        } else {
            Err(anyhow!("email delivery failed for {}", failed.join(", ")))
        }
    }
}
