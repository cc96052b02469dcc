//! Mail transports: SMTP delivery and the local sink file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Local;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use super::OutgoingMessage;
use crate::config::MailConfig;

/// Width of the delimiter lines around each sink block.
const SINK_RULE_WIDTH: usize = 80;

/// Something that can deliver a message to a remote mailbox.
#[async_trait]
pub trait MailTransport: Send + Sync {
    /// Deliver the message. The error string is only used for logging.
    async fn send(&self, message: &OutgoingMessage) -> Result<(), String>;
}

/// SMTP transport built on `lettre`.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    /// Build the transport from configuration.
    pub fn new(config: &MailConfig) -> crate::Result<Self> {
        let from: Mailbox = config
            .from
            .parse()
            .map_err(|e| crate::RegistrarError::Config(format!("invalid mail.from: {e}")))?;

        let builder = if config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                .map_err(|e| crate::RegistrarError::Config(format!("invalid mail.host: {e}")))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
        };

        let mut builder = builder
            .port(config.port)
            .timeout(Some(Duration::from_secs(config.timeout_secs)));

        if !config.username.is_empty() && !config.password.is_empty() {
            builder = builder.credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ));
        }

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

#[async_trait]
impl MailTransport for SmtpMailer {
    async fn send(&self, message: &OutgoingMessage) -> Result<(), String> {
        let to: Mailbox = message
            .to
            .parse()
            .map_err(|e| format!("invalid recipient {}: {e}", message.to))?;

        let email = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(message.subject.clone())
            .header(ContentType::TEXT_PLAIN)
            .body(message.body.clone())
            .map_err(|e| e.to_string())?;

        self.transport
            .send(email)
            .await
            .map(|_| ())
            .map_err(|e| e.to_string())
    }
}

/// Append-only local file that receives messages SMTP did not deliver.
pub struct FileSink {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileSink {
    /// Create a sink writing to `path`. The file is created on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Path of the sink file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one delimited block.
    pub async fn write(&self, message: &OutgoingMessage) -> std::io::Result<()> {
        let _guard = self.lock.lock().await;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let rule = "=".repeat(SINK_RULE_WIDTH);
        let block = format!(
            "\n{rule}\nTimestamp: {}\nTo: {}\nSubject: {}\nBody:\n{}\n{rule}\n",
            Local::now().to_rfc3339(),
            message.to,
            message.subject,
            message.body
        );

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(block.as_bytes()).await?;
        file.flush().await
    }
}
