//! Best-effort outbound notifications.
//!
//! Messages go out over SMTP when it is enabled. Anything SMTP does not take,
//! and everything when SMTP is disabled, is appended to a local sink file so an
//! operator can still hand credentials over. Delivery problems are logged and
//! reported as a [`Delivery`] value; they never fail the caller.

mod message;
mod transport;

pub use message::OutgoingMessage;
pub use transport::{FileSink, MailTransport, SmtpMailer};

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::config::MailConfig;
use crate::db::RegistrationRequest;

/// What happened to a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Accepted by the SMTP server.
    Sent,
    /// Written to the local sink file.
    Sunk,
    /// Neither SMTP nor the sink took it.
    Failed,
    /// Still in flight when the caller stopped waiting. Delivery (or the sink
    /// fallback) finishes in the background.
    Queued,
}

/// Notification dispatcher.
///
/// Each message is delivered on its own task. The caller waits at most
/// `inline_wait` for the outcome, so a slow relay never holds up an admin
/// action.
pub struct Notifier {
    transport: Option<Arc<dyn MailTransport>>,
    sink: Arc<FileSink>,
    admin_email: Option<String>,
    inline_wait: Duration,
}

impl Notifier {
    /// Build the dispatcher from configuration.
    pub fn from_config(config: &MailConfig) -> crate::Result<Self> {
        let transport: Option<Arc<dyn MailTransport>> = if config.enabled {
            info!(host = %config.host, port = config.port, "SMTP delivery enabled");
            Some(Arc::new(SmtpMailer::new(config)?))
        } else {
            info!(sink = %config.sink_file, "SMTP disabled, notifications go to the sink file");
            None
        };

        let admin_email = Some(config.admin_email.trim())
            .filter(|e| !e.is_empty())
            .map(str::to_string);

        Ok(Self {
            transport,
            sink: Arc::new(FileSink::new(&config.sink_file)),
            admin_email,
            inline_wait: Duration::from_secs(config.inline_wait_secs),
        })
    }

    /// Dispatcher that only writes to the sink file.
    pub fn sink_only(sink: FileSink) -> Self {
        Self {
            transport: None,
            sink: Arc::new(sink),
            admin_email: None,
            inline_wait: Duration::from_secs(crate::config::DEFAULT_INLINE_WAIT_SECS),
        }
    }

    /// Use the given transport instead of the configured one.
    pub fn with_transport(mut self, transport: Arc<dyn MailTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Set the address that receives new-request alerts.
    pub fn with_admin_email(mut self, admin_email: impl Into<String>) -> Self {
        self.admin_email = Some(admin_email.into());
        self
    }

    /// Set how long callers wait for a delivery outcome.
    pub fn with_inline_wait(mut self, inline_wait: Duration) -> Self {
        self.inline_wait = inline_wait;
        self
    }

    /// The sink file.
    pub fn sink(&self) -> &FileSink {
        &self.sink
    }

    /// Deliver one message.
    ///
    /// Returns [`Delivery::Queued`] when the outcome is not known within the
    /// inline wait; the delivery task keeps running.
    pub async fn dispatch(&self, message: OutgoingMessage) -> Delivery {
        let transport = self.transport.clone();
        let sink = self.sink.clone();
        let handle =
            tokio::spawn(async move { deliver(transport.as_deref(), &sink, &message).await });

        match tokio::time::timeout(self.inline_wait, handle).await {
            Ok(Ok(delivery)) => delivery,
            Ok(Err(e)) => {
                error!(error = %e, "Delivery task failed");
                Delivery::Failed
            }
            Err(_) => {
                info!(
                    wait_ms = self.inline_wait.as_millis() as u64,
                    "Delivery still in progress, continuing in the background"
                );
                Delivery::Queued
            }
        }
    }

    /// Alert the administrator about a new request. Skipped when no admin
    /// address is configured.
    pub async fn notify_admin_new_request(&self, request: &RegistrationRequest) -> Option<Delivery> {
        let admin_email = self.admin_email.as_deref()?;
        Some(
            self.dispatch(OutgoingMessage::admin_alert(admin_email, request))
                .await,
        )
    }

    /// Send initial credentials to the requester.
    pub async fn notify_credentials(&self, request: &RegistrationRequest, password: &str) -> Delivery {
        self.dispatch(OutgoingMessage::credentials(request, password))
            .await
    }

    /// Tell the requester their request was rejected.
    pub async fn notify_rejection(&self, request: &RegistrationRequest, reason: &str) -> Delivery {
        self.dispatch(OutgoingMessage::rejection(request, reason))
            .await
    }
}

/// SMTP first, then the sink.
async fn deliver(
    transport: Option<&dyn MailTransport>,
    sink: &FileSink,
    message: &OutgoingMessage,
) -> Delivery {
    if let Some(transport) = transport {
        match transport.send(message).await {
            Ok(()) => {
                info!(to = %message.to, subject = %message.subject, "Mail sent");
                return Delivery::Sent;
            }
            Err(e) => {
                warn!(to = %message.to, error = %e, "SMTP delivery failed, falling back to sink");
            }
        }
    }

    match sink.write(message).await {
        Ok(()) => {
            info!(
                to = %message.to,
                subject = %message.subject,
                sink = %sink.path().display(),
                "Mail written to sink"
            );
            Delivery::Sunk
        }
        Err(e) => {
            error!(to = %message.to, error = %e, "Mail could not be delivered or sunk");
            Delivery::Failed
        }
    }
}
