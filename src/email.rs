//! Outbound activation email dispatch
//!
//! Delivery is fire-and-forget relative to the issuing request: emails are
//! pushed onto a bounded channel and sent by a background worker, so the
//! activation workflow never awaits the transport.

use crate::auth::AuthError;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Buffered emails waiting for the background worker
const DISPATCH_BUFFER: usize = 64;

/// An activation email request handed to the mail transport
#[derive(Debug, Clone)]
pub struct ActivationEmail {
    pub to: String,
    pub recipient_name: String,
    pub activation_url: String,
    pub activation_code: String,
    pub subject: String,
}

/// Mail transport errors
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("mail relay request failed: {0}")]
    Relay(#[from] reqwest::Error),

    #[error("mail relay rejected the message: {0}")]
    Rejected(String),
}

/// Outbound email transport capability
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &ActivationEmail) -> Result<(), MailError>;
}

/// Development mailer that only logs the message
#[derive(Debug, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: &ActivationEmail) -> Result<(), MailError> {
        info!("Activation email for {} ({})", email.to, email.recipient_name);
        debug!(
            "Activation code {} (confirm at {})",
            email.activation_code, email.activation_url
        );
        Ok(())
    }
}

/// Mailer that posts messages to an HTTP mail relay
pub struct RelayMailer {
    client: reqwest::Client,
    endpoint: String,
}

impl RelayMailer {
    pub fn new(endpoint: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
        }
    }
}

#[async_trait]
impl Mailer for RelayMailer {
    async fn send(&self, email: &ActivationEmail) -> Result<(), MailError> {
        let payload = json!({
            "to": email.to,
            "recipient_name": email.recipient_name,
            "subject": email.subject,
            "template": "activate-account",
            "properties": {
                "confirmation_url": email.activation_url,
                "activation_code": email.activation_code,
            },
        });

        let response = self
            .client
            .post(&self.endpoint)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(MailError::Rejected(format!(
                "relay answered {}",
                response.status()
            )));
        }

        Ok(())
    }
}

/// Handle for enqueueing emails onto the background worker
#[derive(Clone)]
pub struct MailDispatcher {
    tx: mpsc::Sender<ActivationEmail>,
}

impl MailDispatcher {
    /// Spawn the delivery worker and return a dispatch handle
    pub fn spawn(mailer: Arc<dyn Mailer>) -> Self {
        let (tx, mut rx) = mpsc::channel::<ActivationEmail>(DISPATCH_BUFFER);

        tokio::spawn(async move {
            while let Some(email) = rx.recv().await {
                if let Err(e) = mailer.send(&email).await {
                    // Delivery failures are logged, not propagated; the
                    // activation code stays usable either way
                    warn!("Failed to deliver activation email to {}: {}", email.to, e);
                }
            }
        });

        Self { tx }
    }

    /// Enqueue an email without awaiting delivery
    ///
    /// Fails only when the queue is full or the worker is gone; callers
    /// report this but must not roll back already-persisted state.
    pub fn dispatch(&self, email: ActivationEmail) -> Result<(), AuthError> {
        self.tx.try_send(email).map_err(|e| {
            warn!("Failed to enqueue activation email: {}", e);
            AuthError::EmailDelivery
        })
    }
}

#[cfg(test)]
impl MailDispatcher {
    /// Dispatcher whose worker is gone; every dispatch fails
    pub(crate) fn disconnected() -> Self {
        let (tx, _) = mpsc::channel(1);
        Self { tx }
    }
}
