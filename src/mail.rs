use async_trait::async_trait;
use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::{
    config::AppConfig,
    error::{AppError, Result},
    models::ContactRequest,
};

// 1. MailService Contract
/// MailService
///
/// Outbound mail used by the contact form. The trait lets handlers send through
/// the real relay in production and through `MockMailService` in tests.
#[async_trait]
pub trait MailService: Send + Sync {
    /// Delivers one message. Failures are fatal for the request; nothing retries.
    async fn send(&self, message: OutboundMessage) -> Result<()>;
}

/// OutboundMessage
///
/// A plain-text mail as handed to the relay.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundMessage {
    pub to: String,
    pub reply_to: String,
    pub subject: String,
    pub text: String,
}

impl OutboundMessage {
    /// Builds the owner notification for a contact form submission.
    pub fn from_contact(form: &ContactRequest, recipient: &str) -> Self {
        let phone = form.phone.as_deref().unwrap_or("-");
        Self {
            to: recipient.to_string(),
            reply_to: form.email.clone(),
            subject: format!("New message from {}", form.name),
            text: format!(
                "Name: {}\nEmail: {}\nPhone: {}\nMessage: {}",
                form.name, form.email, phone, form.message
            ),
        }
    }
}

// 2. The Real Implementation (HTTP mail relay)
/// RelayMailClient
///
/// Posts messages as JSON to an HTTP mail relay, authenticating with the
/// configured API key. Each send is a single request bounded by a timeout.
#[derive(Clone)]
pub struct RelayMailClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl RelayMailClient {
    pub fn new(config: &AppConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AppError::Mail(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: config.mail_relay_url.clone(),
            api_key: config.mail_api_key.clone(),
        })
    }
}

#[async_trait]
impl MailService for RelayMailClient {
    async fn send(&self, message: OutboundMessage) -> Result<()> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&message)
            .send()
            .await
            .map_err(|e| AppError::Mail(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AppError::Mail(format!(
                "relay answered {}",
                response.status()
            )));
        }

        tracing::info!(to = %message.to, "contact message relayed");
        Ok(())
    }
}

// 3. The Mock Implementation (For Tests)
/// MockMailService
///
/// Records every message instead of sending it, or fails on demand.
#[derive(Clone, Default)]
pub struct MockMailService {
    /// When true, every send returns a simulated relay failure.
    pub should_fail: bool,
    sent: Arc<Mutex<Vec<OutboundMessage>>>,
}

impl MockMailService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    /// Messages accepted so far.
    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl MailService for MockMailService {
    async fn send(&self, message: OutboundMessage) -> Result<()> {
        if self.should_fail {
            return Err(AppError::Mail("Mock Mail Error: Simulation requested".to_string()));
        }
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message);
        Ok(())
    }
}

/// MailState
///
/// The concrete type used to share the mail service across the application state.
pub type MailState = Arc<dyn MailService>;
