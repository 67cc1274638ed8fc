//! Alert formatting and delivery.

use async_trait::async_trait;
use hackwatch_domain::config::NotifierConfig;
use hackwatch_domain::model::TransferEvent;
use reqwest::Client;
use serde::Serialize;
use tracing::info;

use crate::client::send_text;
use crate::worker::MonitorError;

const UPSTREAM: &str = "notifier";
pub const ALERT_SUBJECT: &str = "Suspicious Transaction Detected";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub subject: String,
    pub body: String,
}

pub fn format_alert(event: &TransferEvent) -> Alert {
    let body = format!(
        "Fund Destination: {}\n\
         Destination Address: {}\n\
         Source Address: {}\n\
         Token Amount: {}\n\
         Token Name: {}\n\
         Tx Hash: {}:{}#{}",
        event.destination_label,
        event.to_addresses.join(", "),
        event.from_address,
        event.amount,
        event.asset_symbol,
        event.chain,
        event.tx_hash,
        event.block_height,
    );
    Alert {
        subject: ALERT_SUBJECT.to_string(),
        body,
    }
}

#[async_trait]
pub trait AlertDispatcher: Send + Sync {
    async fn dispatch(&self, event: &TransferEvent) -> Result<(), MonitorError>;
}

/// Writes alerts to the log when no notifier credentials are configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDispatcher;

#[async_trait]
impl AlertDispatcher for LogDispatcher {
    async fn dispatch(&self, event: &TransferEvent) -> Result<(), MonitorError> {
        let alert = format_alert(event);
        info!(
            chain = %event.chain,
            tx_hash = %event.tx_hash,
            subject = %alert.subject,
            body = %alert.body,
            "alert"
        );
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct EmailAddress<'a> {
    email: &'a str,
}

#[derive(Debug, Serialize)]
struct EmailRequest<'a> {
    from: EmailAddress<'a>,
    to: [EmailAddress<'a>; 1],
    subject: &'a str,
    text: &'a str,
}

/// Email delivery through a MailerSend-style JSON API.
pub struct MailerSendDispatcher {
    client: Client,
    config: NotifierConfig,
    sender: String,
}

impl MailerSendDispatcher {
    pub fn new(client: Client, config: NotifierConfig) -> Self {
        let sender = format!("noreply@{}", config.sender_domain);
        Self {
            client,
            config,
            sender,
        }
    }
}

#[async_trait]
impl AlertDispatcher for MailerSendDispatcher {
    async fn dispatch(&self, event: &TransferEvent) -> Result<(), MonitorError> {
        let alert = format_alert(event);
        let payload = EmailRequest {
            from: EmailAddress {
                email: &self.sender,
            },
            to: [EmailAddress {
                email: &self.config.recipient,
            }],
            subject: &alert.subject,
            text: &alert.body,
        };
        let request = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(&self.config.api_key)
            .json(&payload);
        send_text(request, UPSTREAM).await?;
        Ok(())
    }
}
