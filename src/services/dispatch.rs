use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    models::{customer::DeliveryChannel, reminder::Reminder},
    services::{
        channels::{ChannelSenders, EmailMessage, SmsMessage, WhatsAppMessage},
        metrics::DELIVERIES_COUNTER,
        phone,
        recipients::Delivery,
    },
};

const NO_NOTES: &str = "No notes";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The channel has no configured sender.
    ChannelDisabled,
    /// The phone on file does not reduce to a 10-digit local number.
    InvalidPhone,
    /// The destination is the configured sender itself.
    SelfSend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Sent,
    Skipped(SkipReason),
    Failed,
}

impl DispatchOutcome {
    fn label(&self) -> &'static str {
        match self {
            DispatchOutcome::Sent => "sent",
            DispatchOutcome::Skipped(_) => "skipped",
            DispatchOutcome::Failed => "failed",
        }
    }
}

/// Tally of one fire event or manual delivery.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct FireSummary {
    pub sent: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl FireSummary {
    pub fn record(&mut self, outcome: DispatchOutcome) {
        match outcome {
            DispatchOutcome::Sent => self.sent += 1,
            DispatchOutcome::Skipped(_) => self.skipped += 1,
            DispatchOutcome::Failed => self.failed += 1,
        }
    }
}

/// Errors surfaced by a manual "send now".
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("Reminder {0} not found")]
    NotFound(Uuid),
    #[error("Reminder {0} has no recipient address for any preferred channel")]
    NoRecipients(Uuid),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

pub fn email_subject(title: &str) -> String {
    format!("Reminder: {title}")
}

pub fn email_text(notes: Option<&str>) -> String {
    notes.unwrap_or(NO_NOTES).to_string()
}

pub fn email_html(notes: Option<&str>) -> String {
    format!("<p>{}</p>", escape_html(notes.unwrap_or(NO_NOTES)))
}

pub fn sms_body(title: &str, kind: &str, notes: Option<&str>) -> String {
    let mut body = format!("Reminder: {title}\n Type: {kind}");
    if let Some(notes) = notes {
        body.push_str(&format!("\n Notes: {notes}"));
    }
    body
}

pub fn whatsapp_body(title: &str, notes: Option<&str>) -> String {
    match notes {
        Some(notes) => format!("Reminder: {title}\n Notes: {notes}"),
        None => format!("Reminder: {title}"),
    }
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Sends one delivery through the matching channel sender. Never fails:
/// every sender error is logged and reported as `DispatchOutcome::Failed`.
pub struct Dispatcher {
    senders: ChannelSenders,
}

impl Dispatcher {
    pub fn new(senders: ChannelSenders) -> Self {
        Self { senders }
    }

    pub async fn dispatch(&self, delivery: &Delivery, reminder: &Reminder) -> DispatchOutcome {
        let result = match delivery.channel {
            DeliveryChannel::Email => self.send_email(delivery, reminder).await,
            DeliveryChannel::Phone => self.send_sms(delivery, reminder).await,
            DeliveryChannel::Whatsapp => self.send_whatsapp(delivery, reminder).await,
        };

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(
                    "Reminder {}: {} to {} ({}) failed: {:#}",
                    reminder.id, delivery.channel, delivery.customer_name, delivery.customer_id, e
                );
                DispatchOutcome::Failed
            }
        };

        let channel = delivery.channel.to_string();
        DELIVERIES_COUNTER
            .with_label_values(&[channel.as_str(), outcome.label()])
            .inc();
        outcome
    }

    async fn send_email(
        &self,
        delivery: &Delivery,
        reminder: &Reminder,
    ) -> anyhow::Result<DispatchOutcome> {
        let Some(sender) = &self.senders.email else {
            return Ok(disabled(delivery));
        };
        let notes = reminder.notes_text();
        sender
            .send(EmailMessage {
                to: delivery.address.clone(),
                subject: email_subject(&reminder.title),
                text: email_text(notes),
                html: email_html(notes),
                image: reminder.image.clone(),
            })
            .await?;
        info!(
            "Reminder {}: email sent to {} ({})",
            reminder.id, delivery.customer_name, delivery.customer_id
        );
        Ok(DispatchOutcome::Sent)
    }

    async fn send_sms(
        &self,
        delivery: &Delivery,
        reminder: &Reminder,
    ) -> anyhow::Result<DispatchOutcome> {
        let Some(sender) = &self.senders.sms else {
            return Ok(disabled(delivery));
        };
        let Some(to) = phone::sms_address(&delivery.address) else {
            return Ok(invalid_phone(delivery));
        };
        if to == phone::canonical_sms_sender(sender.from_address()) {
            return Ok(self_send(delivery));
        }

        let sid = sender
            .send(SmsMessage {
                to,
                body: sms_body(&reminder.title, &reminder.kind, reminder.notes_text()),
            })
            .await?;
        info!(
            "Reminder {}: SMS sent to {} ({}): {}",
            reminder.id, delivery.customer_name, delivery.customer_id, sid
        );
        Ok(DispatchOutcome::Sent)
    }

    async fn send_whatsapp(
        &self,
        delivery: &Delivery,
        reminder: &Reminder,
    ) -> anyhow::Result<DispatchOutcome> {
        let Some(sender) = &self.senders.whatsapp else {
            return Ok(disabled(delivery));
        };
        let Some(to) = phone::whatsapp_address(&delivery.address) else {
            return Ok(invalid_phone(delivery));
        };
        if to == phone::canonical_whatsapp_sender(sender.from_address()) {
            return Ok(self_send(delivery));
        }

        let media = reminder
            .image
            .iter()
            .chain(reminder.video.iter())
            .cloned()
            .collect();
        let sid = sender
            .send(WhatsAppMessage {
                to,
                body: whatsapp_body(&reminder.title, reminder.notes_text()),
                media,
            })
            .await?;
        info!(
            "Reminder {}: WhatsApp sent to {} ({}): {}",
            reminder.id, delivery.customer_name, delivery.customer_id, sid
        );
        Ok(DispatchOutcome::Sent)
    }
}

fn disabled(delivery: &Delivery) -> DispatchOutcome {
    info!(
        "{} channel not configured, skipping customer {}",
        delivery.channel, delivery.customer_id
    );
    DispatchOutcome::Skipped(SkipReason::ChannelDisabled)
}

fn invalid_phone(delivery: &Delivery) -> DispatchOutcome {
    warn!(
        "Invalid phone number for customer {} ({}): {}",
        delivery.customer_id, delivery.channel, delivery.address
    );
    DispatchOutcome::Skipped(SkipReason::InvalidPhone)
}

fn self_send(delivery: &Delivery) -> DispatchOutcome {
    warn!(
        "Skipping {} to customer {}: sender and receiver can't be the same",
        delivery.channel, delivery.customer_id
    );
    DispatchOutcome::Skipped(SkipReason::SelfSend)
}
