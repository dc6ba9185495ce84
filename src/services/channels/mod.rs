pub mod email;
pub mod media_host;
pub mod twilio;

use std::sync::Arc;

use tracing::info;

use crate::{config::Config, models::reminder::FileMeta};

use self::{
    email::SmtpEmailSender,
    media_host::HttpMediaHost,
    twilio::{TwilioClient, TwilioSmsSender, TwilioWhatsAppSender},
};

/// Content id the inline reminder image is referenced by from the HTML body.
pub const INLINE_IMAGE_CID: &str = "reminderImage";

#[derive(Debug, Clone)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub text: String,
    pub html: String,
    /// Embedded inline under `INLINE_IMAGE_CID` when the file can be found.
    pub image: Option<FileMeta>,
}

#[derive(Debug, Clone)]
pub struct SmsMessage {
    /// E.164 destination, country code included.
    pub to: String,
    pub body: String,
}

#[derive(Debug, Clone)]
pub struct WhatsAppMessage {
    /// `whatsapp:`-prefixed destination.
    pub to: String,
    pub body: String,
    /// Attachments; local files are published to a public host before sending.
    pub media: Vec<FileMeta>,
}

#[async_trait::async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, message: EmailMessage) -> anyhow::Result<()>;
}

#[async_trait::async_trait]
pub trait SmsSender: Send + Sync {
    /// Configured sender number, as given to the provider.
    fn from_address(&self) -> &str;

    /// Returns the provider message id.
    async fn send(&self, message: SmsMessage) -> anyhow::Result<String>;
}

#[async_trait::async_trait]
pub trait WhatsAppSender: Send + Sync {
    /// Configured `whatsapp:`-prefixed sender.
    fn from_address(&self) -> &str;

    /// Returns the provider message id.
    async fn send(&self, message: WhatsAppMessage) -> anyhow::Result<String>;
}

/// Publishes a stored attachment somewhere the messaging provider can fetch it.
#[async_trait::async_trait]
pub trait MediaHost: Send + Sync {
    /// Returns the public URL of the uploaded file.
    async fn publish(&self, file: &FileMeta) -> anyhow::Result<String>;
}

/// The configured senders. A channel left as `None` is disabled.
#[derive(Clone, Default)]
pub struct ChannelSenders {
    pub email: Option<Arc<dyn EmailSender>>,
    pub sms: Option<Arc<dyn SmsSender>>,
    pub whatsapp: Option<Arc<dyn WhatsAppSender>>,
}

impl ChannelSenders {
    pub fn from_config(config: &Config) -> Self {
        let email = SmtpEmailSender::new(config).map(|s| Arc::new(s) as Arc<dyn EmailSender>);
        if email.is_some() {
            info!("SMTP email channel configured");
        } else {
            info!("SMTP not configured email channel disabled");
        }

        let twilio = TwilioClient::new(config).map(Arc::new);
        if twilio.is_none() {
            info!("Twilio not configured SMS and WhatsApp channels disabled");
        }

        let sms = match (&twilio, &config.twilio_sms_from) {
            (Some(client), Some(from)) => {
                info!("SMS channel configured (from {from})");
                Some(Arc::new(TwilioSmsSender::new(client.clone(), from.clone())) as Arc<dyn SmsSender>)
            }
            _ => None,
        };

        let media_host = HttpMediaHost::new(config).map(|h| Arc::new(h) as Arc<dyn MediaHost>);
        let whatsapp = match (&twilio, &config.twilio_whatsapp_from) {
            (Some(client), Some(from)) => {
                info!("WhatsApp channel configured (from {from})");
                Some(Arc::new(TwilioWhatsAppSender::new(
                    client.clone(),
                    from.clone(),
                    media_host,
                )) as Arc<dyn WhatsAppSender>)
            }
            _ => None,
        };

        Self {
            email,
            sms,
            whatsapp,
        }
    }
}
