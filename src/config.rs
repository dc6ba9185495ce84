use std::env;

use chrono_tz::Tz;

pub const DEFAULT_TIMEZONE: Tz = chrono_tz::Asia::Kolkata;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    /// Where uploaded reminder attachments are stored on disk.
    pub uploads_dir: String,
    /// Civil timezone used to derive trigger fields from fire times.
    pub timezone: Tz,
    // SMTP (optional)
    pub smtp_host: Option<String>,
    pub smtp_port: Option<u16>,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub smtp_from: Option<String>,
    // Twilio (optional)
    pub twilio_account_sid: Option<String>,
    pub twilio_auth_token: Option<String>,
    pub twilio_sms_from: Option<String>,
    pub twilio_whatsapp_from: Option<String>,
    // Public media host for WhatsApp attachments (optional)
    pub media_upload_url: Option<String>,
    pub media_upload_preset: Option<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            database_url: required("DATABASE_URL")?,
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".into())
                .parse()?,
            uploads_dir: env::var("UPLOADS_DIR").unwrap_or_else(|_| "./uploads".into()),
            timezone: match optional("REMINDER_TIMEZONE") {
                Some(name) => name
                    .parse()
                    .map_err(|e| anyhow::anyhow!("Invalid REMINDER_TIMEZONE '{name}': {e}"))?,
                None => DEFAULT_TIMEZONE,
            },
            smtp_host: optional("SMTP_HOST"),
            smtp_port: env::var("SMTP_PORT").ok().and_then(|v| v.parse().ok()),
            smtp_username: optional("SMTP_USERNAME"),
            smtp_password: optional("SMTP_PASSWORD"),
            smtp_from: optional("SMTP_FROM"),
            twilio_account_sid: optional("TWILIO_ACCOUNT_SID"),
            twilio_auth_token: optional("TWILIO_AUTH_TOKEN"),
            twilio_sms_from: optional("TWILIO_PHONE"),
            twilio_whatsapp_from: optional("TWILIO_WHATSAPP_NUMBER"),
            media_upload_url: optional("MEDIA_UPLOAD_URL"),
            media_upload_preset: optional("MEDIA_UPLOAD_PRESET"),
        })
    }
}

fn required(key: &str) -> anyhow::Result<String> {
    env::var(key).map_err(|_| anyhow::anyhow!("Missing required env var: {}", key))
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}
