use std::sync::Arc;

use anyhow::Context;
use reqwest::Client;
use tracing::{debug, warn};

use super::{MediaHost, SmsMessage, SmsSender, WhatsAppMessage, WhatsAppSender};
use crate::{config::Config, models::reminder::FileMeta};

const TWILIO_API_BASE: &str = "https://api.twilio.com/2010-04-01";

/// Thin client for the Twilio Messages resource, shared by SMS and WhatsApp.
pub struct TwilioClient {
    client: Client,
    account_sid: String,
    auth_token: String,
    base_url: String,
}

impl TwilioClient {
    /// Returns None if the account credentials are not configured.
    pub fn new(config: &Config) -> Option<Self> {
        Some(Self {
            client: Client::new(),
            account_sid: config.twilio_account_sid.clone()?,
            auth_token: config.twilio_auth_token.clone()?,
            base_url: TWILIO_API_BASE.to_string(),
        })
    }

    /// Create a message and return its SID.
    pub async fn create_message(
        &self,
        from: &str,
        to: &str,
        body: &str,
        media_urls: &[String],
    ) -> anyhow::Result<String> {
        let url = format!("{}/Accounts/{}/Messages.json", self.base_url, self.account_sid);

        let mut form: Vec<(&str, &str)> = vec![("From", from), ("To", to), ("Body", body)];
        form.extend(media_urls.iter().map(|u| ("MediaUrl", u.as_str())));

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&form)
            .send()
            .await
            .context("Twilio request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("Twilio error {}: {}", status, text);
        }

        let result: serde_json::Value = response
            .json()
            .await
            .context("Invalid Twilio response")?;
        Ok(result["sid"].as_str().unwrap_or("unknown").to_string())
    }
}

pub struct TwilioSmsSender {
    client: Arc<TwilioClient>,
    from: String,
}

impl TwilioSmsSender {
    pub fn new(client: Arc<TwilioClient>, from: String) -> Self {
        Self { client, from }
    }
}

#[async_trait::async_trait]
impl SmsSender for TwilioSmsSender {
    fn from_address(&self) -> &str {
        &self.from
    }

    async fn send(&self, message: SmsMessage) -> anyhow::Result<String> {
        self.client
            .create_message(&self.from, &message.to, &message.body, &[])
            .await
    }
}

pub struct TwilioWhatsAppSender {
    client: Arc<TwilioClient>,
    from: String,
    media_host: Option<Arc<dyn MediaHost>>,
}

impl TwilioWhatsAppSender {
    pub fn new(
        client: Arc<TwilioClient>,
        from: String,
        media_host: Option<Arc<dyn MediaHost>>,
    ) -> Self {
        Self {
            client,
            from,
            media_host,
        }
    }

    /// Public URLs for the attachments. Files that only exist locally are
    /// published first; any upload failure fails the whole send.
    async fn media_urls(&self, media: &[FileMeta]) -> anyhow::Result<Vec<String>> {
        let mut urls = Vec::with_capacity(media.len());
        for file in media {
            if let Some(url) = file.public_url() {
                urls.push(url.to_string());
                continue;
            }
            match &self.media_host {
                Some(host) => {
                    let url = host
                        .publish(file)
                        .await
                        .with_context(|| format!("Failed to publish {}", file.display_name()))?;
                    debug!("Published {} to {}", file.display_name(), url);
                    urls.push(url);
                }
                None => warn!(
                    "No public media host configured, sending WhatsApp without {}",
                    file.display_name()
                ),
            }
        }
        Ok(urls)
    }
}

#[async_trait::async_trait]
impl WhatsAppSender for TwilioWhatsAppSender {
    fn from_address(&self) -> &str {
        &self.from
    }

    async fn send(&self, message: WhatsAppMessage) -> anyhow::Result<String> {
        let media_urls = self.media_urls(&message.media).await?;
        self.client
            .create_message(&self.from, &message.to, &message.body, &media_urls)
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    struct StubHost {
        fail: bool,
        published: Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl MediaHost for StubHost {
        async fn publish(&self, file: &FileMeta) -> anyhow::Result<String> {
            if self.fail {
                anyhow::bail!("upload refused");
            }
            self.published.lock().unwrap().push(file.filename.clone());
            Ok(format!("https://cdn.example.com/{}", file.filename))
        }
    }

    fn client() -> Arc<TwilioClient> {
        Arc::new(TwilioClient {
            client: Client::new(),
            account_sid: "AC123".into(),
            auth_token: "secret".into(),
            base_url: "http://127.0.0.1:9".into(),
        })
    }

    fn file(filename: &str, url: Option<&str>) -> FileMeta {
        FileMeta {
            filename: filename.into(),
            original_name: None,
            mime_type: Some("image/jpeg".into()),
            size: None,
            url: url.map(String::from),
        }
    }

    fn sender(host: Option<StubHost>) -> TwilioWhatsAppSender {
        TwilioWhatsAppSender::new(
            client(),
            "whatsapp:+14155238886".into(),
            host.map(|h| Arc::new(h) as Arc<dyn MediaHost>),
        )
    }

    #[tokio::test]
    async fn test_public_urls_are_used_as_is() {
        let urls = sender(None)
            .media_urls(&[file("a.jpg", Some("https://cdn.example.com/a.jpg"))])
            .await
            .unwrap();
        assert_eq!(urls, vec!["https://cdn.example.com/a.jpg".to_string()]);
    }

    #[tokio::test]
    async fn test_local_files_are_published_first() {
        let urls = sender(Some(StubHost {
            fail: false,
            published: Mutex::new(Vec::new()),
        }))
        .media_urls(&[
            file("a.jpg", Some("/uploads/a.jpg")),
            file("b.mp4", Some("https://cdn.example.com/b.mp4")),
        ])
        .await
        .unwrap();
        assert_eq!(
            urls,
            vec![
                "https://cdn.example.com/a.jpg".to_string(),
                "https://cdn.example.com/b.mp4".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_local_files_without_host_are_dropped() {
        let urls = sender(None)
            .media_urls(&[file("a.jpg", Some("/uploads/a.jpg"))])
            .await
            .unwrap();
        assert!(urls.is_empty());
    }

    #[tokio::test]
    async fn test_upload_failure_aborts_the_send() {
        let whatsapp = sender(Some(StubHost {
            fail: true,
            published: Mutex::new(Vec::new()),
        }));
        let result = whatsapp
            .send(WhatsAppMessage {
                to: "whatsapp:+919876543210".into(),
                body: "Reminder: Pay Invoice".into(),
                media: vec![file("a.jpg", None)],
            })
            .await;
        assert!(result.is_err());
    }
}
