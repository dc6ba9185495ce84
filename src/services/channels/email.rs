use std::path::{Path, PathBuf};

use anyhow::Context;
use lettre::{
    message::{header::ContentType, Attachment, Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tracing::{debug, warn};
use uuid::Uuid;

use super::{EmailMessage, EmailSender, INLINE_IMAGE_CID};
use crate::{config::Config, models::reminder::FileMeta};

pub struct SmtpEmailSender {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    uploads_dir: PathBuf,
}

impl SmtpEmailSender {
    /// Returns None if SMTP is not fully configured.
    pub fn new(config: &Config) -> Option<Self> {
        let host = config.smtp_host.as_deref()?;
        let username = config.smtp_username.clone()?;
        let password = config.smtp_password.clone()?;
        let from_addr = config.smtp_from.as_deref()?;

        let port = config.smtp_port.unwrap_or(587);
        let creds = Credentials::new(username, password);

        let transport = if port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(host)
                .ok()?
                .port(port)
                .credentials(creds)
                .build()
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                .ok()?
                .port(port)
                .credentials(creds)
                .build()
        };

        let from: Mailbox = from_addr.parse().ok()?;

        Some(Self::with_transport(transport, from, &config.uploads_dir))
    }

    pub fn with_transport(
        transport: AsyncSmtpTransport<Tokio1Executor>,
        from: Mailbox,
        uploads_dir: impl AsRef<Path>,
    ) -> Self {
        Self {
            transport,
            from,
            uploads_dir: uploads_dir.as_ref().to_path_buf(),
        }
    }

    fn new_message_id(&self) -> String {
        format!("<{}@{}>", Uuid::new_v4(), self.from.email.domain())
    }

    /// Load the image as an inline part. A missing or unreadable file only
    /// drops the attachment.
    async fn inline_image(&self, image: &FileMeta) -> Option<SinglePart> {
        // Only the final path component is trusted.
        let name = Path::new(&image.filename).file_name()?;
        let path = self.uploads_dir.join(name);

        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Reminder image not attached, {} unreadable: {}", path.display(), e);
                return None;
            }
        };
        debug!("Attaching {} ({} bytes) inline", image.display_name(), bytes.len());

        let content_type = ContentType::parse(image.mime_type_or_default())
            .or_else(|_| ContentType::parse(mime::APPLICATION_OCTET_STREAM.as_ref()))
            .ok()?;
        Some(Attachment::new_inline(INLINE_IMAGE_CID.to_string()).body(bytes, content_type))
    }

    pub(crate) async fn build_message(&self, message: &EmailMessage) -> anyhow::Result<Message> {
        let to: Mailbox = message
            .to
            .parse()
            .with_context(|| format!("Invalid recipient address '{}'", message.to))?;

        let text_part = SinglePart::builder()
            .header(ContentType::TEXT_PLAIN)
            .body(message.text.clone());

        let image = match &message.image {
            Some(image) => self.inline_image(image).await,
            None => None,
        };

        let body = match image {
            Some(image) => {
                let html = format!(
                    r#"{}<br/><img src="cid:{INLINE_IMAGE_CID}" alt="Reminder Image" style="max-width:600px;"/>"#,
                    message.html
                );
                MultiPart::alternative().singlepart(text_part).multipart(
                    MultiPart::related()
                        .singlepart(
                            SinglePart::builder()
                                .header(ContentType::TEXT_HTML)
                                .body(html),
                        )
                        .singlepart(image),
                )
            }
            None => MultiPart::alternative().singlepart(text_part).singlepart(
                SinglePart::builder()
                    .header(ContentType::TEXT_HTML)
                    .body(message.html.clone()),
            ),
        };

        Message::builder()
            .message_id(Some(self.new_message_id()))
            .from(self.from.clone())
            .to(to)
            .subject(message.subject.as_str())
            .multipart(body)
            .context("Failed to build email message")
    }
}

#[async_trait::async_trait]
impl EmailSender for SmtpEmailSender {
    async fn send(&self, message: EmailMessage) -> anyhow::Result<()> {
        let email = self.build_message(&message).await?;
        self.transport
            .send(email)
            .await
            .context("Failed to send email")?;
        Ok(())
    }
}
