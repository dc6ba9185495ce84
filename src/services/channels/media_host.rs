use std::path::{Path, PathBuf};

use anyhow::Context;
use reqwest::{
    multipart::{Form, Part},
    Client,
};

use super::MediaHost;
use crate::{config::Config, models::reminder::FileMeta};

/// Unsigned upload to an HTTP media host (Cloudinary-style: multipart
/// `file` + `upload_preset`, JSON response carrying `secure_url`).
pub struct HttpMediaHost {
    client: Client,
    upload_url: String,
    upload_preset: Option<String>,
    uploads_dir: PathBuf,
}

impl HttpMediaHost {
    /// Returns None if no upload endpoint is configured.
    pub fn new(config: &Config) -> Option<Self> {
        Some(Self {
            client: Client::new(),
            upload_url: config.media_upload_url.clone()?,
            upload_preset: config.media_upload_preset.clone(),
            uploads_dir: PathBuf::from(&config.uploads_dir),
        })
    }
}

#[async_trait::async_trait]
impl MediaHost for HttpMediaHost {
    async fn publish(&self, file: &FileMeta) -> anyhow::Result<String> {
        let name = Path::new(&file.filename)
            .file_name()
            .ok_or_else(|| anyhow::anyhow!("Invalid attachment filename '{}'", file.filename))?;
        let path = self.uploads_dir.join(name);
        let bytes = tokio::fs::read(&path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;

        let part = Part::bytes(bytes)
            .file_name(file.display_name().to_string())
            .mime_str(file.mime_type_or_default())?;
        let mut form = Form::new().part("file", part);
        if let Some(preset) = &self.upload_preset {
            form = form.text("upload_preset", preset.clone());
        }

        let response = self
            .client
            .post(&self.upload_url)
            .multipart(form)
            .send()
            .await
            .context("Media upload request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("Media host error {}: {}", status, text);
        }

        let result: serde_json::Value = response
            .json()
            .await
            .context("Invalid media host response")?;
        result["secure_url"]
            .as_str()
            .or_else(|| result["url"].as_str())
            .map(String::from)
            .ok_or_else(|| anyhow::anyhow!("Media host response has no URL"))
    }
}
