//! Multipart upload of a single file to the ingestion service

use crate::config::{Config, Credentials, Metadata};
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Url};
use std::path::Path;
use tracing::{debug, warn};

/// Sends one file to its destination
///
/// `Ok` means the file was accepted and may be moved to the done folder;
/// any error counts as a failed upload.
#[async_trait]
pub trait Upload: Send + Sync {
    async fn upload(&self, path: &Path) -> Result<()>;
}

/// Uploads files with a multipart POST and basic authentication
#[derive(Debug, Clone)]
pub struct HttpUploader {
    client: Client,
    url: Url,
    credentials: Credentials,
    metadata: Metadata,
}

impl HttpUploader {
    /// Build the uploader and its HTTP client from the run configuration
    pub fn new(config: &Config) -> Result<Self> {
        if config.accept_invalid_certs {
            warn!("TLS certificate validation is disabled");
        }

        let client = Client::builder()
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .timeout(config.timeout)
            .user_agent(concat!("drop-uploader/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            url: config.upload_url.clone(),
            credentials: config.credentials.clone(),
            metadata: config.metadata.clone(),
        })
    }

    /// Multipart body: file name, file content and whichever metadata is set
    fn build_form(&self, file_name: &str, content: Vec<u8>) -> Result<Form> {
        let mut form = Form::new()
            .part("file", Part::text(file_name.to_string()).file_name("file"))
            .part(
                "filebyte",
                Part::bytes(content)
                    .file_name("filebyte")
                    .mime_str("application/octet-stream")?,
            );

        let fields = [
            ("identifacator", &self.metadata.identifier),
            ("acnumber", &self.metadata.accession_number),
            ("ocrbar", &self.metadata.ocr_barcode),
        ];
        for (name, value) in fields {
            if let Some(value) = value {
                form = form.text(name, value.clone());
            }
        }

        Ok(form)
    }
}

#[async_trait]
impl Upload for HttpUploader {
    async fn upload(&self, path: &Path) -> Result<()> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| Error::NoFileName(path.to_path_buf()))?;

        // The handle is closed once the content is in memory.
        let content = tokio::fs::read(path).await?;
        debug!(path = %path.display(), bytes = content.len(), "File read");

        let form = self.build_form(&file_name, content)?;
        let response = self
            .client
            .post(self.url.clone())
            .basic_auth(&self.credentials.username, Some(&self.credentials.password))
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Rejected {
                path: path.to_path_buf(),
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or_default().to_string(),
            });
        }

        debug!(path = %path.display(), status = status.as_u16(), "File sent");
        Ok(())
    }
}
