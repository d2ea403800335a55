use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::models::errors::AppError;
use crate::models::user::ImageRef;
use crate::utils::config::CloudinaryConfig;
use crate::utils::multipart::UploadedFile;

const CLOUDINARY_API_BASE: &str = "https://api.cloudinary.com/v1_1";

/// Remote image host: stores raw image bytes and hands back a stable id and public URL
#[async_trait]
pub trait MediaHost: Send + Sync {
    /// Uploads the file. Fails with `UploadError` if the host reports an error
    /// or returns no result.
    async fn upload(&self, file: &UploadedFile) -> Result<ImageRef, AppError>;

    /// Deletes a previously uploaded asset
    async fn destroy(&self, public_id: &str) -> Result<(), AppError>;
}

/// Destroys every asset in `public_ids`, logging failures instead of returning them
pub async fn destroy_quietly<I>(host: &dyn MediaHost, public_ids: I)
where
    I: IntoIterator<Item = String>,
{
    for public_id in public_ids {
        if let Err(e) = host.destroy(&public_id).await {
            tracing::warn!("Failed to destroy remote image {}: {}", public_id, e);
        }
    }
}

/// Cloudinary upload API client
pub struct CloudinaryHost {
    client: reqwest::Client,
    config: CloudinaryConfig,
    folder: String,
}

#[derive(Debug, Deserialize)]
struct CloudinaryUploadResponse {
    public_id: Option<String>,
    secure_url: Option<String>,
    error: Option<CloudinaryError>,
}

#[derive(Debug, Deserialize)]
struct CloudinaryDestroyResponse {
    result: Option<String>,
    error: Option<CloudinaryError>,
}

#[derive(Debug, Deserialize)]
struct CloudinaryError {
    message: String,
}

impl CloudinaryHost {
    pub fn new(config: CloudinaryConfig, folder: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
            folder: folder.into(),
        }
    }

    pub fn is_configured(config: &CloudinaryConfig) -> bool {
        !config.cloud_name.is_empty() && !config.api_key.is_empty() && !config.api_secret.is_empty()
    }

    fn endpoint(&self, action: &str) -> String {
        format!("{}/{}/image/{}", CLOUDINARY_API_BASE, self.config.cloud_name, action)
    }

    /// Signs the request parameters: sorted `key=value` pairs joined by `&`,
    /// followed by the API secret, hashed with SHA-256.
    fn sign(&self, params: &[(&str, String)]) -> String {
        let mut sorted: Vec<&(&str, String)> = params.iter().collect();
        sorted.sort_by(|a, b| a.0.cmp(b.0));

        let to_sign = sorted
            .iter()
            .map(|(key, value)| format!("{}={}", key, value))
            .collect::<Vec<_>>()
            .join("&");

        let mut hasher = Sha256::new();
        hasher.update(to_sign.as_bytes());
        hasher.update(self.config.api_secret.as_bytes());
        hex::encode(hasher.finalize())
    }
}

#[async_trait]
impl MediaHost for CloudinaryHost {
    async fn upload(&self, file: &UploadedFile) -> Result<ImageRef, AppError> {
        let timestamp = Utc::now().timestamp().to_string();
        let signed = [("folder", self.folder.clone()), ("timestamp", timestamp.clone())];
        let signature = self.sign(&signed);

        let mut part = reqwest::multipart::Part::bytes(file.data.clone())
            .file_name(file.file_name.clone().unwrap_or_else(|| file.field.clone()));
        if let Some(mime) = file.image_mime() {
            part = part.mime_str(mime)?;
        }

        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("api_key", self.config.api_key.clone())
            .text("folder", self.folder.clone())
            .text("timestamp", timestamp)
            .text("signature_algorithm", "sha256")
            .text("signature", signature);

        let response: CloudinaryUploadResponse = self
            .client
            .post(self.endpoint("upload"))
            .multipart(form)
            .send()
            .await?
            .json()
            .await?;

        if let Some(error) = response.error {
            tracing::error!("Cloudinary upload failed for {}: {}", file.field, error.message);
            return Err(AppError::upload_failed(error.message));
        }

        match (response.public_id, response.secure_url) {
            (Some(public_id), Some(url)) => {
                tracing::info!("Uploaded {} to image host as {}", file.field, public_id);
                Ok(ImageRef { public_id, url })
            }
            _ => Err(AppError::upload_failed("Image host returned no result")),
        }
    }

    async fn destroy(&self, public_id: &str) -> Result<(), AppError> {
        let timestamp = Utc::now().timestamp().to_string();
        let signed = [("public_id", public_id.to_string()), ("timestamp", timestamp.clone())];
        let signature = self.sign(&signed);

        let params = [
            ("public_id", public_id.to_string()),
            ("api_key", self.config.api_key.clone()),
            ("timestamp", timestamp),
            ("signature_algorithm", "sha256".to_string()),
            ("signature", signature),
        ];

        let response: CloudinaryDestroyResponse = self
            .client
            .post(self.endpoint("destroy"))
            .form(&params)
            .send()
            .await?
            .json()
            .await?;

        if let Some(error) = response.error {
            return Err(AppError::upload_failed(error.message));
        }

        tracing::debug!(
            "Destroyed remote image {} ({})",
            public_id,
            response.result.as_deref().unwrap_or("unknown")
        );
        Ok(())
    }
}

#[derive(Debug, Default)]
struct InMemoryState {
    assets: HashMap<String, usize>,
    uploads: Vec<String>,
    destroyed: Vec<String>,
    failing_fields: HashSet<String>,
}

/// Process-local image host used when no Cloudinary credentials are configured.
/// It records every call, which also makes it the host used by the test suites.
#[derive(Clone, Default)]
pub struct InMemoryMediaHost {
    state: Arc<Mutex<InMemoryState>>,
}

impl InMemoryMediaHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every upload coming from the given multipart field fail
    pub fn fail_uploads_for_field(&self, field: &str) {
        self.lock().failing_fields.insert(field.to_string());
    }

    /// Public ids of all uploads, in call order
    pub fn uploads(&self) -> Vec<String> {
        self.lock().uploads.clone()
    }

    /// Public ids passed to `destroy`, in call order
    pub fn destroyed(&self) -> Vec<String> {
        self.lock().destroyed.clone()
    }

    /// Number of assets currently held
    pub fn stored_count(&self) -> usize {
        self.lock().assets.len()
    }

    pub fn contains(&self, public_id: &str) -> bool {
        self.lock().assets.contains_key(public_id)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, InMemoryState> {
        // A poisoned lock only means another test thread panicked mid-call
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl MediaHost for InMemoryMediaHost {
    async fn upload(&self, file: &UploadedFile) -> Result<ImageRef, AppError> {
        let mut state = self.lock();
        if state.failing_fields.contains(&file.field) {
            return Err(AppError::upload_failed(format!(
                "Image host rejected upload for {}",
                file.field
            )));
        }

        let public_id = format!("blog/{}", Uuid::new_v4());
        state.assets.insert(public_id.clone(), file.data.len());
        state.uploads.push(public_id.clone());

        Ok(ImageRef {
            url: format!("memory://{}", public_id),
            public_id,
        })
    }

    async fn destroy(&self, public_id: &str) -> Result<(), AppError> {
        let mut state = self.lock();
        state.destroyed.push(public_id.to_string());
        state.assets.remove(public_id);
        Ok(())
    }
}
