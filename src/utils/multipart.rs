use axum::{body::Body, extract::Request, http::header};
use futures_util::TryStreamExt;
use multer::{Constraints, Multipart, SizeLimit};
use std::collections::HashMap;

use crate::models::errors::AppError;

pub const INVALID_IMAGE_TYPE_MESSAGE: &str =
    "Invalid file type. Only jpg, png and webp formats are allowed!";

/// Image types accepted for every image field (avatars and blog images)
pub const ALLOWED_IMAGE_TYPES: [&str; 4] = ["image/png", "image/jpeg", "image/jpg", "image/webp"];

/// Room left in the whole-body limit for text fields and part headers
const FORM_OVERHEAD_BYTES: u64 = 64 * 1024;

/// Most files a single form carries (a blog's four images)
const MAX_FILES_PER_FORM: u64 = 4;

/// A file part read from a multipart body
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub field: String,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

impl UploadedFile {
    /// Resolves the effective image MIME type from the declared content type,
    /// falling back to magic bytes when the client sent none.
    pub fn image_mime(&self) -> Option<&'static str> {
        let declared = self
            .content_type
            .as_deref()
            .and_then(|ct| ct.parse::<mime::Mime>().ok())
            .map(|m| m.essence_str().to_ascii_lowercase());

        match declared.as_deref() {
            None | Some("application/octet-stream") => sniff_image_type(&self.data),
            Some(essence) => ALLOWED_IMAGE_TYPES
                .iter()
                .copied()
                .find(|allowed| *allowed == essence),
        }
    }

    /// Fails with `UnsupportedMediaType` unless the file is an accepted image
    pub fn ensure_image(&self) -> Result<&'static str, AppError> {
        self.image_mime().ok_or_else(|| {
            tracing::debug!(
                "Rejected upload for field {} (content_type: {:?})",
                self.field,
                self.content_type
            );
            AppError::unsupported_media_type(INVALID_IMAGE_TYPE_MESSAGE)
        })
    }
}

/// Validate image format based on magic bytes
fn sniff_image_type(data: &[u8]) -> Option<&'static str> {
    if data.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
        Some("image/png")
    } else if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("image/jpeg")
    } else if data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"WEBP" {
        Some("image/webp")
    } else {
        None
    }
}

/// Text fields and files of a multipart request
#[derive(Debug, Default)]
pub struct MultipartForm {
    pub fields: HashMap<String, String>,
    pub files: HashMap<String, UploadedFile>,
}

impl MultipartForm {
    /// Reads the whole multipart body. Any part over `max_file_size` is
    /// rejected while it streams, before it is buffered in full.
    pub async fn from_request(request: Request<Body>, max_file_size: usize) -> Result<Self, AppError> {
        let boundary = request
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|ct| ct.to_str().ok())
            .and_then(|ct| multer::parse_boundary(ct).ok())
            .ok_or_else(|| AppError::validation_failed("Missing or invalid multipart boundary"))?;

        // Convert the request body to a stream
        let stream = request
            .into_body()
            .into_data_stream()
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::Other, err));

        let max_part = max_file_size as u64;
        let constraints = Constraints::new().size_limit(
            SizeLimit::new()
                .per_field(max_part)
                .whole_stream(
                    max_part
                        .saturating_mul(MAX_FILES_PER_FORM)
                        .saturating_add(FORM_OVERHEAD_BYTES),
                ),
        );

        let mut multipart = Multipart::with_constraints(stream, boundary, constraints);
        let mut form = MultipartForm::default();

        while let Some(field) = multipart.next_field().await? {
            let name = match field.name() {
                Some(name) => name.to_string(),
                None => continue,
            };
            let file_name = field.file_name().map(|s| s.to_string());
            let content_type = field.content_type().map(|m| m.to_string());

            if file_name.is_some() {
                let data = field.bytes().await?;
                // Browsers send an empty part for an untouched file input
                if data.is_empty() {
                    continue;
                }

                tracing::debug!(
                    "Received file field: {} (filename: {:?}, content_type: {:?}, size: {})",
                    name,
                    file_name,
                    content_type,
                    data.len()
                );

                form.files.insert(
                    name.clone(),
                    UploadedFile {
                        field: name,
                        file_name,
                        content_type,
                        data: data.to_vec(),
                    },
                );
            } else {
                let text = field.text().await?;
                form.fields.insert(name, text);
            }
        }

        Ok(form)
    }

    /// A trimmed, non-empty text field
    pub fn text(&self, name: &str) -> Option<String> {
        self.fields
            .get(name)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    /// A text field kept exactly as sent, including an empty value
    pub fn raw(&self, name: &str) -> Option<String> {
        self.fields.get(name).cloned()
    }

    pub fn take_file(&mut self, name: &str) -> Option<UploadedFile> {
        self.files.remove(name)
    }

    pub fn has_files(&self) -> bool {
        !self.files.is_empty()
    }
}

/// True when the request carries a multipart body
pub fn is_multipart(request: &Request<Body>) -> bool {
    request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|ct| ct.to_str().ok())
        .map(|ct| ct.starts_with("multipart/form-data"))
        .unwrap_or(false)
}
