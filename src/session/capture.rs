use anyhow::{Context, Result};
use bytes::Bytes;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CaptureError {
    #[error("please select a valid image file (JPG, PNG, WEBP); got {0}")]
    UnsupportedType(String),
    #[error("file size must be less than {limit} bytes; got {size}")]
    TooLarge { size: u64, limit: u64 },
    #[error("image is empty")]
    Empty,
    #[error("camera unavailable: {0}")]
    CameraUnavailable(String),
}

/// Image handed over by the capture/upload collaborator.
#[derive(Debug, Clone)]
pub struct CapturedImage {
    pub data: Bytes,
    pub mime: String,
    pub name: Option<String>,
}

impl CapturedImage {
    pub fn new(data: impl Into<Bytes>, mime: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            mime: mime.into(),
            name: None,
        }
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    /// Read an upload from disk. The MIME type is taken from `mime` or inferred
    /// from the extension; unknown extensions become `application/octet-stream`
    /// and are rejected later by [`validate`].
    pub async fn from_path(path: &Path, mime: Option<&str>) -> Result<Self> {
        let data = tokio::fs::read(path)
            .await
            .with_context(|| format!("read image {}", path.display()))?;
        let mime = mime
            .map(str::to_string)
            .or_else(|| mime_from_extension(path).map(str::to_string))
            .unwrap_or_else(|| "application/octet-stream".to_string());
        Ok(Self {
            data: Bytes::from(data),
            mime,
            name: path.file_name().map(|n| n.to_string_lossy().into_owned()),
        })
    }
}

pub fn mime_from_extension(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        "bmp" => Some("image/bmp"),
        _ => None,
    }
}

/// Accept only `image/*` payloads no larger than `max_bytes`.
pub fn validate(image: &CapturedImage, max_bytes: u64) -> Result<(), CaptureError> {
    if !image.mime.trim().to_ascii_lowercase().starts_with("image/") {
        return Err(CaptureError::UnsupportedType(image.mime.clone()));
    }
    let size = image.size();
    if size == 0 {
        return Err(CaptureError::Empty);
    }
    if size > max_bytes {
        return Err(CaptureError::TooLarge {
            size,
            limit: max_bytes,
        });
    }
    Ok(())
}
