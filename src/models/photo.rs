use std::path::Path;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Photo {
    pub id: i64,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub file_path: String,
    #[serde(default)]
    pub is_main: bool,
    #[serde(default)]
    pub uploaded_at: Option<NaiveDateTime>,
    #[serde(default)]
    pub uploader_name: Option<String>,
}

/// An in-memory file ready for a multipart upload.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        let filename = filename.into();
        let content_type = mime_guess::from_path(&filename)
            .first_or_octet_stream()
            .to_string();
        Self {
            filename,
            content_type,
            bytes,
        }
    }

    pub async fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        Ok(Self::new(filename, bytes))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadError {
    pub filename: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MultipleUploadResult {
    #[serde(default)]
    pub uploaded: Vec<String>,
    #[serde(default)]
    pub errors: Vec<UploadError>,
    #[serde(default)]
    pub total_uploaded: u64,
    #[serde(default)]
    pub total_errors: u64,
}
