//! Media storage
//!
//! Decoded binary payloads are written under the media directory as
//! `{modality}/{YYYY}/{MM}/{DD}/{uuid}.{ext}`; the path relative to the media
//! directory is the reference kept on the capture row.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Utc;
use std::path::{Path, PathBuf};
use uuid::Uuid;
use vigil_common::{Modality, Result};

/// A payload written to disk
#[derive(Debug, Clone, PartialEq)]
pub struct StoredMedia {
    /// Path relative to the media directory, `/`-separated
    pub media_ref: String,
    /// Sniffed MIME type, if recognised
    pub mime: Option<String>,
    pub byte_len: usize,
}

#[derive(Debug, Clone)]
pub struct MediaStore {
    root: PathBuf,
}

impl MediaStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write bytes and return their reference
    pub async fn save(&self, modality: Modality, bytes: &[u8]) -> Result<StoredMedia> {
        let kind = infer::get(bytes);
        let extension = kind.map(|k| k.extension()).unwrap_or("bin");
        let mime = kind.map(|k| k.mime_type().to_string());

        let date_dir = Utc::now().format("%Y/%m/%d").to_string();
        let media_ref = format!(
            "{}/{}/{}.{}",
            modality.as_str(),
            date_dir,
            Uuid::new_v4(),
            extension
        );

        let path = self.resolve(&media_ref);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;

        tracing::debug!(media_ref = %media_ref, bytes = bytes.len(), mime = ?mime, "Stored media");

        Ok(StoredMedia {
            media_ref,
            mime,
            byte_len: bytes.len(),
        })
    }

    /// Absolute path of a media reference
    pub fn resolve(&self, media_ref: &str) -> PathBuf {
        media_ref
            .split('/')
            .fold(self.root.clone(), |path, part| path.join(part))
    }
}

/// Decode a base64 media payload
///
/// Standard alphabet with padding. A `data:<mime>;base64,` prefix and any
/// whitespace are ignored. An empty payload is an error.
pub fn decode_base64_payload(raw: &str) -> std::result::Result<Vec<u8>, String> {
    let trimmed = raw.trim();
    let body = match trimmed.strip_prefix("data:") {
        Some(rest) => rest
            .split_once(',')
            .map(|(_, data)| data)
            .ok_or_else(|| "data URL without ',' separator".to_string())?,
        None => trimmed,
    };

    let compact: String = body.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| format!("invalid base64: {}", e))?;

    if bytes.is_empty() {
        return Err("payload is empty".to_string());
    }
    Ok(bytes)
}
