use std::path::Path;

use anyhow::{anyhow, Result};
use tokio::fs;

/// An in-memory image payload plus its media type and display name.
/// Immutable once constructed; produced by intake or by the generation
/// client's response decoding.
#[derive(Debug, Clone)]
pub struct ImageFile {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub display_name: String,
}

impl ImageFile {
    pub fn new(bytes: Vec<u8>, mime_type: String, display_name: String) -> Self {
        Self {
            bytes,
            mime_type,
            display_name,
        }
    }

    /// Reads a user-selected file and sniffs its media type from the
    /// leading bytes. Non-image files are rejected up front rather than
    /// bounced off the backend later.
    pub async fn from_path(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)
            .await
            .map_err(|err| anyhow!("Failed to read {}: {err}", path.display()))?;
        if bytes.is_empty() {
            return Err(anyhow!("{} is empty", path.display()));
        }

        let mime_type =
            detect_mime_type(&bytes).ok_or_else(|| anyhow!("{} is not a recognized image format", path.display()))?;
        if !mime_type.starts_with("image/") {
            return Err(anyhow!(
                "{} is {mime_type}, not an image",
                path.display()
            ));
        }

        let display_name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| "image".to_string());

        Ok(Self::new(bytes, mime_type, display_name))
    }

    /// Display name without its extension, used when deriving export
    /// file names.
    pub fn stem(&self) -> &str {
        match self.display_name.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem,
            _ => &self.display_name,
        }
    }
}

pub fn detect_mime_type(data: &[u8]) -> Option<String> {
    if data.len() > 12 {
        let ftyp = &data[4..12];
        if ftyp.starts_with(b"ftyp") {
            let brand = &ftyp[4..8];
            if brand == b"heic" || brand == b"heif" || brand == b"hevc" {
                return Some("image/heic".to_string());
            }
        }
    }

    infer::get(data).map(|kind| kind.mime_type().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    // Minimal valid PNG header: signature + truncated IHDR is enough
    // for the sniffer.
    const PNG_HEADER: &[u8] = &[
        0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
        0x52,
    ];

    #[test]
    fn sniffs_png_payloads() {
        assert_eq!(detect_mime_type(PNG_HEADER).as_deref(), Some("image/png"));
    }

    #[test]
    fn stem_strips_the_extension() {
        let file = ImageFile::new(vec![0], "image/png".to_string(), "lamp.png".to_string());
        assert_eq!(file.stem(), "lamp");

        let bare = ImageFile::new(vec![0], "image/png".to_string(), "lamp".to_string());
        assert_eq!(bare.stem(), "lamp");
    }
}
