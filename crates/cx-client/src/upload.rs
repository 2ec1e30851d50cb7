use std::path::Path;

use image::ImageFormat;
use log::debug;

use crate::error::ApiError;

/// A chart image read from disk and checked before it is sent anywhere.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub file_name: String,
    pub mime_type: &'static str,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, ApiError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "chart".to_string());

        Self::from_bytes(file_name, bytes).map_err(|reason| ApiError::InvalidUpload {
            path: path.display().to_string(),
            reason,
        })
    }

    pub fn from_bytes(file_name: String, bytes: Vec<u8>) -> Result<Self, String> {
        if bytes.is_empty() {
            return Err("file is empty".to_string());
        }

        let format = image::guess_format(&bytes)
            .map_err(|_| "not a recognised image (png, jpeg, gif, bmp, webp, tiff)".to_string())?;
        let mime_type = mime_for(format).ok_or_else(|| format!("unsupported image format {format:?}"))?;

        debug!("prepared upload {} ({} bytes, {})", file_name, bytes.len(), mime_type);

        Ok(Self {
            file_name,
            mime_type,
            bytes,
        })
    }
}

fn mime_for(format: ImageFormat) -> Option<&'static str> {
    let mime = match format {
        ImageFormat::Png => "image/png",
        ImageFormat::Jpeg => "image/jpeg",
        ImageFormat::Gif => "image/gif",
        ImageFormat::Bmp => "image/bmp",
        ImageFormat::WebP => "image/webp",
        ImageFormat::Tiff => "image/tiff",
        _ => return None,
    };
    Some(mime)
}

/// Reads width and height of a downloaded image, if it decodes.
pub fn image_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    let reader = image::ImageReader::new(std::io::Cursor::new(bytes))
        .with_guessed_format()
        .ok()?;
    reader.into_dimensions().ok()
}
