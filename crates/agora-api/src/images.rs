use std::path::Path as FsPath;

use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Path, State},
    http::{StatusCode, header},
    response::IntoResponse,
};
use sha2::{Digest, Sha256};
use tracing::{error, info};

use agora_types::api::UploadImageResponse;

use crate::AppState;
use crate::middleware::AuthUser;

pub const MAX_IMAGE_SIZE: usize = 5 * 1024 * 1024;

/// Public prefix under which stored images are served.
pub const IMAGE_ROUTE_PREFIX: &str = "/images/";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Jpeg,
    Png,
    Gif,
}

impl ImageFormat {
    /// Identify the format from its magic bytes.
    pub fn sniff(data: &[u8]) -> Option<Self> {
        if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(Self::Jpeg)
        } else if data.starts_with(b"\x89PNG\r\n\x1a\n") {
            Some(Self::Png)
        } else if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
            Some(Self::Gif)
        } else {
            None
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Gif => "gif",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Gif => "image/gif",
        }
    }

    fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "jpg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "gif" => Some(Self::Gif),
            _ => None,
        }
    }
}

/// Accept only names this server generates: 64 lowercase hex chars plus a
/// known extension. Anything else (including path separators) is refused.
pub fn parse_image_name(name: &str) -> Option<ImageFormat> {
    let (stem, ext) = name.split_once('.')?;
    if stem.len() != 64 || !stem.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
        return None;
    }
    ImageFormat::from_extension(ext)
}

/// Content-addressed file name for an upload.
pub fn image_name(data: &[u8], format: ImageFormat) -> String {
    let digest = Sha256::digest(data);
    format!("{}.{}", hex::encode(digest), format.extension())
}

/// Whether `image_path` (as returned by an upload) refers to a stored image.
pub async fn is_stored(upload_dir: &FsPath, image_path: &str) -> bool {
    let Some(name) = image_path.strip_prefix(IMAGE_ROUTE_PREFIX) else {
        return false;
    };
    if parse_image_name(name).is_none() {
        return false;
    }
    tokio::fs::try_exists(upload_dir.join(name))
        .await
        .unwrap_or(false)
}

pub async fn upload_image(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    body: Bytes,
) -> Result<impl IntoResponse, StatusCode> {
    if body.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }
    if body.len() > MAX_IMAGE_SIZE {
        return Err(StatusCode::PAYLOAD_TOO_LARGE);
    }
    let format = ImageFormat::sniff(&body).ok_or(StatusCode::BAD_REQUEST)?;

    let name = image_name(&body, format);
    let path = state.upload_dir.join(&name);

    // Same bytes, same name: a repeat upload is a no-op
    let exists = tokio::fs::try_exists(&path).await.unwrap_or(false);
    if !exists {
        tokio::fs::write(&path, &body).await.map_err(|e| {
            error!("Failed to write image {}: {}", path.display(), e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;
        info!("Stored image {} ({} bytes) for {}", name, body.len(), user.id);
    }

    Ok((
        StatusCode::CREATED,
        Json(UploadImageResponse {
            image_path: format!("{IMAGE_ROUTE_PREFIX}{name}"),
            size: body.len() as u64,
        }),
    ))
}

pub async fn get_image(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, StatusCode> {
    let format = parse_image_name(&name).ok_or(StatusCode::BAD_REQUEST)?;

    let data = match tokio::fs::read(state.upload_dir.join(&name)).await {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(StatusCode::NOT_FOUND),
        Err(e) => {
            error!("Failed to read image {}: {}", name, e);
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };

    Ok((
        [
            (header::CONTENT_TYPE, format.content_type()),
            (header::CACHE_CONTROL, "public, max-age=31536000, immutable"),
        ],
        data,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_HEADER: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

    #[test]
    fn sniff_known_formats() {
        assert_eq!(ImageFormat::sniff(&[0xFF, 0xD8, 0xFF, 0xE0]), Some(ImageFormat::Jpeg));
        assert_eq!(ImageFormat::sniff(PNG_HEADER), Some(ImageFormat::Png));
        assert_eq!(ImageFormat::sniff(b"GIF89a..."), Some(ImageFormat::Gif));
        assert_eq!(ImageFormat::sniff(b"<svg></svg>"), None);
        assert_eq!(ImageFormat::sniff(b""), None);
    }

    #[test]
    fn names_are_content_addressed() {
        let a = image_name(PNG_HEADER, ImageFormat::Png);
        let b = image_name(PNG_HEADER, ImageFormat::Png);
        assert_eq!(a, b);
        assert!(a.ends_with(".png"));
        assert_eq!(parse_image_name(&a), Some(ImageFormat::Png));
    }

    #[test]
    fn rejects_foreign_names() {
        let stem = "a".repeat(64);
        assert_eq!(parse_image_name(&format!("{stem}.gif")), Some(ImageFormat::Gif));
        assert_eq!(parse_image_name(&format!("{stem}.exe")), None);
        assert_eq!(parse_image_name(&format!("{}.png", "A".repeat(64))), None);
        assert_eq!(parse_image_name("../../etc/passwd"), None);
        assert_eq!(parse_image_name(&format!("{stem}.png.png")), None);
        assert_eq!(parse_image_name("short.png"), None);
    }

    #[tokio::test]
    async fn stored_check_needs_prefix_and_file() {
        let dir = std::env::temp_dir().join(format!("agora-img-{}", uuid::Uuid::new_v4()));
        tokio::fs::create_dir_all(&dir).await.unwrap();

        let name = image_name(PNG_HEADER, ImageFormat::Png);
        let path = format!("{IMAGE_ROUTE_PREFIX}{name}");
        assert!(!is_stored(&dir, &path).await);

        tokio::fs::write(dir.join(&name), PNG_HEADER).await.unwrap();
        assert!(is_stored(&dir, &path).await);
        assert!(!is_stored(&dir, &name).await);
        assert!(!is_stored(&dir, "/images/../secret").await);

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }
}
