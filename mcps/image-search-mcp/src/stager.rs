//! Image staging
//!
//! Turns an [`InboundImage`] into a [`StagedImage`] a backend can consume:
//! inline base64 is decoded into a uniquely named temp file, URLs are passed
//! through untouched. The staged file lives exactly as long as the handle.

use std::io::Write;
use std::path::{Path, PathBuf};

use base64::Engine;
use tempfile::TempPath;
use tracing::{debug, warn};

use crate::error::StagingError;
use crate::types::InboundImage;

const FILE_PREFIX: &str = "image-search-";

/// Image formats we know an extension for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Jpeg,
    Png,
    Gif,
    Webp,
    Bmp,
}

impl ImageFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => ".jpg",
            Self::Png => ".png",
            Self::Gif => ".gif",
            Self::Webp => ".webp",
            Self::Bmp => ".bmp",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Gif => "image/gif",
            Self::Webp => "image/webp",
            Self::Bmp => "image/bmp",
        }
    }

    /// Maps `image/png`, `png`, `data:image/png;base64` and friends
    pub fn from_mime(mime: &str) -> Option<Self> {
        let mime = mime.trim().to_ascii_lowercase();
        let mime = mime.strip_prefix("data:").unwrap_or(&mime);
        let essence = mime.split(';').next().unwrap_or_default();
        let subtype = essence.rsplit('/').next().unwrap_or_default();
        match subtype {
            "jpeg" | "jpg" | "pjpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "gif" => Some(Self::Gif),
            "webp" => Some(Self::Webp),
            "bmp" | "x-ms-bmp" => Some(Self::Bmp),
            _ => None,
        }
    }

    /// Magic-number sniffing for payloads that arrive without a hint
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        match bytes {
            [0xFF, 0xD8, 0xFF, ..] => Some(Self::Jpeg),
            [0x89, b'P', b'N', b'G', ..] => Some(Self::Png),
            [b'G', b'I', b'F', b'8', ..] => Some(Self::Gif),
            [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => Some(Self::Webp),
            [b'B', b'M', ..] => Some(Self::Bmp),
            _ => None,
        }
    }
}

/// Borrowed view of what a backend should submit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageRef<'a> {
    File(&'a Path),
    Url(&'a str),
}

#[derive(Debug)]
enum StagedSource {
    File(TempPath),
    Remote(String),
}

/// An image ready to be submitted to a backend
///
/// Owned by exactly one pipeline invocation. Call [`StagedImage::release`]
/// when the backend call settles; a handle that is dropped instead (panic,
/// aborted task) still removes its file.
#[derive(Debug)]
pub struct StagedImage {
    source: StagedSource,
    format: ImageFormat,
}

impl StagedImage {
    pub fn image_ref(&self) -> ImageRef<'_> {
        match &self.source {
            StagedSource::File(path) => ImageRef::File(&**path),
            StagedSource::Remote(url) => ImageRef::Url(url.as_str()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match &self.source {
            StagedSource::File(path) => Some(&**path),
            StagedSource::Remote(_) => None,
        }
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    /// File name used for multipart uploads
    pub fn file_name(&self) -> String {
        self.path()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("image{}", self.format.extension()))
    }

    /// Deletes the staged file, if any. Consumes the handle so it can only
    /// happen once; a file that is already gone is not an error.
    pub fn release(self) {
        let StagedSource::File(path) = self.source else {
            return;
        };
        let shown = path.display().to_string();
        match path.close() {
            Ok(()) => debug!(path = %shown, "released staged image"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %shown, "staged image already removed")
            }
            Err(e) => warn!(path = %shown, error = %e, "failed to remove staged image"),
        }
    }
}

/// Materializes inbound images into a staging directory
#[derive(Debug, Clone)]
pub struct ImageStager {
    dir: PathBuf,
}

impl Default for ImageStager {
    fn default() -> Self {
        Self::new(std::env::temp_dir())
    }
}

impl ImageStager {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn stage(&self, image: &InboundImage) -> Result<StagedImage, StagingError> {
        match image {
            InboundImage::Base64 { mime_hint, payload } => {
                self.stage_base64(payload, mime_hint.as_deref())
            }
            InboundImage::Url { url } => stage_url(url),
        }
    }

    fn stage_base64(
        &self,
        payload: &str,
        mime_hint: Option<&str>,
    ) -> Result<StagedImage, StagingError> {
        // Everything before the first comma is a data-URI header
        let (header, encoded) = payload.split_once(',').unwrap_or(("", payload));

        let cleaned: String = encoded
            .chars()
            .filter(|c| !c.is_ascii_whitespace())
            .collect();
        let bytes = base64::engine::general_purpose::STANDARD.decode(cleaned)?;
        if bytes.is_empty() {
            return Err(StagingError::EmptyPayload);
        }

        let format = ImageFormat::from_mime(header)
            .or_else(|| mime_hint.and_then(ImageFormat::from_mime))
            .or_else(|| ImageFormat::sniff(&bytes))
            .unwrap_or(ImageFormat::Jpeg);

        let mut file = tempfile::Builder::new()
            .prefix(FILE_PREFIX)
            .suffix(format.extension())
            .tempfile_in(&self.dir)?;
        file.write_all(&bytes)?;
        file.flush()?;

        let path = file.into_temp_path();
        debug!(
            path = %path.display(),
            bytes = bytes.len(),
            mime = format.mime_type(),
            "staged inline image"
        );

        Ok(StagedImage {
            source: StagedSource::File(path),
            format,
        })
    }
}

fn stage_url(raw: &str) -> Result<StagedImage, StagingError> {
    let url = url::Url::parse(raw.trim()).map_err(|source| StagingError::InvalidUrl {
        url: raw.to_string(),
        source,
    })?;

    let format = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .and_then(|name| name.rsplit_once('.'))
        .and_then(|(_, ext)| ImageFormat::from_mime(ext))
        .unwrap_or(ImageFormat::Jpeg);

    debug!(url = %url, "staged remote image");
    Ok(StagedImage {
        source: StagedSource::Remote(url.into()),
        format,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    // Just the magic numbers; staging never looks past them
    const PNG_HEADER_B64: &str = "iVBORw0KGgo=";
    const JPEG_B64: &str = "/9j/4AAQSkZJRg==";

    fn staged_files(dir: &Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    #[test]
    fn test_stage_plain_base64_then_release() {
        let dir = tempfile::tempdir().unwrap();
        let stager = ImageStager::new(dir.path());

        let staged = stager.stage(&InboundImage::base64(JPEG_B64)).unwrap();
        let path = staged.path().unwrap().to_path_buf();
        assert!(path.exists());
        assert_eq!(path.extension().unwrap(), "jpg");
        assert_eq!(staged.format(), ImageFormat::Jpeg);

        staged.release();
        assert!(!path.exists());
        assert_eq!(staged_files(dir.path()), 0);
    }

    #[test]
    fn test_stage_data_uri_uses_header_format() {
        let dir = tempfile::tempdir().unwrap();
        let stager = ImageStager::new(dir.path());

        let payload = format!("data:image/png;base64,{PNG_HEADER_B64}");
        let staged = stager.stage(&InboundImage::base64(payload)).unwrap();
        let path = staged.path().unwrap().to_path_buf();
        assert_eq!(path.extension().unwrap(), "png");
        assert_eq!(std::fs::read(&path).unwrap()[..4], [0x89, b'P', b'N', b'G']);

        staged.release();
        assert_eq!(staged_files(dir.path()), 0);
    }

    #[test]
    fn test_stage_uses_mime_hint_then_sniffing() {
        let dir = tempfile::tempdir().unwrap();
        let stager = ImageStager::new(dir.path());

        let hinted = InboundImage::Base64 {
            mime_hint: Some("image/webp".to_string()),
            payload: JPEG_B64.to_string(),
        };
        let staged = stager.stage(&hinted).unwrap();
        assert_eq!(staged.format(), ImageFormat::Webp);
        staged.release();

        let staged = stager.stage(&InboundImage::base64(PNG_HEADER_B64)).unwrap();
        assert_eq!(staged.format(), ImageFormat::Png);
        staged.release();
    }

    #[test]
    fn test_stage_tolerates_wrapped_lines() {
        let dir = tempfile::tempdir().unwrap();
        let stager = ImageStager::new(dir.path());

        let staged = stager
            .stage(&InboundImage::base64("/9j/4AAQ\nSkZJRg==\n"))
            .unwrap();
        assert!(staged.path().unwrap().exists());
        staged.release();
    }

    #[test]
    fn test_malformed_base64_creates_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let stager = ImageStager::new(dir.path());

        for bad in ["abc", "data:image/jpeg;base64,@@@@", "/9j/4AAQSkZJRg"] {
            let err = stager.stage(&InboundImage::base64(bad)).unwrap_err();
            assert!(matches!(err, StagingError::DecodeFailed(_)), "{bad}: {err}");
        }
        assert_eq!(staged_files(dir.path()), 0);
    }

    #[test]
    fn test_empty_payload_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let stager = ImageStager::new(dir.path());

        let err = stager
            .stage(&InboundImage::base64("data:image/png;base64,"))
            .unwrap_err();
        assert!(matches!(err, StagingError::EmptyPayload));
        assert_eq!(staged_files(dir.path()), 0);
    }

    #[test]
    fn test_missing_staging_dir_is_io_failure() {
        let dir = tempfile::tempdir().unwrap();
        let stager = ImageStager::new(dir.path().join("missing"));

        let err = stager.stage(&InboundImage::base64(JPEG_B64)).unwrap_err();
        assert!(matches!(err, StagingError::IoFailed(_)));
    }

    #[test]
    fn test_stage_url_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let stager = ImageStager::new(dir.path());

        let staged = stager
            .stage(&InboundImage::url("https://example.com/cat.PNG"))
            .unwrap();
        assert_eq!(
            staged.image_ref(),
            ImageRef::Url("https://example.com/cat.PNG")
        );
        assert_eq!(staged.format(), ImageFormat::Png);
        assert!(staged.path().is_none());
        assert_eq!(staged_files(dir.path()), 0);
        staged.release();
    }

    #[test]
    fn test_stage_invalid_url() {
        let stager = ImageStager::default();
        let err = stager.stage(&InboundImage::url("not a url")).unwrap_err();
        assert!(matches!(err, StagingError::InvalidUrl { .. }));
    }

    #[test]
    fn test_release_after_external_removal_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let stager = ImageStager::new(dir.path());

        let staged = stager.stage(&InboundImage::base64(JPEG_B64)).unwrap();
        std::fs::remove_file(staged.path().unwrap()).unwrap();
        staged.release();
    }

    #[test]
    fn test_dropped_handle_still_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let stager = ImageStager::new(dir.path());

        let staged = stager.stage(&InboundImage::base64(JPEG_B64)).unwrap();
        let path = staged.path().unwrap().to_path_buf();
        drop(staged);
        assert!(!path.exists());
    }

    #[test]
    fn test_file_name_for_uploads() {
        let dir = tempfile::tempdir().unwrap();
        let stager = ImageStager::new(dir.path());

        let staged = stager.stage(&InboundImage::base64(JPEG_B64)).unwrap();
        let name = staged.file_name();
        assert!(name.starts_with(FILE_PREFIX));
        assert!(name.ends_with(".jpg"));
        staged.release();

        let remote = stager.stage(&InboundImage::url("https://x/y")).unwrap();
        assert_eq!(remote.file_name(), "image.jpg");
    }
}
