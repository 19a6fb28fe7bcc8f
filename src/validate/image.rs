//! Image upload validation
//!
//! Checks run against the complete upload buffer, so nothing here moves a
//! stream position: downstream storage always sees the full bytes. Order of
//! checks: byte size, pixel dimensions (header decode only), then an
//! optional MIME sniff. The sniff is an availability-over-strictness check:
//! when the sniffer is absent or cannot classify the bytes, the sub-check is
//! skipped rather than failing the upload.

use super::{FieldError, FieldResult};
use crate::config::UploadConfig;

/// MIME types an upload may sniff as
pub const ALLOWED_MIME_TYPES: [&str; 4] =
    ["image/jpeg", "image/png", "image/gif", "image/webp"];

/// File extensions an upload filename may carry
pub const ALLOWED_EXTENSIONS: [&str; 5] = [".jpg", ".jpeg", ".png", ".gif", ".webp"];

/// Sequences never allowed in an upload filename
const DANGEROUS_SEQUENCES: [&str; 10] =
    ["..", "/", "\\", "<", ">", ":", "\"", "|", "?", "*"];

/// How many bytes of the upload the sniffer looks at
const SNIFF_PREFIX_LEN: usize = 1024;

/// Content-type sniffer backed by magic-byte detection.
///
/// Modeled as an explicit optional capability: handlers hold an
/// `Option<MimeSniffer>` and pass `None` when sniffing is disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct MimeSniffer;

impl MimeSniffer {
    /// Sniff the MIME type from the leading bytes. `None` means the bytes
    /// could not be classified, not that they are invalid.
    pub fn sniff(&self, bytes: &[u8]) -> Option<&'static str> {
        let prefix = &bytes[..bytes.len().min(SNIFF_PREFIX_LEN)];
        infer::get(prefix).map(|kind| kind.mime_type())
    }
}

/// Validate uploaded image content against the configured policy.
///
/// `declared_size` is the size the client claimed for the upload; the byte
/// cap applies to whichever of the claim and the actual buffer is larger.
pub fn validate_image(
    bytes: &[u8],
    declared_size: u64,
    config: &UploadConfig,
    sniffer: Option<&MimeSniffer>,
) -> FieldResult {
    let size = declared_size.max(bytes.len() as u64);
    if size > config.max_bytes {
        return Err(FieldError::new(format!(
            "Image may not be larger than {}MB. Current size: {}MB",
            config.max_bytes / (1024 * 1024),
            size / (1024 * 1024)
        )));
    }

    let dims = imagesize::blob_size(bytes).map_err(|_| {
        FieldError::new("Could not process the image. Check that it is a valid image file.")
    })?;
    let (width, height) = (dims.width as u32, dims.height as u32);

    if width < config.min_dimension || height < config.min_dimension {
        return Err(FieldError::new(format!(
            "Image must be at least {}x{} pixels. Current dimensions: {}x{}",
            config.min_dimension, config.min_dimension, width, height
        )));
    }
    if width > config.max_dimension || height > config.max_dimension {
        return Err(FieldError::new(format!(
            "Image may not be larger than {}x{} pixels. Current dimensions: {}x{}",
            config.max_dimension, config.max_dimension, width, height
        )));
    }

    if let Some(sniffer) = sniffer {
        // A failed sniff skips the sub-check instead of rejecting
        if let Some(mime) = sniffer.sniff(bytes) {
            if !ALLOWED_MIME_TYPES.contains(&mime) {
                return Err(FieldError::new(format!(
                    "Image format not allowed: {}. Allowed formats: JPEG, PNG, GIF, WEBP",
                    mime
                )));
            }
        }
    }

    Ok(())
}

/// Validate an upload filename: no path-traversal or shell-special
/// sequences, and an allowed image extension. Independent of content
/// sniffing, which inspects the bytes instead.
pub fn validate_filename(filename: &str) -> FieldResult {
    for seq in DANGEROUS_SEQUENCES {
        if filename.contains(seq) {
            return Err(FieldError::new(format!(
                "Filename contains a forbidden sequence: {}",
                seq
            )));
        }
    }

    match file_extension(filename) {
        Some(ext) if ALLOWED_EXTENSIONS.contains(&ext.as_str()) => Ok(()),
        Some(ext) => Err(FieldError::new(format!(
            "File extension not allowed: {}. Allowed extensions: {}",
            ext,
            ALLOWED_EXTENSIONS.join(", ")
        ))),
        None => Err(FieldError::new(format!(
            "File has no extension. Allowed extensions: {}",
            ALLOWED_EXTENSIONS.join(", ")
        ))),
    }
}

/// Lowercased extension including the dot, if any
pub fn file_extension(filename: &str) -> Option<String> {
    let idx = filename.rfind('.')?;
    if idx == 0 {
        return None;
    }
    Some(filename[idx..].to_lowercase())
}

/// Storage filename for an accepted upload: a short unique stem plus the
/// original lowercased extension. The client-supplied name never reaches
/// the filesystem.
pub fn upload_filename(original: &str) -> String {
    let ext = file_extension(original).unwrap_or_else(|| ".jpg".to_string());
    let stem = uuid::Uuid::new_v4().simple().to_string();
    format!("{}{}", &stem[..12], ext)
}
