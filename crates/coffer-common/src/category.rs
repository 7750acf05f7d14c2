//! File category classification for upload metadata.
//!
//! The storage backend shards blobs by coarse category; the client decides
//! the category from the MIME type before upload and sends it in the
//! `X-File-Category` header.

use serde::{Deserialize, Serialize};
use std::fmt;

const PHOTO_MIMES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/webp",
    "image/svg+xml",
    "image/bmp",
    "image/tiff",
    "image/x-icon",
];

const VIDEO_MIMES: &[&str] = &[
    "video/mp4",
    "video/webm",
    "video/ogg",
    "video/quicktime",
    "video/x-msvideo",
    "video/x-ms-wmv",
    "video/mpeg",
    "video/3gpp",
    "video/3gpp2",
];

const TEXT_MIMES: &[&str] = &[
    "text/plain",
    "text/csv",
    "text/html",
    "text/css",
    "text/javascript",
    "application/json",
    "application/xml",
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/vnd.ms-excel",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "application/vnd.ms-powerpoint",
    "application/vnd.openxmlformats-officedocument.presentationml.presentation",
    "application/rtf",
];

/// Coarse file category, as sent on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileCategory {
    Photo,
    Video,
    Text,
    Unknown,
}

impl FileCategory {
    /// Wire representation, lowercase.
    pub fn as_str(&self) -> &'static str {
        match self {
            FileCategory::Photo => "photo",
            FileCategory::Video => "video",
            FileCategory::Text => "text",
            FileCategory::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FileCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a MIME type. Unrecognized or empty types map to `Unknown`.
pub fn determine_file_category(mime_type: &str) -> FileCategory {
    if mime_type.is_empty() {
        return FileCategory::Unknown;
    }
    let normalized = mime_type.to_ascii_lowercase();

    if PHOTO_MIMES.contains(&normalized.as_str()) {
        FileCategory::Photo
    } else if VIDEO_MIMES.contains(&normalized.as_str()) {
        FileCategory::Video
    } else if TEXT_MIMES.contains(&normalized.as_str()) {
        FileCategory::Text
    } else {
        FileCategory::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_categories() {
        assert_eq!(determine_file_category("image/png"), FileCategory::Photo);
        assert_eq!(determine_file_category("video/mp4"), FileCategory::Video);
        assert_eq!(
            determine_file_category("application/pdf"),
            FileCategory::Text
        );
    }

    #[test]
    fn test_case_insensitive() {
        assert_eq!(determine_file_category("Image/JPEG"), FileCategory::Photo);
    }

    #[test]
    fn test_unknown_and_empty() {
        assert_eq!(
            determine_file_category("application/octet-stream"),
            FileCategory::Unknown
        );
        assert_eq!(determine_file_category(""), FileCategory::Unknown);
    }

    #[test]
    fn test_wire_strings() {
        assert_eq!(FileCategory::Photo.as_str(), "photo");
        assert_eq!(FileCategory::Unknown.to_string(), "unknown");
    }
}
