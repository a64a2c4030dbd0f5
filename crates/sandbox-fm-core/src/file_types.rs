//! File classification by extension and by content.
//!
//! Two independent views of a file:
//! - [`FileCategory`], a lookup table from extension to a coarse category tag
//!   that presentation layers map to icons or colours.
//! - [`ContentKind`], a content sniff using magic numbers (via the `infer`
//!   crate) plus a NUL-byte and UTF-8 check, deciding whether a file can be
//!   searched as text.

use serde::{Deserialize, Serialize};

/// Bytes inspected for magic-number detection.
pub const MAX_DETECTION_BYTES: usize = 8192;

/// Coarse file category derived from the extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileCategory {
    Folder,
    Text,
    Code,
    Image,
    Audio,
    Video,
    Archive,
    Document,
    Data,
    Other,
}

const EXTENSION_TABLE: &[(&str, FileCategory)] = &[
    ("txt", FileCategory::Text),
    ("md", FileCategory::Text),
    ("log", FileCategory::Text),
    ("rtf", FileCategory::Text),
    ("rs", FileCategory::Code),
    ("swift", FileCategory::Code),
    ("py", FileCategory::Code),
    ("js", FileCategory::Code),
    ("ts", FileCategory::Code),
    ("c", FileCategory::Code),
    ("h", FileCategory::Code),
    ("cpp", FileCategory::Code),
    ("sh", FileCategory::Code),
    ("html", FileCategory::Code),
    ("css", FileCategory::Code),
    ("png", FileCategory::Image),
    ("jpg", FileCategory::Image),
    ("jpeg", FileCategory::Image),
    ("gif", FileCategory::Image),
    ("webp", FileCategory::Image),
    ("heic", FileCategory::Image),
    ("svg", FileCategory::Image),
    ("mp3", FileCategory::Audio),
    ("m4a", FileCategory::Audio),
    ("wav", FileCategory::Audio),
    ("flac", FileCategory::Audio),
    ("mp4", FileCategory::Video),
    ("mov", FileCategory::Video),
    ("mkv", FileCategory::Video),
    ("zip", FileCategory::Archive),
    ("ipa", FileCategory::Archive),
    ("gz", FileCategory::Archive),
    ("tar", FileCategory::Archive),
    ("7z", FileCategory::Archive),
    ("pdf", FileCategory::Document),
    ("doc", FileCategory::Document),
    ("docx", FileCategory::Document),
    ("json", FileCategory::Data),
    ("plist", FileCategory::Data),
    ("xml", FileCategory::Data),
    ("yaml", FileCategory::Data),
    ("yml", FileCategory::Data),
    ("toml", FileCategory::Data),
    ("csv", FileCategory::Data),
];

impl FileCategory {
    /// Look up the category for an extension (case-insensitive, no dot).
    #[must_use]
    pub fn from_extension(extension: &str) -> Self {
        let extension = extension.to_ascii_lowercase();
        EXTENSION_TABLE
            .iter()
            .find(|(ext, _)| *ext == extension)
            .map_or(Self::Other, |(_, category)| *category)
    }

    /// Category for a file name (`Other` when it has no extension).
    #[must_use]
    pub fn from_file_name(name: &str) -> Self {
        match crate::naming::split_name(name) {
            (_, Some(ext)) => Self::from_extension(ext),
            (_, None) => Self::Other,
        }
    }
}

/// Whether content can be treated as text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Text,
    Binary,
}

/// Classify a prefix of a file's content.
///
/// Known binary signatures and NUL bytes mean binary; text-like signatures
/// (HTML, XML, shell scripts) count as text.
#[must_use]
pub fn classify_bytes(content: &[u8]) -> ContentKind {
    let head = &content[..content.len().min(MAX_DETECTION_BYTES)];

    if let Some(detected) = infer::get(head)
        && detected.matcher_type() != infer::MatcherType::Text
    {
        return ContentKind::Binary;
    }

    if head.contains(&0) {
        ContentKind::Binary
    } else {
        ContentKind::Text
    }
}

/// Decode `content` as UTF-8 text if it looks like text.
#[must_use]
pub fn decode_text(content: &[u8]) -> Option<&str> {
    match classify_bytes(content) {
        ContentKind::Text => std::str::from_utf8(content).ok(),
        ContentKind::Binary => None,
    }
}
