//! Content metadata carried by file entries only.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Describes the blob behind a file entry.
///
/// Directories never carry metadata; a file always has exactly one record.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct FileMetadata {
    /// Transfer encoding reported by the uploader (e.g. `7bit`).
    pub encoding: String,

    /// Content type (MIME type).
    pub mime_type: String,

    /// Size in bytes.
    pub size_bytes: i64,

    /// Blob-store path of the content.
    pub storage_path: String,
}

impl FileMetadata {
    /// Extension of the stored blob, without the leading dot.
    pub fn stored_extension(&self) -> Option<&str> {
        Path::new(&self.storage_path)
            .extension()
            .and_then(|ext| ext.to_str())
            .filter(|ext| !ext.is_empty())
    }

    /// Size rendered for people, up to gigabytes.
    pub fn human_size(&self) -> String {
        humanize_size(self.size_bytes)
    }
}

const SIZE_UNITS: [(&str, i64); 3] = [
    ("GB", 1024 * 1024 * 1024),
    ("MB", 1024 * 1024),
    ("KB", 1024),
];

/// Format a byte count as `1.50 MB`, falling back to `N bytes` below 1 KB.
pub fn humanize_size(size: i64) -> String {
    for (unit, value) in SIZE_UNITS {
        if size >= value {
            return format!("{:.2} {}", size as f64 / value as f64, unit);
        }
    }
    format!("{} bytes", size)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(path: &str) -> FileMetadata {
        FileMetadata {
            encoding: "7bit".into(),
            mime_type: "text/plain".into(),
            size_bytes: 0,
            storage_path: path.into(),
        }
    }

    #[test]
    fn test_humanize_size() {
        assert_eq!(humanize_size(0), "0 bytes");
        assert_eq!(humanize_size(1023), "1023 bytes");
        assert_eq!(humanize_size(1024), "1.00 KB");
        assert_eq!(humanize_size(1536), "1.50 KB");
        assert_eq!(humanize_size(5 * 1024 * 1024), "5.00 MB");
        assert_eq!(humanize_size(3 * 1024 * 1024 * 1024), "3.00 GB");
    }

    #[test]
    fn test_stored_extension() {
        assert_eq!(meta("uploads/bob/a_1.pdf").stored_extension(), Some("pdf"));
        assert_eq!(meta("uploads/bob/a_1.tar.gz").stored_extension(), Some("gz"));
        assert_eq!(meta("uploads/bob/a_1").stored_extension(), None);
    }
}
