//! Directory entry metadata

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::path::Path;

/// Point-in-time snapshot of one directory entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    pub name: String,
    /// Absolute path of the entry
    pub path: String,
    pub is_directory: bool,
    /// Size in bytes (regular files only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    pub modified: Option<DateTime<Utc>>,
    /// Extension with leading dot, empty when there is none (regular files only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,
}

impl FileInfo {
    pub(crate) fn new(
        name: String,
        path: &Path,
        file_type: std::fs::FileType,
        metadata: Option<&std::fs::Metadata>,
    ) -> Self {
        let is_file = file_type.is_file();
        let extension = is_file.then(|| extension_of(&name));

        Self {
            path: path.display().to_string(),
            is_directory: file_type.is_dir(),
            size: if is_file {
                metadata.map(|m| m.len())
            } else {
                None
            },
            modified: metadata
                .and_then(|m| m.modified().ok())
                .map(DateTime::<Utc>::from),
            extension,
            name,
        }
    }
}

/// `.rs` for `main.rs`, empty for `Makefile` and `.bashrc`
pub fn extension_of(name: &str) -> String {
    Path::new(name)
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default()
}

/// Directories first, then case-insensitive by name (ties broken bytewise)
pub fn listing_order(a: &FileInfo, b: &FileInfo) -> Ordering {
    b.is_directory
        .cmp(&a.is_directory)
        .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
        .then_with(|| a.name.cmp(&b.name))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, is_directory: bool) -> FileInfo {
        FileInfo {
            name: name.to_string(),
            path: format!("/x/{}", name),
            is_directory,
            size: None,
            modified: None,
            extension: None,
        }
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("main.rs"), ".rs");
        assert_eq!(extension_of("archive.tar.gz"), ".gz");
        assert_eq!(extension_of("Makefile"), "");
        assert_eq!(extension_of(".bashrc"), "");
    }

    #[test]
    fn test_listing_order() {
        let mut entries = vec![
            entry("zeta.txt", false),
            entry("src", true),
            entry("Alpha.md", false),
            entry("beta", true),
            entry("alpha.md", false),
        ];
        entries.sort_by(listing_order);

        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["beta", "src", "Alpha.md", "alpha.md", "zeta.txt"]);
    }
}
