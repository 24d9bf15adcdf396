//! Finding input images in a directory.

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::ProcessingConfig;

/// Lists the supported image files directly inside a directory.
pub struct FileDiscovery {
    config: ProcessingConfig,
}

/// A file picked up for processing.
#[derive(Debug, Clone)]
pub struct DiscoveredFile {
    /// Full path to the file
    pub path: PathBuf,
    /// File name, used as the report key
    pub file_name: String,
    /// File size in bytes
    pub size: u64,
}

impl FileDiscovery {
    pub fn new(config: ProcessingConfig) -> Self {
        Self { config }
    }

    /// Supported files in `dir`, sorted by file name.
    ///
    /// Subdirectories (including the output directory) are not entered.
    pub fn discover(&self, dir: &Path) -> Vec<DiscoveredFile> {
        let mut files: Vec<DiscoveredFile> = WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|entry| entry.file_type().is_file() && self.is_supported(entry.path()))
            .filter_map(|entry| {
                let size = entry.metadata().ok()?.len();
                Some(DiscoveredFile {
                    file_name: entry.file_name().to_string_lossy().into_owned(),
                    path: entry.into_path(),
                    size,
                })
            })
            .collect();

        files.sort_by(|a, b| a.file_name.cmp(&b.file_name));
        files
    }

    /// Check if a file has a supported extension.
    fn is_supported(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                self.config
                    .supported_formats
                    .iter()
                    .any(|fmt| fmt.eq_ignore_ascii_case(ext))
            })
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_supported() {
        let discovery = FileDiscovery::new(ProcessingConfig::default());

        assert!(discovery.is_supported(Path::new("scan.jpg")));
        assert!(discovery.is_supported(Path::new("scan.JPG")));
        assert!(discovery.is_supported(Path::new("scan.jpeg")));
        assert!(discovery.is_supported(Path::new("scan.png")));
        assert!(discovery.is_supported(Path::new("scan.Bmp")));
        assert!(!discovery.is_supported(Path::new("scan.webp")));
        assert!(!discovery.is_supported(Path::new("notes.txt")));
        assert!(!discovery.is_supported(Path::new("README")));
    }

    #[test]
    fn test_discover_is_flat_and_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.png", "a.JPG", "c.txt"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        std::fs::create_dir(dir.path().join("output")).unwrap();
        std::fs::write(dir.path().join("output").join("a.png"), b"x").unwrap();

        let files = FileDiscovery::new(ProcessingConfig::default()).discover(dir.path());
        let names: Vec<&str> = files.iter().map(|f| f.file_name.as_str()).collect();
        assert_eq!(names, vec!["a.JPG", "b.png"]);
        assert_eq!(files[0].size, 1);
    }

    #[test]
    fn test_configured_formats() {
        let config = ProcessingConfig {
            supported_formats: vec!["png".into()],
        };
        let discovery = FileDiscovery::new(config);
        assert!(discovery.is_supported(Path::new("scan.PNG")));
        assert!(!discovery.is_supported(Path::new("scan.jpg")));
    }
}
