use crate::error::{Result, ValidationError};
use ignore::WalkBuilder;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Collects the documents named on the command line
///
/// Files are taken as given. Directories are walked with `ignore`, so
/// `.gitignore` rules and hidden entries are honoured, and only files with
/// one of the configured extensions are kept.
#[derive(Debug, Clone)]
pub struct FileDiscovery {
    /// Lower-case extensions without the dot
    extensions: Vec<String>,
    max_depth: Option<usize>,
    follow_symlinks: bool,
}

impl FileDiscovery {
    pub fn new() -> Self {
        Self {
            extensions: vec!["kml".to_string()],
            max_depth: None,
            follow_symlinks: false,
        }
    }

    pub fn with_extensions(mut self, extensions: Vec<String>) -> Self {
        self.extensions = extensions
            .into_iter()
            .map(|ext| ext.trim_start_matches('.').to_lowercase())
            .collect();
        self
    }

    pub fn with_max_depth(mut self, depth: Option<usize>) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn with_follow_symlinks(mut self, follow: bool) -> Self {
        self.follow_symlinks = follow;
        self
    }

    /// Discover documents under every path, keeping argument order. Files
    /// inside one directory are sorted by name.
    pub fn discover(&self, paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for path in paths {
            files.extend(self.discover_files(path)?);
        }
        files.dedup();
        Ok(files)
    }

    /// Discover documents in a single path (file or directory)
    pub fn discover_files(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let metadata = std::fs::metadata(path).map_err(ValidationError::from)?;
        if metadata.is_file() {
            return Ok(vec![path.to_path_buf()]);
        }

        let mut files = Vec::new();
        let walker = WalkBuilder::new(path)
            .max_depth(self.max_depth)
            .follow_links(self.follow_symlinks)
            .sort_by_file_name(|a, b| a.cmp(b))
            .build();

        for entry in walker {
            match entry {
                Ok(entry) => {
                    let is_file = entry.file_type().is_some_and(|t| t.is_file());
                    if is_file && self.should_process(entry.path()) {
                        files.push(entry.into_path());
                    }
                }
                Err(err) => warn!(root = %path.display(), error = %err, "skipping unreadable entry"),
            }
        }
        debug!(root = %path.display(), files = files.len(), "discovered documents");
        Ok(files)
    }

    /// Check if a file found while walking matches the extension list
    pub fn should_process(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.extensions.contains(&ext.to_lowercase()))
    }
}

impl Default for FileDiscovery {
    fn default() -> Self {
        Self::new()
    }
}
