use super::RepositoryRef;
use core::fmt::{Display, Formatter};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use strum::Display as StrumDisplay;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, StrumDisplay, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
}

/// Opaque handle telling the content fetcher where a file's raw bytes live.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentLocator(Arc<Url>);

impl ContentLocator {
    #[must_use]
    pub fn new(url: Url) -> Self {
        Self(Arc::new(url))
    }

    #[must_use]
    pub fn url(&self) -> &Url {
        &self.0
    }

    /// Last path segment of the locator, used as the download file name.
    #[must_use]
    pub fn file_name(&self) -> &str {
        self.0
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|name| !name.is_empty())
            .unwrap_or("download")
    }
}

impl Display for ContentLocator {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One file or directory within a repository snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    /// Repository-relative path using `/` separators.
    pub path: Arc<str>,
    pub kind: EntryKind,
    pub size: u64,
    /// Only files carry a locator.
    pub locator: Option<ContentLocator>,
}

impl TreeEntry {
    #[must_use]
    pub fn file(path: impl Into<Arc<str>>, size: u64, locator: ContentLocator) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::File,
            size,
            locator: Some(locator),
        }
    }

    #[must_use]
    pub fn directory(path: impl Into<Arc<str>>) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::Directory,
            size: 0,
            locator: None,
        }
    }

    #[must_use]
    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }
}

/// The full tree of a repository snapshot, sorted by path.
#[derive(Debug, Clone)]
pub struct TreeListing {
    pub reference: RepositoryRef,
    pub entries: Vec<TreeEntry>,
    /// The provider cut the listing short; some files are missing.
    pub truncated: bool,
}

impl TreeListing {
    /// The entries that participate in fetching and archiving.
    pub fn files(&self) -> impl Iterator<Item = &TreeEntry> {
        self.entries.iter().filter(|entry| entry.is_file())
    }

    #[must_use]
    pub fn file_count(&self) -> usize {
        self.files().count()
    }

    #[must_use]
    pub fn directory_count(&self) -> usize {
        self.entries.len() - self.file_count()
    }

    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        self.files().map(|entry| entry.size).sum()
    }

    /// Consume the listing, keeping only file entries in tree order.
    #[must_use]
    pub fn into_files(self) -> Vec<TreeEntry> {
        self.entries.into_iter().filter(TreeEntry::is_file).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn locator(path: &str) -> ContentLocator {
        ContentLocator::new(Url::parse(&format!("https://raw.example.com/o/r/HEAD/{path}")).unwrap())
    }

    fn listing() -> TreeListing {
        TreeListing {
            reference: RepositoryRef::new("o", "r", None).unwrap(),
            entries: vec![
                TreeEntry::file("README.md", 10, locator("README.md")),
                TreeEntry::directory("src"),
                TreeEntry::file("src/lib.rs", 32, locator("src/lib.rs")),
            ],
            truncated: false,
        }
    }

    #[test]
    fn test_files_excludes_directories() {
        let listing = listing();
        let paths: Vec<_> = listing.files().map(|e| e.path.as_ref()).collect();
        assert_eq!(paths, ["README.md", "src/lib.rs"]);
    }

    #[test]
    fn test_counts_and_total_bytes() {
        let listing = listing();
        assert_eq!(listing.file_count(), 2);
        assert_eq!(listing.directory_count(), 1);
        assert_eq!(listing.total_bytes(), 42);
    }

    #[test]
    fn test_into_files_preserves_order() {
        let files = listing().into_files();
        assert_eq!(files.len(), 2);
        assert_eq!(files[1].path.as_ref(), "src/lib.rs");
    }

    #[test]
    fn test_locator_file_name() {
        assert_eq!(locator("src/lib.rs").file_name(), "lib.rs");
        let bare = ContentLocator::new(Url::parse("https://raw.example.com/").unwrap());
        assert_eq!(bare.file_name(), "download");
    }

    #[test]
    fn test_entry_kind_display() {
        assert_eq!(EntryKind::File.to_string(), "file");
        assert_eq!(EntryKind::Directory.to_string(), "directory");
    }
}
