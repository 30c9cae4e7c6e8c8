use super::SnapshotError;
use core::fmt::{Display, Formatter};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use url::Url;

/// Revision used when the URL does not name one.
pub const DEFAULT_REVISION: &str = "HEAD";

/// Identifies a snapshot of a repository on the hosting provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepositoryRef {
    owner: Arc<str>,
    name: Arc<str>,
    revision: Arc<str>,
}

impl RepositoryRef {
    /// Build a reference from its parts, validating each identifier.
    pub fn new(owner: &str, name: &str, revision: Option<&str>) -> Result<Self, SnapshotError> {
        let name = name.strip_suffix(".git").unwrap_or(name);

        if !is_identifier(owner) {
            return Err(SnapshotError::InvalidReference(format!("malformed owner '{owner}'")));
        }

        if !is_identifier(name) {
            return Err(SnapshotError::InvalidReference(format!("malformed repository name '{name}'")));
        }

        let revision = match revision {
            Some(rev) if !is_revision(rev) => {
                return Err(SnapshotError::InvalidReference(format!("malformed revision '{rev}'")));
            }
            Some(rev) => rev,
            None => DEFAULT_REVISION,
        };

        Ok(Self {
            owner: Arc::from(owner),
            name: Arc::from(name),
            revision: Arc::from(revision),
        })
    }

    /// Parse a repository URL such as `https://github.com/owner/name/tree/main`.
    ///
    /// Only URLs on `host` are accepted. A `/tree/<rev>` or `/commit/<rev>` suffix selects
    /// the revision; anything past the revision (a sub-directory) is ignored.
    pub fn parse(input: &str, host: &str) -> Result<Self, SnapshotError> {
        let url = Url::parse(input.trim()).map_err(|e| SnapshotError::InvalidReference(format!("'{input}' is not a URL: {e}")))?;

        if !matches!(url.scheme(), "https" | "http") {
            return Err(SnapshotError::InvalidReference(format!("unsupported scheme in '{input}'")));
        }

        let url_host = url.host_str().unwrap_or_default();
        if !url_host.eq_ignore_ascii_case(host) && !url_host.eq_ignore_ascii_case(&format!("www.{host}")) {
            return Err(SnapshotError::InvalidReference(format!("'{input}' is not a {host} repository URL")));
        }

        let segments: Vec<_> = url.path_segments().map(Iterator::collect).unwrap_or_default();

        let (owner, name) = match segments.as_slice() {
            [owner, name, ..] if !owner.is_empty() && !name.is_empty() => (*owner, *name),
            _ => {
                return Err(SnapshotError::InvalidReference(format!("'{input}' is missing the owner or repository name")));
            }
        };

        let revision = match segments.get(2..) {
            Some(["tree" | "commit", rev, ..]) if !rev.is_empty() => Some(*rev),
            _ => None,
        };

        Self::new(owner, name, revision)
    }

    #[must_use]
    pub fn owner(&self) -> &str {
        &self.owner
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn revision(&self) -> &str {
        &self.revision
    }

    /// File stem for the archive of this snapshot, e.g. `tokio-master`.
    #[must_use]
    pub fn archive_stem(&self) -> String {
        format!("{}-{}", self.name, self.revision.replace('/', "-"))
    }
}

impl Display for RepositoryRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}/{}@{}", self.owner, self.name, self.revision)
    }
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty()
        && s != "."
        && s != ".."
        && s.bytes().all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'))
}

fn is_revision(s: &str) -> bool {
    !s.is_empty()
        && !s.starts_with('/')
        && !s.contains("..")
        && s.bytes().all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOST: &str = "github.com";

    #[test]
    fn test_parse_github_url() {
        let reference = RepositoryRef::parse("https://github.com/tokio-rs/tokio", HOST).unwrap();

        assert_eq!(reference.owner(), "tokio-rs");
        assert_eq!(reference.name(), "tokio");
        assert_eq!(reference.revision(), DEFAULT_REVISION);
    }

    #[test]
    fn test_parse_url_with_git_extension() {
        let reference = RepositoryRef::parse("https://github.com/serde-rs/serde.git", HOST).unwrap();

        assert_eq!(reference.owner(), "serde-rs");
        assert_eq!(reference.name(), "serde"); // .git should be stripped
    }

    #[test]
    fn test_parse_url_with_tree_revision() {
        let reference = RepositoryRef::parse("https://github.com/tokio-rs/tokio/tree/master", HOST).unwrap();

        assert_eq!(reference.name(), "tokio");
        assert_eq!(reference.revision(), "master");
    }

    #[test]
    fn test_parse_url_with_deep_path_keeps_revision() {
        let reference = RepositoryRef::parse("https://github.com/tokio-rs/tokio/tree/v1.0.0/tokio-util/src", HOST).unwrap();

        assert_eq!(reference.revision(), "v1.0.0");
    }

    #[test]
    fn test_parse_url_with_commit_revision() {
        let reference = RepositoryRef::parse("https://github.com/a/b/commit/0123abcd", HOST).unwrap();
        assert_eq!(reference.revision(), "0123abcd");
    }

    #[test]
    fn test_parse_url_with_unrelated_suffix_uses_default_revision() {
        let reference = RepositoryRef::parse("https://github.com/a/b/issues/12", HOST).unwrap();
        assert_eq!(reference.revision(), DEFAULT_REVISION);
    }

    #[test]
    fn test_parse_accepts_www_and_trailing_slash() {
        let reference = RepositoryRef::parse("https://www.github.com/a/b/", HOST).unwrap();
        assert_eq!(reference.owner(), "a");
        assert_eq!(reference.name(), "b");
    }

    #[test]
    fn test_parse_rejects_non_url() {
        let err = RepositoryRef::parse("not-a-url", HOST).unwrap_err();
        assert!(matches!(err, SnapshotError::InvalidReference(_)));
    }

    #[test]
    fn test_parse_rejects_other_host() {
        let err = RepositoryRef::parse("https://gitlab.com/a/b", HOST).unwrap_err();
        assert!(matches!(err, SnapshotError::InvalidReference(_)));
    }

    #[test]
    fn test_parse_rejects_unsupported_scheme() {
        let err = RepositoryRef::parse("ftp://github.com/a/b", HOST).unwrap_err();
        assert!(matches!(err, SnapshotError::InvalidReference(_)));
    }

    #[test]
    fn test_parse_invalid_url_missing_segments() {
        let _ = RepositoryRef::parse("https://github.com/", HOST).unwrap_err();
        let _ = RepositoryRef::parse("https://github.com/tokio-rs", HOST).unwrap_err();
        let _ = RepositoryRef::parse("https://github.com//tokio", HOST).unwrap_err();
    }

    #[test]
    fn test_parse_rejects_malformed_owner() {
        let err = RepositoryRef::parse("https://github.com/to%20kio/tokio", HOST).unwrap_err();
        assert!(matches!(err, SnapshotError::InvalidReference(_)));
    }

    #[test]
    fn test_new_rejects_dot_segments() {
        let _ = RepositoryRef::new("..", "repo", None).unwrap_err();
        let _ = RepositoryRef::new("owner", ".", None).unwrap_err();
        let _ = RepositoryRef::new("owner", "repo", Some("../main")).unwrap_err();
    }

    #[test]
    fn test_archive_stem_flattens_branch_slashes() {
        let reference = RepositoryRef::new("o", "repo", Some("feature/zip")).unwrap();
        assert_eq!(reference.archive_stem(), "repo-feature-zip");
    }

    #[test]
    fn test_display_trait() {
        let reference = RepositoryRef::new("tokio-rs", "tokio", Some("master")).unwrap();
        assert_eq!(reference.to_string(), "tokio-rs/tokio@master");
    }

    #[test]
    fn test_same_repo_different_paths_are_equal() {
        let first = RepositoryRef::parse("https://github.com/tokio-rs/tokio/tree/master/tokio", HOST).unwrap();
        let second = RepositoryRef::parse("https://github.com/tokio-rs/tokio/tree/master/tokio-util", HOST).unwrap();

        assert_eq!(first, second);
    }
}
