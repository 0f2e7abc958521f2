//! Direct file lookup for requests the route table does not know yet.
//!
//! The dev server consults the route table first; a handler created since
//! the last rebuild is still found here by probing `<path>.<ext>` and
//! `<path>/index.<ext>` under the handler root.
use std::{
    io,
    path::{Path, PathBuf},
};

use thiserror::Error;

use crate::core::matcher::{normalize_path, request_segments};

/// Error type for handler file lookups
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ResolveError {
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
}

/// Resolves request paths to handler files on disk.
#[derive(Debug, Clone)]
pub struct HandlerFileResolver {
    root: PathBuf,
    extensions: Vec<String>,
}

impl HandlerFileResolver {
    pub fn new(root: impl Into<PathBuf>, extensions: Vec<String>) -> Self {
        Self {
            root: root.into(),
            extensions,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Probe the handler root for `route_path` (already stripped of the API prefix).
    ///
    /// Tries `<path>.<ext>` for every extension, then `<path>/index.<ext>`.
    /// The root path `/` only resolves to `index.<ext>`. Segments that are
    /// empty, hidden, private (`_` prefix) or `..` never resolve.
    pub async fn resolve(&self, route_path: &str) -> Result<Option<PathBuf>, ResolveError> {
        let segments = request_segments(normalize_path(route_path));
        if let Some(segment) = segments.iter().find(|segment| !is_servable_segment(segment)) {
            return Err(ResolveError::InvalidPath(format!(
                "segment '{segment}' cannot name a handler"
            )));
        }

        let base = segments
            .iter()
            .fold(self.root.clone(), |path, segment| path.join(segment));

        let mut candidates = Vec::with_capacity(self.extensions.len() * 2);
        if !segments.is_empty() {
            candidates.extend(self.extensions.iter().map(|ext| with_extension(&base, ext)));
        }
        candidates.extend(
            self.extensions
                .iter()
                .map(|ext| base.join(format!("index.{ext}"))),
        );

        for candidate in candidates {
            match tokio::fs::metadata(&candidate).await {
                Ok(metadata) if metadata.is_file() => {
                    self.ensure_within_root(&candidate).await?;
                    return Ok(Some(candidate));
                }
                Ok(_) => continue,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) if e.kind() == io::ErrorKind::NotADirectory => continue,
                Err(e) => return Err(ResolveError::IoError(e)),
            }
        }

        Ok(None)
    }

    /// Reject files that resolve outside the root through symlinks.
    async fn ensure_within_root(&self, path: &Path) -> Result<(), ResolveError> {
        let canonical_root = tokio::fs::canonicalize(&self.root).await?;
        let canonical_path = tokio::fs::canonicalize(path).await?;

        if !canonical_path.starts_with(&canonical_root) {
            return Err(ResolveError::InvalidPath(
                "Path traversal attempt detected".to_string(),
            ));
        }
        Ok(())
    }
}

fn is_servable_segment(segment: &str) -> bool {
    !segment.is_empty() && !segment.starts_with('_') && !segment.starts_with('.')
}

fn with_extension(base: &Path, ext: &str) -> PathBuf {
    let mut path = base.as_os_str().to_owned();
    path.push(".");
    path.push(ext);
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    fn resolver(dir: &TempDir) -> HandlerFileResolver {
        HandlerFileResolver::new(dir.path(), vec!["ts".to_string(), "js".to_string()])
    }

    fn touch(dir: &TempDir, relative: &str) {
        let path = dir.path().join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "export const GET = () => ({});").unwrap();
    }

    #[tokio::test]
    async fn test_resolve_direct_file() {
        let dir = TempDir::new().unwrap();
        touch(&dir, "hello.ts");

        let found = resolver(&dir).resolve("/hello").await.unwrap();
        assert_eq!(found, Some(dir.path().join("hello.ts")));
    }

    #[tokio::test]
    async fn test_resolve_prefers_extension_order() {
        let dir = TempDir::new().unwrap();
        touch(&dir, "hello.js");
        touch(&dir, "hello.ts");

        let found = resolver(&dir).resolve("/hello/").await.unwrap();
        assert_eq!(found, Some(dir.path().join("hello.ts")));
    }

    #[tokio::test]
    async fn test_resolve_directory_index() {
        let dir = TempDir::new().unwrap();
        touch(&dir, "users/index.js");
        touch(&dir, "index.ts");

        let resolver = resolver(&dir);
        assert_eq!(
            resolver.resolve("/users").await.unwrap(),
            Some(dir.path().join("users/index.js"))
        );
        assert_eq!(
            resolver.resolve("/").await.unwrap(),
            Some(dir.path().join("index.ts"))
        );
    }

    #[tokio::test]
    async fn test_resolve_missing() {
        let dir = TempDir::new().unwrap();
        touch(&dir, "hello.ts");
        assert_eq!(resolver(&dir).resolve("/nope").await.unwrap(), None);
        assert_eq!(resolver(&dir).resolve("/hello/deeper").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_resolve_rejects_private_and_hidden_segments() {
        let dir = TempDir::new().unwrap();
        touch(&dir, "_internal.ts");
        touch(&dir, ".secret.ts");

        let resolver = resolver(&dir);
        assert!(matches!(
            resolver.resolve("/_internal").await,
            Err(ResolveError::InvalidPath(_))
        ));
        assert!(matches!(
            resolver.resolve("/.secret").await,
            Err(ResolveError::InvalidPath(_))
        ));
        assert!(matches!(
            resolver.resolve("/../etc/passwd").await,
            Err(ResolveError::InvalidPath(_))
        ));
        assert!(matches!(
            resolver.resolve("/users//").await,
            Err(ResolveError::InvalidPath(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_resolve_rejects_symlink_escape() {
        let outside = TempDir::new().unwrap();
        fs::write(outside.path().join("leak.ts"), "export const GET = 1;").unwrap();

        let dir = TempDir::new().unwrap();
        std::os::unix::fs::symlink(outside.path().join("leak.ts"), dir.path().join("leak.ts"))
            .unwrap();

        assert!(matches!(
            resolver(&dir).resolve("/leak").await,
            Err(ResolveError::InvalidPath(_))
        ));
    }
}
