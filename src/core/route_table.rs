//! Route table built from the handler tree.
//!
//! A [`RouteTable`] is an immutable value once built: rebuilds produce a new
//! table which is published through a [`RouteTableHandle`]. Readers take a
//! snapshot (`Arc<RouteTable>`) per request and therefore never see a
//! partially rebuilt table.
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::{
    discovery::{self, HandlerFile},
    translator::{self, Dialect},
};

/// Errors produced while building a route table.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum RouteError {
    #[error("Handler directory not found: {}", .0.display())]
    MissingRoot(PathBuf),

    #[error("Failed to scan handler directory: {0}")]
    Walk(#[from] walkdir::Error),

    #[error(
        "Route '{pattern}' is defined by both {} and {}",
        .existing.display(),
        .incoming.display()
    )]
    Collision {
        pattern: String,
        existing: PathBuf,
        incoming: PathBuf,
    },

    #[error("Route '{pattern}' from {} repeats parameter '{name}'", .file.display())]
    DuplicateParam {
        pattern: String,
        file: PathBuf,
        name: String,
    },
}

/// What happens when two handler files normalise to the same pattern.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollisionPolicy {
    /// The later-discovered file replaces the earlier one.
    #[default]
    LastWriteWins,
    /// A collision is an error.
    Reject,
}

/// A single routable handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteEntry {
    source_file: PathBuf,
    pattern: String,
    param_names: Vec<String>,
}

impl RouteEntry {
    /// Build the entry for a discovered handler file (colon dialect).
    pub fn from_file(file: &HandlerFile) -> Result<Self, RouteError> {
        let pattern = translator::translate(&file.relative, Dialect::Colon);
        let param_names = translator::param_names(&pattern, Dialect::Colon);

        for (i, name) in param_names.iter().enumerate() {
            if param_names[..i].contains(name) {
                return Err(RouteError::DuplicateParam {
                    pattern,
                    file: file.path.clone(),
                    name: name.clone(),
                });
            }
        }

        Ok(Self {
            source_file: file.path.clone(),
            pattern,
            param_names,
        })
    }

    pub fn source_file(&self) -> &Path {
        &self.source_file
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn param_names(&self) -> &[String] {
        &self.param_names
    }
}

/// Options controlling how a handler tree is scanned into a table.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub extensions: Vec<String>,
    pub collision: CollisionPolicy,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            extensions: vec!["ts".to_string(), "js".to_string()],
            collision: CollisionPolicy::default(),
        }
    }
}

/// Insertion-ordered mapping from colon-dialect pattern to [`RouteEntry`].
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    entries: Vec<RouteEntry>,
    index: HashMap<String, usize>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan `root` and build a fresh table.
    pub fn scan(root: &Path, options: &ScanOptions) -> Result<Self, RouteError> {
        if !root.is_dir() {
            return Err(RouteError::MissingRoot(root.to_path_buf()));
        }
        let files = discovery::discover(root, &options.extensions)?;
        Self::from_files(&files, options.collision)
    }

    /// Build a table from already discovered files, in the given order.
    ///
    /// Files whose path repeats a parameter name are skipped with a warning.
    pub fn from_files(files: &[HandlerFile], collision: CollisionPolicy) -> Result<Self, RouteError> {
        let mut table = Self::new();
        for file in files {
            match RouteEntry::from_file(file) {
                Ok(entry) => {
                    table.insert(entry, collision)?;
                }
                Err(RouteError::DuplicateParam { pattern, file, name }) => {
                    tracing::warn!(
                        "Skipping {}: route '{}' repeats parameter '{}'",
                        file.display(),
                        pattern,
                        name
                    );
                }
                Err(e) => return Err(e),
            }
        }
        Ok(table)
    }

    /// Insert an entry, applying `collision` when its pattern already exists.
    ///
    /// A replaced entry keeps the original iteration position and is returned.
    pub fn insert(
        &mut self,
        entry: RouteEntry,
        collision: CollisionPolicy,
    ) -> Result<Option<RouteEntry>, RouteError> {
        match self.index.get(entry.pattern()) {
            Some(&position) => {
                let existing = &self.entries[position];
                if collision == CollisionPolicy::Reject {
                    return Err(RouteError::Collision {
                        pattern: entry.pattern.clone(),
                        existing: existing.source_file.clone(),
                        incoming: entry.source_file.clone(),
                    });
                }
                tracing::debug!(
                    "Route '{}' from {} replaces {}",
                    entry.pattern,
                    entry.source_file.display(),
                    existing.source_file.display()
                );
                Ok(Some(std::mem::replace(&mut self.entries[position], entry)))
            }
            None => {
                self.index.insert(entry.pattern.clone(), self.entries.len());
                self.entries.push(entry);
                Ok(None)
            }
        }
    }

    /// Entry stored under exactly `pattern`.
    pub fn get(&self, pattern: &str) -> Option<&RouteEntry> {
        self.index.get(pattern).map(|&i| &self.entries[i])
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &RouteEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Owner of the currently installed route table.
///
/// Cheap to clone; every clone observes the same table.
#[derive(Debug, Clone, Default)]
pub struct RouteTableHandle {
    current: Arc<ArcSwap<RouteTable>>,
}

impl RouteTableHandle {
    pub fn new(table: RouteTable) -> Self {
        Self {
            current: Arc::new(ArcSwap::from_pointee(table)),
        }
    }

    /// Snapshot of the installed table.
    pub fn load(&self) -> Arc<RouteTable> {
        self.current.load_full()
    }

    /// Atomically replace the installed table.
    pub fn publish(&self, table: Arc<RouteTable>) {
        self.current.store(table);
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    fn file(relative: &str) -> HandlerFile {
        HandlerFile {
            path: PathBuf::from("/api").join(relative),
            relative: relative.to_string(),
        }
    }

    #[test]
    fn test_from_files_builds_entries() {
        let table = RouteTable::from_files(
            &[file("hello.ts"), file("sub/[id].ts"), file("index.ts")],
            CollisionPolicy::LastWriteWins,
        )
        .unwrap();

        assert_eq!(table.len(), 3);
        let entry = table.get("/sub/:id").unwrap();
        assert_eq!(entry.param_names(), ["id".to_string()]);
        assert_eq!(entry.source_file(), Path::new("/api/sub/[id].ts"));
        assert!(table.get("/").is_some());

        let order: Vec<_> = table.iter().map(RouteEntry::pattern).collect();
        assert_eq!(order, vec!["/hello", "/sub/:id", "/"]);
    }

    #[test]
    fn test_last_write_wins_keeps_position() {
        let table = RouteTable::from_files(
            &[file("sub.ts"), file("other.ts"), file("sub/index.ts")],
            CollisionPolicy::LastWriteWins,
        )
        .unwrap();

        assert_eq!(table.len(), 2);
        assert_eq!(
            table.get("/sub").unwrap().source_file(),
            Path::new("/api/sub/index.ts")
        );
        let order: Vec<_> = table.iter().map(RouteEntry::pattern).collect();
        assert_eq!(order, vec!["/sub", "/other"]);
    }

    #[test]
    fn test_reject_collision() {
        let result = RouteTable::from_files(
            &[file("a.b.ts"), file("a-b.ts")],
            CollisionPolicy::Reject,
        );
        match result {
            Err(RouteError::Collision { pattern, .. }) => assert_eq!(pattern, "/a-b"),
            other => panic!("expected collision, got {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_params_are_skipped() {
        let table = RouteTable::from_files(
            &[file("[id]/[id].ts"), file("ok.ts")],
            CollisionPolicy::LastWriteWins,
        )
        .unwrap();
        assert_eq!(table.len(), 1);
        assert!(table.get("/ok").is_some());
    }

    #[test]
    fn test_scan_missing_root() {
        let dir = TempDir::new().unwrap();
        let result = RouteTable::scan(&dir.path().join("api"), &ScanOptions::default());
        assert!(matches!(result, Err(RouteError::MissingRoot(_))));
    }

    #[test]
    fn test_scan_directory() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("hello.ts"), "").unwrap();
        fs::write(dir.path().join("sub/[id].ts"), "").unwrap();
        fs::write(dir.path().join("_utils.ts"), "").unwrap();

        let table = RouteTable::scan(dir.path(), &ScanOptions::default()).unwrap();
        assert_eq!(table.len(), 2);
        assert!(table.get("/hello").is_some());
        assert!(table.get("/sub/:id").is_some());
    }

    #[test]
    fn test_handle_publish_swaps_snapshot() {
        let handle = RouteTableHandle::default();
        let before = handle.load();
        assert!(before.is_empty());

        let table = RouteTable::from_files(&[file("hello.ts")], CollisionPolicy::LastWriteWins)
            .unwrap();
        handle.clone().publish(Arc::new(table));

        assert!(before.is_empty());
        assert_eq!(handle.load().len(), 1);
    }
}
