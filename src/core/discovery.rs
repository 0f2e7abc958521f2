//! Handler file discovery.
//!
//! Walks the handler root and yields every routable source file in a
//! stable (lexicographic, depth-first) order. A file is routable when its
//! extension is eligible, no segment of its relative path starts with `_`,
//! and its relative path only uses the allowed character set.
use std::{
    ffi::OsStr,
    path::{Path, PathBuf},
};

use walkdir::{DirEntry, WalkDir};

use crate::core::{route_table::RouteError, translator::is_allowed_path};

const IGNORED_DIRS: &[&str] = &["node_modules"];

/// A routable handler file found under the handler root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerFile {
    /// Path on disk (root joined with `relative`).
    pub path: PathBuf,
    /// Path relative to the handler root, as found on disk.
    pub relative: String,
}

/// Whether a single file name may be a handler (eligible extension, no `_` prefix).
pub fn is_route_file_name(name: &OsStr, extensions: &[String]) -> bool {
    let Some(name) = name.to_str() else {
        return false;
    };
    if name.starts_with('_') {
        return false;
    }
    Path::new(name)
        .extension()
        .and_then(OsStr::to_str)
        .is_some_and(|ext| extensions.iter().any(|allowed| allowed == ext))
}

/// Whether a directory name may contain handlers.
pub fn is_route_dir_name(name: &OsStr) -> bool {
    name.to_str()
        .is_some_and(|name| !name.starts_with('_') && !IGNORED_DIRS.contains(&name))
}

/// Discover every routable handler file under `root`.
pub fn discover(root: &Path, extensions: &[String]) -> Result<Vec<HandlerFile>, RouteError> {
    let mut files = Vec::new();

    let walker = WalkDir::new(root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || is_walkable(entry));

    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() || !is_route_file_name(entry.file_name(), extensions) {
            continue;
        }

        let relative = match entry.path().strip_prefix(root).ok().and_then(Path::to_str) {
            Some(relative) => relative.to_string(),
            None => {
                tracing::debug!("Skipping non UTF-8 handler path {}", entry.path().display());
                continue;
            }
        };

        if !is_allowed_path(&relative) {
            tracing::debug!("Skipping handler with unsupported characters: {}", relative);
            continue;
        }

        files.push(HandlerFile {
            path: entry.path().to_path_buf(),
            relative,
        });
    }

    Ok(files)
}

fn is_walkable(entry: &DirEntry) -> bool {
    if entry.file_type().is_dir() {
        is_route_dir_name(entry.file_name())
    } else {
        !entry.file_name().to_string_lossy().starts_with('_')
    }
}
