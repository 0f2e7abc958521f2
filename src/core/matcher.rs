//! Request path → route entry resolution.
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::core::{
    route_table::{RouteEntry, RouteTable},
    translator::{Dialect, split_segments},
};

/// How to choose between several parametrized patterns matching one path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// The first matching pattern in table order wins.
    #[default]
    InsertionOrder,
    /// Literal segments outrank parameters, compared left to right; equal
    /// candidates fall back to table order.
    Specificity,
}

/// A matched route together with its bound parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch<'a> {
    pub entry: &'a RouteEntry,
    pub params: HashMap<String, String>,
}

/// Strip one trailing slash; the root stays `/`.
pub fn normalize_path(path: &str) -> &str {
    match path.strip_suffix('/').unwrap_or(path) {
        "" => "/",
        trimmed => trimmed,
    }
}

/// Segments of a normalized request path. Unlike pattern segments, empty
/// segments (`/a//b`) are kept so they can never bind a parameter.
pub fn request_segments(path: &str) -> Vec<&str> {
    match path.strip_prefix('/').unwrap_or(path) {
        "" => Vec::new(),
        rest => rest.split('/').collect(),
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RouteMatcher {
    tie_break: TieBreak,
}

impl RouteMatcher {
    pub fn new(tie_break: TieBreak) -> Self {
        Self { tie_break }
    }

    /// Resolve `path` against `table`.
    ///
    /// An exact pattern match wins outright; otherwise patterns with the same
    /// segment count are compared segment by segment.
    pub fn find<'a>(&self, path: &str, table: &'a RouteTable) -> Option<RouteMatch<'a>> {
        let path = normalize_path(path);

        if let Some(entry) = table.get(path) {
            return Some(RouteMatch {
                entry,
                params: extract_params(path, entry),
            });
        }

        let path_segments = request_segments(path);
        let mut candidates = table.iter().filter(|entry| {
            let pattern_segments: Vec<&str> = split_segments(entry.pattern()).collect();
            segments_match(&pattern_segments, &path_segments)
        });

        let entry = match self.tie_break {
            TieBreak::InsertionOrder => candidates.next()?,
            TieBreak::Specificity => candidates.min_by_key(|entry| specificity_key(entry))?,
        };

        Some(RouteMatch {
            entry,
            params: extract_params(path, entry),
        })
    }
}

/// Bind the entry's parameters to the request segments at the same positions.
///
/// A parameter without a corresponding request segment binds to `""`.
pub fn extract_params(path: &str, entry: &RouteEntry) -> HashMap<String, String> {
    let mut params = HashMap::new();
    if entry.param_names().is_empty() {
        return params;
    }

    let path_segments = request_segments(path);
    for (i, segment) in split_segments(entry.pattern()).enumerate() {
        if let Some(name) = Dialect::Colon.param_name(segment) {
            let value = path_segments.get(i).copied().unwrap_or_default();
            params.insert(name.to_string(), value.to_string());
        }
    }
    params
}

fn segments_match(pattern: &[&str], path: &[&str]) -> bool {
    pattern.len() == path.len()
        && pattern.iter().zip(path).all(|(pattern_segment, path_segment)| {
            if Dialect::Colon.param_name(pattern_segment).is_some() {
                !path_segment.is_empty()
            } else {
                pattern_segment == path_segment
            }
        })
}

// `false` (literal) sorts before `true` (parameter).
fn specificity_key(entry: &RouteEntry) -> Vec<bool> {
    split_segments(entry.pattern())
        .map(|segment| Dialect::Colon.param_name(segment).is_some())
        .collect()
}
