//! File path → route pattern translation.
//!
//! Handler files map to routes by their position under the handler root:
//! `users/[id].ts` becomes `/users/:id` in the colon dialect (used by the dev
//! server) and `/users/{id}` in the brace dialect (used by the manifest).
//! Translation is a pure function of its input.
use std::{fmt, str::FromStr};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

static BRACKET_SEGMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[([^\[\]/]+)\]").expect("valid regex"));

static ALLOWED_PATH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9./\\\-\[\]]+$").expect("valid regex"));

/// Errors raised by the translator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TranslateError {
    #[error("Unknown route dialect '{0}' (expected 'colon' or 'brace')")]
    UnknownDialect(String),
}

/// Route pattern dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dialect {
    /// `:name` parameters, used for dev-server matching.
    #[serde(alias = "express")]
    Colon,
    /// `{name}` parameters, used in the route manifest.
    #[serde(alias = "worker")]
    Brace,
}

impl Dialect {
    fn replacement(&self) -> &'static str {
        match self {
            Dialect::Colon => ":${1}",
            Dialect::Brace => "{${1}}",
        }
    }

    /// Return the parameter name if `segment` is a dynamic segment in this dialect.
    pub fn param_name<'a>(&self, segment: &'a str) -> Option<&'a str> {
        let name = match self {
            Dialect::Colon => segment.strip_prefix(':')?,
            Dialect::Brace => segment.strip_prefix('{')?.strip_suffix('}')?,
        };
        (!name.is_empty()).then_some(name)
    }

    /// Render a parameter in this dialect.
    pub fn param(&self, name: &str) -> String {
        match self {
            Dialect::Colon => format!(":{name}"),
            Dialect::Brace => format!("{{{name}}}"),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dialect::Colon => f.write_str("colon"),
            Dialect::Brace => f.write_str("brace"),
        }
    }
}

impl FromStr for Dialect {
    type Err = TranslateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "colon" | "express" => Ok(Dialect::Colon),
            "brace" | "worker" => Ok(Dialect::Brace),
            other => Err(TranslateError::UnknownDialect(other.to_string())),
        }
    }
}

/// Translate a path relative to the handler root into a route pattern.
///
/// The extension of the final segment is stripped, separators are
/// normalised to `/`, remaining dots become `-`, `[name]` becomes a dialect
/// parameter and a trailing `index` segment is dropped. The result always
/// starts with `/`; an empty route collapses to `/`.
pub fn translate(relative_file_path: &str, dialect: Dialect) -> String {
    let normalized = relative_file_path.replace('\\', "/");
    let without_extension = strip_extension(&normalized);
    let dashed = without_extension.replace('.', "-");
    let parameterized = BRACKET_SEGMENT.replace_all(&dashed, dialect.replacement());

    let mut segments: Vec<&str> = parameterized
        .split('/')
        .filter(|segment| !segment.is_empty())
        .collect();
    if segments.last() == Some(&"index") {
        segments.pop();
    }

    if segments.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", segments.join("/"))
    }
}

/// Names of the dynamic segments of `pattern`, left to right.
pub fn param_names(pattern: &str, dialect: Dialect) -> Vec<String> {
    split_segments(pattern)
        .filter_map(|segment| dialect.param_name(segment))
        .map(str::to_string)
        .collect()
}

/// Non-empty `/`-delimited segments of a path or pattern.
pub fn split_segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|segment| !segment.is_empty())
}

/// Whether a relative handler path only uses routable characters.
pub fn is_allowed_path(relative_file_path: &str) -> bool {
    ALLOWED_PATH.is_match(relative_file_path)
}

fn strip_extension(path: &str) -> &str {
    let segment_start = path.rfind('/').map_or(0, |i| i + 1);
    match path[segment_start..].rfind('.') {
        Some(dot) if dot > 0 => &path[..segment_start + dot],
        _ => path,
    }
}
