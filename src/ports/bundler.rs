use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for bundler invocations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum BundlerError {
    /// The bundler executable could not be started
    #[error("Failed to run bundler '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for bundler operations
pub type BundlerResult<T> = Result<T, BundlerError>;

/// Output module format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BundleFormat {
    #[default]
    Cjs,
    Esm,
    Iife,
}

impl BundleFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            BundleFormat::Cjs => "cjs",
            BundleFormat::Esm => "esm",
            BundleFormat::Iife => "iife",
        }
    }
}

/// Target platform.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BundlePlatform {
    #[default]
    Node,
    Neutral,
    Browser,
}

impl BundlePlatform {
    pub fn as_str(&self) -> &'static str {
        match self {
            BundlePlatform::Node => "node",
            BundlePlatform::Neutral => "neutral",
            BundlePlatform::Browser => "browser",
        }
    }
}

/// Code generation options shared by every entry point of one bundle run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleOptions {
    pub platform: BundlePlatform,
    pub target: String,
    pub format: BundleFormat,
    pub minify: bool,
    pub tree_shaking: bool,
    /// Modules left as runtime imports instead of being inlined.
    pub external: Vec<String>,
}

impl Default for BundleOptions {
    fn default() -> Self {
        Self {
            platform: BundlePlatform::Node,
            target: "node20".to_string(),
            format: BundleFormat::Cjs,
            minify: true,
            tree_shaking: true,
            external: vec!["@fnly/core".to_string()],
        }
    }
}

/// A single bundler run.
///
/// Outputs mirror the entry points' paths relative to `outbase` under
/// `outdir`, with a `.js` extension.
#[derive(Debug, Clone)]
pub struct BundleRequest {
    pub entry_points: Vec<PathBuf>,
    pub outdir: PathBuf,
    pub outbase: PathBuf,
    pub options: BundleOptions,
}

/// A diagnostic reported by the bundler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleMessage {
    pub text: String,
    /// `file:line:column` when the bundler reported one.
    pub location: Option<String>,
}

impl std::fmt::Display for BundleMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.location {
            Some(location) => write!(f, "{location}: {}", self.text),
            None => f.write_str(&self.text),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BundleOutput {
    pub errors: Vec<BundleMessage>,
    pub warnings: Vec<BundleMessage>,
}

impl BundleOutput {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Bundler defines the port (interface) for turning entry points into
/// deployable units
#[async_trait]
pub trait Bundler: Send + Sync + 'static {
    /// Bundle every entry point of `request` in one run.
    ///
    /// Diagnostics reported by the bundler are returned in the output; an
    /// error is only returned when the bundler could not be run at all.
    async fn bundle(&self, request: &BundleRequest) -> BundlerResult<BundleOutput>;
}
