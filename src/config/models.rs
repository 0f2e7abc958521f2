//! Configuration data structures for fnly.
//!
//! These types map directly to `fnly.toml` (also JSON / YAML). Every field
//! has a default so a project without a config file works out of the box.
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    core::{
        handler_adapter::{WrapperOptions, handler_export_name},
        matcher::TieBreak,
        route_table::CollisionPolicy,
    },
    ports::bundler::{BundleFormat, BundleOptions, BundlePlatform},
};

/// Top-level configuration.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct FnlyConfig {
    /// Handler root, relative to the project root.
    pub api_dir: String,
    /// Build output directory, relative to the project root.
    pub out_dir: String,
    /// Source extensions eligible as handlers (without the dot).
    pub extensions: Vec<String>,
    pub routing: RoutingConfig,
    pub dev: DevConfig,
    pub build: BuildConfig,
    pub logging: LoggingConfig,
}

impl Default for FnlyConfig {
    fn default() -> Self {
        Self {
            api_dir: "api".to_string(),
            out_dir: ".fnly".to_string(),
            extensions: vec!["ts".to_string(), "js".to_string()],
            routing: RoutingConfig::default(),
            dev: DevConfig::default(),
            build: BuildConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl FnlyConfig {
    /// Create a builder for FnlyConfig
    pub fn builder() -> FnlyConfigBuilder {
        FnlyConfigBuilder::default()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(default)]
pub struct RoutingConfig {
    pub collision: CollisionPolicy,
    pub tie_break: TieBreak,
}

/// Development server settings
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct DevConfig {
    pub listen_addr: String,
    /// URL prefix under which handlers are served.
    pub api_prefix: String,
    /// Quiet period before a route rebuild, humantime syntax (`300ms`, `1s`).
    pub debounce: String,
    /// Executable used to run handler modules.
    pub runtime_command: String,
    /// Arguments passed before the bootstrap script.
    pub runtime_args: Vec<String>,
}

impl Default for DevConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:3000".to_string(),
            api_prefix: "/api".to_string(),
            debounce: "300ms".to_string(),
            runtime_command: "node".to_string(),
            runtime_args: vec!["--import".to_string(), "tsx".to_string()],
        }
    }
}

impl DevConfig {
    /// Parsed debounce window.
    pub fn debounce(&self) -> Result<Duration, humantime::DurationError> {
        humantime::parse_duration(&self.debounce)
    }
}

/// How the build enumerates handler exports.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InspectorKind {
    /// Scan the source text.
    #[default]
    Static,
    /// Load each module in the handler runtime.
    Runtime,
}

/// Production build settings
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct BuildConfig {
    /// Runtime identifier recorded in the manifest.
    pub runtime: String,
    /// `<file>.<export>` entry point recorded in the manifest.
    pub handler: String,
    /// Module providing `createRequestHandler`; kept external to bundles.
    pub runtime_module: String,
    pub inspector: InspectorKind,
    /// Manifest file name inside the output directory.
    pub manifest_file: String,
    /// Bundled units directory inside the output directory.
    pub functions_dir: String,
    pub bundler: BundlerConfig,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            runtime: "nodejs20.x".to_string(),
            handler: "index.handler".to_string(),
            runtime_module: "@fnly/core".to_string(),
            inspector: InspectorKind::default(),
            manifest_file: "routes.json".to_string(),
            functions_dir: "functions".to_string(),
            bundler: BundlerConfig::default(),
        }
    }
}

impl BuildConfig {
    pub fn wrapper_options(&self) -> WrapperOptions {
        WrapperOptions {
            runtime_module: self.runtime_module.clone(),
            export_name: handler_export_name(&self.handler).to_string(),
        }
    }
}

/// Bundler executable and code generation options
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct BundlerConfig {
    pub command: String,
    pub platform: BundlePlatform,
    pub target: String,
    pub format: BundleFormat,
    pub minify: bool,
    pub tree_shaking: bool,
    pub external: Vec<String>,
}

impl Default for BundlerConfig {
    fn default() -> Self {
        let options = BundleOptions::default();
        Self {
            command: "esbuild".to_string(),
            platform: options.platform,
            target: options.target,
            format: options.format,
            minify: options.minify,
            tree_shaking: options.tree_shaking,
            external: options.external,
        }
    }
}

impl BundlerConfig {
    /// Options for one run; the runtime module is always external.
    pub fn bundle_options(&self, runtime_module: &str) -> BundleOptions {
        let mut external = self.external.clone();
        if !external.iter().any(|module| module == runtime_module) {
            external.push(runtime_module.to_string());
        }
        BundleOptions {
            platform: self.platform,
            target: self.target.clone(),
            format: self.format,
            minify: self.minify,
            tree_shaking: self.tree_shaking,
            external,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Builder for FnlyConfig
#[derive(Debug, Default)]
pub struct FnlyConfigBuilder {
    config: FnlyConfig,
}

impl FnlyConfigBuilder {
    /// Start from an existing configuration instead of the defaults.
    pub fn from_config(config: FnlyConfig) -> Self {
        Self { config }
    }

    pub fn api_dir(mut self, dir: impl Into<String>) -> Self {
        self.config.api_dir = dir.into();
        self
    }

    pub fn out_dir(mut self, dir: impl Into<String>) -> Self {
        self.config.out_dir = dir.into();
        self
    }

    pub fn extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    pub fn collision(mut self, policy: CollisionPolicy) -> Self {
        self.config.routing.collision = policy;
        self
    }

    pub fn tie_break(mut self, tie_break: TieBreak) -> Self {
        self.config.routing.tie_break = tie_break;
        self
    }

    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.dev.listen_addr = addr.into();
        self
    }

    /// Replace only the port of the listen address.
    pub fn port(mut self, port: u16) -> Self {
        let host = self
            .config
            .dev
            .listen_addr
            .rsplit_once(':')
            .map(|(host, _)| host.to_string())
            .unwrap_or_else(|| "127.0.0.1".to_string());
        self.config.dev.listen_addr = format!("{host}:{port}");
        self
    }

    pub fn api_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.dev.api_prefix = prefix.into();
        self
    }

    pub fn debounce(mut self, debounce: Duration) -> Self {
        self.config.dev.debounce = humantime::format_duration(debounce).to_string();
        self
    }

    pub fn inspector(mut self, inspector: InspectorKind) -> Self {
        self.config.build.inspector = inspector;
        self
    }

    pub fn bundler_command(mut self, command: impl Into<String>) -> Self {
        self.config.build.bundler.command = command.into();
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<FnlyConfig, String> {
        if self.config.extensions.is_empty() {
            return Err("At least one handler extension is required".to_string());
        }
        if self.config.api_dir.trim().is_empty() {
            return Err("api_dir must not be empty".to_string());
        }
        Ok(self.config)
    }
}
