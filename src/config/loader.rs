use std::path::Path;

use config::{Config, Environment, File, FileFormat};
use eyre::{Context, Result};

use crate::config::models::FnlyConfig;

/// Config file looked up in the project root when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "fnly.toml";

/// Prefix of environment overrides (`FNLY_API_DIR`, `FNLY_DEV__LISTEN_ADDR`, ...).
pub const ENV_PREFIX: &str = "FNLY";

/// Load configuration for the project at `project_root`.
///
/// An explicit `config_path` must exist; otherwise `fnly.toml` in the
/// project root is used when present. Environment variables override file
/// values.
pub async fn load_config(project_root: &Path, config_path: Option<&Path>) -> Result<FnlyConfig> {
    load_config_sync(project_root, config_path)
}

/// Load configuration synchronously
pub fn load_config_sync(project_root: &Path, config_path: Option<&Path>) -> Result<FnlyConfig> {
    load_with_env(project_root, config_path, None)
}

fn load_with_env(
    project_root: &Path,
    config_path: Option<&Path>,
    env: Option<config::Map<String, String>>,
) -> Result<FnlyConfig> {
    let (path, required) = match config_path {
        Some(path) if path.is_absolute() => (path.to_path_buf(), true),
        Some(path) => (project_root.join(path), true),
        None => (project_root.join(DEFAULT_CONFIG_FILE), false),
    };

    if required && !path.is_file() {
        eyre::bail!("Config file not found: {}", path.display());
    }

    // Determine file format based on extension
    let format = match path.extension().and_then(|ext| ext.to_str()) {
        Some("yaml") | Some("yml") => FileFormat::Yaml,
        Some("json") => FileFormat::Json,
        _ => FileFormat::Toml,
    };

    let path_str = path
        .to_str()
        .ok_or_else(|| eyre::eyre!("Invalid UTF-8 path: {}", path.display()))?;

    let settings = Config::builder()
        .add_source(File::new(path_str, format).required(required))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("extensions")
                .with_list_parse_key("dev.runtime_args")
                .with_list_parse_key("build.bundler.external")
                .try_parsing(true)
                .source(env),
        )
        .build()
        .with_context(|| format!("Failed to build config from {}", path.display()))?;

    let config: FnlyConfig = settings
        .try_deserialize()
        .with_context(|| format!("Failed to deserialize config from {}", path.display()))?;

    if path.is_file() {
        tracing::debug!("Loaded configuration from {}", path.display());
    }
    Ok(config)
}
