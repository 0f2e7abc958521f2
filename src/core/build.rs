//! Production build: validated handler modules → bundled units + manifest.
//!
//! The build runs in two phases. Phase one only reads export metadata and
//! fails before anything is written when a handler is invalid. Phase two
//! stages wrapper modules in a temporary directory next to the output,
//! bundles them in a single bundler run, and then swaps the staged functions
//! directory and manifest into place. A build that fails at any point before
//! that swap leaves the previous output untouched.
use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use futures_util::future::join_all;
use thiserror::Error;

use crate::{
    config::FnlyConfig,
    core::{
        discovery::{self, HandlerFile},
        handler_adapter::{HandlerAdapter, WrapperOptions},
        handler_module::{HandlerError, HandlerModule},
        manifest::{self, ManifestBuilder, RouteManifest},
        route_table::{CollisionPolicy, RouteEntry, RouteError},
        translator::{self, Dialect},
    },
    metrics::{self, BuildTimer, Outcome},
    ports::{
        bundler::{BundleMessage, BundleOptions, BundleRequest, Bundler, BundlerError},
        export_inspector::ExportInspector,
    },
};

const STAGING_PREFIX: &str = ".fnly-staging-";
const WRAPPERS_DIR: &str = "wrappers";

/// Errors that abort a build.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum BuildError {
    #[error("API directory not found: {}", .0.display())]
    MissingApiDir(PathBuf),

    #[error(transparent)]
    Route(#[from] RouteError),

    #[error("{}", format_handler_errors(.0))]
    Validation(Vec<HandlerError>),

    #[error(transparent)]
    Bundler(#[from] BundlerError),

    #[error("{}", format_bundle_errors(.0))]
    BundleFailed(Vec<BundleMessage>),

    #[error("Bundler produced no output for route '{pattern}' (expected {})", .path.display())]
    MissingOutput { pattern: String, path: PathBuf },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

fn format_handler_errors(errors: &[HandlerError]) -> String {
    if errors.len() == 1 {
        return format!("Invalid handler: {}", errors[0]);
    }
    let mut message = format!("Found {} invalid handlers:\n", errors.len());
    for (i, error) in errors.iter().enumerate() {
        message.push_str(&format!("  {}. {}\n", i + 1, error));
    }
    message
}

fn format_bundle_errors(errors: &[BundleMessage]) -> String {
    let mut message = format!("Bundling failed with {} error(s):\n", errors.len());
    for error in errors {
        message.push_str(&format!("  - {error}\n"));
    }
    message
}

trait IoContext<T> {
    fn io_context(self, context: impl FnOnce() -> String) -> Result<T, BuildError>;
}

impl<T> IoContext<T> for io::Result<T> {
    fn io_context(self, context: impl FnOnce() -> String) -> Result<T, BuildError> {
        self.map_err(|source| BuildError::Io {
            context: context(),
            source,
        })
    }
}

/// Everything a build needs, resolved against the project root.
#[derive(Debug, Clone)]
pub struct BuildSettings {
    pub api_dir: PathBuf,
    pub out_dir: PathBuf,
    pub extensions: Vec<String>,
    pub collision: CollisionPolicy,
    pub runtime: String,
    pub handler: String,
    pub manifest_file: String,
    pub functions_dir: String,
    pub wrapper: WrapperOptions,
    pub bundle: BundleOptions,
}

impl BuildSettings {
    pub fn from_config(config: &FnlyConfig, project_root: &Path) -> Self {
        Self {
            api_dir: project_root.join(&config.api_dir),
            out_dir: project_root.join(&config.out_dir),
            extensions: config.extensions.clone(),
            collision: config.routing.collision,
            runtime: config.build.runtime.clone(),
            handler: config.build.handler.clone(),
            manifest_file: config.build.manifest_file.clone(),
            functions_dir: config.build.functions_dir.clone(),
            wrapper: config.build.wrapper_options(),
            bundle: config
                .build
                .bundler
                .bundle_options(&config.build.runtime_module),
        }
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.out_dir.join(&self.manifest_file)
    }

    pub fn functions_path(&self) -> PathBuf {
        self.out_dir.join(&self.functions_dir)
    }
}

/// Result of a successful build.
#[derive(Debug, Clone)]
pub struct BuildReport {
    pub manifest: RouteManifest,
    /// Where the manifest was written; `None` when there was nothing to build.
    pub manifest_path: Option<PathBuf>,
    pub units: usize,
    pub warnings: Vec<BundleMessage>,
    pub duration: Duration,
}

pub struct BuildOrchestrator {
    settings: BuildSettings,
    adapter: HandlerAdapter,
    bundler: Arc<dyn Bundler>,
}

impl BuildOrchestrator {
    pub fn new(
        settings: BuildSettings,
        inspector: Arc<dyn ExportInspector>,
        bundler: Arc<dyn Bundler>,
    ) -> Self {
        let adapter = HandlerAdapter::new(inspector, settings.wrapper.clone());
        Self {
            settings,
            adapter,
            bundler,
        }
    }

    pub fn settings(&self) -> &BuildSettings {
        &self.settings
    }

    pub async fn build(&self) -> Result<BuildReport, BuildError> {
        let timer = BuildTimer::new();
        let result = self.run(&timer).await;
        match &result {
            Ok(report) => {
                metrics::increment_build_total(Outcome::Success);
                tracing::info!(
                    "Build finished: {} route(s), {} unit(s) in {:?}",
                    report.manifest.len(),
                    report.units,
                    report.duration
                );
            }
            Err(e) => {
                metrics::increment_build_total(Outcome::Failure);
                tracing::error!("Build failed: {}", e);
            }
        }
        result
    }

    /// Phase one only: discover and validate every handler.
    pub async fn check(&self) -> Result<Vec<(HandlerFile, HandlerModule)>, BuildError> {
        let files = self.discover()?;
        self.extract_methods(files).await
    }

    async fn run(&self, timer: &BuildTimer) -> Result<BuildReport, BuildError> {
        let files = self.discover()?;
        if files.is_empty() {
            tracing::warn!("No handler files found in {}", self.settings.api_dir.display());
            return Ok(BuildReport {
                manifest: RouteManifest::default(),
                manifest_path: None,
                units: 0,
                warnings: Vec::new(),
                duration: timer.elapsed(),
            });
        }

        let modules = self.extract_methods(files).await?;
        let manifest = self.build_manifest(&modules)?;

        let staging = self.create_staging()?;
        let wrappers_root = staging.path().join(WRAPPERS_DIR);
        let staged_functions = staging.path().join(&self.settings.functions_dir);

        let mut entry_points = Vec::with_capacity(modules.len());
        for (file, _) in &modules {
            let wrapper = self
                .adapter
                .write_wrapper(file, &wrappers_root)
                .io_context(|| format!("Failed to stage wrapper for {}", file.relative))?;
            entry_points.push(wrapper);
        }

        let request = BundleRequest {
            entry_points,
            outdir: staged_functions.clone(),
            outbase: wrappers_root,
            options: self.settings.bundle.clone(),
        };
        tracing::info!("Bundling {} handler(s)", request.entry_points.len());
        let output = self.bundler.bundle(&request).await?;
        for warning in &output.warnings {
            tracing::warn!("Bundler: {}", warning);
        }
        if !output.is_success() {
            return Err(BuildError::BundleFailed(output.errors));
        }

        for (pattern, entry) in manifest.iter() {
            let unit = staging.path().join(&entry.path);
            if !unit.is_file() {
                return Err(BuildError::MissingOutput {
                    pattern: pattern.clone(),
                    path: self.settings.out_dir.join(&entry.path),
                });
            }
            tracing::info!("Built {} -> {}", pattern, entry.path);
        }

        let json = manifest
            .to_json_pretty()
            .map_err(|e| BuildError::Io {
                context: "Failed to serialize route manifest".to_string(),
                source: io::Error::other(e),
            })?;
        let staged_manifest = staging.path().join(&self.settings.manifest_file);
        fs::write(&staged_manifest, json).io_context(|| "Failed to stage route manifest".to_string())?;

        self.commit(&staged_functions, &staged_manifest)?;

        Ok(BuildReport {
            units: modules.len(),
            manifest,
            manifest_path: Some(self.settings.manifest_path()),
            warnings: output.warnings,
            duration: timer.elapsed(),
        })
    }

    fn discover(&self) -> Result<Vec<HandlerFile>, BuildError> {
        let api_dir = &self.settings.api_dir;
        if !api_dir.is_dir() {
            return Err(BuildError::MissingApiDir(api_dir.clone()));
        }

        let files = discovery::discover(api_dir, &self.settings.extensions)?;
        Ok(files
            .into_iter()
            .filter(|file| match RouteEntry::from_file(file) {
                Ok(_) => true,
                Err(e) => {
                    tracing::warn!("Skipping handler: {}", e);
                    false
                }
            })
            .collect())
    }

    async fn extract_methods(
        &self,
        files: Vec<HandlerFile>,
    ) -> Result<Vec<(HandlerFile, HandlerModule)>, BuildError> {
        let results = join_all(files.iter().map(|file| self.adapter.inspect(file))).await;

        let mut modules = Vec::with_capacity(files.len());
        let mut errors = Vec::new();
        for (file, result) in files.into_iter().zip(results) {
            match result {
                Ok(module) => modules.push((file, module)),
                Err(mut file_errors) => errors.append(&mut file_errors),
            }
        }

        if errors.is_empty() {
            Ok(modules)
        } else {
            Err(BuildError::Validation(errors))
        }
    }

    fn build_manifest(
        &self,
        modules: &[(HandlerFile, HandlerModule)],
    ) -> Result<RouteManifest, BuildError> {
        let mut builder = ManifestBuilder::new(
            &self.settings.runtime,
            &self.settings.handler,
            self.settings.collision,
        );
        for (file, module) in modules {
            let pattern = translator::translate(&file.relative, Dialect::Brace);
            let unit = manifest::output_path(&self.settings.functions_dir, &file.relative);
            builder.add(&pattern, module, &unit)?;
        }
        Ok(builder.finish())
    }

    fn create_staging(&self) -> Result<tempfile::TempDir, BuildError> {
        let parent = self
            .settings
            .out_dir
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)
            .io_context(|| format!("Failed to create {}", parent.display()))?;

        tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(parent)
            .io_context(|| format!("Failed to create staging directory in {}", parent.display()))
    }

    /// Replace the previous functions directory and manifest with the staged ones.
    fn commit(&self, staged_functions: &Path, staged_manifest: &Path) -> Result<(), BuildError> {
        let functions = self.settings.functions_path();
        let manifest = self.settings.manifest_path();

        fs::create_dir_all(&self.settings.out_dir)
            .io_context(|| format!("Failed to create {}", self.settings.out_dir.display()))?;
        if functions.exists() {
            fs::remove_dir_all(&functions)
                .io_context(|| format!("Failed to remove {}", functions.display()))?;
        }
        if manifest.exists() {
            fs::remove_file(&manifest)
                .io_context(|| format!("Failed to remove {}", manifest.display()))?;
        }
        if let Some(parent) = functions.parent() {
            fs::create_dir_all(parent)
                .io_context(|| format!("Failed to create {}", parent.display()))?;
        }

        fs::rename(staged_functions, &functions)
            .io_context(|| format!("Failed to move bundle into {}", functions.display()))?;
        fs::rename(staged_manifest, &manifest)
            .io_context(|| format!("Failed to write {}", manifest.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use tempfile::TempDir;

    use super::*;
    use crate::{
        adapters::source_inspector::SourceExportInspector,
        ports::bundler::{BundleOutput, BundlerResult},
    };

    /// Copies each wrapper to its mirrored `.js` output path.
    struct CopyBundler;

    #[async_trait]
    impl Bundler for CopyBundler {
        async fn bundle(&self, request: &BundleRequest) -> BundlerResult<BundleOutput> {
            for entry in &request.entry_points {
                let relative = entry.strip_prefix(&request.outbase).unwrap();
                let out = request.outdir.join(relative).with_extension("js");
                fs::create_dir_all(out.parent().unwrap())?;
                fs::copy(entry, out)?;
            }
            Ok(BundleOutput::default())
        }
    }

    fn project(files: &[(&str, &str)]) -> (TempDir, BuildSettings) {
        let dir = TempDir::new().unwrap();
        for (relative, source) in files {
            let path = dir.path().join("api").join(relative);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, source).unwrap();
        }
        let settings = BuildSettings::from_config(&FnlyConfig::default(), dir.path());
        (dir, settings)
    }

    fn orchestrator(settings: BuildSettings) -> BuildOrchestrator {
        BuildOrchestrator::new(settings, Arc::new(SourceExportInspector), Arc::new(CopyBundler))
    }

    #[tokio::test]
    async fn test_build_writes_units_and_manifest() {
        let (dir, settings) = project(&[
            ("hello.ts", "export const GET = () => ({});"),
            ("sub/[id].ts", "export async function GET() {}"),
        ]);

        let report = orchestrator(settings).build().await.unwrap();
        assert_eq!(report.units, 2);
        assert!(report.manifest.get("/sub/{id}").is_some());

        let out = dir.path().join(".fnly");
        assert!(out.join("functions/hello.js").is_file());
        assert!(out.join("functions/sub/[id].js").is_file());
        let manifest: RouteManifest =
            RouteManifest::from_json(&fs::read_to_string(out.join("routes.json")).unwrap())
                .unwrap();
        assert_eq!(manifest, report.manifest);
    }

    #[tokio::test]
    async fn test_empty_tree_leaves_output_untouched() {
        let (dir, settings) = project(&[("_utils.ts", "export const helper = 1;")]);
        let report = orchestrator(settings).build().await.unwrap();
        assert!(report.manifest.is_empty());
        assert!(report.manifest_path.is_none());
        assert!(!dir.path().join(".fnly").exists());
    }

    #[tokio::test]
    async fn test_missing_api_dir() {
        let dir = TempDir::new().unwrap();
        let settings = BuildSettings::from_config(&FnlyConfig::default(), dir.path());
        let err = orchestrator(settings).build().await.unwrap_err();
        assert!(matches!(err, BuildError::MissingApiDir(_)));
    }

    #[tokio::test]
    async fn test_check_reports_every_invalid_file() {
        let (_dir, settings) = project(&[
            ("a.ts", "export const GET = 1; export const FOO = 2;"),
            ("b.ts", "const nothing = 1;"),
            ("c.ts", "export const POST = 1;"),
        ]);
        let err = orchestrator(settings).check().await.unwrap_err();
        match err {
            BuildError::Validation(errors) => {
                assert_eq!(errors.len(), 2);
                let message = BuildError::Validation(errors).to_string();
                assert!(message.contains("Found 2 invalid handlers"));
                assert!(message.contains("'FOO'"));
                assert!(message.contains("no HTTP method handlers"));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_staging_is_created_next_to_output() {
        let (dir, settings) = project(&[]);
        let staging = orchestrator(settings).create_staging().unwrap();
        assert_eq!(staging.path().parent().unwrap(), dir.path());
        assert!(
            staging
                .path()
                .file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with(STAGING_PREFIX)
        );
    }
}
