use std::{
    fs,
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use fnly::{
    adapters::SourceExportInspector,
    config::FnlyConfig,
    core::{
        BuildError, BuildOrchestrator, BuildSettings, CollisionPolicy, HttpMethod,
        manifest::RouteManifest,
    },
    ports::bundler::{BundleMessage, BundleOutput, BundleRequest, Bundler, BundlerResult},
};
use tempfile::TempDir;

/// Mirrors each wrapper to `<outdir>/<relative>.js`, counting runs.
#[derive(Default)]
struct CopyBundler {
    runs: AtomicUsize,
}

#[async_trait]
impl Bundler for CopyBundler {
    async fn bundle(&self, request: &BundleRequest) -> BundlerResult<BundleOutput> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        for entry in &request.entry_points {
            let relative = entry.strip_prefix(&request.outbase).unwrap();
            let out = request.outdir.join(relative).with_extension("js");
            fs::create_dir_all(out.parent().unwrap())?;
            fs::copy(entry, out)?;
        }
        Ok(BundleOutput {
            errors: Vec::new(),
            warnings: vec![BundleMessage {
                text: "unused import".to_string(),
                location: None,
            }],
        })
    }
}

/// Writes half the outputs, then reports an error.
struct FailingBundler;

#[async_trait]
impl Bundler for FailingBundler {
    async fn bundle(&self, request: &BundleRequest) -> BundlerResult<BundleOutput> {
        fs::create_dir_all(&request.outdir)?;
        fs::write(request.outdir.join("partial.js"), "// partial")?;
        Ok(BundleOutput {
            errors: vec![BundleMessage {
                text: "Could not resolve \"left-pad\"".to_string(),
                location: Some("api/hello.ts:1:20".to_string()),
            }],
            warnings: Vec::new(),
        })
    }
}

fn write_handlers(root: &Path, files: &[(&str, &str)]) {
    for (relative, source) in files {
        let path = root.join("api").join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, source).unwrap();
    }
}

fn settings(root: &Path, config: &FnlyConfig) -> BuildSettings {
    BuildSettings::from_config(config, root)
}

fn orchestrator(root: &Path, bundler: Arc<dyn Bundler>) -> BuildOrchestrator {
    BuildOrchestrator::new(
        settings(root, &FnlyConfig::default()),
        Arc::new(SourceExportInspector),
        bundler,
    )
}

fn read_manifest(root: &Path) -> RouteManifest {
    let json = fs::read_to_string(root.join(".fnly/routes.json")).unwrap();
    RouteManifest::from_json(&json).unwrap()
}

#[tokio::test]
async fn test_build_produces_manifest_and_units() {
    let dir = TempDir::new().unwrap();
    write_handlers(
        dir.path(),
        &[
            (
                "hello.ts",
                "export const GET = async () => ({ message: 'hi' });",
            ),
            ("sub/index.ts", "export function GET() { return {}; }"),
            (
                "sub/[id].ts",
                "export const GET = (req) => req.params;\nexport const DELETE = () => null;",
            ),
            ("_lib/db.ts", "export const connect = () => {};"),
        ],
    );

    let bundler = Arc::new(CopyBundler::default());
    let report = orchestrator(dir.path(), bundler.clone()).build().await.unwrap();

    assert_eq!(bundler.runs.load(Ordering::SeqCst), 1);
    assert_eq!(report.units, 3);
    assert_eq!(report.warnings.len(), 1);

    let manifest = read_manifest(dir.path());
    let patterns: Vec<&str> = manifest.iter().map(|(pattern, _)| pattern.as_str()).collect();
    assert_eq!(patterns, vec!["/hello", "/sub", "/sub/{id}"]);

    let entry = manifest.get("/sub/{id}").unwrap();
    assert_eq!(
        entry.methods.iter().copied().collect::<Vec<_>>(),
        vec![HttpMethod::Get, HttpMethod::Delete]
    );
    assert_eq!(entry.runtime, "nodejs20.x");
    assert_eq!(entry.handler, "index.handler");
    assert_eq!(entry.path, "functions/sub/[id].js");

    for (pattern, entry) in manifest.iter() {
        let unit = dir.path().join(".fnly").join(&entry.path);
        assert!(unit.is_file(), "no unit for {pattern} at {}", unit.display());
    }

    let wrapper = fs::read_to_string(dir.path().join(".fnly/functions/hello.js")).unwrap();
    assert!(wrapper.contains("createRequestHandler"));
    assert!(wrapper.contains("export const handler"));
}

#[tokio::test]
async fn test_manifest_json_shape() {
    let dir = TempDir::new().unwrap();
    write_handlers(dir.path(), &[("hello.ts", "export const POST = () => ({});")]);

    orchestrator(dir.path(), Arc::new(CopyBundler::default()))
        .build()
        .await
        .unwrap();

    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(dir.path().join(".fnly/routes.json")).unwrap())
            .unwrap();
    assert_eq!(
        json,
        serde_json::json!({
            "/hello": {
                "method": ["POST"],
                "runtime": "nodejs20.x",
                "handler": "index.handler",
                "path": "functions/hello.js"
            }
        })
    );
}

#[tokio::test]
async fn test_invalid_export_aborts_before_output() {
    let dir = TempDir::new().unwrap();
    write_handlers(
        dir.path(),
        &[
            ("hello.ts", "export const GET = () => ({});\nexport const FOO = 1;"),
            ("other.ts", "export const POST = () => ({});"),
        ],
    );

    let bundler = Arc::new(CopyBundler::default());
    let err = orchestrator(dir.path(), bundler.clone())
        .build()
        .await
        .unwrap_err();

    assert!(matches!(err, BuildError::Validation(_)));
    assert!(err.to_string().contains("FOO"));
    assert_eq!(bundler.runs.load(Ordering::SeqCst), 0);
    assert!(!dir.path().join(".fnly").exists());

    let leftovers: Vec<_> = fs::read_dir(dir.path())
        .unwrap()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_name().to_string_lossy().starts_with(".fnly"))
        .collect();
    assert!(leftovers.is_empty());
}

#[tokio::test]
async fn test_shared_pattern_merges_methods() {
    let dir = TempDir::new().unwrap();
    write_handlers(
        dir.path(),
        &[
            ("users.ts", "export const GET = () => [];"),
            ("users/index.ts", "export const POST = () => ({});"),
        ],
    );

    let report = orchestrator(dir.path(), Arc::new(CopyBundler::default()))
        .build()
        .await
        .unwrap();

    assert_eq!(report.manifest.len(), 1);
    let entry = report.manifest.get("/users").unwrap();
    assert_eq!(
        entry.methods.iter().copied().collect::<Vec<_>>(),
        vec![HttpMethod::Get, HttpMethod::Post]
    );
    assert!(dir.path().join(".fnly").join(&entry.path).is_file());
}

#[tokio::test]
async fn test_star_reexported_methods_are_routed() {
    let dir = TempDir::new().unwrap();
    write_handlers(
        dir.path(),
        &[
            ("orders.ts", "export * from './_methods';"),
            (
                "_methods.ts",
                "export const GET = async () => [];\nexport const POST = createHandler<Order, Reply>(save);",
            ),
        ],
    );

    let report = orchestrator(dir.path(), Arc::new(CopyBundler::default()))
        .build()
        .await
        .unwrap();

    assert_eq!(report.manifest.len(), 1);
    let entry = report.manifest.get("/orders").unwrap();
    assert_eq!(
        entry.methods.iter().copied().collect::<Vec<_>>(),
        vec![HttpMethod::Get, HttpMethod::Post]
    );
}

#[tokio::test]
async fn test_shared_pattern_rejected_under_reject_policy() {
    let dir = TempDir::new().unwrap();
    write_handlers(
        dir.path(),
        &[
            ("users.ts", "export const GET = () => [];"),
            ("users/index.ts", "export const POST = () => ({});"),
        ],
    );

    let config = FnlyConfig::builder()
        .collision(CollisionPolicy::Reject)
        .build()
        .unwrap();
    let bundler = Arc::new(CopyBundler::default());
    let err = BuildOrchestrator::new(
        settings(dir.path(), &config),
        Arc::new(SourceExportInspector),
        bundler.clone(),
    )
    .build()
    .await
    .unwrap_err();

    assert!(matches!(err, BuildError::Route(_)));
    assert_eq!(bundler.runs.load(Ordering::SeqCst), 0);
    assert!(!dir.path().join(".fnly").exists());
}

#[tokio::test]
async fn test_bundler_failure_keeps_previous_output() {
    let dir = TempDir::new().unwrap();
    write_handlers(dir.path(), &[("hello.ts", "export const GET = () => ({});")]);

    orchestrator(dir.path(), Arc::new(CopyBundler::default()))
        .build()
        .await
        .unwrap();
    let previous_manifest = fs::read_to_string(dir.path().join(".fnly/routes.json")).unwrap();

    write_handlers(dir.path(), &[("bye.ts", "export const GET = () => ({});")]);
    let err = orchestrator(dir.path(), Arc::new(FailingBundler))
        .build()
        .await
        .unwrap_err();

    match &err {
        BuildError::BundleFailed(errors) => assert_eq!(errors.len(), 1),
        other => panic!("expected bundle failure, got {other:?}"),
    }
    assert!(err.to_string().contains("api/hello.ts:1:20"));

    let manifest = fs::read_to_string(dir.path().join(".fnly/routes.json")).unwrap();
    assert_eq!(manifest, previous_manifest);
    assert!(dir.path().join(".fnly/functions/hello.js").is_file());
    assert!(!dir.path().join(".fnly/functions/partial.js").exists());
    assert!(!dir.path().join(".fnly/functions/bye.js").exists());
}

#[tokio::test]
async fn test_rebuild_replaces_stale_units() {
    let dir = TempDir::new().unwrap();
    write_handlers(
        dir.path(),
        &[
            ("hello.ts", "export const GET = () => ({});"),
            ("old.ts", "export const GET = () => ({});"),
        ],
    );
    orchestrator(dir.path(), Arc::new(CopyBundler::default()))
        .build()
        .await
        .unwrap();
    assert!(dir.path().join(".fnly/functions/old.js").is_file());

    fs::remove_file(dir.path().join("api/old.ts")).unwrap();
    orchestrator(dir.path(), Arc::new(CopyBundler::default()))
        .build()
        .await
        .unwrap();

    assert!(!dir.path().join(".fnly/functions/old.js").exists());
    assert!(read_manifest(dir.path()).get("/old").is_none());
}
