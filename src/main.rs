use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
    sync::Arc,
};

use clap::Parser;
use color_eyre::{
    Result,
    eyre::{Context, eyre},
};
use fnly::{
    adapters::{
        DevState, EsbuildBundler, HandlerFileResolver, NodeRuntime, RouteWatcher,
        SourceExportInspector, dev_router,
    },
    config::{FnlyConfig, FnlyConfigBuilder, FnlyConfigValidator, InspectorKind, loader},
    core::{
        BuildOrchestrator, BuildSettings, RouteMatcher, RouteTable, RouteTableHandle,
        ScanOptions,
        translator::{self, Dialect},
    },
    metrics,
    ports::{export_inspector::ExportInspector, handler_runtime::HandlerRuntime},
    tracing_setup,
    utils::GracefulShutdown,
};
use tracing::Instrument;

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    #[clap(subcommand)]
    command: Commands,

    /// Configuration file (defaults to fnly.toml in the project root when present)
    #[clap(short, long, global = true)]
    config: Option<PathBuf>,

    /// Project root containing the handler directory
    #[clap(short = 'C', long, global = true, default_value = ".")]
    project: PathBuf,
}

#[derive(Parser, Debug)]
enum Commands {
    /// Start the development server
    Dev {
        /// Override the port of the configured listen address
        #[clap(short, long)]
        port: Option<u16>,
    },
    /// Validate handlers, bundle them and write the route manifest
    Build,
    /// Print the routes discovered in the handler directory
    Routes {
        /// Print manifest-style patterns (`{name}`) instead of `:name`
        #[clap(long)]
        manifest: bool,
    },
    /// Validate the configuration and every handler's exports
    Validate,
    /// Create a starter fnly.toml and example handler
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();
    let project_root = args.project.clone();

    let config = loader::load_config(&project_root, args.config.as_deref())
        .await
        .wrap_err("Failed to load configuration")?;
    tracing_setup::init_tracing(&config.logging)?;
    metrics::init_metrics();

    match args.command {
        Commands::Dev { port } => dev_command(&project_root, config, port).await,
        Commands::Build => build_command(&project_root, &config).await,
        Commands::Routes { manifest } => routes_command(&project_root, &config, manifest),
        Commands::Validate => validate_command(&project_root, &config).await,
        Commands::Init => init_command(&project_root).await,
    }
}

fn scan_options(config: &FnlyConfig) -> ScanOptions {
    ScanOptions {
        extensions: config.extensions.clone(),
        collision: config.routing.collision,
    }
}

async fn dev_command(project_root: &Path, config: FnlyConfig, port: Option<u16>) -> Result<()> {
    let config = match port {
        Some(port) => FnlyConfigBuilder::from_config(config)
            .port(port)
            .build()
            .map_err(|e| eyre!(e))?,
        None => config,
    };
    FnlyConfigValidator::validate(&config)?;

    let span = tracing_setup::configure_component_tracing("dev_server");
    async move {
        let api_dir = project_root.join(&config.api_dir);
        if !api_dir.is_dir() {
            return Err(eyre!("API directory not found: {}", api_dir.display()));
        }

        tracing::info!("Building routes from {}", api_dir.display());
        let options = scan_options(&config);
        let table = RouteTable::scan(&api_dir, &options)
            .wrap_err_with(|| format!("Failed to scan {}", api_dir.display()))?;
        tracing::info!("Found {} route(s)", table.len());
        metrics::set_route_table_size(table.len());
        for entry in table.iter() {
            tracing::info!("Route {} -> {}", entry.pattern(), entry.source_file().display());
        }

        let handle = RouteTableHandle::new(table);
        let debounce = config
            .dev
            .debounce()
            .wrap_err("Invalid dev.debounce")?;
        let watcher = RouteWatcher::start(&api_dir, options.clone(), handle.clone(), debounce)?;

        let runtime: Arc<dyn HandlerRuntime> =
            Arc::new(NodeRuntime::from_config(&config.dev).with_working_dir(project_root));
        let state = DevState::new(
            handle,
            RouteMatcher::new(config.routing.tie_break),
            HandlerFileResolver::new(&api_dir, config.extensions.clone()),
            runtime,
            config.dev.api_prefix.clone(),
        );
        let app = dev_router(state);

        let addr: SocketAddr = config
            .dev
            .listen_addr
            .parse()
            .context("Failed to parse listen address")?;
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .context("Failed to bind to address")?;

        let graceful_shutdown = GracefulShutdown::new();
        let signal_handler = graceful_shutdown.clone();
        tokio::spawn(async move { signal_handler.run_signal_handler().await });

        tracing::info!("fnly dev server listening on http://{}", addr);
        println!(
            "fnly dev server running at http://{}{}",
            addr, config.dev.api_prefix
        );

        let shutdown = graceful_shutdown.clone();
        let server_result = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let reason = shutdown.wait_for_shutdown_signal().await;
                tracing::info!("Shutdown signal received: {:?}", reason);
            })
            .await
            .context("Server error");

        watcher.shutdown().await;
        tracing::info!("Graceful shutdown completed");
        server_result
    }
    .instrument(span)
    .await
}

fn export_inspector(project_root: &Path, config: &FnlyConfig) -> Arc<dyn ExportInspector> {
    match config.build.inspector {
        InspectorKind::Static => Arc::new(SourceExportInspector),
        InspectorKind::Runtime => {
            Arc::new(NodeRuntime::from_config(&config.dev).with_working_dir(project_root))
        }
    }
}

fn orchestrator(project_root: &Path, config: &FnlyConfig) -> BuildOrchestrator {
    BuildOrchestrator::new(
        BuildSettings::from_config(config, project_root),
        export_inspector(project_root, config),
        Arc::new(EsbuildBundler::new(config.build.bundler.command.clone())),
    )
}

async fn build_command(project_root: &Path, config: &FnlyConfig) -> Result<()> {
    FnlyConfigValidator::validate(config)?;

    let span = tracing_setup::configure_component_tracing("build");
    let report = orchestrator(project_root, config)
        .build()
        .instrument(span)
        .await?;

    for warning in &report.warnings {
        println!("⚠️  {warning}");
    }
    match &report.manifest_path {
        Some(path) => {
            println!(
                "✅ Built {} route(s) into {} unit(s) in {:.2?}",
                report.manifest.len(),
                report.units,
                report.duration
            );
            println!("   Manifest: {}", path.display());
        }
        None => println!("No handlers found; nothing to build"),
    }
    Ok(())
}

fn routes_command(project_root: &Path, config: &FnlyConfig, manifest: bool) -> Result<()> {
    let api_dir = project_root.join(&config.api_dir);
    let table = RouteTable::scan(&api_dir, &scan_options(config))
        .wrap_err_with(|| format!("Failed to scan {}", api_dir.display()))?;

    if table.is_empty() {
        println!("No routes found in {}", api_dir.display());
        return Ok(());
    }

    let dialect = if manifest { Dialect::Brace } else { Dialect::Colon };
    for entry in table.iter() {
        let relative = entry
            .source_file()
            .strip_prefix(&api_dir)
            .unwrap_or(entry.source_file());
        let pattern = match dialect {
            Dialect::Colon => entry.pattern().to_string(),
            Dialect::Brace => translator::translate(&relative.to_string_lossy(), Dialect::Brace),
        };
        println!("{pattern:<40} {}", relative.display());
    }
    println!("{} route(s)", table.len());
    Ok(())
}

/// Validate configuration and handlers without writing anything
async fn validate_command(project_root: &Path, config: &FnlyConfig) -> Result<()> {
    println!("🔍 Validating fnly project at {}", project_root.display());

    if let Err(e) = FnlyConfigValidator::validate(config) {
        eprintln!("❌ Configuration validation failed:");
        eprintln!("{e}");
        std::process::exit(1);
    }
    println!("✅ Configuration validation: OK");

    match orchestrator(project_root, config).check().await {
        Ok(modules) => {
            println!("✅ Handler validation: OK");
            println!();
            println!("📋 Handlers:");
            for (file, module) in &modules {
                let methods: Vec<&str> = module.methods().iter().map(|m| m.as_str()).collect();
                println!("   • {} [{}]", file.relative, methods.join(", "));
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("❌ Handler validation failed:");
            eprintln!("{e}");
            std::process::exit(1);
        }
    }
}

const STARTER_CONFIG: &str = r#"# fnly configuration

# Handler directory and build output, relative to this file
api_dir = "api"
out_dir = ".fnly"
extensions = ["ts", "js"]

[routing]
# "last_write_wins" or "reject"
collision = "last_write_wins"
# "insertion_order" or "specificity"
tie_break = "insertion_order"

[dev]
listen_addr = "127.0.0.1:3000"
api_prefix = "/api"
debounce = "300ms"
runtime_command = "node"
runtime_args = ["--import", "tsx"]

[build]
runtime = "nodejs20.x"
handler = "index.handler"

[build.bundler]
command = "esbuild"
target = "node20"
minify = true

[logging]
level = "info"
json = false
"#;

const STARTER_HANDLER: &str = r#"export const GET = async () => {
  return { message: "Hello from fnly" };
};
"#;

/// Scaffold a config file and an example handler
async fn init_command(project_root: &Path) -> Result<()> {
    let config_path = project_root.join(loader::DEFAULT_CONFIG_FILE);
    if config_path.exists() {
        eprintln!(
            "❌ Error: Configuration file '{}' already exists",
            config_path.display()
        );
        std::process::exit(1);
    }

    tokio::fs::write(&config_path, STARTER_CONFIG)
        .await
        .context("Failed to write config file")?;
    println!("✅ Created {}", config_path.display());

    let api_dir = project_root.join("api");
    let handler_path = api_dir.join("hello.ts");
    if !handler_path.exists() {
        tokio::fs::create_dir_all(&api_dir)
            .await
            .context("Failed to create api directory")?;
        tokio::fs::write(&handler_path, STARTER_HANDLER)
            .await
            .context("Failed to write example handler")?;
        println!("✅ Created {}", handler_path.display());
    }

    println!("   Run 'fnly dev' and open http://127.0.0.1:3000/api/hello");
    Ok(())
}
