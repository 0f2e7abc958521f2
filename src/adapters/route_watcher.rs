//! Keeps the installed route table in step with the handler tree.
//!
//! File system events are filtered down to the ones that can change the
//! routing (route files and route directories being created, removed or
//! renamed) and fed to a [`RebuildScheduler`]. Each rebuild rescans the whole
//! tree and publishes the new table atomically; a failed rebuild keeps the
//! previous table in place.
use std::{
    ffi::OsStr,
    path::{Component, Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use eyre::{Result, WrapErr};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher, event::ModifyKind};
use tokio::sync::broadcast;

use crate::{
    core::{
        discovery::{is_route_dir_name, is_route_file_name},
        route_table::{RouteTable, RouteTableHandle, ScanOptions},
        scheduler::{RebuildScheduler, RebuildTrigger},
    },
    metrics::{self, Outcome},
};

/// Outcome of one background rebuild.
#[derive(Debug, Clone)]
pub enum RebuildEvent {
    /// A new table was published.
    Rebuilt(Arc<RouteTable>),
    /// Scanning failed; the previous table stays installed.
    Failed(String),
}

pub struct RouteWatcher {
    // Dropping the watcher stops event delivery.
    watcher: Option<RecommendedWatcher>,
    scheduler: Option<RebuildScheduler>,
    events: broadcast::Sender<RebuildEvent>,
    root: PathBuf,
}

impl RouteWatcher {
    /// Watch `root` and republish the table in `handle` after every quiet period.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(
        root: impl Into<PathBuf>,
        options: ScanOptions,
        handle: RouteTableHandle,
        debounce: Duration,
    ) -> Result<Self> {
        let root = root.into();
        let (events, _) = broadcast::channel(16);

        let scheduler = RebuildScheduler::spawn(
            debounce,
            rebuild_job(root.clone(), options.clone(), handle, events.clone()),
        );

        let trigger = scheduler.trigger_handle();
        let filter_root = root.clone();
        let extensions = options.extensions;
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if is_routing_event(&filter_root, &extensions, &event) {
                    tracing::debug!("Handler tree changed: {:?} {:?}", event.kind, event.paths);
                    trigger.trigger();
                }
            }
            Err(e) => tracing::error!("File watch error: {:?}", e),
        })
        .wrap_err("Failed to create file watcher")?;

        watcher
            .watch(&root, RecursiveMode::Recursive)
            .wrap_err_with(|| format!("Failed to watch handler directory {}", root.display()))?;

        tracing::info!("Watching {} for route changes", root.display());
        Ok(Self {
            watcher: Some(watcher),
            scheduler: Some(scheduler),
            events,
            root,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Receive the outcome of every subsequent rebuild.
    pub fn subscribe(&self) -> broadcast::Receiver<RebuildEvent> {
        self.events.subscribe()
    }

    /// Request a rebuild as if the tree had changed.
    pub fn trigger(&self) {
        if let Some(trigger) = self.trigger_handle() {
            trigger.trigger();
        }
    }

    fn trigger_handle(&self) -> Option<RebuildTrigger> {
        self.scheduler.as_ref().map(RebuildScheduler::trigger_handle)
    }

    /// Stop watching. Pending rebuilds are dropped; a running one completes.
    pub async fn shutdown(mut self) {
        drop(self.watcher.take());
        if let Some(scheduler) = self.scheduler.take() {
            scheduler.shutdown().await;
        }
        tracing::info!("Stopped watching {}", self.root.display());
    }
}

fn rebuild_job(
    root: PathBuf,
    options: ScanOptions,
    handle: RouteTableHandle,
    events: broadcast::Sender<RebuildEvent>,
) -> impl Fn() + Send + Sync + 'static {
    move || match RouteTable::scan(&root, &options) {
        Ok(table) => {
            let table = Arc::new(table);
            handle.publish(table.clone());
            metrics::increment_route_rebuild(Outcome::Success);
            metrics::set_route_table_size(table.len());
            tracing::info!("Route table rebuilt: {} route(s)", table.len());
            let _ = events.send(RebuildEvent::Rebuilt(table));
        }
        Err(e) => {
            metrics::increment_route_rebuild(Outcome::Failure);
            tracing::error!("Route rebuild failed, keeping previous routes: {}", e);
            let _ = events.send(RebuildEvent::Failed(e.to_string()));
        }
    }
}

/// Whether `event` can change the set of routes under `root`.
fn is_routing_event(root: &Path, extensions: &[String], event: &Event) -> bool {
    let structural = matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(_))
    );
    if !structural {
        return false;
    }

    event
        .paths
        .iter()
        .any(|path| is_routing_path(root, extensions, path))
}

fn is_routing_path(root: &Path, extensions: &[String], path: &Path) -> bool {
    let Ok(relative) = path.strip_prefix(root) else {
        return false;
    };
    let names: Vec<&OsStr> = relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(name) => Some(name),
            _ => None,
        })
        .collect();
    let Some((last, parents)) = names.split_last() else {
        return false;
    };
    if !parents.iter().all(|name| is_route_dir_name(name)) {
        return false;
    }

    // Directory names may contain dots (`v1.2`), so ask the file system first.
    if path.is_dir() {
        return is_route_dir_name(last);
    }
    // A removed directory no longer exists to be inspected, so anything that
    // is not a file with a foreign extension counts.
    is_route_file_name(last, extensions)
        || (Path::new(last).extension().is_none() && is_route_dir_name(last))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use notify::event::{AccessKind, CreateKind, DataChange, RemoveKind, RenameMode};
    use tempfile::TempDir;
    use tokio::time::timeout;

    use super::*;

    fn extensions() -> Vec<String> {
        vec!["ts".to_string(), "js".to_string()]
    }

    fn event(kind: EventKind, path: &str) -> Event {
        Event::new(kind).add_path(PathBuf::from("/project/api").join(path))
    }

    #[test]
    fn test_routing_event_filter() {
        let root = Path::new("/project/api");
        let ext = extensions();

        assert!(is_routing_event(
            root,
            &ext,
            &event(EventKind::Create(CreateKind::File), "users/[id].ts")
        ));
        assert!(is_routing_event(
            root,
            &ext,
            &event(EventKind::Remove(RemoveKind::Folder), "users")
        ));
        assert!(is_routing_event(
            root,
            &ext,
            &event(
                EventKind::Modify(ModifyKind::Name(RenameMode::Any)),
                "hello.js"
            )
        ));

        // content edits do not change routes
        assert!(!is_routing_event(
            root,
            &ext,
            &event(
                EventKind::Modify(ModifyKind::Data(DataChange::Content)),
                "hello.ts"
            )
        ));
        assert!(!is_routing_event(
            root,
            &ext,
            &event(EventKind::Access(AccessKind::Any), "hello.ts")
        ));
        assert!(!is_routing_event(
            root,
            &ext,
            &event(EventKind::Create(CreateKind::File), "README.md")
        ));
        assert!(!is_routing_event(
            root,
            &ext,
            &event(EventKind::Create(CreateKind::File), "_lib/db.ts")
        ));
        assert!(!is_routing_event(
            root,
            &ext,
            &event(EventKind::Create(CreateKind::File), "node_modules/x/index.js")
        ));
        assert!(!is_routing_event(
            root,
            &ext,
            &Event::new(EventKind::Create(CreateKind::File))
                .add_path(PathBuf::from("/elsewhere/hello.ts"))
        ));
    }

    #[test]
    fn test_dotted_directories_trigger_rebuilds() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("v1.2")).unwrap();
        fs::write(dir.path().join("v1.2/ping.ts"), "").unwrap();
        fs::create_dir_all(dir.path().join("_v2.0")).unwrap();

        let ext = extensions();
        let at = |kind: EventKind, name: &str| Event::new(kind).add_path(dir.path().join(name));

        assert!(is_routing_event(
            dir.path(),
            &ext,
            &at(EventKind::Modify(ModifyKind::Name(RenameMode::To)), "v1.2")
        ));
        assert!(is_routing_event(
            dir.path(),
            &ext,
            &at(EventKind::Create(CreateKind::Folder), "v1.2")
        ));
        assert!(!is_routing_event(
            dir.path(),
            &ext,
            &at(EventKind::Create(CreateKind::Folder), "_v2.0")
        ));
    }

    #[test]
    fn test_rebuild_job_keeps_table_on_failure() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("hello.ts"), "").unwrap();

        let handle = RouteTableHandle::default();
        let (events, mut rx) = broadcast::channel(4);
        let job = rebuild_job(
            dir.path().to_path_buf(),
            ScanOptions::default(),
            handle.clone(),
            events,
        );

        job();
        assert!(handle.load().get("/hello").is_some());
        assert!(matches!(rx.try_recv().unwrap(), RebuildEvent::Rebuilt(_)));

        let missing = dir.path().to_path_buf();
        drop(dir);
        assert!(!missing.exists());
        job();
        assert!(handle.load().get("/hello").is_some());
        assert!(matches!(rx.try_recv().unwrap(), RebuildEvent::Failed(_)));
    }

    #[tokio::test]
    async fn test_watcher_picks_up_new_handlers() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("hello.ts"), "").unwrap();

        let options = ScanOptions::default();
        let handle = RouteTableHandle::new(RouteTable::scan(dir.path(), &options).unwrap());
        let watcher = RouteWatcher::start(
            dir.path(),
            options,
            handle.clone(),
            Duration::from_millis(50),
        )
        .unwrap();
        let mut rx = watcher.subscribe();

        fs::create_dir(dir.path().join("users")).unwrap();
        fs::write(dir.path().join("users/[id].ts"), "").unwrap();

        let deadline = Duration::from_secs(5);
        let found = timeout(deadline, async {
            loop {
                match rx.recv().await {
                    Ok(RebuildEvent::Rebuilt(table)) if table.get("/users/:id").is_some() => {
                        break true;
                    }
                    Ok(_) => continue,
                    Err(_) => break false,
                }
            }
        })
        .await
        .unwrap_or(false);

        assert!(found, "rebuilt table never contained /users/:id");
        assert!(handle.load().get("/users/:id").is_some());
        assert!(handle.load().get("/hello").is_some());

        watcher.shutdown().await;
    }

    #[tokio::test]
    async fn test_manual_trigger_rebuilds() {
        let dir = TempDir::new().unwrap();
        let handle = RouteTableHandle::default();
        let watcher = RouteWatcher::start(
            dir.path(),
            ScanOptions::default(),
            handle.clone(),
            Duration::from_millis(10),
        )
        .unwrap();
        let mut rx = watcher.subscribe();

        watcher.trigger();
        let event = timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
        assert!(matches!(event, RebuildEvent::Rebuilt(table) if table.is_empty()));

        watcher.shutdown().await;
    }
}
