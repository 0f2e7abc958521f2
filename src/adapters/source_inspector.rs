use std::{
    collections::{HashSet, VecDeque},
    ffi::OsString,
    path::{Path, PathBuf},
};

use async_trait::async_trait;

use crate::{
    core::export_scanner::{STAR_REEXPORT, scan_module},
    ports::export_inspector::{ExportInspector, InspectResult},
};

// Probed in order when a relative specifier has no usable extension.
const RESOLVE_EXTENSIONS: &[&str] = &["ts", "tsx", "mts", "js", "jsx", "mjs", "cjs"];

/// Export inspector that reads handler source text without running it.
///
/// `export * from "./x"` is followed into the target module, whose names
/// (except `default`) count as the handler's own. Star re-exports of bare
/// package specifiers or of files that cannot be found are reported as `*`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SourceExportInspector;

#[async_trait]
impl ExportInspector for SourceExportInspector {
    async fn exports(&self, file: &Path) -> InspectResult<Vec<String>> {
        let mut names = Vec::new();
        let mut visited = HashSet::new();
        let entry = tokio::fs::canonicalize(file).await?;
        let mut pending = VecDeque::from([(entry, true)]);

        while let Some((path, is_entry)) = pending.pop_front() {
            if !visited.insert(path.clone()) {
                continue;
            }
            let source = tokio::fs::read_to_string(&path).await?;
            let module = scan_module(&source);

            names.extend(
                module
                    .names
                    .into_iter()
                    .filter(|name| is_entry || name != "default"),
            );
            for specifier in &module.star_sources {
                match resolve_relative(&path, specifier).await {
                    Some(target) => pending.push_back((target, false)),
                    None => {
                        tracing::debug!(
                            "Cannot follow star re-export '{}' in {}",
                            specifier,
                            path.display()
                        );
                        names.push(STAR_REEXPORT.to_string());
                    }
                }
            }
        }

        let mut seen = HashSet::new();
        names.retain(|name| seen.insert(name.clone()));
        Ok(names)
    }
}

/// Resolve `./x` or `../x` relative to the module `from`, the way a bundler
/// would for a source tree: the exact file, a `.js` specifier standing for a
/// TypeScript source, the specifier with an extension appended, then an
/// `index` file inside it.
async fn resolve_relative(from: &Path, specifier: &str) -> Option<PathBuf> {
    if !(specifier.starts_with("./") || specifier.starts_with("../")) {
        return None;
    }
    let base = from.parent()?.join(specifier);

    let mut candidates = vec![base.clone()];
    if base.extension().is_some_and(|ext| ext == "js") {
        candidates.push(base.with_extension("ts"));
        candidates.push(base.with_extension("tsx"));
    }
    for ext in RESOLVE_EXTENSIONS {
        let mut appended = OsString::from(base.as_os_str());
        appended.push(".");
        appended.push(ext);
        candidates.push(PathBuf::from(appended));
    }
    for ext in RESOLVE_EXTENSIONS {
        candidates.push(base.join(format!("index.{ext}")));
    }

    for candidate in candidates {
        if tokio::fs::metadata(&candidate)
            .await
            .is_ok_and(|meta| meta.is_file())
        {
            // Canonical so that `../` detours cannot revisit a module forever.
            return tokio::fs::canonicalize(&candidate).await.ok();
        }
    }
    None
}
