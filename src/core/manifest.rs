//! Route manifest consumed by the deployment pipeline.
use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::core::{
    handler_module::HandlerModule,
    method::HttpMethod,
    route_table::{CollisionPolicy, RouteError},
};

/// Deployment description of one route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    #[serde(rename = "method")]
    pub methods: BTreeSet<HttpMethod>,
    pub runtime: String,
    pub handler: String,
    /// Bundled unit, relative to the output directory.
    pub path: String,
}

/// Brace-dialect pattern → [`ManifestEntry`], sorted by pattern.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RouteManifest {
    routes: BTreeMap<String, ManifestEntry>,
}

impl RouteManifest {
    pub fn get(&self, pattern: &str) -> Option<&ManifestEntry> {
        self.routes.get(pattern)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ManifestEntry)> {
        self.routes.iter()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Accumulates handler modules into a [`RouteManifest`].
#[derive(Debug)]
pub struct ManifestBuilder {
    routes: BTreeMap<String, ManifestEntry>,
    sources: HashMap<String, PathBuf>,
    collision: CollisionPolicy,
    runtime: String,
    handler: String,
}

impl ManifestBuilder {
    pub fn new(runtime: impl Into<String>, handler: impl Into<String>, collision: CollisionPolicy) -> Self {
        Self {
            routes: BTreeMap::new(),
            sources: HashMap::new(),
            collision,
            runtime: runtime.into(),
            handler: handler.into(),
        }
    }

    /// Record `module` under `pattern` with its bundled unit at `output_path`.
    ///
    /// Methods of modules sharing a pattern are unioned. Under
    /// [`CollisionPolicy::LastWriteWins`] the later module's unit becomes the
    /// entry's path; under [`CollisionPolicy::Reject`] sharing is an error.
    pub fn add(
        &mut self,
        pattern: &str,
        module: &HandlerModule,
        output_path: &str,
    ) -> Result<(), RouteError> {
        if let Some(entry) = self.routes.get_mut(pattern) {
            let existing = self
                .sources
                .get(pattern)
                .cloned()
                .unwrap_or_default();
            if self.collision == CollisionPolicy::Reject {
                return Err(RouteError::Collision {
                    pattern: pattern.to_string(),
                    existing,
                    incoming: module.source_file().to_path_buf(),
                });
            }

            tracing::debug!(
                "Merging {} into route '{}' (previously {})",
                module.source_file().display(),
                pattern,
                existing.display()
            );
            entry.methods.extend(module.methods().iter().copied());
            entry.path = output_path.to_string();
        } else {
            self.routes.insert(
                pattern.to_string(),
                ManifestEntry {
                    methods: module.methods().clone(),
                    runtime: self.runtime.clone(),
                    handler: self.handler.clone(),
                    path: output_path.to_string(),
                },
            );
        }

        self.sources
            .insert(pattern.to_string(), module.source_file().to_path_buf());
        Ok(())
    }

    pub fn finish(self) -> RouteManifest {
        RouteManifest {
            routes: self.routes,
        }
    }
}

/// Manifest path of the bundled unit for a handler file: `<functions_dir>/<relative>.js`.
pub fn output_path(functions_dir: &str, relative: &str) -> String {
    let relative = relative.replace('\\', "/");
    let stem = Path::new(&relative).with_extension("js");
    format!(
        "{}/{}",
        functions_dir.trim_end_matches('/'),
        stem.to_string_lossy().replace('\\', "/")
    )
}
