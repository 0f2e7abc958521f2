use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
};

use thiserror::Error;

use crate::core::method::HttpMethod;

/// Errors raised while validating a handler module's exports.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum HandlerError {
    #[error("{}: export '{export}' is not an HTTP method", .file.display())]
    InvalidExport { file: PathBuf, export: String },

    #[error("{}: no HTTP method handlers exported", .file.display())]
    NoHandlers { file: PathBuf },

    #[error("{}: failed to inspect exports: {message}", .file.display())]
    Inspect { file: PathBuf, message: String },
}

/// A handler source file and the HTTP methods it exports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerModule {
    source_file: PathBuf,
    methods: BTreeSet<HttpMethod>,
}

impl HandlerModule {
    /// Validate a module's export names.
    ///
    /// Every export must name an HTTP method exactly (upper-case). All
    /// offending exports are reported, not only the first.
    pub fn from_exports<S: AsRef<str>>(
        source_file: &Path,
        exports: &[S],
    ) -> Result<Self, Vec<HandlerError>> {
        let mut methods = BTreeSet::new();
        let mut errors = Vec::new();

        for export in exports {
            let export = export.as_ref();
            match export.parse::<HttpMethod>() {
                Ok(method) => {
                    methods.insert(method);
                }
                Err(_) => errors.push(HandlerError::InvalidExport {
                    file: source_file.to_path_buf(),
                    export: export.to_string(),
                }),
            }
        }

        if errors.is_empty() && methods.is_empty() {
            errors.push(HandlerError::NoHandlers {
                file: source_file.to_path_buf(),
            });
        }

        if errors.is_empty() {
            Ok(Self {
                source_file: source_file.to_path_buf(),
                methods,
            })
        } else {
            Err(errors)
        }
    }

    pub fn source_file(&self) -> &Path {
        &self.source_file
    }

    pub fn methods(&self) -> &BTreeSet<HttpMethod> {
        &self.methods
    }
}
