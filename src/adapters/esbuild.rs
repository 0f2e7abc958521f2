use std::{ffi::OsString, path::Path, process::Stdio};

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use tokio::process::Command;

use crate::ports::bundler::{
    BundleMessage, BundleOutput, BundleRequest, Bundler, BundlerError, BundlerResult,
};

static LOCATION_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s+(\S.*:\d+:\d+):\s*$").expect("valid regex"));

/// Bundler adapter driving the `esbuild` command-line binary.
#[derive(Debug, Clone)]
pub struct EsbuildBundler {
    command: String,
}

impl EsbuildBundler {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    /// Command-line arguments for one run.
    pub fn args(request: &BundleRequest) -> Vec<OsString> {
        let options = &request.options;
        let mut args: Vec<OsString> = request
            .entry_points
            .iter()
            .map(|entry| entry.clone().into_os_string())
            .collect();

        args.push("--bundle".into());
        args.push(format!("--platform={}", options.platform.as_str()).into());
        args.push(format!("--target={}", options.target).into());
        args.push(format!("--format={}", options.format.as_str()).into());
        args.push(path_flag("--outdir=", &request.outdir));
        args.push(path_flag("--outbase=", &request.outbase));
        if options.minify {
            args.push("--minify".into());
        }
        args.push(format!("--tree-shaking={}", options.tree_shaking).into());
        for module in &options.external {
            args.push(format!("--external:{module}").into());
        }
        args.push("--log-level=warning".into());
        args
    }
}

impl Default for EsbuildBundler {
    fn default() -> Self {
        Self::new("esbuild")
    }
}

fn path_flag(flag: &str, path: &Path) -> OsString {
    let mut arg = OsString::from(flag);
    arg.push(path.as_os_str());
    arg
}

/// Split esbuild's stderr into error and warning messages.
pub fn parse_diagnostics(stderr: &str) -> BundleOutput {
    let mut output = BundleOutput::default();
    // true while the last message opened was an error
    let mut current: Option<bool> = None;

    for line in stderr.lines() {
        if let Some(text) = message_text(line, "[ERROR]") {
            output.errors.push(BundleMessage {
                text,
                location: None,
            });
            current = Some(true);
            continue;
        }
        if let Some(text) = message_text(line, "[WARNING]") {
            output.warnings.push(BundleMessage {
                text,
                location: None,
            });
            current = Some(false);
            continue;
        }

        let Some(captures) = LOCATION_LINE.captures(line) else {
            continue;
        };
        let message = match current {
            Some(true) => output.errors.last_mut(),
            Some(false) => output.warnings.last_mut(),
            None => None,
        };
        if let Some(message) = message {
            if message.location.is_none() {
                message.location = Some(captures[1].to_string());
            }
        }
    }

    output
}

fn message_text(line: &str, marker: &str) -> Option<String> {
    let (_, rest) = line.split_once(marker)?;
    Some(rest.trim().to_string())
}

#[async_trait]
impl Bundler for EsbuildBundler {
    async fn bundle(&self, request: &BundleRequest) -> BundlerResult<BundleOutput> {
        let args = Self::args(request);
        tracing::debug!("Running {} with {} entry point(s)", self.command, request.entry_points.len());

        let output = Command::new(&self.command)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| BundlerError::Spawn {
                command: self.command.clone(),
                source,
            })?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        let mut diagnostics = parse_diagnostics(&stderr);

        if !output.status.success() && diagnostics.errors.is_empty() {
            let detail = stderr.trim();
            diagnostics.errors.push(BundleMessage {
                text: if detail.is_empty() {
                    format!("{} exited with {}", self.command, output.status)
                } else {
                    format!("{} exited with {}: {}", self.command, output.status, detail)
                },
                location: None,
            });
        }

        Ok(diagnostics)
    }
}
