//! Handler execution through a Node.js child process.
//!
//! Every invocation spawns a fresh process which imports the handler module,
//! so edits are picked up without any module cache to invalidate. The
//! request travels as JSON on stdin and the reply comes back as one JSON
//! document on stdout; anything the handler logs is routed to stderr and
//! forwarded to tracing.
use std::{
    path::{Path, PathBuf},
    process::Stdio,
    time::Instant,
};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tokio::{
    io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader},
    process::Command,
};
use tracing::Instrument;

use crate::{
    config::models::DevConfig,
    core::request::RequestContext,
    ports::{
        export_inspector::{ExportInspector, InspectError, InspectResult},
        handler_runtime::{HandlerRuntime, Invocation, RuntimeError, RuntimeResult},
    },
    tracing_setup::create_invocation_span,
};

/// Environment variable naming the module to import.
pub const HANDLER_FILE_ENV: &str = "FNLY_HANDLER_FILE";
/// Environment variable selecting `invoke` or `exports`.
pub const MODE_ENV: &str = "FNLY_MODE";

const BOOTSTRAP: &str = r#"
console.log = (...args) => console.error(...args);
const chunks = [];
for await (const chunk of process.stdin) chunks.push(chunk);
const request = JSON.parse(Buffer.concat(chunks).toString("utf8") || "{}");
const { pathToFileURL } = await import("node:url");
const write = (payload) => process.stdout.write(JSON.stringify(payload));
try {
  const mod = await import(pathToFileURL(process.env.FNLY_HANDLER_FILE).href);
  if (process.env.FNLY_MODE === "exports") {
    write({ ok: true, exports: Object.keys(mod) });
  } else {
    const handler = mod[String(request.method || "").toUpperCase()];
    if (typeof handler !== "function") {
      write({ ok: true, found: false });
    } else {
      const result = await handler(request);
      write({ ok: true, found: true, result: result ?? null });
    }
  }
} catch (err) {
  write({ ok: false, error: err instanceof Error ? err.message : String(err) });
}
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Invoke,
    Exports,
}

impl Mode {
    fn as_str(&self) -> &'static str {
        match self {
            Mode::Invoke => "invoke",
            Mode::Exports => "exports",
        }
    }
}

/// One reply document written by the bootstrap script.
#[derive(Debug, Deserialize, PartialEq)]
#[serde(untagged)]
enum Reply {
    Failed {
        error: String,
    },
    Exports {
        exports: Vec<String>,
    },
    Invoked {
        found: bool,
        #[serde(default)]
        result: Value,
    },
}

/// Runs handler modules with `node` (or any compatible command).
#[derive(Debug, Clone)]
pub struct NodeRuntime {
    command: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
}

impl NodeRuntime {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            working_dir: None,
        }
    }

    pub fn from_config(config: &DevConfig) -> Self {
        Self::new(config.runtime_command.clone(), config.runtime_args.clone())
    }

    /// Run child processes from `dir` so project-local loaders resolve.
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    async fn run(&self, file: &Path, mode: Mode, input: &[u8]) -> RuntimeResult<Reply> {
        let span = create_invocation_span(file, mode.as_str());
        let started = Instant::now();

        let reply = self.spawn_and_wait(file, mode, input).instrument(span.clone()).await;
        span.record("duration_ms", started.elapsed().as_millis() as u64);
        reply
    }

    async fn spawn_and_wait(&self, file: &Path, mode: Mode, input: &[u8]) -> RuntimeResult<Reply> {
        let mut command = Command::new(&self.command);
        command
            .args(&self.args)
            .arg("--input-type=module")
            .arg("--eval")
            .arg(BOOTSTRAP)
            .env(HANDLER_FILE_ENV, file)
            .env(MODE_ENV, mode.as_str())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|source| RuntimeError::Spawn {
            command: self.command.clone(),
            source,
        })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(input).await?;
            stdin.shutdown().await?;
        }

        let stderr_task = child.stderr.take().map(|stderr| {
            let file = file.display().to_string();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::info!(target: "fnly::handler", handler = %file, "{}", line);
                }
            })
        });

        let mut stdout = Vec::new();
        if let Some(mut out) = child.stdout.take() {
            out.read_to_end(&mut stdout).await?;
        }
        let status = child.wait().await?;
        if let Some(task) = stderr_task {
            let _ = task.await;
        }

        let stdout = String::from_utf8_lossy(&stdout);
        match parse_reply(&stdout) {
            Some(reply) => Ok(reply),
            None if !status.success() => Err(RuntimeError::Protocol(format!(
                "{} exited with {} without a reply",
                self.command, status
            ))),
            None => Err(RuntimeError::Protocol(format!(
                "unrecognised output: {}",
                stdout.trim()
            ))),
        }
    }
}

impl Default for NodeRuntime {
    fn default() -> Self {
        Self::from_config(&DevConfig::default())
    }
}

/// Parse the reply document; tolerates stray output before the final line.
fn parse_reply(stdout: &str) -> Option<Reply> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return None;
    }
    serde_json::from_str(trimmed).ok().or_else(|| {
        trimmed
            .lines()
            .last()
            .and_then(|line| serde_json::from_str(line.trim()).ok())
    })
}

#[async_trait]
impl HandlerRuntime for NodeRuntime {
    async fn invoke(&self, file: &Path, request: &RequestContext) -> RuntimeResult<Invocation> {
        let input = serde_json::to_vec(request)
            .map_err(|e| RuntimeError::Protocol(format!("failed to encode request: {e}")))?;

        match self.run(file, Mode::Invoke, &input).await? {
            Reply::Failed { error } => Err(RuntimeError::Handler(error)),
            Reply::Invoked { found: false, .. } => Ok(Invocation::MethodNotFound),
            Reply::Invoked { result, .. } => Ok(Invocation::Handled(result)),
            Reply::Exports { .. } => Err(RuntimeError::Protocol(
                "expected an invocation result, got an export list".to_string(),
            )),
        }
    }
}

#[async_trait]
impl ExportInspector for NodeRuntime {
    async fn exports(&self, file: &Path) -> InspectResult<Vec<String>> {
        let reply = self
            .run(file, Mode::Exports, b"{}")
            .await
            .map_err(|e| InspectError::Load(e.to_string()))?;

        match reply {
            Reply::Exports { exports } => Ok(exports),
            Reply::Failed { error } => Err(InspectError::Load(error)),
            Reply::Invoked { .. } => Err(InspectError::Load(
                "expected an export list, got an invocation result".to_string(),
            )),
        }
    }
}
