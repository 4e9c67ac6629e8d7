//! Subprocess boundary to the external scanning engine.

use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

use crate::config::OutputFormat;
use crate::models::finding::Severity;

/// Time allowed for a `-version` probe.
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Arguments for a single engine run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub target: String,
    /// Already existence-checked. Empty means "use the engine's own corpus".
    pub templates: Vec<String>,
    pub rate_limit: u32,
    pub severities: Vec<Severity>,
    pub output: OutputFormat,
}

impl Invocation {
    /// Command-line arguments, one `-t` flag per template.
    pub fn args(&self) -> Vec<String> {
        let mut args = vec!["-u".to_string(), self.target.clone()];
        for template in &self.templates {
            args.push("-t".to_string());
            args.push(template.clone());
        }
        args.push("-rl".to_string());
        args.push(self.rate_limit.to_string());
        if !self.severities.is_empty() {
            let list: Vec<&str> = self.severities.iter().map(Severity::as_str).collect();
            args.push("-severity".to_string());
            args.push(list.join(","));
        }
        if self.output == OutputFormat::Jsonl {
            args.push("-jsonl".to_string());
        }
        args.push("-no-interactsh".to_string());
        args.push("-nc".to_string());
        args
    }
}

/// Captured result of a finished engine process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineOutput {
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl EngineOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("failed to start scanner: {0}")]
    Spawn(#[source] io::Error),

    #[error("scanner I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("scanner did not finish within {0:?}")]
    TimedOut(Duration),
}

/// Something that can run a scan invocation to completion.
#[async_trait]
pub trait ScanEngine: Send + Sync + std::fmt::Debug {
    /// Run `invocation`, killing the engine if it outlives `timeout`.
    async fn execute(
        &self,
        invocation: &Invocation,
        timeout: Duration,
    ) -> Result<EngineOutput, EngineError>;

    /// Report the engine version, confirming it can be launched.
    async fn version(&self) -> Result<String, EngineError>;
}

/// The real engine: a `nuclei`-compatible executable.
#[derive(Debug, Clone)]
pub struct NucleiEngine {
    binary: PathBuf,
}

impl NucleiEngine {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

async fn read_pipe<R: AsyncRead + Unpin>(pipe: Option<R>) -> io::Result<String> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut buf).await?;
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

#[async_trait]
impl ScanEngine for NucleiEngine {
    async fn execute(
        &self,
        invocation: &Invocation,
        timeout: Duration,
    ) -> Result<EngineOutput, EngineError> {
        let args = invocation.args();
        tracing::info!(
            binary = %self.binary.display(),
            args = %args.join(" "),
            "Executing scanner"
        );

        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(EngineError::Spawn)?;

        let stdout_task = tokio::spawn(read_pipe(child.stdout.take()));
        let stderr_task = tokio::spawn(read_pipe(child.stderr.take()));
        let readers = [stdout_task.abort_handle(), stderr_task.abort_handle()];

        let collect = async {
            let status = child.wait().await?;
            let stdout = stdout_task.await.map_err(io::Error::other)??;
            let stderr = stderr_task.await.map_err(io::Error::other)??;
            Ok::<_, io::Error>(EngineOutput {
                exit_code: status.code(),
                stdout,
                stderr,
            })
        };

        match tokio::time::timeout(timeout, collect).await {
            Ok(result) => Ok(result?),
            Err(_) => {
                tracing::warn!(timeout_secs = timeout.as_secs(), "Scanner timed out, killing it");
                if let Err(e) = child.kill().await {
                    tracing::warn!(error = %e, "Failed to kill scanner process");
                }
                for reader in readers {
                    reader.abort();
                }
                Err(EngineError::TimedOut(timeout))
            }
        }
    }

    async fn version(&self) -> Result<String, EngineError> {
        let output = tokio::time::timeout(
            PROBE_TIMEOUT,
            Command::new(&self.binary)
                .arg("-version")
                .stdin(Stdio::null())
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| EngineError::TimedOut(PROBE_TIMEOUT))?
        .map_err(EngineError::Spawn)?;

        // The engine logs its version on stderr.
        let text = format!(
            "{}\n{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
        Ok(text
            .lines()
            .map(str::trim)
            .find(|line| line.to_ascii_lowercase().contains("version"))
            .or_else(|| text.lines().map(str::trim).find(|line| !line.is_empty()))
            .unwrap_or("unknown")
            .to_string())
    }
}
