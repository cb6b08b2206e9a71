//! Media engine boundary.
//!
//! The orchestrator talks to ffmpeg/ffprobe only through [`MediaEngine`], so
//! tests can run the whole pipeline against a scripted double. The real
//! implementation spawns ffmpeg with `-progress pipe:1`, drains stderr on a
//! dedicated thread (the OS pipe buffer is ~64KB; leaving stderr unread
//! deadlocks ffmpeg against our stdout read), and polls a cancel flag so an
//! interrupt kills the subprocess and removes the partial output.

use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use tracing::{debug, info, warn};

use crate::errors::{PressError, Result};
use crate::probe::{self, MediaStreamSet};

/// Shared interrupt flag, set from the ctrl-c handler.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Immutable snapshot of one encode attempt: everything ffmpeg needs, built
/// fresh from a probe. `args` is the complete argument list including `-i`
/// and the output path.
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    pub input: PathBuf,
    pub output: PathBuf,
    pub args: Vec<String>,
    pub duration_hint: Option<f64>,
}

/// Global flags applied on every invocation, ahead of the plan's own args.
const GLOBAL_ARGS: &[&str] = &["-y", "-hide_banner", "-nostdin", "-v", "error"];

pub trait MediaEngine {
    fn probe(&self, path: &Path) -> Result<MediaStreamSet>;

    /// Run the plan to completion. `on_progress` receives fractions in
    /// (0.0, 1.0]; zero-progress events are suppressed before it is called.
    fn execute(&self, plan: &ExecutionPlan, on_progress: &mut dyn FnMut(f64)) -> Result<()>;

    /// Reconstruct the full command line for error reports.
    fn command_line(&self, plan: &ExecutionPlan) -> String;
}

pub struct FfmpegEngine {
    cancel: CancelFlag,
}

impl FfmpegEngine {
    pub fn new(cancel: CancelFlag) -> Self {
        Self { cancel }
    }
}

impl MediaEngine for FfmpegEngine {
    fn probe(&self, path: &Path) -> Result<MediaStreamSet> {
        probe::probe(path)
    }

    fn execute(&self, plan: &ExecutionPlan, on_progress: &mut dyn FnMut(f64)) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(PressError::Cancelled);
        }

        info!(command = %self.command_line(plan), "Executing ffmpeg");

        let mut cmd = Command::new("ffmpeg");
        cmd.args(GLOBAL_ARGS)
            .args(["-progress", "pipe:1"])
            .args(&plan.args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .map_err(|e| PressError::Execution(format!("Failed to spawn ffmpeg: {}", e)))?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| PressError::Execution("Failed to capture ffmpeg stderr".into()))?;
        let stderr_thread = thread::spawn(move || {
            let mut buf = String::new();
            for line in BufReader::new(stderr).lines().map_while(|l| l.ok()) {
                buf.push_str(&line);
                buf.push('\n');
            }
            buf
        });

        let mut parser = ProgressParser::new(plan.duration_hint);
        if let Some(stdout) = child.stdout.take() {
            for line in BufReader::new(stdout).lines().map_while(|l| l.ok()) {
                if self.cancel.is_cancelled() {
                    let _ = child.kill();
                    let _ = child.wait();
                    let _ = stderr_thread.join();
                    if plan.output.exists() {
                        warn!("Removing partial output: {}", plan.output.display());
                        let _ = std::fs::remove_file(&plan.output);
                    }
                    return Err(PressError::Cancelled);
                }
                if let Some(fraction) = parser.parse_line(&line) {
                    if fraction > 0.0 {
                        on_progress(fraction.min(1.0));
                    }
                }
            }
        }

        let status = child
            .wait()
            .map_err(|e| PressError::Execution(format!("Failed to wait for ffmpeg: {}", e)))?;
        let stderr_output = stderr_thread.join().unwrap_or_default();

        if !status.success() {
            let _ = std::fs::remove_file(&plan.output);
            return Err(PressError::Execution(format_engine_error(&stderr_output)));
        }

        debug!(exit_code = status.code(), "ffmpeg completed");
        Ok(())
    }

    fn command_line(&self, plan: &ExecutionPlan) -> String {
        let mut parts: Vec<String> = vec!["ffmpeg".into()];
        parts.extend(GLOBAL_ARGS.iter().map(|s| s.to_string()));
        parts.push("-progress".into());
        parts.push("pipe:1".into());
        parts.extend(plan.args.iter().cloned());
        parts.join(" ")
    }
}

/// Parses `-progress pipe:1` key=value output into a completion fraction.
struct ProgressParser {
    total_secs: Option<f64>,
    current_secs: f64,
}

impl ProgressParser {
    fn new(total_secs: Option<f64>) -> Self {
        Self {
            total_secs: total_secs.filter(|d| *d > 0.0),
            current_secs: 0.0,
        }
    }

    fn parse_line(&mut self, line: &str) -> Option<f64> {
        if let Some(us) = line.strip_prefix("out_time_ms=") {
            // Despite the key name, the value is in microseconds.
            if let Ok(us) = us.trim().parse::<i64>() {
                self.current_secs = us.max(0) as f64 / 1_000_000.0;
            }
        } else if let Some(end) = line.strip_prefix("progress=") {
            if end.trim() == "end" {
                return Some(1.0);
            }
        }

        let total = self.total_secs?;
        if self.current_secs > 0.0 {
            Some((self.current_secs / total).min(1.0))
        } else {
            None
        }
    }
}

/// Pull the most meaningful line out of ffmpeg's stderr: prefer lines that
/// mention an error, otherwise the last non-progress line.
pub fn format_engine_error(stderr: &str) -> String {
    if let Some(error_line) = stderr
        .lines()
        .rev()
        .find(|line| line.contains("Error") || line.contains("error"))
    {
        return error_line.trim().to_string();
    }

    stderr
        .lines()
        .rev()
        .find(|line| {
            let trimmed = line.trim();
            !trimmed.is_empty() && !trimmed.starts_with("frame=") && !trimmed.starts_with("size=")
        })
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| "Unknown ffmpeg error".to_string())
}

/// Both binaries must be on PATH before any conversion starts.
pub fn require_tools() -> Result<()> {
    for tool in ["ffmpeg", "ffprobe"] {
        if which::which(tool).is_err() {
            return Err(PressError::ToolNotFound(tool.to_string()));
        }
    }
    Ok(())
}
