// Subprocess helpers shared by the engine and tool checks

use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::process::Command as TokioCommand;
use tokio::time::timeout;

/// Failure of a helper subprocess call
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{program} timed out after {secs}s")]
    Timeout { program: String, secs: u64 },

    #[error("I/O error while running {program}: {reason}")]
    Io { program: String, reason: String },
}

impl CommandError {
    /// The executable does not exist (or is not on PATH)
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Spawn { source, .. } if source.kind() == io::ErrorKind::NotFound)
    }
}

/// Run command with timeout, collecting stdout and stderr.
/// The child is killed when the timeout expires.
pub async fn run_output_with_timeout(
    program: &Path,
    args: &[String],
    timeout_secs: u64,
) -> Result<std::process::Output, CommandError> {
    let name = program.display().to_string();
    let io_err = |reason: String| CommandError::Io {
        program: name.clone(),
        reason,
    };

    let mut child = TokioCommand::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| CommandError::Spawn {
            program: name.clone(),
            source,
        })?;

    let mut stdout_pipe = child
        .stdout
        .take()
        .ok_or_else(|| io_err("stdout not captured".to_string()))?;
    let mut stderr_pipe = child
        .stderr
        .take()
        .ok_or_else(|| io_err("stderr not captured".to_string()))?;

    let stdout_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stdout_pipe.read_to_end(&mut buf).await.map(|_| buf)
    });
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stderr_pipe.read_to_end(&mut buf).await.map(|_| buf)
    });

    match timeout(Duration::from_secs(timeout_secs), child.wait()).await {
        Ok(status) => {
            let status = status.map_err(|e| io_err(e.to_string()))?;
            let stdout = stdout_task
                .await
                .map_err(|e| io_err(e.to_string()))?
                .map_err(|e| io_err(e.to_string()))?;
            let stderr = stderr_task
                .await
                .map_err(|e| io_err(e.to_string()))?
                .map_err(|e| io_err(e.to_string()))?;
            Ok(std::process::Output {
                status,
                stdout,
                stderr,
            })
        }
        Err(_) => {
            let _ = child.kill().await;
            stdout_task.abort();
            stderr_task.abort();
            Err(CommandError::Timeout {
                program: name,
                secs: timeout_secs,
            })
        }
    }
}

/// Locate an executable: `env_var` override, common install paths, then PATH.
/// Falls back to the bare name so a missing tool surfaces as a spawn error.
pub fn find_binary(name: &str, env_var: &str) -> PathBuf {
    if let Some(path) = std::env::var_os(env_var).map(PathBuf::from) {
        if path.is_file() {
            return path;
        }
    }

    let file_name = executable_name(name);

    let mut candidates: Vec<PathBuf> = [
        "/opt/homebrew/bin", // Homebrew on Apple Silicon
        "/usr/local/bin",
        "/usr/bin",
    ]
    .iter()
    .map(|dir| Path::new(dir).join(&file_name))
    .collect();
    if let Some(home) = dirs::home_dir() {
        candidates.push(home.join(".local").join("bin").join(&file_name));
    }

    if let Some(found) = candidates.into_iter().find(|p| p.is_file()) {
        return found;
    }

    search_path(&file_name).unwrap_or_else(|| PathBuf::from(file_name))
}

fn search_path(file_name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(file_name))
        .find(|candidate| candidate.is_file())
}

fn executable_name(name: &str) -> String {
    if cfg!(windows) && !name.ends_with(".exe") {
        format!("{}.exe", name)
    } else {
        name.to_string()
    }
}
