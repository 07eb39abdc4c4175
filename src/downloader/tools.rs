// External tool detection (extraction engine and media converter)

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::utils::{find_binary, run_output_with_timeout};

const VERSION_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ToolType {
    YtDlp,
    Ffmpeg,
}

impl ToolType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolType::YtDlp => "yt-dlp",
            ToolType::Ffmpeg => "ffmpeg",
        }
    }

    /// Environment variable that overrides the lookup
    pub fn env_var(&self) -> &'static str {
        match self {
            ToolType::YtDlp => "YTDLP_PATH",
            ToolType::Ffmpeg => "FFMPEG_PATH",
        }
    }

    fn version_arg(&self) -> &'static str {
        match self {
            ToolType::YtDlp => "--version",
            ToolType::Ffmpeg => "-version", // ffmpeg uses a single dash
        }
    }

    /// Without the engine nothing can run; the converter only limits
    /// post-processing
    pub fn is_required(&self) -> bool {
        matches!(self, ToolType::YtDlp)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub tool_type: ToolType,
    pub version: Option<String>,
    pub path: PathBuf,
    pub is_available: bool,
}

impl ToolInfo {
    pub fn status_line(&self) -> String {
        match (&self.version, self.is_available) {
            (Some(version), true) => {
                format!("✓ {} {} ({})", self.name, version, self.path.display())
            }
            _ => format!("✗ {} not found", self.name),
        }
    }
}

#[derive(Default)]
pub struct ToolManager;

impl ToolManager {
    pub fn new() -> Self {
        Self
    }

    pub fn locate(&self, tool_type: ToolType) -> PathBuf {
        find_binary(tool_type.as_str(), tool_type.env_var())
    }

    /// Version check for one tool
    pub async fn get_tool_info(&self, tool_type: ToolType) -> ToolInfo {
        let path = self.locate(tool_type);
        let version = self.get_version(&path, tool_type).await;

        ToolInfo {
            name: tool_type.as_str().to_string(),
            tool_type,
            is_available: version.is_some(),
            version,
            path,
        }
    }

    pub async fn get_all_tools(&self) -> Vec<ToolInfo> {
        vec![
            self.get_tool_info(ToolType::YtDlp).await,
            self.get_tool_info(ToolType::Ffmpeg).await,
        ]
    }

    /// Startup check. A missing converter is only a warning; a missing
    /// engine is reported by the first job that needs it.
    pub async fn check_environment(&self) -> Vec<ToolInfo> {
        let tools = self.get_all_tools().await;
        for tool in &tools {
            if tool.is_available {
                debug!(tool = %tool.name, version = ?tool.version, "Tool found");
            } else if tool.tool_type.is_required() {
                warn!(tool = %tool.name, "Extraction engine not found; downloads will fail");
            } else {
                warn!(
                    tool = %tool.name,
                    "Media converter not found; conversion and merging may fail"
                );
            }
        }
        tools
    }

    async fn get_version(&self, path: &Path, tool_type: ToolType) -> Option<String> {
        let args = [tool_type.version_arg().to_string()];
        match run_output_with_timeout(path, &args, VERSION_TIMEOUT_SECS).await {
            Ok(output) if output.status.success() => {
                parse_version(tool_type, &String::from_utf8_lossy(&output.stdout))
            }
            Ok(_) => None,
            Err(e) => {
                debug!(tool = tool_type.as_str(), error = %e, "Version check failed");
                None
            }
        }
    }
}

/// yt-dlp prints the bare version; ffmpeg prints "ffmpeg version X Copyright ..."
fn parse_version(tool_type: ToolType, stdout: &str) -> Option<String> {
    let first = stdout.lines().next()?.trim();
    if first.is_empty() {
        return None;
    }
    match tool_type {
        ToolType::YtDlp => Some(first.to_string()),
        ToolType::Ffmpeg => first
            .strip_prefix("ffmpeg version ")
            .and_then(|rest| rest.split_whitespace().next())
            .map(str::to_string)
            .or_else(|| Some(first.to_string())),
    }
}
