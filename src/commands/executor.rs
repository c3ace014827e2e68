//! Spawning of external commands.

use std::process::Stdio;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;

/// Captured result of a finished process.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandOutput {
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Runs one program with an argument vector and waits for it to finish.
///
/// Implementations must release the child if the returned future is dropped,
/// which is how the gateway enforces its timeout.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput, ExecError>;
}

/// Executes commands as real OS processes.
#[derive(Debug, Clone, Default)]
pub struct ProcessExecutor;

#[async_trait]
impl CommandExecutor for ProcessExecutor {
    async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput, ExecError> {
        log::debug!("Spawning {} {:?}", program, args);

        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| ExecError::Spawn {
                program: program.to_string(),
                source,
            })?;

        Ok(CommandOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Locates the pm2 binary, falling back to a bare `pm2` resolved through PATH at spawn time.
pub fn find_pm2_binary() -> String {
    let home_path = dirs::home_dir()
        .map(|home| home.join(".npm-global/bin/pm2").to_string_lossy().into_owned())
        .unwrap_or_default();
    let candidates = ["pm2", "/usr/local/bin/pm2", "/usr/bin/pm2", "/opt/homebrew/bin/pm2", home_path.as_str()];

    for candidate in candidates {
        if candidate.is_empty() {
            continue;
        }
        if let Ok(path) = which::which(candidate) {
            log::info!("Using pm2 binary: {}", path.display());
            return path.to_string_lossy().into_owned();
        }
    }

    log::warn!("pm2 binary not found in PATH or standard locations; commands will fail until it is installed");
    "pm2".to_string()
}
