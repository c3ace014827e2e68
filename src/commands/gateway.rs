//! Password-gated access to PM2.
//!
//! Every request path (HTTP execute, HTTP process listing, WebSocket push
//! loop) goes through [`CommandGateway`], which checks the shared secret,
//! validates the command against [`Pm2Command`], and runs it with a fixed
//! timeout through a [`CommandExecutor`].

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::executor::CommandExecutor;
use super::pm2::{Pm2Command, Target};
use super::process_monitor::ProcessSnapshot;
use crate::error::ApiError;

pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// Outcome of one PM2 invocation, serialized as the `/api/execute` body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub stderr: String,
}

impl ExecutionReport {
    pub fn succeeded(output: String, stderr: String) -> Self {
        Self {
            success: true,
            output: Some(output),
            error: None,
            stderr,
        }
    }

    pub fn failed(error: String, stderr: String) -> Self {
        Self {
            success: false,
            output: None,
            error: Some(error),
            stderr,
        }
    }
}

pub struct CommandGateway {
    password_digest: [u8; 32],
    program: String,
    executor: Arc<dyn CommandExecutor>,
    timeout: Duration,
}

impl CommandGateway {
    pub fn new(password: &str, executor: Arc<dyn CommandExecutor>) -> Self {
        Self {
            password_digest: digest(password),
            program: super::pm2::TOOL.to_string(),
            executor,
            timeout: COMMAND_TIMEOUT,
        }
    }

    /// Overrides the binary used to run PM2 commands.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Checks `secret` against the configured password.
    ///
    /// Both sides are hashed first and the digests compared in full, so the
    /// time taken does not depend on how much of the secret was right.
    pub fn authenticate(&self, secret: Option<&str>) -> Result<(), ApiError> {
        let Some(secret) = secret else {
            return Err(ApiError::Unauthorized);
        };
        let candidate = digest(secret);
        let diff = self
            .password_digest
            .iter()
            .zip(candidate.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b));
        if diff == 0 {
            Ok(())
        } else {
            Err(ApiError::Unauthorized)
        }
    }

    /// Authenticates, validates and runs a caller-supplied command line.
    pub async fn execute(
        &self,
        secret: Option<&str>,
        command: &str,
    ) -> Result<ExecutionReport, ApiError> {
        self.authenticate(secret)?;

        let command = Pm2Command::parse(command).inspect_err(|e| {
            log::warn!("Rejected command {:?}: {}", command, e);
        })?;

        if let Some(target) = command.target().filter(|t| **t != Target::All) {
            let known = match self.known_processes().await {
                Ok(snapshot) => snapshot,
                Err(report) => return Ok(report),
            };
            if !known.contains(target) {
                log::warn!("Rejected {}: no such process", command);
                return Err(ApiError::CommandRejected(format!(
                    "Unknown process: {}",
                    target
                )));
            }
        }

        Ok(self.run(&command).await)
    }

    /// Runs an already-authorized command.
    pub async fn run(&self, command: &Pm2Command) -> ExecutionReport {
        let args = command.to_args();

        match tokio::time::timeout(self.timeout, self.executor.run(&self.program, &args)).await {
            Err(_) => {
                log::warn!("{} timed out after {:?}", command, self.timeout);
                ExecutionReport::failed(
                    format!("Command timed out after {:?}: {}", self.timeout, command),
                    String::new(),
                )
            }
            Ok(Err(e)) => {
                log::error!("{} could not be started: {}", command, e);
                ExecutionReport::failed(e.to_string(), String::new())
            }
            Ok(Ok(output)) if output.success() => {
                ExecutionReport::succeeded(output.stdout, output.stderr)
            }
            Ok(Ok(output)) => {
                let code = output
                    .exit_code
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "signal".to_string());
                log::debug!("{} exited with {}", command, code);
                ExecutionReport::failed(
                    format!("Command failed with exit code {}: {}", code, command),
                    output.stderr,
                )
            }
        }
    }

    /// Current process list, parsed.
    pub async fn snapshot(&self) -> Result<ProcessSnapshot, ApiError> {
        let report = self.run(&Pm2Command::List).await;
        if !report.success {
            return Err(ApiError::Execution(
                report.error.unwrap_or_else(|| "pm2 jlist failed".to_string()),
            ));
        }
        Ok(ProcessSnapshot::parse(report.output.as_deref().unwrap_or_default())?)
    }

    async fn known_processes(&self) -> Result<ProcessSnapshot, ExecutionReport> {
        let report = self.run(&Pm2Command::List).await;
        if !report.success {
            return Err(report);
        }
        ProcessSnapshot::parse(report.output.as_deref().unwrap_or_default()).map_err(|e| {
            ExecutionReport::failed(
                format!("Failed to parse process list: {}", e),
                report.stderr.clone(),
            )
        })
    }
}

fn digest(value: &str) -> [u8; 32] {
    Sha256::digest(value.as_bytes()).into()
}
