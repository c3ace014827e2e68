// Web server types module
// Contains shared types used across web handlers

pub mod broadcaster;
pub mod session;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::commands::executor::CommandExecutor;
use crate::commands::gateway::CommandGateway;
use crate::commands::process_monitor::ProcessSnapshot;
use crate::config::Config;
use session::SessionRegistry;

/// Application state shared across all routes
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub gateway: Arc<CommandGateway>,
    /// Track live WebSocket sessions and their push loops
    pub sessions: Arc<SessionRegistry>,
}

impl AppState {
    pub fn new(config: Config, gateway: CommandGateway) -> Self {
        Self {
            config: Arc::new(config),
            gateway: Arc::new(gateway),
            sessions: Arc::new(SessionRegistry::new()),
        }
    }

    /// State wired to a specific executor and pm2 binary.
    pub fn with_executor(
        config: Config,
        executor: Arc<dyn CommandExecutor>,
        program: impl Into<String>,
    ) -> Self {
        let gateway = CommandGateway::new(&config.password, executor).with_program(program);
        Self::new(config, gateway)
    }
}

/// Frames sent by the browser.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientEvent {
    Authenticate(String),
    Logout,
}

/// Frames sent to the browser.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    Authenticated(bool),
    ProcessUpdate(ProcessSnapshot),
    Error(String),
}

/// A queued frame. Frames produced by a push loop carry its token and are
/// dropped by the writer if the loop was cancelled in the meantime.
#[derive(Debug)]
pub struct Outbound {
    pub event: ServerEvent,
    pub guard: Option<CancellationToken>,
}

impl Outbound {
    pub fn reply(event: ServerEvent) -> Self {
        Self { event, guard: None }
    }

    pub fn guarded(event: ServerEvent, token: CancellationToken) -> Self {
        Self {
            event,
            guard: Some(token),
        }
    }

    pub fn is_stale(&self) -> bool {
        self.guard.as_ref().is_some_and(CancellationToken::is_cancelled)
    }
}
