//! Textual command protocol of the visualizer
//!
//! Every command is a single line of text sent through a [`CommandChannel`];
//! the production channel is the visualizer's gRPC `Command` call.

mod grpc;

pub use grpc::GrpcChannel;

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{info, warn};

use crate::node::Position;

/// Default title placement and font size
pub const TITLE_X: i32 = 0;
pub const TITLE_Y: i32 = 20;
pub const TITLE_FONT_SIZE: u32 = 20;

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("visualizer command channel at {endpoint} unavailable after {timeout:?}: {reason}")]
    Unavailable {
        endpoint: String,
        timeout: std::time::Duration,
        reason: String,
    },

    #[error("invalid visualizer endpoint {endpoint}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("command transport failed: {0}")]
    Transport(String),

    #[error("command RPC failed: {0}")]
    Rpc(#[from] tonic::Status),

    #[error("visualizer rejected `{command}`: {reason}")]
    Rejected { command: String, reason: String },
}

/// Visualizer commands
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    AddNode { node_id: u32, position: Position },
    MoveNode { node_id: u32, position: Position },
    DeleteNode { node_id: u32 },
    Title { text: String, x: i32, y: i32, font_size: u32 },
    Speed(f64),
    NetInfo { version: Option<String>, commit: Option<String> },
}

/// Command arguments are wrapped in double quotes, so drop any inside them.
fn quoted(text: &str) -> String {
    text.replace('"', "")
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::AddNode { node_id, position } => write!(
                f,
                "add router x {x} y {y} id {node_id}",
                x = position.x,
                y = position.y
            ),
            Command::MoveNode { node_id, position } => {
                write!(f, "move {node_id} {x} {y}", x = position.x, y = position.y)
            }
            Command::DeleteNode { node_id } => write!(f, "del {node_id}"),
            Command::Title {
                text,
                x,
                y,
                font_size,
            } => write!(f, "title \"{}\" x {x} y {y} fs {font_size}", quoted(text)),
            Command::Speed(speed) => write!(f, "speed {speed}"),
            Command::NetInfo { version, commit } => {
                f.write_str("netinfo")?;
                if let Some(version) = version {
                    write!(f, " version \"{}\"", quoted(version))?;
                }
                if let Some(commit) = commit {
                    write!(f, " commit \"{}\"", quoted(commit))?;
                }
                f.write_str(" real y")
            }
        }
    }
}

/// Transport for textual commands
pub trait CommandChannel: Send + Sync {
    /// Sends one command, returning the visualizer's output lines
    fn command(&self, command: &str)
    -> impl Future<Output = Result<Vec<String>, CommandError>> + Send;
}

/// Channel that only records and logs commands.
///
/// Used for dry runs and tests; clones share the same record.
#[derive(Debug, Clone, Default)]
pub struct RecordingChannel {
    commands: Arc<Mutex<Vec<String>>>,
}

impl RecordingChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commands received so far, oldest first
    pub fn commands(&self) -> Vec<String> {
        match self.commands.lock() {
            Ok(commands) => commands.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl CommandChannel for RecordingChannel {
    async fn command(&self, command: &str) -> Result<Vec<String>, CommandError> {
        match self.commands.lock() {
            Ok(mut commands) => commands.push(command.to_string()),
            Err(poisoned) => poisoned.into_inner().push(command.to_string()),
        }
        Ok(vec!["Done".to_string()])
    }
}

/// Typed front end over a [`CommandChannel`]
pub struct CommandClient<C> {
    channel: C,
}

impl<C: CommandChannel> CommandClient<C> {
    pub fn new(channel: C) -> Self {
        Self { channel }
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub async fn send(&self, command: Command) -> Result<Vec<String>, CommandError> {
        let text = command.to_string();
        let output = self.channel.command(&text).await?;
        info!("Sent cmd: {text}, response: {output:?}");

        if let Some(error) = output.iter().find(|line| line.starts_with("Error")) {
            return Err(CommandError::Rejected {
                command: text,
                reason: error.clone(),
            });
        }
        Ok(output)
    }

    /// Sends a command whose failure must not interrupt the session
    pub async fn send_logged(&self, command: Command) {
        if let Err(e) = self.send(command).await {
            warn!("Visualizer command failed: {e}");
        }
    }

    pub async fn add_node(&self, node_id: u32, position: Position) {
        self.send_logged(Command::AddNode { node_id, position }).await
    }

    pub async fn move_node(&self, node_id: u32, position: Position) {
        self.send_logged(Command::MoveNode { node_id, position }).await
    }

    pub async fn delete_node(&self, node_id: u32) {
        self.send_logged(Command::DeleteNode { node_id }).await
    }

    pub async fn set_title(&self, text: &str) {
        self.send_logged(Command::Title {
            text: text.to_string(),
            x: TITLE_X,
            y: TITLE_Y,
            font_size: TITLE_FONT_SIZE,
        })
        .await
    }

    pub async fn set_speed(&self, speed: f64) {
        self.send_logged(Command::Speed(speed)).await
    }

    pub async fn set_network_info(&self, version: Option<String>, commit: Option<String>) {
        self.send_logged(Command::NetInfo { version, commit }).await
    }
}
