//! Core library for bridging Thread node telemetry into the OTNS visualizer
//!
//! This crate turns status lines emitted by Thread nodes, either live from a
//! running test harness or replayed from a recorded log, into the OTNS event
//! stream and command stream: per-node UDP status pushes plus RPC commands for
//! node creation, placement, titles and replay speed.

pub mod command;
pub mod config;
pub mod event;
pub mod export;
pub mod interpreter;
pub mod layout;
pub mod node;
pub mod replay;
pub mod topology;
pub mod transport;

// Re-export commonly used types
pub use anyhow::Result;
pub use command::{CommandChannel, CommandClient, GrpcChannel, RecordingChannel};
pub use config::BridgeConfig;
pub use event::{Event, EventType};
pub use node::{NodeState, Role, Status};
pub use replay::Replayer;
pub use topology::{DeviceHandle, ManagerSettings, TopologyManager};
