use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::layout::{Grouping, LayoutParams};
use crate::node::Position;
use crate::topology::{DEFAULT_ROOT_ENTITY, DeviceHandle};

pub const DEFAULT_COMMAND_PORT: u16 = 8999;
pub const DEFAULT_EVENT_PORT: u16 = 9000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("device {name} has node id 0")]
    ZeroNodeId { name: String },

    #[error("node id {0} is used by more than one device")]
    DuplicateNodeId(u32),

    #[error("device {0} is configured more than once")]
    DuplicateName(String),

    #[error("device {name} needs both x and y for a fixed position")]
    PartialPosition { name: String },

    #[error("layout radius must be positive, got {0}")]
    InvalidRadius(i32),

    #[error("event port {event_port} + node id {node_id} of device {name} exceeds 65535")]
    PortOverflow {
        name: String,
        event_port: u16,
        node_id: u32,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisualizerConfig {
    pub host: String,
    pub command_port: u16,
    pub event_port: u16,
    /// Local address for node sockets; discovered from the route to `host`
    /// when unset
    pub local_host: Option<IpAddr>,
    pub connect_timeout_secs: u64,
}

impl Default for VisualizerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            command_port: DEFAULT_COMMAND_PORT,
            event_port: DEFAULT_EVENT_PORT,
            local_host: None,
            connect_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    pub center_x: i32,
    pub center_y: i32,
    pub radius: i32,
    pub grouping: Grouping,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        let params = LayoutParams::default();
        Self {
            center_x: params.center.x,
            center_y: params.center.y,
            radius: params.radius,
            grouping: params.grouping,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub name: String,
    /// Defaults to the device's 1-based position in the list
    #[serde(default)]
    pub node_id: Option<u32>,
    #[serde(default)]
    pub serial: Option<String>,
    #[serde(default)]
    pub x: Option<i32>,
    #[serde(default)]
    pub y: Option<i32>,
    /// Shell command whose output is monitored in live mode
    #[serde(default)]
    pub command: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub root_entity: String,
    pub visualizer: VisualizerConfig,
    pub layout: LayoutConfig,
    #[serde(rename = "device")]
    pub devices: Vec<DeviceConfig>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            root_entity: DEFAULT_ROOT_ENTITY.to_string(),
            visualizer: VisualizerConfig::default(),
            layout: LayoutConfig::default(),
            devices: Vec::new(),
        }
    }
}

impl BridgeConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: BridgeConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.layout.radius <= 0 {
            return Err(ConfigError::InvalidRadius(self.layout.radius));
        }

        let mut names = HashSet::new();
        let mut ids = HashSet::new();
        for (index, device) in self.devices.iter().enumerate() {
            let node_id = Self::node_id_at(device, index);
            if node_id == 0 {
                return Err(ConfigError::ZeroNodeId {
                    name: device.name.clone(),
                });
            }
            if !names.insert(device.name.as_str()) {
                return Err(ConfigError::DuplicateName(device.name.clone()));
            }
            if !ids.insert(node_id) {
                return Err(ConfigError::DuplicateNodeId(node_id));
            }
            if device.x.is_some() != device.y.is_some() {
                return Err(ConfigError::PartialPosition {
                    name: device.name.clone(),
                });
            }
            let port = u32::from(self.visualizer.event_port).checked_add(node_id);
            if port.is_none_or(|port| port > u32::from(u16::MAX)) {
                return Err(ConfigError::PortOverflow {
                    name: device.name.clone(),
                    event_port: self.visualizer.event_port,
                    node_id,
                });
            }
        }
        Ok(())
    }

    fn node_id_at(device: &DeviceConfig, index: usize) -> u32 {
        device.node_id.unwrap_or(index as u32 + 1)
    }

    /// Points the bridge at another visualizer host
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.visualizer.host = host.into();
        self
    }

    pub fn device_handles(&self) -> Vec<DeviceHandle> {
        self.devices
            .iter()
            .enumerate()
            .map(|(index, device)| {
                let mut handle = DeviceHandle::new(&device.name, Self::node_id_at(device, index));
                handle.serial = device.serial.clone();
                if let (Some(x), Some(y)) = (device.x, device.y) {
                    handle = handle.with_position(Position::new(x, y));
                }
                handle
            })
            .collect()
    }

    pub fn layout_params(&self) -> LayoutParams {
        LayoutParams {
            center: Position::new(self.layout.center_x, self.layout.center_y),
            radius: self.layout.radius,
            grouping: self.layout.grouping,
        }
    }

    /// `host:port` of the command service
    pub fn command_address(&self) -> String {
        format!("{}:{}", self.visualizer.host, self.visualizer.command_port)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.visualizer.connect_timeout_secs)
    }

    /// Resolves the visualizer's UDP event server
    pub async fn event_server(&self) -> Result<SocketAddr> {
        let target = (self.visualizer.host.as_str(), self.visualizer.event_port);
        let addrs: Vec<SocketAddr> = tokio::net::lookup_host(target)
            .await
            .with_context(|| format!("Failed to resolve {}", self.visualizer.host))?
            .collect();
        addrs
            .iter()
            .find(|addr| addr.is_ipv4())
            .or_else(|| addrs.first())
            .copied()
            .with_context(|| format!("No address found for {}", self.visualizer.host))
    }
}
