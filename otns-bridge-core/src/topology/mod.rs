mod manager;
mod monitor;

pub use manager::TopologyManager;
pub use monitor::Subscription;

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};

use crate::layout::LayoutParams;
use crate::node::Position;

/// Default reserved top-level entity of the test harness logger
pub const DEFAULT_ROOT_ENTITY: &str = "silk";

/// A device the bridge may visualize
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceHandle {
    /// Entity segment naming the device in log lines
    pub name: String,
    pub node_id: u32,
    pub serial: Option<String>,
    /// Externally fixed position; `None` leaves placement to the layout engine
    pub position: Option<Position>,
}

impl DeviceHandle {
    pub fn new(name: impl Into<String>, node_id: u32) -> Self {
        Self {
            name: name.into(),
            node_id,
            serial: None,
            position: None,
        }
    }

    pub fn with_position(mut self, position: Position) -> Self {
        self.position = Some(position);
        self
    }

    pub fn with_serial(mut self, serial: impl Into<String>) -> Self {
        self.serial = Some(serial.into());
        self
    }
}

/// Where events go and how nodes are laid out
#[derive(Debug, Clone)]
pub struct ManagerSettings {
    /// Visualizer UDP event server
    pub event_server: SocketAddr,
    /// Local address node sockets bind to
    pub local_host: IpAddr,
    pub layout: LayoutParams,
    pub root_entity: String,
}

impl ManagerSettings {
    pub fn new(event_server: SocketAddr, local_host: IpAddr) -> Self {
        Self {
            event_server,
            local_host,
            layout: LayoutParams::default(),
            root_entity: DEFAULT_ROOT_ENTITY.to_string(),
        }
    }

    pub fn with_layout(mut self, layout: LayoutParams) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_root_entity(mut self, root: impl Into<String>) -> Self {
        self.root_entity = root.into();
        self
    }
}
