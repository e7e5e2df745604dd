use anyhow::{Context, Result, bail, ensure};
use chrono::NaiveDateTime;
use std::collections::{BTreeMap, HashMap, HashSet};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{DeviceHandle, ManagerSettings};
use crate::command::{CommandChannel, CommandClient};
use crate::event::Event;
use crate::export::HistoryExport;
use crate::interpreter::{Directive, Interpreter, LineEvent};
use crate::layout::LayoutEngine;
use crate::node::{HistoryRecord, NodeState, Role, Status};
use crate::transport::Transport;

/// A registered node with its exclusively owned event socket
struct TrackedNode {
    state: NodeState,
    transport: Transport,
    auto_layout: bool,
}

impl TrackedNode {
    async fn push(&self, status: &Status) {
        let node_id = self.state.node_id();
        debug!("Node {node_id} sending {status}");
        if let Err(e) = self.transport.send(&Event::status(&status.to_string())).await {
            warn!("Node {node_id} failed to push {status}: {e:#}");
        }
    }
}

struct Topology {
    nodes: BTreeMap<String, TrackedNode>,
    archive: BTreeMap<u32, Vec<HistoryRecord>>,
    /// Devices torn down and not started since
    retired: HashSet<String>,
    layout: LayoutEngine,
}

/// Owns every visualized node for one session.
///
/// Producers (replay loop or live subscriptions) share one manager; the node
/// collection sits behind a single async mutex so each update is applied,
/// pushed and laid out atomically with respect to other producers.
pub struct TopologyManager<C> {
    settings: ManagerSettings,
    devices: HashMap<String, DeviceHandle>,
    interpreter: Interpreter,
    commands: CommandClient<C>,
    topology: Mutex<Topology>,
}

impl<C: CommandChannel> TopologyManager<C> {
    pub fn new(settings: ManagerSettings, devices: Vec<DeviceHandle>, channel: C) -> Result<Self> {
        let mut ids = HashSet::new();
        let mut by_name = HashMap::new();
        for device in devices {
            ensure!(device.node_id > 0, "Device {} has node id 0", device.name);
            ensure!(
                ids.insert(device.node_id),
                "Node id {} is used by more than one device",
                device.node_id
            );
            if by_name.contains_key(&device.name) {
                bail!("Device {} is configured twice", device.name);
            }
            by_name.insert(device.name.clone(), device);
        }

        let interpreter = Interpreter::new(settings.root_entity.clone(), by_name.keys().cloned())?;

        info!(
            "Topology manager created, sending events from {} to {}",
            settings.local_host, settings.event_server
        );

        Ok(Self {
            topology: Mutex::new(Topology {
                nodes: BTreeMap::new(),
                archive: BTreeMap::new(),
                retired: HashSet::new(),
                layout: LayoutEngine::new(settings.layout),
            }),
            settings,
            devices: by_name,
            interpreter,
            commands: CommandClient::new(channel),
        })
    }

    pub fn settings(&self) -> &ManagerSettings {
        &self.settings
    }

    pub fn interpreter(&self) -> &Interpreter {
        &self.interpreter
    }

    pub fn commands(&self) -> &CommandClient<C> {
        &self.commands
    }

    /// Configured device by name
    pub fn device(&self, name: &str) -> Option<&DeviceHandle> {
        self.devices.get(name)
    }

    pub fn devices(&self) -> impl Iterator<Item = &DeviceHandle> {
        self.devices.values()
    }

    /// Registers a device with the visualizer.
    ///
    /// Opens the node's socket, announces it and lays nodes out again.
    /// Registering an already registered device is a no-op returning it.
    pub async fn register(&self, handle: &DeviceHandle) -> Result<NodeState> {
        let mut topology = self.topology.lock().await;
        self.register_locked(&mut topology, handle).await
    }

    async fn register_locked(
        &self,
        topology: &mut Topology,
        handle: &DeviceHandle,
    ) -> Result<NodeState> {
        topology.retired.remove(&handle.name);
        if let Some(node) = topology.nodes.get_mut(&handle.name) {
            debug!("Adding existing node {} to OTNS", node.state.node_id());
            if node.state.create() {
                self.commands
                    .add_node(node.state.node_id(), node.state.position())
                    .await;
            }
            return Ok(node.state.clone());
        }

        if let Some(other) = topology
            .nodes
            .values()
            .find(|node| node.state.node_id() == handle.node_id)
        {
            bail!(
                "Node id {} is already registered for {}",
                handle.node_id,
                other.state.name()
            );
        }

        let transport = Transport::bind(
            self.settings.local_host,
            self.settings.event_server,
            handle.node_id,
        )
        .await?;

        let auto_layout = handle.position.is_none();
        let position = handle
            .position
            .unwrap_or(topology.layout.params().center);
        let mut state = NodeState::new(handle.node_id, handle.name.clone(), position)
            .with_serial(handle.serial.clone());

        debug!("Adding new node {} to OTNS", handle.node_id);
        state.create();
        self.commands.add_node(handle.node_id, position).await;

        let node = TrackedNode {
            state,
            transport,
            auto_layout,
        };
        node.push(&Status::Extaddr(node.state.extaddr())).await;
        topology.nodes.insert(handle.name.clone(), node);

        let count = topology.nodes.len();
        topology.layout.observe(count);
        self.relayout(topology).await;

        topology
            .nodes
            .get(&handle.name)
            .map(|node| node.state.clone())
            .with_context(|| format!("Node {} missing after registration", handle.name))
    }

    /// Withdraws a device: closes its socket, announces deletion and lays the
    /// remaining nodes out again. Unknown devices are ignored.
    pub async fn deregister(&self, handle: &DeviceHandle) {
        let mut topology = self.topology.lock().await;
        self.deregister_locked(&mut topology, &handle.name).await;
        self.relayout(&mut topology).await;
    }

    async fn deregister_locked(&self, topology: &mut Topology, name: &str) {
        let Some(mut node) = topology.nodes.remove(name) else {
            debug!("Node {name} not on OTNS while trying to delete");
            return;
        };
        topology.retired.insert(name.to_string());

        let node_id = node.state.node_id();
        node.transport.close();

        debug!("Removing node {node_id} from OTNS");
        if node.state.delete() {
            self.commands.delete_node(node_id).await;
        }

        topology
            .archive
            .entry(node_id)
            .or_default()
            .extend(node.state.into_history());
    }

    /// Deregisters every node
    pub async fn remove_all(&self) {
        let mut topology = self.topology.lock().await;
        let names: Vec<String> = topology.nodes.keys().cloned().collect();
        for name in names {
            self.deregister_locked(&mut topology, &name).await;
        }
    }

    /// Routes a line emitted by one device's own process output
    pub async fn route(&self, device: &str, message: &str, at: NaiveDateTime) {
        if !self.interpreter.is_known_device(device) {
            return;
        }
        if let Some(event) = self.interpreter.interpret_device_line(message) {
            self.apply(device, event, at).await;
        }
    }

    /// Dispatches a line tagged with its logging entity, as found in a
    /// combined log
    pub async fn dispatch(&self, entity: &str, message: &str, at: NaiveDateTime) {
        match self.interpreter.interpret(entity, message) {
            Some(Directive::Title(title)) => self.title(&title).await,
            Some(Directive::Device { device, event }) => self.apply(&device, event, at).await,
            None => {}
        }
    }

    async fn apply(&self, device: &str, event: LineEvent, at: NaiveDateTime) {
        let Some(handle) = self.devices.get(device) else {
            return;
        };

        match event {
            LineEvent::Started => {
                if let Err(e) = self.register(handle).await {
                    warn!("Failed to register {device}: {e:#}");
                }
            }
            LineEvent::Stopped => self.deregister(handle).await,
            LineEvent::Status(status) => self.update(handle, status, at).await,
            LineEvent::Extaddr(extaddr) => self.update(handle, Status::Extaddr(extaddr), at).await,
            LineEvent::Version(info) => {
                self.commands
                    .set_network_info(Some(info.version), info.commit)
                    .await
            }
        }
    }

    /// Reports a device's extended address obtained outside its log output
    pub async fn report_extaddr(&self, handle: &DeviceHandle, extaddr: u64, at: NaiveDateTime) {
        self.update(handle, Status::Extaddr(extaddr), at).await;
    }

    /// Applies one status to a device's node, creating the node if this is
    /// the first thing heard from it. Status from a torn down device is
    /// dropped until it is registered again.
    pub async fn update(&self, handle: &DeviceHandle, status: Status, at: NaiveDateTime) {
        let mut topology = self.topology.lock().await;

        if topology.retired.contains(&handle.name) {
            debug!("Ignoring {status} from removed node {}", handle.name);
            return;
        }
        if !topology.nodes.contains_key(&handle.name) {
            if let Err(e) = self.register_locked(&mut topology, handle).await {
                warn!("Failed to register {}: {e:#}", handle.name);
                return;
            }
        }
        let Some(node) = topology.nodes.get_mut(&handle.name) else {
            return;
        };

        let role_change = matches!(status, Status::Role(_));
        let own_extaddr = node.state.extaddr();
        let updates = node.state.apply(status, at);
        for update in &updates {
            node.push(update).await;
        }

        if !role_change || updates.is_empty() {
            return;
        }

        // A node dropping a neighbor also disappears from that neighbor's table.
        let dropped: Vec<u64> = updates
            .iter()
            .filter_map(|update| match update {
                Status::RouterRemoved(addr) => Some(*addr),
                _ => None,
            })
            .collect();
        for addr in dropped {
            let neighbor = topology
                .nodes
                .values_mut()
                .find(|node| node.state.extaddr() == addr);
            if let Some(neighbor) = neighbor {
                if let Some(update) = neighbor.state.remove_router(own_extaddr, at) {
                    neighbor.push(&update).await;
                }
            }
        }

        self.relayout(&mut topology).await;
    }

    async fn relayout(&self, topology: &mut Topology) {
        let auto: Vec<(u32, Role)> = topology
            .nodes
            .values()
            .filter(|node| node.auto_layout)
            .map(|node| (node.state.node_id(), node.state.role()))
            .collect();
        if auto.is_empty() {
            return;
        }

        debug!("Updating nodes layout");
        for (node_id, position) in topology.layout.compute(&auto) {
            let node = topology
                .nodes
                .values_mut()
                .find(|node| node.state.node_id() == node_id);
            if let Some(node) = node {
                if node.state.move_to(position) {
                    self.commands.move_node(node_id, position).await;
                }
            }
        }
    }

    pub async fn title(&self, title: &str) {
        self.commands.set_title(title).await;
    }

    pub async fn replay_speed(&self, speed: f64) {
        self.commands.set_speed(speed).await;
    }

    pub async fn network_metadata(&self, version: &str, commit: Option<&str>) {
        self.commands
            .set_network_info(Some(version.to_string()), commit.map(str::to_string))
            .await;
    }

    /// Snapshot of a registered device's node
    pub async fn node(&self, device: &str) -> Option<NodeState> {
        let topology = self.topology.lock().await;
        topology.nodes.get(device).map(|node| node.state.clone())
    }

    /// Snapshots of every registered node, ordered by node id
    pub async fn nodes(&self) -> Vec<NodeState> {
        let topology = self.topology.lock().await;
        let mut nodes: Vec<NodeState> = topology
            .nodes
            .values()
            .map(|node| node.state.clone())
            .collect();
        nodes.sort_by_key(NodeState::node_id);
        nodes
    }

    /// Largest number of nodes registered at once
    pub async fn max_nodes(&self) -> usize {
        self.topology.lock().await.layout.max_nodes()
    }

    /// Complete history of every node seen this session, including removed ones
    pub async fn histories(&self) -> BTreeMap<u32, Vec<HistoryRecord>> {
        let topology = self.topology.lock().await;
        let mut histories = topology.archive.clone();
        for node in topology.nodes.values() {
            histories
                .entry(node.state.node_id())
                .or_default()
                .extend(node.state.history().iter().cloned());
        }
        histories
    }

    pub async fn export(&self) -> HistoryExport {
        let histories = self.histories().await;
        let mut extaddrs: HashMap<u64, u32> = self
            .nodes()
            .await
            .iter()
            .map(|node| (node.extaddr(), node.node_id()))
            .collect();
        for (node_id, records) in &histories {
            for record in records {
                if let Status::Extaddr(addr) = record.status {
                    extaddrs.entry(addr).or_insert(*node_id);
                }
            }
        }
        HistoryExport::build(&histories, &extaddrs)
    }
}
