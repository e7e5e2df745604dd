use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use strum::{Display, EnumIter, FromRepr};

/// Role of a Thread device in the network hierarchy
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumIter,
    FromRepr,
)]
#[repr(u8)]
pub enum Role {
    #[default]
    Disabled = 0,
    Detached = 1,
    Child = 2,
    Router = 3,
    Leader = 4,
}

impl Role {
    /// Numeric role code used on the wire
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn is_router(self) -> bool {
        matches!(self, Role::Router | Role::Leader)
    }

    /// A disconnected node can claim no children or neighbors
    pub fn is_disconnected(self) -> bool {
        matches!(self, Role::Disabled | Role::Detached)
    }
}

/// A semantic status update for one node.
///
/// `Display` renders the `key=value` text pushed to the visualizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Status {
    Extaddr(u64),
    Role(Role),
    ChildAdded(u64),
    ChildRemoved(u64),
    RouterAdded(u64),
    RouterRemoved(u64),
    /// Any other visualizer status string, forwarded verbatim
    Raw(String),
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Extaddr(addr) => write!(f, "extaddr={addr:016x}"),
            Status::Role(role) => write!(f, "role={code}", code = role.code()),
            Status::ChildAdded(addr) => write!(f, "child_added={addr:016x}"),
            Status::ChildRemoved(addr) => write!(f, "child_removed={addr:016x}"),
            Status::RouterAdded(addr) => write!(f, "router_added={addr:016x}"),
            Status::RouterRemoved(addr) => write!(f, "router_removed={addr:016x}"),
            Status::Raw(text) => f.write_str(text),
        }
    }
}

/// One append-only history entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub timestamp: NaiveDateTime,
    pub status: Status,
}

/// Visualization coordinates
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Mutable per-node state plus its change history.
///
/// Every mutator is diff-only: it returns the status updates to push (empty
/// when nothing changed) and records exactly one history entry per update.
#[derive(Debug, Clone, Serialize)]
pub struct NodeState {
    node_id: u32,
    name: String,
    serial: Option<String>,
    extaddr: u64,
    role: Role,
    children: BTreeSet<u64>,
    neighbors: BTreeSet<u64>,
    position: Position,
    registered: bool,
    history: Vec<HistoryRecord>,
}

impl NodeState {
    /// The extended address starts out as the node id until the device reports one.
    pub fn new(node_id: u32, name: impl Into<String>, position: Position) -> Self {
        Self {
            node_id,
            name: name.into(),
            serial: None,
            extaddr: node_id as u64,
            role: Role::Disabled,
            children: BTreeSet::new(),
            neighbors: BTreeSet::new(),
            position,
            registered: false,
            history: Vec::new(),
        }
    }

    pub fn with_serial(mut self, serial: Option<String>) -> Self {
        self.serial = serial;
        self
    }

    pub fn node_id(&self) -> u32 {
        self.node_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn serial(&self) -> Option<&str> {
        self.serial.as_deref()
    }

    pub fn extaddr(&self) -> u64 {
        self.extaddr
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn children(&self) -> &BTreeSet<u64> {
        &self.children
    }

    pub fn neighbors(&self) -> &BTreeSet<u64> {
        &self.neighbors
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn is_registered(&self) -> bool {
        self.registered
    }

    pub fn history(&self) -> &[HistoryRecord] {
        &self.history
    }

    pub fn into_history(self) -> Vec<HistoryRecord> {
        self.history
    }

    fn record(&mut self, at: NaiveDateTime, status: Status) -> Status {
        self.history.push(HistoryRecord {
            timestamp: at,
            status: status.clone(),
        });
        status
    }

    /// Changes the extended address. A peer link to the new address is
    /// dropped first, so the node never lists itself.
    pub fn update_extaddr(&mut self, extaddr: u64, at: NaiveDateTime) -> Vec<Status> {
        if extaddr == self.extaddr {
            return Vec::new();
        }
        let mut updates = Vec::new();
        updates.extend(self.remove_router(extaddr, at));
        updates.extend(self.remove_child(extaddr, at));
        self.extaddr = extaddr;
        updates.push(self.record(at, Status::Extaddr(extaddr)));
        updates
    }

    /// Changes the role. Entering Disabled or Detached also drops every
    /// neighbor and child, each as its own update after the role update.
    pub fn update_role(&mut self, role: Role, at: NaiveDateTime) -> Vec<Status> {
        if role == self.role {
            return Vec::new();
        }
        self.role = role;
        let mut updates = vec![self.record(at, Status::Role(role))];

        if role.is_disconnected() {
            let neighbors: Vec<u64> = self.neighbors.iter().copied().collect();
            for neighbor in neighbors {
                updates.extend(self.remove_router(neighbor, at));
            }
            let children: Vec<u64> = self.children.iter().copied().collect();
            for child in children {
                updates.extend(self.remove_child(child, at));
            }
        }
        updates
    }

    pub fn add_child(&mut self, child: u64, at: NaiveDateTime) -> Option<Status> {
        if child == self.extaddr || !self.children.insert(child) {
            return None;
        }
        Some(self.record(at, Status::ChildAdded(child)))
    }

    pub fn remove_child(&mut self, child: u64, at: NaiveDateTime) -> Option<Status> {
        if !self.children.remove(&child) {
            return None;
        }
        Some(self.record(at, Status::ChildRemoved(child)))
    }

    pub fn add_router(&mut self, router: u64, at: NaiveDateTime) -> Option<Status> {
        if router == self.extaddr || !self.neighbors.insert(router) {
            return None;
        }
        Some(self.record(at, Status::RouterAdded(router)))
    }

    pub fn remove_router(&mut self, router: u64, at: NaiveDateTime) -> Option<Status> {
        if !self.neighbors.remove(&router) {
            return None;
        }
        Some(self.record(at, Status::RouterRemoved(router)))
    }

    /// Applies a status update, returning what actually changed.
    ///
    /// Raw statuses carry no tracked state and always pass through.
    pub fn apply(&mut self, status: Status, at: NaiveDateTime) -> Vec<Status> {
        match status {
            Status::Extaddr(addr) => self.update_extaddr(addr, at),
            Status::Role(role) => self.update_role(role, at),
            Status::ChildAdded(addr) => self.add_child(addr, at).into_iter().collect(),
            Status::ChildRemoved(addr) => self.remove_child(addr, at).into_iter().collect(),
            Status::RouterAdded(addr) => self.add_router(addr, at).into_iter().collect(),
            Status::RouterRemoved(addr) => self.remove_router(addr, at).into_iter().collect(),
            raw @ Status::Raw(_) => vec![raw],
        }
    }

    /// Marks the node as announced. Returns false if it already was.
    pub fn create(&mut self) -> bool {
        !std::mem::replace(&mut self.registered, true)
    }

    /// Marks the node as withdrawn. Returns false if it already was.
    pub fn delete(&mut self) -> bool {
        std::mem::replace(&mut self.registered, false)
    }

    /// Records a new position. Returns false if it is unchanged.
    pub fn move_to(&mut self, position: Position) -> bool {
        if position == self.position {
            return false;
        }
        self.position = position;
        true
    }
}
