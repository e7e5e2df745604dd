//! Session history as a timeline table and per-node summaries

use chrono::NaiveDateTime;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::node::{HistoryRecord, Status};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

pub fn format_timestamp(timestamp: &NaiveDateTime) -> String {
    timestamp.format(TIMESTAMP_FORMAT).to_string()
}

/// One history record placed on the timeline
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportRow {
    pub timestamp: NaiveDateTime,
    pub node_id: u32,
    /// One cell per column; only the cell of `node_id` is non-empty
    pub cells: Vec<String>,
}

impl ExportRow {
    pub fn text(&self) -> &str {
        self.cells
            .iter()
            .find(|cell| !cell.is_empty())
            .map(String::as_str)
            .unwrap_or_default()
    }
}

/// Every record of one node grouped by what it describes
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NodeSummary {
    pub node_id: u32,
    pub extaddr: Vec<String>,
    pub role: Vec<String>,
    pub children: Vec<String>,
    pub neighbors: Vec<String>,
    pub other: Vec<String>,
}

impl fmt::Display for NodeSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Node {}", self.node_id)?;
        let sections = [
            ("extaddr", &self.extaddr),
            ("role", &self.role),
            ("children", &self.children),
            ("neighbors", &self.neighbors),
            ("other", &self.other),
        ];
        for (title, lines) in sections {
            if lines.is_empty() {
                continue;
            }
            writeln!(f, "  {title}:")?;
            for line in lines {
                writeln!(f, "    {line}")?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HistoryExport {
    /// Node ids, ascending
    pub columns: Vec<u32>,
    /// Records ordered by timestamp; equal timestamps keep node then record order
    pub rows: Vec<ExportRow>,
    pub summaries: Vec<NodeSummary>,
}

impl HistoryExport {
    /// Builds the export from per-node histories. Addresses found in
    /// `extaddrs` are rendered as the owning node id.
    pub fn build(
        histories: &BTreeMap<u32, Vec<HistoryRecord>>,
        extaddrs: &HashMap<u64, u32>,
    ) -> Self {
        let columns: Vec<u32> = histories.keys().copied().collect();

        let mut entries: Vec<(NaiveDateTime, usize, u32, String)> = Vec::new();
        let mut summaries = Vec::with_capacity(histories.len());
        for (column, (node_id, records)) in histories.iter().enumerate() {
            let mut summary = NodeSummary {
                node_id: *node_id,
                ..Default::default()
            };
            for record in records {
                let text = describe(&record.status, extaddrs);
                let line = format!("[{}] {text}", format_timestamp(&record.timestamp));
                match record.status {
                    Status::Extaddr(_) => summary.extaddr.push(line),
                    Status::Role(_) => summary.role.push(line),
                    Status::ChildAdded(_) | Status::ChildRemoved(_) => summary.children.push(line),
                    Status::RouterAdded(_) | Status::RouterRemoved(_) => {
                        summary.neighbors.push(line)
                    }
                    Status::Raw(_) => summary.other.push(line),
                }
                entries.push((record.timestamp, column, *node_id, text));
            }
            summaries.push(summary);
        }
        entries.sort_by_key(|(timestamp, ..)| *timestamp);

        let rows = entries
            .into_iter()
            .map(|(timestamp, column, node_id, text)| {
                let mut cells = vec![String::new(); columns.len()];
                cells[column] = text;
                ExportRow {
                    timestamp,
                    node_id,
                    cells,
                }
            })
            .collect();

        Self {
            columns,
            rows,
            summaries,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn summary(&self, node_id: u32) -> Option<&NodeSummary> {
        self.summaries.iter().find(|s| s.node_id == node_id)
    }
}

fn peer(addr: u64, extaddrs: &HashMap<u64, u32>) -> String {
    match extaddrs.get(&addr) {
        Some(node_id) => format!("node {node_id}"),
        None => format!("extaddr {addr:016x}"),
    }
}

/// Human readable description of a status
pub fn describe(status: &Status, extaddrs: &HashMap<u64, u32>) -> String {
    match status {
        Status::Extaddr(addr) => format!("extaddr {addr:016x}"),
        Status::Role(role) => format!("role {role}"),
        Status::ChildAdded(addr) => format!("child added {}", peer(*addr, extaddrs)),
        Status::ChildRemoved(addr) => format!("child removed {}", peer(*addr, extaddrs)),
        Status::RouterAdded(addr) => format!("neighbor added {}", peer(*addr, extaddrs)),
        Status::RouterRemoved(addr) => format!("neighbor removed {}", peer(*addr, extaddrs)),
        Status::Raw(text) => text.clone(),
    }
}
