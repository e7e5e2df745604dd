//! Automatic placement of nodes without fixed coordinates
//!
//! Nodes sit on circles around a shared center. A node's angle depends only
//! on its id and the largest node count ever seen, so nodes joining or
//! leaving never shift the others around the circle.

use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;

use crate::node::{Position, Role};

/// How nodes are split into concentric rings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Grouping {
    /// Routers and leaders on an inner ring, everyone else outside
    #[default]
    Split,
    /// Every node on one ring
    Single,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LayoutParams {
    pub center: Position,
    pub radius: i32,
    pub grouping: Grouping,
}

impl Default for LayoutParams {
    fn default() -> Self {
        Self {
            center: Position::new(300, 300),
            radius: 150,
            grouping: Grouping::Split,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LayoutEngine {
    params: LayoutParams,
    max_nodes: usize,
}

impl LayoutEngine {
    pub fn new(params: LayoutParams) -> Self {
        Self {
            params,
            max_nodes: 0,
        }
    }

    pub fn params(&self) -> &LayoutParams {
        &self.params
    }

    /// Largest number of nodes registered at once so far
    pub fn max_nodes(&self) -> usize {
        self.max_nodes
    }

    /// Raises the angular slot count; it never shrinks.
    pub fn observe(&mut self, node_count: usize) {
        self.max_nodes = self.max_nodes.max(node_count);
    }

    /// Angle in radians of a node's slot
    pub fn angle(&self, node_id: u32) -> Option<f64> {
        if self.max_nodes == 0 {
            return None;
        }
        Some(TAU / self.max_nodes as f64 * node_id as f64)
    }

    /// Computes positions for the given `(node_id, role)` pairs.
    ///
    /// Outer ring (group 0) uses the full radius, group `i` uses
    /// `radius / (i + 1)`. Output is ordered by group, then node id.
    pub fn compute(&self, nodes: &[(u32, Role)]) -> Vec<(u32, Position)> {
        if self.max_nodes == 0 || nodes.is_empty() {
            return Vec::new();
        }

        let groups: Vec<Vec<u32>> = match self.params.grouping {
            Grouping::Single => vec![nodes.iter().map(|(id, _)| *id).collect()],
            Grouping::Split => {
                let (routers, others): (Vec<&(u32, Role)>, Vec<&(u32, Role)>) =
                    nodes.iter().partition(|(_, role)| role.is_router());
                vec![
                    others.into_iter().map(|(id, _)| *id).collect(),
                    routers.into_iter().map(|(id, _)| *id).collect(),
                ]
            }
        };

        let mut placed = Vec::with_capacity(nodes.len());
        for (index, mut group) in groups.into_iter().enumerate() {
            group.sort_unstable();
            let radius = self.params.radius as f64 / (index + 1) as f64;
            for node_id in group {
                if let Some(angle) = self.angle(node_id) {
                    placed.push((node_id, self.point(radius, angle)));
                }
            }
        }
        placed
    }

    fn point(&self, radius: f64, angle: f64) -> Position {
        let center = self.params.center;
        Position::new(
            (center.x as f64 + radius * angle.cos()).round() as i32,
            (center.y as f64 + radius * angle.sin()).round() as i32,
        )
    }
}
