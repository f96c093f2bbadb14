//! Route representation for the CEVRP.
//!
//! A route is an ordered sequence of node ids with derived attributes
//! (cost, demand, peak segment energy, feasibility). The derived fields are
//! only meaningful after `recompute`; every operator that mutates the node
//! sequence is responsible for calling it.

use serde::{Deserialize, Serialize};

use crate::graph::{Graph, NodeId};

/// A single vehicle route, depot-anchored when fully formed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    /// Node sequence, starting and ending at the depot for complete routes
    pub nodes: Vec<NodeId>,
    /// Total Euclidean cost of the sequence
    pub total_cost: f64,
    /// Sum of customer demands (stations and depot excluded)
    pub total_demand: i32,
    /// Peak battery usage between anchors
    pub current_energy: f64,
    /// Depot-anchored, within cargo capacity and within battery capacity
    pub feasible: bool,
}

impl Route {
    /// Create an empty, not-yet-computed route
    pub fn new(nodes: Vec<NodeId>) -> Self {
        Route {
            nodes,
            total_cost: 0.0,
            total_demand: 0,
            current_energy: 0.0,
            feasible: false,
        }
    }

    /// Create a route and derive its attributes from the graph
    pub fn from_nodes(nodes: Vec<NodeId>, graph: &Graph) -> Self {
        let mut route = Route::new(nodes);
        route.recompute(graph);
        route
    }

    /// Recompute cost, demand, energy and feasibility from the node sequence
    pub fn recompute(&mut self, graph: &Graph) {
        self.total_cost = graph.path_cost(&self.nodes);
        self.total_demand = graph.path_demand(&self.nodes);
        self.current_energy = graph.path_energy(&self.nodes);
        self.feasible = self.is_depot_anchored(graph)
            && self.total_demand <= graph.capacity
            && self.current_energy <= graph.battery;
    }

    /// First and last node are the depot
    pub fn is_depot_anchored(&self, graph: &Graph) -> bool {
        match (self.nodes.first(), self.nodes.last()) {
            (Some(&first), Some(&last)) => {
                self.nodes.len() >= 2 && graph.is_depot(first) && graph.is_depot(last)
            }
            _ => false,
        }
    }

    /// Interior nodes (everything between the depot anchors)
    pub fn interior(&self) -> &[NodeId] {
        if self.nodes.len() <= 2 {
            &[]
        } else {
            &self.nodes[1..self.nodes.len() - 1]
        }
    }

    /// Interior customers, station occurrences excluded
    pub fn customers(&self, graph: &Graph) -> Vec<NodeId> {
        self.interior()
            .iter()
            .copied()
            .filter(|&v| !graph.is_anchor(v))
            .collect()
    }

    /// Positions of station occurrences in the interior (absolute indices)
    pub fn station_positions(&self, graph: &Graph) -> Vec<usize> {
        (1..self.nodes.len().saturating_sub(1))
            .filter(|&i| graph.is_station(self.nodes[i]))
            .collect()
    }
}
