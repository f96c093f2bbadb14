//! Dense graph model for the CEVRP.
//!
//! Nodes are interned from their textual ids into arena indices; every
//! ordered pair of distinct nodes carries a Euclidean cost and a pheromone
//! level. The graph also answers the path-level queries the solver relies
//! on: cost, demand and anchor-segmented energy consumption.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::instance::CevrpInstance;

/// Index of a node inside the graph arena
pub type NodeId = usize;

/// Role of a node in the problem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    Depot,
    Customer,
    Station,
}

/// A node of the problem graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Stable textual id from the instance file
    pub key: String,
    pub x: f64,
    pub y: f64,
    /// Demand; zero for the depot and for stations
    pub demand: i32,
    pub kind: NodeKind,
}

/// Complete directed graph over depot, customers and charging stations.
///
/// Costs are immutable for a run; pheromones are mutated only by the MMAS
/// phase and frozen afterwards.
#[derive(Debug, Clone)]
pub struct Graph {
    nodes: Vec<Node>,
    index: HashMap<String, NodeId>,
    cost: Vec<Vec<f64>>,
    pheromone: Vec<Vec<f64>>,
    depot: NodeId,
    /// Vehicle cargo capacity Q
    pub capacity: i32,
    /// Battery capacity B
    pub battery: f64,
    /// Energy consumed per unit distance h
    pub consumption: f64,
    /// Fleet size K
    pub vehicles: usize,
}

impl Graph {
    /// Build the graph from a parsed instance.
    ///
    /// All nodes of the file (depot, customers, stations) become arena
    /// entries; the cost matrix is the pairwise Euclidean distance and
    /// pheromones start at the given initial level.
    pub fn from_instance(instance: &CevrpInstance, initial_pheromone: f64) -> Result<Self, String> {
        let depot_key = instance.depot_key().to_string();
        let mut nodes = Vec::with_capacity(instance.node_coords.len());
        let mut index = HashMap::with_capacity(instance.node_coords.len());

        for (key, x, y) in &instance.node_coords {
            let kind = if *key == depot_key {
                NodeKind::Depot
            } else if instance.is_station_key(key) {
                NodeKind::Station
            } else {
                NodeKind::Customer
            };
            let demand = match kind {
                NodeKind::Customer => instance.demands.get(key).copied().unwrap_or(0),
                _ => 0,
            };
            if index.insert(key.clone(), nodes.len()).is_some() {
                return Err(format!("Duplicate node id: {}", key));
            }
            nodes.push(Node {
                key: key.clone(),
                x: *x,
                y: *y,
                demand,
                kind,
            });
        }

        let depot = *index
            .get(&depot_key)
            .ok_or_else(|| format!("Depot node {} missing from coordinates", depot_key))?;

        let n = nodes.len();
        let mut cost = vec![vec![0.0; n]; n];
        for i in 0..n {
            for j in 0..n {
                if i != j {
                    let dx = nodes[i].x - nodes[j].x;
                    let dy = nodes[i].y - nodes[j].y;
                    cost[i][j] = (dx * dx + dy * dy).sqrt();
                }
            }
        }

        Ok(Graph {
            nodes,
            index,
            cost,
            pheromone: vec![vec![initial_pheromone; n]; n],
            depot,
            capacity: instance.capacity,
            battery: instance.energy_capacity,
            consumption: instance.energy_consumption,
            vehicles: instance.vehicles,
        })
    }

    /// Number of nodes in the arena
    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The depot node id
    #[inline]
    pub fn depot(&self) -> NodeId {
        self.depot
    }

    /// Resolve a textual id to its arena index
    pub fn node_id(&self, key: &str) -> Option<NodeId> {
        self.index.get(key).copied()
    }

    /// Textual id of a node
    #[inline]
    pub fn key(&self, v: NodeId) -> &str {
        &self.nodes[v].key
    }

    #[inline]
    pub fn node(&self, v: NodeId) -> &Node {
        &self.nodes[v]
    }

    #[inline]
    pub fn coords(&self, v: NodeId) -> (f64, f64) {
        (self.nodes[v].x, self.nodes[v].y)
    }

    #[inline]
    pub fn demand(&self, v: NodeId) -> i32 {
        self.nodes[v].demand
    }

    #[inline]
    pub fn is_depot(&self, v: NodeId) -> bool {
        self.nodes[v].kind == NodeKind::Depot
    }

    #[inline]
    pub fn is_station(&self, v: NodeId) -> bool {
        self.nodes[v].kind == NodeKind::Station
    }

    /// A node at which the battery resets: depot or charging station
    #[inline]
    pub fn is_anchor(&self, v: NodeId) -> bool {
        self.nodes[v].kind != NodeKind::Customer
    }

    /// All customer node ids
    pub fn customers(&self) -> Vec<NodeId> {
        (0..self.len())
            .filter(|&v| self.nodes[v].kind == NodeKind::Customer)
            .collect()
    }

    /// All charging station node ids
    pub fn stations(&self) -> Vec<NodeId> {
        (0..self.len())
            .filter(|&v| self.nodes[v].kind == NodeKind::Station)
            .collect()
    }

    /// Euclidean cost of the ordered edge (u, v)
    #[inline]
    pub fn cost(&self, u: NodeId, v: NodeId) -> f64 {
        self.cost[u][v]
    }

    /// Energy consumed on the edge (u, v)
    #[inline]
    pub fn edge_energy(&self, u: NodeId, v: NodeId) -> f64 {
        self.cost[u][v] * self.consumption
    }

    #[inline]
    pub fn get_pheromone(&self, u: NodeId, v: NodeId) -> f64 {
        self.pheromone[u][v]
    }

    #[inline]
    pub fn set_pheromone(&mut self, u: NodeId, v: NodeId, value: f64) {
        self.pheromone[u][v] = value;
    }

    /// Reset every edge to the given pheromone level
    pub fn reset_pheromones(&mut self, level: f64) {
        for row in self.pheromone.iter_mut() {
            for cell in row.iter_mut() {
                *cell = level;
            }
        }
    }

    /// Total cost of consecutive pairs along a node sequence
    pub fn path_cost(&self, nodes: &[NodeId]) -> f64 {
        nodes
            .windows(2)
            .map(|w| self.cost(w[0], w[1]))
            .sum()
    }

    /// Total demand of the non-station nodes in a sequence
    pub fn path_demand(&self, nodes: &[NodeId]) -> i32 {
        nodes.iter().map(|&v| self.demand(v)).sum()
    }

    /// Maximum battery usage between anchors along a sequence.
    ///
    /// Consumption accumulates edge by edge and resets to zero whenever the
    /// edge leaves the depot or a charging station; the returned value is
    /// the largest segment sum, so a sequence is energy-feasible iff this
    /// quantity does not exceed the battery capacity.
    pub fn path_energy(&self, nodes: &[NodeId]) -> f64 {
        let mut max_used = 0.0_f64;
        let mut current = 0.0_f64;
        for w in nodes.windows(2) {
            if self.is_anchor(w[0]) {
                current = 0.0;
            }
            current += self.edge_energy(w[0], w[1]);
            if current > max_used {
                max_used = current;
            }
        }
        max_used
    }

    /// Incremental cost of inserting `node` between `u` and `v`
    #[inline]
    pub fn insertion_delta(&self, u: NodeId, node: NodeId, v: NodeId) -> f64 {
        self.cost(u, node) + self.cost(node, v) - self.cost(u, v)
    }

    /// Render a sequence as "a -> b -> c" using the textual ids
    pub fn format_nodes(&self, nodes: &[NodeId]) -> String {
        nodes
            .iter()
            .map(|&v| self.key(v).to_string())
            .collect::<Vec<_>>()
            .join(" -> ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::CevrpInstance;

    const TRIANGLE: &str = "\
COMMENT: depot plus two customers and one station
TYPE: EVRP
VEHICLES: 1
DIMENSION: 3
STATIONS: 1
CAPACITY: 10
ENERGY_CAPACITY: 100
ENERGY_CONSUMPTION: 2.0
NODE_COORD_SECTION
1 0 0
2 3 0
3 0 4
4 3 4
DEMAND_SECTION
1 0
2 1
3 1
STATIONS_COORD_SECTION
4
DEPOT_SECTION
1
EOF
";

    fn triangle_graph() -> Graph {
        let instance = CevrpInstance::parse(TRIANGLE, "triangle").unwrap();
        Graph::from_instance(&instance, 1.0).unwrap()
    }

    #[test]
    fn test_costs_are_euclidean() {
        let graph = triangle_graph();
        let depot = graph.node_id("1").unwrap();
        let c2 = graph.node_id("2").unwrap();
        let c3 = graph.node_id("3").unwrap();

        assert!((graph.cost(depot, c2) - 3.0).abs() < 1e-12);
        assert!((graph.cost(depot, c3) - 4.0).abs() < 1e-12);
        assert!((graph.cost(c2, c3) - 5.0).abs() < 1e-12);
        assert_eq!(graph.cost(depot, depot), 0.0);
    }

    #[test]
    fn test_node_kinds() {
        let graph = triangle_graph();
        let depot = graph.node_id("1").unwrap();
        let c2 = graph.node_id("2").unwrap();
        let station = graph.node_id("4").unwrap();

        assert!(graph.is_depot(depot));
        assert!(graph.is_anchor(depot));
        assert!(!graph.is_station(depot));
        assert!(graph.is_station(station));
        assert!(graph.is_anchor(station));
        assert!(!graph.is_anchor(c2));
        assert_eq!(graph.customers().len(), 2);
        assert_eq!(graph.stations(), vec![station]);
    }

    #[test]
    fn test_path_cost_and_demand() {
        let graph = triangle_graph();
        let depot = graph.node_id("1").unwrap();
        let c2 = graph.node_id("2").unwrap();
        let c3 = graph.node_id("3").unwrap();
        let station = graph.node_id("4").unwrap();

        let path = [depot, c2, c3, depot];
        assert!((graph.path_cost(&path) - 12.0).abs() < 1e-12);
        assert_eq!(graph.path_demand(&path), 2);

        // Stations contribute no demand
        let with_station = [depot, c2, station, c3, depot];
        assert_eq!(graph.path_demand(&with_station), 2);
    }

    #[test]
    fn test_path_energy_resets_at_anchors() {
        let graph = triangle_graph();
        let depot = graph.node_id("1").unwrap();
        let c2 = graph.node_id("2").unwrap();
        let c3 = graph.node_id("3").unwrap();
        let station = graph.node_id("4").unwrap();

        // h = 2: edge energies are twice the distances.
        // Without a station the whole tour is one segment: 2*(3+5+4) = 24.
        let direct = [depot, c2, c3, depot];
        assert!((graph.path_energy(&direct) - 24.0).abs() < 1e-12);

        // Station 4 at (3,4) splits the tour into segments
        // [1->2->4] = 2*(3+4) = 14 and [4->3->1] = 2*(3+4) = 14.
        let via_station = [depot, c2, station, c3, depot];
        assert!((graph.path_energy(&via_station) - 14.0).abs() < 1e-12);

        // Equivalent formulation: explicit segment sums agree with the
        // running reset-and-track maximum.
        let seg1 = graph.edge_energy(depot, c2) + graph.edge_energy(c2, station);
        let seg2 = graph.edge_energy(station, c3) + graph.edge_energy(c3, depot);
        assert!((graph.path_energy(&via_station) - seg1.max(seg2)).abs() < 1e-12);
    }

    #[test]
    fn test_insertion_delta() {
        let graph = triangle_graph();
        let depot = graph.node_id("1").unwrap();
        let c2 = graph.node_id("2").unwrap();
        let c3 = graph.node_id("3").unwrap();

        // Inserting 3 between depot and 2: 4 + 5 - 3 = 6
        let delta = graph.insertion_delta(depot, c3, c2);
        assert!((delta - 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_pheromone_store() {
        let mut graph = triangle_graph();
        let depot = graph.node_id("1").unwrap();
        let c2 = graph.node_id("2").unwrap();

        assert_eq!(graph.get_pheromone(depot, c2), 1.0);
        graph.set_pheromone(depot, c2, 0.25);
        assert_eq!(graph.get_pheromone(depot, c2), 0.25);
        // Directed store: the reverse edge is untouched
        assert_eq!(graph.get_pheromone(c2, depot), 1.0);

        graph.reset_pheromones(2.0);
        assert_eq!(graph.get_pheromone(depot, c2), 2.0);
    }
}
