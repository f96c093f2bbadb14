//! Solution state for the ALNS phase.
//!
//! A state is a set of routes plus the customers currently displaced by a
//! destroy operator. States are value-like: cloning copies the routes, while
//! the graph and instance parameters are always borrowed at call sites.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::graph::{Graph, NodeId};
use crate::route::Route;

/// Routes plus unassigned customers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CevrpState {
    pub routes: Vec<Route>,
    /// Customers not currently placed in any route; never contains stations
    pub unassigned: Vec<NodeId>,
}

impl CevrpState {
    pub fn new(routes: Vec<Route>) -> Self {
        CevrpState {
            routes,
            unassigned: Vec::new(),
        }
    }

    pub fn with_unassigned(routes: Vec<Route>, unassigned: Vec<NodeId>) -> Self {
        CevrpState { routes, unassigned }
    }

    /// Total cost of all routes
    pub fn objective(&self) -> f64 {
        self.routes.iter().map(|r| r.total_cost).sum()
    }

    /// All customers currently placed in routes
    pub fn customers_in_routes(&self, graph: &Graph) -> Vec<NodeId> {
        self.routes
            .iter()
            .flat_map(|r| r.customers(graph))
            .collect()
    }

    /// No unassigned customers and every route feasible
    pub fn is_complete(&self) -> bool {
        self.unassigned.is_empty() && self.routes.iter().all(|r| r.feasible)
    }

    /// Solution-wide customer uniqueness: placed ⊎ unassigned covers the
    /// customer set without repetition.
    pub fn covers_customers_exactly_once(&self, graph: &Graph) -> bool {
        let mut seen = HashSet::new();
        for route in &self.routes {
            for customer in route.customers(graph) {
                if !seen.insert(customer) {
                    return false;
                }
            }
        }
        for &customer in &self.unassigned {
            if graph.is_anchor(customer) || !seen.insert(customer) {
                return false;
            }
        }
        seen.len() == graph.customers().len()
    }

    /// Drop routes that lost all interior nodes, returning their customers
    pub fn dissolve_empty_routes(&mut self, graph: &Graph) {
        let mut displaced = Vec::new();
        self.routes.retain(|route| {
            if route.nodes.len() < 3 {
                displaced.extend(route.customers(graph));
                false
            } else {
                true
            }
        });
        self.unassigned.extend(displaced);
    }

    /// Recompute every route's derived attributes
    pub fn recompute_all(&mut self, graph: &Graph) {
        for route in &mut self.routes {
            route.recompute(graph);
        }
    }
}
