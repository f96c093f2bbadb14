//! Destroy operators for the ALNS phase.
//!
//! Every operator deep-copies the incoming state before mutating it and
//! pushes displaced customers into `unassigned`; station occurrences are
//! simply dropped (the repair phase can always splice them back). A `None`
//! return signals a failed precondition and the engine keeps the previous
//! state.

use ordered_float::OrderedFloat;
use rand::Rng;
use rand_chacha::ChaCha8Rng;

use crate::graph::{Graph, NodeId};
use crate::state::CevrpState;

/// Fraction of interior nodes displaced by `worst_removal`
const WORST_REMOVAL_FRACTION: f64 = 0.2;

/// Maximum customers displaced by one `cluster_removal` call
const CLUSTER_REMOVAL_BUDGET: usize = 5;

/// Truncate each route before the first edge whose running energy would
/// exceed the battery, re-anchoring the shortened route at the depot.
/// Displaced customers become unassigned; routes reduced below three nodes
/// dissolve entirely.
pub fn remove_overcapacity_nodes(
    state: &CevrpState,
    graph: &Graph,
    _rng: &mut ChaCha8Rng,
) -> Option<CevrpState> {
    if state.routes.len() < 2 {
        return None;
    }

    let mut next = state.clone();
    for route in &mut next.routes {
        if route.nodes.len() < 4 {
            continue;
        }

        let mut energy = 0.0;
        let mut overflow_at = None;
        for i in 0..route.nodes.len() - 1 {
            if graph.is_anchor(route.nodes[i]) {
                energy = 0.0;
            }
            let edge = graph.edge_energy(route.nodes[i], route.nodes[i + 1]);
            if energy + edge > graph.battery {
                overflow_at = Some(i);
                break;
            }
            energy += edge;
        }

        if let Some(i) = overflow_at {
            // The node whose outgoing edge overflows is dropped along with
            // everything after it; the closing depot is restored.
            let tail: Vec<NodeId> = route.nodes.split_off(i.max(1));
            for node in tail {
                if !graph.is_anchor(node) {
                    next.unassigned.push(node);
                }
            }
            route.nodes.push(graph.depot());
            route.recompute(graph);
        }
    }

    next.dissolve_empty_routes(graph);
    Some(next)
}

/// Remove one random station occurrence from a route carrying at least two,
/// reverting when the route would lose energy feasibility.
pub fn remove_charging_station(
    state: &CevrpState,
    graph: &Graph,
    rng: &mut ChaCha8Rng,
) -> Option<CevrpState> {
    let candidates: Vec<usize> = state
        .routes
        .iter()
        .enumerate()
        .filter(|(_, r)| r.station_positions(graph).len() >= 2)
        .map(|(i, _)| i)
        .collect();
    if candidates.is_empty() {
        return None;
    }

    let mut next = state.clone();
    let route_index = candidates[rng.gen_range(0..candidates.len())];
    let route = &mut next.routes[route_index];

    let positions = route.station_positions(graph);
    let position = positions[rng.gen_range(0..positions.len())];
    let station = route.nodes.remove(position);
    route.recompute(graph);

    if route.current_energy > graph.battery {
        route.nodes.insert(position, station);
        route.recompute(graph);
    }
    Some(next)
}

/// Displace the interior nodes whose removal saves the most cost.
///
/// The savings of a node is `cost_before - cost_after` of its route; the
/// top fraction is removed in descending savings order, skipping removals
/// that would break a route's energy feasibility.
pub fn worst_removal(
    state: &CevrpState,
    graph: &Graph,
    _rng: &mut ChaCha8Rng,
) -> Option<CevrpState> {
    let mut savings: Vec<(f64, usize, NodeId)> = Vec::new();
    for (route_index, route) in state.routes.iter().enumerate() {
        for pos in 1..route.nodes.len().saturating_sub(1) {
            let (prev, node, next) = (
                route.nodes[pos - 1],
                route.nodes[pos],
                route.nodes[pos + 1],
            );
            let gain = graph.cost(prev, node) + graph.cost(node, next) - graph.cost(prev, next);
            savings.push((gain, route_index, node));
        }
    }
    if savings.is_empty() {
        return None;
    }

    savings.sort_by_key(|&(gain, _, _)| std::cmp::Reverse(OrderedFloat(gain)));
    let count = ((savings.len() as f64 * WORST_REMOVAL_FRACTION).ceil() as usize).max(1);

    let mut next = state.clone();
    for &(_, route_index, node) in savings.iter().take(count) {
        let route = &mut next.routes[route_index];
        if route.nodes.len() < 3 {
            continue;
        }
        let position = match route.nodes[1..route.nodes.len().saturating_sub(1)]
            .iter()
            .position(|&n| n == node)
        {
            Some(offset) => offset + 1,
            None => continue,
        };

        route.nodes.remove(position);
        route.recompute(graph);
        if route.current_energy > graph.battery {
            route.nodes.insert(position, node);
            route.recompute(graph);
            continue;
        }
        if !graph.is_anchor(node) {
            next.unassigned.push(node);
        }
    }

    next.dissolve_empty_routes(graph);
    Some(next)
}

/// Displace a spatial cluster of customers: split a seed route's customers
/// into two groups, drop the larger one, then grow the removal through the
/// nearest customers of other routes until the budget is spent.
pub fn cluster_removal(
    state: &CevrpState,
    graph: &Graph,
    rng: &mut ChaCha8Rng,
) -> Option<CevrpState> {
    let candidates: Vec<usize> = state
        .routes
        .iter()
        .enumerate()
        .filter(|(_, r)| r.customers(graph).len() >= 2)
        .map(|(i, _)| i)
        .collect();
    if candidates.is_empty() {
        return None;
    }

    let mut next = state.clone();
    let seed_index = candidates[rng.gen_range(0..candidates.len())];

    let seed_customers = next.routes[seed_index].customers(graph);
    let (group_a, group_b) = two_means(graph, &seed_customers);
    let larger = if group_a.len() >= group_b.len() {
        group_a
    } else {
        group_b
    };

    let mut budget = CLUSTER_REMOVAL_BUDGET;
    let mut removed: Vec<NodeId> = Vec::new();

    for &customer in larger.iter().take(budget) {
        remove_customer(&mut next, graph, seed_index, customer);
        removed.push(customer);
    }
    budget = budget.saturating_sub(removed.len());

    let mut visited_routes = vec![seed_index];
    while budget > 0 {
        let closest = match find_closest_customer(&next, graph, &removed, &visited_routes) {
            Some(found) => found,
            None => break,
        };
        let (route_index, anchor_customer) = closest;
        visited_routes.push(route_index);

        let customers = next.routes[route_index].customers(graph);
        let (group_a, group_b) = two_means(graph, &customers);
        let group = if group_a.contains(&anchor_customer) {
            group_a
        } else {
            group_b
        };

        let snapshot = next.routes[route_index].clone();
        let mut taken = Vec::new();
        for &customer in group.iter().take(budget) {
            remove_customer(&mut next, graph, route_index, customer);
            taken.push(customer);
        }
        if next.routes[route_index].nodes.len() >= 3
            && next.routes[route_index].current_energy > graph.battery
        {
            // Removal broke the route: roll the expansion step back
            next.routes[route_index] = snapshot;
            next.unassigned.retain(|c| !taken.contains(c));
            break;
        }
        budget = budget.saturating_sub(taken.len());
        removed.extend(taken);
    }

    next.dissolve_empty_routes(graph);
    Some(next)
}

/// Remove one customer from a route and mark it unassigned
fn remove_customer(state: &mut CevrpState, graph: &Graph, route_index: usize, customer: NodeId) {
    let route = &mut state.routes[route_index];
    if let Some(position) = route.nodes.iter().position(|&n| n == customer) {
        route.nodes.remove(position);
        route.recompute(graph);
        state.unassigned.push(customer);
    }
}

/// Closest not-yet-removed customer of an unvisited route to any removed node
fn find_closest_customer(
    state: &CevrpState,
    graph: &Graph,
    removed: &[NodeId],
    visited_routes: &[usize],
) -> Option<(usize, NodeId)> {
    let mut closest: Option<(f64, usize, NodeId)> = None;
    for &node in removed {
        let (x, y) = graph.coords(node);
        for (route_index, route) in state.routes.iter().enumerate() {
            if visited_routes.contains(&route_index) {
                continue;
            }
            for customer in route.customers(graph) {
                let (cx, cy) = graph.coords(customer);
                let distance = ((x - cx).powi(2) + (y - cy).powi(2)).sqrt();
                if closest.map_or(true, |(best, _, _)| distance < best) {
                    closest = Some((distance, route_index, customer));
                }
            }
        }
    }
    closest.map(|(_, route_index, customer)| (route_index, customer))
}

/// Two-pass k-means with k = 2 over customer coordinates
fn two_means(graph: &Graph, customers: &[NodeId]) -> (Vec<NodeId>, Vec<NodeId>) {
    if customers.len() < 2 {
        return (customers.to_vec(), Vec::new());
    }

    let coords: Vec<(f64, f64)> = customers.iter().map(|&c| graph.coords(c)).collect();
    let mut centroids = [coords[0], coords[coords.len() - 1]];

    let assign = |centroids: &[(f64, f64); 2]| -> Vec<usize> {
        coords
            .iter()
            .map(|&(x, y)| {
                let d0 = (x - centroids[0].0).powi(2) + (y - centroids[0].1).powi(2);
                let d1 = (x - centroids[1].0).powi(2) + (y - centroids[1].1).powi(2);
                usize::from(d1 < d0)
            })
            .collect()
    };

    let mut assignment = assign(&centroids);
    for cluster in 0..2 {
        let members: Vec<(f64, f64)> = assignment
            .iter()
            .zip(&coords)
            .filter(|(&a, _)| a == cluster)
            .map(|(_, &c)| c)
            .collect();
        if !members.is_empty() {
            let n = members.len() as f64;
            centroids[cluster] = (
                members.iter().map(|c| c.0).sum::<f64>() / n,
                members.iter().map(|c| c.1).sum::<f64>() / n,
            );
        }
    }
    assignment = assign(&centroids);

    let mut group_a = Vec::new();
    let mut group_b = Vec::new();
    for (&customer, &cluster) in customers.iter().zip(&assignment) {
        if cluster == 0 {
            group_a.push(customer);
        } else {
            group_b.push(customer);
        }
    }
    (group_a, group_b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::CevrpInstance;
    use crate::route::Route;
    use rand::SeedableRng;

    const CLUSTERED: &str = "\
TYPE: EVRP
VEHICLES: 3
DIMENSION: 7
STATIONS: 1
CAPACITY: 10
ENERGY_CAPACITY: 1000
ENERGY_CONSUMPTION: 1.0
NODE_COORD_SECTION
1 0 0
2 10 0
3 11 0
4 12 0
5 -10 0
6 -11 0
7 -12 0
8 5 0
DEMAND_SECTION
1 0
2 1
3 1
4 1
5 1
6 1
7 1
STATIONS_COORD_SECTION
8
DEPOT_SECTION
1
EOF
";

    fn graph() -> Graph {
        let instance = CevrpInstance::parse(CLUSTERED, "clustered").unwrap();
        Graph::from_instance(&instance, 1.0).unwrap()
    }

    fn ids(graph: &Graph, keys: &[&str]) -> Vec<NodeId> {
        keys.iter().map(|k| graph.node_id(k).unwrap()).collect()
    }

    #[test]
    fn test_remove_overcapacity_truncates_before_overflow() {
        let mut instance = CevrpInstance::parse(CLUSTERED, "clustered").unwrap();
        instance.energy_capacity = 20.0;
        let graph = Graph::from_instance(&instance, 1.0).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        // 1 -> 2 -> 3 -> 4 -> 1 consumes 10 + 1 + 1 = 12 up to node 4;
        // the 12-unit return edge overflows a 20-unit battery, so node 4
        // is displaced and the route is re-anchored.
        let nodes = ids(&graph, &["1", "2", "3", "4", "1"]);
        let other = ids(&graph, &["1", "5", "1"]);
        let state = CevrpState::new(vec![
            Route::from_nodes(nodes, &graph),
            Route::from_nodes(other, &graph),
        ]);

        let next = remove_overcapacity_nodes(&state, &graph, &mut rng).unwrap();
        let truncated = &next.routes[0];
        assert_eq!(truncated.nodes, ids(&graph, &["1", "2", "3", "1"]));
        assert!(graph.is_depot(*truncated.nodes.last().unwrap()));
        // Nothing lost: the displaced customer sits in unassigned
        assert_eq!(next.unassigned, ids(&graph, &["4"]));
        assert!(next.covers_customers_exactly_once(&graph));
    }

    #[test]
    fn test_remove_overcapacity_needs_two_routes() {
        let graph = graph();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let nodes = ids(&graph, &["1", "2", "3", "1"]);
        let state = CevrpState::new(vec![Route::from_nodes(nodes, &graph)]);
        assert!(remove_overcapacity_nodes(&state, &graph, &mut rng).is_none());
    }

    #[test]
    fn test_remove_charging_station() {
        let graph = graph();
        let mut rng = ChaCha8Rng::seed_from_u64(2);

        // Two station visits in one route, battery large enough that one
        // of them is redundant.
        let nodes = ids(&graph, &["1", "8", "2", "8", "1"]);
        let other = ids(&graph, &["1", "5", "1"]);
        let state = CevrpState::new(vec![
            Route::from_nodes(nodes, &graph),
            Route::from_nodes(other, &graph),
        ]);

        let next = remove_charging_station(&state, &graph, &mut rng).unwrap();
        let stations = next.routes[0].station_positions(&graph).len();
        assert_eq!(stations, 1);
        assert!(next.routes[0].current_energy <= graph.battery);
        assert!(next.unassigned.is_empty());
    }

    #[test]
    fn test_remove_charging_station_precondition() {
        let graph = graph();
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let state = CevrpState::new(vec![Route::from_nodes(
            ids(&graph, &["1", "2", "8", "3", "1"]),
            &graph,
        )]);
        // Only a single station occurrence anywhere: nothing to remove
        assert!(remove_charging_station(&state, &graph, &mut rng).is_none());
    }

    #[test]
    fn test_worst_removal_orders_by_savings() {
        // Geometry from a hand-checked example: B sits on the straight
        // line between A and C, so removing A or C saves more than
        // removing B.
        let text = "\
TYPE: EVRP
VEHICLES: 2
DIMENSION: 4
STATIONS: 0
CAPACITY: 100
ENERGY_CAPACITY: 10000
ENERGY_CONSUMPTION: 1.0
NODE_COORD_SECTION
1 0 0
2 3 4
3 6 8
4 9 12
DEMAND_SECTION
1 0
2 1
3 1
4 1
DEPOT_SECTION
1
EOF
";
        let instance = CevrpInstance::parse(text, "line").unwrap();
        let graph = Graph::from_instance(&instance, 1.0).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(3);

        let a = graph.node_id("2").unwrap();
        let b = graph.node_id("3").unwrap();
        let c = graph.node_id("4").unwrap();
        let depot = graph.depot();

        // Savings: interior node B is collinear, its removal saves nothing;
        // C is the far endpoint and saves the most.
        let route = Route::from_nodes(vec![depot, a, b, c, depot], &graph);
        let state = CevrpState::new(vec![route]);

        let next = worst_removal(&state, &graph, &mut rng).unwrap();
        // ceil(3 * 0.2) = 1 node displaced, and it must be C
        assert_eq!(next.unassigned, vec![c]);
        assert!(next.covers_customers_exactly_once(&graph));
    }

    #[test]
    fn test_worst_removal_savings_ranking() {
        // Explicit savings check on a route [1, A, B, C, 1]: removal gain
        // of a node is cost(prev,node) + cost(node,next) - cost(prev,next).
        let graph = graph();
        let depot = graph.depot();
        let a = graph.node_id("2").unwrap();
        let b = graph.node_id("3").unwrap();
        let c = graph.node_id("4").unwrap();

        let gain = |p: NodeId, n: NodeId, q: NodeId| {
            graph.cost(p, n) + graph.cost(n, q) - graph.cost(p, q)
        };
        // B lies between A and C on a line: zero gain
        assert!(gain(a, b, c).abs() < 1e-9);
        // A is passed through on the way to B: zero gain as well, while the
        // far endpoint C pays the full detour
        assert!(gain(b, c, depot) > gain(a, b, c));
    }

    #[test]
    fn test_cluster_removal_respects_budget() {
        let graph = graph();
        let mut rng = ChaCha8Rng::seed_from_u64(5);

        let right = Route::from_nodes(ids(&graph, &["1", "2", "3", "4", "1"]), &graph);
        let left = Route::from_nodes(ids(&graph, &["1", "5", "6", "7", "1"]), &graph);
        let state = CevrpState::new(vec![right, left]);

        let next = cluster_removal(&state, &graph, &mut rng).unwrap();
        assert!(!next.unassigned.is_empty());
        assert!(next.unassigned.len() <= CLUSTER_REMOVAL_BUDGET);
        assert!(next.covers_customers_exactly_once(&graph));
        // No station ever lands in unassigned
        assert!(next.unassigned.iter().all(|&n| !graph.is_anchor(n)));
    }

    #[test]
    fn test_cluster_removal_needs_customers() {
        let graph = graph();
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let state = CevrpState::new(vec![Route::from_nodes(
            ids(&graph, &["1", "2", "1"]),
            &graph,
        )]);
        assert!(cluster_removal(&state, &graph, &mut rng).is_none());
    }

    #[test]
    fn test_two_means_separates_obvious_groups() {
        let graph = graph();
        let customers = ids(&graph, &["2", "3", "4", "5", "6", "7"]);
        let (a, b) = two_means(&graph, &customers);
        assert_eq!(a.len() + b.len(), 6);
        assert!(!a.is_empty() && !b.is_empty());
        // The split must follow the sign of the x coordinate
        for group in [&a, &b] {
            let signs: Vec<bool> = group
                .iter()
                .map(|&c| graph.coords(c).0 > 0.0)
                .collect();
            assert!(signs.iter().all(|&s| s == signs[0]));
        }
    }
}
