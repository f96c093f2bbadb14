//! Repair operators for the ALNS phase.
//!
//! Repairs reinsert the customers displaced by a destroy operator, splicing
//! charging stations into routes whenever an insertion would overflow the
//! battery. Every operator either returns a fully feasible state with an
//! empty unassigned list or `None`, in which case the engine keeps the
//! previous state.

use ordered_float::OrderedFloat;
use rand_chacha::ChaCha8Rng;

use crate::graph::{Graph, NodeId};
use crate::route::Route;
use crate::state::CevrpState;

/// Regret depth of `regret_k_insertion`
const REGRET_K: usize = 2;

/// Cheapest charging station reachable from `last` with `energy` already
/// consumed since the previous anchor; `None` when no station fits.
pub fn best_station(graph: &Graph, last: NodeId, energy: f64) -> Option<NodeId> {
    graph
        .stations()
        .into_iter()
        .filter(|&s| s != last && energy + graph.edge_energy(last, s) <= graph.battery)
        .min_by_key(|&s| OrderedFloat(graph.cost(last, s)))
}

/// Walk a node sequence and splice the cheapest reachable station before
/// every edge that would overflow the battery. Returns the new sequence and
/// whether the walk stayed within the battery throughout; on failure the
/// remaining nodes are kept unchanged so the route can be rescued later.
pub fn splice_stations(graph: &Graph, nodes: &[NodeId]) -> (Vec<NodeId>, bool) {
    if nodes.len() < 2 {
        return (nodes.to_vec(), true);
    }

    let mut result = Vec::with_capacity(nodes.len() + 2);
    result.push(nodes[0]);
    let mut energy = 0.0;

    for (index, &next) in nodes.iter().enumerate().skip(1) {
        let mut prev = *result.last().unwrap();
        if graph.is_anchor(prev) {
            energy = 0.0;
        }
        let mut need = graph.edge_energy(prev, next);

        if energy + need > graph.battery {
            match best_station(graph, prev, energy) {
                Some(station) => {
                    result.push(station);
                    energy = 0.0;
                    prev = station;
                    need = graph.edge_energy(prev, next);
                    if need > graph.battery {
                        result.extend_from_slice(&nodes[index..]);
                        return (result, false);
                    }
                }
                None => {
                    result.extend_from_slice(&nodes[index..]);
                    return (result, false);
                }
            }
        }

        result.push(next);
        energy += need;
    }
    (result, true)
}

/// Initial station splicing over a customer-only solution.
///
/// Every energy-overloaded route is walked once; routes that cannot be made
/// feasible keep their flag down and are left for the ALNS to rescue.
pub fn smart_reinsertion(state: &CevrpState, graph: &Graph) -> CevrpState {
    let mut next = state.clone();
    for route in &mut next.routes {
        if route.current_energy > graph.battery {
            let (nodes, _) = splice_stations(graph, &route.nodes);
            route.nodes = nodes;
            route.recompute(graph);
        }
    }
    next
}

/// Feasible insertion of `customer` at `position`, splicing stations if the
/// plain insertion overflows the battery. Returns the new node sequence and
/// the cost increase.
fn feasible_insertion(
    graph: &Graph,
    route: &Route,
    position: usize,
    customer: NodeId,
) -> Option<(Vec<NodeId>, f64)> {
    if route.total_demand + graph.demand(customer) > graph.capacity {
        return None;
    }

    let mut nodes = route.nodes.clone();
    nodes.insert(position, customer);

    if graph.path_energy(&nodes) <= graph.battery {
        let delta = graph.path_cost(&nodes) - route.total_cost;
        return Some((nodes, delta));
    }

    let (spliced, ok) = splice_stations(graph, &nodes);
    if ok && graph.path_energy(&spliced) <= graph.battery {
        let delta = graph.path_cost(&spliced) - route.total_cost;
        return Some((spliced, delta));
    }
    None
}

/// Best feasible insertion of a customer over all routes and positions
fn best_insertion(
    graph: &Graph,
    routes: &[Route],
    customer: NodeId,
) -> Option<(usize, Vec<NodeId>, f64)> {
    let mut best: Option<(usize, Vec<NodeId>, f64)> = None;
    for (route_index, route) in routes.iter().enumerate() {
        for position in 1..route.nodes.len() {
            if let Some((nodes, delta)) = feasible_insertion(graph, route, position, customer) {
                if best.as_ref().map_or(true, |b| delta < b.2) {
                    best = Some((route_index, nodes, delta));
                }
            }
        }
    }
    best
}

/// Open a fresh `[depot, customer, depot]` route, splicing stations when
/// the out-and-back trip overflows the battery.
fn fresh_route(graph: &Graph, customer: NodeId) -> Option<Route> {
    let depot = graph.depot();
    let route = Route::from_nodes(vec![depot, customer, depot], graph);
    if route.feasible {
        return Some(route);
    }
    if route.total_demand > graph.capacity {
        return None;
    }
    let (spliced, ok) = splice_stations(graph, &route.nodes);
    if !ok {
        return None;
    }
    let route = Route::from_nodes(spliced, graph);
    route.feasible.then_some(route)
}

/// The repaired state is only handed back when it is fully feasible
fn finish(mut state: CevrpState, leftover: Vec<NodeId>) -> Option<CevrpState> {
    if !leftover.is_empty() {
        return None;
    }
    if !state.routes.iter().all(|r| r.feasible) {
        return None;
    }
    state.unassigned.clear();
    Some(state)
}

/// Greedy insertion: every unassigned customer goes to the position with
/// the lowest incremental cost that keeps cargo and battery feasible.
pub fn greedy_insertion(
    state: &CevrpState,
    graph: &Graph,
    _rng: &mut ChaCha8Rng,
) -> Option<CevrpState> {
    let mut next = state.clone();
    let mut queue = std::mem::take(&mut next.unassigned);
    let mut leftover = Vec::new();

    while !queue.is_empty() {
        let customer = queue.remove(0);
        match best_insertion(graph, &next.routes, customer) {
            Some((route_index, nodes, _)) => {
                next.routes[route_index].nodes = nodes;
                next.routes[route_index].recompute(graph);
            }
            None => match fresh_route(graph, customer) {
                Some(route) => next.routes.push(route),
                None => leftover.push(customer),
            },
        }
    }
    finish(next, leftover)
}

/// Regret-2 insertion: the customer whose best position is hardest to
/// replace goes first; ties break on the lower best insertion cost.
pub fn regret_k_insertion(
    state: &CevrpState,
    graph: &Graph,
    _rng: &mut ChaCha8Rng,
) -> Option<CevrpState> {
    let mut next = state.clone();
    let mut pending = std::mem::take(&mut next.unassigned);
    let mut leftover = Vec::new();

    while !pending.is_empty() {
        let mut chosen: Option<(usize, f64, f64, usize, Vec<NodeId>)> = None;

        for (pending_index, &customer) in pending.iter().enumerate() {
            // All feasible insertion deltas for this customer
            let mut deltas: Vec<(usize, Vec<NodeId>, f64)> = Vec::new();
            for (route_index, route) in next.routes.iter().enumerate() {
                for position in 1..route.nodes.len() {
                    if let Some((nodes, delta)) =
                        feasible_insertion(graph, route, position, customer)
                    {
                        deltas.push((route_index, nodes, delta));
                    }
                }
            }
            if deltas.is_empty() {
                continue;
            }
            deltas.sort_by_key(|&(_, _, delta)| OrderedFloat(delta));

            let best_delta = deltas[0].2;
            let regret: f64 = deltas
                .iter()
                .skip(1)
                .take(REGRET_K - 1)
                .map(|&(_, _, delta)| delta - best_delta)
                .sum();

            let replace = match &chosen {
                None => true,
                Some((_, best_regret, best_cost, _, _)) => {
                    regret > *best_regret || (regret == *best_regret && best_delta < *best_cost)
                }
            };
            if replace {
                let (route_index, nodes, _) = deltas.swap_remove(0);
                chosen = Some((pending_index, regret, best_delta, route_index, nodes));
            }
        }

        match chosen {
            Some((pending_index, _, _, route_index, nodes)) => {
                pending.remove(pending_index);
                next.routes[route_index].nodes = nodes;
                next.routes[route_index].recompute(graph);
            }
            None => {
                // No feasible insertion remains: open fresh routes
                for customer in pending.drain(..) {
                    match fresh_route(graph, customer) {
                        Some(route) => next.routes.push(route),
                        None => leftover.push(customer),
                    }
                }
            }
        }
    }
    finish(next, leftover)
}

/// First-feasible insertion: routes and positions are scanned in order and
/// the first position respecting cargo and battery wins. Insertion before
/// the leading depot is forbidden; right after it and right before the
/// closing depot are allowed.
pub fn best_feasible_insertion(
    state: &CevrpState,
    graph: &Graph,
    _rng: &mut ChaCha8Rng,
) -> Option<CevrpState> {
    let mut next = state.clone();
    let mut queue = std::mem::take(&mut next.unassigned);
    let mut leftover = Vec::new();

    while !queue.is_empty() {
        let customer = queue.remove(0);
        let mut placed = false;

        'scan: for route_index in 0..next.routes.len() {
            for position in 1..next.routes[route_index].nodes.len() {
                if let Some((nodes, _)) =
                    feasible_insertion(graph, &next.routes[route_index], position, customer)
                {
                    next.routes[route_index].nodes = nodes;
                    next.routes[route_index].recompute(graph);
                    placed = true;
                    break 'scan;
                }
            }
        }

        if !placed {
            match fresh_route(graph, customer) {
                Some(route) => next.routes.push(route),
                None => leftover.push(customer),
            }
        }
    }
    finish(next, leftover)
}
