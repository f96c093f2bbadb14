//! Local search improvement heuristics for the CEVRP.
//!
//! This module implements the post-construction polishers and the operators
//! the ALNS engine runs when a new best solution is found:
//! - 2-opt (intra-route segment reversal)
//! - 2-opt* (inter-route tail exchange)
//! - node-shift (inter-route customer relocation)
//! - adjacent swap, general swap, reverse segment, block insert,
//!   single insertion (intra-route, state-level)
//!
//! Moves are only kept when the total distance strictly decreases and the
//! touched routes stay within cargo and battery limits.

use rand::Rng;
use rand_chacha::ChaCha8Rng;

use crate::graph::Graph;
use crate::route::Route;
use crate::state::CevrpState;

const EPS: f64 = 1e-9;

/// A within-route move is admissible when it strictly improves cost, keeps
/// the cargo within capacity and the peak segment energy within the
/// battery.
fn admissible(graph: &Graph, old: &Route, nodes: &[usize]) -> bool {
    let new_cost = graph.path_cost(nodes);
    if new_cost >= old.total_cost - EPS {
        return false;
    }
    if graph.path_demand(nodes) > graph.capacity {
        return false;
    }
    graph.path_energy(nodes) <= graph.battery
}

/// 2-opt: reverse the best improving interior segment, repeatedly.
pub fn two_opt(graph: &Graph, route: &Route) -> Route {
    let mut best = route.clone();
    if best.nodes.len() < 4 {
        return best;
    }

    loop {
        let n = best.nodes.len();
        let mut best_delta = -EPS;
        let mut best_move: Option<(usize, usize)> = None;

        for i in 1..n - 1 {
            for j in i + 1..n - 1 {
                let mut candidate = best.nodes.clone();
                candidate[i..=j].reverse();
                let delta = graph.path_cost(&candidate) - best.total_cost;
                if delta < best_delta && admissible(graph, &best, &candidate) {
                    best_delta = delta;
                    best_move = Some((i, j));
                }
            }
        }

        match best_move {
            Some((i, j)) => {
                best.nodes[i..=j].reverse();
                best.recompute(graph);
            }
            None => break,
        }
    }
    best
}

/// 2-opt*: exchange route tails between pairs of routes.
///
/// Cuts are interior to both routes so the depot anchors survive the swap;
/// a swap is kept when the joint cost decreases and both new routes respect
/// the cargo capacity. Routes emptied by the exchange are dropped.
pub fn two_opt_star(graph: &Graph, routes: &[Route]) -> Vec<Route> {
    let mut best: Vec<Route> = routes.to_vec();

    let mut improved = true;
    while improved {
        improved = false;

        'pairs: for a in 0..best.len() {
            for b in a + 1..best.len() {
                if best[a].nodes.len() < 3 || best[b].nodes.len() < 3 {
                    continue;
                }

                let mut best_delta = -EPS;
                let mut best_cut: Option<(usize, usize)> = None;
                let old_cost = best[a].total_cost + best[b].total_cost;

                for i in 1..best[a].nodes.len() - 1 {
                    for j in 1..best[b].nodes.len() - 1 {
                        let tail_a = &best[a].nodes[i..];
                        let tail_b = &best[b].nodes[j..];
                        let mut new_a = best[a].nodes[..i].to_vec();
                        new_a.extend_from_slice(tail_b);
                        let mut new_b = best[b].nodes[..j].to_vec();
                        new_b.extend_from_slice(tail_a);

                        if graph.path_demand(&new_a) > graph.capacity
                            || graph.path_demand(&new_b) > graph.capacity
                        {
                            continue;
                        }

                        let delta =
                            graph.path_cost(&new_a) + graph.path_cost(&new_b) - old_cost;
                        if delta < best_delta {
                            best_delta = delta;
                            best_cut = Some((i, j));
                        }
                    }
                }

                if let Some((i, j)) = best_cut {
                    let tail_a: Vec<usize> = best[a].nodes.split_off(i);
                    let tail_b: Vec<usize> = best[b].nodes.split_off(j);
                    best[a].nodes.extend(tail_b);
                    best[b].nodes.extend(tail_a);
                    best[a].recompute(graph);
                    best[b].recompute(graph);
                    improved = true;
                    break 'pairs;
                }
            }
        }
    }

    best.retain(|r| r.nodes.len() >= 3);
    best
}

/// Node-shift: relocate single customers between routes.
///
/// The best move over all (customer, target route, position) combinations is
/// applied as long as the combined cost drops and the receiving route stays
/// within cargo and battery limits.
pub fn node_shift(graph: &Graph, routes: &[Route]) -> Vec<Route> {
    let mut best: Vec<Route> = routes.to_vec();

    loop {
        let mut best_delta = -EPS;
        let mut best_move: Option<(usize, usize, usize, usize)> = None;

        for a in 0..best.len() {
            for pos in 1..best[a].nodes.len().saturating_sub(1) {
                let customer = best[a].nodes[pos];
                if graph.is_anchor(customer) {
                    continue;
                }

                let mut donor = best[a].nodes.clone();
                donor.remove(pos);
                let donor_cost = graph.path_cost(&donor);

                for b in 0..best.len() {
                    if a == b {
                        continue;
                    }
                    if best[b].total_demand + graph.demand(customer) > graph.capacity {
                        continue;
                    }
                    for insert in 1..best[b].nodes.len() {
                        let mut receiver = best[b].nodes.clone();
                        receiver.insert(insert, customer);

                        if graph.path_energy(&receiver) > graph.battery {
                            continue;
                        }

                        let delta = donor_cost + graph.path_cost(&receiver)
                            - best[a].total_cost
                            - best[b].total_cost;
                        if delta < best_delta {
                            best_delta = delta;
                            best_move = Some((a, pos, b, insert));
                        }
                    }
                }
            }
        }

        match best_move {
            Some((a, pos, b, insert)) => {
                let customer = best[a].nodes.remove(pos);
                best[b].nodes.insert(insert, customer);
                best[a].recompute(graph);
                best[b].recompute(graph);
            }
            None => break,
        }
    }

    best.retain(|r| r.nodes.len() >= 3);
    best
}

/// Swap each pair of adjacent interior nodes, keeping improving swaps.
pub fn adjacent_swap(graph: &Graph, state: &mut CevrpState) {
    for route in &mut state.routes {
        let n = route.nodes.len();
        if n < 4 {
            continue;
        }
        for i in 1..n - 2 {
            route.nodes.swap(i, i + 1);
            if admissible(graph, route, &route.nodes.clone()) {
                route.recompute(graph);
            } else {
                route.nodes.swap(i, i + 1);
            }
        }
    }
}

/// Swap non-consecutive interior node pairs, keeping improving swaps.
pub fn general_swap(graph: &Graph, state: &mut CevrpState) {
    for route in &mut state.routes {
        let n = route.nodes.len();
        if n < 5 {
            continue;
        }
        for i in 1..n - 3 {
            for j in i + 2..n - 1 {
                route.nodes.swap(i, j);
                if admissible(graph, route, &route.nodes.clone()) {
                    route.recompute(graph);
                } else {
                    route.nodes.swap(i, j);
                }
            }
        }
    }
}

/// Move single interior nodes to other interior positions within the route.
pub fn single_insertion(graph: &Graph, state: &mut CevrpState) {
    for route in &mut state.routes {
        let n = route.nodes.len();
        if n < 4 {
            continue;
        }
        for i in 1..n - 1 {
            for j in 1..n - 1 {
                if i == j {
                    continue;
                }
                let node = route.nodes.remove(i);
                route.nodes.insert(j, node);
                if admissible(graph, route, &route.nodes.clone()) {
                    route.recompute(graph);
                } else {
                    let node = route.nodes.remove(j);
                    route.nodes.insert(i, node);
                }
            }
        }
    }
}

/// Reverse interior segments, keeping improving reversals.
pub fn reverse_segment(graph: &Graph, state: &mut CevrpState) {
    for route in &mut state.routes {
        let n = route.nodes.len();
        if n < 5 {
            continue;
        }
        for i in 1..n - 3 {
            for j in i + 2..n - 1 {
                route.nodes[i..=j].reverse();
                if admissible(graph, route, &route.nodes.clone()) {
                    route.recompute(graph);
                } else {
                    route.nodes[i..=j].reverse();
                }
            }
        }
    }
}

/// Move a random block of consecutive interior nodes to a random position.
pub fn block_insert(graph: &Graph, state: &mut CevrpState, rng: &mut ChaCha8Rng) {
    for route in &mut state.routes {
        let n = route.nodes.len();
        if n < 5 {
            continue;
        }

        let max_block = 4.min(n - 3);
        if max_block < 2 {
            continue;
        }
        let block_size = rng.gen_range(2..=max_block);
        let start = rng.gen_range(1..n - block_size - 1 + 1);

        let mut candidate = route.nodes.clone();
        let block: Vec<usize> = candidate.drain(start..start + block_size).collect();
        let insert = rng.gen_range(1..candidate.len());
        for (offset, node) in block.into_iter().enumerate() {
            candidate.insert(insert + offset, node);
        }

        if admissible(graph, route, &candidate) {
            route.nodes = candidate;
            route.recompute(graph);
        }
    }
}

/// The on-best hook: apply one randomly chosen state-level operator.
pub fn apply_random_operator(
    graph: &Graph,
    state: &mut CevrpState,
    rng: &mut ChaCha8Rng,
) -> &'static str {
    match rng.gen_range(0..5) {
        0 => {
            adjacent_swap(graph, state);
            "adjacent_swap"
        }
        1 => {
            block_insert(graph, state, rng);
            "block_insert"
        }
        2 => {
            general_swap(graph, state);
            "general_swap"
        }
        3 => {
            reverse_segment(graph, state);
            "reverse_segment"
        }
        _ => {
            single_insertion(graph, state);
            "single_insertion"
        }
    }
}
