use std::collections::{BTreeSet, VecDeque};

use tracing::debug;

use crate::{Error, Result, OpGraph, NodeIndex, Placement};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Subgraph {
    pub nodes: BTreeSet<NodeIndex>,
}

impl Subgraph {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, node: NodeIndex) -> bool {
        self.nodes.contains(&node)
    }

    pub fn ordered(&self, order: &[NodeIndex]) -> Vec<NodeIndex> {
        order.iter().copied().filter(|x| self.contains(*x)).collect()
    }
}

// collectives and the ops an earlier run wired to them belong to an already rewritten region
fn is_rewritten(graph: &OpGraph, node: NodeIndex) -> bool {
    graph[node].is_collective() || graph.data_and_ctrl_in_nodes(node).into_iter()
        .chain(graph.data_and_ctrl_out_nodes(node))
        .any(|x| graph[x].is_collective())
}

// whether an operator may start a subgraph
fn is_seed_candidate(graph: &OpGraph, node: NodeIndex) -> bool {
    let placement = graph[node].placement;
    placement.device_type().is_accelerator() && placement.parallel_num() > 1 && graph[node].time_shape_identity()
        && !is_rewritten(graph, node)
}

// whether a neighbor may join the subgraph started by a seed on `placement`
fn can_join(graph: &OpGraph, node: NodeIndex, placement: &Placement) -> bool {
    graph[node].placement == placement && graph[node].time_shape_identity() && !is_rewritten(graph, node)
}

// largest connected group of ops on one multi-device accelerator placement, earliest seed in `order` wins ties
pub fn find_max_connected_subgraph(graph: &OpGraph, order: &[NodeIndex]) -> Result<Subgraph> {
    let mut visited = vec![false; graph.n_nodes()];
    let mut best = Subgraph::default();

    for &seed in order {
        if visited[seed.0] {
            continue
        }
        visited[seed.0] = true;
        if !is_seed_candidate(graph, seed) {
            continue
        }

        let component = expand_component(graph, seed, &mut visited)?;
        debug!("found subgraph of {} ops from seed {}", component.len(), graph[seed].name());
        if component.len() > best.len() {
            best = component
        }
    }

    Ok(best)
}

fn expand_component(graph: &OpGraph, seed: NodeIndex, visited: &mut [bool]) -> Result<Subgraph> {
    let placement = graph[seed].placement;
    let mut component = Subgraph::default();
    let mut queue = VecDeque::from([seed]);

    while let Some(node) = queue.pop_front() {
        if graph[node].placement != placement {
            return Err(Error::PlacementMismatch {
                name: graph[node].name().to_string(),
                expected: placement.to_string(),
                found: graph[node].placement.to_string(),
            })
        }
        component.nodes.insert(node);

        for next in graph.in_out_data_nodes(node) {
            if !visited[next.0] && can_join(graph, next, placement) {
                visited[next.0] = true;
                queue.push_back(next);
            }
        }
    }

    Ok(component)
}
