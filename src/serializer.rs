use std::collections::BTreeMap;

use tracing::debug;

use crate::{Error, Result, OpGraph, NodeIndex, StagedMutations};
use crate::subgraph::Subgraph;

#[derive(Clone, Debug, Default)]
pub struct ExecOrder {
    pub nodes: Vec<NodeIndex>,
    position: BTreeMap<NodeIndex, usize>,
}

impl ExecOrder {
    pub fn position(&self, node: NodeIndex) -> Option<usize> {
        self.position.get(&node).copied()
    }

    pub fn successor(&self, node: NodeIndex) -> Option<NodeIndex> {
        self.position(node).and_then(|i| self.nodes.get(i + 1)).copied()
    }

    pub fn contains(&self, node: NodeIndex) -> bool {
        self.position.contains_key(&node)
    }
}

// stages a ctrl edge between consecutive subgraph ops not yet ordered; every subgraph op gets a pending conf
pub fn serialize_subgraph(graph: &OpGraph, order: &[NodeIndex], subgraph: &Subgraph, staged: &mut StagedMutations) -> Result<ExecOrder> {
    let nodes = subgraph.ordered(order);
    if nodes.len() != subgraph.len() {
        let missing = subgraph.nodes.iter().find(|x| !nodes.contains(x)).map(|&x| graph[x].name().to_string()).unwrap_or_default();
        return Err(Error::UnknownOperator(missing))
    }
    let position = nodes.iter().enumerate().map(|(i, &x)| (x, i)).collect();

    for &node in &nodes {
        let conf = &graph[node].desc.conf;
        if staged.confs.insert(conf.name.clone(), conf.clone()).is_some() {
            return Err(Error::DuplicateOperator(conf.name.clone()))
        }
    }

    let reachability = graph.reachability();
    for pair in nodes.windows(2) {
        let (prev, this) = (graph[pair[0]].name(), graph[pair[1]].name());
        if !reachability.is_reachable(prev, this) {
            debug!("add ctrl edge from {} to {}", prev, this);
            staged.add_ctrl_edge(prev, this)?;
        }
    }

    Ok(ExecOrder { nodes, position })
}
