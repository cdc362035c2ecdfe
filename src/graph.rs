use std::collections::{BTreeMap, VecDeque};
use std::ops::Index;

use crate::{Error, Result, SVec, Sbp, BlobDesc, Placement, Job, OperatorDesc};
use crate::collective::COLLECTIVE_OP_TYPE_PREFIX;

crate::new_usize_type!(pub, NodeIndex);
crate::new_usize_type!(pub, EdgeIndex);

#[derive(Clone, Debug)]
pub struct OpNode<'j> {
    pub desc: &'j OperatorDesc,
    pub placement: &'j Placement,
    pub in_edges: SVec<EdgeIndex>,
    pub out_edges: SVec<EdgeIndex>,
    pub ctrl_in_nodes: SVec<NodeIndex>,
    pub ctrl_out_nodes: SVec<NodeIndex>,
}

impl<'j> OpNode<'j> {
    pub fn name(&self) -> &'j str {
        &self.desc.conf.name
    }

    pub fn time_shape_identity(&self) -> bool {
        self.desc.time_shape_identity
    }

    pub fn is_collective(&self) -> bool {
        self.desc.conf.op_type_name.starts_with(COLLECTIVE_OP_TYPE_PREFIX)
    }

    // as produced or consumed here
    pub fn sbp(&self, lbn: &str) -> Result<Sbp> {
        let conf = &self.desc.conf;
        let bn = conf.inputs.iter().find(|(_, x)| *x == lbn).map(|(ibn, _)| ibn.as_str())
            .or_else(|| conf.outputs.iter().find(|obn| conf.output_lbn(obn) == lbn).map(|obn| obn.as_str()));

        bn.and_then(|bn| self.desc.sbp_signature.get(bn)).copied()
            .ok_or_else(|| Error::MissingSbp { op: self.name().to_string(), lbn: lbn.to_string() })
    }

    pub fn blob_desc(&self, lbn: &str) -> Result<&'j BlobDesc> {
        let desc = self.desc;
        desc.conf.outputs.iter()
            .find(|obn| desc.conf.output_lbn(obn) == lbn)
            .and_then(|obn| desc.blob_descs.get(obn))
            .ok_or_else(|| Error::MissingBlobDesc { op: self.name().to_string(), lbn: lbn.to_string() })
    }
}

#[derive(Clone, Debug)]
pub struct OpEdge {
    pub src: NodeIndex,
    pub dst: NodeIndex,
    pub lbns: SVec<String, 1>, // in the order the consumer binds them
    pub lbn2ibns: BTreeMap<String, SVec<String, 1>>,
}

impl OpEdge {
    pub fn ibns(&self, lbn: &str) -> &[String] {
        self.lbn2ibns.get(lbn).map(|x| &x[..]).unwrap_or_default()
    }
}

#[derive(Clone, Debug)]
pub struct OpGraph<'j> {
    nodes: Vec<OpNode<'j>>,
    edges: Vec<OpEdge>,
    name2node: BTreeMap<&'j str, NodeIndex>,
    topo_order: Vec<NodeIndex>,
}

impl<'j> OpGraph<'j> {
    pub fn new(job: &'j Job) -> Result<OpGraph<'j>> {
        let mut op2placement: BTreeMap<&str, &Placement> = BTreeMap::new();
        for group in &job.placement_groups {
            for op_name in &group.op_names {
                if op2placement.insert(op_name, &group.placement).is_some() {
                    return Err(Error::DuplicatePlacement(op_name.clone()))
                }
            }
        }

        let mut name2node = BTreeMap::new();
        let mut nodes = Vec::with_capacity(job.ops.len());
        for desc in &job.ops {
            let name = desc.name();
            if name2node.insert(name, NodeIndex(nodes.len())).is_some() {
                return Err(Error::DuplicateOperator(name.to_string()))
            }
            let placement = *op2placement.get(name).ok_or_else(|| Error::MissingPlacement(name.to_string()))?;
            nodes.push(OpNode {
                desc,
                placement,
                in_edges: SVec::new(),
                out_edges: SVec::new(),
                ctrl_in_nodes: SVec::new(),
                ctrl_out_nodes: SVec::new(),
            });
        }
        if let Some(stray) = op2placement.keys().find(|name| !name2node.contains_key(*name)) {
            return Err(Error::UnknownOperator(stray.to_string()))
        }

        let mut lbn2producer = BTreeMap::new();
        for (i, desc) in job.ops.iter().enumerate() {
            for lbn in desc.conf.output_lbns() {
                lbn2producer.insert(lbn, NodeIndex(i));
            }
        }

        let mut edges: Vec<OpEdge> = vec![];
        let mut pair2edge: BTreeMap<(NodeIndex, NodeIndex), EdgeIndex> = BTreeMap::new();
        for (i, desc) in job.ops.iter().enumerate() {
            let dst = NodeIndex(i);
            for (ibn, lbn) in &desc.conf.inputs {
                let src = *lbn2producer.get(lbn).ok_or_else(|| Error::UnknownBlob { op: desc.name().to_string(), lbn: lbn.clone() })?;
                if src == dst {
                    return Err(Error::SelfLoop(desc.name().to_string()))
                }

                let edge_index = *pair2edge.entry((src, dst)).or_insert_with(|| {
                    edges.push(OpEdge { src, dst, lbns: SVec::new(), lbn2ibns: BTreeMap::new() });
                    nodes[src.0].out_edges.push(EdgeIndex(edges.len() - 1));
                    nodes[dst.0].in_edges.push(EdgeIndex(edges.len() - 1));
                    EdgeIndex(edges.len() - 1)
                });

                let edge = &mut edges[edge_index.0];
                if !edge.lbns.contains(lbn) {
                    edge.lbns.push(lbn.clone());
                }
                edge.lbn2ibns.entry(lbn.clone()).or_default().push(ibn.clone());
            }
        }

        for (i, desc) in job.ops.iter().enumerate() {
            for ctrl_in in &desc.conf.ctrl_in_op_names {
                let src = *name2node.get(ctrl_in.as_str()).ok_or_else(|| Error::UnknownOperator(ctrl_in.clone()))?;
                if src.0 == i {
                    return Err(Error::SelfLoop(ctrl_in.clone()))
                }
                nodes[src.0].ctrl_out_nodes.push(NodeIndex(i));
                nodes[i].ctrl_in_nodes.push(src);
            }
        }

        let mut graph = OpGraph { nodes, edges, name2node, topo_order: vec![] };
        graph.topo_order = graph.compute_topo_order()?;
        Ok(graph)
    }

    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeIndex, &OpNode<'j>)> + '_ {
        self.nodes.iter().enumerate().map(|(i, node)| (NodeIndex(i), node))
    }

    pub fn node(&self, name: &str) -> Option<NodeIndex> {
        self.name2node.get(name).copied()
    }

    pub fn in_out_data_nodes(&self, node: NodeIndex) -> impl Iterator<Item = NodeIndex> + '_ {
        let node = &self[node];
        node.in_edges.iter().map(|&e| self[e].src)
            .chain(node.out_edges.iter().map(|&e| self[e].dst))
    }

    pub fn data_and_ctrl_in_nodes(&self, node: NodeIndex) -> SVec<NodeIndex> {
        let node = &self[node];
        let mut result = SVec::new();
        for x in node.in_edges.iter().map(|&e| self[e].src).chain(node.ctrl_in_nodes.iter().copied()) {
            if !result.contains(&x) {
                result.push(x)
            }
        }
        result
    }

    pub fn data_and_ctrl_out_nodes(&self, node: NodeIndex) -> SVec<NodeIndex> {
        let node = &self[node];
        let mut result = SVec::new();
        for x in node.out_edges.iter().map(|&e| self[e].dst).chain(node.ctrl_out_nodes.iter().copied()) {
            if !result.contains(&x) {
                result.push(x)
            }
        }
        result
    }

    pub fn sources(&self) -> Vec<NodeIndex> {
        (0..self.nodes.len()).map(NodeIndex)
            .filter(|&i| self[i].in_edges.is_empty() && self[i].ctrl_in_nodes.is_empty())
            .collect()
    }

    pub fn topo_order(&self) -> &[NodeIndex] {
        &self.topo_order
    }

    fn compute_topo_order(&self) -> Result<Vec<NodeIndex>> {
        let mut pending: Vec<usize> = (0..self.nodes.len())
            .map(|i| self.data_and_ctrl_in_nodes(NodeIndex(i)).len())
            .collect();
        let mut queue: VecDeque<NodeIndex> = self.sources().into();
        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(node) = queue.pop_front() {
            order.push(node);
            for next in self.data_and_ctrl_out_nodes(node) {
                pending[next.0] -= 1;
                if pending[next.0] == 0 {
                    queue.push_back(next)
                }
            }
        }

        if order.len() != self.nodes.len() {
            return Err(Error::Cycle { visited: order.len(), total: self.nodes.len() })
        }
        Ok(order)
    }

    pub fn reachability(&self) -> Reachability<'_, 'j> {
        let n_words = self.nodes.len().div_ceil(64);
        let mut ancestors = vec![vec![0u64; n_words]; self.nodes.len()];

        for &node in &self.topo_order {
            let mut row = vec![0u64; n_words];
            for prev in self.data_and_ctrl_in_nodes(node) {
                for (word, x) in row.iter_mut().zip(&ancestors[prev.0]) {
                    *word |= x;
                }
                row[prev.0 / 64] |= 1 << (prev.0 % 64);
            }
            ancestors[node.0] = row;
        }

        Reachability { graph: self, ancestors }
    }
}

impl<'j> Index<NodeIndex> for OpGraph<'j> {
    type Output = OpNode<'j>;

    fn index(&self, index: NodeIndex) -> &Self::Output {
        &self.nodes[index.0]
    }
}

impl Index<EdgeIndex> for OpGraph<'_> {
    type Output = OpEdge;

    fn index(&self, index: EdgeIndex) -> &Self::Output {
        &self.edges[index.0]
    }
}

pub struct Reachability<'g, 'j> {
    graph: &'g OpGraph<'j>,
    ancestors: Vec<Vec<u64>>, // bitset of every node that reaches the indexed node
}

impl Reachability<'_, '_> {
    pub fn is_node_reachable(&self, src: NodeIndex, dst: NodeIndex) -> bool {
        self.ancestors[dst.0][src.0 / 64] & (1 << (src.0 % 64)) != 0
    }

    pub fn is_reachable(&self, src_op_name: &str, dst_op_name: &str) -> bool {
        match (self.graph.node(src_op_name), self.graph.node(dst_op_name)) {
            (Some(src), Some(dst)) => self.is_node_reachable(src, dst),
            _ => false
        }
    }
}
