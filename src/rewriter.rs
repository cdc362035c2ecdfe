use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{Error, Result, OpGraph, OpNode, NodeIndex, Sbp, BlobDesc, CollectiveKind, OperatorConf, OperatorDesc, StagedMutations};
use crate::serializer::ExecOrder;
use crate::transition::{self, Transition, SkipReason};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct InsertedCollective {
    pub name: String,
    pub kind: CollectiveKind,
    pub producer: String,
    pub consumer: String,
    pub lbn: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct UnresolvedEdge {
    pub producer: String,
    pub consumer: String,
    pub lbn: String,
    pub reason: SkipReason,
}

#[derive(Clone, Debug, Default)]
pub struct Rewrite {
    pub inserted: Vec<InsertedCollective>,
    pub unresolved: Vec<UnresolvedEdge>,
}

fn collective_op(name: String, kind: CollectiveKind, producer: &OpNode, lbn: &str, src_sbp: Sbp, dst_sbp: Sbp, desc: &BlobDesc) -> OperatorDesc {
    let mut conf = OperatorConf::new(name, kind.op_type_name())
        .with_input("in_0", lbn)
        .with_output("out_0");
    conf.scope_symbol_id = producer.desc.conf.scope_symbol_id;

    OperatorDesc::new(conf)
        .with_sbp("in_0", src_sbp)
        .with_sbp("out_0", dst_sbp)
        .with_blob_desc("out_0", desc.clone())
}

/// Stages a collective on every in-subgraph edge whose sbp changes across it, walking the
/// subgraph in execution order. Consecutive collectives are chained by ctrl edges, and a
/// collective that does not feed the producer's successor is ordered before that successor.
pub fn insert_collectives(graph: &OpGraph, order: &ExecOrder, staged: &mut StagedMutations) -> Result<Rewrite> {
    let mut rewrite = Rewrite::default();
    let mut next_id = 0; // names restart per run, skipping those the job already has
    let Some(&first) = order.nodes.first() else {
        return Ok(rewrite)
    };
    let placement = graph[first].placement;

    for &src in &order.nodes {
        let src_node = &graph[src];
        for &edge_index in &src_node.out_edges {
            let edge = &graph[edge_index];
            let dst = edge.dst;
            if dst == src {
                return Err(Error::SelfLoop(src_node.name().to_string()))
            }
            if !order.contains(dst) {
                continue // consumer outside the subgraph
            }
            let dst_node = &graph[dst];
            if dst_node.placement != placement {
                return Err(Error::PlacementMismatch {
                    name: dst_node.name().to_string(),
                    expected: placement.to_string(),
                    found: dst_node.placement.to_string(),
                })
            }

            for lbn in &edge.lbns {
                let (src_sbp, dst_sbp) = (src_node.sbp(lbn)?, dst_node.sbp(lbn)?);
                let desc = src_node.blob_desc(lbn)?;

                let kind = match transition::resolve(lbn, src_sbp, dst_sbp, desc, placement.parallel_num())? {
                    Transition::Insert(kind) => kind,
                    Transition::Skip(SkipReason::NoTransition) => continue,
                    Transition::Skip(reason) => {
                        if let SkipReason::Unimplemented(kind) = &reason {
                            warn!("need to insert {} for {} -> {} ({}, shape {}) but it is unimplemented",
                                kind, src_node.name(), dst_node.name(), lbn, desc);
                        } else {
                            debug!("skip {} -> {} ({}): {}", src_node.name(), dst_node.name(), lbn, reason);
                        }
                        rewrite.unresolved.push(UnresolvedEdge {
                            producer: src_node.name().to_string(),
                            consumer: dst_node.name().to_string(),
                            lbn: lbn.clone(),
                            reason,
                        });
                        continue
                    }
                };

                let name = kind.gen_op_name(&mut next_id, |x| graph.node(x).is_some());
                let mut op = collective_op(name, kind, src_node, lbn, src_sbp, dst_sbp, desc);
                let op_name = op.name().to_string();
                let new_lbn = op.conf.output_lbn("out_0");
                info!("insert {} op {} for {} -> {}", kind, op_name, src_node.name(), dst_node.name());

                let dst_conf = staged.conf_mut(dst_node.name())?;
                for ibn in edge.ibns(lbn) {
                    let old_lbn = dst_conf.replace_input_lbn(ibn, &new_lbn)?;
                    info!("replace {} input {} from {} to {}", dst_node.name(), ibn, old_lbn, new_lbn);
                }
                staged.mutated.insert(dst_node.name().to_string());

                // collectives run one after another in insertion order on every device
                if let Some(prev) = staged.last_new_op_name() {
                    debug!("add ctrl edge from {} to {}", prev, op_name);
                    op.conf.add_ctrl_in_op_name(prev);
                }

                let next = order.successor(src).ok_or_else(|| Error::NoSuccessor(src_node.name().to_string()))?;
                if next != dst {
                    debug!("add ctrl edge from {} to {}", op_name, graph[next].name());
                    staged.add_ctrl_edge(&op_name, graph[next].name())?;
                }

                rewrite.inserted.push(InsertedCollective {
                    name: op_name,
                    kind,
                    producer: src_node.name().to_string(),
                    consumer: dst_node.name().to_string(),
                    lbn: lbn.clone(),
                });
                staged.new_ops.push(op);
            }
        }
    }

    Ok(rewrite)
}

pub(crate) fn node_names(graph: &OpGraph, nodes: &[NodeIndex]) -> Vec<String> {
    nodes.iter().map(|&x| graph[x].name().to_string()).collect()
}
