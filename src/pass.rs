use serde::Serialize;
use tracing::{debug, info};

use crate::{Result, Job, JobBuilder, MutationSink, OpGraph, PassConfig, Placement, StagedMutations};
use crate::rewriter::{self, InsertedCollective, UnresolvedEdge};
use crate::serializer::serialize_subgraph;
use crate::subgraph::find_max_connected_subgraph;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PassReport {
    pub subgraph: Vec<String>, // in execution order
    pub ctrl_edges: Vec<(String, String)>, // added between subgraph ops to serialize them
    pub inserted: Vec<InsertedCollective>,
    pub unresolved: Vec<UnresolvedEdge>,
    pub mutated: Vec<String>,
}

impl PassReport {
    pub fn is_noop(&self) -> bool {
        self.inserted.is_empty() && self.mutated.is_empty()
    }
}

/// Rewrites the largest multi-device accelerator subgraph of a job so that sbp changes across its
/// edges go through explicit collective ops, all executed in one fixed order on every device.
#[derive(Clone, Debug, Default)]
pub struct InsertCollectiveOpsPass {
    config: PassConfig,
}

impl InsertCollectiveOpsPass {
    pub fn new(config: PassConfig) -> InsertCollectiveOpsPass {
        InsertCollectiveOpsPass { config }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.is_enabled()
    }

    pub fn apply(&self, job: &mut Job) -> Result<PassReport> {
        match self.plan(job)? {
            Some(planned) => planned.commit(&mut JobBuilder::new(job)),
            None => Ok(PassReport::default())
        }
    }

    // `job` is only read, the rewrite goes to `sink`
    pub fn apply_to_sink(&self, job: &Job, sink: &mut impl MutationSink) -> Result<PassReport> {
        match self.plan(job)? {
            Some(planned) => planned.commit(sink),
            None => Ok(PassReport::default())
        }
    }

    fn plan(&self, job: &Job) -> Result<Option<Planned>> {
        if !self.is_enabled() {
            debug!("insert collective ops pass is disabled");
            return Ok(None)
        }

        let graph = OpGraph::new(job)?;
        let order = graph.topo_order();
        let subgraph = find_max_connected_subgraph(&graph, order)?;
        if subgraph.len() <= 1 {
            debug!("no subgraph with more than one op to serialize");
            return Ok(None)
        }

        let mut staged = StagedMutations::default();
        let exec_order = serialize_subgraph(&graph, order, &subgraph, &mut staged)?;
        let ctrl_edges = exec_order.nodes.iter()
            .flat_map(|&x| {
                let (name, existing) = (graph[x].name(), &graph[x].desc.conf.ctrl_in_op_names);
                staged.confs[name].ctrl_in_op_names.iter()
                    .filter(move |from| !existing.contains(from))
                    .map(move |from| (from.clone(), name.to_string()))
            })
            .collect();

        let rewrite = rewriter::insert_collectives(&graph, &exec_order, &mut staged)?;
        let placement = graph[exec_order.nodes[0]].placement.clone();

        let report = PassReport {
            subgraph: rewriter::node_names(&graph, &exec_order.nodes),
            ctrl_edges,
            inserted: rewrite.inserted,
            unresolved: rewrite.unresolved,
            mutated: staged.mutated.iter().cloned().collect(),
        };
        info!("job {}: {} collective ops inserted, {} ops mutated", job.name, report.inserted.len(), report.mutated.len());
        Ok(Some(Planned { staged, placement, report }))
    }
}

// a rewrite that has been worked out against the job but not committed yet
struct Planned {
    staged: StagedMutations,
    placement: Placement,
    report: PassReport,
}

impl Planned {
    fn commit(self, sink: &mut impl MutationSink) -> Result<PassReport> {
        self.staged.commit(&self.placement, sink)?;
        Ok(self.report)
    }
}
