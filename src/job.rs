use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Error, Result, Sbp, BlobDesc, Placement};

pub fn gen_lbn(op_name: &str, obn: &str) -> String {
    format!("{op_name}/{obn}")
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorConf {
    pub name: String,
    pub op_type_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope_symbol_id: Option<i64>,
    #[serde(default)]
    pub inputs: BTreeMap<String, String>, // input blob name (slot) -> logical blob name
    #[serde(default)]
    pub outputs: Vec<String>, // output blob names, the logical blob name is `<op name>/<obn>`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ctrl_in_op_names: Vec<String>,
}

impl OperatorConf {
    pub fn new(name: impl Into<String>, op_type_name: impl Into<String>) -> OperatorConf {
        OperatorConf { name: name.into(), op_type_name: op_type_name.into(), ..Default::default() }
    }

    pub fn with_input(mut self, ibn: impl Into<String>, lbn: impl Into<String>) -> OperatorConf {
        self.inputs.insert(ibn.into(), lbn.into());
        self
    }

    pub fn with_output(mut self, obn: impl Into<String>) -> OperatorConf {
        self.outputs.push(obn.into());
        self
    }

    pub fn output_lbn(&self, obn: &str) -> String {
        gen_lbn(&self.name, obn)
    }

    pub fn output_lbns(&self) -> impl Iterator<Item = String> + '_ {
        self.outputs.iter().map(|obn| self.output_lbn(obn))
    }

    pub fn add_ctrl_in_op_name(&mut self, op_name: &str) {
        if !self.ctrl_in_op_names.iter().any(|x| x == op_name) {
            self.ctrl_in_op_names.push(op_name.to_string())
        }
    }

    // returns the blob the slot used to read
    pub fn replace_input_lbn(&mut self, ibn: &str, new_lbn: &str) -> Result<String> {
        let slot = self.inputs.get_mut(ibn).ok_or_else(|| Error::UnknownInputSlot { op: self.name.clone(), ibn: ibn.to_string() })?;
        Ok(std::mem::replace(slot, new_lbn.to_string()))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorDesc {
    pub conf: OperatorConf,
    #[serde(default)]
    pub sbp_signature: BTreeMap<String, Sbp>, // ibn or obn -> sbp
    #[serde(default)]
    pub blob_descs: BTreeMap<String, BlobDesc>, // obn -> logical blob desc
    #[serde(default = "default_time_shape_identity")]
    pub time_shape_identity: bool,
}

fn default_time_shape_identity() -> bool {
    true
}

impl OperatorDesc {
    pub fn new(conf: OperatorConf) -> OperatorDesc {
        OperatorDesc { conf, sbp_signature: BTreeMap::new(), blob_descs: BTreeMap::new(), time_shape_identity: true }
    }

    pub fn with_sbp(mut self, bn: impl Into<String>, sbp: Sbp) -> OperatorDesc {
        self.sbp_signature.insert(bn.into(), sbp);
        self
    }

    pub fn with_blob_desc(mut self, obn: impl Into<String>, desc: BlobDesc) -> OperatorDesc {
        self.blob_descs.insert(obn.into(), desc);
        self
    }

    pub fn with_time_shape_identity(mut self, identity: bool) -> OperatorDesc {
        self.time_shape_identity = identity;
        self
    }

    pub fn name(&self) -> &str {
        &self.conf.name
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacementGroup {
    pub placement: Placement,
    pub op_names: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    #[serde(default)]
    pub name: String,
    pub ops: Vec<OperatorDesc>,
    pub placement_groups: Vec<PlacementGroup>,
}

impl Job {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Job> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn op(&self, name: &str) -> Option<&OperatorDesc> {
        self.ops.iter().find(|op| op.name() == name)
    }

    pub fn placement_of(&self, name: &str) -> Option<&Placement> {
        self.placement_groups.iter()
            .find(|group| group.op_names.iter().any(|x| x == name))
            .map(|group| &group.placement)
    }

    pub fn push_op(&mut self, placement: &Placement, op: OperatorDesc) {
        let name = op.name().to_string();
        self.ops.push(op);
        match self.placement_groups.iter_mut().find(|group| &group.placement == placement) {
            Some(group) => group.op_names.push(name),
            None => self.placement_groups.push(PlacementGroup { placement: placement.clone(), op_names: vec![name] })
        }
    }
}

pub trait MutationSink {
    // each name at most once per call
    fn mut_ops_only_once(&mut self, confs: Vec<OperatorConf>) -> Result<()>;

    fn add_ops(&mut self, placement: &Placement, ops: Vec<OperatorDesc>) -> Result<()>;
}

pub struct JobBuilder<'j> {
    job: &'j mut Job,
}

impl<'j> JobBuilder<'j> {
    pub fn new(job: &'j mut Job) -> JobBuilder<'j> {
        JobBuilder { job }
    }
}

impl MutationSink for JobBuilder<'_> {
    fn mut_ops_only_once(&mut self, confs: Vec<OperatorConf>) -> Result<()> {
        {
            let mut seen = BTreeSet::new();
            for conf in &confs {
                if !seen.insert(conf.name.as_str()) {
                    return Err(Error::DuplicateReplacement(conf.name.clone()))
                }
                if self.job.op(&conf.name).is_none() {
                    return Err(Error::UnknownOperator(conf.name.clone()))
                }
            }
        }

        for conf in confs {
            if let Some(op) = self.job.ops.iter_mut().find(|op| op.conf.name == conf.name) {
                op.conf = conf;
            }
        }
        Ok(())
    }

    fn add_ops(&mut self, placement: &Placement, ops: Vec<OperatorDesc>) -> Result<()> {
        {
            let mut seen = BTreeSet::new();
            for op in &ops {
                if self.job.op(op.name()).is_some() || !seen.insert(op.name()) {
                    return Err(Error::DuplicateOperator(op.name().to_string()))
                }
            }
        }

        for op in ops {
            self.job.push_op(placement, op);
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default)]
pub struct StagedMutations {
    pub confs: BTreeMap<String, OperatorConf>, // pending conf of every subgraph operator
    pub mutated: BTreeSet<String>,
    pub new_ops: Vec<OperatorDesc>,
}

impl StagedMutations {
    pub fn conf_mut(&mut self, name: &str) -> Result<&mut OperatorConf> {
        self.confs.get_mut(name).ok_or_else(|| Error::UnknownOperator(name.to_string()))
    }

    pub fn add_ctrl_edge(&mut self, from: &str, to: &str) -> Result<()> {
        self.conf_mut(to)?.add_ctrl_in_op_name(from);
        self.mutated.insert(to.to_string());
        Ok(())
    }

    pub fn last_new_op_name(&self) -> Option<&str> {
        self.new_ops.last().map(|op| op.name())
    }

    pub fn is_empty(&self) -> bool {
        self.mutated.is_empty() && self.new_ops.is_empty()
    }

    pub fn commit(self, placement: &Placement, sink: &mut impl MutationSink) -> Result<()> {
        let StagedMutations { mut confs, mutated, new_ops } = self;
        let mutated_confs = mutated.iter().map(|name| {
            confs.remove(name).ok_or_else(|| Error::UnknownOperator(name.clone()))
        }).collect::<Result<Vec<_>>>()?;

        sink.mut_ops_only_once(mutated_confs)?;
        sink.add_ops(placement, new_ops)
    }
}
