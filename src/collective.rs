use std::fmt::Display;

use serde::Serialize;

pub const COLLECTIVE_OP_NAME_PREFIX: &str = "System-CCL-Logical-Op";
pub const COLLECTIVE_OP_TYPE_PREFIX: &str = "_ccl_logical_op_";

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectiveKind {
    AllReduce,     // P -> B
    ReduceScatter, // P -> S(0)
    AllGather,     // S(0) -> B
    AllToAll,      // S(i) -> S(j)
}

impl CollectiveKind {
    pub fn op_type_name(self) -> &'static str {
        match self {
            CollectiveKind::AllReduce => "_ccl_logical_op_all_reduce",
            CollectiveKind::ReduceScatter => "_ccl_logical_op_reduce_scatter",
            CollectiveKind::AllGather => "_ccl_logical_op_all_gather",
            CollectiveKind::AllToAll => "_ccl_logical_op_all2all",
        }
    }

    // the sbp transition in short form, used in generated op names
    pub fn tag(self) -> &'static str {
        match self {
            CollectiveKind::AllReduce => "P2B",
            CollectiveKind::ReduceScatter => "P2S",
            CollectiveKind::AllGather => "S2B",
            CollectiveKind::AllToAll => "S2S",
        }
    }

    // takes ids from `next_id` until the name is not `taken`
    pub fn gen_op_name(self, next_id: &mut u64, mut taken: impl FnMut(&str) -> bool) -> String {
        loop {
            let name = format!("{}-{}-{}", COLLECTIVE_OP_NAME_PREFIX, self.tag(), *next_id);
            *next_id += 1;
            if !taken(&name) {
                return name
            }
        }
    }
}

impl Display for CollectiveKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollectiveKind::AllReduce => write!(f, "all_reduce"),
            CollectiveKind::ReduceScatter => write!(f, "reduce_scatter"),
            CollectiveKind::AllGather => write!(f, "all_gather"),
            CollectiveKind::AllToAll => write!(f, "all_to_all"),
        }
    }
}
