use smallvec::SmallVec;

pub type SVec<T, const N: usize = 3> = SmallVec<[T; N]>;

macro_rules! new_usize_type {
    ($visibility: vis, $type_name: ident) => {
        #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[repr(transparent)]
        $visibility struct $type_name(pub usize);

        impl<T: Into<$type_name>> std::ops::Add<T> for $type_name {
            type Output = $type_name;

            fn add(self, rhs: T) -> $type_name {
                $type_name(self.0 + rhs.into().0)
            }
        }

        impl From<usize> for $type_name {
            fn from(x: usize) -> $type_name {
                $type_name(x)
            }
        }
    }
}

pub(crate) use new_usize_type;

pub mod error;
pub mod sbp;
pub mod placement;
pub mod job;
pub mod graph;
pub mod subgraph;
pub mod serializer;
pub mod collective;
pub mod transition;
pub mod rewriter;
pub mod config;
pub mod pass;

pub use error::{Error, Result};
pub use sbp::{Sbp, BlobDesc};
pub use placement::{Device, DeviceType, Placement};
pub use job::{Job, JobBuilder, MutationSink, OperatorConf, OperatorDesc, PlacementGroup, StagedMutations};
pub use graph::{OpGraph, OpNode, OpEdge, NodeIndex, EdgeIndex, Reachability};
pub use collective::CollectiveKind;
pub use transition::{Transition, SkipReason};
pub use config::{PassConfig, CollectiveSupport};
pub use subgraph::Subgraph;
pub use serializer::ExecOrder;
pub use rewriter::{InsertedCollective, UnresolvedEdge};
pub use pass::{InsertCollectiveOpsPass, PassReport};
