use std::fmt::Display;

use serde::Serialize;

use crate::{Error, Result, Sbp, BlobDesc, CollectiveKind};

// why an edge keeps its direct binding
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NoTransition,
    DynamicShape,
    Indivisible { kind: CollectiveKind, axis: usize, dim: i64, parallel_num: usize },
    Unimplemented(CollectiveKind),
}

impl Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::NoTransition => write!(f, "no transition"),
            SkipReason::DynamicShape => write!(f, "dynamic shape"),
            SkipReason::Indivisible { kind, axis, dim, parallel_num } =>
                write!(f, "{kind} needs dim {axis} ({dim}) divisible by {parallel_num}"),
            SkipReason::Unimplemented(kind) => write!(f, "{kind} is not implemented"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Transition {
    Insert(CollectiveKind),
    Skip(SkipReason),
}

impl Transition {
    pub fn collective(&self) -> Option<CollectiveKind> {
        match self {
            Transition::Insert(kind) => Some(*kind),
            Transition::Skip(_) => None
        }
    }
}

// whether dim `axis` of `desc` splits evenly over `parallel_num` devices
fn divisible(lbn: &str, desc: &BlobDesc, axis: usize, parallel_num: usize) -> Result<Option<i64>> {
    let dim = desc.at(axis).ok_or_else(|| Error::SplitAxisOutOfRange { lbn: lbn.to_string(), axis, desc: desc.clone() })?;
    Ok(if dim % parallel_num as i64 == 0 { None } else { Some(dim) })
}

/// Decides which collective turns `src_sbp` into `dst_sbp` for the blob `lbn` on a placement of
/// `parallel_num` devices. The first matching pattern wins. Dynamic shapes are skipped, while an
/// empty, non-positive or overflowing shape is a [`Error::MalformedShape`].
pub fn resolve(lbn: &str, src_sbp: Sbp, dst_sbp: Sbp, desc: &BlobDesc, parallel_num: usize) -> Result<Transition> {
    if desc.is_dynamic {
        return Ok(Transition::Skip(SkipReason::DynamicShape))
    }
    if desc.num_axes() == 0 || desc.shape[0] <= 0 || !matches!(desc.elem_cnt(), Some(n) if n > 0) {
        return Err(Error::MalformedShape { lbn: lbn.to_string(), desc: desc.clone() })
    }

    let indivisible = |kind: CollectiveKind, axis: usize, dim: i64| Transition::Skip(SkipReason::Indivisible { kind, axis, dim, parallel_num });

    let transition = match (src_sbp, dst_sbp) {
        (Sbp::PartialSum, Sbp::Broadcast) => Transition::Insert(CollectiveKind::AllReduce),
        (Sbp::PartialSum, Sbp::Split(0)) => match divisible(lbn, desc, 0, parallel_num)? {
            None => Transition::Insert(CollectiveKind::ReduceScatter),
            Some(dim) => indivisible(CollectiveKind::ReduceScatter, 0, dim),
        },
        (Sbp::Split(0), Sbp::Broadcast) => match divisible(lbn, desc, 0, parallel_num)? {
            None => Transition::Insert(CollectiveKind::AllGather),
            Some(dim) => indivisible(CollectiveKind::AllGather, 0, dim),
        },
        (Sbp::Split(a), Sbp::Split(b)) if a != b => {
            match (divisible(lbn, desc, a, parallel_num)?, divisible(lbn, desc, b, parallel_num)?) {
                (None, None) => Transition::Skip(SkipReason::Unimplemented(CollectiveKind::AllToAll)),
                (Some(dim), _) => indivisible(CollectiveKind::AllToAll, a, dim),
                (None, Some(dim)) => indivisible(CollectiveKind::AllToAll, b, dim),
            }
        }
        _ => Transition::Skip(SkipReason::NoTransition)
    };

    Ok(transition)
}
