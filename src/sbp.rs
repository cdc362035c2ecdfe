use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{Error, SVec};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Sbp { Split(usize), Broadcast, PartialSum }

impl Sbp {
    pub fn split_axis(self) -> Option<usize> {
        match self {
            Sbp::Split(axis) => Some(axis),
            _ => None
        }
    }
}

impl Display for Sbp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Sbp::Split(axis) => write!(f, "S({})", axis),
            Sbp::Broadcast => write!(f, "B"),
            Sbp::PartialSum => write!(f, "P"),
        }
    }
}

impl FromStr for Sbp {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s.trim() {
            "B" => Ok(Sbp::Broadcast),
            "P" => Ok(Sbp::PartialSum),
            s if s.starts_with("S(") && s.ends_with(')') => {
                s[2..s.len()-1].trim().parse().map(Sbp::Split).map_err(|_| Error::InvalidSbp(s.to_string()))
            }
            _ => Err(Error::InvalidSbp(s.to_string()))
        }
    }
}

impl TryFrom<String> for Sbp {
    type Error = Error;

    fn try_from(s: String) -> Result<Self, Error> {
        s.parse()
    }
}

impl From<Sbp> for String {
    fn from(sbp: Sbp) -> String {
        sbp.to_string()
    }
}

// logical shape, as seen by the whole placement
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobDesc {
    pub shape: SVec<i64, 4>,
    #[serde(default)]
    pub is_dynamic: bool,
}

impl BlobDesc {
    pub fn new(shape: impl IntoIterator<Item = i64>) -> BlobDesc {
        BlobDesc { shape: shape.into_iter().collect(), is_dynamic: false }
    }

    pub fn dynamic(shape: impl IntoIterator<Item = i64>) -> BlobDesc {
        BlobDesc { is_dynamic: true, ..BlobDesc::new(shape) }
    }

    pub fn num_axes(&self) -> usize {
        self.shape.len()
    }

    pub fn at(&self, axis: usize) -> Option<i64> {
        self.shape.get(axis).copied()
    }

    // an empty shape has no elements here, unlike a scalar; None if the count overflows
    pub fn elem_cnt(&self) -> Option<i64> {
        if self.shape.is_empty() {
            return Some(0)
        }
        self.shape.iter().try_fold(1i64, |acc, &dim| acc.checked_mul(dim))
    }
}

impl Display for BlobDesc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "(")?;
        for (i, dim) in self.shape.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{dim}")?;
        }
        write!(f, ")")?;
        if self.is_dynamic {
            write!(f, "?")?;
        }
        Ok(())
    }
}
