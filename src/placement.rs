use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType { Cpu, Gpu }

impl DeviceType {
    pub fn is_accelerator(self) -> bool {
        matches!(self, DeviceType::Gpu)
    }
}

impl Display for DeviceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceType::Cpu => write!(f, "cpu"),
            DeviceType::Gpu => write!(f, "gpu"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Device {
    pub machine: usize,
    pub index: usize,
}

impl Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.machine, self.index)
    }
}

/// A placement with an ordered, duplicate-free device list. Two placements are equal iff they
/// share the device type and the device set.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "ParallelConf", into = "ParallelConf")]
pub struct Placement {
    device_type: DeviceType,
    devices: Vec<Device>,
}

impl Placement {
    pub fn new(device_type: DeviceType, devices: impl IntoIterator<Item = Device>) -> Placement {
        let mut devices: Vec<_> = devices.into_iter().collect();
        devices.sort();
        devices.dedup();
        Placement { device_type, devices }
    }

    pub fn on_machine(device_type: DeviceType, n: usize) -> Placement {
        Placement::new(device_type, (0..n).map(|index| Device { machine: 0, index }))
    }

    pub fn device_type(&self) -> DeviceType {
        self.device_type
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn parallel_num(&self) -> usize {
        self.devices.len()
    }
}

impl Display for Placement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}[", self.device_type)?;
        for (i, device) in self.devices.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{device}")?;
        }
        write!(f, "]")
    }
}

// wire form: {"device_tag": "gpu", "device_name": ["0:0-3", "1:0"]}
#[derive(Clone, Debug, Serialize, Deserialize)]
struct ParallelConf {
    device_tag: DeviceType,
    device_name: Vec<String>,
}

impl TryFrom<ParallelConf> for Placement {
    type Error = Error;

    fn try_from(conf: ParallelConf) -> Result<Placement, Error> {
        let mut devices = vec![];
        for name in &conf.device_name {
            devices.extend(parse_device_name(name)?);
        }
        if devices.is_empty() {
            return Err(Error::InvalidPlacement("empty device list".to_string()))
        }
        Ok(Placement::new(conf.device_tag, devices))
    }
}

impl From<Placement> for ParallelConf {
    fn from(placement: Placement) -> ParallelConf {
        ParallelConf {
            device_tag: placement.device_type,
            device_name: placement.devices.iter().map(|d| d.to_string()).collect(),
        }
    }
}

fn parse_device_name(name: &str) -> Result<Vec<Device>, Error> {
    let invalid = || Error::InvalidPlacement(format!("bad device name `{name}`"));

    let (machine, range) = name.trim().split_once(':').ok_or_else(invalid)?;
    let machine = usize::from_str(machine).map_err(|_| invalid())?;
    let (start, end) = match range.split_once('-') {
        Some((start, end)) => (start.parse().map_err(|_| invalid())?, end.parse().map_err(|_| invalid())?),
        None => {
            let index: usize = range.parse().map_err(|_| invalid())?;
            (index, index)
        }
    };
    if start > end {
        return Err(invalid())
    }

    Ok((start..=end).map(|index| Device { machine, index }).collect())
}
