use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::Result;

pub const MIN_COLLECTIVE_LIBRARY_VERSION: u32 = 2700;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectiveSupport {
    #[serde(default)]
    pub device_collectives: bool,
    #[serde(default)]
    pub library_version: Option<u32>,
}

impl CollectiveSupport {
    pub fn new(library_version: u32) -> CollectiveSupport {
        CollectiveSupport { device_collectives: true, library_version: Some(library_version) }
    }

    pub fn is_supported(&self) -> bool {
        self.device_collectives && self.library_version.is_some_and(|v| v > MIN_COLLECTIVE_LIBRARY_VERSION)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassConfig {
    #[serde(default)]
    pub enable_insert_collective_ops: bool,
    #[serde(default)]
    pub collective_support: CollectiveSupport,
}

impl PassConfig {
    pub fn enabled(library_version: u32) -> PassConfig {
        PassConfig { enable_insert_collective_ops: true, collective_support: CollectiveSupport::new(library_version) }
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<PassConfig> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn is_enabled(&self) -> bool {
        self.enable_insert_collective_ops && self.collective_support.is_supported()
    }
}
