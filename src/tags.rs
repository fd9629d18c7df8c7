use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::RecorderError;

/// Index of the scan-control channel. Never part of a frame.
pub const CONTROL_INDEX: usize = 0;

/// Semantic type that keeps a channel out of the sink
pub const IGNORE_TYPE: &str = "ignore";

/// Display name and semantic type configured for one channel index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub semantic_type: String,
}

impl TagSpec {
    pub fn new(name: impl Into<String>, semantic_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            semantic_type: semantic_type.into(),
        }
    }
}

/// A configured channel resolved against the device's raw identifiers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelDescriptor {
    pub index: usize,
    pub display_name: String,
    pub raw_identifier: String,
    pub semantic_type: String,
}

/// Channel descriptors keyed by index
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagRegistry {
    descriptors: BTreeMap<usize, ChannelDescriptor>,
}

impl TagRegistry {
    /// Resolve every configured index against the raw identifier list.
    ///
    /// Indices missing from `configured` are left out entirely, so the registry
    /// holds exactly one descriptor per configured tag. An index past the end of
    /// `raw_ids` is a configuration error.
    pub fn build(
        raw_ids: &[String],
        configured: &BTreeMap<usize, TagSpec>,
    ) -> Result<Self, RecorderError> {
        let mut descriptors = BTreeMap::new();

        for (&index, spec) in configured {
            let raw_identifier = raw_ids.get(index).ok_or_else(|| {
                RecorderError::Config(format!(
                    "tag index {} out of range: device exposes {} channels",
                    index,
                    raw_ids.len()
                ))
            })?;

            descriptors.insert(
                index,
                ChannelDescriptor {
                    index,
                    display_name: spec.name.clone(),
                    raw_identifier: raw_identifier.clone(),
                    semantic_type: spec.semantic_type.clone(),
                },
            );
        }

        tracing::debug!(
            "Tag registry built: {} of {} device channels mapped",
            descriptors.len(),
            raw_ids.len()
        );

        Ok(Self { descriptors })
    }

    pub fn get(&self, index: usize) -> Option<&ChannelDescriptor> {
        self.descriptors.get(&index)
    }

    /// The scan-control descriptor, if index 0 was configured
    pub fn control(&self) -> Option<&ChannelDescriptor> {
        self.get(CONTROL_INDEX)
    }

    /// Measurement channels in ascending index order, control channel excluded
    pub fn measurement_channels(&self) -> impl Iterator<Item = &ChannelDescriptor> {
        self.descriptors
            .values()
            .filter(|d| d.index != CONTROL_INDEX)
    }

    /// Display names of the measurement channels, ascending by index
    pub fn tag_names(&self) -> Vec<String> {
        self.measurement_channels()
            .map(|d| d.display_name.clone())
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.descriptors.len()
    }
}
