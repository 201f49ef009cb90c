//! Result aggregation
//!
//! Folds the final build-state tree into the shape callers see: data types
//! without declared views expose their collection directly, the rest nest
//! one collection per view name.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::config::Config;
use crate::file::FileCollection;
use crate::plugin::ViewName;
use crate::state::BuildState;

/// Result for one data type
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum DataTypeOutput {
    /// No views declared
    Flat(FileCollection),
    /// One collection per view
    Views(BTreeMap<String, FileCollection>),
}

impl DataTypeOutput {
    /// The collection of a flat data type
    pub fn as_flat(&self) -> Option<&FileCollection> {
        match self {
            Self::Flat(files) => Some(files),
            Self::Views(_) => None,
        }
    }

    /// One view's collection
    pub fn view(&self, name: &str) -> Option<&FileCollection> {
        match self {
            Self::Flat(_) => None,
            Self::Views(views) => views.get(name),
        }
    }

    /// Total records across all views
    pub fn file_count(&self) -> usize {
        match self {
            Self::Flat(files) => files.len(),
            Self::Views(views) => views.values().map(Vec::len).sum(),
        }
    }
}

/// Aggregated result of one build, keyed by data type name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct BuildOutput {
    data_types: BTreeMap<String, DataTypeOutput>,
}

impl BuildOutput {
    /// Result of one data type
    pub fn get(&self, data_type: &str) -> Option<&DataTypeOutput> {
        self.data_types.get(data_type)
    }

    /// Iterate data types in name order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &DataTypeOutput)> {
        self.data_types.iter()
    }

    /// Number of data types
    pub fn len(&self) -> usize {
        self.data_types.len()
    }

    /// Whether no data types were built
    pub fn is_empty(&self) -> bool {
        self.data_types.is_empty()
    }

    /// Total records across every data type and view
    pub fn file_count(&self) -> usize {
        self.data_types.values().map(DataTypeOutput::file_count).sum()
    }
}

/// Collapse the build-state tree into a [`BuildOutput`].
///
/// The config decides the shape, so a data type with an empty view map still
/// appears, as an empty map.
pub fn aggregate(state: BuildState, config: &Config) -> BuildOutput {
    let mut data_types: BTreeMap<String, DataTypeOutput> = config
        .data_types
        .iter()
        .map(|(name, data_type)| {
            let empty = if data_type.output.has_views() {
                DataTypeOutput::Views(BTreeMap::new())
            } else {
                DataTypeOutput::Flat(Vec::new())
            };
            (name.clone(), empty)
        })
        .collect();

    for (key, files) in state {
        let Some(output) = data_types.get_mut(&key.data_type) else {
            continue;
        };
        match (output, key.view) {
            (DataTypeOutput::Flat(flat), ViewName::Default) => *flat = files,
            (DataTypeOutput::Views(views), ViewName::Named(view)) => {
                views.insert(view, files);
            }
            (_, view) => {
                tracing::debug!("Dropping slot {}/{} with no declared home", key.data_type, view);
            }
        }
    }

    BuildOutput { data_types }
}
