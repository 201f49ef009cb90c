//! Data-type expander
//!
//! Turns one data type's freshly read (and pre-processed) collection into one
//! independent collection per view.

use std::collections::BTreeMap;

use crate::config::OutputSpec;
use crate::file::FileCollection;
use crate::plugin::ViewName;

/// Give every view its own deep copy of `files`.
///
/// Without declared views the collection is moved, uncopied, under
/// [`ViewName::Default`].
pub fn expand(output: &OutputSpec, files: FileCollection) -> BTreeMap<ViewName, FileCollection> {
    match output {
        OutputSpec::Default(_) => BTreeMap::from([(ViewName::Default, files)]),
        OutputSpec::Views(views) => {
            // Every view but the first gets a clone; the first takes the original.
            let mut expanded: BTreeMap<_, _> = views
                .keys()
                .skip(1)
                .map(|name| (ViewName::named(name.clone()), files.clone()))
                .collect();
            if let Some(first) = views.keys().next() {
                expanded.insert(ViewName::named(first.clone()), files);
            }
            expanded
        }
    }
}
