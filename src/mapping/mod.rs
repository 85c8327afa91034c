//! Mapping tables: parsing, header normalization and lookup.
//!
//! - [`tiny`]: Tiny v1/v2 parser
//! - [`normalize`]: rewrites the namespace labels of the embedded table
//! - [`index`]: per-direction rename tables shared by the remapper
//! - [`descriptor`]: descriptor and generic signature rewriting

pub mod descriptor;
pub mod index;
pub mod normalize;
pub mod tiny;

pub use descriptor::{remap_class_name, remap_descriptor, remap_signature, ClassMapper};
pub use index::{Conflict, MappingIndex, MemberKey};
pub use normalize::{
    normalize_header, normalize_mappings, NamespacePair, NormalizeReport, CANONICAL_PAIRS,
    INTERMEDIARY_NAMESPACE, MAPPINGS_RESOURCE, NAMED_NAMESPACE, RAW_NAMESPACE, READABLE_NAMESPACE,
};
pub use tiny::{ClassMapping, MappingTable, MemberMapping};

use std::fs;
use std::path::Path;

use crate::error::{Error, Result};

/// Loads a mapping table file and indexes it for `from` -> `to`.
pub fn load_index(path: &Path, from: &str, to: &str) -> Result<MappingIndex> {
    let text = fs::read_to_string(path).map_err(|e| Error::FileOpen {
        path: path.to_path_buf(),
        source: e,
    })?;
    let table = MappingTable::parse(&text)?;
    MappingIndex::build(&table, from, to)
}
