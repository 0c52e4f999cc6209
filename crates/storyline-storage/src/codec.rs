//! Versioned JSON encoding of module records
//!
//! Every stored record carries a `version` field. Decoding reads it first and
//! dispatches on [`RecordVersion`]; encoding always writes
//! [`RecordVersion::CURRENT`]. Encoding is deterministic, so equal records
//! produce byte-identical values.

use crate::error::CodecError;
use crate::link::LinkPath;
use crate::path::ModulePath;
use crate::record::{Intent, ModuleRecord, ModuleSource, ParameterMapping, SurfaceRelation};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Schema versions understood by the decoder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordVersion {
    /// Legacy layout with `module_*` field names, no embedding or annotations
    V1,
    /// Current layout
    V2,
}

impl RecordVersion {
    /// Version written by [`encode`]
    pub const CURRENT: Self = Self::V2;

    /// Numeric tag stored in the `version` field
    #[inline]
    #[must_use]
    pub fn tag(self) -> u64 {
        match self {
            Self::V1 => 1,
            Self::V2 => 2,
        }
    }

    /// Version for a numeric tag
    #[inline]
    #[must_use]
    pub fn from_tag(tag: u64) -> Option<Self> {
        match tag {
            1 => Some(Self::V1),
            2 => Some(Self::V2),
            _ => None,
        }
    }
}

#[derive(Serialize)]
struct Envelope<'a> {
    version: u64,
    #[serde(flatten)]
    record: &'a ModuleRecord,
}

#[derive(Deserialize)]
struct ModuleRecordV1 {
    module_path: Vec<String>,
    module_url: String,
    module_source: ModuleSource,
    intent: Intent,
    #[serde(default)]
    surface_relation: Option<SurfaceRelation>,
    #[serde(default)]
    module_deleted: bool,
    #[serde(default)]
    parameter_map: Vec<ParameterMappingV1>,
}

#[derive(Deserialize)]
struct ParameterMappingV1 {
    name: String,
    link_path: Vec<String>,
    link_name: String,
}

impl From<ModuleRecordV1> for ModuleRecord {
    fn from(v1: ModuleRecordV1) -> Self {
        Self {
            path: ModulePath::new(v1.module_path),
            source: v1.module_source,
            url: v1.module_url,
            intent: v1.intent,
            surface_relation: v1.surface_relation,
            deleted: v1.module_deleted,
            embedded: false,
            parameter_map: v1
                .parameter_map
                .into_iter()
                .map(|mapping| ParameterMapping {
                    name: mapping.name,
                    link: LinkPath::new(ModulePath::new(mapping.link_path), mapping.link_name),
                })
                .collect(),
            annotations: BTreeMap::new(),
        }
    }
}

/// Encode `record` with the current schema
///
/// # Errors
/// `CodecError::Encode` if serialization fails.
pub fn encode(record: &ModuleRecord) -> Result<Vec<u8>, CodecError> {
    let envelope = Envelope {
        version: RecordVersion::CURRENT.tag(),
        record,
    };
    serde_json::to_vec(&envelope).map_err(|e| CodecError::Encode(e.to_string()))
}

/// Decode a stored record of any known version
///
/// # Errors
/// - `CodecError::Malformed` if the bytes are not a JSON object of the schema
/// - `CodecError::MissingVersion` if there is no numeric `version` field
/// - `CodecError::UnsupportedVersion` for unknown versions
pub fn decode(bytes: &[u8]) -> Result<ModuleRecord, CodecError> {
    let value: serde_json::Value =
        serde_json::from_slice(bytes).map_err(|e| CodecError::Malformed(e.to_string()))?;
    let tag = value
        .get("version")
        .and_then(serde_json::Value::as_u64)
        .ok_or(CodecError::MissingVersion)?;
    let version = RecordVersion::from_tag(tag).ok_or(CodecError::UnsupportedVersion(tag))?;

    match version {
        RecordVersion::V1 => serde_json::from_value::<ModuleRecordV1>(value)
            .map(ModuleRecord::from)
            .map_err(|e| CodecError::Malformed(e.to_string())),
        RecordVersion::V2 => serde_json::from_value::<ModuleRecord>(value)
            .map_err(|e| CodecError::Malformed(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{SurfaceArrangement, SurfaceDependency};
    use pretty_assertions::assert_eq;

    fn sample() -> ModuleRecord {
        ModuleRecord::new(ModulePath::single("map"), "app://map", Intent::new("maps"))
            .with_surface_relation(SurfaceRelation {
                arrangement: SurfaceArrangement::Copresent,
                dependency: SurfaceDependency::Dependent,
                emphasis: 0.5,
            })
            .with_annotation("b", "2")
            .with_annotation("a", "1")
    }

    #[test]
    fn encode_writes_current_version() {
        let bytes = encode(&sample()).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["version"], 2);
        assert_eq!(decode(&bytes).unwrap(), sample());
    }

    #[test]
    fn encoding_is_deterministic() {
        assert_eq!(encode(&sample()).unwrap(), encode(&sample()).unwrap());
    }

    #[test]
    fn decodes_legacy_layout() {
        let legacy = br#"{
            "version": 1,
            "module_path": ["story", "map"],
            "module_url": "app://map",
            "module_source": "internal",
            "intent": {"handler": "maps"},
            "module_deleted": true,
            "parameter_map": [{"name": "loc", "link_path": ["story"], "link_name": "here"}]
        }"#;

        let record = decode(legacy).unwrap();
        assert_eq!(record.path, ModulePath::from(&["story", "map"][..]));
        assert_eq!(record.source, ModuleSource::Internal);
        assert!(record.deleted);
        assert!(!record.embedded);
        assert_eq!(
            record.parameter_map[0].link,
            LinkPath::new(ModulePath::single("story"), "here")
        );
    }

    #[test]
    fn rejects_missing_and_unknown_versions() {
        assert_eq!(decode(br#"{"path": []}"#), Err(CodecError::MissingVersion));
        assert_eq!(
            decode(br#"{"version": 9}"#),
            Err(CodecError::UnsupportedVersion(9))
        );
        assert!(matches!(decode(b"not json"), Err(CodecError::Malformed(_))));
    }
}
