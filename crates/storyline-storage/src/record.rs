//! Persisted module records
//!
//! A [`ModuleRecord`] describes one module of a story: where it sits
//! ([`ModulePath`]), what launches it ([`Intent`]), how its surface relates to
//! its parent ([`SurfaceRelation`]) and whether it was deleted.

use crate::link::LinkPath;
use crate::path::ModulePath;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Who added a module to the story
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleSource {
    /// Added by another module of the story
    Internal,
    /// Added by a story-level command
    External,
}

/// Named intent parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentParameter {
    /// Parameter name
    pub name: String,
    /// Serialized parameter value
    pub data: String,
}

/// What a module was launched to do
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Intent {
    /// Component handling the intent
    pub handler: String,
    /// Optional action verb
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    /// Intent parameters, in order
    #[serde(default)]
    pub parameters: Vec<IntentParameter>,
}

impl Intent {
    /// Intent for `handler` without action or parameters
    #[inline]
    #[must_use]
    pub fn new(handler: impl Into<String>) -> Self {
        Self {
            handler: handler.into(),
            action: None,
            parameters: Vec::new(),
        }
    }

    /// With action
    #[inline]
    #[must_use]
    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    /// With an extra parameter
    #[inline]
    #[must_use]
    pub fn with_parameter(mut self, name: impl Into<String>, data: impl Into<String>) -> Self {
        self.parameters.push(IntentParameter {
            name: name.into(),
            data: data.into(),
        });
        self
    }
}

/// Visual arrangement of a surface relative to its parent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurfaceArrangement {
    /// Shown side by side with the parent
    Copresent,
    /// Replaces the parent in sequence
    Sequential,
    /// Stacked over the parent
    Ontop,
    /// Shell decides
    #[default]
    None,
}

/// Lifetime coupling of a surface to its parent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurfaceDependency {
    /// Dismissed together with the parent
    Dependent,
    /// Independent
    #[default]
    None,
}

/// Relation of a module surface to its anchor surface
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SurfaceRelation {
    /// Visual arrangement
    pub arrangement: SurfaceArrangement,
    /// Lifetime coupling
    pub dependency: SurfaceDependency,
    /// Relative emphasis
    pub emphasis: f32,
}

impl Default for SurfaceRelation {
    fn default() -> Self {
        Self {
            arrangement: SurfaceArrangement::None,
            dependency: SurfaceDependency::None,
            emphasis: 1.0,
        }
    }
}

/// Binding of an intent parameter name to a link
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterMapping {
    /// Parameter name
    pub name: String,
    /// Link holding the parameter value
    pub link: LinkPath,
}

/// Persisted description of one module
///
/// `deleted` is terminal: once a record is observed deleted, its runtime is
/// torn down and never relaunched from that record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleRecord {
    /// Unique path within the story
    pub path: ModulePath,
    /// Who added the module
    pub source: ModuleSource,
    /// Component url
    pub url: String,
    /// Intent the module was launched with
    pub intent: Intent,
    /// Relation to the anchor surface
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub surface_relation: Option<SurfaceRelation>,
    /// Deleted records stay persisted as tombstones
    #[serde(default)]
    pub deleted: bool,
    /// Embedded modules are shown inside their parent, not by the shell
    #[serde(default)]
    pub embedded: bool,
    /// Parameter to link bindings
    #[serde(default)]
    pub parameter_map: Vec<ParameterMapping>,
    /// Free-form annotations
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

impl ModuleRecord {
    /// Externally added, non-embedded record
    #[must_use]
    pub fn new(path: ModulePath, url: impl Into<String>, intent: Intent) -> Self {
        Self {
            path,
            source: ModuleSource::External,
            url: url.into(),
            intent,
            surface_relation: None,
            deleted: false,
            embedded: false,
            parameter_map: Vec::new(),
            annotations: BTreeMap::new(),
        }
    }

    /// With source
    #[inline]
    #[must_use]
    pub fn with_source(mut self, source: ModuleSource) -> Self {
        self.source = source;
        self
    }

    /// With embedded flag
    #[inline]
    #[must_use]
    pub fn with_embedded(mut self, embedded: bool) -> Self {
        self.embedded = embedded;
        self
    }

    /// With surface relation
    #[inline]
    #[must_use]
    pub fn with_surface_relation(mut self, relation: SurfaceRelation) -> Self {
        self.surface_relation = Some(relation);
        self
    }

    /// With parameter binding
    #[inline]
    #[must_use]
    pub fn with_parameter_link(mut self, name: impl Into<String>, link: LinkPath) -> Self {
        self.parameter_map.push(ParameterMapping {
            name: name.into(),
            link,
        });
        self
    }

    /// With annotation
    #[inline]
    #[must_use]
    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    /// Check if the record is a tombstone
    #[inline]
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    /// Check if the module was added by a story-level command
    #[inline]
    #[must_use]
    pub fn is_external(&self) -> bool {
        self.source == ModuleSource::External
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_record_defaults() {
        let record = ModuleRecord::new(ModulePath::single("a"), "app://a", Intent::new("h1"));
        assert!(record.is_external());
        assert!(!record.is_deleted());
        assert!(!record.embedded);
        assert!(record.surface_relation.is_none());
    }

    #[test]
    fn builder_sets_fields() {
        let link = LinkPath::new(ModulePath::single("a"), "input");
        let record = ModuleRecord::new(ModulePath::single("a"), "app://a", Intent::new("h1"))
            .with_source(ModuleSource::Internal)
            .with_embedded(true)
            .with_parameter_link("in", link.clone())
            .with_annotation("color", "blue");

        assert!(!record.is_external());
        assert!(record.embedded);
        assert_eq!(record.parameter_map[0].link, link);
        assert_eq!(record.annotations.get("color").map(String::as_str), Some("blue"));
    }

    #[test]
    fn intents_compare_by_content() {
        let a = Intent::new("h").with_action("view").with_parameter("p", "1");
        let b = Intent::new("h").with_action("view").with_parameter("p", "1");
        assert_eq!(a, b);
        assert_ne!(a, Intent::new("h"));
    }
}
