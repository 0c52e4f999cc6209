//! Store key layout
//!
//! Keys are `/`-delimited. Segments taken from user data are escaped with a
//! backslash before `\`, `/` and `:` so they never introduce separators.
//!
//! | namespace | key |
//! |---|---|
//! | module records | `Module/<path>` |
//! | entity type tags | `Entity/<cookie>/type` |
//! | entity blobs | `Entity/<cookie>/data` |
//! | link values | `Link/<path>/<link name>` |
//!
//! `<path>` is a module path serialized with [`encode_module_path`].

use crate::link::LinkPath;
use crate::path::ModulePath;

/// Prefix of module record keys
pub const MODULE_KEY_PREFIX: &str = "Module/";
/// Prefix of entity keys
pub const ENTITY_KEY_PREFIX: &str = "Entity/";
/// Prefix of link value keys
pub const LINK_KEY_PREFIX: &str = "Link/";

const ESCAPE: char = '\\';
const KEY_SEPARATOR: char = '/';
const PATH_SEPARATOR: char = ':';
const TYPE_SUFFIX: &str = "type";
const DATA_SUFFIX: &str = "data";

/// Escape `\`, `/` and `:` in one key segment
#[must_use]
pub fn escape_segment(segment: &str) -> String {
    let mut escaped = String::with_capacity(segment.len());
    for c in segment.chars() {
        if matches!(c, ESCAPE | KEY_SEPARATOR | PATH_SEPARATOR) {
            escaped.push(ESCAPE);
        }
        escaped.push(c);
    }
    escaped
}

/// Split `encoded` on unescaped `separator` and unescape each part
#[must_use]
pub fn split_escaped(encoded: &str, separator: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut chars = encoded.chars();

    while let Some(c) = chars.next() {
        if c == ESCAPE {
            if let Some(next) = chars.next() {
                current.push(next);
            }
        } else if c == separator {
            parts.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
    }
    parts.push(current);
    parts
}

/// Serialize a module path: escaped segments joined by `:`
///
/// Also used as the shell's surface id.
#[must_use]
pub fn encode_module_path(path: &ModulePath) -> String {
    path.iter()
        .map(escape_segment)
        .collect::<Vec<_>>()
        .join(&PATH_SEPARATOR.to_string())
}

/// Inverse of [`encode_module_path`]
#[must_use]
pub fn decode_module_path(encoded: &str) -> ModulePath {
    if encoded.is_empty() {
        return ModulePath::root();
    }
    ModulePath::new(split_escaped(encoded, PATH_SEPARATOR))
}

/// Key of the module record at `path`
#[must_use]
pub fn module_key(path: &ModulePath) -> String {
    format!("{MODULE_KEY_PREFIX}{}", encode_module_path(path))
}

/// Key of the type tag of entity `cookie`
#[must_use]
pub fn entity_type_key(cookie: &str) -> String {
    format!("{ENTITY_KEY_PREFIX}{}/{TYPE_SUFFIX}", escape_segment(cookie))
}

/// Key of the blob of entity `cookie`
#[must_use]
pub fn entity_data_key(cookie: &str) -> String {
    format!("{ENTITY_KEY_PREFIX}{}/{DATA_SUFFIX}", escape_segment(cookie))
}

/// Key of the link value at `link`
#[must_use]
pub fn link_key(link: &LinkPath) -> String {
    format!(
        "{LINK_KEY_PREFIX}{}/{}",
        encode_module_path(&link.module_path),
        escape_segment(&link.link_name)
    )
}

/// Namespace a key belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyKind {
    /// Module record
    Module,
    /// Entity type tag for the cookie
    EntityType(String),
    /// Entity blob for the cookie
    EntityData(String),
    /// Link value
    Link,
    /// Anything else
    Unknown,
}

/// Classify `key` by namespace
#[must_use]
pub fn classify(key: &str) -> KeyKind {
    if key.starts_with(MODULE_KEY_PREFIX) {
        return KeyKind::Module;
    }
    if key.starts_with(LINK_KEY_PREFIX) {
        return KeyKind::Link;
    }
    if let Some(rest) = key.strip_prefix(ENTITY_KEY_PREFIX) {
        let parts = split_escaped(rest, KEY_SEPARATOR);
        if let [cookie, suffix] = parts.as_slice() {
            match suffix.as_str() {
                TYPE_SUFFIX => return KeyKind::EntityType(cookie.clone()),
                DATA_SUFFIX => return KeyKind::EntityData(cookie.clone()),
                _ => {}
            }
        }
    }
    KeyKind::Unknown
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(segments: &[&str]) -> ModulePath {
        ModulePath::new(segments.iter().map(|s| (*s).to_string()).collect())
    }

    #[test]
    fn escape_marks_separators() {
        assert_eq!(escape_segment("plain"), "plain");
        assert_eq!(escape_segment("a/b"), "a\\/b");
        assert_eq!(escape_segment("a:b"), "a\\:b");
        assert_eq!(escape_segment("a\\b"), "a\\\\b");
    }

    #[test]
    fn module_key_joins_escaped_segments() {
        assert_eq!(module_key(&path(&["root", "child"])), "Module/root:child");
        assert_eq!(module_key(&path(&["a:b", "c/d"])), "Module/a\\:b:c\\/d");
    }

    #[test]
    fn escaped_separator_does_not_split() {
        let encoded = encode_module_path(&path(&["x:y", "z"]));
        assert_eq!(decode_module_path(&encoded), path(&["x:y", "z"]));
        assert_eq!(decode_module_path(""), ModulePath::root());
    }

    #[test]
    fn entity_keys_classify_by_suffix() {
        assert_eq!(
            classify(&entity_type_key("cookie/1")),
            KeyKind::EntityType("cookie/1".to_string())
        );
        assert_eq!(
            classify(&entity_data_key("cookie")),
            KeyKind::EntityData("cookie".to_string())
        );
        assert_eq!(classify("Entity/cookie/other"), KeyKind::Unknown);
    }

    #[test]
    fn classify_namespaces() {
        assert_eq!(classify(&module_key(&path(&["a"]))), KeyKind::Module);
        let link = LinkPath::new(path(&["a"]), "input");
        assert_eq!(link_key(&link), "Link/a/input");
        assert_eq!(classify(&link_key(&link)), KeyKind::Link);
        assert_eq!(classify("Story/whatever"), KeyKind::Unknown);
    }
}
