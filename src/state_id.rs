//! Composite resource identifiers.
//!
//! Several Atlas resources are addressed by more than one field (a custom role
//! lives under a project, a serverless endpoint under a project and an
//! instance). The provider persists such resources with a single opaque `id`
//! that bundles every addressing field.
//!
//! Each part is written as `base64(key):base64(value)` and the parts are joined
//! with `-`. The standard base64 alphabet never produces `:` or `-`, so values
//! may contain any character without escaping.
//!
//! # Example
//!
//! ```
//! use mongodbatlas_provider::state_id::{IdLayout, StateId};
//!
//! const LAYOUT: IdLayout = IdLayout::new(&["project_id", "role_name"]);
//!
//! let id = StateId::new(&LAYOUT, ["p1", "r1"]).unwrap();
//! let encoded = id.encode();
//!
//! let decoded = StateId::decode(&LAYOUT, &encoded).unwrap();
//! assert_eq!(decoded.get("project_id"), Some("p1"));
//! assert_eq!(decoded.get("role_name"), Some("r1"));
//! assert_eq!(decoded.encode(), encoded);
//! ```

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use thiserror::Error;

const PART_SEPARATOR: char = '-';
const KEY_VALUE_SEPARATOR: char = ':';

/// Errors produced while building or decoding a [`StateId`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateIdError {
    /// The encoded identifier does not match the expected layout.
    #[error("malformed resource id '{id}': {reason}")]
    Malformed {
        /// The identifier as received.
        id: String,
        /// What was wrong with it.
        reason: String,
    },

    /// The number of values supplied does not match the layout.
    #[error("expected {expected} id part(s), got {actual}")]
    PartCount {
        /// Number of keys in the layout.
        expected: usize,
        /// Number of values supplied.
        actual: usize,
    },

    /// A human-entered import identifier could not be split.
    #[error("import format error: to import use the format {format}")]
    ImportFormat {
        /// The expected format, e.g. `{project_id}-{role_name}`.
        format: String,
    },
}

/// The fixed, ordered key set of a resource kind's composite id.
///
/// Layouts list keys in lexicographic order so that encoded ids match the
/// ones persisted by earlier provider releases, which sorted keys before
/// encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdLayout {
    keys: &'static [&'static str],
}

impl IdLayout {
    /// Create a layout from its ordered keys.
    pub const fn new(keys: &'static [&'static str]) -> Self {
        Self { keys }
    }

    /// The keys in encoding order.
    pub fn keys(&self) -> &'static [&'static str] {
        self.keys
    }

    /// Number of parts an id of this layout has.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the layout has no keys.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// A decoded composite identifier: one value per layout key, in layout order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateId {
    parts: Vec<(&'static str, String)>,
}

impl StateId {
    /// Build an id from values given in layout order.
    pub fn new<I, V>(layout: &IdLayout, values: I) -> Result<Self, StateIdError>
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        let values: Vec<String> = values.into_iter().map(Into::into).collect();
        if values.len() != layout.len() {
            return Err(StateIdError::PartCount {
                expected: layout.len(),
                actual: values.len(),
            });
        }

        Ok(Self {
            parts: layout.keys().iter().copied().zip(values).collect(),
        })
    }

    /// Decode an id previously produced by [`StateId::encode`].
    ///
    /// Fails unless the id has exactly one well-formed part per layout key,
    /// with keys in layout order.
    pub fn decode(layout: &IdLayout, encoded: &str) -> Result<Self, StateIdError> {
        let malformed = |reason: String| StateIdError::Malformed {
            id: encoded.to_string(),
            reason,
        };

        // An empty layout encodes to "", which `split` would see as one part.
        let raw_parts: Vec<&str> = if encoded.is_empty() {
            Vec::new()
        } else {
            encoded.split(PART_SEPARATOR).collect()
        };
        if raw_parts.len() != layout.len() {
            return Err(malformed(format!(
                "expected {} part(s), found {}",
                layout.len(),
                raw_parts.len()
            )));
        }

        let mut parts = Vec::with_capacity(layout.len());
        for (expected_key, raw) in layout.keys().iter().copied().zip(raw_parts) {
            let (raw_key, raw_value) = raw
                .split_once(KEY_VALUE_SEPARATOR)
                .ok_or_else(|| malformed(format!("part '{}' is not key:value", raw)))?;

            let key = decode_segment(raw_key).map_err(&malformed)?;
            if key != expected_key {
                return Err(malformed(format!(
                    "expected key '{}', found '{}'",
                    expected_key, key
                )));
            }

            let value = decode_segment(raw_value).map_err(&malformed)?;
            parts.push((expected_key, value));
        }

        Ok(Self { parts })
    }

    /// Encode the id into its opaque string form.
    pub fn encode(&self) -> String {
        self.parts
            .iter()
            .map(|(key, value)| {
                format!(
                    "{}{}{}",
                    STANDARD.encode(key),
                    KEY_VALUE_SEPARATOR,
                    STANDARD.encode(value)
                )
            })
            .collect::<Vec<_>>()
            .join(&PART_SEPARATOR.to_string())
    }

    /// Look up the value for a key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.parts
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Iterate over `(key, value)` pairs in layout order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
        self.parts.iter().map(|(k, v)| (*k, v.as_str()))
    }
}

fn decode_segment(segment: &str) -> Result<String, String> {
    let bytes = STANDARD
        .decode(segment)
        .map_err(|e| format!("invalid base64 '{}': {}", segment, e))?;
    String::from_utf8(bytes).map_err(|e| format!("invalid utf-8: {}", e))
}

/// Split a human-entered import id into exactly `keys.len()` parts.
///
/// The final part absorbs any further separators, so a role named
/// `read-only` imports from `p1-read-only`. Empty parts are rejected.
pub fn parse_import_id<'a>(
    raw: &'a str,
    separator: &str,
    keys: &[&str],
) -> Result<Vec<&'a str>, StateIdError> {
    let format_error = || StateIdError::ImportFormat {
        format: keys
            .iter()
            .map(|k| format!("{{{}}}", k))
            .collect::<Vec<_>>()
            .join(separator),
    };

    let parts: Vec<&str> = raw.splitn(keys.len(), separator).collect();
    if parts.len() != keys.len() || parts.iter().any(|p| p.is_empty()) {
        return Err(format_error());
    }
    Ok(parts)
}
