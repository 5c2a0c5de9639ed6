//! Schema types for describing provider and resource structure.
//!
//! Schemas describe the shape of the provider configuration and of each
//! resource. They drive validation, plan computation (which attributes force
//! replacement, which are computed) and state upgrades (through the version).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Value type of an attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeType {
    /// UTF-8 text.
    String,
    /// Whole number that fits in an `i64`.
    Int64,
    /// `true` or `false`.
    Bool,
    /// Ordered elements.
    List(Box<AttributeType>),
    /// Elements whose order carries no meaning.
    Set(Box<AttributeType>),
}

impl AttributeType {
    /// Set of `element`.
    pub fn set(element: AttributeType) -> Self {
        Self::Set(Box::new(element))
    }
}

/// Who supplies an attribute's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AttributeFlags {
    /// Must appear in configuration.
    pub required: bool,
    /// May appear in configuration.
    pub optional: bool,
    /// Filled in by the provider.
    pub computed: bool,
    /// Kept out of logs and plan output.
    pub sensitive: bool,
}

impl AttributeFlags {
    /// Configuration must set it.
    pub fn required() -> Self {
        Self {
            required: true,
            ..Default::default()
        }
    }

    /// Configuration may set it.
    pub fn optional() -> Self {
        Self {
            optional: true,
            ..Default::default()
        }
    }

    /// Only the provider sets it.
    pub fn computed() -> Self {
        Self {
            computed: true,
            ..Default::default()
        }
    }

    /// Configuration may set it, otherwise the provider does.
    pub fn optional_computed() -> Self {
        Self {
            optional: true,
            computed: true,
            ..Default::default()
        }
    }

    /// Whether the provider alone sets the attribute.
    pub fn is_computed_only(&self) -> bool {
        self.computed && !self.optional && !self.required
    }
}

/// A constraint on a string attribute's value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StringRule {
    /// The whole value must match the regular expression.
    Pattern(String),
    /// The value must not start with the prefix.
    NotPrefix(String),
    /// The value must be one of the listed values.
    OneOf(Vec<String>),
}

/// One attribute of a block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    /// Value type.
    #[serde(rename = "type")]
    pub attr_type: AttributeType,
    /// Who supplies the value.
    #[serde(flatten)]
    pub flags: AttributeFlags,
    /// Shown in generated documentation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// A change to this attribute destroys and recreates the resource.
    #[serde(default)]
    pub force_new: bool,
    /// Constraints checked by validation (string attributes only).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<StringRule>,
}

impl Attribute {
    /// An attribute of `attr_type` with no description, rules or force-new.
    pub fn new(attr_type: AttributeType, flags: AttributeFlags) -> Self {
        Self {
            attr_type,
            flags,
            description: None,
            force_new: false,
            rules: Vec::new(),
        }
    }

    /// `String`, required.
    pub fn required_string() -> Self {
        Self::new(AttributeType::String, AttributeFlags::required())
    }

    /// `String`, optional.
    pub fn optional_string() -> Self {
        Self::new(AttributeType::String, AttributeFlags::optional())
    }

    /// `String`, optional, filled in by the provider when unset.
    pub fn optional_computed_string() -> Self {
        Self::new(AttributeType::String, AttributeFlags::optional_computed())
    }

    /// `String`, provider-set.
    pub fn computed_string() -> Self {
        Self::new(AttributeType::String, AttributeFlags::computed())
    }

    /// `Int64`, required.
    pub fn required_int64() -> Self {
        Self::new(AttributeType::Int64, AttributeFlags::required())
    }

    /// `Int64`, provider-set.
    pub fn computed_int64() -> Self {
        Self::new(AttributeType::Int64, AttributeFlags::computed())
    }

    /// `Bool`, required.
    pub fn required_bool() -> Self {
        Self::new(AttributeType::Bool, AttributeFlags::required())
    }

    /// `Bool`, optional.
    pub fn optional_bool() -> Self {
        Self::new(AttributeType::Bool, AttributeFlags::optional())
    }

    /// Attach documentation text.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Replace the resource when this attribute changes.
    pub fn with_force_new(mut self) -> Self {
        self.force_new = true;
        self
    }

    /// Hide the value from logs and plan output.
    pub fn sensitive(mut self) -> Self {
        self.flags.sensitive = true;
        self
    }

    /// Require the value to match `pattern` (a regular expression).
    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.rules.push(StringRule::Pattern(pattern.into()));
        self
    }

    /// Reject values starting with `prefix`.
    pub fn without_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.rules.push(StringRule::NotPrefix(prefix.into()));
        self
    }

    /// Restrict the value to one of `values`.
    pub fn one_of(mut self, values: &[&str]) -> Self {
        self.rules
            .push(StringRule::OneOf(values.iter().map(|v| v.to_string()).collect()));
        self
    }
}

/// Whether repeated nested blocks keep their order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BlockNestingMode {
    /// Ordered; plans compare element by element.
    #[default]
    List,
    /// Unordered; plans ignore element order.
    Set,
}

/// Attributes and nested blocks at one level of a schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// Attributes by name.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub attributes: HashMap<String, Attribute>,
    /// Nested blocks by name.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub blocks: HashMap<String, NestedBlock>,
    /// Shown in generated documentation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Block {
    /// A block with no fields.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `attr` under `name`.
    pub fn with_attribute(mut self, name: impl Into<String>, attr: Attribute) -> Self {
        self.attributes.insert(name.into(), attr);
        self
    }

    /// Add `block` under `name`.
    pub fn with_block(mut self, name: impl Into<String>, block: NestedBlock) -> Self {
        self.blocks.insert(name.into(), block);
        self
    }

    /// Attribute and block names, sorted.
    pub fn field_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .attributes
            .keys()
            .chain(self.blocks.keys())
            .map(String::as_str)
            .collect();
        names.sort_unstable();
        names
    }
}

/// A repeated nested block such as the `actions` of a custom role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NestedBlock {
    /// Fields of each element.
    #[serde(flatten)]
    pub block: Block,
    /// List or set.
    #[serde(default)]
    pub nesting_mode: BlockNestingMode,
    /// Fewest elements accepted.
    #[serde(default)]
    pub min_items: u32,
    /// Most elements accepted; 0 means no limit.
    #[serde(default)]
    pub max_items: u32,
    /// A change to the elements destroys and recreates the resource.
    #[serde(default)]
    pub force_new: bool,
}

impl NestedBlock {
    fn with_mode(block: Block, nesting_mode: BlockNestingMode) -> Self {
        Self {
            block,
            nesting_mode,
            min_items: 0,
            max_items: 0,
            force_new: false,
        }
    }

    /// Ordered elements of `block`.
    pub fn list(block: Block) -> Self {
        Self::with_mode(block, BlockNestingMode::List)
    }

    /// Unordered elements of `block`.
    pub fn set(block: Block) -> Self {
        Self::with_mode(block, BlockNestingMode::Set)
    }

    /// Require at least `min` elements.
    pub fn with_min_items(mut self, min: u32) -> Self {
        self.min_items = min;
        self
    }

    /// Allow at most `max` elements.
    pub fn with_max_items(mut self, max: u32) -> Self {
        self.max_items = max;
        self
    }

    /// Replace the resource when the elements change.
    pub fn with_force_new(mut self) -> Self {
        self.force_new = true;
        self
    }
}

/// Schema of one resource type or of the provider configuration.
///
/// `version` is stored with each state; a state written under an older
/// version goes through the resource's upgrade before use.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    /// State format version.
    #[serde(default)]
    pub version: u64,
    /// Top-level fields.
    #[serde(flatten)]
    pub block: Block,
}

impl Schema {
    /// An empty schema at `version`.
    pub fn new(version: u64) -> Self {
        Self {
            version,
            block: Block::new(),
        }
    }

    /// An empty schema at version 0.
    pub fn v0() -> Self {
        Self::new(0)
    }

    /// Add a top-level attribute.
    pub fn with_attribute(mut self, name: impl Into<String>, attr: Attribute) -> Self {
        self.block.attributes.insert(name.into(), attr);
        self
    }

    /// Add a top-level nested block.
    pub fn with_block(mut self, name: impl Into<String>, block: NestedBlock) -> Self {
        self.block.blocks.insert(name.into(), block);
        self
    }

    /// Attach documentation text for the resource.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.block.description = Some(description.into());
        self
    }
}

/// Schemas of the provider configuration and every resource type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ProviderSchema {
    /// Provider configuration block.
    #[serde(default)]
    pub provider: Schema,
    /// Resource schemas by type name.
    #[serde(default)]
    pub resources: HashMap<String, Schema>,
}

impl ProviderSchema {
    /// No provider fields and no resources.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `schema` for the provider configuration.
    pub fn with_provider_config(mut self, schema: Schema) -> Self {
        self.provider = schema;
        self
    }

    /// Register `schema` for resource type `name`.
    pub fn with_resource(mut self, name: impl Into<String>, schema: Schema) -> Self {
        self.resources.insert(name.into(), schema);
        self
    }
}

/// Diagnostic severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticSeverity {
    /// The operation failed.
    Error,
    /// The operation succeeded but something needs attention.
    Warning,
}

/// A message reported back to the host, optionally tied to an attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Error or warning.
    pub severity: DiagnosticSeverity,
    /// One-line description.
    pub summary: String,
    /// Longer explanation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Dotted path of the offending attribute, e.g. `actions.0.action`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
}

impl Diagnostic {
    fn new(severity: DiagnosticSeverity, summary: impl Into<String>) -> Self {
        Self {
            severity,
            summary: summary.into(),
            detail: None,
            attribute: None,
        }
    }

    /// An error with `summary`.
    pub fn error(summary: impl Into<String>) -> Self {
        Self::new(DiagnosticSeverity::Error, summary)
    }

    /// A warning with `summary`.
    pub fn warning(summary: impl Into<String>) -> Self {
        Self::new(DiagnosticSeverity::Warning, summary)
    }

    /// Attach a longer explanation.
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Tie the diagnostic to an attribute path.
    pub fn with_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attribute = Some(attribute.into());
        self
    }

    /// Whether this diagnostic is an error.
    pub fn is_error(&self) -> bool {
        self.severity == DiagnosticSeverity::Error
    }
}
