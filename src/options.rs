use crate::{Format, FormatRegistry};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// Settings for [`compile`][`crate::compile`].
///
/// ```
/// use jsonshape::{compile, Options};
/// use serde_json::json;
///
/// let validator = compile(
///     &json!({ "$ref": "#external" }),
///     Options::new().with_schema("external", json!({ "type": "string" })),
/// )
/// .unwrap();
///
/// assert!(validator.is_valid(&json!("abc")));
/// assert!(!validator.is_valid(&json!(123)));
/// ```
#[derive(Clone, Debug)]
pub struct Options {
    pub(crate) greedy: bool,
    pub(crate) missing_ref_allowed: bool,
    pub(crate) schemas: BTreeMap<String, Value>,
    pub(crate) formats: HashMap<String, Format>,
    pub(crate) registry: FormatRegistry,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            greedy: false,
            missing_ref_allowed: false,
            schemas: BTreeMap::new(),
            formats: HashMap::new(),
            registry: FormatRegistry::standard(),
        }
    }
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep validating after the first error, collecting as many as possible.
    pub fn with_greedy(mut self, greedy: bool) -> Self {
        self.greedy = greedy;
        self
    }

    /// Treat well-formed references that resolve nowhere as unconstrained.
    pub fn with_missing_ref_allowed(mut self, missing_ref_allowed: bool) -> Self {
        self.missing_ref_allowed = missing_ref_allowed;
        self
    }

    /// Makes `schema` available to `$ref` under `name`.
    pub fn with_schema(mut self, name: impl Into<String>, schema: Value) -> Self {
        self.schemas.insert(name.into(), schema);
        self
    }

    /// Adds a custom format, replacing any registry entry of the same name.
    pub fn with_format(mut self, name: impl Into<String>, format: Format) -> Self {
        self.formats.insert(name.into(), format);
        self
    }

    pub fn with_registry(mut self, registry: FormatRegistry) -> Self {
        self.registry = registry;
        self
    }
}
