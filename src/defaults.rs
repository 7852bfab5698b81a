use crate::resolve::{Resolver, Scope};
use crate::Validator;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::mem;
use tracing::{debug, warn};

/// Settings for [`Validator::build`].
#[derive(Clone, Debug)]
pub struct BuildOptions {
    additional_properties: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            additional_properties: true,
        }
    }
}

impl BuildOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// When `false`, undeclared keys are dropped from built objects unless the
    /// schema itself enables `additionalProperties`.
    pub fn with_additional_properties(mut self, additional_properties: bool) -> Self {
        self.additional_properties = additional_properties;
        self
    }
}

impl Validator {
    /// Builds a value from the `default`s declared in the schema, starting
    /// from a copy of `initial`.
    ///
    /// `None` stands for an absent value; it stays absent unless the schema
    /// supplies a default.
    ///
    /// ```
    /// use jsonshape::{compile, BuildOptions, Options};
    /// use serde_json::json;
    ///
    /// let validator = compile(
    ///     &json!({
    ///         "type": "object",
    ///         "default": {},
    ///         "properties": {
    ///             "retries": { "type": "integer", "default": 3 },
    ///             "verbose": { "type": "boolean", "default": false },
    ///         },
    ///     }),
    ///     Options::new(),
    /// )
    /// .unwrap();
    ///
    /// assert_eq!(
    ///     Some(json!({ "retries": 3, "verbose": false })),
    ///     validator.build(None, &BuildOptions::new())
    /// );
    /// assert_eq!(
    ///     Some(json!({ "retries": 5, "verbose": false })),
    ///     validator.build(Some(&json!({ "retries": 5 })), &BuildOptions::new())
    /// );
    /// ```
    pub fn build(&self, initial: Option<&Value>, options: &BuildOptions) -> Option<Value> {
        Builder::new(&self.resolver, options).build(
            self.resolver.root(),
            &Scope::Root,
            initial.cloned(),
            None,
        )
    }

    /// Like [`build`][`Validator::build`], but modifies `value` directly.
    pub fn build_in_place(&self, value: &mut Value, options: &BuildOptions) {
        Builder::new(&self.resolver, options).rebuild(self.resolver.root(), &Scope::Root, value)
    }
}

/// Counts, per key, how many `allOf` branches found the key undeclared.
#[derive(Debug, Default)]
struct PropertyMarker {
    counts: HashMap<String, usize>,
}

impl PropertyMarker {
    fn mark(&mut self, key: &str) {
        *self.counts.entry(key.to_owned()).or_insert(0) += 1;
    }

    fn delete_duplicates(&self, obj: &mut Map<String, Value>) {
        obj.retain(|key, _| self.counts.get(key).map_or(true, |count| *count <= 1));
    }
}

struct Builder<'a> {
    resolver: &'a Resolver,
    additional: bool,
    /// Nesting depth within the value being built.
    depth: usize,
    /// References being expanded, with the depth each was entered at.
    expanding: Vec<(Scope, String, usize)>,
}

impl<'a> Builder<'a> {
    fn new(resolver: &'a Resolver, options: &BuildOptions) -> Self {
        Self {
            resolver,
            additional: options.additional_properties,
            depth: 0,
            expanding: vec![],
        }
    }

    fn build(
        &mut self,
        schema: &Value,
        scope: &Scope,
        value: Option<Value>,
        marker: Option<&mut PropertyMarker>,
    ) -> Option<Value> {
        let reference = match schema.get("$ref").and_then(Value::as_str) {
            Some(reference) => reference,
            None => return self.build_resolved(schema, scope, value, marker),
        };

        // Re-entering a reference only to seed another default, or without
        // descending into the value, would never terminate.
        let depth = self.depth;
        let reentered = self.expanding.iter().any(|(active_scope, active, active_depth)| {
            active_scope == scope
                && active == reference
                && (value.is_none() || *active_depth == depth)
        });

        if reentered {
            debug!(reference, depth, "reference already expanding");
            return value;
        }

        self.expanding.push((scope.clone(), reference.to_owned(), depth));
        let built = self.build_resolved(schema, scope, value, marker);
        self.expanding.pop();

        built
    }

    fn build_resolved(
        &mut self,
        schema: &Value,
        scope: &Scope,
        value: Option<Value>,
        marker: Option<&mut PropertyMarker>,
    ) -> Option<Value> {
        if !schema.is_object() {
            return value;
        }

        let resolver = self.resolver;
        let (schema, scope) = match resolver.resolve(schema, scope) {
            Ok(Some(resolved)) => resolved,
            Ok(None) => return value,
            Err(err) => {
                warn!(%err, "unresolvable reference left value unchanged");
                return value;
            }
        };

        let mut value = match value {
            Some(value) => Some(value),
            None => schema.get("default").cloned(),
        };

        let properties = schema.get("properties").and_then(Value::as_object);
        let items = schema.get("items").filter(|items| items.is_object() || items.is_array());

        let handled = match (value.as_mut(), properties, items) {
            (Some(Value::Object(obj)), Some(properties), _) => {
                self.build_properties(schema, &scope, obj, properties, marker);
                true
            }
            (Some(Value::Array(arr)), _, Some(items)) => {
                self.build_items(schema, &scope, arr, items);
                true
            }
            _ => false,
        };

        if !handled {
            if let Some(branches) = schema
                .get("allOf")
                .and_then(Value::as_array)
                .filter(|branches| !branches.is_empty())
            {
                let mut marker = PropertyMarker::default();
                for branch in branches {
                    value = self.build(branch, &scope, value, Some(&mut marker));
                }

                if let Some(Value::Object(obj)) = value.as_mut() {
                    marker.delete_duplicates(obj);
                }
            }
        }

        value
    }

    /// Rebuilds a value that is known to be present.
    fn rebuild(&mut self, schema: &Value, scope: &Scope, slot: &mut Value) {
        let current = mem::take(slot);
        if let Some(built) = self.build(schema, scope, Some(current), None) {
            *slot = built;
        }
    }

    fn build_properties(
        &mut self,
        schema: &Value,
        scope: &Scope,
        obj: &mut Map<String, Value>,
        properties: &Map<String, Value>,
        marker: Option<&mut PropertyMarker>,
    ) {
        self.depth += 1;
        for (key, property) in properties {
            match obj.get_mut(key) {
                Some(slot) => self.rebuild(property, scope, slot),
                None => {
                    if let Some(built) = self.build(property, scope, None, None) {
                        obj.insert(key.clone(), built);
                    }
                }
            }
        }
        self.depth -= 1;

        let additional = schema.get("additionalProperties");
        let enabled = matches!(additional, Some(Value::Bool(true)) | Some(Value::Object(_)));
        let forbidden =
            additional == Some(&Value::Bool(false)) || (!self.additional && !enabled);

        if !forbidden {
            return;
        }

        match marker {
            Some(marker) => {
                for key in obj.keys().filter(|key| !properties.contains_key(*key)) {
                    marker.mark(key);
                }
            }
            None => obj.retain(|key, _| properties.contains_key(key)),
        }
    }

    fn build_items(&mut self, schema: &Value, scope: &Scope, arr: &mut Vec<Value>, items: &Value) {
        self.depth += 1;
        self.build_elements(schema, scope, arr, items);
        self.depth -= 1;
    }

    fn build_elements(&mut self, schema: &Value, scope: &Scope, arr: &mut Vec<Value>, items: &Value) {
        let tuple = match items {
            Value::Array(tuple) => tuple,
            _ => {
                for element in arr.iter_mut() {
                    self.rebuild(items, scope, element);
                }

                return;
            }
        };

        for (i, item) in tuple.iter().enumerate() {
            match arr.get_mut(i) {
                Some(slot) => self.rebuild(item, scope, slot),
                None => {
                    if let Some(built) = self.build(item, scope, None, None) {
                        arr.resize(i, Value::Null);
                        arr.push(built);
                    }
                }
            }
        }

        if let Some(additional @ Value::Object(_)) = schema.get("additionalItems") {
            for element in arr.iter_mut().skip(tuple.len()) {
                self.rebuild(additional, scope, element);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{compile, BuildOptions, Options, Validator};
    use serde_json::{json, Value};

    fn validator(schema: Value) -> Validator {
        compile(&schema, Options::new()).expect("compile schema")
    }

    #[test]
    fn absent_value_takes_default() {
        let validator = validator(json!({ "default": "hello" }));

        assert_eq!(Some(json!("hello")), validator.build(None, &BuildOptions::new()));
        assert_eq!(
            Some(json!("given")),
            validator.build(Some(&json!("given")), &BuildOptions::new())
        );
        assert_eq!(None, self::validator(json!({})).build(None, &BuildOptions::new()));
    }

    #[test]
    fn populates_nested_defaults() {
        let validator = validator(json!({
            "type": "object",
            "properties": {
                "name": { "type": "string", "default": "anonymous" },
                "address": {
                    "type": "object",
                    "default": {},
                    "properties": {
                        "city": { "default": "Springfield" },
                        "zip": { "type": "string" },
                    },
                },
                "tags": { "type": "array" },
            },
        }));

        assert_eq!(
            Some(json!({
                "name": "anonymous",
                "address": { "city": "Springfield" },
            })),
            validator.build(Some(&json!({})), &BuildOptions::new())
        );
        assert_eq!(
            Some(json!({
                "name": "bob",
                "address": { "city": "Shelbyville", "zip": "49007" },
            })),
            validator.build(
                Some(&json!({ "name": "bob", "address": { "city": "Shelbyville", "zip": "49007" } })),
                &BuildOptions::new()
            )
        );
    }

    #[test]
    fn keeps_key_order() {
        let validator = validator(json!({
            "properties": { "a": { "default": 1 }, "b": { "default": 2 } },
        }));

        let built = validator
            .build(Some(&json!({ "b": 20, "z": 0 })), &BuildOptions::new())
            .unwrap();

        assert_eq!(
            vec!["b", "z", "a"],
            built.as_object().unwrap().keys().collect::<Vec<_>>()
        );
    }

    #[test]
    fn does_not_modify_initial() {
        let validator = validator(json!({ "properties": { "a": { "default": 1 } } }));
        let initial = json!({});

        assert_eq!(
            Some(json!({ "a": 1 })),
            validator.build(Some(&initial), &BuildOptions::new())
        );
        assert_eq!(json!({}), initial);
    }

    #[test]
    fn build_in_place() {
        let validator = validator(json!({
            "properties": { "a": { "default": 1 } },
            "additionalProperties": false,
        }));
        let mut value = json!({ "b": 2 });

        validator.build_in_place(&mut value, &BuildOptions::new());
        assert_eq!(json!({ "a": 1 }), value);
    }

    #[test]
    fn additional_properties() {
        let closed = validator(json!({
            "properties": { "a": {} },
            "additionalProperties": false,
        }));
        let open = validator(json!({
            "properties": { "a": {} },
            "additionalProperties": true,
        }));
        let unspecified = validator(json!({ "properties": { "a": {} } }));
        let initial = json!({ "a": 1, "b": 2 });
        let strict = BuildOptions::new().with_additional_properties(false);

        assert_eq!(Some(json!({ "a": 1 })), closed.build(Some(&initial), &BuildOptions::new()));
        assert_eq!(Some(initial.clone()), open.build(Some(&initial), &strict));
        assert_eq!(Some(initial.clone()), unspecified.build(Some(&initial), &BuildOptions::new()));
        assert_eq!(Some(json!({ "a": 1 })), unspecified.build(Some(&initial), &strict));
    }

    #[test]
    fn array_items() {
        let single = validator(json!({
            "items": { "properties": { "n": { "default": 0 } } },
        }));

        assert_eq!(
            Some(json!([{ "n": 0 }, { "n": 5 }])),
            single.build(Some(&json!([{}, { "n": 5 }])), &BuildOptions::new())
        );
        assert_eq!(Some(json!([])), single.build(Some(&json!([])), &BuildOptions::new()));

        let tuple = validator(json!({
            "items": [{}, { "default": "second" }, { "default": "third" }],
            "additionalItems": { "properties": { "extra": { "default": true } } },
        }));

        assert_eq!(
            Some(json!([null, "second", "third"])),
            tuple.build(Some(&json!([])), &BuildOptions::new())
        );
        assert_eq!(
            Some(json!([1, null, "third", { "extra": true }])),
            tuple.build(Some(&json!([1, null, "third", {}])), &BuildOptions::new())
        );
    }

    #[test]
    fn follows_references() {
        let validator = compile(
            &json!({
                "definitions": {
                    "port": { "type": "integer", "default": 8080 },
                },
                "properties": {
                    "port": { "$ref": "#/definitions/port" },
                    "remote": { "$ref": "remote" },
                },
            }),
            Options::new().with_schema("remote", json!({ "default": { "host": "localhost" } })),
        )
        .unwrap();

        assert_eq!(
            Some(json!({ "port": 8080, "remote": { "host": "localhost" } })),
            validator.build(Some(&json!({})), &BuildOptions::new())
        );
    }

    #[test]
    fn missing_reference_leaves_value() {
        let validator = compile(
            &json!({ "properties": { "a": { "$ref": "#nowhere" } } }),
            Options::new().with_missing_ref_allowed(true),
        )
        .unwrap();

        assert_eq!(
            Some(json!({ "b": 1 })),
            validator.build(Some(&json!({ "b": 1 })), &BuildOptions::new())
        );
    }

    #[test]
    fn all_of_merges_branches() {
        let validator = validator(json!({
            "allOf": [
                { "properties": { "a": { "default": 1 } } },
                { "properties": { "b": { "default": 2 } } },
            ],
        }));

        assert_eq!(
            Some(json!({ "a": 1, "b": 2 })),
            validator.build(Some(&json!({})), &BuildOptions::new())
        );
    }

    #[test]
    fn all_of_removes_keys_undeclared_by_several_branches() {
        let validator = validator(json!({
            "allOf": [
                { "properties": { "a": { "default": 1 } }, "additionalProperties": false },
                { "properties": { "b": { "default": 2 } }, "additionalProperties": false },
            ],
        }));

        assert_eq!(
            Some(json!({ "a": 1, "b": 2 })),
            validator.build(Some(&json!({ "c": 3 })), &BuildOptions::new())
        );
    }

    #[test]
    fn recursive_default_expands_once() {
        let validator = validator(json!({
            "type": "object",
            "default": {},
            "properties": { "child": { "$ref": "#" } },
        }));

        assert_eq!(
            Some(json!({ "child": {} })),
            validator.build(None, &BuildOptions::new())
        );
        assert_eq!(
            Some(json!({ "child": { "child": {} } })),
            validator.build(Some(&json!({ "child": { "child": {} } })), &BuildOptions::new())
        );
    }

    #[test]
    fn recursive_default_through_definitions() {
        let validator = validator(json!({
            "definitions": {
                "node": {
                    "default": { "name": "leaf" },
                    "properties": {
                        "name": { "type": "string" },
                        "next": { "$ref": "#/definitions/node" },
                    },
                },
            },
            "properties": { "head": { "$ref": "#/definitions/node" } },
        }));

        assert_eq!(
            Some(json!({ "head": { "name": "leaf" } })),
            validator.build(Some(&json!({})), &BuildOptions::new())
        );
    }

    #[test]
    fn all_of_referring_to_itself() {
        let validator = validator(json!({
            "default": { "a": 1 },
            "allOf": [
                { "$ref": "#" },
                { "properties": { "b": { "default": 2 } } },
            ],
        }));

        assert_eq!(
            Some(json!({ "a": 1, "b": 2 })),
            validator.build(None, &BuildOptions::new())
        );
    }
}
