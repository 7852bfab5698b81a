use crate::keyword::{Keyword, Kind, TypeName};
use crate::resolve::{ResolveError, Resolver, Scope};
use crate::{Format, FormatRegistry};
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;

/// Errors raised while compiling a schema. These describe a broken schema or
/// setup, never invalid data.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("invalid schema: expected a JSON object")]
    InvalidSchema,

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("invalid regular expression {pattern:?} in {keyword}")]
    InvalidPattern {
        keyword: Keyword,
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// A compiled schema node.
#[derive(Debug)]
pub(crate) enum Node {
    Any,
    Ref(usize),
    Block(Box<Block>),
}

impl Default for Node {
    fn default() -> Self {
        Node::Any
    }
}

#[derive(Debug, Default)]
pub(crate) struct Block {
    /// Checks that apply to any kind of value, in schema order.
    pub checks: Vec<Check>,
    pub guards: Vec<Guard>,
    pub formats: Vec<CustomFormat>,
    pub messages: Messages,
}

impl Block {
    fn guard(&mut self, kind: Kind) -> &mut Vec<Check> {
        let index = match self.guards.iter().position(|guard| guard.kind == kind) {
            Some(index) => index,
            None => {
                self.guards.push(Guard {
                    kind,
                    checks: vec![],
                });
                self.guards.len() - 1
            }
        };

        &mut self.guards[index].checks
    }
}

/// A run of checks executed only when the value is of `kind`.
#[derive(Debug)]
pub(crate) struct Guard {
    pub kind: Kind,
    pub checks: Vec<Check>,
}

/// A format check together with the schema node that declared it. Only
/// predicates see the node, so patterns keep `Value::Null` instead.
#[derive(Debug)]
pub(crate) struct CustomFormat {
    pub format: Format,
    pub schema: Value,
}

impl CustomFormat {
    fn new(format: &Format, schema: &Map<String, Value>) -> Self {
        let schema = match format {
            Format::Predicate(_) => Value::Object(schema.clone()),
            Format::Pattern(_) => Value::Null,
        };

        Self {
            format: format.clone(),
            schema,
        }
    }
}

#[derive(Debug)]
pub(crate) enum Check {
    Type(Vec<TypeName>),
    Enum(Vec<Value>),
    Minimum(f64),
    ExclusiveMinimum(f64),
    Maximum(f64),
    ExclusiveMaximum(f64),
    MultipleOf(MultipleOf),
    MinLength(usize),
    MaxLength(usize),
    Pattern(Regex),
    Format(CustomFormat),
    MinItems(usize),
    MaxItems(usize),
    AdditionalItems(usize),
    UniqueItems,
    Items(Items),
    MaxProperties(usize),
    MinProperties(usize),
    Required(Vec<String>),
    Properties(Vec<(String, Node)>),
    PropertyLoop(PropertyLoop),
    Dependencies(Vec<(String, Dependency)>),
    AllOf(Vec<Node>),
    AnyOf(Vec<Node>),
    OneOf(Vec<Node>),
    Not(Box<Node>),
}

#[derive(Debug)]
pub(crate) enum Items {
    Single(Box<Node>),
    Tuple {
        items: Vec<Node>,
        additional: Option<Box<Node>>,
    },
}

/// Validates every own key of an object against declared, pattern and
/// additional property rules.
#[derive(Debug)]
pub(crate) struct PropertyLoop {
    pub properties: HashMap<String, Node>,
    pub patterns: Vec<(Regex, Node)>,
    pub additional: Additional,
}

#[derive(Debug)]
pub(crate) enum Additional {
    Allowed,
    Forbidden,
    Schema(Box<Node>),
}

#[derive(Debug)]
pub(crate) enum Dependency {
    Properties(Vec<String>),
    Schema(Box<Node>),
}

#[derive(Debug)]
pub(crate) struct MultipleOf {
    divisor: f64,
    decimals: i32,
}

impl MultipleOf {
    fn new(divisor: f64) -> Self {
        // f64's Display never uses exponent notation, so the digits after the
        // point are exactly the divisor's decimal places.
        let repr = divisor.to_string();
        let decimals = repr.split('.').nth(1).map_or(0, |fraction| fraction.len() as i32);

        Self { divisor, decimals }
    }

    pub fn divides(&self, value: f64) -> bool {
        if self.decimals > 0 {
            let scale = 10f64.powi(self.decimals);
            let value = (value * scale * scale).round() / scale;
            let divisor = (self.divisor * scale).round();

            value % divisor == 0.0
        } else {
            value % self.divisor == 0.0
        }
    }
}

/// Custom error messages declared on a schema node.
#[derive(Debug, Default)]
pub(crate) struct Messages {
    invalid: Option<String>,
    keywords: HashMap<String, String>,
    properties: HashMap<String, PropertyMessages>,
}

#[derive(Debug, Default)]
struct PropertyMessages {
    required: Option<String>,
    keywords: HashMap<String, String>,
}

impl Messages {
    fn from_schema(schema: &Map<String, Value>) -> Self {
        let properties = schema
            .get("properties")
            .and_then(Value::as_object)
            .map(|properties| {
                properties
                    .iter()
                    .filter_map(|(name, property)| {
                        let messages = PropertyMessages {
                            required: string_field(property, "requiredMessage"),
                            keywords: message_map(property.get("messages")),
                        };

                        if messages.required.is_none() && messages.keywords.is_empty() {
                            None
                        } else {
                            Some((name.clone(), messages))
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            invalid: schema
                .get("invalidMessage")
                .and_then(Value::as_str)
                .map(str::to_owned),
            keywords: message_map(schema.get("messages")),
            properties,
        }
    }

    /// The message for a failed `keyword` check, optionally about property
    /// `key` of the value.
    pub fn resolve(&self, keyword: Keyword, key: Option<&str>) -> Option<String> {
        let property = key.and_then(|key| self.properties.get(key));

        property
            .and_then(|property| property.required.as_ref())
            .or_else(|| self.invalid.as_ref())
            .or_else(|| property.and_then(|property| property.keywords.get(keyword.as_str())))
            .or_else(|| self.keywords.get(keyword.as_str()))
            .cloned()
    }
}

fn string_field(schema: &Value, field: &str) -> Option<String> {
    schema.get(field).and_then(Value::as_str).map(str::to_owned)
}

fn message_map(messages: Option<&Value>) -> HashMap<String, String> {
    messages
        .and_then(Value::as_object)
        .map(|messages| {
            messages
                .iter()
                .filter_map(|(keyword, message)| {
                    message.as_str().map(|message| (keyword.clone(), message.to_owned()))
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Translates schema nodes into [`Node`]s, compiling each distinct reference
/// once into a shared table.
pub(crate) struct Compiler<'a> {
    resolver: &'a Resolver,
    registry: &'a FormatRegistry,
    formats: &'a HashMap<String, Format>,
    refs: HashMap<(Scope, String), usize>,
    table: Vec<Option<Node>>,
}

impl<'a> Compiler<'a> {
    pub fn new(
        resolver: &'a Resolver,
        registry: &'a FormatRegistry,
        formats: &'a HashMap<String, Format>,
    ) -> Self {
        Self {
            resolver,
            registry,
            formats,
            refs: HashMap::new(),
            table: vec![],
        }
    }

    /// The reference table, indexed by the ids in [`Node::Ref`].
    pub fn finish(self) -> Vec<Node> {
        self.table
            .into_iter()
            .map(Option::unwrap_or_default)
            .collect()
    }

    pub fn compile(&mut self, schema: &'a Value, scope: &Scope) -> Result<Node, SetupError> {
        let obj = match schema.as_object() {
            Some(obj) => obj,
            None => return Ok(Node::Any),
        };

        if let Some(reference) = obj.get("$ref") {
            return self.compile_ref(schema, reference, scope);
        }

        let mut block = Block {
            messages: Messages::from_schema(obj),
            ..Default::default()
        };
        let mut properties_compiled = false;

        for key in obj.keys() {
            let keyword: Keyword = match key.parse() {
                Ok(keyword) => keyword,
                Err(()) => continue,
            };

            if let Keyword::Properties | Keyword::PatternProperties | Keyword::AdditionalProperties =
                keyword
            {
                if properties_compiled {
                    continue;
                }

                properties_compiled = true;
            }

            let check = match self.generate(keyword, obj, scope)? {
                Some(check) => check,
                None => continue,
            };

            match keyword.kind() {
                Some(kind) => block.guard(kind).push(check),
                None => block.checks.push(check),
            }
        }

        if let Some(format) = obj
            .get("format")
            .and_then(Value::as_str)
            .and_then(|name| self.formats.get(name))
        {
            block.formats.push(CustomFormat::new(format, obj));
        }

        Ok(Node::Block(Box::new(block)))
    }

    fn compile_ref(
        &mut self,
        schema: &'a Value,
        reference: &Value,
        scope: &Scope,
    ) -> Result<Node, SetupError> {
        let reference = reference
            .as_str()
            .ok_or_else(|| ResolveError::Malformed(reference.to_string()))?;
        let key = (scope.clone(), reference.to_owned());

        if let Some(&id) = self.refs.get(&key) {
            return Ok(Node::Ref(id));
        }

        // Register the slot before compiling the target so that recursive
        // references to it bind to this id.
        let id = self.table.len();
        self.table.push(None);
        self.refs.insert(key, id);

        let body = match self.resolver.resolve(schema, scope)? {
            Some((target, target_scope)) => self.compile(target, &target_scope)?,
            None => Node::Any,
        };

        debug!(reference, id, "compiled reference");
        self.table[id] = Some(body);

        Ok(Node::Ref(id))
    }

    fn generate(
        &mut self,
        keyword: Keyword,
        obj: &'a Map<String, Value>,
        scope: &Scope,
    ) -> Result<Option<Check>, SetupError> {
        let value = match obj.get(keyword.as_str()) {
            Some(value) => value,
            None => return Ok(None),
        };

        let check = match keyword {
            Keyword::Type => type_names(value).map(Check::Type),
            Keyword::Enum => value.as_array().map(|values| Check::Enum(values.clone())),
            Keyword::Minimum => value.as_f64().map(Check::Minimum),
            Keyword::ExclusiveMinimum => exclusive_bound(obj, value, "minimum").map(Check::ExclusiveMinimum),
            Keyword::Maximum => value.as_f64().map(Check::Maximum),
            Keyword::ExclusiveMaximum => exclusive_bound(obj, value, "maximum").map(Check::ExclusiveMaximum),
            Keyword::MultipleOf => value.as_f64().map(|divisor| Check::MultipleOf(MultipleOf::new(divisor))),
            Keyword::MinLength => count(value).map(Check::MinLength),
            Keyword::MaxLength => count(value).map(Check::MaxLength),
            Keyword::Pattern => match value.as_str() {
                Some(pattern) => Some(Check::Pattern(regex(keyword, pattern)?)),
                None => None,
            },
            Keyword::Format => value
                .as_str()
                .filter(|name| !self.formats.contains_key(*name))
                .and_then(|name| self.registry.get(name))
                .map(|format| Check::Format(CustomFormat::new(format, obj))),
            Keyword::MinItems => count(value).map(Check::MinItems),
            Keyword::MaxItems => count(value).map(Check::MaxItems),
            Keyword::AdditionalItems => match (value, obj.get("items")) {
                (Value::Bool(false), Some(Value::Array(items))) => {
                    Some(Check::AdditionalItems(items.len()))
                }
                _ => None,
            },
            Keyword::UniqueItems => match value {
                Value::Bool(true) => Some(Check::UniqueItems),
                _ => None,
            },
            Keyword::Items => self.items(obj, value, scope)?.map(Check::Items),
            Keyword::MaxProperties => count(value).map(Check::MaxProperties),
            Keyword::MinProperties => count(value).map(Check::MinProperties),
            Keyword::Required => value.as_array().map(|names| {
                Check::Required(
                    names
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_owned)
                        .collect(),
                )
            }),
            Keyword::Properties | Keyword::PatternProperties | Keyword::AdditionalProperties => {
                self.properties(obj, scope)?
            }
            Keyword::Dependencies => self.dependencies(value, scope)?,
            Keyword::AllOf => self.branches(value, scope)?.map(Check::AllOf),
            Keyword::AnyOf => self.branches(value, scope)?.map(Check::AnyOf),
            Keyword::OneOf => self.branches(value, scope)?.map(Check::OneOf),
            Keyword::Not => match value {
                Value::Object(_) => Some(Check::Not(Box::new(self.compile(value, scope)?))),
                _ => None,
            },
        };

        Ok(check)
    }

    fn items(
        &mut self,
        obj: &'a Map<String, Value>,
        items: &'a Value,
        scope: &Scope,
    ) -> Result<Option<Items>, SetupError> {
        Ok(match items {
            Value::Object(_) => Some(Items::Single(Box::new(self.compile(items, scope)?))),
            Value::Array(tuple) => {
                let items = tuple
                    .iter()
                    .map(|item| self.compile(item, scope))
                    .collect::<Result<Vec<_>, _>>()?;

                let additional = match obj.get("additionalItems") {
                    Some(additional @ Value::Object(_)) => {
                        Some(Box::new(self.compile(additional, scope)?))
                    }
                    _ => None,
                };

                Some(Items::Tuple { items, additional })
            }
            _ => None,
        })
    }

    fn properties(
        &mut self,
        obj: &'a Map<String, Value>,
        scope: &Scope,
    ) -> Result<Option<Check>, SetupError> {
        let properties = obj.get("properties").and_then(Value::as_object);
        let patterns = obj.get("patternProperties").and_then(Value::as_object);
        let additional = obj.get("additionalProperties");

        let has_patterns = patterns.map_or(false, |patterns| !patterns.is_empty());
        let checks_additional = matches!(additional, Some(Value::Bool(false)) | Some(Value::Object(_)));

        if !has_patterns && !checks_additional {
            return match properties {
                Some(properties) if !properties.is_empty() => {
                    let properties = properties
                        .iter()
                        .map(|(name, schema)| Ok((name.clone(), self.compile(schema, scope)?)))
                        .collect::<Result<Vec<_>, SetupError>>()?;

                    Ok(Some(Check::Properties(properties)))
                }
                _ => Ok(None),
            };
        }

        let mut compiled_properties = HashMap::new();
        for (name, schema) in properties.into_iter().flatten() {
            compiled_properties.insert(name.clone(), self.compile(schema, scope)?);
        }

        let mut compiled_patterns = vec![];
        for (pattern, schema) in patterns.into_iter().flatten() {
            let pattern = regex(Keyword::PatternProperties, pattern)?;
            compiled_patterns.push((pattern, self.compile(schema, scope)?));
        }

        let additional = match additional {
            Some(Value::Bool(false)) => Additional::Forbidden,
            Some(schema @ Value::Object(_)) => Additional::Schema(Box::new(self.compile(schema, scope)?)),
            _ => Additional::Allowed,
        };

        Ok(Some(Check::PropertyLoop(PropertyLoop {
            properties: compiled_properties,
            patterns: compiled_patterns,
            additional,
        })))
    }

    fn dependencies(&mut self, value: &'a Value, scope: &Scope) -> Result<Option<Check>, SetupError> {
        let dependencies = match value.as_object() {
            Some(dependencies) => dependencies,
            None => return Ok(None),
        };

        let mut compiled = vec![];
        for (name, dependency) in dependencies {
            let dependency = match dependency {
                Value::Object(_) => Dependency::Schema(Box::new(self.compile(dependency, scope)?)),
                Value::Array(names) => Dependency::Properties(
                    names
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_owned)
                        .collect(),
                ),
                _ => continue,
            };

            compiled.push((name.clone(), dependency));
        }

        Ok(Some(Check::Dependencies(compiled)))
    }

    fn branches(&mut self, value: &'a Value, scope: &Scope) -> Result<Option<Vec<Node>>, SetupError> {
        match value.as_array() {
            Some(schemas) => schemas
                .iter()
                .map(|schema| self.compile(schema, scope))
                .collect::<Result<Vec<_>, _>>()
                .map(Some),
            None => Ok(None),
        }
    }
}

fn type_names(value: &Value) -> Option<Vec<TypeName>> {
    let names: Vec<&Value> = match value {
        Value::Array(names) => names.iter().collect(),
        name => vec![name],
    };

    // Any unknown name accepts every value, so the whole check is dropped.
    let types = names
        .into_iter()
        .map(|name| name.as_str().and_then(|name| name.parse().ok()))
        .collect::<Option<Vec<TypeName>>>()?;

    if types.is_empty() || types.contains(&TypeName::Any) {
        None
    } else {
        Some(types)
    }
}

fn exclusive_bound(obj: &Map<String, Value>, value: &Value, bound: &str) -> Option<f64> {
    match value {
        Value::Bool(true) => obj.get(bound).and_then(Value::as_f64),
        _ => None,
    }
}

fn count(value: &Value) -> Option<usize> {
    if let Some(n) = value.as_u64() {
        return Some(n as usize);
    }

    value
        .as_f64()
        .filter(|n| n.fract() == 0.0 && *n >= 0.0)
        .map(|n| n as usize)
}

fn regex(keyword: Keyword, pattern: &str) -> Result<Regex, SetupError> {
    Regex::new(pattern).map_err(|source| SetupError::InvalidPattern {
        keyword,
        pattern: pattern.to_owned(),
        source,
    })
}
