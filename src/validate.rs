use crate::compile::{Additional, Block, Check, Compiler, Dependency, Items, Messages, Node, PropertyLoop};
use crate::keyword::Keyword;
use crate::resolve::{Resolver, Scope};
use crate::{equal, unique, Options, SetupError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, trace};

/// A single failed check.
///
/// `path` locates the offending value from the root of the instance, with
/// tokens joined by `.` (for example `items.0.name`); the root itself is the
/// empty string.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    pub path: String,
    pub keyword: Keyword,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// A schema compiled for repeated validation.
///
/// Each call to [`validate`][`Validator::validate`] owns its error log, so a
/// `Validator` can be shared freely between threads.
#[derive(Debug)]
pub struct Validator {
    pub(crate) resolver: Resolver,
    entry: Node,
    table: Vec<Node>,
    greedy: bool,
}

/// Compiles `schema` into a [`Validator`].
///
/// ```
/// use jsonshape::{compile, Keyword, Options};
/// use serde_json::json;
///
/// let validator = compile(
///     &json!({ "type": "integer", "minimum": 7, "exclusiveMinimum": true }),
///     Options::new(),
/// )
/// .unwrap();
///
/// assert!(validator.is_valid(&json!(8)));
///
/// let errors = validator.validate(&json!(7));
/// assert_eq!(1, errors.len());
/// assert_eq!(Keyword::ExclusiveMinimum, errors[0].keyword);
/// ```
pub fn compile(schema: &Value, options: Options) -> Result<Validator, SetupError> {
    Validator::compile(schema, options)
}

impl Validator {
    pub fn compile(schema: &Value, options: Options) -> Result<Self, SetupError> {
        if !schema.is_object() {
            return Err(SetupError::InvalidSchema);
        }

        let Options {
            greedy,
            missing_ref_allowed,
            schemas,
            formats,
            registry,
        } = options;

        let resolver = Resolver::new(schema.clone(), schemas, missing_ref_allowed);
        let (entry, table) = {
            let mut compiler = Compiler::new(&resolver, &registry, &formats);
            let entry = compiler.compile(resolver.root(), &Scope::Root)?;
            (entry, compiler.finish())
        };

        debug!(references = table.len(), greedy, "compiled schema");

        Ok(Self {
            resolver,
            entry,
            table,
            greedy,
        })
    }

    /// Validates `instance`, returning every error found. An empty result
    /// means the instance is valid.
    ///
    /// Unless the validator is greedy, validation stops at the first error.
    pub fn validate(&self, instance: &Value) -> Vec<ValidationError> {
        let mut vm = Vm {
            table: &self.table,
            greedy: self.greedy,
            instance_tokens: vec![],
            active_refs: vec![],
            errors: vec![],
        };

        match vm.validate(&self.entry, instance, false) {
            Ok(()) | Err(VmValidateError::FailFast) => {}
        }

        trace!(errors = vm.errors.len(), "validated instance");
        vm.errors
    }

    pub fn is_valid(&self, instance: &Value) -> bool {
        self.validate(instance).is_empty()
    }
}

struct Vm<'a> {
    table: &'a [Node],
    greedy: bool,
    instance_tokens: Vec<String>,
    active_refs: Vec<(usize, usize)>,
    errors: Vec<ValidationError>,
}

enum VmValidateError {
    FailFast,
}

impl<'a> Vm<'a> {
    /// Speculative validation never stops early; its errors are inspected and
    /// discarded by the enclosing combinator.
    fn validate(
        &mut self,
        node: &'a Node,
        instance: &Value,
        speculative: bool,
    ) -> Result<(), VmValidateError> {
        match node {
            Node::Any => Ok(()),
            Node::Ref(id) => {
                // A reference re-entered without descending into the instance
                // adds no constraint.
                let active = (*id, self.instance_tokens.len());
                if self.active_refs.contains(&active) {
                    return Ok(());
                }

                let table = self.table;
                let target = match table.get(*id) {
                    Some(target) => target,
                    None => return Ok(()),
                };

                self.active_refs.push(active);
                let result = self.validate(target, instance, speculative);
                self.active_refs.pop();

                result
            }
            Node::Block(block) => self.validate_block(block, instance, speculative),
        }
    }

    fn validate_block(
        &mut self,
        block: &'a Block,
        instance: &Value,
        speculative: bool,
    ) -> Result<(), VmValidateError> {
        for check in &block.checks {
            self.check(check, &block.messages, instance, speculative)?;
        }

        for guard in &block.guards {
            if guard.kind.matches(instance) {
                for check in &guard.checks {
                    self.check(check, &block.messages, instance, speculative)?;
                }
            }
        }

        for custom in &block.formats {
            if !custom.format.matches(instance, &custom.schema) {
                self.push_error(&block.messages, Keyword::Format, None, speculative)?;
            }
        }

        Ok(())
    }

    fn check(
        &mut self,
        check: &'a Check,
        messages: &Messages,
        instance: &Value,
        speculative: bool,
    ) -> Result<(), VmValidateError> {
        match check {
            Check::Type(types) => {
                if !types.iter().any(|type_| type_.matches(instance)) {
                    self.push_error(messages, Keyword::Type, None, speculative)?;
                }
            }
            Check::Enum(values) => {
                if !values.iter().any(|value| equal(value, instance)) {
                    self.push_error(messages, Keyword::Enum, None, speculative)?;
                }
            }
            Check::Minimum(min) => {
                if instance.as_f64().map_or(false, |n| n < *min) {
                    self.push_error(messages, Keyword::Minimum, None, speculative)?;
                }
            }
            Check::ExclusiveMinimum(min) => {
                if instance.as_f64().map_or(false, |n| n == *min) {
                    self.push_error(messages, Keyword::ExclusiveMinimum, None, speculative)?;
                }
            }
            Check::Maximum(max) => {
                if instance.as_f64().map_or(false, |n| n > *max) {
                    self.push_error(messages, Keyword::Maximum, None, speculative)?;
                }
            }
            Check::ExclusiveMaximum(max) => {
                if instance.as_f64().map_or(false, |n| n == *max) {
                    self.push_error(messages, Keyword::ExclusiveMaximum, None, speculative)?;
                }
            }
            Check::MultipleOf(multiple_of) => {
                if instance.as_f64().map_or(false, |n| !multiple_of.divides(n)) {
                    self.push_error(messages, Keyword::MultipleOf, None, speculative)?;
                }
            }
            Check::MinLength(min) => {
                if char_count(instance) < *min {
                    self.push_error(messages, Keyword::MinLength, None, speculative)?;
                }
            }
            Check::MaxLength(max) => {
                if char_count(instance) > *max {
                    self.push_error(messages, Keyword::MaxLength, None, speculative)?;
                }
            }
            Check::Pattern(regex) => {
                if instance.as_str().map_or(false, |s| !regex.is_match(s)) {
                    self.push_error(messages, Keyword::Pattern, None, speculative)?;
                }
            }
            Check::Format(format) => {
                if !format.format.matches(instance, &format.schema) {
                    self.push_error(messages, Keyword::Format, None, speculative)?;
                }
            }
            Check::MinItems(min) => {
                if array_len(instance) < *min {
                    self.push_error(messages, Keyword::MinItems, None, speculative)?;
                }
            }
            Check::MaxItems(max) => {
                if array_len(instance) > *max {
                    self.push_error(messages, Keyword::MaxItems, None, speculative)?;
                }
            }
            Check::AdditionalItems(len) => {
                if array_len(instance) > *len {
                    self.push_error(messages, Keyword::AdditionalItems, None, speculative)?;
                }
            }
            Check::UniqueItems => {
                if let Some(arr) = instance.as_array() {
                    if unique(arr).len() != arr.len() {
                        self.push_error(messages, Keyword::UniqueItems, None, speculative)?;
                    }
                }
            }
            Check::Items(items) => self.validate_items(items, instance, speculative)?,
            Check::MaxProperties(max) => {
                if object_len(instance) > *max {
                    self.push_error(messages, Keyword::MaxProperties, None, speculative)?;
                }
            }
            Check::MinProperties(min) => {
                if object_len(instance) < *min {
                    self.push_error(messages, Keyword::MinProperties, None, speculative)?;
                }
            }
            Check::Required(names) => {
                if let Some(obj) = instance.as_object() {
                    for name in names {
                        if !obj.contains_key(name) {
                            self.push_error(
                                messages,
                                Keyword::Required,
                                Some(name.as_str()),
                                speculative,
                            )?;
                        }
                    }
                }
            }
            Check::Properties(properties) => {
                if let Some(obj) = instance.as_object() {
                    for (name, schema) in properties {
                        if let Some(sub_instance) = obj.get(name) {
                            self.push_instance_token(name);
                            self.validate(schema, sub_instance, speculative)?;
                            self.pop_instance_token();
                        }
                    }
                }
            }
            Check::PropertyLoop(property_loop) => {
                self.validate_property_loop(property_loop, messages, instance, speculative)?
            }
            Check::Dependencies(dependencies) => {
                if let Some(obj) = instance.as_object() {
                    for (name, dependency) in dependencies {
                        if !obj.contains_key(name) {
                            continue;
                        }

                        match dependency {
                            Dependency::Schema(schema) => {
                                self.validate(schema, instance, speculative)?
                            }
                            Dependency::Properties(required) => {
                                for required in required {
                                    if !obj.contains_key(required) {
                                        self.push_error(
                                            messages,
                                            Keyword::Dependencies,
                                            Some(required.as_str()),
                                            speculative,
                                        )?;
                                    }
                                }
                            }
                        }
                    }
                }
            }
            Check::AllOf(branches) => {
                for branch in branches {
                    self.validate(branch, instance, speculative)?;
                }
            }
            Check::AnyOf(branches) => {
                let initial = self.errors.len();
                let mut found = false;

                for branch in branches {
                    let before = self.errors.len();
                    self.validate(branch, instance, true)?;

                    if self.errors.len() == before {
                        found = true;
                        break;
                    }
                }

                self.errors.truncate(initial);
                if !found {
                    self.push_error(messages, Keyword::AnyOf, None, speculative)?;
                }
            }
            Check::OneOf(branches) => {
                let initial = self.errors.len();
                let mut matching = 0;

                for branch in branches {
                    let before = self.errors.len();
                    self.validate(branch, instance, true)?;

                    if self.errors.len() == before {
                        matching += 1;
                    }
                }

                self.errors.truncate(initial);
                if matching != 1 {
                    self.push_error(messages, Keyword::OneOf, None, speculative)?;
                }
            }
            Check::Not(schema) => {
                let initial = self.errors.len();
                self.validate(schema, instance, true)?;

                let matched = self.errors.len() == initial;
                self.errors.truncate(initial);
                if matched {
                    self.push_error(messages, Keyword::Not, None, speculative)?;
                }
            }
        }

        Ok(())
    }

    fn validate_items(
        &mut self,
        items: &'a Items,
        instance: &Value,
        speculative: bool,
    ) -> Result<(), VmValidateError> {
        let arr = match instance.as_array() {
            Some(arr) => arr,
            None => return Ok(()),
        };

        match items {
            Items::Single(schema) => {
                for (i, sub_instance) in arr.iter().enumerate() {
                    self.push_instance_token(&i.to_string());
                    self.validate(schema, sub_instance, speculative)?;
                    self.pop_instance_token();
                }
            }
            Items::Tuple { items, additional } => {
                for (i, (schema, sub_instance)) in items.iter().zip(arr).enumerate() {
                    self.push_instance_token(&i.to_string());
                    self.validate(schema, sub_instance, speculative)?;
                    self.pop_instance_token();
                }

                if let Some(additional) = additional {
                    for (i, sub_instance) in arr.iter().enumerate().skip(items.len()) {
                        self.push_instance_token(&i.to_string());
                        self.validate(additional, sub_instance, speculative)?;
                        self.pop_instance_token();
                    }
                }
            }
        }

        Ok(())
    }

    fn validate_property_loop(
        &mut self,
        property_loop: &'a PropertyLoop,
        messages: &Messages,
        instance: &Value,
        speculative: bool,
    ) -> Result<(), VmValidateError> {
        let obj = match instance.as_object() {
            Some(obj) => obj,
            None => return Ok(()),
        };

        for (name, sub_instance) in obj {
            let mut found = false;

            if let Some(schema) = property_loop.properties.get(name) {
                found = true;
                self.push_instance_token(name);
                self.validate(schema, sub_instance, speculative)?;
                self.pop_instance_token();
            }

            for (pattern, schema) in &property_loop.patterns {
                if pattern.is_match(name) {
                    found = true;
                    self.push_instance_token(name);
                    self.validate(schema, sub_instance, speculative)?;
                    self.pop_instance_token();
                }
            }

            if found {
                continue;
            }

            match &property_loop.additional {
                Additional::Allowed => {}
                Additional::Forbidden => {
                    self.push_error(messages, Keyword::AdditionalProperties, None, speculative)?
                }
                Additional::Schema(schema) => {
                    self.push_instance_token(name);
                    self.validate(schema, sub_instance, speculative)?;
                    self.pop_instance_token();
                }
            }
        }

        Ok(())
    }

    fn push_error(
        &mut self,
        messages: &Messages,
        keyword: Keyword,
        key: Option<&str>,
        speculative: bool,
    ) -> Result<(), VmValidateError> {
        let mut path = self.instance_tokens.join(".");
        if let Some(key) = key {
            if !path.is_empty() {
                path.push('.');
            }
            path.push_str(key);
        }

        self.errors.push(ValidationError {
            path,
            keyword,
            message: messages.resolve(keyword, key),
        });

        if self.greedy || speculative {
            Ok(())
        } else {
            Err(VmValidateError::FailFast)
        }
    }

    fn push_instance_token(&mut self, token: &str) {
        self.instance_tokens.push(token.to_owned());
    }

    fn pop_instance_token(&mut self) {
        self.instance_tokens.pop();
    }
}

fn char_count(instance: &Value) -> usize {
    instance.as_str().map_or(0, |s| s.chars().count())
}

fn array_len(instance: &Value) -> usize {
    instance.as_array().map_or(0, Vec::len)
}

fn object_len(instance: &Value) -> usize {
    instance.as_object().map_or(0, |obj| obj.len())
}
