use percent_encoding::percent_decode_str;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;
use tracing::{debug, warn};

static NULL: Value = Value::Null;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum PointerError {
    #[error("malformed pointer {0:?}")]
    Malformed(String),

    #[error("pointer {0:?} does not resolve")]
    Absent(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("malformed $ref {0:?}")]
    Malformed(String),

    #[error("$ref {0:?} cannot be resolved")]
    Missing(String),
}

/// Resolves an RFC 6901 JSON Pointer against `document`.
///
/// The pointer starts with `#`; `#` alone is the whole document. Tokens are
/// unescaped (`~1`, then `~0`) and then percent-decoded. An expression that
/// does not start with `#` names a property of the document root.
///
/// ```
/// use jsonshape::resolve_pointer;
/// use serde_json::json;
///
/// let doc = json!({ "foo": ["bar", "baz"], "a/b": 1 });
///
/// assert_eq!(&json!("bar"), resolve_pointer(&doc, "#/foo/0").unwrap());
/// assert_eq!(&json!(1), resolve_pointer(&doc, "#/a~1b").unwrap());
/// ```
pub fn resolve_pointer<'a>(document: &'a Value, pointer: &str) -> Result<&'a Value, PointerError> {
    let expr = match pointer.strip_prefix('#') {
        Some(expr) => expr,
        None => {
            return document
                .get(pointer)
                .ok_or_else(|| PointerError::Absent(pointer.to_owned()))
        }
    };

    if expr.is_empty() {
        return Ok(document);
    }

    let tokens = pointer_tokens(pointer, expr)?;
    let last = tokens.len() - 1;
    let mut current = document;

    for (i, token) in tokens.iter().enumerate() {
        let next = match current {
            Value::Object(obj) => obj.get(token.as_str()),
            Value::Array(arr) => token.parse::<usize>().ok().and_then(|index| arr.get(index)),
            _ => None,
        };

        current = match next {
            Some(next) => next,
            None if i == last => return Err(PointerError::Absent(pointer.to_owned())),
            None => return Err(PointerError::Malformed(pointer.to_owned())),
        };
    }

    Ok(current)
}

fn pointer_tokens(pointer: &str, expr: &str) -> Result<Vec<String>, PointerError> {
    let expr = expr.strip_prefix('/').unwrap_or(expr);
    let raw: Vec<&str> = expr.split('/').collect();

    if raw.len() > 1 && raw.iter().any(|token| token.is_empty()) {
        return Err(PointerError::Malformed(pointer.to_owned()));
    }

    raw.into_iter()
        .map(|token| {
            let token = token.replace("~1", "/").replace("~0", "~");
            percent_decode_str(&token)
                .decode_utf8()
                .map(|token| token.into_owned())
                .map_err(|_| PointerError::Malformed(pointer.to_owned()))
        })
        .collect()
}

/// The document a `#` pointer is resolved against.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) enum Scope {
    Root,
    External(String),
}

/// Follows `$ref`s across the main schema and the named external schemas.
#[derive(Debug)]
pub(crate) struct Resolver {
    root: Value,
    schemas: BTreeMap<String, Value>,
    missing_ref_allowed: bool,
}

impl Resolver {
    pub fn new(root: Value, schemas: BTreeMap<String, Value>, missing_ref_allowed: bool) -> Self {
        Self {
            root,
            schemas,
            missing_ref_allowed,
        }
    }

    pub fn root(&self) -> &Value {
        &self.root
    }

    fn scope_root(&self, scope: &Scope) -> &Value {
        match scope {
            Scope::Root => &self.root,
            Scope::External(name) => self.schemas.get(name).unwrap_or(&NULL),
        }
    }

    /// Follows `node`'s `$ref` chain to a node without one.
    ///
    /// `None` means the node is unconstrained: either the reference is missing
    /// and missing references are allowed, or the chain loops back on itself.
    pub fn resolve<'a>(
        &'a self,
        node: &'a Value,
        scope: &Scope,
    ) -> Result<Option<(&'a Value, Scope)>, ResolveError> {
        let mut node = node;
        let mut scope = scope.clone();
        let mut seen = HashSet::new();

        while let Some(reference) = node.get("$ref") {
            let reference = reference
                .as_str()
                .ok_or_else(|| ResolveError::Malformed(reference.to_string()))?;

            if !seen.insert((scope.clone(), reference.to_owned())) {
                debug!(reference, "reference cycle treated as unconstrained");
                return Ok(None);
            }

            match self.lookup(reference, &scope)? {
                Some((target, target_scope)) => {
                    node = target;
                    scope = target_scope;
                }
                None if self.missing_ref_allowed => {
                    warn!(reference, "missing reference treated as unconstrained");
                    return Ok(None);
                }
                None => return Err(ResolveError::Missing(reference.to_owned())),
            }
        }

        Ok(Some((node, scope)))
    }

    fn lookup<'a>(
        &'a self,
        reference: &str,
        scope: &Scope,
    ) -> Result<Option<(&'a Value, Scope)>, ResolveError> {
        if reference.is_empty() {
            return Err(ResolveError::Malformed(reference.to_owned()));
        }

        let scope_root = self.scope_root(scope);

        if reference.starts_with('#') {
            return match resolve_pointer(scope_root, reference) {
                Ok(target) => Ok(Some((target, scope.clone()))),
                Err(PointerError::Malformed(_)) => {
                    Err(ResolveError::Malformed(reference.to_owned()))
                }
                Err(PointerError::Absent(_)) => {
                    let name = reference.trim_start_matches('#').trim_start_matches('/');
                    Ok(self.external(name))
                }
            };
        }

        if let Some(target) = scope_root.get(reference) {
            return Ok(Some((target, scope.clone())));
        }

        if let Some(external) = self.external(reference) {
            return Ok(Some(external));
        }

        Ok(find_by_id(scope_root, reference).map(|target| (target, scope.clone())))
    }

    fn external(&self, name: &str) -> Option<(&Value, Scope)> {
        self.schemas
            .get_key_value(name)
            .map(|(name, schema)| (schema, Scope::External(name.clone())))
    }
}

fn find_by_id<'a>(node: &'a Value, id: &str) -> Option<&'a Value> {
    match node {
        Value::Object(obj) => {
            if obj.get("id").and_then(Value::as_str) == Some(id) {
                return Some(node);
            }

            obj.values().find_map(|child| find_by_id(child, id))
        }
        Value::Array(arr) => arr.iter().find_map(|child| find_by_id(child, id)),
        _ => None,
    }
}
