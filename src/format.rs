use chrono::{DateTime, NaiveDate, NaiveTime};
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::Arc;

type Predicate = dyn Fn(&Value, &Value) -> bool + Send + Sync;

/// A named string format: either a regular expression or a predicate.
///
/// Predicates receive the instance and the schema node that declared the
/// format.
#[derive(Clone)]
pub enum Format {
    Pattern(Regex),
    Predicate(Arc<Predicate>),
}

impl Format {
    pub fn pattern(pattern: &str) -> Result<Self, regex::Error> {
        Regex::new(pattern).map(Self::Pattern)
    }

    pub fn predicate<F>(predicate: F) -> Self
    where
        F: Fn(&Value, &Value) -> bool + Send + Sync + 'static,
    {
        Self::Predicate(Arc::new(predicate))
    }

    /// Patterns only constrain strings; predicates see every value.
    pub fn matches(&self, instance: &Value, schema: &Value) -> bool {
        match self {
            Self::Pattern(regex) => instance.as_str().map_or(true, |s| regex.is_match(s)),
            Self::Predicate(predicate) => predicate(instance, schema),
        }
    }
}

impl fmt::Debug for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pattern(regex) => f.debug_tuple("Pattern").field(&regex.as_str()).finish(),
            Self::Predicate(_) => f.debug_tuple("Predicate").finish(),
        }
    }
}

/// Format names understood by the `format` keyword.
#[derive(Clone, Debug, Default)]
pub struct FormatRegistry {
    formats: HashMap<String, Format>,
}

const STANDARD_PATTERNS: &[(&str, &str)] = &[
    ("email", r"^[^\s@]+@[^\s@]+\.[^\s@]+$"),
    (
        "hostname",
        r"^[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)*$",
    ),
    ("uri", r"^[A-Za-z][A-Za-z0-9+.-]*:[^\s]*$"),
    (
        "uuid",
        r"^[0-9A-Fa-f]{8}-[0-9A-Fa-f]{4}-[0-9A-Fa-f]{4}-[0-9A-Fa-f]{4}-[0-9A-Fa-f]{12}$",
    ),
];

impl FormatRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The formats installed by [`Options::default`][`crate::Options`].
    pub fn standard() -> Self {
        let mut registry = Self::new()
            .with(
                "date-time",
                string_predicate(|s| DateTime::parse_from_rfc3339(s).is_ok()),
            )
            .with(
                "date",
                string_predicate(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()),
            )
            .with(
                "time",
                string_predicate(|s| NaiveTime::parse_from_str(s, "%H:%M:%S%.f").is_ok()),
            )
            .with("ipv4", string_predicate(|s| s.parse::<Ipv4Addr>().is_ok()))
            .with("ipv6", string_predicate(|s| s.parse::<Ipv6Addr>().is_ok()));

        for (name, pattern) in STANDARD_PATTERNS {
            if let Ok(format) = Format::pattern(pattern) {
                registry.insert(*name, format);
            }
        }

        registry
    }

    pub fn with(mut self, name: impl Into<String>, format: Format) -> Self {
        self.insert(name, format);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, format: Format) -> Option<Format> {
        self.formats.insert(name.into(), format)
    }

    pub fn get(&self, name: &str) -> Option<&Format> {
        self.formats.get(name)
    }
}

fn string_predicate(check: fn(&str) -> bool) -> Format {
    Format::predicate(move |instance, _| instance.as_str().map_or(true, check))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn check(registry: &FormatRegistry, name: &str, instance: &str) -> bool {
        registry
            .get(name)
            .expect(name)
            .matches(&json!(instance), &json!({ "format": name }))
    }

    #[test]
    fn standard_registry() {
        let registry = FormatRegistry::standard();

        assert!(check(&registry, "date-time", "2015-01-20T13:04:55+01:00"));
        assert!(!check(&registry, "date-time", "2015-01-20 13:04"));
        assert!(check(&registry, "date", "2015-01-20"));
        assert!(!check(&registry, "date", "2015-13-20"));
        assert!(check(&registry, "time", "13:04:55"));
        assert!(check(&registry, "time", "13:04:55.123"));
        assert!(!check(&registry, "time", "25:04:55"));
        assert!(check(&registry, "email", "someone@example.com"));
        assert!(!check(&registry, "email", "someone@"));
        assert!(check(&registry, "hostname", "api.example.com"));
        assert!(!check(&registry, "hostname", "-bad.example.com"));
        assert!(check(&registry, "ipv4", "192.168.0.1"));
        assert!(!check(&registry, "ipv4", "192.168.0.256"));
        assert!(check(&registry, "ipv6", "::1"));
        assert!(!check(&registry, "ipv6", "12345::"));
        assert!(check(&registry, "uri", "http://example.com/a?b=c"));
        assert!(!check(&registry, "uri", "not a uri"));
        assert!(check(&registry, "uuid", "123e4567-e89b-12d3-a456-426614174000"));
        assert!(!check(&registry, "uuid", "123e4567"));
    }

    #[test]
    fn empty_registry() {
        assert!(FormatRegistry::new().get("email").is_none());
    }

    #[test]
    fn pattern_ignores_non_strings() {
        let format = Format::pattern(r"^\d+$").unwrap();

        assert!(format.matches(&json!("123"), &json!({})));
        assert!(!format.matches(&json!("12a"), &json!({})));
        assert!(format.matches(&json!(12), &json!({})));
    }

    #[test]
    fn predicate_sees_schema() {
        let format = Format::predicate(|instance, schema| {
            instance.as_u64() == schema.get("answer").and_then(Value::as_u64)
        });

        assert!(format.matches(&json!(42), &json!({ "answer": 42 })));
        assert!(!format.matches(&json!(41), &json!({ "answer": 42 })));
    }

    #[test]
    fn invalid_pattern() {
        assert!(Format::pattern("(unclosed").is_err());
    }
}
