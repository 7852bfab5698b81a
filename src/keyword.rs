use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// The schema keywords the compiler understands.
///
/// Every [`ValidationError`][`crate::ValidationError`] names the keyword whose
/// check failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Keyword {
    Type,
    Enum,
    Minimum,
    ExclusiveMinimum,
    Maximum,
    ExclusiveMaximum,
    MultipleOf,
    MinLength,
    MaxLength,
    Pattern,
    Format,
    MinItems,
    MaxItems,
    AdditionalItems,
    UniqueItems,
    Items,
    MaxProperties,
    MinProperties,
    Required,
    Properties,
    PatternProperties,
    AdditionalProperties,
    Dependencies,
    AllOf,
    AnyOf,
    OneOf,
    Not,
}

impl Keyword {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Type => "type",
            Self::Enum => "enum",
            Self::Minimum => "minimum",
            Self::ExclusiveMinimum => "exclusiveMinimum",
            Self::Maximum => "maximum",
            Self::ExclusiveMaximum => "exclusiveMaximum",
            Self::MultipleOf => "multipleOf",
            Self::MinLength => "minLength",
            Self::MaxLength => "maxLength",
            Self::Pattern => "pattern",
            Self::Format => "format",
            Self::MinItems => "minItems",
            Self::MaxItems => "maxItems",
            Self::AdditionalItems => "additionalItems",
            Self::UniqueItems => "uniqueItems",
            Self::Items => "items",
            Self::MaxProperties => "maxProperties",
            Self::MinProperties => "minProperties",
            Self::Required => "required",
            Self::Properties => "properties",
            Self::PatternProperties => "patternProperties",
            Self::AdditionalProperties => "additionalProperties",
            Self::Dependencies => "dependencies",
            Self::AllOf => "allOf",
            Self::AnyOf => "anyOf",
            Self::OneOf => "oneOf",
            Self::Not => "not",
        }
    }

    /// The kind of value this keyword's check applies to. Keywords without a
    /// kind apply to every value.
    pub(crate) fn kind(self) -> Option<Kind> {
        match self {
            Self::Minimum
            | Self::ExclusiveMinimum
            | Self::Maximum
            | Self::ExclusiveMaximum
            | Self::MultipleOf => Some(Kind::Number),
            Self::MinLength | Self::MaxLength | Self::Pattern | Self::Format => Some(Kind::String),
            Self::MinItems
            | Self::MaxItems
            | Self::AdditionalItems
            | Self::UniqueItems
            | Self::Items => Some(Kind::Array),
            Self::MaxProperties
            | Self::MinProperties
            | Self::Required
            | Self::Properties
            | Self::PatternProperties
            | Self::AdditionalProperties
            | Self::Dependencies => Some(Kind::Object),
            Self::Type | Self::Enum | Self::AllOf | Self::AnyOf | Self::OneOf | Self::Not => None,
        }
    }
}

impl FromStr for Keyword {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "type" => Ok(Self::Type),
            "enum" => Ok(Self::Enum),
            "minimum" => Ok(Self::Minimum),
            "exclusiveMinimum" => Ok(Self::ExclusiveMinimum),
            "maximum" => Ok(Self::Maximum),
            "exclusiveMaximum" => Ok(Self::ExclusiveMaximum),
            "multipleOf" => Ok(Self::MultipleOf),
            "minLength" => Ok(Self::MinLength),
            "maxLength" => Ok(Self::MaxLength),
            "pattern" => Ok(Self::Pattern),
            "format" => Ok(Self::Format),
            "minItems" => Ok(Self::MinItems),
            "maxItems" => Ok(Self::MaxItems),
            "additionalItems" => Ok(Self::AdditionalItems),
            "uniqueItems" => Ok(Self::UniqueItems),
            "items" => Ok(Self::Items),
            "maxProperties" => Ok(Self::MaxProperties),
            "minProperties" => Ok(Self::MinProperties),
            "required" => Ok(Self::Required),
            "properties" => Ok(Self::Properties),
            "patternProperties" => Ok(Self::PatternProperties),
            "additionalProperties" => Ok(Self::AdditionalProperties),
            "dependencies" => Ok(Self::Dependencies),
            "allOf" => Ok(Self::AllOf),
            "anyOf" => Ok(Self::AnyOf),
            "oneOf" => Ok(Self::OneOf),
            "not" => Ok(Self::Not),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Keyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value kinds that gate groups of keyword checks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Kind {
    Number,
    String,
    Array,
    Object,
}

impl Kind {
    pub fn matches(self, instance: &Value) -> bool {
        match self {
            Self::Number => instance.is_number(),
            Self::String => instance.is_string(),
            Self::Array => instance.is_array(),
            Self::Object => instance.is_object(),
        }
    }
}

/// A name accepted by the `type` keyword.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum TypeName {
    Null,
    Boolean,
    String,
    Number,
    Integer,
    Array,
    Object,
    Date,
    Any,
}

impl TypeName {
    pub fn matches(self, instance: &Value) -> bool {
        match self {
            Self::Null => instance.is_null(),
            Self::Boolean => instance.is_boolean(),
            Self::String => instance.is_string(),
            Self::Number => instance.is_number(),
            Self::Integer => instance.as_f64().map_or(false, |n| n.fract() == 0.0),
            Self::Array => instance.is_array(),
            Self::Object => instance.is_object(),
            Self::Date => instance
                .as_str()
                .map_or(false, |s| DateTime::parse_from_rfc3339(s).is_ok()),
            Self::Any => true,
        }
    }
}

impl FromStr for TypeName {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "null" => Ok(Self::Null),
            "boolean" => Ok(Self::Boolean),
            "string" => Ok(Self::String),
            "number" => Ok(Self::Number),
            "integer" => Ok(Self::Integer),
            "array" => Ok(Self::Array),
            "object" => Ok(Self::Object),
            "date" => Ok(Self::Date),
            "any" => Ok(Self::Any),
            _ => Err(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn keyword_from_str() {
        assert_eq!(Err(()), "Type".parse::<Keyword>());
        assert_eq!(Err(()), "$ref".parse::<Keyword>());
        assert_eq!(Ok(Keyword::Type), "type".parse());
        assert_eq!(Ok(Keyword::ExclusiveMinimum), "exclusiveMinimum".parse());
        assert_eq!(Ok(Keyword::PatternProperties), "patternProperties".parse());
        assert_eq!(Ok(Keyword::Not), "not".parse());
    }

    #[test]
    fn keyword_names_round_trip() {
        for name in &[
            "type",
            "enum",
            "minimum",
            "exclusiveMinimum",
            "maximum",
            "exclusiveMaximum",
            "multipleOf",
            "minLength",
            "maxLength",
            "pattern",
            "format",
            "minItems",
            "maxItems",
            "additionalItems",
            "uniqueItems",
            "items",
            "maxProperties",
            "minProperties",
            "required",
            "properties",
            "patternProperties",
            "additionalProperties",
            "dependencies",
            "allOf",
            "anyOf",
            "oneOf",
            "not",
        ] {
            let keyword: Keyword = name.parse().expect(name);
            assert_eq!(*name, keyword.as_str());
            assert_eq!(json!(name), serde_json::to_value(keyword).unwrap());
        }
    }

    #[test]
    fn keyword_kinds() {
        assert_eq!(Some(Kind::Number), Keyword::MultipleOf.kind());
        assert_eq!(Some(Kind::String), Keyword::Format.kind());
        assert_eq!(Some(Kind::Array), Keyword::Items.kind());
        assert_eq!(Some(Kind::Object), Keyword::Dependencies.kind());
        assert_eq!(None, Keyword::AnyOf.kind());
        assert_eq!(None, Keyword::Type.kind());
    }

    #[test]
    fn type_name_from_str() {
        assert_eq!(Err(()), "Boolean".parse::<TypeName>());
        assert_eq!(Err(()), "float64".parse::<TypeName>());
        assert_eq!(Ok(TypeName::Null), "null".parse());
        assert_eq!(Ok(TypeName::Boolean), "boolean".parse());
        assert_eq!(Ok(TypeName::String), "string".parse());
        assert_eq!(Ok(TypeName::Number), "number".parse());
        assert_eq!(Ok(TypeName::Integer), "integer".parse());
        assert_eq!(Ok(TypeName::Array), "array".parse());
        assert_eq!(Ok(TypeName::Object), "object".parse());
        assert_eq!(Ok(TypeName::Date), "date".parse());
        assert_eq!(Ok(TypeName::Any), "any".parse());
    }

    #[test]
    fn type_name_matches() {
        assert!(TypeName::Integer.matches(&json!(777)));
        assert!(TypeName::Integer.matches(&json!(-9.0)));
        assert!(!TypeName::Integer.matches(&json!(3.14159)));
        assert!(!TypeName::Integer.matches(&json!("1")));
        assert!(TypeName::Number.matches(&json!(17.8)));
        assert!(!TypeName::Number.matches(&json!(null)));
        assert!(TypeName::Date.matches(&json!("1985-04-12T23:20:50.52Z")));
        assert!(!TypeName::Date.matches(&json!("yesterday")));
        assert!(!TypeName::Date.matches(&json!(499_994_450)));
        assert!(TypeName::Any.matches(&json!(null)));
        assert!(!TypeName::Object.matches(&json!([])));
        assert!(!TypeName::Array.matches(&json!({})));
    }
}
