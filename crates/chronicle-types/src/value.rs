//! The tagged value carried by every event field and every statistic result.
//!
//! A [`TaggedValue`] is a closed sum type over the handful of shapes event
//! fields take. Every value knows its [`ValueType`], renders to a string,
//! and parses back from `(ValueType, &str)` -- the string round-trip is what
//! the persisted form relies on.
//!
//! [`TaggedValue::Null`] means "no meaningful value". It is never zero:
//! numeric queries on a null value return `None`.

use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Errors produced when parsing a [`TaggedValue`] from its string form.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValueError {
    /// The string is not a valid boolean.
    #[error("invalid bool value: {0:?}")]
    InvalidBool(String),

    /// The string is not a valid integer.
    #[error("invalid {ty} value: {value:?}")]
    InvalidInteger {
        /// Name of the integer-backed type being parsed.
        ty: &'static str,
        /// The rejected input.
        value: String,
    },

    /// The string is not a valid `(x,y,z)` point.
    #[error("invalid point value: {0:?}")]
    InvalidPoint(String),

    /// A `void` value must have an empty string form.
    #[error("void value must be empty, got {0:?}")]
    NonEmptyVoid(String),

    /// The type tag is empty.
    #[error("empty value type tag")]
    EmptyTypeTag,
}

// ---------------------------------------------------------------------------
// Value types
// ---------------------------------------------------------------------------

/// The declared type of an event field or of a [`TaggedValue`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ValueType {
    /// The type of [`TaggedValue::Null`].
    Void,
    /// A boolean flag.
    Bool,
    /// A signed integer.
    Int,
    /// Free-form text.
    String,
    /// A three-dimensional grid coordinate.
    Point,
    /// A character identifier.
    Character,
    /// A named identifier in some content namespace (e.g. `mtype_id`).
    Id(String),
}

impl ValueType {
    /// Return the tag used in the serialized form.
    pub fn tag(&self) -> &str {
        match self {
            Self::Void => "void",
            Self::Bool => "bool",
            Self::Int => "int",
            Self::String => "string",
            Self::Point => "point",
            Self::Character => "character_id",
            Self::Id(tag) => tag.as_str(),
        }
    }

    /// Build a type from its serialized tag.
    ///
    /// Any tag that is not one of the built-in names denotes an identifier
    /// namespace.
    ///
    /// # Errors
    ///
    /// Returns [`ValueError::EmptyTypeTag`] for an empty tag.
    pub fn from_tag(tag: &str) -> Result<Self, ValueError> {
        Ok(match tag {
            "" => return Err(ValueError::EmptyTypeTag),
            "void" => Self::Void,
            "bool" => Self::Bool,
            "int" => Self::Int,
            "string" => Self::String,
            "point" => Self::Point,
            "character_id" => Self::Character,
            other => Self::Id(other.to_owned()),
        })
    }
}

impl core::fmt::Display for ValueType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.tag())
    }
}

impl Serialize for ValueType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.tag())
    }
}

impl<'de> Deserialize<'de> for ValueType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        Self::from_tag(&tag).map_err(D::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Point
// ---------------------------------------------------------------------------

/// A grid coordinate, rendered as `(x,y,z)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Point {
    /// East-west coordinate.
    pub x: i32,
    /// North-south coordinate.
    pub y: i32,
    /// Vertical level.
    pub z: i32,
}

impl Point {
    /// Create a point from its coordinates.
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }
}

impl core::fmt::Display for Point {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "({},{},{})", self.x, self.y, self.z)
    }
}

impl FromStr for Point {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ValueError::InvalidPoint(s.to_owned());
        let inner = s
            .trim()
            .strip_prefix('(')
            .and_then(|rest| rest.strip_suffix(')'))
            .ok_or_else(invalid)?;
        let mut parts = inner.split(',').map(|p| p.trim().parse::<i32>());
        let (Some(Ok(x)), Some(Ok(y)), Some(Ok(z)), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid());
        };
        Ok(Self { x, y, z })
    }
}

// ---------------------------------------------------------------------------
// Tagged value
// ---------------------------------------------------------------------------

/// A type-erased value that round-trips through its string form.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TaggedValue {
    /// No meaningful value.
    #[default]
    Null,
    /// A boolean flag.
    Bool(bool),
    /// A signed integer.
    Int(i64),
    /// Free-form text.
    String(String),
    /// A grid coordinate.
    Point(Point),
    /// A character identifier.
    Character(i64),
    /// A named identifier in a content namespace.
    Id {
        /// The namespace tag (e.g. `mtype_id`).
        type_tag: String,
        /// The identifier within that namespace.
        id: String,
    },
}

impl TaggedValue {
    /// Build an identifier value in the given namespace.
    pub fn id(type_tag: impl Into<String>, id: impl Into<String>) -> Self {
        Self::Id {
            type_tag: type_tag.into(),
            id: id.into(),
        }
    }

    /// Return the [`ValueType`] of this value.
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::Null => ValueType::Void,
            Self::Bool(_) => ValueType::Bool,
            Self::Int(_) => ValueType::Int,
            Self::String(_) => ValueType::String,
            Self::Point(_) => ValueType::Point,
            Self::Character(_) => ValueType::Character,
            Self::Id { type_tag, .. } => ValueType::Id(type_tag.clone()),
        }
    }

    /// Return whether this is the null value.
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Return the integer payload, if this is an [`TaggedValue::Int`].
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Return the boolean payload, if this is a [`TaggedValue::Bool`].
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Render the value to its string form (without the type tag).
    pub fn to_repr(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Bool(v) => v.to_string(),
            Self::Int(v) | Self::Character(v) => v.to_string(),
            Self::String(s) => s.clone(),
            Self::Point(p) => p.to_string(),
            Self::Id { id, .. } => id.clone(),
        }
    }

    /// Parse a value of the given type from its string form.
    ///
    /// # Errors
    ///
    /// Returns a [`ValueError`] if `repr` is not a valid rendering of `ty`.
    pub fn parse(ty: &ValueType, repr: &str) -> Result<Self, ValueError> {
        Ok(match ty {
            ValueType::Void => {
                if !repr.is_empty() {
                    return Err(ValueError::NonEmptyVoid(repr.to_owned()));
                }
                Self::Null
            }
            ValueType::Bool => match repr {
                "true" => Self::Bool(true),
                "false" => Self::Bool(false),
                other => return Err(ValueError::InvalidBool(other.to_owned())),
            },
            ValueType::Int => Self::Int(parse_integer("int", repr)?),
            ValueType::Character => Self::Character(parse_integer("character_id", repr)?),
            ValueType::String => Self::String(repr.to_owned()),
            ValueType::Point => Self::Point(repr.parse()?),
            ValueType::Id(tag) => Self::id(tag.clone(), repr),
        })
    }
}

fn parse_integer(ty: &'static str, repr: &str) -> Result<i64, ValueError> {
    repr.parse().map_err(|_err| ValueError::InvalidInteger {
        ty,
        value: repr.to_owned(),
    })
}

impl core::fmt::Display for TaggedValue {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.to_repr())
    }
}

impl From<i64> for TaggedValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for TaggedValue {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<bool> for TaggedValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for TaggedValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_owned())
    }
}

impl From<String> for TaggedValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<Point> for TaggedValue {
    fn from(v: Point) -> Self {
        Self::Point(v)
    }
}

/// Serialized as a `["<type tag>", "<string form>"]` pair.
impl Serialize for TaggedValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        (self.value_type().tag(), self.to_repr()).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for TaggedValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let (tag, repr) = <(String, String)>::deserialize(deserializer)?;
        let ty = ValueType::from_tag(&tag).map_err(D::Error::custom)?;
        Self::parse(&ty, &repr).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(value: &TaggedValue) -> Option<TaggedValue> {
        TaggedValue::parse(&value.value_type(), &value.to_repr()).ok()
    }

    #[test]
    fn every_shape_roundtrips_through_its_string_form() {
        let values = [
            TaggedValue::Null,
            TaggedValue::Bool(true),
            TaggedValue::Int(-42),
            TaggedValue::from("zombie"),
            TaggedValue::Point(Point::new(1, -2, 3)),
            TaggedValue::Character(7),
            TaggedValue::id("mtype_id", "mon_zombie"),
        ];
        for value in &values {
            assert_eq!(roundtrip(value).as_ref(), Some(value));
        }
    }

    #[test]
    fn null_is_not_zero() {
        assert_eq!(TaggedValue::Null.as_int(), None);
        assert_ne!(TaggedValue::Null, TaggedValue::Int(0));
    }

    #[test]
    fn ids_in_different_namespaces_differ() {
        assert_ne!(
            TaggedValue::id("mtype_id", "zombie"),
            TaggedValue::id("itype_id", "zombie")
        );
    }

    #[test]
    fn invalid_strings_are_rejected() {
        assert!(TaggedValue::parse(&ValueType::Int, "ten").is_err());
        assert!(TaggedValue::parse(&ValueType::Bool, "yes").is_err());
        assert!(TaggedValue::parse(&ValueType::Point, "(1,2)").is_err());
        assert!(TaggedValue::parse(&ValueType::Void, "x").is_err());
        assert!(ValueType::from_tag("").is_err());
    }

    #[test]
    fn unknown_tags_become_id_namespaces() {
        assert_eq!(
            ValueType::from_tag("oter_id").ok(),
            Some(ValueType::Id("oter_id".to_owned()))
        );
        assert_eq!(ValueType::from_tag("int").ok(), Some(ValueType::Int));
    }

    #[test]
    fn serializes_as_tag_and_string_pair() {
        let json = serde_json::to_string(&TaggedValue::Character(20)).ok();
        assert_eq!(json.as_deref(), Some(r#"["character_id","20"]"#));

        let parsed: Option<TaggedValue> = serde_json::from_str(r#"["trap_str_id","tr_goo"]"#).ok();
        assert_eq!(parsed, Some(TaggedValue::id("trap_str_id", "tr_goo")));
    }

    #[test]
    fn malformed_pairs_fail_to_deserialize() {
        let parsed: Result<TaggedValue, _> = serde_json::from_str(r#"["int","many"]"#);
        assert!(parsed.is_err());
    }
}
