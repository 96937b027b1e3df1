//! Core value types for tfprovider
//!
//! [`Dynamic`] is the application-side form of every value exchanged with a
//! provider. It carries no type information of its own: the codec pairs it
//! with the type implied by the schema whenever it crosses the wire.

use serde::{Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;

/// Dynamic represents a Terraform value of any type.
///
/// Lists, sets and tuples are all carried by `List`; maps and objects are
/// both carried by `Map`. Which one a value is depends on the schema it is
/// encoded against.
#[derive(Debug, Clone, PartialEq)]
pub enum Dynamic {
    /// Explicit null value
    Null,
    /// Value not yet known (during planning)
    Unknown,
    Bool(bool),
    /// All numbers are f64
    Number(f64),
    String(String),
    List(Vec<Dynamic>),
    Map(HashMap<String, Dynamic>),
}

impl Dynamic {
    /// Builds an object or map value from name/value pairs.
    pub fn object<I, K>(attributes: I) -> Self
    where
        I: IntoIterator<Item = (K, Dynamic)>,
        K: Into<String>,
    {
        Dynamic::Map(
            attributes
                .into_iter()
                .map(|(name, value)| (name.into(), value))
                .collect(),
        )
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Dynamic::Null)
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Dynamic::Unknown)
    }

    /// True if no unknown value appears anywhere inside this value.
    pub fn is_wholly_known(&self) -> bool {
        match self {
            Dynamic::Unknown => false,
            Dynamic::List(items) => items.iter().all(Dynamic::is_wholly_known),
            Dynamic::Map(items) => items.values().all(Dynamic::is_wholly_known),
            _ => true,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Dynamic::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Dynamic::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Dynamic::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Dynamic]> {
        match self {
            Dynamic::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&HashMap<String, Dynamic>> {
        match self {
            Dynamic::Map(items) => Some(items),
            _ => None,
        }
    }

    /// Follows `path` into this value.
    ///
    /// Attribute names and map keys both select from `Map`; list indexes
    /// select from `List`. Returns `None` if any step does not apply.
    pub fn get(&self, path: &AttributePath) -> Option<&Dynamic> {
        let mut current = self;
        for step in &path.steps {
            current = match (current, step) {
                (Dynamic::Map(m), AttributePathStep::AttributeName(name))
                | (Dynamic::Map(m), AttributePathStep::MapKey(name)) => m.get(name)?,
                (Dynamic::List(l), AttributePathStep::ListIndex(idx)) => {
                    l.get(usize::try_from(*idx).ok()?)?
                }
                _ => return None,
            };
        }
        Some(current)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Dynamic::Null => "null",
            Dynamic::Unknown => "unknown",
            Dynamic::Bool(_) => "bool",
            Dynamic::Number(_) => "number",
            Dynamic::String(_) => "string",
            Dynamic::List(_) => "list",
            Dynamic::Map(_) => "map",
        }
    }
}

impl From<bool> for Dynamic {
    fn from(value: bool) -> Self {
        Dynamic::Bool(value)
    }
}

impl From<f64> for Dynamic {
    fn from(value: f64) -> Self {
        Dynamic::Number(value)
    }
}

impl From<i64> for Dynamic {
    fn from(value: i64) -> Self {
        Dynamic::Number(value as f64)
    }
}

impl From<&str> for Dynamic {
    fn from(value: &str) -> Self {
        Dynamic::String(value.to_string())
    }
}

impl From<String> for Dynamic {
    fn from(value: String) -> Self {
        Dynamic::String(value)
    }
}

impl From<Vec<Dynamic>> for Dynamic {
    fn from(value: Vec<Dynamic>) -> Self {
        Dynamic::List(value)
    }
}

/// AttributePath represents a path to an attribute within a value
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AttributePath {
    pub steps: Vec<AttributePathStep>,
}

impl AttributePath {
    pub fn new(name: &str) -> Self {
        Self {
            steps: vec![AttributePathStep::AttributeName(name.to_string())],
        }
    }

    pub fn root() -> Self {
        Self { steps: Vec::new() }
    }

    pub fn attribute(mut self, name: &str) -> Self {
        self.steps
            .push(AttributePathStep::AttributeName(name.to_string()));
        self
    }

    pub fn index(mut self, idx: i64) -> Self {
        self.steps.push(AttributePathStep::ListIndex(idx));
        self
    }

    pub fn key(mut self, key: &str) -> Self {
        self.steps.push(AttributePathStep::MapKey(key.to_string()));
        self
    }

    pub fn push(&mut self, step: AttributePathStep) {
        self.steps.push(step);
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }
}

impl FromIterator<AttributePathStep> for AttributePath {
    fn from_iter<I: IntoIterator<Item = AttributePathStep>>(iter: I) -> Self {
        Self {
            steps: iter.into_iter().collect(),
        }
    }
}

impl fmt::Display for AttributePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, step) in self.steps.iter().enumerate() {
            match step {
                AttributePathStep::AttributeName(name) if i == 0 => f.write_str(name)?,
                AttributePathStep::AttributeName(name) => write!(f, ".{name}")?,
                AttributePathStep::MapKey(key) => write!(f, "[{key:?}]")?,
                AttributePathStep::ListIndex(idx) => write!(f, "[{idx}]")?,
                AttributePathStep::Unknown => f.write_str("[...]")?,
            }
        }
        Ok(())
    }
}

impl Serialize for AttributePath {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

/// Individual step in an AttributePath
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AttributePathStep {
    /// Attribute of an object
    AttributeName(String),
    /// Element of a map, by key
    MapKey(String),
    /// Element of a list, by index
    ListIndex(i64),
    /// A step the provider sent that this client does not understand
    Unknown,
}
