//! Attribute types and their JSON wire descriptors
//!
//! Providers describe every attribute's type with a small JSON document:
//! primitive types are bare strings (`"string"`) and collection or
//! structural types are two- or three-element arrays
//! (`["list","number"]`, `["object",{"name":"string"}]`).

use serde::{Serialize, Serializer};
use serde_json::Value as Json;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeType {
    String,
    Number,
    Bool,
    /// Any type; the concrete type travels alongside each value.
    Dynamic,
    List(Box<AttributeType>),
    Set(Box<AttributeType>),
    Map(Box<AttributeType>),
    Object(BTreeMap<String, AttributeType>),
    Tuple(Vec<AttributeType>),
}

#[derive(Debug, thiserror::Error)]
pub enum TypeParseError {
    #[error("type descriptor is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported type descriptor {0}")]
    Unsupported(String),
}

impl AttributeType {
    pub fn list(element: AttributeType) -> Self {
        AttributeType::List(Box::new(element))
    }

    pub fn set(element: AttributeType) -> Self {
        AttributeType::Set(Box::new(element))
    }

    pub fn map(element: AttributeType) -> Self {
        AttributeType::Map(Box::new(element))
    }

    pub fn object<I, K>(attributes: I) -> Self
    where
        I: IntoIterator<Item = (K, AttributeType)>,
        K: Into<String>,
    {
        AttributeType::Object(
            attributes
                .into_iter()
                .map(|(name, ty)| (name.into(), ty))
                .collect(),
        )
    }

    /// Parses a serialized type descriptor as sent in a schema attribute.
    pub fn from_json(raw: &[u8]) -> Result<Self, TypeParseError> {
        let value: Json = serde_json::from_slice(raw)?;
        Self::from_json_value(&value)
    }

    pub fn from_json_value(value: &Json) -> Result<Self, TypeParseError> {
        match value {
            Json::String(name) => match name.as_str() {
                "string" => Ok(AttributeType::String),
                "number" => Ok(AttributeType::Number),
                "bool" => Ok(AttributeType::Bool),
                "dynamic" => Ok(AttributeType::Dynamic),
                _ => Err(TypeParseError::Unsupported(value.to_string())),
            },
            Json::Array(parts) => {
                let kind = parts.first().and_then(Json::as_str).unwrap_or_default();
                match (kind, parts.len()) {
                    ("list", 2) => Ok(Self::list(Self::from_json_value(&parts[1])?)),
                    ("set", 2) => Ok(Self::set(Self::from_json_value(&parts[1])?)),
                    ("map", 2) => Ok(Self::map(Self::from_json_value(&parts[1])?)),
                    // A third element lists optional attributes, which only
                    // matters for type conversion and not for encoding.
                    ("object", 2) | ("object", 3) => match &parts[1] {
                        Json::Object(attrs) => {
                            let mut fields = BTreeMap::new();
                            for (name, ty) in attrs {
                                fields.insert(name.clone(), Self::from_json_value(ty)?);
                            }
                            Ok(AttributeType::Object(fields))
                        }
                        _ => Err(TypeParseError::Unsupported(value.to_string())),
                    },
                    ("tuple", 2) => match &parts[1] {
                        Json::Array(elems) => Ok(AttributeType::Tuple(
                            elems
                                .iter()
                                .map(Self::from_json_value)
                                .collect::<Result<_, _>>()?,
                        )),
                        _ => Err(TypeParseError::Unsupported(value.to_string())),
                    },
                    _ => Err(TypeParseError::Unsupported(value.to_string())),
                }
            }
            _ => Err(TypeParseError::Unsupported(value.to_string())),
        }
    }

    pub fn to_json_value(&self) -> Json {
        match self {
            AttributeType::String => Json::from("string"),
            AttributeType::Number => Json::from("number"),
            AttributeType::Bool => Json::from("bool"),
            AttributeType::Dynamic => Json::from("dynamic"),
            AttributeType::List(elem) => Json::Array(vec!["list".into(), elem.to_json_value()]),
            AttributeType::Set(elem) => Json::Array(vec!["set".into(), elem.to_json_value()]),
            AttributeType::Map(elem) => Json::Array(vec!["map".into(), elem.to_json_value()]),
            AttributeType::Object(attrs) => {
                let fields = attrs
                    .iter()
                    .map(|(name, ty)| (name.clone(), ty.to_json_value()))
                    .collect();
                Json::Array(vec!["object".into(), Json::Object(fields)])
            }
            AttributeType::Tuple(elems) => Json::Array(vec![
                "tuple".into(),
                Json::Array(elems.iter().map(AttributeType::to_json_value).collect()),
            ]),
        }
    }

    pub fn to_json(&self) -> Vec<u8> {
        self.to_json_value().to_string().into_bytes()
    }

    /// Whether `Dynamic` appears anywhere inside this type.
    pub fn has_dynamic_types(&self) -> bool {
        match self {
            AttributeType::Dynamic => true,
            AttributeType::String | AttributeType::Number | AttributeType::Bool => false,
            AttributeType::List(elem) | AttributeType::Set(elem) | AttributeType::Map(elem) => {
                elem.has_dynamic_types()
            }
            AttributeType::Object(attrs) => attrs.values().any(AttributeType::has_dynamic_types),
            AttributeType::Tuple(elems) => elems.iter().any(AttributeType::has_dynamic_types),
        }
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeType::String => f.write_str("string"),
            AttributeType::Number => f.write_str("number"),
            AttributeType::Bool => f.write_str("bool"),
            AttributeType::Dynamic => f.write_str("dynamic"),
            AttributeType::List(elem) => write!(f, "list of {elem}"),
            AttributeType::Set(elem) => write!(f, "set of {elem}"),
            AttributeType::Map(elem) => write!(f, "map of {elem}"),
            AttributeType::Object(_) => f.write_str("object"),
            AttributeType::Tuple(_) => f.write_str("tuple"),
        }
    }
}

impl Serialize for AttributeType {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.to_json_value().serialize(serializer)
    }
}
