//! Dynamic value encoding
//!
//! Values cross the wire as [`proto::DynamicValue`], either as msgpack or as
//! JSON. Neither form carries type information for ordinary values, so both
//! directions are driven by the type implied by a schema block.
//!
//! Unknown values are a msgpack extension and have no JSON representation.
//! Dynamically typed attributes carry their concrete type next to the value:
//! a two element array `[type, value]` in msgpack and an object
//! `{"value": ..., "type": ...}` in JSON.

use crate::attribute_type::AttributeType;
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::proto;
use crate::schema::Block;
use crate::types::{AttributePath, AttributePathStep, Dynamic};
use rmpv::Value as Msgpack;
use serde_json::Value as Json;
use std::collections::{BTreeMap, HashMap};

/// Extension code cty uses for unknown values
const UNKNOWN_EXT: i8 = 0;

/// Wire encoding of a dynamic value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    #[default]
    Msgpack,
    Json,
}

/// A value did not conform to its type, at `path`.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct PathError {
    pub path: AttributePath,
    pub message: String,
}

impl PathError {
    fn new(path: &AttributePath, message: impl Into<String>) -> Self {
        Self {
            path: path.clone(),
            message: message.into(),
        }
    }
}

fn error_diagnostics(summary: &str, detail_prefix: &str, err: PathError) -> Diagnostics {
    Diagnostic::error(summary, format!("{detail_prefix}: {err}."))
        .with_attribute(err.path)
        .into()
}

/// Encodes `value` as msgpack against the type implied by `block`.
///
/// An object attribute missing from `value` is encoded as null and is not
/// reported. Attributes the type does not declare are an error.
pub fn encode(value: &Dynamic, block: &Block) -> Result<proto::DynamicValue, Diagnostics> {
    encode_with(value, block, Encoding::Msgpack)
}

/// Like [`encode`], with the wire encoding chosen by the caller.
pub fn encode_with(
    value: &Dynamic,
    block: &Block,
    encoding: Encoding,
) -> Result<proto::DynamicValue, Diagnostics> {
    let ty = block.implied_type();
    let result = match encoding {
        Encoding::Msgpack => marshal_msgpack(value, &ty).map(|msgpack| proto::DynamicValue {
            msgpack,
            json: Vec::new(),
        }),
        Encoding::Json => marshal_json(value, &ty).map(|json| proto::DynamicValue {
            msgpack: Vec::new(),
            json,
        }),
    };
    result.map_err(|err| {
        error_diagnostics("Invalid object", "Value does not have the required type", err)
    })
}

/// Decodes whichever payload of `raw` is populated against the type implied
/// by `block`. JSON wins if, unusually, both are set.
pub fn decode(raw: &proto::DynamicValue, block: &Block) -> Result<Dynamic, Diagnostics> {
    let ty = block.implied_type();
    if !raw.json.is_empty() {
        unmarshal_json(&raw.json, &ty).map_err(|err| {
            error_diagnostics(
                "Provider returned invalid object",
                "Provider's JSON response does not conform to the expected type",
                err,
            )
        })
    } else if !raw.msgpack.is_empty() {
        unmarshal_msgpack(&raw.msgpack, &ty).map_err(|err| {
            error_diagnostics(
                "Provider returned invalid object",
                "Provider's msgpack response does not conform to the expected type",
                err,
            )
        })
    } else {
        Err(Diagnostic::error(
            "Provider using unsupported response format",
            "Provider's response is not in either JSON or msgpack format",
        )
        .into())
    }
}

/// Guesses the most specific type for a value with no schema of its own.
///
/// Lists become tuples and maps become objects, since those keep each
/// element's own type. Null and unknown values stay dynamic.
pub fn infer_type(value: &Dynamic) -> AttributeType {
    match value {
        Dynamic::Null | Dynamic::Unknown => AttributeType::Dynamic,
        Dynamic::Bool(_) => AttributeType::Bool,
        Dynamic::Number(_) => AttributeType::Number,
        Dynamic::String(_) => AttributeType::String,
        Dynamic::List(items) => AttributeType::Tuple(items.iter().map(infer_type).collect()),
        Dynamic::Map(items) => AttributeType::Object(
            items
                .iter()
                .map(|(name, item)| (name.clone(), infer_type(item)))
                .collect(),
        ),
    }
}

fn whole_number(n: f64) -> Option<i64> {
    // i64::MAX is not exactly representable; the bound is exclusive.
    if n.fract() == 0.0 && n >= i64::MIN as f64 && n < i64::MAX as f64 {
        Some(n as i64)
    } else {
        None
    }
}

fn type_mismatch(path: &AttributePath, ty: &AttributeType, value: &Dynamic) -> PathError {
    PathError::new(
        path,
        format!("{ty} required, but have {}", value.type_name()),
    )
}

fn child(path: &AttributePath, step: AttributePathStep) -> AttributePath {
    let mut path = path.clone();
    path.push(step);
    path
}

/// Checks that an object value has no attributes outside its type.
fn check_object_attributes(
    path: &AttributePath,
    attrs: &BTreeMap<String, AttributeType>,
    value: &HashMap<String, Dynamic>,
) -> Result<(), PathError> {
    let mut extra: Vec<&String> = value.keys().filter(|k| !attrs.contains_key(*k)).collect();
    extra.sort();
    match extra.first() {
        Some(name) => Err(PathError::new(
            path,
            format!("unsupported attribute \"{name}\""),
        )),
        None => Ok(()),
    }
}

// Msgpack

pub fn marshal_msgpack(value: &Dynamic, ty: &AttributeType) -> Result<Vec<u8>, PathError> {
    let encoded = msgpack_value(value, ty, &AttributePath::root())?;
    let mut buf = Vec::new();
    rmpv::encode::write_value(&mut buf, &encoded)
        .map_err(|err| PathError::new(&AttributePath::root(), err.to_string()))?;
    Ok(buf)
}

fn msgpack_value(
    value: &Dynamic,
    ty: &AttributeType,
    path: &AttributePath,
) -> Result<Msgpack, PathError> {
    match value {
        Dynamic::Null => return Ok(Msgpack::Nil),
        Dynamic::Unknown => return Ok(Msgpack::Ext(UNKNOWN_EXT, vec![0])),
        _ => {}
    }

    match (ty, value) {
        (AttributeType::Dynamic, _) => {
            let concrete = infer_type(value);
            Ok(Msgpack::Array(vec![
                Msgpack::Binary(concrete.to_json()),
                msgpack_value(value, &concrete, path)?,
            ]))
        }
        (AttributeType::String, Dynamic::String(s)) => Ok(Msgpack::from(s.as_str())),
        (AttributeType::Number, Dynamic::Number(n)) => Ok(match whole_number(*n) {
            Some(i) => Msgpack::from(i),
            None => Msgpack::F64(*n),
        }),
        (AttributeType::Bool, Dynamic::Bool(b)) => Ok(Msgpack::Boolean(*b)),
        (AttributeType::List(elem) | AttributeType::Set(elem), Dynamic::List(items)) => items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                msgpack_value(item, elem, &child(path, AttributePathStep::ListIndex(i as i64)))
            })
            .collect::<Result<_, _>>()
            .map(Msgpack::Array),
        (AttributeType::Map(elem), Dynamic::Map(items)) => {
            let mut keys: Vec<&String> = items.keys().collect();
            keys.sort();
            let mut entries = Vec::with_capacity(keys.len());
            for key in keys {
                let item_path = child(path, AttributePathStep::MapKey(key.clone()));
                entries.push((
                    Msgpack::from(key.as_str()),
                    msgpack_value(&items[key], elem, &item_path)?,
                ));
            }
            Ok(Msgpack::Map(entries))
        }
        (AttributeType::Object(attrs), Dynamic::Map(items)) => {
            check_object_attributes(path, attrs, items)?;
            let mut entries = Vec::with_capacity(attrs.len());
            for (name, attr_ty) in attrs {
                let item = items.get(name).unwrap_or(&Dynamic::Null);
                let item_path = child(path, AttributePathStep::AttributeName(name.clone()));
                entries.push((
                    Msgpack::from(name.as_str()),
                    msgpack_value(item, attr_ty, &item_path)?,
                ));
            }
            Ok(Msgpack::Map(entries))
        }
        (AttributeType::Tuple(elems), Dynamic::List(items)) => {
            if elems.len() != items.len() {
                return Err(PathError::new(
                    path,
                    format!("tuple required with {} elements, but have {}", elems.len(), items.len()),
                ));
            }
            elems
                .iter()
                .zip(items)
                .enumerate()
                .map(|(i, (elem, item))| {
                    msgpack_value(item, elem, &child(path, AttributePathStep::ListIndex(i as i64)))
                })
                .collect::<Result<_, _>>()
                .map(Msgpack::Array)
        }
        _ => Err(type_mismatch(path, ty, value)),
    }
}

pub fn unmarshal_msgpack(raw: &[u8], ty: &AttributeType) -> Result<Dynamic, PathError> {
    let root = AttributePath::root();
    let mut reader = raw;
    let value = rmpv::decode::read_value(&mut reader)
        .map_err(|err| PathError::new(&root, format!("invalid msgpack: {err}")))?;
    if !reader.is_empty() {
        return Err(PathError::new(&root, "extra data after msgpack value"));
    }
    from_msgpack(&value, ty, &root)
}

fn msgpack_string<'a>(value: &'a Msgpack) -> Option<&'a str> {
    match value {
        Msgpack::String(s) => s.as_str(),
        _ => None,
    }
}

fn from_msgpack(
    value: &Msgpack,
    ty: &AttributeType,
    path: &AttributePath,
) -> Result<Dynamic, PathError> {
    match value {
        Msgpack::Nil => return Ok(Dynamic::Null),
        Msgpack::Ext(..) => return Ok(Dynamic::Unknown),
        _ => {}
    }

    let mismatch = || PathError::new(path, format!("{ty} required"));

    match ty {
        AttributeType::String => msgpack_string(value)
            .map(Dynamic::from)
            .ok_or_else(mismatch),
        AttributeType::Number => match value {
            Msgpack::Integer(i) => i
                .as_i64()
                .map(|i| i as f64)
                .or_else(|| i.as_u64().map(|u| u as f64))
                .or_else(|| i.as_f64())
                .map(Dynamic::Number)
                .ok_or_else(mismatch),
            Msgpack::F32(f) => Ok(Dynamic::Number(f64::from(*f))),
            Msgpack::F64(f) => Ok(Dynamic::Number(*f)),
            Msgpack::String(_) => msgpack_string(value)
                .and_then(|s| s.parse::<f64>().ok())
                .map(Dynamic::Number)
                .ok_or_else(mismatch),
            _ => Err(mismatch()),
        },
        AttributeType::Bool => match value {
            Msgpack::Boolean(b) => Ok(Dynamic::Bool(*b)),
            _ => Err(mismatch()),
        },
        AttributeType::List(elem) | AttributeType::Set(elem) => match value {
            Msgpack::Array(items) => items
                .iter()
                .enumerate()
                .map(|(i, item)| {
                    from_msgpack(item, elem, &child(path, AttributePathStep::ListIndex(i as i64)))
                })
                .collect::<Result<_, _>>()
                .map(Dynamic::List),
            _ => Err(mismatch()),
        },
        AttributeType::Map(elem) => match value {
            Msgpack::Map(entries) => {
                let mut items = HashMap::with_capacity(entries.len());
                for (key, item) in entries {
                    let key = msgpack_string(key)
                        .ok_or_else(|| PathError::new(path, "map keys must be strings"))?;
                    let item_path = child(path, AttributePathStep::MapKey(key.to_string()));
                    items.insert(key.to_string(), from_msgpack(item, elem, &item_path)?);
                }
                Ok(Dynamic::Map(items))
            }
            _ => Err(mismatch()),
        },
        AttributeType::Object(attrs) => match value {
            Msgpack::Map(entries) => {
                let mut items = HashMap::with_capacity(attrs.len());
                for (key, item) in entries {
                    let name = msgpack_string(key)
                        .ok_or_else(|| PathError::new(path, "attribute names must be strings"))?;
                    let attr_ty = attrs.get(name).ok_or_else(|| {
                        PathError::new(path, format!("unsupported attribute \"{name}\""))
                    })?;
                    let item_path = child(path, AttributePathStep::AttributeName(name.to_string()));
                    items.insert(name.to_string(), from_msgpack(item, attr_ty, &item_path)?);
                }
                for name in attrs.keys() {
                    items.entry(name.clone()).or_insert(Dynamic::Null);
                }
                Ok(Dynamic::Map(items))
            }
            _ => Err(mismatch()),
        },
        AttributeType::Tuple(elems) => match value {
            Msgpack::Array(items) if items.len() == elems.len() => elems
                .iter()
                .zip(items)
                .enumerate()
                .map(|(i, (elem, item))| {
                    from_msgpack(item, elem, &child(path, AttributePathStep::ListIndex(i as i64)))
                })
                .collect::<Result<_, _>>()
                .map(Dynamic::List),
            Msgpack::Array(items) => Err(PathError::new(
                path,
                format!("tuple required with {} elements, but have {}", elems.len(), items.len()),
            )),
            _ => Err(mismatch()),
        },
        AttributeType::Dynamic => match value {
            Msgpack::Array(pair) if pair.len() == 2 => {
                let raw_type = match &pair[0] {
                    Msgpack::Binary(bytes) => bytes.as_slice(),
                    Msgpack::String(s) => s.as_bytes(),
                    _ => return Err(PathError::new(path, "invalid dynamic type descriptor")),
                };
                let concrete = AttributeType::from_json(raw_type)
                    .map_err(|err| PathError::new(path, format!("invalid dynamic type: {err}")))?;
                from_msgpack(&pair[1], &concrete, path)
            }
            _ => Err(PathError::new(
                path,
                "dynamic value must be a [type, value] pair",
            )),
        },
    }
}

// JSON

pub fn marshal_json(value: &Dynamic, ty: &AttributeType) -> Result<Vec<u8>, PathError> {
    let encoded = json_value(value, ty, &AttributePath::root())?;
    serde_json::to_vec(&encoded)
        .map_err(|err| PathError::new(&AttributePath::root(), err.to_string()))
}

fn json_value(value: &Dynamic, ty: &AttributeType, path: &AttributePath) -> Result<Json, PathError> {
    match value {
        Dynamic::Null => return Ok(Json::Null),
        Dynamic::Unknown => {
            return Err(PathError::new(
                path,
                "value is not known; unknown values cannot be serialized to JSON",
            ))
        }
        _ => {}
    }

    match (ty, value) {
        (AttributeType::Dynamic, _) => {
            let concrete = infer_type(value);
            let mut wrapper = serde_json::Map::new();
            wrapper.insert("value".to_string(), json_value(value, &concrete, path)?);
            wrapper.insert("type".to_string(), concrete.to_json_value());
            Ok(Json::Object(wrapper))
        }
        (AttributeType::String, Dynamic::String(s)) => Ok(Json::from(s.as_str())),
        (AttributeType::Number, Dynamic::Number(n)) => match whole_number(*n) {
            Some(i) => Ok(Json::from(i)),
            None => serde_json::Number::from_f64(*n)
                .map(Json::Number)
                .ok_or_else(|| PathError::new(path, format!("{n} cannot be represented in JSON"))),
        },
        (AttributeType::Bool, Dynamic::Bool(b)) => Ok(Json::Bool(*b)),
        (AttributeType::List(elem) | AttributeType::Set(elem), Dynamic::List(items)) => items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                json_value(item, elem, &child(path, AttributePathStep::ListIndex(i as i64)))
            })
            .collect::<Result<_, _>>()
            .map(Json::Array),
        (AttributeType::Map(elem), Dynamic::Map(items)) => {
            let mut keys: Vec<&String> = items.keys().collect();
            keys.sort();
            let mut out = serde_json::Map::new();
            for key in keys {
                let item_path = child(path, AttributePathStep::MapKey(key.clone()));
                out.insert(key.clone(), json_value(&items[key], elem, &item_path)?);
            }
            Ok(Json::Object(out))
        }
        (AttributeType::Object(attrs), Dynamic::Map(items)) => {
            check_object_attributes(path, attrs, items)?;
            let mut out = serde_json::Map::new();
            for (name, attr_ty) in attrs {
                let item = items.get(name).unwrap_or(&Dynamic::Null);
                let item_path = child(path, AttributePathStep::AttributeName(name.clone()));
                out.insert(name.clone(), json_value(item, attr_ty, &item_path)?);
            }
            Ok(Json::Object(out))
        }
        (AttributeType::Tuple(elems), Dynamic::List(items)) => {
            if elems.len() != items.len() {
                return Err(PathError::new(
                    path,
                    format!("tuple required with {} elements, but have {}", elems.len(), items.len()),
                ));
            }
            elems
                .iter()
                .zip(items)
                .enumerate()
                .map(|(i, (elem, item))| {
                    json_value(item, elem, &child(path, AttributePathStep::ListIndex(i as i64)))
                })
                .collect::<Result<_, _>>()
                .map(Json::Array)
        }
        _ => Err(type_mismatch(path, ty, value)),
    }
}

pub fn unmarshal_json(raw: &[u8], ty: &AttributeType) -> Result<Dynamic, PathError> {
    let root = AttributePath::root();
    let value: Json = serde_json::from_slice(raw)
        .map_err(|err| PathError::new(&root, format!("invalid JSON: {err}")))?;
    from_json(&value, ty, &root)
}

fn from_json(value: &Json, ty: &AttributeType, path: &AttributePath) -> Result<Dynamic, PathError> {
    if value.is_null() {
        return Ok(Dynamic::Null);
    }

    let mismatch = || PathError::new(path, format!("{ty} required"));

    match ty {
        AttributeType::String => match value {
            Json::String(s) => Ok(Dynamic::from(s.as_str())),
            Json::Number(n) => Ok(Dynamic::String(n.to_string())),
            Json::Bool(b) => Ok(Dynamic::String(b.to_string())),
            _ => Err(mismatch()),
        },
        AttributeType::Number => match value {
            Json::Number(n) => n.as_f64().map(Dynamic::Number).ok_or_else(mismatch),
            Json::String(s) => s.parse::<f64>().map(Dynamic::Number).map_err(|_| mismatch()),
            _ => Err(mismatch()),
        },
        AttributeType::Bool => match value {
            Json::Bool(b) => Ok(Dynamic::Bool(*b)),
            Json::String(s) if s == "true" => Ok(Dynamic::Bool(true)),
            Json::String(s) if s == "false" => Ok(Dynamic::Bool(false)),
            _ => Err(mismatch()),
        },
        AttributeType::List(elem) | AttributeType::Set(elem) => match value {
            Json::Array(items) => items
                .iter()
                .enumerate()
                .map(|(i, item)| {
                    from_json(item, elem, &child(path, AttributePathStep::ListIndex(i as i64)))
                })
                .collect::<Result<_, _>>()
                .map(Dynamic::List),
            _ => Err(mismatch()),
        },
        AttributeType::Map(elem) => match value {
            Json::Object(entries) => {
                let mut items = HashMap::with_capacity(entries.len());
                for (key, item) in entries {
                    let item_path = child(path, AttributePathStep::MapKey(key.clone()));
                    items.insert(key.clone(), from_json(item, elem, &item_path)?);
                }
                Ok(Dynamic::Map(items))
            }
            _ => Err(mismatch()),
        },
        AttributeType::Object(attrs) => match value {
            Json::Object(entries) => {
                let mut items = HashMap::with_capacity(attrs.len());
                for (name, item) in entries {
                    let attr_ty = attrs.get(name).ok_or_else(|| {
                        PathError::new(path, format!("unsupported attribute \"{name}\""))
                    })?;
                    let item_path = child(path, AttributePathStep::AttributeName(name.clone()));
                    items.insert(name.clone(), from_json(item, attr_ty, &item_path)?);
                }
                for name in attrs.keys() {
                    items.entry(name.clone()).or_insert(Dynamic::Null);
                }
                Ok(Dynamic::Map(items))
            }
            _ => Err(mismatch()),
        },
        AttributeType::Tuple(elems) => match value {
            Json::Array(items) if items.len() == elems.len() => elems
                .iter()
                .zip(items)
                .enumerate()
                .map(|(i, (elem, item))| {
                    from_json(item, elem, &child(path, AttributePathStep::ListIndex(i as i64)))
                })
                .collect::<Result<_, _>>()
                .map(Dynamic::List),
            Json::Array(items) => Err(PathError::new(
                path,
                format!("tuple required with {} elements, but have {}", elems.len(), items.len()),
            )),
            _ => Err(mismatch()),
        },
        AttributeType::Dynamic => match value {
            Json::Object(wrapper) => {
                let raw_type = wrapper
                    .get("type")
                    .ok_or_else(|| PathError::new(path, "missing type in dynamic value"))?;
                let concrete = AttributeType::from_json_value(raw_type)
                    .map_err(|err| PathError::new(path, format!("invalid dynamic type: {err}")))?;
                let inner = wrapper.get("value").unwrap_or(&Json::Null);
                from_json(inner, &concrete, path)
            }
            _ => Err(PathError::new(
                path,
                "dynamic value must be an object with value and type",
            )),
        },
    }
}
