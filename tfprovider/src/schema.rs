//! Provider schemas
//!
//! The schema is fetched from the plugin once, translated into the types in
//! this module, and then shared read-only for the lifetime of the provider.
//! Every value the client encodes or decodes is interpreted through the type
//! implied by one of these blocks.

use crate::attribute_type::AttributeType;
use crate::diagnostics::decode_diagnostics;
use crate::error::{Result, TfproviderError};
use crate::proto;
use serde::Serialize;
use std::collections::BTreeMap;

/// Schema is the full schema of a provider
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Schema {
    pub provider_config: Block,
    pub managed_resource_types: BTreeMap<String, ManagedResourceTypeSchema>,
    pub data_resource_types: BTreeMap<String, DataResourceTypeSchema>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ManagedResourceTypeSchema {
    /// Increments when the provider changes the shape of stored state
    pub version: i64,
    pub content: Block,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DataResourceTypeSchema {
    pub content: Block,
}

/// Block represents a configuration block
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Block {
    pub attributes: BTreeMap<String, Attribute>,
    pub nested_block_types: BTreeMap<String, NestedBlockType>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub deprecated: bool,
}

/// Attribute represents a single configuration attribute
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attribute {
    pub r#type: AttributeType,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub required: bool,
    pub optional: bool,
    pub computed: bool,
    pub sensitive: bool,
    pub deprecated: bool,
}

/// NestedBlockType represents a nested configuration block
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NestedBlockType {
    pub type_name: String,
    pub nesting: NestingMode,
    pub content: Block,
    pub min_items: i64,
    pub max_items: i64,
}

/// NestingMode defines how nested blocks are structured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NestingMode {
    /// Exactly zero or one block; null when absent
    Single,
    /// Exactly one block; all-null object when absent
    Group,
    List,
    Set,
    /// Blocks labelled by a string key
    Map,
}

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("nested block type {type_name:?} has unsupported nesting mode {mode}")]
    InvalidNestingMode { type_name: String, mode: i32 },

    #[error("nested attribute {name:?} has unsupported nesting mode {mode}")]
    InvalidAttributeNesting { name: String, mode: i32 },
}

impl Block {
    /// The object type that values conforming to this block have.
    pub fn implied_type(&self) -> AttributeType {
        let mut fields = BTreeMap::new();
        for (name, attr) in &self.attributes {
            fields.insert(name.clone(), attr.r#type.clone());
        }
        for (name, nested) in &self.nested_block_types {
            fields.insert(name.clone(), nested.implied_type());
        }
        AttributeType::Object(fields)
    }
}

impl NestedBlockType {
    pub fn implied_type(&self) -> AttributeType {
        let content = self.content.implied_type();
        match self.nesting {
            NestingMode::Single | NestingMode::Group => content,
            // Blocks whose content is dynamically typed may differ in shape
            // from one element to the next, so no single element type fits.
            NestingMode::List | NestingMode::Map if content.has_dynamic_types() => {
                AttributeType::Dynamic
            }
            NestingMode::List => AttributeType::list(content),
            NestingMode::Set => AttributeType::set(content),
            NestingMode::Map => AttributeType::map(content),
        }
    }
}

impl Schema {
    pub fn managed_resource_type(&self, name: &str) -> Option<&ManagedResourceTypeSchema> {
        self.managed_resource_types.get(name)
    }

    pub fn data_resource_type(&self, name: &str) -> Option<&DataResourceTypeSchema> {
        self.data_resource_types.get(name)
    }
}

/// Translates a wire block, recursing into nested blocks.
///
/// A malformed attribute type degrades to [`AttributeType::Dynamic`]; a
/// nesting mode the client does not know is an error because it changes
/// the shape of every value the block describes.
pub fn translate_block(
    raw: Option<&proto::schema::Block>,
) -> std::result::Result<Block, SchemaError> {
    let raw = match raw {
        Some(raw) => raw,
        None => return Ok(Block::default()),
    };

    let mut block = Block {
        description: raw.description.clone(),
        deprecated: raw.deprecated,
        ..Block::default()
    };

    for raw_attr in &raw.attributes {
        let attr = translate_attribute(raw_attr)?;
        block.attributes.insert(raw_attr.name.clone(), attr);
    }

    for raw_nested in &raw.block_types {
        use proto::schema::nested_block::NestingMode as Wire;

        let nesting = match Wire::try_from(raw_nested.nesting) {
            Ok(Wire::Single) => NestingMode::Single,
            Ok(Wire::Group) => NestingMode::Group,
            Ok(Wire::List) => NestingMode::List,
            Ok(Wire::Set) => NestingMode::Set,
            Ok(Wire::Map) => NestingMode::Map,
            Ok(Wire::Invalid) | Err(_) => {
                return Err(SchemaError::InvalidNestingMode {
                    type_name: raw_nested.type_name.clone(),
                    mode: raw_nested.nesting,
                })
            }
        };

        block.nested_block_types.insert(
            raw_nested.type_name.clone(),
            NestedBlockType {
                type_name: raw_nested.type_name.clone(),
                nesting,
                content: translate_block(raw_nested.block.as_ref())?,
                min_items: raw_nested.min_items,
                max_items: raw_nested.max_items,
            },
        );
    }

    Ok(block)
}

fn translate_attribute(
    raw: &proto::schema::Attribute,
) -> std::result::Result<Attribute, SchemaError> {
    let r#type = match &raw.nested_type {
        Some(nested) => nested_attribute_type(&raw.name, nested)?,
        None => AttributeType::from_json(&raw.r#type).unwrap_or_else(|err| {
            tracing::warn!(
                attribute = %raw.name,
                error = %err,
                "provider sent an invalid attribute type; treating it as dynamic"
            );
            AttributeType::Dynamic
        }),
    };

    Ok(Attribute {
        r#type,
        description: raw.description.clone(),
        required: raw.required,
        optional: raw.optional,
        computed: raw.computed,
        sensitive: raw.sensitive,
        deprecated: raw.deprecated,
    })
}

fn nested_attribute_type(
    name: &str,
    raw: &proto::schema::Object,
) -> std::result::Result<AttributeType, SchemaError> {
    use proto::schema::object::NestingMode as Wire;

    let mut fields = BTreeMap::new();
    for raw_attr in &raw.attributes {
        fields.insert(raw_attr.name.clone(), translate_attribute(raw_attr)?.r#type);
    }
    let object = AttributeType::Object(fields);

    match Wire::try_from(raw.nesting) {
        Ok(Wire::Single) => Ok(object),
        Ok(Wire::List) => Ok(AttributeType::list(object)),
        Ok(Wire::Set) => Ok(AttributeType::set(object)),
        Ok(Wire::Map) => Ok(AttributeType::map(object)),
        Ok(Wire::Invalid) | Err(_) => Err(SchemaError::InvalidAttributeNesting {
            name: name.to_string(),
            mode: raw.nesting,
        }),
    }
}

/// Builds a [`Schema`] from a schema response.
///
/// Error diagnostics in the response mean the provider could not describe
/// itself, which leaves nothing useful to do with it.
pub fn load_schema(resp: &proto::get_provider_schema::Response) -> Result<Schema> {
    let diags = decode_diagnostics(&resp.diagnostics);
    if diags.has_errors() {
        return Err(TfproviderError::Schema(diags));
    }
    for diag in diags.iter() {
        tracing::warn!(summary = %diag.summary, detail = %diag.detail, "provider schema warning");
    }

    let provider_config = translate_block(
        resp.provider
            .as_ref()
            .and_then(|schema| schema.block.as_ref()),
    )?;

    let mut managed_resource_types = BTreeMap::new();
    for (name, raw) in &resp.resource_schemas {
        managed_resource_types.insert(
            name.clone(),
            ManagedResourceTypeSchema {
                version: raw.version,
                content: translate_block(raw.block.as_ref())?,
            },
        );
    }

    let mut data_resource_types = BTreeMap::new();
    for (name, raw) in &resp.data_source_schemas {
        data_resource_types.insert(
            name.clone(),
            DataResourceTypeSchema {
                content: translate_block(raw.block.as_ref())?,
            },
        );
    }

    Ok(Schema {
        provider_config,
        managed_resource_types,
        data_resource_types,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proto::schema::nested_block::NestingMode as WireNesting;

    fn wire_attr(name: &str, ty: &str) -> proto::schema::Attribute {
        proto::schema::Attribute {
            name: name.to_string(),
            r#type: ty.as_bytes().to_vec(),
            optional: true,
            ..Default::default()
        }
    }

    fn wire_nested(name: &str, nesting: i32, attrs: Vec<proto::schema::Attribute>) -> proto::schema::NestedBlock {
        proto::schema::NestedBlock {
            type_name: name.to_string(),
            nesting,
            block: Some(proto::schema::Block {
                attributes: attrs,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn attributes_and_flags_are_translated() {
        let raw = proto::schema::Block {
            attributes: vec![
                proto::schema::Attribute {
                    name: "name".to_string(),
                    r#type: br#""string""#.to_vec(),
                    description: "The name".to_string(),
                    required: true,
                    ..Default::default()
                },
                proto::schema::Attribute {
                    name: "token".to_string(),
                    r#type: br#""string""#.to_vec(),
                    optional: true,
                    computed: true,
                    sensitive: true,
                    ..Default::default()
                },
            ],
            ..Default::default()
        };

        let block = translate_block(Some(&raw)).unwrap();

        let name = &block.attributes["name"];
        assert_eq!(name.r#type, AttributeType::String);
        assert_eq!(name.description, "The name");
        assert!(name.required && !name.optional);

        let token = &block.attributes["token"];
        assert!(token.optional && token.computed && token.sensitive);
    }

    #[test]
    fn malformed_attribute_type_degrades_to_dynamic() {
        let raw = proto::schema::Block {
            attributes: vec![wire_attr("broken", "{not a type"), wire_attr("ok", r#""bool""#)],
            ..Default::default()
        };

        let block = translate_block(Some(&raw)).unwrap();
        assert_eq!(block.attributes["broken"].r#type, AttributeType::Dynamic);
        assert_eq!(block.attributes["ok"].r#type, AttributeType::Bool);
    }

    #[test]
    fn nested_blocks_are_translated_recursively() {
        let mut rule = wire_nested(
            "rule",
            WireNesting::List as i32,
            vec![wire_attr("port", r#""number""#)],
        );
        if let Some(block) = rule.block.as_mut() {
            block.block_types.push(wire_nested(
                "match",
                WireNesting::Single as i32,
                vec![wire_attr("path", r#""string""#)],
            ));
        }
        let raw = proto::schema::Block {
            block_types: vec![rule],
            ..Default::default()
        };

        let block = translate_block(Some(&raw)).unwrap();
        let rule = &block.nested_block_types["rule"];
        assert_eq!(rule.nesting, NestingMode::List);
        assert_eq!(rule.type_name, "rule");
        let inner = &rule.content.nested_block_types["match"];
        assert_eq!(inner.nesting, NestingMode::Single);
        assert!(inner.content.attributes.contains_key("path"));
    }

    #[test]
    fn invalid_nesting_mode_is_an_error() {
        for mode in [WireNesting::Invalid as i32, 99] {
            let raw = proto::schema::Block {
                block_types: vec![wire_nested("weird", mode, vec![])],
                ..Default::default()
            };
            assert!(matches!(
                translate_block(Some(&raw)),
                Err(SchemaError::InvalidNestingMode { .. })
            ));
        }
    }

    #[test]
    fn missing_block_is_empty() {
        let block = translate_block(None).unwrap();
        assert!(block.attributes.is_empty());
        assert!(block.nested_block_types.is_empty());
    }

    #[test]
    fn implied_type_reflects_nesting_modes() {
        let raw = proto::schema::Block {
            attributes: vec![wire_attr("id", r#""string""#)],
            block_types: vec![
                wire_nested("one", WireNesting::Single as i32, vec![wire_attr("a", r#""bool""#)]),
                wire_nested("grp", WireNesting::Group as i32, vec![wire_attr("a", r#""bool""#)]),
                wire_nested("lst", WireNesting::List as i32, vec![wire_attr("a", r#""bool""#)]),
                wire_nested("st", WireNesting::Set as i32, vec![wire_attr("a", r#""bool""#)]),
                wire_nested("mp", WireNesting::Map as i32, vec![wire_attr("a", r#""bool""#)]),
                wire_nested("dyn", WireNesting::List as i32, vec![wire_attr("v", r#""dynamic""#)]),
            ],
            ..Default::default()
        };

        let inner = AttributeType::object([("a", AttributeType::Bool)]);
        let expected = AttributeType::object([
            ("id", AttributeType::String),
            ("one", inner.clone()),
            ("grp", inner.clone()),
            ("lst", AttributeType::list(inner.clone())),
            ("st", AttributeType::set(inner.clone())),
            ("mp", AttributeType::map(inner)),
            ("dyn", AttributeType::Dynamic),
        ]);

        assert_eq!(translate_block(Some(&raw)).unwrap().implied_type(), expected);
    }

    #[test]
    fn nested_attribute_types_become_structural_types() {
        let raw = proto::schema::Block {
            attributes: vec![proto::schema::Attribute {
                name: "disks".to_string(),
                nested_type: Some(proto::schema::Object {
                    attributes: vec![wire_attr("size", r#""number""#)],
                    nesting: proto::schema::object::NestingMode::List as i32,
                    ..Default::default()
                }),
                optional: true,
                ..Default::default()
            }],
            ..Default::default()
        };

        let block = translate_block(Some(&raw)).unwrap();
        assert_eq!(
            block.attributes["disks"].r#type,
            AttributeType::list(AttributeType::object([("size", AttributeType::Number)]))
        );
    }

    #[test]
    fn schema_response_lists_resource_types() {
        let mut resp = proto::get_provider_schema::Response {
            provider: Some(proto::Schema {
                version: 0,
                block: Some(proto::schema::Block {
                    attributes: vec![wire_attr("endpoint", r#""string""#)],
                    ..Default::default()
                }),
            }),
            ..Default::default()
        };
        resp.resource_schemas.insert(
            "widget".to_string(),
            proto::Schema {
                version: 3,
                block: Some(proto::schema::Block {
                    attributes: vec![wire_attr("size", "[[[")],
                    ..Default::default()
                }),
            },
        );

        let schema = load_schema(&resp).unwrap();
        assert_eq!(
            schema.managed_resource_types.keys().collect::<Vec<_>>(),
            vec!["widget"]
        );
        assert!(schema.data_resource_types.is_empty());
        assert_eq!(schema.managed_resource_types["widget"].version, 3);
        assert_eq!(
            schema.managed_resource_types["widget"].content.attributes["size"].r#type,
            AttributeType::Dynamic
        );
        assert!(schema.provider_config.attributes.contains_key("endpoint"));
    }

    #[test]
    fn schema_response_with_errors_fails() {
        let resp = proto::get_provider_schema::Response {
            diagnostics: vec![proto::Diagnostic {
                severity: proto::diagnostic::Severity::Error as i32,
                summary: "boom".to_string(),
                ..Default::default()
            }],
            ..Default::default()
        };

        match load_schema(&resp) {
            Err(TfproviderError::Schema(diags)) => assert!(diags.has_errors()),
            other => panic!("expected schema error, got {other:?}"),
        }
    }
}
