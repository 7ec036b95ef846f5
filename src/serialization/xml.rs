//! Schema-driven FHIR XML.
//!
//! XML is mapped onto the JSON representation and decoded by [`JsonCodec`], so both formats
//! share one notion of choice names, storage names and unknown-element preservation:
//! - the root element is named after the resource type, in the FHIR namespace;
//! - primitives carry their value in a `value` attribute, with `id` and extension children;
//! - `Element.id` and `Extension.url` are attributes;
//! - contained resources are wrapped in an element named after their type;
//! - narrative `div` content is raw XHTML.

use indexmap::IndexMap;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use roxmltree::{Document, Node};
use serde_json::{Map, Number, Value};
use std::io::Cursor;
use std::sync::Arc;
use tracing::debug;

use super::{JsonCodec, WireCodec, WireFormat};
use crate::error::{FhirModelError, Result};
use crate::registry::SchemaRegistry;
use crate::types::datatype::{self, PrimitiveShape, TypeCategory};
use crate::types::{FieldSpec, Instance, ResourceSchema};

pub const FHIR_NS: &str = "http://hl7.org/fhir";
pub const XHTML_NS: &str = "http://www.w3.org/1999/xhtml";

const EXTENSION: &str = "Extension";

type XmlWriter = Writer<Cursor<Vec<u8>>>;

#[derive(Debug, Clone)]
pub struct XmlCodec {
    json: JsonCodec,
}

/// Repeated sibling elements gathered under one JSON property.
#[derive(Debug, Default)]
struct Collected {
    values: Vec<Value>,
    metas: Vec<Option<Value>>,
    repeating: bool,
}

impl Collected {
    fn push(&mut self, value: Value, meta: Option<Value>) {
        self.values.push(value);
        self.metas.push(meta);
    }

    fn insert_into(self, object: &mut Map<String, Value>, name: &str) {
        let as_array = self.repeating || self.values.len() > 1;
        if !self.values.iter().all(Value::is_null) {
            let value = if as_array {
                Value::Array(self.values)
            } else {
                self.values.into_iter().next().unwrap_or(Value::Null)
            };
            object.insert(name.to_string(), value);
        }
        if self.metas.iter().any(Option::is_some) {
            let meta = if as_array {
                Value::Array(
                    self.metas
                        .into_iter()
                        .map(|m| m.unwrap_or(Value::Null))
                        .collect(),
                )
            } else {
                self.metas.into_iter().flatten().next().unwrap_or(Value::Null)
            };
            object.insert(format!("_{name}"), meta);
        }
    }
}

impl XmlCodec {
    pub fn new(json: JsonCodec) -> Self {
        Self { json }
    }

    pub fn r4() -> Self {
        Self::new(JsonCodec::new(SchemaRegistry::r4()))
    }

    fn registry(&self) -> &Arc<SchemaRegistry> {
        self.json.registry()
    }

    /// The FHIR JSON form of an XML document.
    pub fn to_json_value(&self, input: &str) -> Result<Value> {
        let document = Document::parse(input)
            .map_err(|e| FhirModelError::malformed(format!("{}", e.pos()), e.to_string()))?;
        let root = document.root_element();
        if root.tag_name().namespace() != Some(FHIR_NS) {
            return Err(FhirModelError::malformed(
                root.tag_name().name(),
                format!("root element is not in the {FHIR_NS} namespace"),
            ));
        }
        let object = self.read_resource(input, &root, root.tag_name().name())?;
        Ok(Value::Object(object))
    }

    /// Write the FHIR JSON form of a resource as XML.
    pub fn from_json_value(&self, value: &Value) -> Result<String> {
        let object = value
            .as_object()
            .ok_or_else(|| FhirModelError::malformed("$", "expected a JSON object"))?;

        let mut writer = if self.json.config().pretty {
            Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2)
        } else {
            Writer::new(Cursor::new(Vec::new()))
        };
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        self.write_resource(&mut writer, object, true)?;

        let bytes = writer.into_inner().into_inner();
        String::from_utf8(bytes)
            .map_err(|e| FhirModelError::malformed("$", format!("non UTF-8 output: {e}")))
    }

    /// Field and concrete type code for an element name within `schema`.
    fn lookup<'s>(&self, schema: &'s ResourceSchema, name: &str) -> Option<(&'s FieldSpec, String)> {
        if let Some(field) = schema.field(name).filter(|field| !field.is_choice()) {
            return field.single_type().map(|t| (field, t.to_string()));
        }
        let resolution = self.registry().resolve_choice_field(&schema.name, name).ok()?;
        schema
            .field(&resolution.group)
            .map(|field| (field, resolution.type_code))
    }

    fn read_resource(&self, source: &str, node: &Node, path: &str) -> Result<Map<String, Value>> {
        let resource_type = node.tag_name().name();
        let mut object = Map::new();
        object.insert("resourceType".to_string(), Value::from(resource_type));

        match self
            .registry()
            .find_schema(resource_type)
            .filter(|schema| schema.is_resource())
        {
            Some(schema) => self.read_members(source, node, &schema, path, &mut object)?,
            None => {
                debug!(resource_type, path, "Reading unregistered resource generically");
                read_generic_children(source, node, &mut object);
            }
        }
        Ok(object)
    }

    fn read_members(
        &self,
        source: &str,
        node: &Node,
        schema: &ResourceSchema,
        path: &str,
        object: &mut Map<String, Value>,
    ) -> Result<()> {
        for field in schema.fields.iter().filter(|field| field.xml_attr) {
            if let Some(value) = node.attribute(field.name.as_str()) {
                object.insert(field.name.clone(), Value::from(value));
            }
        }

        let mut collected: IndexMap<String, Collected> = IndexMap::new();
        for child in node.children().filter(Node::is_element) {
            let name = child.tag_name().name();
            let entry = collected.entry(name.to_string()).or_default();

            match self.lookup(schema, name) {
                Some((field, type_code)) => {
                    entry.repeating = field.is_repeating();
                    let location = if entry.repeating {
                        format!("{path}.{name}[{}]", entry.values.len())
                    } else {
                        format!("{path}.{name}")
                    };
                    let (value, meta) =
                        self.read_typed(source, &child, schema, field, &type_code, &location)?;
                    entry.push(value, meta);
                }
                None => {
                    let (value, meta) = read_generic(source, &child);
                    entry.push(value, meta);
                }
            }
        }

        for (name, entry) in collected {
            entry.insert_into(object, &name);
        }
        Ok(())
    }

    fn read_typed(
        &self,
        source: &str,
        node: &Node,
        owner: &ResourceSchema,
        field: &FieldSpec,
        type_code: &str,
        path: &str,
    ) -> Result<(Value, Option<Value>)> {
        match datatype::categorize(type_code) {
            TypeCategory::Primitive(_) if type_code == datatype::XHTML => {
                Ok((Value::from(&source[node.range()]), None))
            }
            TypeCategory::Primitive(shape) => {
                let value = match node.attribute("value") {
                    Some(raw) => parse_typed(shape, type_code, raw, path)?,
                    None => Value::Null,
                };
                let meta = self.read_primitive_meta(source, node, path)?;
                Ok((value, meta))
            }
            TypeCategory::Resource => {
                let inner = node.children().find(Node::is_element).ok_or_else(|| {
                    FhirModelError::malformed(path, "resource container holds no resource")
                })?;
                Ok((Value::Object(self.read_resource(source, &inner, path)?), None))
            }
            TypeCategory::Backbone | TypeCategory::Complex => {
                let mut object = Map::new();
                match self.registry().nested_schema(owner, field, type_code) {
                    Some(nested) => self.read_members(source, node, &nested, path, &mut object)?,
                    None => read_generic_children(source, node, &mut object),
                }
                Ok((Value::Object(object), None))
            }
        }
    }

    fn read_primitive_meta(&self, source: &str, node: &Node, path: &str) -> Result<Option<Value>> {
        let mut meta = Map::new();
        if let Some(id) = node.attribute("id") {
            meta.insert("id".to_string(), Value::from(id));
        }

        let extension_schema = self.registry().find_schema(EXTENSION);
        let mut extensions = Vec::new();
        for child in node
            .children()
            .filter(|c| c.is_element() && c.tag_name().name() == "extension")
        {
            let mut object = Map::new();
            match &extension_schema {
                Some(schema) => {
                    self.read_members(source, &child, schema, &format!("{path}.extension"), &mut object)?
                }
                None => read_generic_children(source, &child, &mut object),
            }
            extensions.push(Value::Object(object));
        }
        if !extensions.is_empty() {
            meta.insert("extension".to_string(), Value::Array(extensions));
        }

        Ok((!meta.is_empty()).then_some(Value::Object(meta)))
    }

    fn write_resource(
        &self,
        writer: &mut XmlWriter,
        object: &Map<String, Value>,
        root: bool,
    ) -> Result<()> {
        let resource_type = object
            .get("resourceType")
            .and_then(Value::as_str)
            .ok_or_else(|| FhirModelError::malformed("$", "missing resourceType"))?;

        let mut start = BytesStart::new(resource_type);
        if root {
            start.push_attribute(("xmlns", FHIR_NS));
        }
        writer.write_event(Event::Start(start))?;

        let schema = self
            .registry()
            .find_schema(resource_type)
            .filter(|schema| schema.is_resource());
        self.write_members(writer, object, schema.as_deref(), &[])?;

        writer.write_event(Event::End(BytesEnd::new(resource_type)))?;
        Ok(())
    }

    /// Child elements for every member of `object` except those already written as attributes.
    fn write_members(
        &self,
        writer: &mut XmlWriter,
        object: &Map<String, Value>,
        schema: Option<&ResourceSchema>,
        attributes: &[&str],
    ) -> Result<()> {
        for (key, value) in object {
            if key == "resourceType" || attributes.contains(&key.as_str()) {
                continue;
            }
            if let Some(name) = key.strip_prefix('_') {
                // metadata of an absent value still produces an element
                if !object.contains_key(name) {
                    match value {
                        Value::Array(metas) => {
                            for meta in metas.iter().filter(|meta| !meta.is_null()) {
                                self.write_primitive(writer, name, &Value::Null, Some(meta))?;
                            }
                        }
                        meta => self.write_primitive(writer, name, &Value::Null, Some(meta))?,
                    }
                }
                continue;
            }

            let meta = object.get(&format!("_{key}"));
            match schema.and_then(|schema| self.lookup(schema, key).map(|hit| (schema, hit))) {
                Some((owner, (field, type_code))) => {
                    self.write_typed(writer, owner, field, &type_code, key, value, meta)?
                }
                None => self.write_generic(writer, key, value, meta)?,
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn write_typed(
        &self,
        writer: &mut XmlWriter,
        owner: &ResourceSchema,
        field: &FieldSpec,
        type_code: &str,
        name: &str,
        value: &Value,
        meta: Option<&Value>,
    ) -> Result<()> {
        let items: Vec<&Value> = match value {
            Value::Array(items) => items.iter().collect(),
            single => vec![single],
        };
        let metas = meta.and_then(Value::as_array);

        for (index, item) in items.into_iter().enumerate() {
            let item_meta = match (value, metas) {
                (Value::Array(_), Some(metas)) => metas.get(index),
                (Value::Array(_), None) => None,
                _ => meta,
            };

            match datatype::categorize(type_code) {
                TypeCategory::Primitive(_) if type_code == datatype::XHTML => {
                    write_xhtml(writer, item)?;
                }
                TypeCategory::Primitive(_) => self.write_primitive(writer, name, item, item_meta)?,
                TypeCategory::Resource => match item.as_object() {
                    Some(resource) => {
                        writer.write_event(Event::Start(BytesStart::new(name)))?;
                        self.write_resource(writer, resource, false)?;
                        writer.write_event(Event::End(BytesEnd::new(name)))?;
                    }
                    None => self.write_generic(writer, name, item, item_meta)?,
                },
                TypeCategory::Backbone | TypeCategory::Complex => match item.as_object() {
                    Some(object) => {
                        let nested = self.registry().nested_schema(owner, field, type_code);
                        self.write_complex(writer, name, object, nested.as_deref())?;
                    }
                    None => self.write_generic(writer, name, item, item_meta)?,
                },
            }
        }
        Ok(())
    }

    fn write_complex(
        &self,
        writer: &mut XmlWriter,
        name: &str,
        object: &Map<String, Value>,
        schema: Option<&ResourceSchema>,
    ) -> Result<()> {
        let attributes: Vec<&str> = match schema {
            Some(schema) => schema
                .fields
                .iter()
                .filter(|field| field.xml_attr)
                .map(|field| field.name.as_str())
                .collect(),
            None if is_extension_element(name) => vec!["id", "url"],
            None => vec!["id"],
        };

        let mut start = BytesStart::new(name);
        let mut written = Vec::new();
        for attribute in attributes {
            if let Some(Value::String(value)) = object.get(attribute) {
                start.push_attribute((attribute, value.as_str()));
                written.push(attribute);
            }
        }

        writer.write_event(Event::Start(start))?;
        self.write_members(writer, object, schema, &written)?;
        writer.write_event(Event::End(BytesEnd::new(name)))?;
        Ok(())
    }

    fn write_primitive(
        &self,
        writer: &mut XmlWriter,
        name: &str,
        value: &Value,
        meta: Option<&Value>,
    ) -> Result<()> {
        let mut element = BytesStart::new(name);
        let has_value = !value.is_null();
        if has_value {
            element.push_attribute(("value", primitive_text(value).as_str()));
        }

        let meta = meta.and_then(Value::as_object);
        if let Some(Value::String(id)) = meta.and_then(|m| m.get("id")) {
            element.push_attribute(("id", id.as_str()));
        }
        let extensions = meta.and_then(|m| m.get("extension"));

        match extensions {
            Some(extensions) => {
                writer.write_event(Event::Start(element))?;
                let schema = self.registry().find_schema(EXTENSION);
                let items: Vec<&Value> = match extensions {
                    Value::Array(items) => items.iter().collect(),
                    single => vec![single],
                };
                for extension in items {
                    match extension.as_object() {
                        Some(object) => {
                            self.write_complex(writer, "extension", object, schema.as_deref())?
                        }
                        None => self.write_generic(writer, "extension", extension, None)?,
                    }
                }
                writer.write_event(Event::End(BytesEnd::new(name)))?;
            }
            None if has_value || meta.is_some() => {
                writer.write_event(Event::Empty(element))?;
            }
            None => {}
        }
        Ok(())
    }

    /// Content the schema does not describe: objects become elements, scalars `value` attributes.
    fn write_generic(
        &self,
        writer: &mut XmlWriter,
        name: &str,
        value: &Value,
        meta: Option<&Value>,
    ) -> Result<()> {
        match value {
            Value::Array(items) => {
                let metas = meta.and_then(Value::as_array);
                for (index, item) in items.iter().enumerate() {
                    self.write_generic(writer, name, item, metas.and_then(|m| m.get(index)))?;
                }
            }
            Value::Object(object) if object.contains_key("resourceType") => {
                writer.write_event(Event::Start(BytesStart::new(name)))?;
                self.write_resource(writer, object, false)?;
                writer.write_event(Event::End(BytesEnd::new(name)))?;
            }
            Value::Object(object) => self.write_complex(writer, name, object, None)?,
            Value::Null => {
                if meta.is_some() {
                    self.write_primitive(writer, name, value, meta)?;
                }
            }
            primitive => self.write_primitive(writer, name, primitive, meta)?,
        }
        Ok(())
    }
}

impl WireCodec for XmlCodec {
    fn format(&self) -> WireFormat {
        WireFormat::Xml
    }

    fn decode(&self, input: &str) -> Result<Instance> {
        let value = self.to_json_value(input)?;
        self.json.decode_value(&value)
    }

    fn encode(&self, instance: &Instance) -> Result<String> {
        let value = self.json.encode_value(instance)?;
        self.from_json_value(&value)
    }
}

fn is_extension_element(name: &str) -> bool {
    matches!(name, "extension" | "modifierExtension")
}

fn write_xhtml(writer: &mut XmlWriter, value: &Value) -> Result<()> {
    let Some(div) = value.as_str() else {
        return Ok(());
    };
    let div = if div.contains(XHTML_NS) {
        div.to_string()
    } else {
        div.replacen("<div", &format!("<div xmlns=\"{XHTML_NS}\""), 1)
    };
    writer.write_event(Event::Text(BytesText::from_escaped(div)))?;
    Ok(())
}

fn primitive_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn parse_typed(shape: PrimitiveShape, type_code: &str, raw: &str, path: &str) -> Result<Value> {
    let parsed = match shape {
        PrimitiveShape::Boolean => match raw {
            "true" => Some(Value::Bool(true)),
            "false" => Some(Value::Bool(false)),
            _ => None,
        },
        PrimitiveShape::Integer => raw.parse::<i64>().ok().map(Value::from),
        PrimitiveShape::Decimal => raw.parse::<Number>().ok().map(Value::Number),
        PrimitiveShape::Text => Some(Value::from(raw)),
    };
    parsed.ok_or_else(|| {
        FhirModelError::malformed(path, format!("'{raw}' is not a valid {type_code}"))
    })
}

/// Best-effort value of an element without schema information.
fn read_generic(source: &str, node: &Node) -> (Value, Option<Value>) {
    if node.tag_name().namespace() == Some(XHTML_NS) {
        return (Value::from(&source[node.range()]), None);
    }

    if let Some(raw) = node.attribute("value") {
        let mut meta = Map::new();
        if let Some(id) = node.attribute("id") {
            meta.insert("id".to_string(), Value::from(id));
        }
        let extensions: Vec<Value> = node
            .children()
            .filter(|c| c.is_element() && c.tag_name().name() == "extension")
            .map(|c| read_generic(source, &c).0)
            .collect();
        if !extensions.is_empty() {
            meta.insert("extension".to_string(), Value::Array(extensions));
        }
        let meta = (!meta.is_empty()).then_some(Value::Object(meta));
        return (guess_primitive(raw), meta);
    }

    if let Some(resource) = node.children().find(|c| {
        c.is_element() && c.tag_name().name().starts_with(|ch: char| ch.is_ascii_uppercase())
    }) {
        let mut object = Map::new();
        object.insert("resourceType".to_string(), Value::from(resource.tag_name().name()));
        read_generic_children(source, &resource, &mut object);
        return (Value::Object(object), None);
    }

    let mut object = Map::new();
    read_generic_children(source, node, &mut object);
    (Value::Object(object), None)
}

fn read_generic_children(source: &str, node: &Node, object: &mut Map<String, Value>) {
    for attribute in ["id", "url"] {
        if let Some(value) = node.attribute(attribute) {
            object.insert(attribute.to_string(), Value::from(value));
        }
    }
    let mut collected: IndexMap<String, Collected> = IndexMap::new();
    for child in node.children().filter(Node::is_element) {
        let (value, meta) = read_generic(source, &child);
        collected
            .entry(child.tag_name().name().to_string())
            .or_default()
            .push(value, meta);
    }
    for (name, entry) in collected {
        entry.insert_into(object, &name);
    }
}

fn guess_primitive(raw: &str) -> Value {
    match raw {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => match raw.parse::<i64>() {
            Ok(int) => Value::from(int),
            Err(_) => Value::from(raw),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_typed_primitives_follow_schema() {
        let xml = r#"<Coverage xmlns="http://hl7.org/fhir">
            <status value="active"/>
            <subscriberId value="12345"/>
            <order value="2"/>
        </Coverage>"#;
        let value = XmlCodec::r4().to_json_value(xml).unwrap();
        assert_eq!(value["subscriberId"], json!("12345"));
        assert_eq!(value["order"], json!(2));
    }

    #[test]
    fn test_rejects_foreign_namespace() {
        let err = XmlCodec::r4()
            .to_json_value(r#"<Coverage xmlns="urn:other"/>"#)
            .unwrap_err();
        assert!(matches!(err, FhirModelError::MalformedWireFormat { .. }));
    }

    #[test]
    fn test_bad_boolean_reports_path() {
        let xml = r#"<Coverage xmlns="http://hl7.org/fhir"><subrogation value="maybe"/></Coverage>"#;
        let err = XmlCodec::r4().to_json_value(xml).unwrap_err();
        assert_eq!(err.path(), Some("Coverage.subrogation"));
    }

    #[test]
    fn test_extension_url_is_an_attribute() {
        let value = json!({
            "resourceType": "Flag",
            "status": "active",
            "_status": {"extension": [{"url": "http://example.org/why", "valueString": "because"}]}
        });
        let xml = XmlCodec::r4().from_json_value(&value).unwrap();
        assert!(xml.contains(r#"<extension url="http://example.org/why">"#));
        assert!(xml.contains(r#"<valueString value="because"/>"#));
        assert_eq!(XmlCodec::r4().to_json_value(&xml).unwrap(), value);
    }
}
