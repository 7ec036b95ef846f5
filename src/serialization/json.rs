//! Schema-driven FHIR JSON.

use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, warn};

use super::{WireCodec, WireFormat};
use crate::core::CodecConfig;
use crate::error::{FhirModelError, Result};
use crate::registry::SchemaRegistry;
use crate::types::datatype::{self, PrimitiveShape, TypeCategory};
use crate::types::{FieldSpec, FieldValue, Instance, ResourceSchema, SlotKey, choice_wire_name};

const RESOURCE_TYPE: &str = "resourceType";

#[derive(Debug, Clone)]
pub struct JsonCodec {
    registry: Arc<SchemaRegistry>,
    config: CodecConfig,
}

impl JsonCodec {
    pub fn new(registry: Arc<SchemaRegistry>) -> Self {
        Self {
            registry,
            config: CodecConfig::default(),
        }
    }

    pub fn with_config(mut self, config: CodecConfig) -> Self {
        self.config = config;
        self
    }

    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    /// Decode an already-parsed JSON document.
    pub fn decode_value(&self, value: &Value) -> Result<Instance> {
        let object = value
            .as_object()
            .ok_or_else(|| FhirModelError::malformed("$", "expected a JSON object"))?;
        let resource_type = resource_type_of(object, "$")?;
        let schema = self
            .registry
            .find_schema(resource_type)
            .filter(|schema| schema.is_resource())
            .ok_or_else(|| FhirModelError::unknown_resource_type(resource_type))?;
        self.decode_object(object, &schema, resource_type)
    }

    /// Encode to a JSON document with `resourceType` first and fields in schema order.
    pub fn encode_value(&self, instance: &Instance) -> Result<Value> {
        let schema = self
            .registry
            .find_schema(instance.type_name())
            .filter(|schema| schema.is_resource())
            .ok_or_else(|| FhirModelError::unknown_resource_type(instance.type_name()))?;

        let mut object = Map::new();
        object.insert(RESOURCE_TYPE.to_string(), Value::from(instance.type_name()));
        self.encode_members(instance, &schema, &mut object)?;
        Ok(Value::Object(object))
    }

    fn decode_object(
        &self,
        object: &Map<String, Value>,
        schema: &ResourceSchema,
        path: &str,
    ) -> Result<Instance> {
        let mut instance = Instance::new(schema.name.as_str());

        for (key, value) in object {
            if key == RESOURCE_TYPE && schema.is_resource() {
                continue;
            }
            let location = format!("{path}.{key}");

            if let Some(name) = key.strip_prefix('_') {
                if self.is_primitive_field(schema, name) {
                    instance.set_primitive_meta(name, value.clone());
                } else {
                    self.keep_unrecognized(&mut instance, key, value, &location)?;
                }
                continue;
            }

            if let Some(field) = schema.field(key).filter(|field| !field.is_choice()) {
                self.decode_field(&mut instance, schema, field, None, value, &location)?;
                continue;
            }

            match self.registry.resolve_choice_field(&schema.name, key) {
                Ok(resolution) => {
                    let field = schema.field(&resolution.group).ok_or_else(|| {
                        FhirModelError::UnknownField {
                            schema: schema.name.clone(),
                            field: resolution.group.clone(),
                        }
                    })?;
                    self.decode_field(
                        &mut instance,
                        schema,
                        field,
                        Some(&resolution.type_code),
                        value,
                        &location,
                    )?;
                }
                Err(err @ FhirModelError::UnresolvableChoiceField { .. })
                    if self.config.reject_unknown_choice_types =>
                {
                    return Err(err);
                }
                Err(_) => self.keep_unrecognized(&mut instance, key, value, &location)?,
            }
        }

        Ok(instance)
    }

    fn keep_unrecognized(
        &self,
        instance: &mut Instance,
        key: &str,
        value: &Value,
        location: &str,
    ) -> Result<()> {
        if self.config.reject_unknown_elements {
            return Err(FhirModelError::malformed(
                location,
                format!("unknown element '{key}'"),
            ));
        }
        debug!(path = location, "Preserving unrecognized element");
        instance
            .unrecognized_mut()
            .insert(key.to_string(), value.clone());
        Ok(())
    }

    /// `_name` carries primitive metadata only when `name` is a primitive of this schema.
    fn is_primitive_field(&self, schema: &ResourceSchema, name: &str) -> bool {
        match schema.field(name).filter(|field| !field.is_choice()) {
            Some(field) => field.single_type().is_some_and(datatype::is_primitive),
            None => self
                .registry
                .resolve_choice_field(&schema.name, name)
                .is_ok_and(|resolution| datatype::is_primitive(&resolution.type_code)),
        }
    }

    fn decode_field(
        &self,
        instance: &mut Instance,
        owner: &ResourceSchema,
        field: &FieldSpec,
        choice_type: Option<&str>,
        value: &Value,
        location: &str,
    ) -> Result<()> {
        let type_code = choice_type
            .or_else(|| field.single_type())
            .ok_or_else(|| {
                FhirModelError::invalid_schema(format!("{} declares no single type", field.path))
            })?;

        let items: Vec<(String, &Value)> = match value {
            Value::Array(items) => items
                .iter()
                .enumerate()
                .map(|(index, item)| (format!("{location}[{index}]"), item))
                .collect(),
            single => vec![(location.to_string(), single)],
        };

        let mut gaps = Vec::new();
        for (index, (item_path, item)) in items.into_iter().enumerate() {
            if item.is_null() {
                gaps.push(index);
                continue;
            }
            let decoded = self.decode_item(owner, field, type_code, item, &item_path)?;
            match choice_type {
                Some(choice) => instance.push_choice(field.storage_name(), choice, decoded),
                None => instance.push(field.storage_name(), decoded),
            }
        }

        // nulls only hold a position when the array also carries values
        let populated = match value {
            Value::Array(values) => values.len() > gaps.len(),
            _ => false,
        };
        if populated && !gaps.is_empty() {
            instance.set_value_gaps(slot_key(field, choice_type), gaps);
        }
        Ok(())
    }

    fn decode_item(
        &self,
        owner: &ResourceSchema,
        field: &FieldSpec,
        type_code: &str,
        item: &Value,
        path: &str,
    ) -> Result<FieldValue> {
        match datatype::categorize(type_code) {
            TypeCategory::Primitive(shape) => primitive_from_json(shape, type_code, item, path),
            TypeCategory::Resource => {
                let object = item.as_object().ok_or_else(|| {
                    FhirModelError::malformed(path, "expected a resource object")
                })?;
                Ok(FieldValue::resource(self.decode_contained(object, path)?))
            }
            TypeCategory::Backbone | TypeCategory::Complex => {
                let object = item.as_object().ok_or_else(|| {
                    FhirModelError::malformed(
                        path,
                        format!("expected an object for {type_code}, found {}", json_kind(item)),
                    )
                })?;
                let instance = match self.registry.nested_schema(owner, field, type_code) {
                    Some(nested) => self.decode_object(object, &nested, path)?,
                    None => {
                        warn!(type_code, path, "No schema registered; keeping content opaque");
                        opaque(type_code, object)
                    }
                };
                Ok(FieldValue::from(instance))
            }
        }
    }

    fn decode_contained(&self, object: &Map<String, Value>, path: &str) -> Result<Instance> {
        let resource_type = resource_type_of(object, path)?;
        match self
            .registry
            .find_schema(resource_type)
            .filter(|schema| schema.is_resource())
        {
            Some(schema) => self.decode_object(object, &schema, path),
            None => {
                warn!(
                    resource_type,
                    path, "Contained resource type is not registered; keeping content opaque"
                );
                let mut members = object.clone();
                members.remove(RESOURCE_TYPE);
                Ok(opaque(resource_type, &members))
            }
        }
    }

    fn encode_members(
        &self,
        instance: &Instance,
        schema: &ResourceSchema,
        object: &mut Map<String, Value>,
    ) -> Result<()> {
        check_declared_slots(instance, schema)?;

        for field in &schema.fields {
            if field.is_choice() {
                for (type_code, values) in instance.choice_alternatives(field.storage_name()) {
                    let wire = choice_wire_name(field.base_name(), type_code);
                    self.encode_slot(instance, schema, field, type_code, &wire, values, object)?;
                }
                for (wire, _) in field.choice_wire_names() {
                    if !object.contains_key(&wire) {
                        if let Some(meta) = instance.primitive_meta(&wire) {
                            object.insert(format!("_{wire}"), meta.clone());
                        }
                    }
                }
            } else if let Some(type_code) = field.single_type() {
                let values = instance.get(field.storage_name());
                self.encode_slot(instance, schema, field, type_code, &field.name, values, object)?;
            }
        }

        for (key, value) in instance.unrecognized() {
            if !object.contains_key(key) {
                object.insert(key.clone(), value.clone());
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn encode_slot(
        &self,
        instance: &Instance,
        owner: &ResourceSchema,
        field: &FieldSpec,
        type_code: &str,
        wire: &str,
        values: &[FieldValue],
        object: &mut Map<String, Value>,
    ) -> Result<()> {
        let meta = instance.primitive_meta(wire);
        if !values.is_empty() {
            let encoded = values
                .iter()
                .map(|value| self.encode_item(owner, field, type_code, value))
                .collect::<Result<Vec<_>>>()?;
            let gaps = instance.value_gaps(&slot_key(field, field.is_choice().then_some(type_code)));
            let mut encoded = restore_gaps(encoded, gaps);
            // entries carried only by metadata trail the values
            if let Some(Value::Array(metas)) = meta {
                if metas.len() > encoded.len() {
                    encoded.resize(metas.len(), Value::Null);
                }
            }
            let value = if field.is_repeating() || encoded.len() > 1 {
                Value::Array(encoded)
            } else {
                encoded.swap_remove(0)
            };
            object.insert(wire.to_string(), value);
        }
        if let Some(meta) = meta {
            object.insert(format!("_{wire}"), meta.clone());
        }
        Ok(())
    }

    fn encode_item(
        &self,
        owner: &ResourceSchema,
        field: &FieldSpec,
        type_code: &str,
        value: &FieldValue,
    ) -> Result<Value> {
        Ok(match value {
            FieldValue::Boolean(b) => Value::Bool(*b),
            FieldValue::Integer(i) => Value::from(*i),
            FieldValue::Decimal(n) => Value::Number(n.clone()),
            FieldValue::String(s) => Value::String(s.clone()),
            FieldValue::Complex(inner) => {
                let mut object = Map::new();
                match self.registry.nested_schema(owner, field, type_code) {
                    Some(nested) => self.encode_members(inner, &nested, &mut object)?,
                    None => object.extend(inner.unrecognized().clone()),
                }
                Value::Object(object)
            }
            FieldValue::Resource(inner) => {
                let mut object = Map::new();
                object.insert(RESOURCE_TYPE.to_string(), Value::from(inner.type_name()));
                match self
                    .registry
                    .find_schema(inner.type_name())
                    .filter(|schema| schema.is_resource())
                {
                    Some(schema) => self.encode_members(inner, &schema, &mut object)?,
                    None => object.extend(inner.unrecognized().clone()),
                }
                Value::Object(object)
            }
        })
    }
}

impl WireCodec for JsonCodec {
    fn format(&self) -> WireFormat {
        WireFormat::Json
    }

    fn decode(&self, input: &str) -> Result<Instance> {
        let value: Value = serde_json::from_str(input).map_err(|e| {
            FhirModelError::malformed(format!("line {}, column {}", e.line(), e.column()), e.to_string())
        })?;
        self.decode_value(&value)
    }

    fn encode(&self, instance: &Instance) -> Result<String> {
        let value = self.encode_value(instance)?;
        let text = if self.config.pretty {
            serde_json::to_string_pretty(&value)?
        } else {
            serde_json::to_string(&value)?
        };
        Ok(text)
    }
}

fn resource_type_of<'a>(object: &'a Map<String, Value>, path: &str) -> Result<&'a str> {
    object
        .get(RESOURCE_TYPE)
        .and_then(Value::as_str)
        .ok_or_else(|| FhirModelError::malformed(path, "missing resourceType"))
}

/// Content of an unregistered type, kept verbatim.
fn opaque(type_name: &str, object: &Map<String, Value>) -> Instance {
    let mut instance = Instance::new(type_name);
    instance.unrecognized_mut().extend(object.clone());
    instance
}

fn slot_key(field: &FieldSpec, choice_type: Option<&str>) -> SlotKey {
    match choice_type {
        Some(type_code) => SlotKey::choice(field.storage_name(), type_code),
        None => SlotKey::field(field.storage_name()),
    }
}

/// Put `null` back at the wire positions recorded when the array was decoded.
fn restore_gaps(values: Vec<Value>, gaps: &[usize]) -> Vec<Value> {
    if gaps.is_empty() {
        return values;
    }
    let mut restored = Vec::with_capacity(values.len() + gaps.len());
    let mut values = values.into_iter().peekable();
    loop {
        if gaps.contains(&restored.len()) {
            restored.push(Value::Null);
        } else if let Some(value) = values.next() {
            restored.push(value);
        } else {
            break;
        }
    }
    restored
}

/// Every populated slot must map onto a declared field (and, for choices, a declared type).
fn check_declared_slots(instance: &Instance, schema: &ResourceSchema) -> Result<()> {
    for (key, values) in instance.slots() {
        if values.is_empty() {
            continue;
        }
        let field = schema.field_by_storage_name(&key.field).ok_or_else(|| {
            FhirModelError::UnknownField {
                schema: schema.name.clone(),
                field: key.field.clone(),
            }
        })?;
        match (key.choice_type.as_deref(), field.is_choice()) {
            (Some(type_code), true) if !field.declares_type(type_code) => {
                return Err(FhirModelError::UnresolvableChoiceField {
                    group: field.path.clone(),
                    field_name: choice_wire_name(field.base_name(), type_code),
                });
            }
            (None, true) => {
                return Err(FhirModelError::UnresolvableChoiceField {
                    group: field.path.clone(),
                    field_name: field.base_name().to_string(),
                });
            }
            (Some(type_code), false) => {
                return Err(FhirModelError::UnknownField {
                    schema: schema.name.clone(),
                    field: choice_wire_name(&key.field, type_code),
                });
            }
            _ => {}
        }
    }
    Ok(())
}

fn primitive_from_json(
    shape: PrimitiveShape,
    type_code: &str,
    item: &Value,
    path: &str,
) -> Result<FieldValue> {
    let value = match (shape, item) {
        (PrimitiveShape::Boolean, Value::Bool(b)) => Some(FieldValue::Boolean(*b)),
        (PrimitiveShape::Integer, Value::Number(n)) => n.as_i64().map(FieldValue::Integer),
        (PrimitiveShape::Decimal, Value::Number(n)) => Some(FieldValue::Decimal(n.clone())),
        (PrimitiveShape::Text, Value::String(s)) => Some(FieldValue::String(s.clone())),
        _ => None,
    };
    value.ok_or_else(|| {
        FhirModelError::malformed(
            path,
            format!("expected a {type_code} value, found {}", json_kind(item)),
        )
    })
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
