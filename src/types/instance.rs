use indexmap::IndexMap;
use serde_json::{Map, Number, Value};

/// Storage slot of an instance: the field's storage name plus, for choice fields, the
/// concrete type code of the populated alternative.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SlotKey {
    pub field: String,
    pub choice_type: Option<String>,
}

impl SlotKey {
    pub fn field(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            choice_type: None,
        }
    }

    pub fn choice(field: impl Into<String>, type_code: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            choice_type: Some(type_code.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Boolean(bool),
    Integer(i64),
    Decimal(Number),
    String(String),
    Complex(Box<Instance>),
    Resource(Box<Instance>),
}

impl FieldValue {
    pub fn resource(instance: Instance) -> Self {
        FieldValue::Resource(Box::new(instance))
    }

    pub fn decimal(value: f64) -> Option<Self> {
        Number::from_f64(value).map(FieldValue::Decimal)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_instance(&self) -> Option<&Instance> {
        match self {
            FieldValue::Complex(instance) | FieldValue::Resource(instance) => Some(instance),
            _ => None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            FieldValue::Boolean(_) => "boolean",
            FieldValue::Integer(_) => "integer",
            FieldValue::Decimal(_) => "decimal",
            FieldValue::String(_) => "string",
            FieldValue::Complex(_) => "complex",
            FieldValue::Resource(_) => "resource",
        }
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Boolean(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        FieldValue::Integer(value.into())
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::String(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::String(value)
    }
}

impl From<Instance> for FieldValue {
    fn from(value: Instance) -> Self {
        FieldValue::Complex(Box::new(value))
    }
}

/// In-memory object graph of a resource or one of its nested structures.
///
/// Values are addressed by storage name, so `Coverage.class` lives under `local_class`.
/// Wire keys the schema does not know are kept verbatim in `unrecognized`, and JSON
/// `_field` primitive metadata is kept in `primitive_meta` keyed by the wire name.
/// Positions where a wire array held `null` beside metadata are kept in `value_gaps`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Instance {
    type_name: String,
    slots: IndexMap<SlotKey, Vec<FieldValue>>,
    value_gaps: IndexMap<SlotKey, Vec<usize>>,
    primitive_meta: Map<String, Value>,
    unrecognized: Map<String, Value>,
}

impl Instance {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            ..Self::default()
        }
    }

    /// A `Reference` datatype pointing at `target` (`Patient/1`, `#contained-id`, ...).
    pub fn reference(target: impl Into<String>) -> Self {
        Self::new("Reference").with("reference", target.into())
    }

    pub fn coding(system: impl Into<String>, code: impl Into<String>) -> Self {
        Self::new("Coding")
            .with("system", system.into())
            .with("code", code.into())
    }

    pub fn codeable_concept(system: impl Into<String>, code: impl Into<String>) -> Self {
        Self::new("CodeableConcept").with("coding", Self::coding(system, code))
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Replace every value of a field with a single one.
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<FieldValue>) {
        let key = SlotKey::field(field);
        self.value_gaps.shift_remove(&key);
        self.slots.insert(key, vec![value.into()]);
    }

    /// Append a value to a (repeating) field.
    pub fn push(&mut self, field: impl Into<String>, value: impl Into<FieldValue>) {
        self.slots
            .entry(SlotKey::field(field))
            .or_default()
            .push(value.into());
    }

    /// Store a value in one alternative of a choice field. Other alternatives are left alone,
    /// so an instance can hold conflicting alternatives until it is validated.
    pub fn set_choice(
        &mut self,
        field: impl Into<String>,
        type_code: impl Into<String>,
        value: impl Into<FieldValue>,
    ) {
        let key = SlotKey::choice(field, type_code);
        self.value_gaps.shift_remove(&key);
        self.slots.insert(key, vec![value.into()]);
    }

    pub fn push_choice(
        &mut self,
        field: impl Into<String>,
        type_code: impl Into<String>,
        value: impl Into<FieldValue>,
    ) {
        self.slots
            .entry(SlotKey::choice(field, type_code))
            .or_default()
            .push(value.into());
    }

    pub fn with(mut self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.push(field, value);
        self
    }

    pub fn with_choice(
        mut self,
        field: impl Into<String>,
        type_code: impl Into<String>,
        value: impl Into<FieldValue>,
    ) -> Self {
        self.push_choice(field, type_code, value);
        self
    }

    pub fn get(&self, field: &str) -> &[FieldValue] {
        self.slots
            .iter()
            .find(|(key, _)| key.field == field && key.choice_type.is_none())
            .map(|(_, values)| values.as_slice())
            .unwrap_or(&[])
    }

    pub fn first(&self, field: &str) -> Option<&FieldValue> {
        self.get(field).first()
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.first(field).and_then(FieldValue::as_str)
    }

    /// First populated alternative of a choice field.
    pub fn choice(&self, field: &str) -> Option<(&str, &[FieldValue])> {
        self.choice_alternatives(field).into_iter().next()
    }

    pub fn choice_alternatives(&self, field: &str) -> Vec<(&str, &[FieldValue])> {
        self.slots
            .iter()
            .filter(|(key, values)| key.field == field && !values.is_empty())
            .filter_map(|(key, values)| {
                key.choice_type
                    .as_deref()
                    .map(|type_code| (type_code, values.as_slice()))
            })
            .collect()
    }

    /// Remove a field together with every choice alternative stored under it.
    pub fn remove(&mut self, field: &str) -> Vec<FieldValue> {
        let keys: Vec<SlotKey> = self
            .slots
            .keys()
            .filter(|key| key.field == field)
            .cloned()
            .collect();
        self.value_gaps.retain(|key, _| key.field != field);
        keys.into_iter()
            .filter_map(|key| self.slots.shift_remove(&key))
            .flatten()
            .collect()
    }

    pub fn slots(&self) -> impl Iterator<Item = (&SlotKey, &[FieldValue])> {
        self.slots
            .iter()
            .map(|(key, values)| (key, values.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.slots.values().all(Vec::is_empty)
            && self.primitive_meta.is_empty()
            && self.unrecognized.is_empty()
    }

    pub fn unrecognized(&self) -> &Map<String, Value> {
        &self.unrecognized
    }

    pub fn unrecognized_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.unrecognized
    }

    /// Metadata (`id`, `extension`) attached to the primitive stored under `wire_name`.
    pub fn primitive_meta(&self, wire_name: &str) -> Option<&Value> {
        self.primitive_meta.get(wire_name)
    }

    pub fn set_primitive_meta(&mut self, wire_name: impl Into<String>, meta: Value) {
        self.primitive_meta.insert(wire_name.into(), meta);
    }

    pub fn primitive_meta_entries(&self) -> &Map<String, Value> {
        &self.primitive_meta
    }

    /// Wire array positions of `key` that held `null`, in ascending order.
    pub fn value_gaps(&self, key: &SlotKey) -> &[usize] {
        self.value_gaps.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn set_value_gaps(&mut self, key: SlotKey, mut gaps: Vec<usize>) {
        if gaps.is_empty() {
            self.value_gaps.shift_remove(&key);
        } else {
            gaps.sort_unstable();
            gaps.dedup();
            self.value_gaps.insert(key, gaps);
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.get_str("id")
    }
}
