//! Classification of FHIR type codes as they appear in field declarations.

/// JSON shape a primitive type is carried in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveShape {
    Boolean,
    Integer,
    Decimal,
    Text,
}

/// How a declared type code is represented in an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Primitive(PrimitiveShape),
    /// Anonymous nested structure whose schema is addressed by the field path.
    Backbone,
    /// Any resource, discriminated by its own type name.
    Resource,
    /// Named complex datatype with its own schema.
    Complex,
}

pub const XHTML: &str = "xhtml";
pub const REFERENCE: &str = "Reference";
pub const RESOURCE: &str = "Resource";

pub fn primitive_shape(code: &str) -> Option<PrimitiveShape> {
    let shape = match code {
        "boolean" => PrimitiveShape::Boolean,
        "integer" | "positiveInt" | "unsignedInt" | "integer64" => PrimitiveShape::Integer,
        "decimal" => PrimitiveShape::Decimal,
        "string" | "code" | "id" | "markdown" | "uri" | "url" | "canonical" | "oid" | "uuid"
        | "base64Binary" | "date" | "dateTime" | "instant" | "time" | "xhtml" => {
            PrimitiveShape::Text
        }
        _ => return None,
    };
    Some(shape)
}

pub fn is_primitive(code: &str) -> bool {
    primitive_shape(code).is_some()
}

pub fn categorize(code: &str) -> TypeCategory {
    if let Some(shape) = primitive_shape(code) {
        return TypeCategory::Primitive(shape);
    }
    match code {
        "BackboneElement" | "Element" => TypeCategory::Backbone,
        RESOURCE => TypeCategory::Resource,
        _ => TypeCategory::Complex,
    }
}

/// `Quantity` and its profiles, whose `system`/`code` pair is the coded unit.
pub fn is_quantity(code: &str) -> bool {
    matches!(
        code,
        "Quantity" | "SimpleQuantity" | "MoneyQuantity" | "Duration" | "Age" | "Distance" | "Count"
    )
}

/// Code systems and values only make sense on these types.
pub fn is_bindable(code: &str) -> bool {
    matches!(code, "code" | "string" | "uri" | "Coding" | "CodeableConcept") || is_quantity(code)
}
