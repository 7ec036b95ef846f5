pub mod binding;
pub mod cardinality;
pub mod choice_types;
pub mod datatype;
pub mod field;
pub mod instance;
pub mod schema;

pub use binding::{Binding, BindingStrength};
pub use cardinality::Max;
pub use choice_types::{ChoiceResolution, capitalize_first, choice_wire_name};
pub use datatype::{PrimitiveShape, TypeCategory};
pub use field::FieldSpec;
pub use instance::{FieldValue, Instance, SlotKey};
pub use schema::{ResourceSchema, SchemaKind};
