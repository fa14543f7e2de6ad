// ============================================================================
// Type Metadata
// ============================================================================
//
// Declarative storage descriptions of persistent types, the record contract
// the engine works against, and the lightweight projections it produces.
//
// ============================================================================

pub mod description;
pub mod entity;
pub mod info;
pub mod registry;

pub use description::{
    ForeignKeyAction, ForeignKeyTarget, PropertyDescription, SystemField, TypeDescription,
    TypeId, TypeKind,
};
pub use entity::{Entity, RecordState};
pub use info::{ChangeInformation, ChangeKind, FieldChange, ModelInfo};
pub use registry::TypeRegistry;
