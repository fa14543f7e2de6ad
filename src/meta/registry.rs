use std::collections::BTreeMap;
use std::sync::RwLock;

use crate::core::{DbError, Result};

use super::description::{TypeDescription, TypeId};
use super::entity::Entity;

/// Metadata provider: the set of persistent types known to a database.
///
/// Descriptions are `'static` (each [`Entity`] owns its description), so the
/// registry only stores references keyed by the stable type id.
#[derive(Default)]
pub struct TypeRegistry {
    types: RwLock<BTreeMap<TypeId, &'static TypeDescription>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<E: Entity>(&self) -> Result<()> {
        self.register_description(E::description())
    }

    pub fn register_description(&self, description: &'static TypeDescription) -> Result<()> {
        description.validate()?;
        let mut types = self.types.write()?;
        if let Some(existing) = types.get(&description.type_id) {
            if existing.type_name != description.type_name {
                return Err(DbError::Configuration(format!(
                    "Type id {} is already used by '{}'",
                    description.type_id, existing.type_name
                )));
            }
        }
        types.insert(description.type_id, description);
        Ok(())
    }

    pub fn get(&self, type_id: TypeId) -> Result<&'static TypeDescription> {
        self.types
            .read()?
            .get(&type_id)
            .copied()
            .ok_or_else(|| DbError::Configuration(format!("Type id {} is not registered", type_id)))
    }

    pub fn find_by_name(&self, type_name: &str) -> Result<Option<&'static TypeDescription>> {
        Ok(self
            .types
            .read()?
            .values()
            .copied()
            .find(|d| d.type_name == type_name))
    }

    /// Registered descriptions ordered by type id.
    pub fn all(&self) -> Result<Vec<&'static TypeDescription>> {
        Ok(self.types.read()?.values().copied().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DataType;
    use crate::meta::PropertyDescription;
    use std::sync::OnceLock;

    fn desc(type_id: TypeId, name: &str) -> TypeDescription {
        TypeDescription::table(name, name.to_lowercase(), type_id, 1)
            .field(PropertyDescription::new("id", DataType::Int64).primary_key())
            .field(PropertyDescription::new("created", DataType::DateTime).created())
            .field(PropertyDescription::new("changed", DataType::DateTime).changed())
    }

    #[test]
    fn test_register_and_lookup() {
        static A: OnceLock<TypeDescription> = OnceLock::new();
        let registry = TypeRegistry::new();
        registry
            .register_description(A.get_or_init(|| desc(7, "Alpha")))
            .unwrap();

        assert_eq!(registry.get(7).unwrap().type_name, "Alpha");
        assert!(registry.find_by_name("Alpha").unwrap().is_some());
        assert!(registry.get(8).is_err());
    }

    #[test]
    fn test_duplicate_type_id_rejected() {
        static A: OnceLock<TypeDescription> = OnceLock::new();
        static B: OnceLock<TypeDescription> = OnceLock::new();
        let registry = TypeRegistry::new();
        registry
            .register_description(A.get_or_init(|| desc(9, "Alpha")))
            .unwrap();
        let err = registry
            .register_description(B.get_or_init(|| desc(9, "Beta")))
            .unwrap_err();
        assert!(matches!(err, DbError::Configuration(_)));
    }
}
