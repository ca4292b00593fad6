//! Type registry with precomputed hierarchy closures.

use crate::error::{MetaError, MetaResult};
use crate::key::TypeId;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};

/// Metadata for one registered type.
#[derive(Debug, Clone)]
pub struct TypeInfo {
    /// Human-readable type name.
    pub name: String,
    /// Storage table carrying this type's rows.
    pub table: String,
    /// The type's full supertype/super-interface closure (excluding itself).
    pub closure: HashSet<TypeId>,
}

/// Registry of persisted types and their hierarchy closures.
///
/// The mapping layer registers each type once at startup with the complete,
/// already-flattened set of its supertypes and super-interfaces. Hierarchy
/// questions are then answered by set membership; the lock tracker relies on
/// [`TypeRegistry::related`] for hierarchical mutual exclusion in both
/// directions.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    types: RwLock<HashMap<TypeId, TypeInfo>>,
}

impl TypeRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a type with its flattened supertype closure.
    ///
    /// # Errors
    ///
    /// Fails if the type is already registered or a closure member is not.
    /// Supertypes must therefore be registered leaves-last, roots-first.
    pub fn register(
        &self,
        type_id: TypeId,
        name: impl Into<String>,
        supertypes: impl IntoIterator<Item = TypeId>,
    ) -> MetaResult<()> {
        let mut types = self.types.write();
        if types.contains_key(&type_id) {
            return Err(MetaError::DuplicateType { type_id });
        }

        let mut closure = HashSet::new();
        for supertype in supertypes {
            if !types.contains_key(&supertype) {
                return Err(MetaError::UnknownSupertype { type_id, supertype });
            }
            // Transitive members of the supertype's own closure come along.
            closure.insert(supertype);
            if let Some(info) = types.get(&supertype) {
                closure.extend(info.closure.iter().copied());
            }
        }

        let name = name.into();
        let table = format!("obj_{}", name.to_lowercase());
        types.insert(
            type_id,
            TypeInfo {
                name,
                table,
                closure,
            },
        );
        Ok(())
    }

    /// Returns the type's supertype closure.
    pub fn closure(&self, type_id: TypeId) -> MetaResult<HashSet<TypeId>> {
        self.types
            .read()
            .get(&type_id)
            .map(|info| info.closure.clone())
            .ok_or(MetaError::UnknownType { type_id })
    }

    /// Returns the type and every registered subtype of it, itself included.
    pub fn subtree(&self, type_id: TypeId) -> MetaResult<Vec<TypeId>> {
        let types = self.types.read();
        if !types.contains_key(&type_id) {
            return Err(MetaError::UnknownType { type_id });
        }
        let mut out: Vec<TypeId> = types
            .iter()
            .filter(|(id, info)| **id == type_id || info.closure.contains(&type_id))
            .map(|(id, _)| *id)
            .collect();
        out.sort();
        Ok(out)
    }

    /// True iff the two types are hierarchy-related in either direction.
    pub fn related(&self, a: TypeId, b: TypeId) -> MetaResult<bool> {
        if a == b {
            return Ok(true);
        }
        let types = self.types.read();
        let info_a = types.get(&a).ok_or(MetaError::UnknownType { type_id: a })?;
        let info_b = types.get(&b).ok_or(MetaError::UnknownType { type_id: b })?;
        Ok(info_a.closure.contains(&b) || info_b.closure.contains(&a))
    }

    /// Returns the storage table of a type.
    pub fn table_of(&self, type_id: TypeId) -> MetaResult<String> {
        self.types
            .read()
            .get(&type_id)
            .map(|info| info.table.clone())
            .ok_or(MetaError::UnknownType { type_id })
    }

    /// Returns the name of a type.
    pub fn name_of(&self, type_id: TypeId) -> MetaResult<String> {
        self.types
            .read()
            .get(&type_id)
            .map(|info| info.name.clone())
            .ok_or(MetaError::UnknownType { type_id })
    }

    /// Returns all registered type ids.
    #[must_use]
    pub fn type_ids(&self) -> Vec<TypeId> {
        let mut ids: Vec<TypeId> = self.types.read().keys().copied().collect();
        ids.sort();
        ids
    }
}
