//! The schema graph: entities, properties, keys, indexes, foreign keys,
//! and navigations.
//!
//! The model owns every node and is the sole authority on node liveness.
//! Handles given out to callers and conventions are plain ids; a handle is
//! live only while the node behind it still exists and has not been replaced
//! or removed. Removal never frees a node slot: the node is tombstoned so
//! late readers can still inspect its payload, but liveness checks fail.
//!
//! This module performs *structural* changes only. Announcing those changes
//! to conventions is the job of [`ModelOps`](crate::ops::ModelOps), which
//! wraps every mutation here with the matching dispatch call.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::ids::{EntityId, ForeignKeyId, IndexId, KeyId, NavigationId, PropertyId};

/// Annotation values are free-form JSON.
pub type AnnotationValue = serde_json::Value;

/// An entity type node.
#[derive(Debug, Clone, Serialize)]
pub struct EntityNode {
    /// The entity's id.
    pub id: EntityId,
    /// The entity's unique name.
    pub name: String,
    /// The base entity this entity specializes, if any.
    pub base: Option<EntityId>,
    /// Properties declared on this entity, in declaration order.
    pub properties: Vec<PropertyId>,
    /// Candidate keys declared on this entity, in declaration order.
    pub keys: Vec<KeyId>,
    /// The key currently designated as the primary key.
    pub primary_key: Option<KeyId>,
    /// Indexes declared on this entity, in declaration order.
    pub indexes: Vec<IndexId>,
    /// Foreign keys declared on this entity (dependent side).
    pub foreign_keys: Vec<ForeignKeyId>,
    /// Navigations attached to this entity.
    pub navigations: Vec<NavigationId>,
    /// Member names excluded from convention-driven discovery.
    pub ignored_members: BTreeSet<String>,
    /// Annotations attached to this entity.
    pub annotations: BTreeMap<String, AnnotationValue>,
    /// When the entity was created.
    pub created_at: DateTime<Utc>,
    /// When the entity was last structurally changed.
    pub updated_at: DateTime<Utc>,
    /// Monotonic change counter.
    pub version: u64,
    live: bool,
}

impl EntityNode {
    fn new(id: EntityId, name: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            name,
            base: None,
            properties: Vec::new(),
            keys: Vec::new(),
            primary_key: None,
            indexes: Vec::new(),
            foreign_keys: Vec::new(),
            navigations: Vec::new(),
            ignored_members: BTreeSet::new(),
            annotations: BTreeMap::new(),
            created_at: now,
            updated_at: now,
            version: 1,
            live: true,
        }
    }

    /// Returns true if this node has not been removed.
    #[must_use]
    pub const fn is_live(&self) -> bool {
        self.live
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
        self.version += 1;
    }
}

/// A scalar property declared on an entity.
#[derive(Debug, Clone, Serialize)]
pub struct PropertyNode {
    /// The property's id.
    pub id: PropertyId,
    /// The declaring entity.
    pub entity: EntityId,
    /// The property name, unique within the declaring entity.
    pub name: String,
    /// Whether the property admits missing values.
    pub nullable: bool,
    /// The backing field name, if one has been chosen.
    pub field: Option<String>,
    /// Annotations attached to this property.
    pub annotations: BTreeMap<String, AnnotationValue>,
    live: bool,
}

impl PropertyNode {
    /// Returns true if this node has not been removed.
    #[must_use]
    pub const fn is_live(&self) -> bool {
        self.live
    }
}

/// A candidate key declared on an entity.
#[derive(Debug, Clone, Serialize)]
pub struct KeyNode {
    /// The key's id.
    pub id: KeyId,
    /// The declaring entity.
    pub entity: EntityId,
    /// The properties the key covers, in order.
    pub properties: Vec<PropertyId>,
    live: bool,
}

impl KeyNode {
    /// Returns true if this node has not been removed.
    #[must_use]
    pub const fn is_live(&self) -> bool {
        self.live
    }
}

/// An index declared on an entity.
#[derive(Debug, Clone, Serialize)]
pub struct IndexNode {
    /// The index's id.
    pub id: IndexId,
    /// The declaring entity.
    pub entity: EntityId,
    /// The properties the index covers, in order.
    pub properties: Vec<PropertyId>,
    /// Whether indexed values must be unique.
    pub unique: bool,
    /// Annotations attached to this index.
    pub annotations: BTreeMap<String, AnnotationValue>,
    live: bool,
}

impl IndexNode {
    /// Returns true if this node has not been removed.
    #[must_use]
    pub const fn is_live(&self) -> bool {
        self.live
    }
}

/// A foreign key relating a dependent entity to a principal entity.
#[derive(Debug, Clone, Serialize)]
pub struct ForeignKeyNode {
    /// The foreign key's id.
    pub id: ForeignKeyId,
    /// The dependent (declaring) entity.
    pub dependent: EntityId,
    /// The principal (referenced) entity.
    pub principal: EntityId,
    /// The dependent-side properties the foreign key covers.
    pub properties: Vec<PropertyId>,
    /// Whether at most one dependent row may reference a principal row.
    pub unique: bool,
    /// Navigations defined over this foreign key.
    pub navigations: Vec<NavigationId>,
    live: bool,
}

impl ForeignKeyNode {
    /// Returns true if this node has not been removed.
    #[must_use]
    pub const fn is_live(&self) -> bool {
        self.live
    }
}

/// A navigation defined over a foreign key.
#[derive(Debug, Clone, Serialize)]
pub struct NavigationNode {
    /// The navigation's id.
    pub id: NavigationId,
    /// The foreign key the navigation traverses.
    pub foreign_key: ForeignKeyId,
    /// The entity the navigation is declared on.
    pub source: EntityId,
    /// The entity the navigation points at.
    pub target: EntityId,
    /// The navigation name.
    pub name: String,
    live: bool,
}

impl NavigationNode {
    /// Returns true if this node has not been removed.
    #[must_use]
    pub const fn is_live(&self) -> bool {
        self.live
    }
}

/// The schema graph.
///
/// Owns all nodes and tombstones. Mutation methods here change structure
/// only and never run conventions; use [`ModelOps`](crate::ops::ModelOps)
/// for the announced mutation surface.
#[derive(Debug, Default)]
pub struct Model {
    entities: HashMap<EntityId, EntityNode>,
    entity_order: Vec<EntityId>,
    by_name: HashMap<String, EntityId>,
    properties: HashMap<PropertyId, PropertyNode>,
    keys: HashMap<KeyId, KeyNode>,
    indexes: HashMap<IndexId, IndexNode>,
    foreign_keys: HashMap<ForeignKeyId, ForeignKeyNode>,
    navigations: HashMap<NavigationId, NavigationNode>,
    ignored_types: BTreeSet<String>,
}

impl Model {
    /// Creates an empty model.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // --- accessors ---

    /// Looks up an entity node, tombstoned or live.
    #[must_use]
    pub fn entity(&self, id: EntityId) -> Option<&EntityNode> {
        self.entities.get(&id)
    }

    /// Looks up a property node, tombstoned or live.
    #[must_use]
    pub fn property(&self, id: PropertyId) -> Option<&PropertyNode> {
        self.properties.get(&id)
    }

    /// Looks up a key node, tombstoned or live.
    #[must_use]
    pub fn key(&self, id: KeyId) -> Option<&KeyNode> {
        self.keys.get(&id)
    }

    /// Looks up an index node, tombstoned or live.
    #[must_use]
    pub fn index(&self, id: IndexId) -> Option<&IndexNode> {
        self.indexes.get(&id)
    }

    /// Looks up a foreign key node, tombstoned or live.
    #[must_use]
    pub fn foreign_key(&self, id: ForeignKeyId) -> Option<&ForeignKeyNode> {
        self.foreign_keys.get(&id)
    }

    /// Looks up a navigation node, tombstoned or live.
    #[must_use]
    pub fn navigation(&self, id: NavigationId) -> Option<&NavigationNode> {
        self.navigations.get(&id)
    }

    /// Finds a live entity by name.
    #[must_use]
    pub fn find_entity(&self, name: &str) -> Option<EntityId> {
        self.by_name.get(name).copied()
    }

    /// Live entities in creation order.
    pub fn entities(&self) -> impl Iterator<Item = &EntityNode> {
        self.entity_order
            .iter()
            .filter_map(|id| self.entities.get(id))
            .filter(|e| e.live)
    }

    /// Number of live entities.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.entities().count()
    }

    /// Returns true if the given type name has been marked as ignored.
    #[must_use]
    pub fn is_ignored(&self, name: &str) -> bool {
        self.ignored_types.contains(name)
    }

    // --- liveness ---

    /// A handle to an entity is live while the node exists and was not removed.
    #[must_use]
    pub fn entity_is_live(&self, id: EntityId) -> bool {
        self.entities.get(&id).is_some_and(|e| e.live)
    }

    /// A property handle is live only while both the property and its
    /// declaring entity are live.
    #[must_use]
    pub fn property_is_live(&self, id: PropertyId) -> bool {
        self.properties
            .get(&id)
            .is_some_and(|p| p.live && self.entity_is_live(p.entity))
    }

    /// A key handle is live while the key node was not removed.
    #[must_use]
    pub fn key_is_live(&self, id: KeyId) -> bool {
        self.keys.get(&id).is_some_and(|k| k.live)
    }

    /// An index handle is live while the index node was not removed.
    #[must_use]
    pub fn index_is_live(&self, id: IndexId) -> bool {
        self.indexes.get(&id).is_some_and(|i| i.live)
    }

    /// A foreign key handle is live while the node was not removed.
    #[must_use]
    pub fn foreign_key_is_live(&self, id: ForeignKeyId) -> bool {
        self.foreign_keys.get(&id).is_some_and(|fk| fk.live)
    }

    /// A navigation handle is live while the node was not removed.
    #[must_use]
    pub fn navigation_is_live(&self, id: NavigationId) -> bool {
        self.navigations.get(&id).is_some_and(|n| n.live)
    }

    // --- hierarchy ---

    /// The inclusive derived-type closure of an entity: the entity itself,
    /// followed by every live entity that transitively specializes it, in
    /// breadth-first creation order.
    #[must_use]
    pub fn derived_types_inclusive(&self, root: EntityId) -> Vec<EntityId> {
        let mut closure = vec![root];
        let mut cursor = 0;
        while cursor < closure.len() {
            let current = closure[cursor];
            cursor += 1;
            for id in &self.entity_order {
                let Some(node) = self.entities.get(id) else {
                    continue;
                };
                if node.live && node.base == Some(current) {
                    closure.push(*id);
                }
            }
        }
        closure
    }

    // --- entity mutation ---

    /// Inserts a new entity. The caller is responsible for name validation.
    pub fn insert_entity(&mut self, name: impl Into<String>) -> EntityId {
        let name = name.into();
        let id = EntityId::new();
        self.by_name.insert(name.clone(), id);
        self.entities.insert(id, EntityNode::new(id, name));
        self.entity_order.push(id);
        id
    }

    /// Tombstones an entity together with everything attached to it:
    /// properties, keys, indexes, declared and referencing foreign keys,
    /// and navigations.
    pub fn remove_entity(&mut self, id: EntityId) {
        let Some(entity) = self.entities.get_mut(&id) else {
            return;
        };
        if !entity.live {
            return;
        }
        entity.live = false;
        entity.touch();
        let name = entity.name.clone();
        let properties = entity.properties.clone();
        let keys = entity.keys.clone();
        let indexes = entity.indexes.clone();
        let declared = entity.foreign_keys.clone();
        self.by_name.remove(&name);

        for prop in properties {
            if let Some(p) = self.properties.get_mut(&prop) {
                p.live = false;
            }
        }
        for key in keys {
            if let Some(k) = self.keys.get_mut(&key) {
                k.live = false;
            }
        }
        for index in indexes {
            if let Some(i) = self.indexes.get_mut(&index) {
                i.live = false;
            }
        }
        for fk in declared {
            self.remove_foreign_key(fk);
        }
        let referencing: Vec<ForeignKeyId> = self
            .foreign_keys
            .values()
            .filter(|fk| fk.live && fk.principal == id)
            .map(|fk| fk.id)
            .collect();
        for fk in referencing {
            self.remove_foreign_key(fk);
        }
        // Entities deriving from the removed one lose their base link.
        for node in self.entities.values_mut() {
            if node.live && node.base == Some(id) {
                node.base = None;
                node.touch();
            }
        }
    }

    /// Records a type name as ignored.
    pub fn add_ignored_type(&mut self, name: impl Into<String>) {
        self.ignored_types.insert(name.into());
    }

    /// Sets the base entity, returning the previous base.
    pub fn set_base(&mut self, id: EntityId, base: Option<EntityId>) -> Option<EntityId> {
        let entity = self.entities.get_mut(&id)?;
        let previous = entity.base;
        entity.base = base;
        entity.touch();
        previous
    }

    /// Records a member name as ignored on an entity.
    pub fn add_ignored_member(&mut self, id: EntityId, member: impl Into<String>) {
        if let Some(entity) = self.entities.get_mut(&id) {
            entity.ignored_members.insert(member.into());
            entity.touch();
        }
    }

    /// Sets or removes an entity annotation, returning the previous value.
    pub fn set_entity_annotation(
        &mut self,
        id: EntityId,
        name: &str,
        value: Option<AnnotationValue>,
    ) -> Option<AnnotationValue> {
        let entity = self.entities.get_mut(&id)?;
        entity.touch();
        match value {
            Some(value) => entity.annotations.insert(name.to_string(), value),
            None => entity.annotations.remove(name),
        }
    }

    // --- property mutation ---

    /// Inserts a property on an entity. Caller validates the name.
    pub fn insert_property(
        &mut self,
        entity: EntityId,
        name: impl Into<String>,
        nullable: bool,
    ) -> PropertyId {
        let id = PropertyId::new();
        self.properties.insert(
            id,
            PropertyNode {
                id,
                entity,
                name: name.into(),
                nullable,
                field: None,
                annotations: BTreeMap::new(),
                live: true,
            },
        );
        if let Some(node) = self.entities.get_mut(&entity) {
            node.properties.push(id);
            node.touch();
        }
        id
    }

    /// Sets nullability, returning the previous value.
    pub fn set_property_nullable(&mut self, id: PropertyId, nullable: bool) -> Option<bool> {
        let property = self.properties.get_mut(&id)?;
        let previous = property.nullable;
        property.nullable = nullable;
        Some(previous)
    }

    /// Sets the backing field, returning the previous value.
    pub fn set_property_field(
        &mut self,
        id: PropertyId,
        field: Option<String>,
    ) -> Option<Option<String>> {
        let property = self.properties.get_mut(&id)?;
        let previous = property.field.take();
        property.field = field;
        Some(previous)
    }

    /// Sets or removes a property annotation, returning the previous value.
    pub fn set_property_annotation(
        &mut self,
        id: PropertyId,
        name: &str,
        value: Option<AnnotationValue>,
    ) -> Option<AnnotationValue> {
        let property = self.properties.get_mut(&id)?;
        match value {
            Some(value) => property.annotations.insert(name.to_string(), value),
            None => property.annotations.remove(name),
        }
    }

    // --- key mutation ---

    /// Inserts a candidate key over the given properties.
    pub fn insert_key(&mut self, entity: EntityId, properties: Vec<PropertyId>) -> KeyId {
        let id = KeyId::new();
        self.keys.insert(
            id,
            KeyNode {
                id,
                entity,
                properties,
                live: true,
            },
        );
        if let Some(node) = self.entities.get_mut(&entity) {
            node.keys.push(id);
            node.touch();
        }
        id
    }

    /// Tombstones a key and clears the primary-key slot if it pointed here.
    pub fn remove_key(&mut self, id: KeyId) {
        let Some(key) = self.keys.get_mut(&id) else {
            return;
        };
        if !key.live {
            return;
        }
        key.live = false;
        let entity = key.entity;
        if let Some(node) = self.entities.get_mut(&entity) {
            node.keys.retain(|k| *k != id);
            if node.primary_key == Some(id) {
                node.primary_key = None;
            }
            node.touch();
        }
    }

    /// Designates a key as the primary key, returning the previous one.
    pub fn set_primary_key(&mut self, entity: EntityId, key: Option<KeyId>) -> Option<KeyId> {
        let node = self.entities.get_mut(&entity)?;
        let previous = node.primary_key;
        node.primary_key = key;
        node.touch();
        previous
    }

    // --- index mutation ---

    /// Inserts an index over the given properties.
    pub fn insert_index(
        &mut self,
        entity: EntityId,
        properties: Vec<PropertyId>,
        unique: bool,
    ) -> IndexId {
        let id = IndexId::new();
        self.indexes.insert(
            id,
            IndexNode {
                id,
                entity,
                properties,
                unique,
                annotations: BTreeMap::new(),
                live: true,
            },
        );
        if let Some(node) = self.entities.get_mut(&entity) {
            node.indexes.push(id);
            node.touch();
        }
        id
    }

    /// Tombstones an index.
    pub fn remove_index(&mut self, id: IndexId) {
        let Some(index) = self.indexes.get_mut(&id) else {
            return;
        };
        if !index.live {
            return;
        }
        index.live = false;
        let entity = index.entity;
        if let Some(node) = self.entities.get_mut(&entity) {
            node.indexes.retain(|i| *i != id);
            node.touch();
        }
    }

    /// Sets index uniqueness, returning the previous value.
    pub fn set_index_unique(&mut self, id: IndexId, unique: bool) -> Option<bool> {
        let index = self.indexes.get_mut(&id)?;
        let previous = index.unique;
        index.unique = unique;
        Some(previous)
    }

    /// Sets or removes an index annotation, returning the previous value.
    pub fn set_index_annotation(
        &mut self,
        id: IndexId,
        name: &str,
        value: Option<AnnotationValue>,
    ) -> Option<AnnotationValue> {
        let index = self.indexes.get_mut(&id)?;
        match value {
            Some(value) => index.annotations.insert(name.to_string(), value),
            None => index.annotations.remove(name),
        }
    }

    // --- foreign key mutation ---

    /// Inserts a foreign key from a dependent entity to a principal entity.
    pub fn insert_foreign_key(
        &mut self,
        dependent: EntityId,
        principal: EntityId,
        properties: Vec<PropertyId>,
    ) -> ForeignKeyId {
        let id = ForeignKeyId::new();
        self.foreign_keys.insert(
            id,
            ForeignKeyNode {
                id,
                dependent,
                principal,
                properties,
                unique: false,
                navigations: Vec::new(),
                live: true,
            },
        );
        if let Some(node) = self.entities.get_mut(&dependent) {
            node.foreign_keys.push(id);
            node.touch();
        }
        id
    }

    /// Tombstones a foreign key together with its navigations.
    pub fn remove_foreign_key(&mut self, id: ForeignKeyId) {
        let Some(fk) = self.foreign_keys.get_mut(&id) else {
            return;
        };
        if !fk.live {
            return;
        }
        fk.live = false;
        let dependent = fk.dependent;
        let navigations = fk.navigations.clone();
        if let Some(node) = self.entities.get_mut(&dependent) {
            node.foreign_keys.retain(|f| *f != id);
            node.touch();
        }
        for nav in navigations {
            self.remove_navigation(nav);
        }
    }

    /// Sets foreign key uniqueness, returning the previous value.
    pub fn set_foreign_key_unique(&mut self, id: ForeignKeyId, unique: bool) -> Option<bool> {
        let fk = self.foreign_keys.get_mut(&id)?;
        let previous = fk.unique;
        fk.unique = unique;
        Some(previous)
    }

    /// Swaps the dependent and principal ends of a foreign key.
    pub fn invert_foreign_key(&mut self, id: ForeignKeyId) -> Option<()> {
        let fk = self.foreign_keys.get_mut(&id)?;
        if !fk.live {
            return None;
        }
        let old_dependent = fk.dependent;
        let new_dependent = fk.principal;
        fk.principal = old_dependent;
        fk.dependent = new_dependent;
        if let Some(node) = self.entities.get_mut(&old_dependent) {
            node.foreign_keys.retain(|f| *f != id);
            node.touch();
        }
        if let Some(node) = self.entities.get_mut(&new_dependent) {
            node.foreign_keys.push(id);
            node.touch();
        }
        Some(())
    }

    // --- navigation mutation ---

    /// Inserts a navigation over a foreign key. When `on_dependent` is true
    /// the navigation is declared on the dependent entity and points at the
    /// principal, otherwise the reverse.
    pub fn insert_navigation(
        &mut self,
        foreign_key: ForeignKeyId,
        name: impl Into<String>,
        on_dependent: bool,
    ) -> Option<NavigationId> {
        let fk = self.foreign_keys.get(&foreign_key)?;
        let (source, target) = if on_dependent {
            (fk.dependent, fk.principal)
        } else {
            (fk.principal, fk.dependent)
        };
        let id = NavigationId::new();
        self.navigations.insert(
            id,
            NavigationNode {
                id,
                foreign_key,
                source,
                target,
                name: name.into(),
                live: true,
            },
        );
        if let Some(fk) = self.foreign_keys.get_mut(&foreign_key) {
            fk.navigations.push(id);
        }
        if let Some(node) = self.entities.get_mut(&source) {
            node.navigations.push(id);
            node.touch();
        }
        Some(id)
    }

    /// Tombstones a navigation.
    pub fn remove_navigation(&mut self, id: NavigationId) {
        let Some(nav) = self.navigations.get_mut(&id) else {
            return;
        };
        if !nav.live {
            return;
        }
        nav.live = false;
        let source = nav.source;
        let fk = nav.foreign_key;
        if let Some(node) = self.entities.get_mut(&source) {
            node.navigations.retain(|n| *n != id);
        }
        if let Some(fk) = self.foreign_keys.get_mut(&fk) {
            fk.navigations.retain(|n| *n != id);
        }
    }
}
