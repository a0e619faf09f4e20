//! The announced mutation surface and the schema builder.
//!
//! [`Model`] mutations on their own are silent. [`ModelOps`] pairs every
//! structural change with the dispatch call that announces it, so going
//! through this type is what makes conventions fire. Conventions
//! themselves receive a `ModelOps` and mutate through it, which is how
//! cascades happen.
//!
//! [`SchemaBuilder`] is the entry point for callers: it owns the model and
//! its dispatcher, runs the model-initialized chain on creation and the
//! model-built chain on finalization.

use crate::conventions::ConventionSet;
use crate::dispatch::{ConventionBatch, ConventionDispatcher};
use crate::error::{ConveneResult, ValidationError};
use crate::ids::{EntityId, ForeignKeyId, IndexId, KeyId, NavigationId, PropertyId};
use crate::model::{AnnotationValue, Model};

/// Mutates the schema graph and announces every change to conventions.
///
/// Short-lived: borrow one from a [`SchemaBuilder`] or a batch, perform
/// mutations, drop it. With no batch open each call returns the settled
/// result of its convention chain; inside a batch the returns are
/// provisional and the batch handle is the place to resolve identity.
pub struct ModelOps<'a> {
    model: &'a mut Model,
    dispatcher: &'a mut ConventionDispatcher,
}

impl<'a> ModelOps<'a> {
    pub(crate) fn new(model: &'a mut Model, dispatcher: &'a mut ConventionDispatcher) -> Self {
        Self { model, dispatcher }
    }

    /// Read access to the graph.
    #[must_use]
    pub fn model(&self) -> &Model {
        self.model
    }

    /// Opens a batch; every announcement made until the handle is released
    /// is deferred.
    pub fn batch(&mut self) -> ConventionBatch<'_> {
        ConventionBatch::new(&mut *self.model, &mut *self.dispatcher)
    }

    // --- entities ---

    /// Adds an entity and runs the entity-added chain.
    ///
    /// # Errors
    ///
    /// Rejects empty and duplicate names.
    pub fn add_entity(&mut self, name: &str) -> ConveneResult<Option<EntityId>> {
        if name.is_empty() {
            return Err(ValidationError::EmptyEntityName.into());
        }
        if self.model.find_entity(name).is_some() {
            return Err(ValidationError::DuplicateEntityName {
                name: name.to_string(),
            }
            .into());
        }
        let entity = self.model.insert_entity(name);
        Ok(self.dispatcher.on_entity_added(&mut *self.model, entity))
    }

    /// Removes an entity and everything attached to it, announcing each
    /// removed foreign key, key, and index before the entity itself.
    pub fn remove_entity(&mut self, entity: EntityId) -> bool {
        if !self.model.entity_is_live(entity) {
            return false;
        }
        let Some(node) = self.model.entity(entity) else {
            return false;
        };
        let name = node.name.clone();
        let keys = node.keys.clone();
        let indexes = node.indexes.clone();
        let declared = node.foreign_keys.clone();
        let referencing: Vec<ForeignKeyId> = self
            .model
            .entities()
            .flat_map(|e| e.foreign_keys.iter().copied())
            .filter(|fk| {
                self.model
                    .foreign_key(*fk)
                    .is_some_and(|node| node.principal == entity)
            })
            .collect();

        for fk in declared.into_iter().chain(referencing) {
            self.remove_foreign_key(fk);
        }
        for key in keys {
            self.remove_key(key);
        }
        for index in indexes {
            self.remove_index(index);
        }
        self.model.remove_entity(entity);
        self.dispatcher
            .on_entity_removed(&mut *self.model, entity, &name);
        true
    }

    /// Marks a type name as ignored, removing any entity carrying it, and
    /// runs the entity-ignored chain.
    ///
    /// # Errors
    ///
    /// Rejects empty names.
    pub fn ignore_entity(&mut self, name: &str) -> ConveneResult<bool> {
        if name.is_empty() {
            return Err(ValidationError::EmptyEntityName.into());
        }
        if let Some(existing) = self.model.find_entity(name) {
            self.remove_entity(existing);
        }
        self.model.add_ignored_type(name);
        self.dispatcher.on_entity_ignored(&mut *self.model, name)
    }

    /// Marks a member name as ignored on an entity and runs the
    /// member-ignored chain over the entity's derived closure.
    ///
    /// # Errors
    ///
    /// Rejects empty member names.
    pub fn ignore_member(
        &mut self,
        entity: EntityId,
        member: &str,
    ) -> ConveneResult<Option<EntityId>> {
        if member.is_empty() {
            return Err(ValidationError::EmptyMemberName.into());
        }
        if !self.model.entity_is_live(entity) {
            return Ok(None);
        }
        self.model.add_ignored_member(entity, member);
        self.dispatcher
            .on_member_ignored(&mut *self.model, entity, member)
    }

    /// Changes an entity's base type and runs the base-type-changed chain.
    /// No announcement happens if the base is unchanged.
    pub fn set_base_type(&mut self, entity: EntityId, base: Option<EntityId>) -> Option<EntityId> {
        if !self.model.entity_is_live(entity) {
            return None;
        }
        if base.is_some_and(|b| !self.model.entity_is_live(b)) {
            return None;
        }
        let previous = self.model.entity(entity)?.base;
        if previous == base {
            return Some(entity);
        }
        self.model.set_base(entity, base);
        self.dispatcher
            .on_base_type_changed(&mut *self.model, entity, previous)
    }

    /// Sets or clears an entity annotation and runs the resolution chain.
    /// Returns the resolved value.
    ///
    /// # Errors
    ///
    /// Rejects empty annotation names.
    pub fn set_entity_annotation(
        &mut self,
        entity: EntityId,
        name: &str,
        value: Option<AnnotationValue>,
    ) -> ConveneResult<Option<AnnotationValue>> {
        if name.is_empty() {
            return Err(ValidationError::EmptyAnnotationName.into());
        }
        if !self.model.entity_is_live(entity) {
            return Ok(None);
        }
        let old = self.model.set_entity_annotation(entity, name, value.clone());
        if old == value {
            return Ok(value);
        }
        self.dispatcher
            .on_entity_annotation_set(&mut *self.model, entity, name, value, old)
    }

    // --- properties ---

    /// Adds a property and runs the property-added chain.
    ///
    /// # Errors
    ///
    /// Rejects empty names and names already declared on the entity.
    pub fn add_property(
        &mut self,
        entity: EntityId,
        name: &str,
        nullable: bool,
    ) -> ConveneResult<Option<PropertyId>> {
        if name.is_empty() {
            return Err(ValidationError::EmptyPropertyName.into());
        }
        if !self.model.entity_is_live(entity) {
            return Ok(None);
        }
        let duplicate = self
            .model
            .entity(entity)
            .into_iter()
            .flat_map(|e| e.properties.iter())
            .any(|p| {
                self.model
                    .property(*p)
                    .is_some_and(|node| node.is_live() && node.name == name)
            });
        if duplicate {
            return Err(ValidationError::DuplicatePropertyName {
                entity: self
                    .model
                    .entity(entity)
                    .map(|e| e.name.clone())
                    .unwrap_or_default(),
                name: name.to_string(),
            }
            .into());
        }
        let property = self.model.insert_property(entity, name, nullable);
        Ok(self.dispatcher.on_property_added(&mut *self.model, property))
    }

    /// Changes a property's nullability and runs the chain. No announcement
    /// happens if the value is unchanged.
    pub fn set_property_nullable(&mut self, property: PropertyId, nullable: bool) -> bool {
        if !self.model.property_is_live(property) {
            return false;
        }
        match self.model.set_property_nullable(property, nullable) {
            Some(previous) if previous != nullable => self
                .dispatcher
                .on_property_nullable_changed(&mut *self.model, property),
            Some(_) => true,
            None => false,
        }
    }

    /// Changes a property's backing field and runs the chain. No
    /// announcement happens if the field is unchanged.
    pub fn set_property_field(&mut self, property: PropertyId, field: Option<String>) -> bool {
        if !self.model.property_is_live(property) {
            return false;
        }
        match self.model.set_property_field(property, field.clone()) {
            Some(previous) if previous != field => {
                self.dispatcher
                    .on_property_field_changed(&mut *self.model, property, previous)
            }
            Some(_) => true,
            None => false,
        }
    }

    /// Sets or clears a property annotation and runs the resolution chain.
    ///
    /// # Errors
    ///
    /// Rejects empty annotation names.
    pub fn set_property_annotation(
        &mut self,
        property: PropertyId,
        name: &str,
        value: Option<AnnotationValue>,
    ) -> ConveneResult<Option<AnnotationValue>> {
        if name.is_empty() {
            return Err(ValidationError::EmptyAnnotationName.into());
        }
        if !self.model.property_is_live(property) {
            return Ok(None);
        }
        let old = self
            .model
            .set_property_annotation(property, name, value.clone());
        if old == value {
            return Ok(value);
        }
        self.dispatcher
            .on_property_annotation_set(&mut *self.model, property, name, value, old)
    }

    // --- keys ---

    /// Adds a candidate key over `properties` and runs the key-added chain.
    ///
    /// # Errors
    ///
    /// Rejects an empty property list and properties not declared live on
    /// the entity.
    pub fn add_key(
        &mut self,
        entity: EntityId,
        properties: &[PropertyId],
    ) -> ConveneResult<Option<KeyId>> {
        if properties.is_empty() {
            return Err(ValidationError::EmptyPropertyList.into());
        }
        self.check_properties_declared_on(entity, properties)?;
        if !self.model.entity_is_live(entity) {
            return Ok(None);
        }
        let key = self.model.insert_key(entity, properties.to_vec());
        Ok(self.dispatcher.on_key_added(&mut *self.model, key))
    }

    /// Removes a candidate key and notifies the key-removed chain.
    pub fn remove_key(&mut self, key: KeyId) -> bool {
        if !self.model.key_is_live(key) {
            return false;
        }
        let Some(entity) = self.model.key(key).map(|k| k.entity) else {
            return false;
        };
        self.model.remove_key(key);
        self.dispatcher.on_key_removed(&mut *self.model, entity, key);
        true
    }

    /// Designates a key as primary and runs the primary-key-changed chain.
    /// No announcement happens if the designation is unchanged.
    pub fn set_primary_key(&mut self, key: KeyId) -> Option<KeyId> {
        if !self.model.key_is_live(key) {
            return None;
        }
        let entity = self.model.key(key)?.entity;
        let previous = self.model.entity(entity)?.primary_key;
        if previous == Some(key) {
            return Some(key);
        }
        self.model.set_primary_key(entity, Some(key));
        self.dispatcher
            .on_primary_key_changed(&mut *self.model, key, previous)
    }

    // --- indexes ---

    /// Adds an index over `properties` and runs the index-added chain.
    ///
    /// # Errors
    ///
    /// Rejects an empty property list and properties not declared live on
    /// the entity.
    pub fn add_index(
        &mut self,
        entity: EntityId,
        properties: &[PropertyId],
        unique: bool,
    ) -> ConveneResult<Option<IndexId>> {
        if properties.is_empty() {
            return Err(ValidationError::EmptyPropertyList.into());
        }
        self.check_properties_declared_on(entity, properties)?;
        if !self.model.entity_is_live(entity) {
            return Ok(None);
        }
        let index = self.model.insert_index(entity, properties.to_vec(), unique);
        Ok(self.dispatcher.on_index_added(&mut *self.model, index))
    }

    /// Removes an index and notifies the index-removed chain.
    pub fn remove_index(&mut self, index: IndexId) -> bool {
        if !self.model.index_is_live(index) {
            return false;
        }
        let Some(entity) = self.model.index(index).map(|i| i.entity) else {
            return false;
        };
        self.model.remove_index(index);
        self.dispatcher
            .on_index_removed(&mut *self.model, entity, index);
        true
    }

    /// Changes an index's uniqueness flag and runs the chain. No
    /// announcement happens if the flag is unchanged.
    pub fn set_index_unique(&mut self, index: IndexId, unique: bool) -> bool {
        if !self.model.index_is_live(index) {
            return false;
        }
        match self.model.set_index_unique(index, unique) {
            Some(previous) if previous != unique => self
                .dispatcher
                .on_index_uniqueness_changed(&mut *self.model, index),
            Some(_) => true,
            None => false,
        }
    }

    /// Sets or clears an index annotation and runs the resolution chain.
    ///
    /// # Errors
    ///
    /// Rejects empty annotation names.
    pub fn set_index_annotation(
        &mut self,
        index: IndexId,
        name: &str,
        value: Option<AnnotationValue>,
    ) -> ConveneResult<Option<AnnotationValue>> {
        if name.is_empty() {
            return Err(ValidationError::EmptyAnnotationName.into());
        }
        if !self.model.index_is_live(index) {
            return Ok(None);
        }
        let old = self.model.set_index_annotation(index, name, value.clone());
        if old == value {
            return Ok(value);
        }
        self.dispatcher
            .on_index_annotation_set(&mut *self.model, index, name, value, old)
    }

    // --- foreign keys ---

    /// Adds a foreign key and runs the foreign-key-added chain. The
    /// property list may be empty; conventions often supply the covering
    /// properties afterwards.
    ///
    /// # Errors
    ///
    /// Rejects properties not declared live on the dependent entity.
    pub fn add_foreign_key(
        &mut self,
        dependent: EntityId,
        principal: EntityId,
        properties: &[PropertyId],
    ) -> ConveneResult<Option<ForeignKeyId>> {
        self.check_properties_declared_on(dependent, properties)?;
        if !self.model.entity_is_live(dependent) || !self.model.entity_is_live(principal) {
            return Ok(None);
        }
        let foreign_key = self
            .model
            .insert_foreign_key(dependent, principal, properties.to_vec());
        Ok(self
            .dispatcher
            .on_foreign_key_added(&mut *self.model, foreign_key))
    }

    /// Removes a foreign key, notifying navigation-removed for each of its
    /// navigations and then foreign-key-removed.
    pub fn remove_foreign_key(&mut self, foreign_key: ForeignKeyId) -> bool {
        if !self.model.foreign_key_is_live(foreign_key) {
            return false;
        }
        let Some(node) = self.model.foreign_key(foreign_key) else {
            return false;
        };
        let dependent = node.dependent;
        let navigations: Vec<(EntityId, EntityId, String)> = node
            .navigations
            .iter()
            .filter_map(|nav| self.model.navigation(*nav))
            .map(|nav| (nav.source, nav.target, nav.name.clone()))
            .collect();

        self.model.remove_foreign_key(foreign_key);
        for (source, target, name) in navigations {
            // Names were validated at creation; the dispatch cannot fail.
            let _ = self
                .dispatcher
                .on_navigation_removed(&mut *self.model, source, target, &name);
        }
        self.dispatcher
            .on_foreign_key_removed(&mut *self.model, dependent, foreign_key);
        true
    }

    /// Replaces a foreign key with a structurally identical one under a
    /// fresh id, retargeting active tracker registrations. Navigations do
    /// not survive the swap. Runs the foreign-key-added chain for the
    /// replacement.
    pub fn replace_foreign_key(&mut self, foreign_key: ForeignKeyId) -> Option<ForeignKeyId> {
        if !self.model.foreign_key_is_live(foreign_key) {
            return None;
        }
        let node = self.model.foreign_key(foreign_key)?;
        let dependent = node.dependent;
        let principal = node.principal;
        let properties = node.properties.clone();
        let unique = node.unique;

        self.model.remove_foreign_key(foreign_key);
        let replacement = self
            .model
            .insert_foreign_key(dependent, principal, properties);
        self.model.set_foreign_key_unique(replacement, unique);
        self.dispatcher.tracker.update(foreign_key, replacement);
        self.dispatcher
            .on_foreign_key_added(&mut *self.model, replacement)
    }

    /// Changes a foreign key's uniqueness flag and runs the chain. No
    /// announcement happens if the flag is unchanged.
    pub fn set_foreign_key_unique(&mut self, foreign_key: ForeignKeyId, unique: bool) -> bool {
        if !self.model.foreign_key_is_live(foreign_key) {
            return false;
        }
        match self.model.set_foreign_key_unique(foreign_key, unique) {
            Some(previous) if previous != unique => self
                .dispatcher
                .on_foreign_key_uniqueness_changed(&mut *self.model, foreign_key),
            Some(_) => true,
            None => false,
        }
    }

    /// Swaps the principal and dependent ends of a foreign key and runs
    /// the principal-end-changed chain.
    pub fn invert_principal_end(&mut self, foreign_key: ForeignKeyId) -> Option<ForeignKeyId> {
        if !self.model.foreign_key_is_live(foreign_key) {
            return None;
        }
        self.model.invert_foreign_key(foreign_key)?;
        self.dispatcher
            .on_principal_end_changed(&mut *self.model, foreign_key)
    }

    // --- navigations ---

    /// Adds a navigation over a foreign key and runs the navigation-added
    /// chain. When `on_dependent` is true the navigation is declared on the
    /// dependent entity.
    ///
    /// # Errors
    ///
    /// Rejects empty navigation names.
    pub fn add_navigation(
        &mut self,
        foreign_key: ForeignKeyId,
        name: &str,
        on_dependent: bool,
    ) -> ConveneResult<Option<ForeignKeyId>> {
        if name.is_empty() {
            return Err(ValidationError::EmptyNavigationName.into());
        }
        if !self.model.foreign_key_is_live(foreign_key) {
            return Ok(None);
        }
        let Some(navigation) = self.model.insert_navigation(foreign_key, name, on_dependent) else {
            return Ok(None);
        };
        Ok(self
            .dispatcher
            .on_navigation_added(&mut *self.model, foreign_key, navigation))
    }

    /// Removes a navigation and notifies the navigation-removed chain.
    pub fn remove_navigation(&mut self, navigation: NavigationId) -> bool {
        if !self.model.navigation_is_live(navigation) {
            return false;
        }
        let Some(node) = self.model.navigation(navigation) else {
            return false;
        };
        let source = node.source;
        let target = node.target;
        let name = node.name.clone();
        self.model.remove_navigation(navigation);
        let _ = self
            .dispatcher
            .on_navigation_removed(&mut *self.model, source, target, &name);
        true
    }

    fn check_properties_declared_on(
        &self,
        entity: EntityId,
        properties: &[PropertyId],
    ) -> ConveneResult<()> {
        for property in properties {
            let declared = self
                .model
                .property(*property)
                .is_some_and(|p| p.is_live() && p.entity == entity);
            if !declared {
                return Err(ValidationError::ForeignPropertyInKey.into());
            }
        }
        Ok(())
    }
}

/// Owns a model under construction together with its dispatcher.
///
/// Creating a builder runs the model-initialized chain; finalizing it runs
/// the model-built chain and yields the model.
pub struct SchemaBuilder {
    model: Model,
    dispatcher: ConventionDispatcher,
}

impl SchemaBuilder {
    /// Creates a builder over an empty model and runs the
    /// model-initialized chain.
    #[must_use]
    pub fn new(conventions: ConventionSet) -> Self {
        let mut builder = Self {
            model: Model::new(),
            dispatcher: ConventionDispatcher::new(conventions),
        };
        builder.dispatcher.on_model_initialized(&mut builder.model);
        builder
    }

    /// Read access to the model under construction.
    #[must_use]
    pub fn model(&self) -> &Model {
        &self.model
    }

    /// The announced mutation surface.
    pub fn ops(&mut self) -> ModelOps<'_> {
        ModelOps::new(&mut self.model, &mut self.dispatcher)
    }

    /// Opens a batch over the whole builder.
    pub fn batch(&mut self) -> ConventionBatch<'_> {
        ConventionBatch::new(&mut self.model, &mut self.dispatcher)
    }

    /// Runs the model-built chain and yields the finished model.
    #[must_use]
    pub fn build(mut self) -> Model {
        self.dispatcher.on_model_built(&mut self.model);
        self.model
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use serde_json::json;

    use super::*;
    use crate::conventions::{
        AnnotationSetConvention, BaseTypeChangedConvention, EntityAddedConvention,
        ForeignKeyRemovedConvention, MemberIgnoredConvention, ModelConvention,
        NavigationRemovedConvention,
    };

    type Log = Rc<RefCell<Vec<String>>>;

    fn log() -> Log {
        Rc::new(RefCell::new(Vec::new()))
    }

    struct RecordEntityAdded {
        log: Log,
        tag: &'static str,
    }

    impl EntityAddedConvention for RecordEntityAdded {
        fn process(&self, entity: EntityId, _ops: &mut ModelOps<'_>) -> Option<EntityId> {
            self.log.borrow_mut().push(self.tag.to_string());
            Some(entity)
        }
    }

    struct RemoveTheEntity;

    impl EntityAddedConvention for RemoveTheEntity {
        fn process(&self, entity: EntityId, ops: &mut ModelOps<'_>) -> Option<EntityId> {
            ops.remove_entity(entity);
            Some(entity)
        }
    }

    #[test]
    fn test_entity_added_chain_runs_in_registration_order() {
        let log = log();
        let mut set = ConventionSet::new();
        set.entity_added.push(Rc::new(RecordEntityAdded {
            log: Rc::clone(&log),
            tag: "first",
        }));
        set.entity_added.push(Rc::new(RecordEntityAdded {
            log: Rc::clone(&log),
            tag: "second",
        }));

        let mut builder = SchemaBuilder::new(set);
        let result = builder.ops().add_entity("Order").unwrap();

        assert!(result.is_some());
        assert_eq!(*log.borrow(), vec!["first", "second"]);
    }

    #[test]
    fn test_transform_chain_stops_when_handle_dies() {
        let log = log();
        let mut set = ConventionSet::new();
        set.entity_added.push(Rc::new(RemoveTheEntity));
        set.entity_added.push(Rc::new(RecordEntityAdded {
            log: Rc::clone(&log),
            tag: "unreachable",
        }));

        let mut builder = SchemaBuilder::new(set);
        let result = builder.ops().add_entity("Order").unwrap();

        assert_eq!(result, None);
        assert!(log.borrow().is_empty());
    }

    struct VetoBaseType {
        log: Log,
        approve: bool,
        tag: &'static str,
    }

    impl BaseTypeChangedConvention for VetoBaseType {
        fn process(
            &self,
            _entity: EntityId,
            _previous: Option<EntityId>,
            _ops: &mut ModelOps<'_>,
        ) -> bool {
            self.log.borrow_mut().push(self.tag.to_string());
            self.approve
        }
    }

    #[test]
    fn test_veto_chain_stops_at_first_false() {
        let log = log();
        let mut set = ConventionSet::new();
        set.base_type_changed.push(Rc::new(VetoBaseType {
            log: Rc::clone(&log),
            approve: false,
            tag: "veto",
        }));
        set.base_type_changed.push(Rc::new(VetoBaseType {
            log: Rc::clone(&log),
            approve: true,
            tag: "unreachable",
        }));

        let mut builder = SchemaBuilder::new(set);
        let mut ops = builder.ops();
        let base = ops.add_entity("Base").unwrap().unwrap();
        let derived = ops.add_entity("Derived").unwrap().unwrap();

        let result = ops.set_base_type(derived, Some(base));

        assert_eq!(result, None);
        assert_eq!(*log.borrow(), vec!["veto"]);
        // The structural change itself is not rolled back by the veto.
        assert_eq!(builder.model().entity(derived).unwrap().base, Some(base));
    }

    struct OverrideAnnotation {
        replacement: AnnotationValue,
    }

    impl AnnotationSetConvention<EntityId> for OverrideAnnotation {
        fn process(
            &self,
            _target: EntityId,
            _name: &str,
            _value: Option<&AnnotationValue>,
            _old: Option<&AnnotationValue>,
            _ops: &mut ModelOps<'_>,
        ) -> Option<AnnotationValue> {
            Some(self.replacement.clone())
        }
    }

    struct RecordAnnotation {
        log: Log,
    }

    impl AnnotationSetConvention<EntityId> for RecordAnnotation {
        fn process(
            &self,
            _target: EntityId,
            name: &str,
            value: Option<&AnnotationValue>,
            _old: Option<&AnnotationValue>,
            _ops: &mut ModelOps<'_>,
        ) -> Option<AnnotationValue> {
            self.log.borrow_mut().push(name.to_string());
            value.cloned()
        }
    }

    #[test]
    fn test_annotation_chain_ends_when_a_rule_overrides_the_value() {
        let log = log();
        let mut set = ConventionSet::new();
        set.entity_annotation_set.push(Rc::new(OverrideAnnotation {
            replacement: json!("overridden"),
        }));
        set.entity_annotation_set
            .push(Rc::new(RecordAnnotation { log: Rc::clone(&log) }));

        let mut builder = SchemaBuilder::new(set);
        let mut ops = builder.ops();
        let order = ops.add_entity("Order").unwrap().unwrap();

        let resolved = ops
            .set_entity_annotation(order, "table", Some(json!("orders")))
            .unwrap();

        assert_eq!(resolved, Some(json!("overridden")));
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_annotation_chain_runs_fully_when_value_unchanged() {
        let log = log();
        let mut set = ConventionSet::new();
        set.entity_annotation_set
            .push(Rc::new(RecordAnnotation { log: Rc::clone(&log) }));
        set.entity_annotation_set
            .push(Rc::new(RecordAnnotation { log: Rc::clone(&log) }));

        let mut builder = SchemaBuilder::new(set);
        let mut ops = builder.ops();
        let order = ops.add_entity("Order").unwrap().unwrap();

        let resolved = ops
            .set_entity_annotation(order, "table", Some(json!("orders")))
            .unwrap();

        assert_eq!(resolved, Some(json!("orders")));
        assert_eq!(log.borrow().len(), 2);
    }

    struct VetoMemberOn {
        veto_entity: RefCell<Option<EntityId>>,
        log: Log,
    }

    impl MemberIgnoredConvention for VetoMemberOn {
        fn process(&self, entity: EntityId, member: &str, _ops: &mut ModelOps<'_>) -> bool {
            self.log
                .borrow_mut()
                .push(format!("{member}@{entity}"));
            *self.veto_entity.borrow() != Some(entity)
        }
    }

    #[test]
    fn test_member_ignored_fans_out_over_derived_closure() {
        let log = log();
        let convention = Rc::new(VetoMemberOn {
            veto_entity: RefCell::new(None),
            log: Rc::clone(&log),
        });
        let mut set = ConventionSet::new();
        set.member_ignored.push(Rc::clone(&convention) as Rc<dyn MemberIgnoredConvention>);

        let mut builder = SchemaBuilder::new(set);
        let mut ops = builder.ops();
        let base = ops.add_entity("Base").unwrap().unwrap();
        let derived = ops.add_entity("Derived").unwrap().unwrap();
        ops.set_base_type(derived, Some(base));

        let result = ops.ignore_member(base, "audit").unwrap();
        assert_eq!(result, Some(base));
        assert_eq!(log.borrow().len(), 2);

        // A veto anywhere in the closure aborts the whole fan-out.
        log.borrow_mut().clear();
        *convention.veto_entity.borrow_mut() = Some(derived);
        let result = ops.ignore_member(base, "other").unwrap();
        assert_eq!(result, None);
        assert_eq!(log.borrow().len(), 2);
    }

    struct RecordNavigationRemoved {
        log: Log,
        keep_going: bool,
        tag: &'static str,
    }

    impl NavigationRemovedConvention for RecordNavigationRemoved {
        fn process(
            &self,
            _source: EntityId,
            _target: EntityId,
            name: &str,
            _ops: &mut ModelOps<'_>,
        ) -> bool {
            self.log.borrow_mut().push(format!("{}:{name}", self.tag));
            self.keep_going
        }
    }

    struct RecordForeignKeyRemoved {
        log: Log,
    }

    impl ForeignKeyRemovedConvention for RecordForeignKeyRemoved {
        fn process(&self, _entity: EntityId, _fk: ForeignKeyId, _ops: &mut ModelOps<'_>) {
            self.log.borrow_mut().push("fk-removed".to_string());
        }
    }

    #[test]
    fn test_remove_foreign_key_notifies_navigations_first() {
        let log = log();
        let mut set = ConventionSet::new();
        set.navigation_removed.push(Rc::new(RecordNavigationRemoved {
            log: Rc::clone(&log),
            keep_going: false,
            tag: "nav1",
        }));
        set.navigation_removed.push(Rc::new(RecordNavigationRemoved {
            log: Rc::clone(&log),
            keep_going: true,
            tag: "nav2",
        }));
        set.foreign_key_removed
            .push(Rc::new(RecordForeignKeyRemoved { log: Rc::clone(&log) }));

        let mut builder = SchemaBuilder::new(set);
        let mut ops = builder.ops();
        let order = ops.add_entity("Order").unwrap().unwrap();
        let customer = ops.add_entity("Customer").unwrap().unwrap();
        let fk = ops.add_foreign_key(order, customer, &[]).unwrap().unwrap();
        ops.add_navigation(fk, "customer", true).unwrap();

        assert!(ops.remove_foreign_key(fk));
        // First navigation-removed rule returned false, so the second rule
        // never saw the navigation; the removal notification still fires.
        assert_eq!(*log.borrow(), vec!["nav1:customer", "fk-removed"]);
    }

    struct RecordLifecycle {
        log: Log,
        tag: &'static str,
    }

    impl ModelConvention for RecordLifecycle {
        fn process(&self, _ops: &mut ModelOps<'_>) -> bool {
            self.log.borrow_mut().push(self.tag.to_string());
            true
        }
    }

    #[test]
    fn test_builder_runs_lifecycle_chains() {
        let log = log();
        let mut set = ConventionSet::new();
        set.model_initialized.push(Rc::new(RecordLifecycle {
            log: Rc::clone(&log),
            tag: "initialized",
        }));
        set.model_built.push(Rc::new(RecordLifecycle {
            log: Rc::clone(&log),
            tag: "built",
        }));

        let builder = SchemaBuilder::new(set);
        assert_eq!(*log.borrow(), vec!["initialized"]);
        let _model = builder.build();
        assert_eq!(*log.borrow(), vec!["initialized", "built"]);
    }

    #[test]
    fn test_duplicate_and_empty_names_rejected() {
        let mut builder = SchemaBuilder::new(ConventionSet::new());
        let mut ops = builder.ops();

        assert!(ops.add_entity("").is_err());
        let order = ops.add_entity("Order").unwrap().unwrap();
        assert!(ops.add_entity("Order").is_err());

        assert!(ops.add_property(order, "", false).is_err());
        ops.add_property(order, "id", false).unwrap();
        assert!(ops.add_property(order, "id", false).is_err());

        assert!(ops.add_key(order, &[]).is_err());
        let other = ops.add_entity("Other").unwrap().unwrap();
        let foreign = ops.add_property(other, "id", false).unwrap().unwrap();
        assert!(ops.add_key(order, &[foreign]).is_err());
    }

    #[test]
    fn test_ignore_entity_removes_existing_entity() {
        let mut builder = SchemaBuilder::new(ConventionSet::new());
        let mut ops = builder.ops();
        let order = ops.add_entity("Order").unwrap().unwrap();

        assert!(ops.ignore_entity("Order").unwrap());
        assert!(!builder.model().entity_is_live(order));
        assert!(builder.model().is_ignored("Order"));
    }

    #[test]
    fn test_replace_foreign_key_swaps_identity() {
        let mut builder = SchemaBuilder::new(ConventionSet::new());
        let mut ops = builder.ops();
        let order = ops.add_entity("Order").unwrap().unwrap();
        let customer = ops.add_entity("Customer").unwrap().unwrap();
        let prop = ops.add_property(order, "customer_id", false).unwrap().unwrap();
        let fk = ops.add_foreign_key(order, customer, &[prop]).unwrap().unwrap();
        ops.set_foreign_key_unique(fk, true);

        let replacement = ops.replace_foreign_key(fk).unwrap();

        assert_ne!(replacement, fk);
        assert!(!builder.model().foreign_key_is_live(fk));
        let node = builder.model().foreign_key(replacement).unwrap();
        assert!(node.unique);
        assert_eq!(node.properties, vec![prop]);
    }

    #[test]
    fn test_unchanged_values_do_not_announce() {
        let log = log();
        let mut set = ConventionSet::new();
        set.base_type_changed.push(Rc::new(VetoBaseType {
            log: Rc::clone(&log),
            approve: true,
            tag: "base",
        }));

        let mut builder = SchemaBuilder::new(set);
        let mut ops = builder.ops();
        let base = ops.add_entity("Base").unwrap().unwrap();
        let derived = ops.add_entity("Derived").unwrap().unwrap();

        ops.set_base_type(derived, Some(base));
        assert_eq!(log.borrow().len(), 1);

        // Same base again: no structural change, no announcement.
        ops.set_base_type(derived, Some(base));
        assert_eq!(log.borrow().len(), 1);

        let prop = ops.add_property(derived, "id", true).unwrap().unwrap();
        assert!(ops.set_property_nullable(prop, true));
        assert!(ops.set_property_nullable(prop, false));
    }
}
