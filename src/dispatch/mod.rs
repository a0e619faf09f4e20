//! The convention dispatcher.
//!
//! The dispatcher is told about every structural change to the schema graph
//! and decides, per change, whether to run the matching convention chain
//! immediately or to defer it. With no batch open, the chain runs
//! synchronously on the caller's stack. With a batch open, the change is
//! recorded as an event in the innermost open scope and a provisional
//! result is returned; the authoritative result only exists once the batch
//! converges.
//!
//! Chains a convention triggers *while being run* are never executed by
//! recursing into the dispatcher. During a drain there is always a fresh
//! open scope, so reentrant dispatches queue instead, and the convergence
//! loop in [`ConventionBatch`] picks them up afterwards. That turns
//! arbitrarily deep cascades into a flat iteration.

mod batch;
mod node;
mod visitor;

pub use batch::ConventionBatch;

use std::rc::Rc;

use tracing::trace;

use crate::conventions::ConventionSet;
use crate::error::{ConveneResult, ValidationError};
use crate::ids::{EntityId, ForeignKeyId, IndexId, KeyId, NavigationId, PropertyId};
use crate::model::{AnnotationValue, Model};
use crate::ops::ModelOps;
use crate::tracker::MetadataTracker;

use node::{ConventionEvent, ConventionNode, ConventionScope};

/// Delivers structural-change events to convention chains.
///
/// One dispatcher exists per model under construction. The only mutable
/// state it carries besides the [`MetadataTracker`] is the stack of open
/// scopes; nobody else writes that stack.
pub struct ConventionDispatcher {
    conventions: Rc<ConventionSet>,
    scopes: Vec<ConventionScope>,
    pub(crate) tracker: MetadataTracker,
}

impl ConventionDispatcher {
    /// Creates a dispatcher over a pre-ordered convention set.
    #[must_use]
    pub fn new(conventions: ConventionSet) -> Self {
        Self {
            conventions: Rc::new(conventions),
            scopes: Vec::new(),
            tracker: MetadataTracker::new(),
        }
    }

    /// True while a batch (or a drain iteration) holds an open scope.
    #[must_use]
    pub fn in_batch(&self) -> bool {
        !self.scopes.is_empty()
    }

    fn record(&mut self, event: ConventionEvent) {
        trace!(event = ?event, "deferring convention event");
        let scope = self
            .scopes
            .last_mut()
            .expect("record called with no open scope");
        scope.add(ConventionNode::Event(event));
    }

    pub(crate) fn push_scope(&mut self) {
        self.scopes.push(ConventionScope::new());
    }

    pub(crate) fn pop_scope(&mut self) -> Option<ConventionScope> {
        self.scopes.pop()
    }

    pub(crate) fn append_child_scope(&mut self, child: ConventionScope) {
        let parent = self
            .scopes
            .last_mut()
            .expect("no parent scope to append to");
        parent.add(ConventionNode::Scope(child));
    }

    pub(crate) fn open_scope_count(&self) -> usize {
        self.scopes.len()
    }

    // --- entity events ---

    /// Announces a newly added entity.
    pub fn on_entity_added(&mut self, model: &mut Model, entity: EntityId) -> Option<EntityId> {
        if self.in_batch() {
            self.record(ConventionEvent::EntityAdded { entity });
            return Some(entity);
        }
        self.run_on_entity_added(model, entity)
    }

    pub(crate) fn run_on_entity_added(
        &mut self,
        model: &mut Model,
        mut entity: EntityId,
    ) -> Option<EntityId> {
        if !model.entity_is_live(entity) {
            return None;
        }
        let set = Rc::clone(&self.conventions);
        for convention in &set.entity_added {
            entity = {
                let mut ops = ModelOps::new(model, self);
                convention.process(entity, &mut ops)
            }?;
            if !model.entity_is_live(entity) {
                return None;
            }
        }
        Some(entity)
    }

    /// Announces a removed entity.
    pub fn on_entity_removed(&mut self, model: &mut Model, entity: EntityId, name: &str) {
        if self.in_batch() {
            self.record(ConventionEvent::EntityRemoved {
                entity,
                name: name.to_string(),
            });
            return;
        }
        self.run_on_entity_removed(model, entity, name);
    }

    pub(crate) fn run_on_entity_removed(&mut self, model: &mut Model, entity: EntityId, name: &str) {
        let set = Rc::clone(&self.conventions);
        for convention in &set.entity_removed {
            let mut ops = ModelOps::new(model, self);
            convention.process(entity, name, &mut ops);
        }
    }

    /// Announces a type name having been marked as ignored.
    ///
    /// # Errors
    ///
    /// Returns a validation error if `name` is empty.
    pub fn on_entity_ignored(&mut self, model: &mut Model, name: &str) -> ConveneResult<bool> {
        if name.is_empty() {
            return Err(ValidationError::EmptyEntityName.into());
        }
        if self.in_batch() {
            self.record(ConventionEvent::EntityIgnored {
                name: name.to_string(),
            });
            return Ok(true);
        }
        Ok(self.run_on_entity_ignored(model, name))
    }

    pub(crate) fn run_on_entity_ignored(&mut self, model: &mut Model, name: &str) -> bool {
        let set = Rc::clone(&self.conventions);
        for convention in &set.entity_ignored {
            let approved = {
                let mut ops = ModelOps::new(model, self);
                convention.process(name, &mut ops)
            };
            if !approved {
                return false;
            }
        }
        true
    }

    /// Announces a member name having been ignored on an entity.
    ///
    /// The veto chain fans out over the inclusive derived-type closure of
    /// the entity; the first veto anywhere in the closure aborts the whole
    /// operation.
    ///
    /// # Errors
    ///
    /// Returns a validation error if `member` is empty.
    pub fn on_member_ignored(
        &mut self,
        model: &mut Model,
        entity: EntityId,
        member: &str,
    ) -> ConveneResult<Option<EntityId>> {
        if member.is_empty() {
            return Err(ValidationError::EmptyMemberName.into());
        }
        if self.in_batch() {
            self.record(ConventionEvent::MemberIgnored {
                entity,
                member: member.to_string(),
            });
            return Ok(Some(entity));
        }
        Ok(self.run_on_member_ignored(model, entity, member))
    }

    pub(crate) fn run_on_member_ignored(
        &mut self,
        model: &mut Model,
        entity: EntityId,
        member: &str,
    ) -> Option<EntityId> {
        if !model.entity_is_live(entity) {
            return None;
        }
        let set = Rc::clone(&self.conventions);
        for derived in model.derived_types_inclusive(entity) {
            for convention in &set.member_ignored {
                let approved = {
                    let mut ops = ModelOps::new(model, self);
                    convention.process(derived, member, &mut ops)
                };
                if !approved {
                    return None;
                }
            }
        }
        Some(entity)
    }

    /// Announces a change of an entity's base type.
    pub fn on_base_type_changed(
        &mut self,
        model: &mut Model,
        entity: EntityId,
        previous: Option<EntityId>,
    ) -> Option<EntityId> {
        if self.in_batch() {
            self.record(ConventionEvent::BaseTypeChanged { entity, previous });
            return Some(entity);
        }
        self.run_on_base_type_changed(model, entity, previous)
    }

    pub(crate) fn run_on_base_type_changed(
        &mut self,
        model: &mut Model,
        entity: EntityId,
        previous: Option<EntityId>,
    ) -> Option<EntityId> {
        if !model.entity_is_live(entity) {
            return None;
        }
        let set = Rc::clone(&self.conventions);
        for convention in &set.base_type_changed {
            let approved = {
                let mut ops = ModelOps::new(model, self);
                convention.process(entity, previous, &mut ops)
            };
            if !approved {
                return None;
            }
            if !model.entity_is_live(entity) {
                return None;
            }
        }
        Some(entity)
    }

    /// Announces an entity annotation change. Returns the resolved value.
    ///
    /// # Errors
    ///
    /// Returns a validation error if `name` is empty.
    pub fn on_entity_annotation_set(
        &mut self,
        model: &mut Model,
        entity: EntityId,
        name: &str,
        value: Option<AnnotationValue>,
        old: Option<AnnotationValue>,
    ) -> ConveneResult<Option<AnnotationValue>> {
        if name.is_empty() {
            return Err(ValidationError::EmptyAnnotationName.into());
        }
        if self.in_batch() {
            self.record(ConventionEvent::EntityAnnotationSet {
                entity,
                name: name.to_string(),
                value: value.clone(),
                old,
            });
            return Ok(value);
        }
        Ok(self.run_on_entity_annotation_set(model, entity, name, value, old))
    }

    pub(crate) fn run_on_entity_annotation_set(
        &mut self,
        model: &mut Model,
        entity: EntityId,
        name: &str,
        value: Option<AnnotationValue>,
        old: Option<AnnotationValue>,
    ) -> Option<AnnotationValue> {
        if !model.entity_is_live(entity) {
            return None;
        }
        let set = Rc::clone(&self.conventions);
        for convention in &set.entity_annotation_set {
            let returned = {
                let mut ops = ModelOps::new(model, self);
                convention.process(entity, name, value.as_ref(), old.as_ref(), &mut ops)
            };
            if returned != value {
                return returned;
            }
            if !model.entity_is_live(entity) {
                return None;
            }
        }
        value
    }

    // --- foreign key events ---

    /// Announces a newly added foreign key.
    pub fn on_foreign_key_added(
        &mut self,
        model: &mut Model,
        foreign_key: ForeignKeyId,
    ) -> Option<ForeignKeyId> {
        if self.in_batch() {
            self.record(ConventionEvent::ForeignKeyAdded { foreign_key });
            return Some(foreign_key);
        }
        self.run_on_foreign_key_added(model, foreign_key)
    }

    pub(crate) fn run_on_foreign_key_added(
        &mut self,
        model: &mut Model,
        mut foreign_key: ForeignKeyId,
    ) -> Option<ForeignKeyId> {
        if !model.foreign_key_is_live(foreign_key) {
            return None;
        }
        let set = Rc::clone(&self.conventions);
        for convention in &set.foreign_key_added {
            foreign_key = {
                let mut ops = ModelOps::new(model, self);
                convention.process(foreign_key, &mut ops)
            }?;
            if !model.foreign_key_is_live(foreign_key) {
                return None;
            }
        }
        Some(foreign_key)
    }

    /// Announces a removed foreign key.
    pub fn on_foreign_key_removed(
        &mut self,
        model: &mut Model,
        entity: EntityId,
        foreign_key: ForeignKeyId,
    ) {
        if self.in_batch() {
            self.record(ConventionEvent::ForeignKeyRemoved {
                entity,
                foreign_key,
            });
            return;
        }
        self.run_on_foreign_key_removed(model, entity, foreign_key);
    }

    pub(crate) fn run_on_foreign_key_removed(
        &mut self,
        model: &mut Model,
        entity: EntityId,
        foreign_key: ForeignKeyId,
    ) {
        if !model.entity_is_live(entity) {
            return;
        }
        let set = Rc::clone(&self.conventions);
        for convention in &set.foreign_key_removed {
            let mut ops = ModelOps::new(model, self);
            convention.process(entity, foreign_key, &mut ops);
        }
    }

    // --- key events ---

    /// Announces a newly added candidate key.
    pub fn on_key_added(&mut self, model: &mut Model, key: KeyId) -> Option<KeyId> {
        if self.in_batch() {
            self.record(ConventionEvent::KeyAdded { key });
            return Some(key);
        }
        self.run_on_key_added(model, key)
    }

    pub(crate) fn run_on_key_added(&mut self, model: &mut Model, mut key: KeyId) -> Option<KeyId> {
        if !model.key_is_live(key) {
            return None;
        }
        let set = Rc::clone(&self.conventions);
        for convention in &set.key_added {
            key = {
                let mut ops = ModelOps::new(model, self);
                convention.process(key, &mut ops)
            }?;
            if !model.key_is_live(key) {
                return None;
            }
        }
        Some(key)
    }

    /// Announces a removed candidate key.
    pub fn on_key_removed(&mut self, model: &mut Model, entity: EntityId, key: KeyId) {
        if self.in_batch() {
            self.record(ConventionEvent::KeyRemoved { entity, key });
            return;
        }
        self.run_on_key_removed(model, entity, key);
    }

    pub(crate) fn run_on_key_removed(&mut self, model: &mut Model, entity: EntityId, key: KeyId) {
        if !model.entity_is_live(entity) {
            return;
        }
        let set = Rc::clone(&self.conventions);
        for convention in &set.key_removed {
            let mut ops = ModelOps::new(model, self);
            convention.process(entity, key, &mut ops);
        }
    }

    /// Announces a change of the primary-key designation.
    pub fn on_primary_key_changed(
        &mut self,
        model: &mut Model,
        key: KeyId,
        previous: Option<KeyId>,
    ) -> Option<KeyId> {
        if self.in_batch() {
            self.record(ConventionEvent::PrimaryKeyChanged { key, previous });
            return Some(key);
        }
        self.run_on_primary_key_changed(model, key, previous)
    }

    pub(crate) fn run_on_primary_key_changed(
        &mut self,
        model: &mut Model,
        key: KeyId,
        previous: Option<KeyId>,
    ) -> Option<KeyId> {
        if !model.key_is_live(key) {
            return None;
        }
        let set = Rc::clone(&self.conventions);
        for convention in &set.primary_key_changed {
            let approved = {
                let mut ops = ModelOps::new(model, self);
                convention.process(key, previous, &mut ops)
            };
            if !approved {
                return None;
            }
            if !model.key_is_live(key) {
                return None;
            }
        }
        Some(key)
    }

    // --- index events ---

    /// Announces a newly added index.
    pub fn on_index_added(&mut self, model: &mut Model, index: IndexId) -> Option<IndexId> {
        if self.in_batch() {
            self.record(ConventionEvent::IndexAdded { index });
            return Some(index);
        }
        self.run_on_index_added(model, index)
    }

    pub(crate) fn run_on_index_added(
        &mut self,
        model: &mut Model,
        mut index: IndexId,
    ) -> Option<IndexId> {
        if !model.index_is_live(index) {
            return None;
        }
        let set = Rc::clone(&self.conventions);
        for convention in &set.index_added {
            index = {
                let mut ops = ModelOps::new(model, self);
                convention.process(index, &mut ops)
            }?;
            if !model.index_is_live(index) {
                return None;
            }
        }
        Some(index)
    }

    /// Announces a removed index.
    pub fn on_index_removed(&mut self, model: &mut Model, entity: EntityId, index: IndexId) {
        if self.in_batch() {
            self.record(ConventionEvent::IndexRemoved { entity, index });
            return;
        }
        self.run_on_index_removed(model, entity, index);
    }

    pub(crate) fn run_on_index_removed(
        &mut self,
        model: &mut Model,
        entity: EntityId,
        index: IndexId,
    ) {
        if !model.entity_is_live(entity) {
            return;
        }
        let set = Rc::clone(&self.conventions);
        for convention in &set.index_removed {
            let mut ops = ModelOps::new(model, self);
            convention.process(entity, index, &mut ops);
        }
    }

    /// Announces a change of an index's uniqueness flag.
    pub fn on_index_uniqueness_changed(&mut self, model: &mut Model, index: IndexId) -> bool {
        if self.in_batch() {
            self.record(ConventionEvent::IndexUniquenessChanged { index });
            return true;
        }
        self.run_on_index_uniqueness_changed(model, index)
    }

    pub(crate) fn run_on_index_uniqueness_changed(
        &mut self,
        model: &mut Model,
        index: IndexId,
    ) -> bool {
        if !model.index_is_live(index) {
            return false;
        }
        let set = Rc::clone(&self.conventions);
        for convention in &set.index_uniqueness_changed {
            let approved = {
                let mut ops = ModelOps::new(model, self);
                convention.process(index, &mut ops)
            };
            if !approved {
                return false;
            }
            if !model.index_is_live(index) {
                return false;
            }
        }
        true
    }

    /// Announces an index annotation change. Returns the resolved value.
    ///
    /// # Errors
    ///
    /// Returns a validation error if `name` is empty.
    pub fn on_index_annotation_set(
        &mut self,
        model: &mut Model,
        index: IndexId,
        name: &str,
        value: Option<AnnotationValue>,
        old: Option<AnnotationValue>,
    ) -> ConveneResult<Option<AnnotationValue>> {
        if name.is_empty() {
            return Err(ValidationError::EmptyAnnotationName.into());
        }
        if self.in_batch() {
            self.record(ConventionEvent::IndexAnnotationSet {
                index,
                name: name.to_string(),
                value: value.clone(),
                old,
            });
            return Ok(value);
        }
        Ok(self.run_on_index_annotation_set(model, index, name, value, old))
    }

    pub(crate) fn run_on_index_annotation_set(
        &mut self,
        model: &mut Model,
        index: IndexId,
        name: &str,
        value: Option<AnnotationValue>,
        old: Option<AnnotationValue>,
    ) -> Option<AnnotationValue> {
        if !model.index_is_live(index) {
            return None;
        }
        let set = Rc::clone(&self.conventions);
        for convention in &set.index_annotation_set {
            let returned = {
                let mut ops = ModelOps::new(model, self);
                convention.process(index, name, value.as_ref(), old.as_ref(), &mut ops)
            };
            if returned != value {
                return returned;
            }
            if !model.index_is_live(index) {
                return None;
            }
        }
        value
    }

    // --- navigation events ---

    /// Announces a navigation added over a foreign key.
    pub fn on_navigation_added(
        &mut self,
        model: &mut Model,
        foreign_key: ForeignKeyId,
        navigation: NavigationId,
    ) -> Option<ForeignKeyId> {
        if self.in_batch() {
            self.record(ConventionEvent::NavigationAdded {
                foreign_key,
                navigation,
            });
            return Some(foreign_key);
        }
        self.run_on_navigation_added(model, foreign_key, navigation)
    }

    pub(crate) fn run_on_navigation_added(
        &mut self,
        model: &mut Model,
        mut foreign_key: ForeignKeyId,
        navigation: NavigationId,
    ) -> Option<ForeignKeyId> {
        if !model.foreign_key_is_live(foreign_key) {
            return None;
        }
        let set = Rc::clone(&self.conventions);
        for convention in &set.navigation_added {
            foreign_key = {
                let mut ops = ModelOps::new(model, self);
                convention.process(foreign_key, navigation, &mut ops)
            }?;
            if !model.foreign_key_is_live(foreign_key) {
                return None;
            }
        }
        Some(foreign_key)
    }

    /// Announces a removed navigation.
    ///
    /// # Errors
    ///
    /// Returns a validation error if `name` is empty.
    pub fn on_navigation_removed(
        &mut self,
        model: &mut Model,
        source: EntityId,
        target: EntityId,
        name: &str,
    ) -> ConveneResult<()> {
        if name.is_empty() {
            return Err(ValidationError::EmptyNavigationName.into());
        }
        if self.in_batch() {
            self.record(ConventionEvent::NavigationRemoved {
                source,
                target,
                name: name.to_string(),
            });
            return Ok(());
        }
        self.run_on_navigation_removed(model, source, target, name);
        Ok(())
    }

    pub(crate) fn run_on_navigation_removed(
        &mut self,
        model: &mut Model,
        source: EntityId,
        target: EntityId,
        name: &str,
    ) {
        if !model.entity_is_live(source) {
            return;
        }
        let set = Rc::clone(&self.conventions);
        for convention in &set.navigation_removed {
            let keep_going = {
                let mut ops = ModelOps::new(model, self);
                convention.process(source, target, name, &mut ops)
            };
            if !keep_going {
                break;
            }
        }
    }

    /// Announces a change of a foreign key's uniqueness flag.
    pub fn on_foreign_key_uniqueness_changed(
        &mut self,
        model: &mut Model,
        foreign_key: ForeignKeyId,
    ) -> bool {
        if self.in_batch() {
            self.record(ConventionEvent::ForeignKeyUniquenessChanged { foreign_key });
            return true;
        }
        self.run_on_foreign_key_uniqueness_changed(model, foreign_key)
    }

    pub(crate) fn run_on_foreign_key_uniqueness_changed(
        &mut self,
        model: &mut Model,
        foreign_key: ForeignKeyId,
    ) -> bool {
        if !model.foreign_key_is_live(foreign_key) {
            return false;
        }
        let set = Rc::clone(&self.conventions);
        for convention in &set.foreign_key_uniqueness_changed {
            let approved = {
                let mut ops = ModelOps::new(model, self);
                convention.process(foreign_key, &mut ops)
            };
            if !approved {
                return false;
            }
            if !model.foreign_key_is_live(foreign_key) {
                return false;
            }
        }
        true
    }

    /// Announces a change of a foreign key's principal end.
    pub fn on_principal_end_changed(
        &mut self,
        model: &mut Model,
        foreign_key: ForeignKeyId,
    ) -> Option<ForeignKeyId> {
        if self.in_batch() {
            self.record(ConventionEvent::PrincipalEndChanged { foreign_key });
            return Some(foreign_key);
        }
        self.run_on_principal_end_changed(model, foreign_key)
    }

    pub(crate) fn run_on_principal_end_changed(
        &mut self,
        model: &mut Model,
        mut foreign_key: ForeignKeyId,
    ) -> Option<ForeignKeyId> {
        if !model.foreign_key_is_live(foreign_key) {
            return None;
        }
        let set = Rc::clone(&self.conventions);
        for convention in &set.principal_end_changed {
            // No per-step liveness recheck here; a rule signalling None is
            // the only way this chain stops early.
            foreign_key = {
                let mut ops = ModelOps::new(model, self);
                convention.process(foreign_key, &mut ops)
            }?;
        }
        Some(foreign_key)
    }

    // --- property events ---

    /// Announces a newly added property.
    pub fn on_property_added(
        &mut self,
        model: &mut Model,
        property: PropertyId,
    ) -> Option<PropertyId> {
        if self.in_batch() {
            self.record(ConventionEvent::PropertyAdded { property });
            return Some(property);
        }
        self.run_on_property_added(model, property)
    }

    pub(crate) fn run_on_property_added(
        &mut self,
        model: &mut Model,
        mut property: PropertyId,
    ) -> Option<PropertyId> {
        // Property liveness covers the declaring entity as well.
        if !model.property_is_live(property) {
            return None;
        }
        let set = Rc::clone(&self.conventions);
        for convention in &set.property_added {
            property = {
                let mut ops = ModelOps::new(model, self);
                convention.process(property, &mut ops)
            }?;
            if !model.property_is_live(property) {
                return None;
            }
        }
        Some(property)
    }

    /// Announces a change of a property's nullability.
    pub fn on_property_nullable_changed(&mut self, model: &mut Model, property: PropertyId) -> bool {
        if self.in_batch() {
            self.record(ConventionEvent::PropertyNullableChanged { property });
            return true;
        }
        self.run_on_property_nullable_changed(model, property)
    }

    pub(crate) fn run_on_property_nullable_changed(
        &mut self,
        model: &mut Model,
        property: PropertyId,
    ) -> bool {
        if !model.property_is_live(property) {
            return false;
        }
        let set = Rc::clone(&self.conventions);
        for convention in &set.property_nullable_changed {
            let approved = {
                let mut ops = ModelOps::new(model, self);
                convention.process(property, &mut ops)
            };
            if !approved {
                return false;
            }
            if !model.property_is_live(property) {
                return false;
            }
        }
        true
    }

    /// Announces a change of a property's backing field.
    pub fn on_property_field_changed(
        &mut self,
        model: &mut Model,
        property: PropertyId,
        old_field: Option<String>,
    ) -> bool {
        if self.in_batch() {
            self.record(ConventionEvent::PropertyFieldChanged {
                property,
                old_field,
            });
            return true;
        }
        self.run_on_property_field_changed(model, property, old_field.as_deref())
    }

    pub(crate) fn run_on_property_field_changed(
        &mut self,
        model: &mut Model,
        property: PropertyId,
        old_field: Option<&str>,
    ) -> bool {
        if !model.property_is_live(property) {
            return false;
        }
        let set = Rc::clone(&self.conventions);
        for convention in &set.property_field_changed {
            let approved = {
                let mut ops = ModelOps::new(model, self);
                convention.process(property, old_field, &mut ops)
            };
            if !approved {
                return false;
            }
            if !model.property_is_live(property) {
                return false;
            }
        }
        true
    }

    /// Announces a property annotation change. Returns the resolved value.
    ///
    /// # Errors
    ///
    /// Returns a validation error if `name` is empty.
    pub fn on_property_annotation_set(
        &mut self,
        model: &mut Model,
        property: PropertyId,
        name: &str,
        value: Option<AnnotationValue>,
        old: Option<AnnotationValue>,
    ) -> ConveneResult<Option<AnnotationValue>> {
        if name.is_empty() {
            return Err(ValidationError::EmptyAnnotationName.into());
        }
        if self.in_batch() {
            self.record(ConventionEvent::PropertyAnnotationSet {
                property,
                name: name.to_string(),
                value: value.clone(),
                old,
            });
            return Ok(value);
        }
        Ok(self.run_on_property_annotation_set(model, property, name, value, old))
    }

    pub(crate) fn run_on_property_annotation_set(
        &mut self,
        model: &mut Model,
        property: PropertyId,
        name: &str,
        value: Option<AnnotationValue>,
        old: Option<AnnotationValue>,
    ) -> Option<AnnotationValue> {
        if !model.property_is_live(property) {
            return None;
        }
        let set = Rc::clone(&self.conventions);
        for convention in &set.property_annotation_set {
            let returned = {
                let mut ops = ModelOps::new(model, self);
                convention.process(property, name, value.as_ref(), old.as_ref(), &mut ops)
            };
            if returned != value {
                return returned;
            }
            if !model.property_is_live(property) {
                return None;
            }
        }
        value
    }

    // --- model lifecycle events ---

    /// Runs the model-initialized chain. Never queued, even inside a batch.
    pub fn on_model_initialized(&mut self, model: &mut Model) -> bool {
        let set = Rc::clone(&self.conventions);
        for convention in &set.model_initialized {
            let keep_going = {
                let mut ops = ModelOps::new(model, self);
                convention.process(&mut ops)
            };
            if !keep_going {
                return false;
            }
        }
        true
    }

    /// Runs the model-built chain. Never queued, even inside a batch.
    pub fn on_model_built(&mut self, model: &mut Model) -> bool {
        let set = Rc::clone(&self.conventions);
        for convention in &set.model_built {
            let keep_going = {
                let mut ops = ModelOps::new(model, self);
                convention.process(&mut ops)
            };
            if !keep_going {
                return false;
            }
        }
        true
    }

    /// Replays one recorded event through its immediate execution path.
    pub(crate) fn run_event(&mut self, model: &mut Model, event: ConventionEvent) {
        match event {
            ConventionEvent::EntityAdded { entity } => {
                self.run_on_entity_added(model, entity);
            }
            ConventionEvent::EntityRemoved { entity, name } => {
                self.run_on_entity_removed(model, entity, &name);
            }
            ConventionEvent::EntityIgnored { name } => {
                self.run_on_entity_ignored(model, &name);
            }
            ConventionEvent::MemberIgnored { entity, member } => {
                self.run_on_member_ignored(model, entity, &member);
            }
            ConventionEvent::BaseTypeChanged { entity, previous } => {
                self.run_on_base_type_changed(model, entity, previous);
            }
            ConventionEvent::EntityAnnotationSet {
                entity,
                name,
                value,
                old,
            } => {
                self.run_on_entity_annotation_set(model, entity, &name, value, old);
            }
            ConventionEvent::ForeignKeyAdded { foreign_key } => {
                self.run_on_foreign_key_added(model, foreign_key);
            }
            ConventionEvent::ForeignKeyRemoved {
                entity,
                foreign_key,
            } => {
                self.run_on_foreign_key_removed(model, entity, foreign_key);
            }
            ConventionEvent::KeyAdded { key } => {
                self.run_on_key_added(model, key);
            }
            ConventionEvent::KeyRemoved { entity, key } => {
                self.run_on_key_removed(model, entity, key);
            }
            ConventionEvent::PrimaryKeyChanged { key, previous } => {
                self.run_on_primary_key_changed(model, key, previous);
            }
            ConventionEvent::IndexAdded { index } => {
                self.run_on_index_added(model, index);
            }
            ConventionEvent::IndexRemoved { entity, index } => {
                self.run_on_index_removed(model, entity, index);
            }
            ConventionEvent::IndexUniquenessChanged { index } => {
                self.run_on_index_uniqueness_changed(model, index);
            }
            ConventionEvent::IndexAnnotationSet {
                index,
                name,
                value,
                old,
            } => {
                self.run_on_index_annotation_set(model, index, &name, value, old);
            }
            ConventionEvent::NavigationAdded {
                foreign_key,
                navigation,
            } => {
                self.run_on_navigation_added(model, foreign_key, navigation);
            }
            ConventionEvent::NavigationRemoved {
                source,
                target,
                name,
            } => {
                self.run_on_navigation_removed(model, source, target, &name);
            }
            ConventionEvent::ForeignKeyUniquenessChanged { foreign_key } => {
                self.run_on_foreign_key_uniqueness_changed(model, foreign_key);
            }
            ConventionEvent::PrincipalEndChanged { foreign_key } => {
                self.run_on_principal_end_changed(model, foreign_key);
            }
            ConventionEvent::PropertyAdded { property } => {
                self.run_on_property_added(model, property);
            }
            ConventionEvent::PropertyNullableChanged { property } => {
                self.run_on_property_nullable_changed(model, property);
            }
            ConventionEvent::PropertyFieldChanged {
                property,
                old_field,
            } => {
                self.run_on_property_field_changed(model, property, old_field.as_deref());
            }
            ConventionEvent::PropertyAnnotationSet {
                property,
                name,
                value,
                old,
            } => {
                self.run_on_property_annotation_set(model, property, &name, value, old);
            }
        }
    }
}
