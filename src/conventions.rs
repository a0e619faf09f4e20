//! Convention traits and the convention set.
//!
//! A convention is an externally supplied rule that reacts to one kind of
//! structural change. Conventions for the same event kind form a *chain* and
//! run in registration order. Each trait below fixes the contract for one
//! chain shape:
//!
//! - *Transform* chains thread a handle through the chain; returning `None`
//!   (or invalidating the handle) stops the chain and the overall result is
//!   `None`.
//! - *Veto* chains return `bool`; the first `false` stops the chain.
//! - *Notify* chains run for their side effects after a removal.
//! - *Value-resolution* chains may override a proposed annotation value; the
//!   first rule to return a different value ends the chain with that value.
//!
//! Every rule receives a [`ModelOps`] and is free to perform further graph
//! mutations through it; those mutations re-enter the dispatcher and are
//! deferred until the current chain settles.
//!
//! The [`ConventionSet`] is the pre-ordered registry the dispatcher consumes.
//! The dispatcher never mutates it.

use std::rc::Rc;

use crate::ids::{EntityId, ForeignKeyId, IndexId, KeyId, NavigationId, PropertyId};
use crate::model::AnnotationValue;
use crate::ops::ModelOps;

/// Reacts to an entity being added to the model.
pub trait EntityAddedConvention {
    /// Processes the new entity, returning the (possibly replaced) handle,
    /// or `None` if the entity no longer exists.
    fn process(&self, entity: EntityId, ops: &mut ModelOps<'_>) -> Option<EntityId>;
}

/// Reacts to an entity having been removed from the model.
pub trait EntityRemovedConvention {
    /// Notified with the removed (tombstoned) entity and its name.
    fn process(&self, entity: EntityId, name: &str, ops: &mut ModelOps<'_>);
}

/// Reacts to a type name being marked as ignored.
pub trait EntityIgnoredConvention {
    /// Returns `false` to veto further processing of the ignore.
    fn process(&self, name: &str, ops: &mut ModelOps<'_>) -> bool;
}

/// Reacts to a member name being ignored on an entity.
///
/// The chain is applied once per entity in the inclusive derived-type
/// closure of the target entity.
pub trait MemberIgnoredConvention {
    /// Returns `false` to veto the ignore for this entity.
    fn process(&self, entity: EntityId, member: &str, ops: &mut ModelOps<'_>) -> bool;
}

/// Reacts to an entity's base type changing.
pub trait BaseTypeChangedConvention {
    /// Returns `false` to stop the chain.
    fn process(&self, entity: EntityId, previous: Option<EntityId>, ops: &mut ModelOps<'_>)
        -> bool;
}

/// Reacts to an annotation being set, removed, or changed on a node of
/// handle type `H`.
pub trait AnnotationSetConvention<H> {
    /// Receives the proposed value and the previous value. Returning a value
    /// different from `value` ends the chain with the returned value as the
    /// final result.
    fn process(
        &self,
        target: H,
        name: &str,
        value: Option<&AnnotationValue>,
        old: Option<&AnnotationValue>,
        ops: &mut ModelOps<'_>,
    ) -> Option<AnnotationValue>;
}

/// Reacts to a foreign key being added.
pub trait ForeignKeyAddedConvention {
    /// Processes the new foreign key, returning the (possibly replaced)
    /// handle, or `None` if it no longer exists.
    fn process(&self, foreign_key: ForeignKeyId, ops: &mut ModelOps<'_>) -> Option<ForeignKeyId>;
}

/// Reacts to a foreign key having been removed.
pub trait ForeignKeyRemovedConvention {
    /// Notified with the declaring entity and the removed (tombstoned) key.
    fn process(&self, entity: EntityId, foreign_key: ForeignKeyId, ops: &mut ModelOps<'_>);
}

/// Reacts to a candidate key being added.
pub trait KeyAddedConvention {
    /// Processes the new key, returning the (possibly replaced) handle, or
    /// `None` if it no longer exists.
    fn process(&self, key: KeyId, ops: &mut ModelOps<'_>) -> Option<KeyId>;
}

/// Reacts to a candidate key having been removed.
pub trait KeyRemovedConvention {
    /// Notified with the declaring entity and the removed (tombstoned) key.
    fn process(&self, entity: EntityId, key: KeyId, ops: &mut ModelOps<'_>);
}

/// Reacts to the primary key designation changing.
pub trait PrimaryKeyChangedConvention {
    /// Returns `false` to stop the chain.
    fn process(&self, key: KeyId, previous: Option<KeyId>, ops: &mut ModelOps<'_>) -> bool;
}

/// Reacts to an index being added.
pub trait IndexAddedConvention {
    /// Processes the new index, returning the (possibly replaced) handle, or
    /// `None` if it no longer exists.
    fn process(&self, index: IndexId, ops: &mut ModelOps<'_>) -> Option<IndexId>;
}

/// Reacts to an index having been removed.
pub trait IndexRemovedConvention {
    /// Notified with the declaring entity and the removed (tombstoned) index.
    fn process(&self, entity: EntityId, index: IndexId, ops: &mut ModelOps<'_>);
}

/// Reacts to an index's uniqueness flag changing.
pub trait IndexUniquenessChangedConvention {
    /// Returns `false` to stop the chain.
    fn process(&self, index: IndexId, ops: &mut ModelOps<'_>) -> bool;
}

/// Reacts to a navigation being added over a foreign key.
pub trait NavigationAddedConvention {
    /// Processes the foreign key carrying the navigation, returning the
    /// (possibly replaced) handle, or `None` if it no longer exists.
    fn process(
        &self,
        foreign_key: ForeignKeyId,
        navigation: NavigationId,
        ops: &mut ModelOps<'_>,
    ) -> Option<ForeignKeyId>;
}

/// Reacts to a navigation having been removed.
pub trait NavigationRemovedConvention {
    /// Notified with the two endpoints and the removed navigation's name.
    /// Returning `false` stops later rules from being notified.
    fn process(
        &self,
        source: EntityId,
        target: EntityId,
        name: &str,
        ops: &mut ModelOps<'_>,
    ) -> bool;
}

/// Reacts to a foreign key's uniqueness flag changing.
pub trait ForeignKeyUniquenessChangedConvention {
    /// Returns `false` to stop the chain.
    fn process(&self, foreign_key: ForeignKeyId, ops: &mut ModelOps<'_>) -> bool;
}

/// Reacts to the principal end of a foreign key changing.
pub trait PrincipalEndChangedConvention {
    /// Processes the foreign key; `None` stops the chain.
    fn process(&self, foreign_key: ForeignKeyId, ops: &mut ModelOps<'_>) -> Option<ForeignKeyId>;
}

/// Reacts to a property being added.
pub trait PropertyAddedConvention {
    /// Processes the new property, returning the (possibly replaced) handle,
    /// or `None` if it no longer exists.
    fn process(&self, property: PropertyId, ops: &mut ModelOps<'_>) -> Option<PropertyId>;
}

/// Reacts to a property's nullability changing.
pub trait PropertyNullableChangedConvention {
    /// Returns `false` to stop the chain.
    fn process(&self, property: PropertyId, ops: &mut ModelOps<'_>) -> bool;
}

/// Reacts to a property's backing field changing.
pub trait PropertyFieldChangedConvention {
    /// Returns `false` to stop the chain.
    fn process(&self, property: PropertyId, old_field: Option<&str>, ops: &mut ModelOps<'_>)
        -> bool;
}

/// Reacts to model-level lifecycle events (initialized, built).
///
/// Model chains always run immediately; they are never queued into a batch.
pub trait ModelConvention {
    /// Returns `false` to stop the chain.
    fn process(&self, ops: &mut ModelOps<'_>) -> bool;
}

/// The ordered registry of conventions, keyed by event kind.
///
/// Supplied in full before any dispatch happens; the dispatcher only reads
/// it. Within each list, rules run in the order they appear here.
#[derive(Default)]
pub struct ConventionSet {
    /// Chain for [`EntityAddedConvention`].
    pub entity_added: Vec<Rc<dyn EntityAddedConvention>>,
    /// Chain for [`EntityRemovedConvention`].
    pub entity_removed: Vec<Rc<dyn EntityRemovedConvention>>,
    /// Chain for [`EntityIgnoredConvention`].
    pub entity_ignored: Vec<Rc<dyn EntityIgnoredConvention>>,
    /// Chain for [`MemberIgnoredConvention`].
    pub member_ignored: Vec<Rc<dyn MemberIgnoredConvention>>,
    /// Chain for [`BaseTypeChangedConvention`].
    pub base_type_changed: Vec<Rc<dyn BaseTypeChangedConvention>>,
    /// Chain for entity annotations.
    pub entity_annotation_set: Vec<Rc<dyn AnnotationSetConvention<EntityId>>>,
    /// Chain for [`ForeignKeyAddedConvention`].
    pub foreign_key_added: Vec<Rc<dyn ForeignKeyAddedConvention>>,
    /// Chain for [`ForeignKeyRemovedConvention`].
    pub foreign_key_removed: Vec<Rc<dyn ForeignKeyRemovedConvention>>,
    /// Chain for [`KeyAddedConvention`].
    pub key_added: Vec<Rc<dyn KeyAddedConvention>>,
    /// Chain for [`KeyRemovedConvention`].
    pub key_removed: Vec<Rc<dyn KeyRemovedConvention>>,
    /// Chain for [`PrimaryKeyChangedConvention`].
    pub primary_key_changed: Vec<Rc<dyn PrimaryKeyChangedConvention>>,
    /// Chain for [`IndexAddedConvention`].
    pub index_added: Vec<Rc<dyn IndexAddedConvention>>,
    /// Chain for [`IndexRemovedConvention`].
    pub index_removed: Vec<Rc<dyn IndexRemovedConvention>>,
    /// Chain for [`IndexUniquenessChangedConvention`].
    pub index_uniqueness_changed: Vec<Rc<dyn IndexUniquenessChangedConvention>>,
    /// Chain for index annotations.
    pub index_annotation_set: Vec<Rc<dyn AnnotationSetConvention<IndexId>>>,
    /// Chain for [`NavigationAddedConvention`].
    pub navigation_added: Vec<Rc<dyn NavigationAddedConvention>>,
    /// Chain for [`NavigationRemovedConvention`].
    pub navigation_removed: Vec<Rc<dyn NavigationRemovedConvention>>,
    /// Chain for [`ForeignKeyUniquenessChangedConvention`].
    pub foreign_key_uniqueness_changed: Vec<Rc<dyn ForeignKeyUniquenessChangedConvention>>,
    /// Chain for [`PrincipalEndChangedConvention`].
    pub principal_end_changed: Vec<Rc<dyn PrincipalEndChangedConvention>>,
    /// Chain for [`PropertyAddedConvention`].
    pub property_added: Vec<Rc<dyn PropertyAddedConvention>>,
    /// Chain for [`PropertyNullableChangedConvention`].
    pub property_nullable_changed: Vec<Rc<dyn PropertyNullableChangedConvention>>,
    /// Chain for [`PropertyFieldChangedConvention`].
    pub property_field_changed: Vec<Rc<dyn PropertyFieldChangedConvention>>,
    /// Chain for property annotations.
    pub property_annotation_set: Vec<Rc<dyn AnnotationSetConvention<PropertyId>>>,
    /// Chain run when a model builder is created.
    pub model_initialized: Vec<Rc<dyn ModelConvention>>,
    /// Chain run when the model is finalized.
    pub model_built: Vec<Rc<dyn ModelConvention>>,
}

impl ConventionSet {
    /// Creates an empty convention set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}
