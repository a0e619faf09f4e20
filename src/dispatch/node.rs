//! Deferred-event nodes and the scope tree.
//!
//! While a batch is open, every structural change is recorded as an
//! immutable [`ConventionEvent`] instead of running its chain. Events live
//! inside a [`ConventionScope`], an ordered, append-only container that is
//! sealed exactly once. Scopes nest (a batch opened inside a batch becomes a
//! child scope), so the pending work forms a tree that is later drained
//! depth-first, left to right, preserving recording order.

use serde::Serialize;

use crate::ids::{EntityId, ForeignKeyId, IndexId, KeyId, NavigationId, PropertyId};
use crate::model::AnnotationValue;

/// An immutable record of one structural change, tagged by event kind.
///
/// The payload of each variant is exactly the argument list of the dispatch
/// call that recorded it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) enum ConventionEvent {
    EntityAdded {
        entity: EntityId,
    },
    EntityRemoved {
        entity: EntityId,
        name: String,
    },
    EntityIgnored {
        name: String,
    },
    MemberIgnored {
        entity: EntityId,
        member: String,
    },
    BaseTypeChanged {
        entity: EntityId,
        previous: Option<EntityId>,
    },
    EntityAnnotationSet {
        entity: EntityId,
        name: String,
        value: Option<AnnotationValue>,
        old: Option<AnnotationValue>,
    },
    ForeignKeyAdded {
        foreign_key: ForeignKeyId,
    },
    ForeignKeyRemoved {
        entity: EntityId,
        foreign_key: ForeignKeyId,
    },
    KeyAdded {
        key: KeyId,
    },
    KeyRemoved {
        entity: EntityId,
        key: KeyId,
    },
    PrimaryKeyChanged {
        key: KeyId,
        previous: Option<KeyId>,
    },
    IndexAdded {
        index: IndexId,
    },
    IndexRemoved {
        entity: EntityId,
        index: IndexId,
    },
    IndexUniquenessChanged {
        index: IndexId,
    },
    IndexAnnotationSet {
        index: IndexId,
        name: String,
        value: Option<AnnotationValue>,
        old: Option<AnnotationValue>,
    },
    NavigationAdded {
        foreign_key: ForeignKeyId,
        navigation: NavigationId,
    },
    NavigationRemoved {
        source: EntityId,
        target: EntityId,
        name: String,
    },
    ForeignKeyUniquenessChanged {
        foreign_key: ForeignKeyId,
    },
    PrincipalEndChanged {
        foreign_key: ForeignKeyId,
    },
    PropertyAdded {
        property: PropertyId,
    },
    PropertyNullableChanged {
        property: PropertyId,
    },
    PropertyFieldChanged {
        property: PropertyId,
        old_field: Option<String>,
    },
    PropertyAnnotationSet {
        property: PropertyId,
        name: String,
        value: Option<AnnotationValue>,
        old: Option<AnnotationValue>,
    },
}

/// A node in the deferred-work tree: either a recorded event (leaf) or a
/// nested scope.
#[derive(Debug)]
pub(crate) enum ConventionNode {
    Scope(ConventionScope),
    Event(ConventionEvent),
}

/// An ordered batch of deferred events and nested scopes.
///
/// Append-only until sealed. Sealing happens exactly once, when the owning
/// batch handle releases or when draining begins; appending afterwards is a
/// programming defect and panics.
#[derive(Debug, Default)]
pub(crate) struct ConventionScope {
    children: Vec<ConventionNode>,
    sealed: bool,
}

impl ConventionScope {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a scope from already-visited children. Used by the
    /// structural-copy traversal; the result is sealed since the originals
    /// were sealed before visiting started.
    pub(crate) fn rebuilt(children: Vec<ConventionNode>) -> Self {
        Self {
            children,
            sealed: true,
        }
    }

    pub(crate) fn children(&self) -> &[ConventionNode] {
        &self.children
    }

    pub(crate) fn into_children(self) -> Vec<ConventionNode> {
        self.children
    }

    /// Appends a node.
    ///
    /// # Panics
    ///
    /// Panics if the scope has been sealed.
    pub(crate) fn add(&mut self, node: ConventionNode) {
        assert!(
            !self.sealed,
            "attempted to append an event to a sealed scope"
        );
        self.children.push(node);
    }

    /// Seals the scope; all further appends panic.
    pub(crate) fn seal(&mut self) {
        self.sealed = true;
    }

    pub(crate) fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Counts event leaves reachable from this scope, breadth-first.
    /// Nested scopes are descended into but not counted themselves.
    pub(crate) fn leaf_count(&self) -> usize {
        let mut to_visit = std::collections::VecDeque::new();
        to_visit.push_back(self);
        let mut leaves = 0;
        while let Some(scope) = to_visit.pop_front() {
            for child in &scope.children {
                match child {
                    ConventionNode::Scope(nested) => to_visit.push_back(nested),
                    ConventionNode::Event(_) => leaves += 1,
                }
            }
        }
        leaves
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event() -> ConventionEvent {
        ConventionEvent::EntityAdded {
            entity: EntityId::new(),
        }
    }

    #[test]
    fn test_add_preserves_order() {
        let mut scope = ConventionScope::new();
        let a = event();
        let b = event();
        scope.add(ConventionNode::Event(a.clone()));
        scope.add(ConventionNode::Event(b.clone()));
        let events: Vec<_> = scope
            .children()
            .iter()
            .map(|n| match n {
                ConventionNode::Event(e) => e.clone(),
                ConventionNode::Scope(_) => panic!("unexpected scope"),
            })
            .collect();
        assert_eq!(events, vec![a, b]);
    }

    #[test]
    #[should_panic(expected = "sealed scope")]
    fn test_add_after_seal_panics() {
        let mut scope = ConventionScope::new();
        scope.seal();
        scope.add(ConventionNode::Event(event()));
    }

    #[test]
    fn test_leaf_count_descends_into_nested_scopes() {
        let mut inner = ConventionScope::new();
        inner.add(ConventionNode::Event(event()));
        inner.add(ConventionNode::Event(event()));
        inner.seal();

        let mut outer = ConventionScope::new();
        outer.add(ConventionNode::Event(event()));
        outer.add(ConventionNode::Scope(inner));
        outer.add(ConventionNode::Event(event()));

        // Scopes are not counted, only event leaves.
        assert_eq!(outer.leaf_count(), 4);
    }

    #[test]
    fn test_empty_scope_has_zero_leaves() {
        let mut outer = ConventionScope::new();
        let mut inner = ConventionScope::new();
        inner.seal();
        outer.add(ConventionNode::Scope(inner));
        assert_eq!(outer.leaf_count(), 0);
    }

    #[test]
    fn test_rebuilt_scope_is_sealed() {
        let scope = ConventionScope::rebuilt(vec![ConventionNode::Event(event())]);
        assert!(scope.is_sealed());
        assert_eq!(scope.leaf_count(), 1);
    }
}
