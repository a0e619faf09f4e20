//! Traversals over the deferred-work tree.
//!
//! [`ConventionVisitor`] is the generic tree-rewrite primitive: the default
//! scope visit consumes a scope, visits each child, and rebuilds a scope
//! from the surviving children (or yields nothing if none survived).
//! [`RunVisitor`] specializes it to *drain* a tree: every event leaf is
//! replayed through the dispatcher's immediate execution path and dropped,
//! so a full walk consumes the tree bottom-up, left to right, in the exact
//! order events were recorded.

use crate::dispatch::node::{ConventionEvent, ConventionNode, ConventionScope};
use crate::dispatch::ConventionDispatcher;
use crate::model::Model;

pub(crate) trait ConventionVisitor {
    fn visit(&mut self, node: ConventionNode) -> Option<ConventionNode> {
        match node {
            ConventionNode::Scope(scope) => self.visit_scope(scope).map(ConventionNode::Scope),
            ConventionNode::Event(event) => self.visit_event(event).map(ConventionNode::Event),
        }
    }

    /// Structural copy: keep children whose visit produced a survivor and
    /// rebuild the scope around them.
    fn visit_scope(&mut self, scope: ConventionScope) -> Option<ConventionScope> {
        let mut survivors = Vec::new();
        for child in scope.into_children() {
            if let Some(kept) = self.visit(child) {
                survivors.push(kept);
            }
        }
        if survivors.is_empty() {
            None
        } else {
            Some(ConventionScope::rebuilt(survivors))
        }
    }

    fn visit_event(&mut self, event: ConventionEvent) -> Option<ConventionEvent> {
        Some(event)
    }
}

/// Drains a scope tree by replaying every event through the dispatcher.
///
/// Reentrant dispatches triggered by the replayed chains see the open drain
/// scope and queue there; this visitor never grows the call stack beyond
/// the recorded nesting depth of explicit batches.
pub(crate) struct RunVisitor<'a> {
    model: &'a mut Model,
    dispatcher: &'a mut ConventionDispatcher,
}

impl<'a> RunVisitor<'a> {
    pub(crate) fn new(model: &'a mut Model, dispatcher: &'a mut ConventionDispatcher) -> Self {
        Self { model, dispatcher }
    }
}

impl ConventionVisitor for RunVisitor<'_> {
    fn visit_event(&mut self, event: ConventionEvent) -> Option<ConventionEvent> {
        self.dispatcher.run_event(self.model, event);
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::EntityId;

    struct KeepAll;

    impl ConventionVisitor for KeepAll {}

    struct DropEvents;

    impl ConventionVisitor for DropEvents {
        fn visit_event(&mut self, _event: ConventionEvent) -> Option<ConventionEvent> {
            None
        }
    }

    fn event() -> ConventionEvent {
        ConventionEvent::EntityAdded {
            entity: EntityId::new(),
        }
    }

    fn tree() -> ConventionScope {
        let mut inner = ConventionScope::new();
        inner.add(ConventionNode::Event(event()));
        inner.seal();

        let mut outer = ConventionScope::new();
        outer.add(ConventionNode::Event(event()));
        outer.add(ConventionNode::Scope(inner));
        outer.seal();
        outer
    }

    #[test]
    fn test_structural_copy_preserves_survivors() {
        let rebuilt = KeepAll.visit_scope(tree()).expect("children survived");
        assert_eq!(rebuilt.leaf_count(), 2);
        assert!(rebuilt.is_sealed());
    }

    #[test]
    fn test_dropping_all_events_collapses_the_tree() {
        // Pruned child scopes must not survive as empty husks.
        assert!(DropEvents.visit_scope(tree()).is_none());
    }

    #[test]
    fn test_partial_prune_keeps_order() {
        struct DropFirst {
            dropped: bool,
        }
        impl ConventionVisitor for DropFirst {
            fn visit_event(&mut self, event: ConventionEvent) -> Option<ConventionEvent> {
                if self.dropped {
                    Some(event)
                } else {
                    self.dropped = true;
                    None
                }
            }
        }

        let rebuilt = DropFirst { dropped: false }
            .visit_scope(tree())
            .expect("second event survives");
        assert_eq!(rebuilt.leaf_count(), 1);
    }
}
