//! Batch handles and the convergence loop.

use tracing::debug;

use crate::dispatch::visitor::{ConventionVisitor, RunVisitor};
use crate::dispatch::ConventionDispatcher;
use crate::ids::ForeignKeyId;
use crate::model::Model;
use crate::ops::ModelOps;

/// A handle over a window of deferred convention execution.
///
/// Opening a batch pushes a fresh scope; every dispatch made while the
/// handle is alive is recorded there instead of running. When the handle
/// is released (explicitly or by drop) the scope is sealed and, if this
/// was the outermost batch, drained to a fixed point: each drain pass
/// opens a fresh scope, replays every recorded event in order, and then
/// treats whatever those replays queued as the next pass. The loop ends
/// when a pass records nothing.
///
/// A batch opened while another is live is *nested*: its sealed scope is
/// appended to the enclosing scope at release and drained with it, so
/// event order across nesting matches recording order.
pub struct ConventionBatch<'a> {
    model: &'a mut Model,
    dispatcher: &'a mut ConventionDispatcher,
    nested: bool,
    ran: bool,
}

impl<'a> ConventionBatch<'a> {
    pub(crate) fn new(model: &'a mut Model, dispatcher: &'a mut ConventionDispatcher) -> Self {
        let nested = dispatcher.in_batch();
        dispatcher.push_scope();
        Self {
            model,
            dispatcher,
            nested,
            ran: false,
        }
    }

    /// Mutation surface scoped to this batch. Changes made through it are
    /// deferred until the batch converges.
    pub fn ops(&mut self) -> ModelOps<'_> {
        ModelOps::new(self.model, self.dispatcher)
    }

    /// Read access to the model under construction.
    #[must_use]
    pub fn model(&self) -> &Model {
        self.model
    }

    /// Releases the batch, draining deferred work if this was the
    /// outermost one. Dropping the handle does the same; calling this is
    /// just the explicit spelling.
    pub fn release(self) {}

    /// Releases the batch and resolves `foreign_key` across whatever the
    /// drain did to it: if conventions replaced the key, the replacement
    /// is returned; if they removed it, `None`.
    pub fn run(mut self, foreign_key: ForeignKeyId) -> Option<ForeignKeyId> {
        let ticket = self.dispatcher.tracker.track(foreign_key);
        self.converge();
        let resolved = self.dispatcher.tracker.current(&ticket);
        self.dispatcher.tracker.release(ticket);
        match resolved {
            Some(current) if self.model.foreign_key_is_live(current) => Some(current),
            _ => None,
        }
    }

    fn converge(&mut self) {
        if self.ran {
            return;
        }
        self.ran = true;

        let Some(mut scope) = self.dispatcher.pop_scope() else {
            return;
        };
        scope.seal();

        if self.nested {
            self.dispatcher.append_child_scope(scope);
            return;
        }

        let mut current = scope;
        while current.leaf_count() > 0 {
            debug!(pending = current.leaf_count(), "draining deferred conventions");
            // Replays queue their reentrant dispatches into this fresh
            // scope; it becomes the next pass.
            self.dispatcher.push_scope();
            RunVisitor::new(&mut *self.model, &mut *self.dispatcher).visit_scope(current);
            let mut next = self
                .dispatcher
                .pop_scope()
                .expect("drain scope vanished mid-pass");
            next.seal();
            current = next;
        }
    }
}

impl Drop for ConventionBatch<'_> {
    fn drop(&mut self) {
        self.converge();
    }
}
