//! End-to-end tests for deferred dispatch: batching, drain order,
//! cascade flattening, and foreign-key identity across a batch.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use convene::conventions::{
    EntityAddedConvention, EntityRemovedConvention, ForeignKeyAddedConvention,
    PropertyAddedConvention,
};
use convene::{ConventionSet, EntityId, ForeignKeyId, ModelOps, PropertyId, SchemaBuilder};

type Log = Rc<RefCell<Vec<String>>>;

fn log() -> Log {
    Rc::new(RefCell::new(Vec::new()))
}

struct LogEntityAdded {
    log: Log,
}

impl EntityAddedConvention for LogEntityAdded {
    fn process(&self, entity: EntityId, ops: &mut ModelOps<'_>) -> Option<EntityId> {
        let name = ops.model().entity(entity)?.name.clone();
        self.log.borrow_mut().push(format!("entity:{name}"));
        Some(entity)
    }
}

struct LogPropertyAdded {
    log: Log,
}

impl PropertyAddedConvention for LogPropertyAdded {
    fn process(&self, property: PropertyId, ops: &mut ModelOps<'_>) -> Option<PropertyId> {
        let name = ops.model().property(property)?.name.clone();
        self.log.borrow_mut().push(format!("property:{name}"));
        Some(property)
    }
}

#[test]
fn test_batch_defers_chains_until_release() {
    let log = log();
    let mut set = ConventionSet::new();
    set.entity_added.push(Rc::new(LogEntityAdded {
        log: Rc::clone(&log),
    }));

    let mut builder = SchemaBuilder::new(set);
    let mut batch = builder.batch();
    batch.ops().add_entity("Order").unwrap();
    batch.ops().add_entity("Customer").unwrap();

    // Nothing ran while the batch was open.
    assert!(log.borrow().is_empty());

    batch.release();
    assert_eq!(*log.borrow(), vec!["entity:Order", "entity:Customer"]);
}

#[test]
fn test_dropping_a_batch_drains_it() {
    let log = log();
    let mut set = ConventionSet::new();
    set.entity_added.push(Rc::new(LogEntityAdded {
        log: Rc::clone(&log),
    }));

    let mut builder = SchemaBuilder::new(set);
    {
        let mut batch = builder.batch();
        batch.ops().add_entity("Order").unwrap();
    }
    assert_eq!(*log.borrow(), vec!["entity:Order"]);
}

struct AddIdProperty {
    log: Log,
}

impl EntityAddedConvention for AddIdProperty {
    fn process(&self, entity: EntityId, ops: &mut ModelOps<'_>) -> Option<EntityId> {
        let name = ops.model().entity(entity)?.name.clone();
        self.log.borrow_mut().push(format!("entity:{name}"));
        ops.add_property(entity, "id", false).ok()?;
        Some(entity)
    }
}

#[test]
fn test_cascades_run_after_all_recorded_events() {
    // Reentrant work queued by a drained chain lands in the next pass, so
    // both entity chains settle before either property chain runs.
    let log = log();
    let mut set = ConventionSet::new();
    set.entity_added.push(Rc::new(AddIdProperty {
        log: Rc::clone(&log),
    }));
    set.property_added.push(Rc::new(LogPropertyAdded {
        log: Rc::clone(&log),
    }));

    let mut builder = SchemaBuilder::new(set);
    let mut batch = builder.batch();
    batch.ops().add_entity("Order").unwrap();
    batch.ops().add_entity("Customer").unwrap();
    batch.release();

    assert_eq!(
        *log.borrow(),
        vec![
            "entity:Order",
            "entity:Customer",
            "property:id",
            "property:id"
        ]
    );
}

#[test]
fn test_synchronous_cascade_without_a_batch_recurses() {
    // With no batch open, reentrant work runs on the caller's stack, so
    // the property chain completes inside the entity chain.
    let log = log();
    let mut set = ConventionSet::new();
    set.entity_added.push(Rc::new(AddIdProperty {
        log: Rc::clone(&log),
    }));
    set.property_added.push(Rc::new(LogPropertyAdded {
        log: Rc::clone(&log),
    }));

    let mut builder = SchemaBuilder::new(set);
    builder.ops().add_entity("Order").unwrap();
    builder.ops().add_entity("Customer").unwrap();

    assert_eq!(
        *log.borrow(),
        vec![
            "entity:Order",
            "property:id",
            "entity:Customer",
            "property:id"
        ]
    );
}

#[test]
fn test_nested_batch_preserves_recording_order() {
    let log = log();
    let mut set = ConventionSet::new();
    set.entity_added.push(Rc::new(LogEntityAdded {
        log: Rc::clone(&log),
    }));

    let mut builder = SchemaBuilder::new(set);
    let mut outer = builder.batch();
    outer.ops().add_entity("A").unwrap();
    {
        let mut ops = outer.ops();
        let mut nested = ops.batch();
        nested.ops().add_entity("B").unwrap();
        nested.release();
    }
    outer.ops().add_entity("C").unwrap();

    assert!(log.borrow().is_empty());
    outer.release();
    assert_eq!(*log.borrow(), vec!["entity:A", "entity:B", "entity:C"]);
}

struct CountEntityAdded {
    seen: Rc<Cell<usize>>,
}

impl EntityAddedConvention for CountEntityAdded {
    fn process(&self, entity: EntityId, _ops: &mut ModelOps<'_>) -> Option<EntityId> {
        self.seen.set(self.seen.get() + 1);
        Some(entity)
    }
}

#[test]
fn test_each_recorded_event_is_processed_exactly_once() {
    let seen = Rc::new(Cell::new(0));
    let mut set = ConventionSet::new();
    set.entity_added.push(Rc::new(CountEntityAdded {
        seen: Rc::clone(&seen),
    }));

    let mut builder = SchemaBuilder::new(set);
    let mut batch = builder.batch();
    for i in 0..50 {
        batch.ops().add_entity(&format!("Entity{i}")).unwrap();
    }
    batch.release();

    assert_eq!(seen.get(), 50);
}

struct LogEntityRemoved {
    log: Log,
}

impl EntityRemovedConvention for LogEntityRemoved {
    fn process(&self, _entity: EntityId, name: &str, _ops: &mut ModelOps<'_>) {
        self.log.borrow_mut().push(format!("removed:{name}"));
    }
}

#[test]
fn test_dead_handle_at_drain_time_skips_the_chain() {
    // An entity added and removed inside the same batch: by the time the
    // drain replays the added event the handle is dead, so that chain is
    // skipped; the removal notification still runs.
    let log = log();
    let mut set = ConventionSet::new();
    set.entity_added.push(Rc::new(LogEntityAdded {
        log: Rc::clone(&log),
    }));
    set.entity_removed.push(Rc::new(LogEntityRemoved {
        log: Rc::clone(&log),
    }));

    let mut builder = SchemaBuilder::new(set);
    let mut batch = builder.batch();
    let entity = batch.ops().add_entity("Transient").unwrap().unwrap();
    batch.ops().remove_entity(entity);
    batch.release();

    assert_eq!(*log.borrow(), vec!["removed:Transient"]);
}

struct ReplaceOnce {
    done: Cell<bool>,
}

impl ForeignKeyAddedConvention for ReplaceOnce {
    fn process(&self, foreign_key: ForeignKeyId, ops: &mut ModelOps<'_>) -> Option<ForeignKeyId> {
        if self.done.replace(true) {
            return Some(foreign_key);
        }
        ops.replace_foreign_key(foreign_key)
    }
}

#[test]
fn test_batch_run_follows_foreign_key_replacement() {
    let mut set = ConventionSet::new();
    set.foreign_key_added.push(Rc::new(ReplaceOnce {
        done: Cell::new(false),
    }));

    let mut builder = SchemaBuilder::new(set);
    let mut batch = builder.batch();
    let (order, customer) = {
        let mut ops = batch.ops();
        let order = ops.add_entity("Order").unwrap().unwrap();
        let customer = ops.add_entity("Customer").unwrap().unwrap();
        (order, customer)
    };
    let fk = batch
        .ops()
        .add_foreign_key(order, customer, &[])
        .unwrap()
        .unwrap();

    let resolved = batch.run(fk).expect("relationship survives the drain");

    assert_ne!(resolved, fk);
    assert!(!builder.model().foreign_key_is_live(fk));
    assert!(builder.model().foreign_key_is_live(resolved));
}

struct RemoveForeignKeys;

impl ForeignKeyAddedConvention for RemoveForeignKeys {
    fn process(&self, foreign_key: ForeignKeyId, ops: &mut ModelOps<'_>) -> Option<ForeignKeyId> {
        ops.remove_foreign_key(foreign_key);
        None
    }
}

#[test]
fn test_batch_run_returns_none_when_the_key_is_removed() {
    let mut set = ConventionSet::new();
    set.foreign_key_added.push(Rc::new(RemoveForeignKeys));

    let mut builder = SchemaBuilder::new(set);
    let mut batch = builder.batch();
    let (order, customer) = {
        let mut ops = batch.ops();
        let order = ops.add_entity("Order").unwrap().unwrap();
        let customer = ops.add_entity("Customer").unwrap().unwrap();
        (order, customer)
    };
    let fk = batch
        .ops()
        .add_foreign_key(order, customer, &[])
        .unwrap()
        .unwrap();

    assert_eq!(batch.run(fk), None);
    assert!(!builder.model().foreign_key_is_live(fk));
}

#[test]
fn test_batch_run_without_conventions_returns_the_same_key() {
    let mut builder = SchemaBuilder::new(ConventionSet::new());
    let mut batch = builder.batch();
    let (order, customer) = {
        let mut ops = batch.ops();
        let order = ops.add_entity("Order").unwrap().unwrap();
        let customer = ops.add_entity("Customer").unwrap().unwrap();
        (order, customer)
    };
    let fk = batch
        .ops()
        .add_foreign_key(order, customer, &[])
        .unwrap()
        .unwrap();

    assert_eq!(batch.run(fk), Some(fk));
}

#[test]
fn test_model_lifecycle_chains_are_never_deferred() {
    // Opening a batch must not defer the built chain: build() drains
    // nothing here because the chain runs immediately.
    let log = log();
    let mut set = ConventionSet::new();
    set.entity_added.push(Rc::new(LogEntityAdded {
        log: Rc::clone(&log),
    }));

    let mut builder = SchemaBuilder::new(set);
    builder.ops().add_entity("Order").unwrap();
    let model = builder.build();
    assert_eq!(model.entity_count(), 1);
    assert_eq!(*log.borrow(), vec!["entity:Order"]);
}
