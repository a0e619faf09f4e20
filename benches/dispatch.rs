use std::rc::Rc;

use criterion::{criterion_group, criterion_main, Criterion, Throughput};

use convene::conventions::{EntityAddedConvention, PropertyAddedConvention};
use convene::{ConventionSet, EntityId, ModelOps, PropertyId, SchemaBuilder};

struct AddIdProperty;

impl EntityAddedConvention for AddIdProperty {
    fn process(&self, entity: EntityId, ops: &mut ModelOps<'_>) -> Option<EntityId> {
        ops.add_property(entity, "id", false).ok()?;
        Some(entity)
    }
}

struct PassThrough;

impl PropertyAddedConvention for PassThrough {
    fn process(&self, property: PropertyId, _ops: &mut ModelOps<'_>) -> Option<PropertyId> {
        Some(property)
    }
}

fn cascading_set() -> ConventionSet {
    let mut set = ConventionSet::new();
    set.entity_added.push(Rc::new(AddIdProperty));
    set.property_added.push(Rc::new(PassThrough));
    set
}

fn bench_synchronous_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch/synchronous");
    group.throughput(Throughput::Elements(256));
    group.bench_function("add_256_entities", |b| {
        b.iter(|| {
            // Fresh builder per iteration so growth does not leak between samples.
            let mut builder = SchemaBuilder::new(cascading_set());
            let mut ops = builder.ops();
            for i in 0..256 {
                ops.add_entity(&format!("Entity{i}")).unwrap();
            }
            builder.build()
        });
    });
    group.finish();
}

fn bench_batched_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch/batched");
    group.throughput(Throughput::Elements(256));
    group.bench_function("add_256_entities_one_batch", |b| {
        b.iter(|| {
            let mut builder = SchemaBuilder::new(cascading_set());
            let mut batch = builder.batch();
            for i in 0..256 {
                batch.ops().add_entity(&format!("Entity{i}")).unwrap();
            }
            batch.release();
            builder.build()
        });
    });
    group.finish();
}

fn bench_derived_closure_fan_out(c: &mut Criterion) {
    c.bench_function("dispatch/derived_closure_ignore_member", |b| {
        let mut builder = SchemaBuilder::new(ConventionSet::new());
        let mut ops = builder.ops();
        let base = ops.add_entity("Base").unwrap().unwrap();
        for i in 0..64 {
            let derived = ops.add_entity(&format!("Derived{i}")).unwrap().unwrap();
            ops.set_base_type(derived, Some(base));
        }
        b.iter(|| {
            let mut ops = builder.ops();
            ops.ignore_member(base, "scratch").unwrap()
        });
    });
}

criterion_group!(
    benches,
    bench_synchronous_dispatch,
    bench_batched_dispatch,
    bench_derived_closure_fan_out
);
criterion_main!(benches);
