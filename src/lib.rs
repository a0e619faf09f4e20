//! # Convene - Convention-Driven Schema Graph Builder
//!
//! Convene builds a typed schema graph incrementally, with every structural
//! change announced to an ordered set of *conventions*: rules that react to
//! one kind of change and may themselves mutate the graph further. The
//! dispatcher at the core guarantees that rules run in registration order,
//! that each change is processed exactly once, and that arbitrarily deep
//! rule cascades execute as a flat iteration instead of recursion.
//!
//! ## Core Concepts
//!
//! - **Model**: The schema graph of entities, properties, keys, indexes,
//!   foreign keys, and navigations
//! - **Convention**: A rule reacting to one kind of structural change,
//!   registered in a [`ConventionSet`]
//! - **Dispatcher**: Routes each change to its convention chain, either
//!   immediately or deferred
//! - **Batch**: A window during which changes are recorded instead of
//!   processed, then drained to a fixed point on release
//!
//! ## Usage
//!
//! ```rust,ignore
//! use convene::{ConventionSet, SchemaBuilder};
//!
//! let mut builder = SchemaBuilder::new(ConventionSet::new());
//! let mut ops = builder.ops();
//!
//! // Changes announce themselves to conventions as they happen.
//! let order = ops.add_entity("Order")?.unwrap();
//! let id = ops.add_property(order, "id", false)?.unwrap();
//! ops.add_key(order, &[id])?;
//!
//! // Or defer a burst of work and let it settle at once.
//! let mut batch = builder.batch();
//! batch.ops().add_entity("Customer")?;
//! batch.release();
//!
//! let model = builder.build();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod conventions;
pub mod error;
pub mod ids;
pub mod model;
pub mod ops;

pub mod dispatch;
mod tracker;

// Re-export primary types at crate root for convenience
pub use conventions::ConventionSet;
pub use dispatch::{ConventionBatch, ConventionDispatcher};
pub use error::{ConveneError, ConveneResult, ValidationError};
pub use ids::{EntityId, ForeignKeyId, IndexId, KeyId, NavigationId, PropertyId};
pub use model::{AnnotationValue, Model};
pub use ops::{ModelOps, SchemaBuilder};
