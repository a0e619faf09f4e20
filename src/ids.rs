//! Identifier newtypes for schema graph nodes.
//!
//! Every node in the schema graph is addressed by a stable, globally unique
//! id. Handles held by callers and conventions are these ids; whether the
//! node behind an id is still live is a property of the [`Model`], not of
//! the id itself.
//!
//! [`Model`]: crate::model::Model

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! node_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random id.
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Creates an id from an existing UUID.
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the underlying UUID.
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }

            /// Creates a nil (all zeros) id, usable as a sentinel in tests.
            #[must_use]
            pub const fn nil() -> Self {
                Self(Uuid::nil())
            }

            /// Returns true if this is the nil id.
            #[must_use]
            pub fn is_nil(&self) -> bool {
                self.0.is_nil()
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

node_id! {
    /// Identifier of an entity type in the schema graph.
    EntityId
}

node_id! {
    /// Identifier of a scalar property declared on an entity.
    PropertyId
}

node_id! {
    /// Identifier of a candidate key declared on an entity.
    KeyId
}

node_id! {
    /// Identifier of an index declared on an entity.
    IndexId
}

node_id! {
    /// Identifier of a foreign key between two entities.
    ForeignKeyId
}

node_id! {
    /// Identifier of a navigation defined over a foreign key.
    NavigationId
}
