//! Error types for convene.
//!
//! All errors are strongly typed using thiserror. Note that a convention
//! chain declining a change (veto) or finding its handle dead is *not* an
//! error: those outcomes propagate as `false` / `None` results. Errors here
//! cover argument validity at the dispatch boundary and internal defects.

use thiserror::Error;

/// Validation errors raised at the dispatch boundary before any chain runs.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// An entity name argument was empty.
    #[error("Entity name cannot be empty")]
    EmptyEntityName,

    /// A member name argument was empty.
    #[error("Member name cannot be empty")]
    EmptyMemberName,

    /// A property name argument was empty.
    #[error("Property name cannot be empty")]
    EmptyPropertyName,

    /// A navigation name argument was empty.
    #[error("Navigation name cannot be empty")]
    EmptyNavigationName,

    /// An annotation name argument was empty.
    #[error("Annotation name cannot be empty")]
    EmptyAnnotationName,

    /// An entity with the given name already exists.
    #[error("An entity named '{name}' already exists in the model")]
    DuplicateEntityName {
        /// The conflicting entity name.
        name: String,
    },

    /// The declaring entity already has a property with the given name.
    #[error("Entity '{entity}' already declares a property named '{name}'")]
    DuplicatePropertyName {
        /// The declaring entity name.
        entity: String,
        /// The conflicting property name.
        name: String,
    },

    /// A key, index, or foreign key was declared over zero properties.
    #[error("A key or index must cover at least one property")]
    EmptyPropertyList,

    /// A key or index referenced a property of a different entity.
    #[error("Key and index properties must be declared on the owning entity")]
    ForeignPropertyInKey,
}

/// Top-level error type for convene operations.
#[derive(Debug, Error)]
pub enum ConveneError {
    /// An argument was rejected at the dispatch boundary.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// An internal invariant was broken.
    #[error("Internal error: {message}")]
    Internal {
        /// Human-readable description of the defect.
        message: String,
    },
}

impl ConveneError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

/// Result type alias for convene operations.
pub type ConveneResult<T> = Result<T, ConveneError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_messages() {
        let err = ValidationError::DuplicateEntityName {
            name: "Order".to_string(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("Order"));
        assert!(msg.contains("already exists"));
    }

    #[test]
    fn test_convene_error_from_validation() {
        let err: ConveneError = ValidationError::EmptyEntityName.into();
        assert!(err.is_validation());
        assert!(format!("{err}").contains("Validation error"));
    }

    #[test]
    fn test_internal_error() {
        let err = ConveneError::internal("scope stack underflow");
        assert!(!err.is_validation());
        assert!(format!("{err}").contains("scope stack underflow"));
    }
}
