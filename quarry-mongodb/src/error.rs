//! Error types for engine operations.

use thiserror::Error;

/// Result type for engine operations.
pub type QueryResult<T> = Result<T, QueryError>;

/// Boxed source of a store-level failure.
pub type StoreSource = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur while dispatching, aggregating or checking existence.
#[derive(Error, Debug)]
pub enum QueryError {
    /// The logical entity is not present in the registry.
    #[error("model not found: {0}")]
    ModelNotFound(String),

    /// The operation name is not part of the supported set.
    #[error("operation not supported: {0}")]
    UnsupportedOperation(String),

    /// Failure reported by the underlying document store.
    #[error("store error: {0}")]
    Store(#[source] StoreSource),

    /// BSON serialization error.
    #[error("bson error: {0}")]
    Bson(#[from] bson::ser::Error),

    /// BSON deserialization error.
    #[error("bson deserialization error: {0}")]
    BsonDe(#[from] bson::de::Error),

    /// The payload does not fit the operation it was given to.
    #[error("invalid payload for {operation}: {message}")]
    InvalidPayload {
        /// Operation the payload was built for.
        operation: String,
        /// What was wrong with it.
        message: String,
    },

    /// A populate path that the entity does not declare as a relation.
    #[error("unknown relation `{path}` on model {entity}")]
    UnknownRelation {
        /// Entity being expanded.
        entity: String,
        /// Requested relation path.
        path: String,
    },

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl QueryError {
    /// Create a model not found error.
    pub fn model_not_found(entity: impl Into<String>) -> Self {
        Self::ModelNotFound(entity.into())
    }

    /// Create an unsupported operation error.
    pub fn unsupported_operation(name: impl Into<String>) -> Self {
        Self::UnsupportedOperation(name.into())
    }

    /// Wrap a store failure without altering it.
    pub fn store(source: impl Into<StoreSource>) -> Self {
        Self::Store(source.into())
    }

    /// Create an invalid payload error.
    pub fn invalid_payload(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidPayload {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create an unknown relation error.
    pub fn unknown_relation(entity: impl Into<String>, path: impl Into<String>) -> Self {
        Self::UnknownRelation {
            entity: entity.into(),
            path: path.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Check if this is a model not found error.
    pub fn is_model_not_found(&self) -> bool {
        matches!(self, Self::ModelNotFound(_))
    }

    /// Check if this is an unsupported operation error.
    pub fn is_unsupported_operation(&self) -> bool {
        matches!(self, Self::UnsupportedOperation(_))
    }

    /// Check if this error came from the store.
    pub fn is_store_error(&self) -> bool {
        matches!(self, Self::Store(_))
    }

    /// Check if this is an invalid payload error.
    pub fn is_invalid_payload(&self) -> bool {
        matches!(self, Self::InvalidPayload { .. })
    }
}

impl From<mongodb::error::Error> for QueryError {
    fn from(err: mongodb::error::Error) -> Self {
        Self::Store(Box::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;
    use std::io;

    #[test]
    fn test_error_creation() {
        let err = QueryError::model_not_found("Template");
        assert!(err.is_model_not_found());

        let err = QueryError::unsupported_operation("upsert");
        assert!(err.is_unsupported_operation());

        let err = QueryError::invalid_payload("read", "page must be at least 1");
        assert!(err.is_invalid_payload());
    }

    #[test]
    fn test_error_display() {
        let err = QueryError::model_not_found("Template");
        assert_eq!(err.to_string(), "model not found: Template");

        let err = QueryError::unsupported_operation("upsert");
        assert_eq!(err.to_string(), "operation not supported: upsert");

        let err = QueryError::unknown_relation("EmailTemplate", "createdBy");
        assert_eq!(
            err.to_string(),
            "unknown relation `createdBy` on model EmailTemplate"
        );
    }

    #[test]
    fn test_store_error_keeps_source() {
        let err = QueryError::store(io::Error::new(io::ErrorKind::ConnectionReset, "reset"));
        assert!(err.is_store_error());
        assert_eq!(err.to_string(), "store error: reset");

        let source = err.source().unwrap();
        let io_err = source.downcast_ref::<io::Error>().unwrap();
        assert_eq!(io_err.kind(), io::ErrorKind::ConnectionReset);
    }
}
