//! Error types for the flatquery engine

use thiserror::Error;

pub type Result<T> = std::result::Result<T, QueryError>;

/// Failures raised by the storage collaborator
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Relation not found: {0}")]
    NotFound(String),

    #[error("Data corruption: {0}")]
    Corruption(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}

impl From<bincode::Error> for StorageError {
    fn from(err: bincode::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

/// Query errors. Every variant is terminal for the current query.
#[derive(Error, Debug)]
pub enum QueryError {
    #[error("Query parsing error: {0}")]
    Parse(String),

    #[error("Invalid field: {0}")]
    Field(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Error executing query: {0}")]
    Execution(#[source] Box<QueryError>),
}

impl QueryError {
    /// Wrap a pipeline failure. Already-wrapped errors are returned as-is.
    pub fn execution(err: QueryError) -> Self {
        match err {
            QueryError::Execution(_) => err,
            other => QueryError::Execution(Box::new(other)),
        }
    }

    /// The error that originally stopped the query
    pub fn root_cause(&self) -> &QueryError {
        match self {
            QueryError::Execution(inner) => inner.root_cause(),
            other => other,
        }
    }

    pub fn is_parse(&self) -> bool {
        matches!(self.root_cause(), QueryError::Parse(_))
    }

    pub fn is_field(&self) -> bool {
        matches!(self.root_cause(), QueryError::Field(_))
    }
}
