//! Registry error types

/// Error type for registry operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Another session already publishes this path
    PathAlreadyPublished(String),
    /// The path is published by a different session
    PublisherMismatch,
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::PathAlreadyPublished(path) => {
                write!(f, "Stream already has a publisher: {}", path)
            }
            RegistryError::PublisherMismatch => write!(f, "Publisher ID mismatch"),
        }
    }
}

impl std::error::Error for RegistryError {}
