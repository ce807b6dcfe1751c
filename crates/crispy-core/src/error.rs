use thiserror::Error;

/// Errors raised by stores, paths and bindings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// A binding was requested with no enclosing scope for its context.
    #[error("store not found: no scope of context `{context}` is active")]
    ScopeNotFound { context: String },

    /// A write traversed an absent or empty intermediate container.
    ///
    /// Intermediate structure is never created on demand; it has to exist in
    /// the initial state.
    #[error("path `{path}` is not initialized: segment `{segment}` must exist before writing")]
    PathNotInitialized { path: String, segment: String },

    #[error("invalid path `{path}`")]
    InvalidPath { path: String },

    /// The path does not exist in the declared shape of the store.
    #[error("unknown path `{path}`")]
    UnknownPath { path: String },

    #[error("value at `{path}` is not a {expected}")]
    TypeMismatch {
        path: String,
        expected: &'static str,
    },
}

pub type Result<T, E = StoreError> = std::result::Result<T, E>;
