//! Error types for envelope parsing.
//!
//! Malformed MIME content never produces an [`Error`]; defects are recorded
//! as [`Finding`](crate::Finding)s instead. These variants cover the few
//! conditions that stop a parse before it starts.

/// Result type alias for parsing operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Hard parse failures.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The input contained no bytes.
    #[error("Empty message")]
    EmptyInput,

    /// The input exceeded the configured size limit.
    #[error("Message of {size} bytes exceeds limit of {limit} bytes")]
    MessageTooLarge {
        /// Size of the rejected input.
        size: usize,
        /// Configured limit.
        limit: usize,
    },

    /// Reading the message stream failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
