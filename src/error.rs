//! Error types.
//!
//! Internally the crate works with `anyhow::Error`. At the command boundary errors are wrapped in
//! the public `Error` type, which carries an `ErrorType` so that callers can tell a configuration
//! problem from a ledger problem without parsing messages.

use std::fmt::{Debug, Display, Formatter};

/// The result type used inside the library.
pub type Res<T> = std::result::Result<T, anyhow::Error>;

/// The result type returned by public command handlers.
pub type Result<T> = std::result::Result<T, Error>;

/// The broad category of a failure.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum ErrorType {
    /// The configuration file or home directory is missing or invalid.
    Config,
    /// The ledger file could not be read or describes an invalid ledger.
    Ledger,
    /// The persisted category overlay could not be written.
    Overlay,
    /// A command was given arguments it cannot act on.
    Request,
    /// Something went wrong inside the aggregation engine.
    Engine,
}

/// A public error: an `ErrorType` together with the underlying cause chain.
pub struct Error {
    kind: ErrorType,
    inner: anyhow::Error,
}

impl Error {
    pub fn new(kind: ErrorType, inner: impl Into<anyhow::Error>) -> Self {
        Self {
            kind,
            inner: inner.into(),
        }
    }

    pub fn kind(&self) -> ErrorType {
        self.kind
    }
}

impl Debug for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {:?}", self.kind, self.inner)
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#}", self.inner)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.inner.source()
    }
}

/// Converts an internal `anyhow` result into a public `Result` tagged with an `ErrorType`.
pub(crate) trait IntoResult<T> {
    fn pub_result(self, kind: ErrorType) -> Result<T>;
}

impl<T> IntoResult<T> for Res<T> {
    fn pub_result(self, kind: ErrorType) -> Result<T> {
        self.map_err(|e| Error::new(kind, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Context};

    #[test]
    fn test_pub_result_keeps_kind_and_context() {
        let res: Res<()> = Err(anyhow!("disk on fire")).context("Unable to read ledger");
        let err = res.pub_result(ErrorType::Ledger).unwrap_err();
        assert_eq!(err.kind(), ErrorType::Ledger);
        let message = err.to_string();
        assert!(message.contains("Unable to read ledger"));
        assert!(message.contains("disk on fire"));
    }
}
