use std::fmt;

/// The outcome taxonomy shared by the service, the clerk and the lock.
///
/// `NoKey` and `VersionMismatch` are definitive: the store is guaranteed
/// unchanged. `Maybe` and `Timeout` are ambiguous and only ever constructed
/// by the [`crate::clerk::Clerk`] -- the service itself never returns them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The named key does not exist.
    NoKey,

    /// The key exists but the caller's expected version is stale.
    VersionMismatch,

    /// The clerk cannot tell whether the operation was applied. The caller
    /// should re-read to disambiguate.
    Maybe,

    /// The clerk exhausted its retry budget without ever hearing from the
    /// server.
    Timeout,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NoKey => write!(f, "key does not exist"),
            Error::VersionMismatch => write!(f, "expected version does not match current version"),
            Error::Maybe => write!(f, "ambiguous outcome: operation may or may not have been applied"),
            Error::Timeout => write!(f, "retry budget exhausted with no server reply"),
        }
    }
}

impl std::error::Error for Error {}

/// Convenience alias used throughout the crate.
pub type KvResult<T> = Result<T, Error>;
