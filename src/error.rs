use std::io;

use snafu::Snafu;

/// Errors surfaced by the public [`crate::Cache`] API.
///
/// Journal parse failures during [`crate::Cache::open`] (`Corruption`, in the spec's
/// vocabulary) are never part of this enum: they are handled internally by wiping the
/// cache directory and starting fresh, as documented on `open`.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CacheError {
    /// A bad key, a zero `max_size`, or a zero `value_count` was supplied.
    #[snafu(display("{reason}"))]
    InvalidArgument { reason: String },

    /// The cache, or the `Editor`/`Snapshot` handle, is no longer usable.
    #[snafu(display("{reason}"))]
    IllegalState { reason: String },

    /// A filesystem operation failed unrecoverably.
    #[snafu(display("I/O error: {source}"))]
    Io { source: io::Error },
}

impl From<io::Error> for CacheError {
    fn from(source: io::Error) -> Self {
        CacheError::Io { source }
    }
}

impl CacheError {
    pub(crate) fn illegal_state(reason: impl Into<String>) -> Self {
        CacheError::IllegalState {
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_argument(reason: impl Into<String>) -> Self {
        CacheError::InvalidArgument {
            reason: reason.into(),
        }
    }
}
