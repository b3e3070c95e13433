use crate::container::handler;
use crate::host;
use crate::storage;

/// Errors surfaced by the [`crate::manager::Manager`] to its callers.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Configuration(String),
    #[error("container `{0}` not found")]
    NotFound(String),
    #[error("handler for container `{name}` failed: {source}")]
    Handler {
        name: String,
        #[source]
        source: handler::Error,
    },
    #[error("stats storage failed for container `{name}`: {source}")]
    Storage {
        name: String,
        #[source]
        source: storage::Error,
    },
    #[error("failed to read host information: {0}")]
    Host(#[from] host::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn handler(name: impl Into<String>, source: handler::Error) -> Self {
        Self::Handler {
            name: name.into(),
            source,
        }
    }

    pub(crate) fn storage(name: impl Into<String>, source: storage::Error) -> Self {
        Self::Storage {
            name: name.into(),
            source,
        }
    }
}

pub trait ResultOkLogExt<T, E> {
    fn ok_log(self) -> Option<T>;
}

impl<T, E> ResultOkLogExt<T, E> for std::result::Result<T, E>
where
    E: std::error::Error,
{
    fn ok_log(self) -> Option<T> {
        match self {
            Ok(ok) => Some(ok),
            Err(err) => {
                log::error!("{err}");
                None
            }
        }
    }
}
