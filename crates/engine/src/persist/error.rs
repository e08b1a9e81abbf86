use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::assets::AssetError;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("image {label} could not be restored: {source}")]
    Decode {
        label: String,
        #[source]
        source: AssetError,
    },
    #[error("save data has invalid format: {message}")]
    Format { message: String },
    #[error("save data ended inside {record}")]
    TruncatedRecord { record: &'static str },
    #[error("{what} exceeds capacity ({count} > {capacity})")]
    CapacityExceeded {
        what: &'static str,
        count: usize,
        capacity: usize,
    },
    #[error("failed to read/write file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub(crate) fn invalid_format(message: impl Into<String>) -> PersistError {
    PersistError::Format {
        message: message.into(),
    }
}
