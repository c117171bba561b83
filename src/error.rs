//! Error type shared by every stage of the capture pipeline.
//!
//! Only a few of these are fatal to a run: a malformed chunk kills the detect
//! stage, and a shutdown timeout means stage threads were abandoned. Radio and
//! storage failures are normally logged and counted by the stage that saw them.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Malformed chunk: {0}")]
    MalformedChunk(String),

    #[error("Radio error: {0}")]
    Radio(String),

    #[error("Radio source exhausted")]
    SourceExhausted,

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML encode error: {0}")]
    TomlEncode(#[from] toml::ser::Error),

    #[cfg(feature = "storage_hdf5")]
    #[error("HDF5 error: {0}")]
    Hdf5(#[from] hdf5::Error),

    #[error("Configuration validation error: {0}")]
    Configuration(String),

    #[error("The {0} stage hung up")]
    Disconnected(&'static str),

    #[error("The {0} stage panicked")]
    StagePanicked(&'static str),

    #[error("Stages failed to stop within the grace period: {0:?}")]
    ShutdownTimeout(Vec<&'static str>),
}

impl Error {
    /// Secondary failures caused by another stage going away
    pub fn is_disconnect(&self) -> bool {
        matches!(self, Error::Disconnected(_))
    }
}
