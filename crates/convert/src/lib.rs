mod config;
mod inline;
mod job;
mod mime;

pub use crate::config::*;
pub use crate::inline::*;
pub use crate::job::*;
pub use crate::mime::*;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("no converter binary available")]
    MissingConverter,
    #[error("failed to spawn converter: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("converter exited with {status}")]
    NonZeroExit {
        status: std::process::ExitStatus,
        stderr: String,
    },
    #[error("conversion timed out after {0:?}")]
    TimedOut(std::time::Duration),
    #[error("converter produced no usable output")]
    EmptyOutput,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
