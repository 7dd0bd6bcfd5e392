mod detect;
mod extract;
mod load;
mod markdown;
mod mhtml;
mod page;
mod save;

pub use crate::detect::*;
pub use crate::extract::*;
pub use crate::load::*;
pub use crate::markdown::*;
pub use crate::mhtml::*;
pub use crate::page::*;
pub use crate::save::*;

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IoError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("document has no text/html part")]
    MissingHtmlPart,
    #[error(transparent)]
    Convert(#[from] penmark_convert::ConvertError),
}
