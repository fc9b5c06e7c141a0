//! Error types for the drop uploader

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for drop uploader operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the drop uploader
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No folder given")]
    MissingFolder,

    #[error("Folder not exist: {0}")]
    FolderNotFound(PathBuf),

    #[error("Service web address '{0}' is not a valid https URL")]
    InvalidUrl(String),

    #[error("Credentials missing: pass --user/--pass or set UPLOADER_USER/UPLOADER_PASS")]
    MissingCredentials,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Upload of {path} rejected: {status} {reason}")]
    Rejected {
        path: PathBuf,
        status: u16,
        reason: String,
    },

    #[error("Failed to move {from} to {to}: {source}")]
    Relocate {
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },

    #[error("Path has no file name: {0}")]
    NoFileName(PathBuf),
}

impl Error {
    /// Whether this error should end with the help text instead of a failure exit
    pub fn shows_help(&self) -> bool {
        matches!(self, Error::MissingFolder | Error::InvalidUrl(_))
    }
}
