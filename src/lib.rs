//! Drop Uploader - sends files from a drop folder to an ingestion web service
//!
//! This library provides the pieces of an unattended upload loop:
//! - Scanning a folder (optionally recursive) for one file type
//! - Multipart upload with basic authentication
//! - Moving files to a done or error folder by outcome
//! - Infinite, bounded or single-shot looping with cancellation

pub mod cli;
pub mod config;
pub mod error;
pub mod process;
pub mod relocate;
pub mod scan;
pub mod upload;

pub use cli::Cli;
pub use config::{Config, Credentials, LoopMode, Metadata, TraceLevel};
pub use error::{Error, Result};
pub use process::{FileResult, PassSummary, Processor, RunSummary, UploadStatus};
pub use scan::Scanner;
pub use upload::{HttpUploader, Upload};
