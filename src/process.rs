//! Scan-upload-relocate loop
//!
//! Handles the core logic of:
//! - Scanning the drop folder for matching files
//! - Uploading each file once per pass
//! - Moving it to the done or error folder
//! - Repeating passes according to the loop mode

use crate::config::{Config, LoopMode};
use crate::relocate::relocate;
use crate::scan::Scanner;
use crate::upload::Upload;
use std::path::{Path, PathBuf};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

/// Outcome of the upload attempt for one file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStatus {
    /// The service answered with a 2xx status
    Success,
    /// Non-2xx answer, transport error or unreadable file
    Failure,
}

/// Result of processing a single file
#[derive(Debug, Clone)]
pub struct FileResult {
    /// Path the file was found at
    pub source: PathBuf,
    /// Where the file was moved to, `None` if it stayed in place
    pub destination: Option<PathBuf>,
    pub status: UploadStatus,
    /// Upload or relocation error message
    pub error: Option<String>,
}

/// Counters for one or more scan passes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub files: usize,
    pub uploaded: usize,
    pub failed: usize,
    pub moved_to_done: usize,
    pub moved_to_error: usize,
    pub left_in_place: usize,
}

impl PassSummary {
    pub fn record(&mut self, result: &FileResult) {
        self.files += 1;
        match result.status {
            UploadStatus::Success => self.uploaded += 1,
            UploadStatus::Failure => self.failed += 1,
        }
        match (result.status, &result.destination) {
            (UploadStatus::Success, Some(_)) => self.moved_to_done += 1,
            (UploadStatus::Failure, Some(_)) => self.moved_to_error += 1,
            (_, None) => self.left_in_place += 1,
        }
    }

    pub fn merge(&mut self, other: &PassSummary) {
        self.files += other.files;
        self.uploaded += other.uploaded;
        self.failed += other.failed;
        self.moved_to_done += other.moved_to_done;
        self.moved_to_error += other.moved_to_error;
        self.left_in_place += other.left_in_place;
    }

    pub fn summary(&self) -> String {
        format!(
            "Files: {}, Uploaded: {}, Failed: {}, Done: {}, Error: {}, Left: {}",
            self.files,
            self.uploaded,
            self.failed,
            self.moved_to_done,
            self.moved_to_error,
            self.left_in_place
        )
    }
}

/// Totals of a whole run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Scan passes started (a single-file run counts as one)
    pub passes: u64,
    pub totals: PassSummary,
}

/// Drives scan passes against an uploader
pub struct Processor<U> {
    config: Config,
    scanner: Scanner,
    uploader: U,
}

impl<U: Upload> Processor<U> {
    pub fn new(config: Config, uploader: U) -> Self {
        let scanner = Scanner::from_config(&config);
        Self {
            config,
            scanner,
            uploader,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run passes according to the configured loop mode
    ///
    /// `cancel` is checked between passes only; a pass that has started
    /// always runs to the end, followed by its delay.
    pub async fn run(&self, cancel: &CancellationToken) -> RunSummary {
        let mut run = RunSummary::default();

        match &self.config.mode {
            LoopMode::Infinite => {
                while !cancel.is_cancelled() {
                    run.passes += 1;
                    self.pass_and_record(run.passes, &mut run).await;
                    sleep(self.config.delay).await;
                }
                info!("Looping ended");
            }
            LoopMode::Bounded(count) => {
                for pass in 1..=*count {
                    if cancel.is_cancelled() {
                        info!(pass, count, "Looping ended");
                        break;
                    }
                    debug!("Loop {}/{}", pass, count);
                    run.passes += 1;
                    self.pass_and_record(pass, &mut run).await;
                    sleep(self.config.delay).await;
                }
            }
            LoopMode::SingleFile(name) => {
                let path = self.config.root.join(name);
                run.passes = 1;
                if path.is_file() {
                    info!(path = %path.display(), "Process file");
                    let result = self.process_file(&path).await;
                    run.totals.record(&result);
                } else {
                    warn!(path = %path.display(), "File not found");
                }
            }
            LoopMode::SinglePass => {
                run.passes = 1;
                self.pass_and_record(1, &mut run).await;
            }
        }

        run
    }

    async fn pass_and_record(&self, pass: u64, run: &mut RunSummary) {
        let results = self.run_pass(pass).await;
        let mut summary = PassSummary::default();
        for result in &results {
            summary.record(result);
        }
        if summary.files > 0 {
            info!(pass, "{}", summary.summary());
        } else {
            debug!(pass, "No files found");
        }
        run.totals.merge(&summary);
    }

    /// Scan once and process every matching file in scan order
    pub async fn run_pass(&self, pass: u64) -> Vec<FileResult> {
        let span = info_span!("scan_pass", pass);
        async {
            let mut results = Vec::new();
            for path in self.scanner.scan() {
                results.push(self.process_file(&path).await);
            }
            results
        }
        .instrument(span)
        .await
    }

    /// Upload one file and move it according to the outcome
    pub async fn process_file(&self, path: &Path) -> FileResult {
        debug!(path = %path.display(), "Processing file");

        let (status, target, mut error) = match self.uploader.upload(path).await {
            Ok(()) => {
                info!(path = %path.display(), "File sent");
                (UploadStatus::Success, Some(&self.config.done_dir), None)
            }
            Err(e) => {
                info!(path = %path.display(), "Error send fail");
                debug!(path = %path.display(), error = %e, "Upload error");
                let target = self.config.move_errors.then_some(&self.config.error_dir);
                (UploadStatus::Failure, target, Some(e.to_string()))
            }
        };

        let mut destination = None;
        if let Some(dir) = target {
            match relocate(path, dir).await {
                Ok(dest) => {
                    debug!(from = %path.display(), to = %dest.display(), "File moved");
                    destination = Some(dest);
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Error fail move");
                    error.get_or_insert_with(|| e.to_string());
                }
            }
        }

        FileResult {
            source: path.to_path_buf(),
            destination,
            status,
            error,
        }
    }
}
