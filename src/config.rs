//! Run configuration for the drop uploader

use reqwest::Url;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{Level, debug, warn};

use crate::error::{Error, Result};

/// Extension used when none (or an implausible one) is given
pub const DEFAULT_EXTENSION: &str = "pdf";

/// Delay between scan passes when none (or a negative one) is given
pub const DEFAULT_DELAY_MS: u64 = 500;

/// Request timeout used when the requested one is missing or out of range
pub const DEFAULT_TIMEOUT_MS: u64 = 5_000;
pub const MIN_TIMEOUT_MS: i64 = 100;
pub const MAX_TIMEOUT_MS: i64 = 60_000;

pub const DEFAULT_DONE_FOLDER: &str = "done";
pub const DEFAULT_ERROR_FOLDER: &str = "error";

/// Route of the ingestion service used when `--endpoint` is omitted
pub const DEFAULT_ENDPOINT: &str = "NNH.Exams.RDG.Data";

/// Trace verbosity selected with `--trace[:level]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, clap::ValueEnum)]
pub enum TraceLevel {
    /// Progress messages: passes, uploads, moves
    #[default]
    Info,
    /// Everything, including per-file failure details
    Verbose,
}

impl TraceLevel {
    /// Default log level for an optional trace setting (no `--trace` keeps warnings only)
    pub fn log_level(trace: Option<TraceLevel>) -> Level {
        match trace {
            None => Level::WARN,
            Some(TraceLevel::Info) => Level::INFO,
            Some(TraceLevel::Verbose) => Level::DEBUG,
        }
    }
}

/// How many scan passes the processor performs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopMode {
    /// Scan, upload and sleep until interrupted
    Infinite,
    /// Exactly this many passes, each followed by the delay
    Bounded(u64),
    /// Upload one named file under the root folder, then stop
    SingleFile(PathBuf),
    /// A single scan pass without any delay
    SinglePass,
}

impl LoopMode {
    /// Map the `--infinity` count and `--filename` onto a loop mode
    ///
    /// `0` loops forever, a positive count bounds the passes, and a negative
    /// count runs once: the named file when one is given, otherwise one pass.
    pub fn from_count(count: i64, filename: Option<&str>) -> Self {
        match count {
            0 => LoopMode::Infinite,
            n if n > 0 => LoopMode::Bounded(n as u64),
            _ => match filename {
                Some(name) => LoopMode::SingleFile(PathBuf::from(name)),
                None => LoopMode::SinglePass,
            },
        }
    }
}

/// Basic authentication credentials
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Optional form fields sent alongside every file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    /// Patient identification number, sent as `identifacator`
    pub identifier: Option<String>,
    /// Accession number of the request, sent as `acnumber`
    pub accession_number: Option<String>,
    /// Barcode text, sent as `ocrbar`
    pub ocr_barcode: Option<String>,
}

/// Resolved run configuration, built once at startup
#[derive(Debug, Clone)]
pub struct Config {
    /// Folder scanned for files
    pub root: PathBuf,

    /// Descend into subfolders (done and error folders are always skipped)
    pub recursive: bool,

    /// File extension to upload, without the leading dot
    pub extension: String,

    /// Loop behaviour
    pub mode: LoopMode,

    /// Sleep between passes
    pub delay: Duration,

    /// Full target URL: base URL, trailing slash, endpoint
    pub upload_url: Url,

    /// Destination for uploaded files
    pub done_dir: PathBuf,

    /// Destination for failed files when `move_errors` is set
    pub error_dir: PathBuf,

    /// Move failed uploads into `error_dir` instead of leaving them in place
    pub move_errors: bool,

    /// Per-request timeout
    pub timeout: Duration,

    pub credentials: Credentials,

    pub metadata: Metadata,

    /// Skip TLS certificate validation
    pub accept_invalid_certs: bool,

    pub trace: Option<TraceLevel>,
}

impl Config {
    /// Configuration for `root` with every optional setting at its default
    pub fn new(root: impl Into<PathBuf>, upload_url: Url, credentials: Credentials) -> Self {
        let root = root.into();
        Self {
            done_dir: root.join(DEFAULT_DONE_FOLDER),
            error_dir: root.join(DEFAULT_ERROR_FOLDER),
            root,
            recursive: false,
            extension: DEFAULT_EXTENSION.to_string(),
            mode: LoopMode::Infinite,
            delay: Duration::from_millis(DEFAULT_DELAY_MS),
            upload_url,
            move_errors: true,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            credentials,
            metadata: Metadata::default(),
            accept_invalid_certs: false,
            trace: None,
        }
    }

    /// Create the done and error folders, then canonicalize all folder paths
    ///
    /// Creation failures are logged and tolerated; the relocator retries the
    /// creation when it first needs the folder.
    pub fn prepare_folders(mut self) -> Self {
        for dir in [&self.done_dir, &self.error_dir] {
            if dir.is_dir() {
                continue;
            }
            debug!(folder = %dir.display(), "Creating folder");
            if let Err(e) = fs::create_dir_all(dir) {
                warn!(folder = %dir.display(), error = %e, "Folder cannot be created");
            }
        }

        self.root = canonical_or_original(self.root);
        self.done_dir = canonical_or_original(self.done_dir);
        self.error_dir = canonical_or_original(self.error_dir);
        self
    }
}

fn canonical_or_original(path: PathBuf) -> PathBuf {
    fs::canonicalize(&path).unwrap_or(path)
}

/// Resolve the extension filter: leading dot stripped, 3 to 8 characters or `pdf`
pub fn resolve_extension(filetype: Option<&str>) -> String {
    let ext = filetype.map(|t| t.trim().trim_start_matches('.')).unwrap_or_default();
    if (3..=8).contains(&ext.chars().count()) {
        ext.to_string()
    } else {
        DEFAULT_EXTENSION.to_string()
    }
}

/// Resolve the pass delay; missing or negative values fall back to 500 ms
pub fn resolve_delay(delay_ms: Option<i64>) -> Duration {
    match delay_ms {
        Some(ms) if ms >= 0 => Duration::from_millis(ms as u64),
        _ => Duration::from_millis(DEFAULT_DELAY_MS),
    }
}

/// Resolve the request timeout; anything outside 100..=60000 ms becomes 5000 ms
pub fn resolve_timeout(timeout_ms: Option<i64>) -> Duration {
    match timeout_ms {
        Some(ms) if (MIN_TIMEOUT_MS..=MAX_TIMEOUT_MS).contains(&ms) => {
            Duration::from_millis(ms as u64)
        }
        _ => Duration::from_millis(DEFAULT_TIMEOUT_MS),
    }
}

/// Build the upload URL from the service base address and the endpoint
///
/// The base must be an absolute `https` URL. A trailing `/` is added to the
/// base before the endpoint is appended.
pub fn build_upload_url(web: Option<&str>, endpoint: Option<&str>) -> Result<Url> {
    let web = web.map(str::trim).unwrap_or_default();
    let base = Url::parse(web).map_err(|_| Error::InvalidUrl(web.to_string()))?;
    if base.scheme() != "https" || !base.has_host() {
        return Err(Error::InvalidUrl(web.to_string()));
    }

    let endpoint = endpoint
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .unwrap_or(DEFAULT_ENDPOINT);

    let mut target = web.to_string();
    if !target.ends_with('/') {
        target.push('/');
    }
    target.push_str(endpoint);

    Url::parse(&target).map_err(|_| Error::InvalidUrl(target))
}

/// Resolve a done/error folder under `root`
///
/// With `external`, an explicitly given name is used as its own path. The
/// default folder always stays under `root`.
pub fn resolve_folder(root: &Path, name: Option<&str>, default: &str, external: bool) -> PathBuf {
    match name.filter(|n| !n.is_empty()) {
        Some(name) if external => PathBuf::from(name),
        Some(name) => root.join(name),
        None => root.join(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn credentials() -> Credentials {
        Credentials {
            username: "scanner".into(),
            password: "secret".into(),
        }
    }

    #[test]
    fn test_timeout_clamping() {
        assert_eq!(resolve_timeout(Some(50)), Duration::from_millis(5000));
        assert_eq!(resolve_timeout(Some(100)), Duration::from_millis(100));
        assert_eq!(resolve_timeout(Some(60_000)), Duration::from_millis(60_000));
        assert_eq!(resolve_timeout(Some(60_001)), Duration::from_millis(5000));
        assert_eq!(resolve_timeout(Some(-1)), Duration::from_millis(5000));
        assert_eq!(resolve_timeout(None), Duration::from_millis(5000));
    }

    #[test]
    fn test_delay_defaults() {
        assert_eq!(resolve_delay(None), Duration::from_millis(500));
        assert_eq!(resolve_delay(Some(-20)), Duration::from_millis(500));
        assert_eq!(resolve_delay(Some(0)), Duration::ZERO);
        assert_eq!(resolve_delay(Some(2000)), Duration::from_millis(2000));
    }

    #[test]
    fn test_extension_resolution() {
        assert_eq!(resolve_extension(None), "pdf");
        assert_eq!(resolve_extension(Some("docx")), "docx");
        assert_eq!(resolve_extension(Some(".xlsx")), "xlsx");
        assert_eq!(resolve_extension(Some("js")), "pdf");
        assert_eq!(resolve_extension(Some("extension")), "pdf");
    }

    #[test]
    fn test_upload_url_joins_endpoint() {
        let url = build_upload_url(Some("https://ingest.local/webapi/inotify"), Some("Exams.Data")).unwrap();
        assert_eq!(url.as_str(), "https://ingest.local/webapi/inotify/Exams.Data");

        let url = build_upload_url(Some("https://ingest.local/webapi/inotify/"), Some("Exams.Data")).unwrap();
        assert_eq!(url.as_str(), "https://ingest.local/webapi/inotify/Exams.Data");

        let url = build_upload_url(Some("https://ingest.local:57772/api/"), None).unwrap();
        assert_eq!(url.as_str(), "https://ingest.local:57772/api/NNH.Exams.RDG.Data");
    }

    #[test]
    fn test_upload_url_requires_https() {
        assert!(matches!(
            build_upload_url(Some("http://ingest.local/api/"), None),
            Err(Error::InvalidUrl(_))
        ));
        assert!(matches!(
            build_upload_url(Some("not a url"), None),
            Err(Error::InvalidUrl(_))
        ));
        assert!(matches!(build_upload_url(None, None), Err(Error::InvalidUrl(_))));
    }

    #[test]
    fn test_loop_mode_from_count() {
        assert_eq!(LoopMode::from_count(0, None), LoopMode::Infinite);
        assert_eq!(LoopMode::from_count(3, Some("a.pdf")), LoopMode::Bounded(3));
        assert_eq!(
            LoopMode::from_count(-1, Some("a.pdf")),
            LoopMode::SingleFile(PathBuf::from("a.pdf"))
        );
        assert_eq!(LoopMode::from_count(-1, None), LoopMode::SinglePass);
    }

    #[test]
    fn test_trace_levels() {
        assert_eq!(TraceLevel::log_level(None), Level::WARN);
        assert_eq!(TraceLevel::log_level(Some(TraceLevel::Info)), Level::INFO);
        assert_eq!(TraceLevel::log_level(Some(TraceLevel::Verbose)), Level::DEBUG);
    }

    #[test]
    fn test_resolve_folder() {
        let root = Path::new("/drop");
        assert_eq!(resolve_folder(root, None, "done", false), PathBuf::from("/drop/done"));
        assert_eq!(resolve_folder(root, Some(""), "error", false), PathBuf::from("/drop/error"));
        assert_eq!(resolve_folder(root, Some("sent"), "done", false), PathBuf::from("/drop/sent"));
        assert_eq!(
            resolve_folder(root, Some("/archive/sent"), "done", true),
            PathBuf::from("/archive/sent")
        );
        assert_eq!(resolve_folder(root, None, "error", true), PathBuf::from("/drop/error"));
        assert_eq!(resolve_folder(root, Some(""), "done", true), PathBuf::from("/drop/done"));
    }

    #[test]
    fn test_prepare_folders_creates_done_and_error() {
        let dir = tempdir().unwrap();
        let url = Url::parse("https://ingest.local/api/Data").unwrap();
        let config = Config::new(dir.path(), url, credentials()).prepare_folders();

        assert!(config.done_dir.is_dir());
        assert!(config.error_dir.is_dir());
        assert!(config.done_dir.starts_with(&config.root));
    }

    #[test]
    fn test_credentials_debug_hides_password() {
        let rendered = format!("{:?}", credentials());
        assert!(rendered.contains("scanner"));
        assert!(!rendered.contains("secret"));
    }
}
