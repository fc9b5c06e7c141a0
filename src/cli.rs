//! CLI argument parsing with clap

use crate::config::{
    self, Config, Credentials, DEFAULT_DONE_FOLDER, DEFAULT_ERROR_FOLDER, LoopMode, Metadata,
    TraceLevel,
};
use crate::error::{Error, Result};
use clap::{ArgAction, Parser};
use std::ffi::OsString;
use std::path::PathBuf;

/// Drop Uploader - sends files from a drop folder to a web service
///
/// Scans a folder for files of one type, uploads each one as a multipart
/// form with basic authentication, and moves it into the done folder (or
/// the error folder when the upload fails).
#[derive(Parser, Debug)]
#[command(name = "drop-uploader")]
#[command(author, version, about, long_about = None)]
#[command(disable_help_flag = true)]
pub struct Cli {
    /// Folder to search for files
    pub folder: Option<PathBuf>,

    /// File to send (relative to the folder), used when --infinity is negative
    #[arg(long)]
    pub filename: Option<String>,

    /// Search subfolders too
    #[arg(long = "recoursive", alias = "recursive")]
    pub recursive: bool,

    /// File type to search for, e.g. pdf, docx, xlsx (default: pdf)
    #[arg(long)]
    pub filetype: Option<String>,

    /// Scan passes: 0 loops until Ctrl-C (default), N runs N passes, negative runs once
    #[arg(long, allow_negative_numbers = true)]
    pub infinity: Option<i64>,

    /// Delay between passes in ms (default: 500)
    #[arg(long, allow_negative_numbers = true)]
    pub delay: Option<i64>,

    /// Web service base address, e.g. https://ingest.local/webapi/inotify/
    #[arg(long)]
    pub web: Option<String>,

    /// Web service endpoint appended to the base address
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Barcode text sent as the `ocrbar` field
    #[arg(long)]
    pub ocrbar: Option<String>,

    /// Patient identification number sent as the `identifacator` field
    #[arg(long)]
    pub ident: Option<String>,

    /// Accession number sent as the `acnumber` field
    #[arg(long)]
    pub acnumber: Option<String>,

    /// Done folder name (default: done)
    #[arg(long)]
    pub done: Option<String>,

    /// Error folder name (default: error)
    #[arg(long)]
    pub error: Option<String>,

    /// Leave failed files in place instead of moving them to the error folder
    #[arg(long = "nomoveerror")]
    pub no_move_error: bool,

    /// Treat --done and --error as standalone paths instead of names under the folder
    #[arg(long = "moveExternal")]
    pub move_external: bool,

    /// Request timeout in ms, 100 to 60000 (default: 5000)
    #[arg(long, allow_negative_numbers = true)]
    pub timeout: Option<i64>,

    /// Connection username
    #[arg(long, env = "UPLOADER_USER")]
    pub user: Option<String>,

    /// Connection password
    #[arg(long = "pass", env = "UPLOADER_PASS", hide_env_values = true)]
    pub password: Option<String>,

    /// Print progress: --trace or --trace:info, --trace:verbose for details
    #[arg(
        long,
        value_enum,
        ignore_case = true,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "info"
    )]
    pub trace: Option<TraceLevel>,

    /// Accept any server certificate (disables TLS validation)
    #[arg(long)]
    pub insecure: bool,

    /// Also write the log to a timestamped file in this directory
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// Write the log file as JSON (requires --log-dir)
    #[arg(long)]
    pub json_log: bool,

    /// Show help
    #[allow(dead_code)]
    #[arg(short = '?', long = "help", short_alias = 'h', action = ArgAction::Help)]
    help: Option<bool>,
}

impl Cli {
    /// Parse the process arguments, accepting `--name:value` as well as `--name=value`
    pub fn parse_normalized() -> Self {
        Self::parse_from(normalize_args(std::env::args_os()))
    }

    /// Resolve arguments into a run configuration
    ///
    /// Fails with [`Error::MissingFolder`] or [`Error::InvalidUrl`] when the
    /// help text should be shown, [`Error::FolderNotFound`] when the folder
    /// does not exist, and [`Error::MissingCredentials`] when no username or
    /// password was supplied.
    pub fn to_config(&self) -> Result<Config> {
        let root = self
            .folder
            .clone()
            .filter(|f| !f.as_os_str().is_empty())
            .ok_or(Error::MissingFolder)?;
        if !root.is_dir() {
            return Err(Error::FolderNotFound(root));
        }

        let upload_url = config::build_upload_url(self.web.as_deref(), self.endpoint.as_deref())?;

        let credentials = match (non_empty(&self.user), non_empty(&self.password)) {
            (Some(username), Some(password)) => Credentials {
                username: username.to_string(),
                password: password.to_string(),
            },
            _ => return Err(Error::MissingCredentials),
        };

        let mut config = Config::new(root, upload_url, credentials);
        config.recursive = self.recursive;
        config.extension = config::resolve_extension(self.filetype.as_deref());
        config.mode = LoopMode::from_count(self.infinity.unwrap_or(0), non_empty(&self.filename));
        config.delay = config::resolve_delay(self.delay);
        config.done_dir = config::resolve_folder(
            &config.root,
            self.done.as_deref(),
            DEFAULT_DONE_FOLDER,
            self.move_external,
        );
        config.error_dir = config::resolve_folder(
            &config.root,
            self.error.as_deref(),
            DEFAULT_ERROR_FOLDER,
            self.move_external,
        );
        config.move_errors = !self.no_move_error;
        config.timeout = config::resolve_timeout(self.timeout);
        config.metadata = Metadata {
            identifier: non_empty(&self.ident).map(str::to_string),
            accession_number: non_empty(&self.acnumber).map(str::to_string),
            ocr_barcode: non_empty(&self.ocrbar).map(str::to_string),
        };
        config.accept_invalid_certs = self.insecure;
        config.trace = self.trace;

        Ok(config)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// Rewrite `--name:value` arguments to `--name=value`
///
/// Everything after a bare `--` is passed through untouched, as are
/// arguments that are not valid UTF-8.
pub fn normalize_args<I, T>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    let mut passthrough = false;
    args.into_iter()
        .map(Into::into)
        .map(|arg| {
            if passthrough {
                return arg;
            }
            if arg == "--" {
                passthrough = true;
                return arg;
            }
            let rewritten = arg
                .to_str()
                .and_then(|text| text.strip_prefix("--"))
                .and_then(|rest| rest.split_once(':'))
                .filter(|(name, _)| !name.is_empty() && !name.contains('='))
                .map(|(name, value)| format!("--{}={}", name, value));
            match rewritten {
                Some(text) => OsString::from(text),
                None => arg,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;
    use std::time::Duration;
    use tempfile::tempdir;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(normalize_args(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_normalize_colon_syntax() {
        let args = normalize_args([
            "drop-uploader",
            "--infinity:5",
            "--trace:Verbose",
            "--web:https://ingest.local/api/",
            "--web=https://a:b@host/",
            "/drop",
            "--",
            "--delay:10",
        ]);
        let args: Vec<_> = args.iter().map(|a| a.to_str().unwrap()).collect();
        assert_eq!(
            args,
            vec![
                "drop-uploader",
                "--infinity=5",
                "--trace=Verbose",
                "--web=https://ingest.local/api/",
                "--web=https://a:b@host/",
                "/drop",
                "--",
                "--delay:10",
            ]
        );
    }

    #[test]
    fn test_trace_flag_forms() {
        assert_eq!(parse(&["x", "/drop"]).trace, None);
        assert_eq!(parse(&["x", "--trace", "/drop"]).trace, Some(TraceLevel::Info));
        assert_eq!(
            parse(&["x", "--trace:verbose", "/drop"]).trace,
            Some(TraceLevel::Verbose)
        );
        assert_eq!(parse(&["x", "--trace:Info"]).trace, Some(TraceLevel::Info));
    }

    #[test]
    fn test_question_mark_shows_help() {
        let err = Cli::try_parse_from(["x", "-?"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DisplayHelp);
    }

    #[test]
    fn test_missing_folder_requests_help() {
        let cli = parse(&["x", "--web", "https://ingest.local/api/"]);
        let err = cli.to_config().unwrap_err();
        assert!(matches!(err, Error::MissingFolder));
        assert!(err.shows_help());
    }

    #[test]
    fn test_nonexistent_folder_fails() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope");
        let cli = parse(&[
            "x",
            missing.to_str().unwrap(),
            "--web",
            "https://ingest.local/api/",
            "--user",
            "u",
            "--pass",
            "p",
        ]);
        let err = cli.to_config().unwrap_err();
        assert!(matches!(err, Error::FolderNotFound(_)));
        assert!(!err.shows_help());
    }

    #[test]
    fn test_invalid_web_requests_help() {
        let dir = tempdir().unwrap();
        let folder = dir.path().to_str().unwrap();
        for web in ["http://ingest.local/api/", "::not a url::"] {
            let cli = parse(&["x", folder, "--web", web, "--user", "u", "--pass", "p"]);
            let err = cli.to_config().unwrap_err();
            assert!(matches!(err, Error::InvalidUrl(_)), "{web}");
            assert!(err.shows_help());
        }
    }

    #[test]
    fn test_missing_credentials_fail() {
        let dir = tempdir().unwrap();
        let folder = dir.path().to_str().unwrap();
        let cli = parse(&["x", folder, "--web", "https://ingest.local/api/", "--user", "u", "--pass", ""]);
        assert!(matches!(cli.to_config(), Err(Error::MissingCredentials)));
    }

    #[test]
    fn test_full_resolution() {
        let dir = tempdir().unwrap();
        let folder = dir.path().to_str().unwrap();
        let cli = parse(&[
            "x",
            folder,
            "--recoursive",
            "--filetype:DOCX",
            "--infinity:3",
            "--delay:-5",
            "--web:https://ingest.local/webapi/inotify",
            "--endpoint:Exams.Data",
            "--ident:8001011234",
            "--acnumber:ACC-42",
            "--done:sent",
            "--nomoveerror",
            "--timeout:50",
            "--user:scanner",
            "--pass:secret",
        ]);
        let config = cli.to_config().unwrap();

        assert!(config.recursive);
        assert_eq!(config.extension, "DOCX");
        assert_eq!(config.mode, LoopMode::Bounded(3));
        assert_eq!(config.delay, Duration::from_millis(500));
        assert_eq!(
            config.upload_url.as_str(),
            "https://ingest.local/webapi/inotify/Exams.Data"
        );
        assert_eq!(config.done_dir, dir.path().join("sent"));
        assert_eq!(config.error_dir, dir.path().join("error"));
        assert!(!config.move_errors);
        assert_eq!(config.timeout, Duration::from_millis(5000));
        assert_eq!(config.credentials.username, "scanner");
        assert_eq!(config.metadata.identifier.as_deref(), Some("8001011234"));
        assert_eq!(config.metadata.accession_number.as_deref(), Some("ACC-42"));
        assert_eq!(config.metadata.ocr_barcode, None);
        assert!(!config.accept_invalid_certs);
    }

    #[test]
    fn test_single_file_mode_needs_filename() {
        let dir = tempdir().unwrap();
        let folder = dir.path().to_str().unwrap();
        let base = ["x", folder, "--web", "https://ingest.local/api/", "--user", "u", "--pass", "p"];

        let mut with_name = base.to_vec();
        with_name.extend(["--infinity", "-1", "--filename", "scan.pdf"]);
        assert_eq!(
            parse(&with_name).to_config().unwrap().mode,
            LoopMode::SingleFile(PathBuf::from("scan.pdf"))
        );

        let mut without_name = base.to_vec();
        without_name.extend(["--infinity", "-1"]);
        assert_eq!(parse(&without_name).to_config().unwrap().mode, LoopMode::SinglePass);
    }

    #[test]
    fn test_move_external_uses_paths_as_given() {
        let dir = tempdir().unwrap();
        let folder = dir.path().join("drop");
        std::fs::create_dir(&folder).unwrap();
        let archive = dir.path().join("archive");
        let cli = parse(&[
            "x",
            folder.to_str().unwrap(),
            "--web",
            "https://ingest.local/api/",
            "--user",
            "u",
            "--pass",
            "p",
            "--moveExternal",
            "--done",
            archive.to_str().unwrap(),
        ]);
        let config = cli.to_config().unwrap();
        assert_eq!(config.done_dir, archive);
        assert_eq!(config.error_dir, folder.join("error"));
    }

    #[test]
    fn test_insecure_accepts_invalid_certs() {
        let dir = tempdir().unwrap();
        let cli = parse(&[
            "x",
            dir.path().to_str().unwrap(),
            "--web",
            "https://ingest.local/api/",
            "--user",
            "u",
            "--pass",
            "p",
            "--insecure",
        ]);
        assert!(cli.to_config().unwrap().accept_invalid_certs);
    }
}
