//! Directory scanning for upload candidates

use crate::config::Config;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

/// Finds files with a given extension below a root folder
///
/// A directory's own files are yielded before any of its subdirectories are
/// entered; both are visited in file name order. Excluded folders (the done
/// and error folders) are never entered.
#[derive(Debug, Clone)]
pub struct Scanner {
    root: PathBuf,
    extension: String,
    recursive: bool,
    excluded: Vec<PathBuf>,
}

impl Scanner {
    pub fn new(
        root: impl Into<PathBuf>,
        extension: impl Into<String>,
        recursive: bool,
        excluded: Vec<PathBuf>,
    ) -> Self {
        Self {
            root: root.into(),
            extension: extension.into(),
            recursive,
            excluded,
        }
    }

    /// Scanner for the folder, extension and done/error exclusions of `config`
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.root.clone(),
            config.extension.clone(),
            config.recursive,
            vec![config.done_dir.clone(), config.error_dir.clone()],
        )
    }

    /// Lazily walk the root folder and yield matching files
    ///
    /// Each directory is listed in full when it is entered, so moving yielded
    /// files away while iterating is safe.
    pub fn scan(&self) -> impl Iterator<Item = PathBuf> + '_ {
        let max_depth = if self.recursive { usize::MAX } else { 1 };

        WalkDir::new(&self.root)
            .min_depth(1)
            .max_depth(max_depth)
            .sort_by(|a, b| {
                a.file_type()
                    .is_dir()
                    .cmp(&b.file_type().is_dir())
                    .then_with(|| a.file_name().cmp(b.file_name()))
            })
            .into_iter()
            .filter_entry(|e| !self.is_excluded_dir(e))
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    debug!(error = %e, "Skipping unreadable entry");
                    None
                }
            })
            .map(DirEntry::into_path)
            .filter(|path| path.is_file() && self.matches_extension(path))
    }

    fn is_excluded_dir(&self, entry: &DirEntry) -> bool {
        if !entry.file_type().is_dir() {
            return false;
        }
        let path = entry.path();
        let excluded = self.excluded.iter().any(|dir| path.starts_with(dir));
        if excluded {
            debug!(?path, "Skipping done/error folder");
        }
        excluded
    }

    /// `*.<extension>` match on the file name, so `tar.gz` works as a filter
    fn matches_extension(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        let suffix_len = self.extension.len() + 1;
        if name.len() <= suffix_len {
            return false;
        }
        let split = name.len() - suffix_len;
        name.is_char_boundary(split) && {
            let (_, suffix) = name.split_at(split);
            suffix.starts_with('.') && suffix[1..].eq_ignore_ascii_case(&self.extension)
        }
    }
}
