use crate::error::{Error, Result};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Base name and extension of a path, the lookup key for per-extension
/// configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileName {
    /// File name without its extension
    pub name: String,

    /// Extension including the leading dot, or empty when there is none
    pub extension: String,
}

impl FileName {
    /// Splits a path into its base name and extension.
    ///
    /// Dotfiles such as `.env` have no extension, matching how the rest of
    /// the toolchain treats them.
    #[must_use]
    pub fn divide(path: &Path) -> Self {
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let extension = path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();

        Self { name, extension }
    }

    /// Returns the name of the generated test file, `<name>.test<ext>`.
    #[must_use]
    pub fn test_file_name(&self) -> String {
        format!("{}.test{}", self.name, self.extension)
    }
}

/// Kind of filesystem entry an input or output path refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathKind {
    /// Regular file, or anything that is not a directory
    File,
    /// Directory
    Directory,
}

impl PathKind {
    /// Detects the kind of `path`. Paths that cannot be inspected count as
    /// files.
    #[must_use]
    pub fn of(path: &Path) -> Self {
        match fs::metadata(path) {
            Ok(meta) if meta.is_dir() => Self::Directory,
            Ok(_) => Self::File,
            Err(e) => {
                tracing::debug!("Could not inspect {}: {}", path.display(), e);
                Self::File
            }
        }
    }
}

/// Reads a file's text content, yielding an empty string when the file is
/// missing or unreadable.
#[must_use]
pub fn read_file(path: &Path) -> String {
    match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            warn!("Error reading file {}: {}", path.display(), e);
            String::new()
        }
    }
}

/// Derives the output path for `input` inside `output_dir`, or next to the
/// input when no directory is given.
#[must_use]
pub fn test_output_path(input: &Path, output_dir: Option<&Path>) -> PathBuf {
    let file_name = FileName::divide(input).test_file_name();

    match output_dir {
        Some(dir) => dir.join(file_name),
        None => input
            .parent()
            .map_or_else(|| PathBuf::from(&file_name), |p| p.join(&file_name)),
    }
}

/// Writes a file atomically.
///
/// Content goes to a temporary sibling first, is synced, then renamed over
/// the target, so an interrupted write never leaves a truncated file behind.
/// The temporary file is removed on every failure.
///
/// # Errors
///
/// Returns an error if the temporary file cannot be written or renamed.
pub fn write_file_atomic(path: &Path, content: &str) -> Result<()> {
    let temp_path = temp_path_for(path);

    let written = write_synced(&temp_path, content)
        .map_err(|e| Error::io(&temp_path, e))
        .and_then(|()| fs::rename(&temp_path, path).map_err(|e| Error::io(path, e)));

    if written.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    written?;

    info!("Successfully wrote to file: {}", path.display());
    Ok(())
}

fn write_synced(path: &Path, content: &str) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(content.as_bytes())?;
    file.sync_all()
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Output file that receives streamed tokens one append at a time.
///
/// The file is opened, truncating any previous content, only when the first
/// token arrives, so a request that fails before producing anything leaves
/// an existing test file untouched.
#[derive(Debug)]
pub struct AppendSink {
    path: PathBuf,
    file: Option<File>,
    bytes_written: usize,
}

impl AppendSink {
    /// Creates a sink for `path` without touching the filesystem.
    #[must_use]
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            file: None,
            bytes_written: 0,
        }
    }

    /// Appends one token. The write completes before this returns.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or the write fails.
    pub fn append(&mut self, token: &str) -> Result<()> {
        let file = match &mut self.file {
            Some(file) => file,
            slot @ None => {
                File::create(&self.path).map_err(|e| Error::io(&self.path, e))?;
                let file = OpenOptions::new()
                    .append(true)
                    .open(&self.path)
                    .map_err(|e| Error::io(&self.path, e))?;
                slot.insert(file)
            }
        };

        file.write_all(token.as_bytes())
            .map_err(|e| Error::io(&self.path, e))?;
        self.bytes_written += token.len();
        Ok(())
    }

    /// Returns true once the output file has been opened.
    #[must_use]
    pub const fn is_started(&self) -> bool {
        self.file.is_some()
    }

    /// Flushes the file and returns the number of bytes appended.
    ///
    /// # Errors
    ///
    /// Returns an error if the final flush fails.
    pub fn finish(mut self) -> Result<usize> {
        if let Some(file) = &mut self.file {
            file.flush().map_err(|e| Error::io(&self.path, e))?;
            info!("Successfully wrote to file: {}", self.path.display());
        }
        Ok(self.bytes_written)
    }

    /// Removes the partial output of a failed stream.
    ///
    /// Nothing happens when no token was written.
    pub fn discard(self) {
        let Self { path, file, .. } = self;
        if file.is_none() {
            return;
        }

        drop(file);
        match fs::remove_file(&path) {
            Ok(()) => warn!("Removed partial output {}", path.display()),
            Err(e) => warn!("Could not remove partial output {}: {}", path.display(), e),
        }
    }
}
