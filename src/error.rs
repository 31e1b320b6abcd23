use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using the library's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Error kinds raised while generating test files.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// No input path was supplied.
    #[error("Please provide an input file")]
    MissingInput,

    /// Directory input paired with an output path that is not a directory,
    /// or file input paired with a directory output.
    #[error("Input '{input}' and output '{output}' must both be files or both be directories")]
    KindMismatch {
        /// Input path
        input: PathBuf,
        /// Output path
        output: PathBuf,
    },

    /// The examples payload does not match the `{fileName, code, tests}` schema.
    #[error("Invalid examples: {message}")]
    InvalidExamples {
        /// Detailed error message
        message: String,
    },

    /// IO error with context about the file path.
    #[error("IO error accessing '{path}': {message}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// Error message
        message: String,
    },

    /// The backend answered without any test content for a file.
    #[error("Error generating tests for '{path}' - No tests content")]
    NoContent {
        /// Input file the completion was requested for
        path: PathBuf,
    },

    /// Network failure talking to the completion backend or custom endpoint.
    #[error("Completion backend request failed: {message}")]
    Transport {
        /// Error message
        message: String,
    },

    /// The standard backend was selected but no API key is available.
    #[error("No API key provided. Pass --api-key or set OPENAI_API_KEY")]
    MissingApiKey,

    /// Configuration validation error.
    #[error("Invalid configuration: {message}")]
    Config {
        /// Detailed error message
        message: String,
    },
}

impl Error {
    /// Creates an IO error with path context.
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            message: source.to_string(),
        }
    }

    /// Creates a configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates an input/output kind mismatch error.
    #[must_use]
    pub fn kind_mismatch(input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self::KindMismatch {
            input: input.into(),
            output: output.into(),
        }
    }

    /// Creates an invalid examples error.
    #[must_use]
    pub fn invalid_examples(message: impl Into<String>) -> Self {
        Self::InvalidExamples {
            message: message.into(),
        }
    }

    /// Creates a no content error.
    #[must_use]
    pub fn no_content(path: impl Into<PathBuf>) -> Self {
        Self::NoContent { path: path.into() }
    }

    /// Creates a transport error.
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Returns true if this is an IO error.
    #[must_use]
    pub const fn is_io(&self) -> bool {
        matches!(self, Self::Io { .. })
    }

    /// Returns true if this is a configuration error.
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config { .. })
    }

    /// Returns true if the backend produced no content.
    #[must_use]
    pub const fn is_no_content(&self) -> bool {
        matches!(self, Self::NoContent { .. })
    }

    /// Returns true if this is a transport error.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport {
            message: e.to_string(),
        }
    }
}
