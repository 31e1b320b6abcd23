//! # testgpt
//!
//! Generates unit test files for source files by prompting a
//! chat-completion model.
//!
//! ## Quick Start
//!
//! ```no_run
//! use testgpt::{Config, Pipeline};
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let config = Config::builder()
//!     .input_path("./src/utils.ts")
//!     .api_key(std::env::var("OPENAI_API_KEY")?)
//!     .technologies(vec!["jest".to_string()])
//!     .stream(true)
//!     .build()?;
//!
//! Pipeline::new(config)?.run().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! For every input file:
//! 1. **Project config**: technologies, instructions and examples are
//!    resolved for the file's extension, explicit values first
//! 2. **Template**: the prompt is rendered from the file content
//! 3. **Messages**: examples expand into user/assistant pairs framed by a
//!    system message
//! 4. **Completion**: the backend answers in one piece or token by token
//! 5. **Writer**: the answer lands in `<name>.test<ext>`

#![warn(
    missing_docs,
    rust_2018_idioms,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery
)]
#![allow(clippy::module_name_repetitions)]

mod completion;
mod config;
mod error;
mod file;
mod message;
mod pipeline;
mod template;

pub mod project;

pub use completion::{
    Backend, Completion, EndpointClient, EndpointPayload, OpenAiClient, strip_fences,
};
pub use config::{Config, ConfigBuilder, DEFAULT_API_BASE, DEFAULT_MODEL};
pub use error::{Error, Result};
pub use file::{AppendSink, FileName, PathKind, read_file, test_output_path, write_file_atomic};
pub use message::{CompletionRequest, DEFAULT_SYSTEM_MESSAGE, Message, Role, expand_examples};
pub use pipeline::{Job, Pipeline, RunStats};
pub use project::{Example, Extension, ExtensionConfig, ProjectConfig};
pub use template::{DEFAULT_TEMPLATE, PromptArgs, SAME_TECHS, build_prompt, render};

/// Runs the complete generation pipeline with the given configuration.
///
/// This is the main entry point for the library; editor front ends build a
/// [`Config`] from their own state and call it the same way the CLI does.
///
/// # Errors
///
/// Returns an error if:
/// - Configuration is invalid
/// - The input is missing, or its kind does not match the output's
/// - A completion request fails or returns no content
/// - An output file cannot be written
pub async fn run(config: Config) -> Result<RunStats> {
    Pipeline::new(config)?.run().await
}
