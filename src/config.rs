use crate::error::{Error, Result};
use crate::project::{CONFIG_FILE_NAME, Overrides};
use std::path::PathBuf;
use std::time::Duration;

/// Model used when none is given.
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo-16k";

/// Base URL of the standard chat-completion backend.
pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

const DEFAULT_TIMEOUT_SECS: u64 = 600;

/// Immutable arguments for one run.
///
/// Use [`Config::builder()`] to construct a new configuration. Every stage
/// of the pipeline reads from the same value; nothing is stored globally.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct Config {
    /// Input file or directory
    pub input_path: PathBuf,

    /// Output file, or output directory when the input is a directory
    pub output_path: Option<PathBuf>,

    /// API key for the standard backend
    pub api_key: Option<String>,

    /// Model identifier
    pub model: String,

    /// System message, the built-in one when absent
    pub system_message: Option<String>,

    /// Prompt template, the built-in one when absent
    pub template: Option<String>,

    /// Explicit technologies, instructions and examples
    pub overrides: Overrides,

    /// Path of the project configuration file
    pub config_path: PathBuf,

    /// Stream tokens into the output file as they arrive
    pub stream: bool,

    /// Custom endpoint replacing the standard backend
    pub endpoint: Option<String>,

    /// Base URL of the standard backend
    pub api_base: String,

    /// Request timeout
    pub timeout: Duration,

    /// Dry run mode (no requests, no file writes)
    pub dry_run: bool,
}

impl Config {
    /// Creates a new configuration builder.
    ///
    /// # Examples
    ///
    /// ```
    /// use testgpt::Config;
    ///
    /// let config = Config::builder()
    ///     .input_path("src/sum.ts")
    ///     .api_key("sk-test")
    ///     .technologies(vec!["jest".to_string()])
    ///     .build()
    ///     .expect("valid configuration");
    ///
    /// assert_eq!(config.model, testgpt::DEFAULT_MODEL);
    /// ```
    #[must_use]
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The input path is empty
    /// - The model name is empty
    /// - The standard backend is selected without an API key
    /// - The endpoint or API base is not an http(s) URL
    pub fn validate(&self) -> Result<()> {
        if self.input_path.as_os_str().is_empty() {
            return Err(Error::MissingInput);
        }

        if self.model.trim().is_empty() {
            return Err(Error::config("model must not be empty"));
        }

        match &self.endpoint {
            Some(endpoint) => check_url("endpoint", endpoint)?,
            None => {
                check_url("api_base", &self.api_base)?;
                if !self.dry_run && self.api_key.as_deref().is_none_or(str::is_empty) {
                    return Err(Error::MissingApiKey);
                }
            }
        }

        if self.timeout.is_zero() {
            return Err(Error::config("timeout must be greater than 0"));
        }

        Ok(())
    }
}

fn check_url(field: &str, url: &str) -> Result<()> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(Error::config(format!(
            "{field} must be an http(s) URL, got '{url}'"
        )))
    }
}

/// Builder for creating a [`Config`].
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    input_path: Option<PathBuf>,
    output_path: Option<PathBuf>,
    api_key: Option<String>,
    model: Option<String>,
    system_message: Option<String>,
    template: Option<String>,
    overrides: Overrides,
    config_path: Option<PathBuf>,
    stream: bool,
    endpoint: Option<String>,
    api_base: Option<String>,
    timeout: Option<Duration>,
    dry_run: bool,
}

impl ConfigBuilder {
    /// Sets the input file or directory.
    #[must_use]
    pub fn input_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.input_path = Some(path.into());
        self
    }

    /// Sets the output file or directory.
    #[must_use]
    pub fn output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_path = Some(path.into());
        self
    }

    /// Sets the API key for the standard backend.
    #[must_use]
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the model identifier.
    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Replaces the built-in system message.
    #[must_use]
    pub fn system_message(mut self, message: impl Into<String>) -> Self {
        self.system_message = Some(message.into());
        self
    }

    /// Replaces the built-in prompt template.
    ///
    /// Placeholders are `{fileName}`, `{techs}`, `{instructions}` and
    /// `{content}`.
    #[must_use]
    pub fn template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }

    /// Sets explicit technologies, taking precedence over the project
    /// configuration.
    #[must_use]
    pub fn technologies(mut self, technologies: Vec<String>) -> Self {
        self.overrides.technologies = Some(technologies);
        self
    }

    /// Sets explicit instructions.
    #[must_use]
    pub fn instructions(mut self, instructions: Vec<String>) -> Self {
        self.overrides.instructions = Some(instructions);
        self
    }

    /// Sets explicit few-shot examples.
    #[must_use]
    pub fn examples(mut self, examples: Vec<crate::Example>) -> Self {
        self.overrides.examples = Some(examples);
        self
    }

    /// Sets the path of the project configuration file.
    ///
    /// Default: `testgpt.config.yaml` in the current directory.
    #[must_use]
    pub fn config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    /// Enables or disables streaming output.
    #[must_use]
    pub fn stream(mut self, enabled: bool) -> Self {
        self.stream = enabled;
        self
    }

    /// Sends prompts to a custom endpoint instead of the standard backend.
    #[must_use]
    pub fn endpoint(mut self, url: impl Into<String>) -> Self {
        self.endpoint = Some(url.into());
        self
    }

    /// Sets the base URL of the standard backend.
    #[must_use]
    pub fn api_base(mut self, url: impl Into<String>) -> Self {
        self.api_base = Some(url.into());
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Enables dry run mode (no requests, no file writes).
    #[must_use]
    pub fn dry_run(mut self, enabled: bool) -> Self {
        self.dry_run = enabled;
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails.
    pub fn build(self) -> Result<Config> {
        let config = Config {
            input_path: self.input_path.ok_or(Error::MissingInput)?,
            output_path: self.output_path,
            api_key: self.api_key,
            model: self.model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            system_message: self.system_message,
            template: self.template,
            overrides: self.overrides,
            config_path: self
                .config_path
                .unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME)),
            stream: self.stream,
            endpoint: self.endpoint,
            api_base: self
                .api_base
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            timeout: self
                .timeout
                .unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
            dry_run: self.dry_run,
        };

        config.validate()?;
        Ok(config)
    }
}
