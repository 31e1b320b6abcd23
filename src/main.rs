use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use testgpt::project::{CONFIG_FILE_NAME, split_list};
use testgpt::{Config, DEFAULT_API_BASE, DEFAULT_MODEL, Error, Example, Pipeline};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    name = "testgpt",
    version,
    author,
    about = "Generate unit tests for your source files with an LLM",
    long_about = "Generate unit tests for your source files with an LLM.\n\n\
    Reads the input file (or every file of an input directory), builds a prompt from \
    its content and the technologies, instructions and examples configured for its \
    extension in testgpt.config.yaml, and writes the model's answer to \
    <name>.test<ext>.\n\n\
    USAGE EXAMPLES:\n  \
      # Generate tests next to the source file\n  \
      testgpt -i src/sum.ts\n\n  \
      # Pick the testing stack and stream tokens into the file\n  \
      testgpt -i src/sum.ts -t jest,@testing-library/react -s\n\n  \
      # Every file of a directory into another directory\n  \
      testgpt -i src/utils -o tests/utils\n\n  \
      # Use your own generation service\n  \
      testgpt -i app.py -e http://localhost:8000/generate"
)]
struct Cli {
    /// Source file or directory to generate tests for
    #[arg(short, long = "input-file", visible_alias = "inputFile", value_name = "PATH")]
    input_file: Option<PathBuf>,

    /// Output file, or output directory when the input is a directory
    #[arg(short, long = "output-file", visible_alias = "outputFile", value_name = "PATH")]
    output_file: Option<PathBuf>,

    /// API key for the completion backend
    #[arg(short = 'k', long = "api-key", visible_alias = "apiKey", env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Model to use
    #[arg(short, long, default_value = DEFAULT_MODEL)]
    model: String,

    /// System message sent before the prompt
    #[arg(short = 'y', long = "system-message", visible_alias = "systemMessage")]
    system_message: Option<String>,

    /// Prompt template with {fileName}, {techs}, {instructions} and {content} placeholders
    #[arg(short = 'p', long = "prompt-template", visible_alias = "promptTemplate", conflicts_with = "template_file")]
    prompt_template: Option<String>,

    /// Read the prompt template from a file
    #[arg(long, value_name = "FILE")]
    template_file: Option<PathBuf>,

    /// Comma-separated technologies to write the tests with
    #[arg(short, long)]
    techs: Option<String>,

    /// Comma-separated extra instructions for the model
    #[arg(short = 'n', long)]
    instructions: Option<String>,

    /// JSON array of {"fileName", "code", "tests"} examples
    #[arg(short = 'x', long)]
    examples: Option<String>,

    /// Path to the project configuration file
    #[arg(short, long, value_name = "FILE", default_value = CONFIG_FILE_NAME)]
    config: PathBuf,

    /// Stream tokens into the output file as they arrive
    #[arg(short, long)]
    stream: bool,

    /// Custom endpoint receiving {prompt, examples} and returning the tests as text
    #[arg(short = 'e', long = "model-endpoint", visible_alias = "modelEndpoint", value_name = "URL")]
    model_endpoint: Option<String>,

    /// Base URL of the OpenAI-compatible API
    #[arg(long, env = "OPENAI_BASE_URL", default_value = DEFAULT_API_BASE, value_name = "URL")]
    api_base: String,

    /// Request timeout in seconds
    #[arg(long, default_value_t = 600, value_name = "SECS")]
    timeout: u64,

    /// Print the prompts instead of calling the model
    #[arg(long)]
    dry_run: bool,

    /// Verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_tracing(cli.verbose)?;

    let config = build_config(cli).context("Failed to build configuration")?;

    Pipeline::new(config)
        .context("Failed to create pipeline")?
        .run()
        .await
        .context("Test generation failed")?;

    Ok(())
}

fn build_config(cli: Cli) -> anyhow::Result<Config> {
    let input = cli.input_file.ok_or(Error::MissingInput)?;

    let mut builder = Config::builder()
        .input_path(input)
        .model(cli.model)
        .config_path(cli.config)
        .stream(cli.stream)
        .api_base(cli.api_base)
        .timeout(Duration::from_secs(cli.timeout))
        .dry_run(cli.dry_run);

    if let Some(output) = cli.output_file {
        builder = builder.output_path(output);
    }

    if let Some(key) = cli.api_key {
        builder = builder.api_key(key);
    }

    if let Some(message) = cli.system_message {
        builder = builder.system_message(message);
    }

    if let Some(template) = cli.prompt_template {
        builder = builder.template(template);
    }

    if let Some(path) = cli.template_file {
        let template = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read template file {}", path.display()))?;
        builder = builder.template(template);
    }

    if let Some(techs) = cli.techs {
        builder = builder.technologies(split_list(&techs));
    }

    if let Some(instructions) = cli.instructions {
        builder = builder.instructions(split_list(&instructions));
    }

    if let Some(examples) = cli.examples {
        builder = builder.examples(Example::parse_list(&examples)?);
    }

    if let Some(endpoint) = cli.model_endpoint {
        tracing::info!("Found model endpoint, using it instead of OpenAI API");
        builder = builder.endpoint(endpoint);
    }

    Ok(builder.build()?)
}

fn setup_tracing(verbosity: u8) -> anyhow::Result<()> {
    let filter = match verbosity {
        0 => EnvFilter::new("testgpt=info"),
        1 => EnvFilter::new("testgpt=debug"),
        _ => EnvFilter::new("testgpt=trace"),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_thread_ids(false))
        .init();

    Ok(())
}
