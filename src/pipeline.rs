use crate::{
    completion::{Backend, Completion},
    config::Config,
    error::{Error, Result},
    file::{self, AppendSink, FileName, PathKind},
    message::{CompletionRequest, expand_examples},
    project::{self, ProjectConfig},
    template::{PromptArgs, build_prompt},
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument, warn};
use walkdir::WalkDir;

/// Statistics collected during a run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunStats {
    /// Number of input files processed
    pub files_processed: usize,

    /// Bytes written across all output files
    pub bytes_written: usize,

    /// Total execution time
    pub duration: Duration,
}

/// One input file and the test file generated for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    /// Source file under test
    pub input: PathBuf,
    /// Test file to write
    pub output: PathBuf,
}

/// Orchestrates test generation for a file or a directory of files.
///
/// Files are processed one at a time; the first failure aborts the run.
pub struct Pipeline {
    config: Config,
    project: Option<ProjectConfig>,
    backend: Option<Backend>,
}

impl Pipeline {
    /// Creates a new pipeline, loading the project configuration once.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration validation fails
    /// - The backend client cannot be created
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let extension = FileName::divide(&config.input_path).extension;
        let project = project::load_for_run(&config.config_path, &extension, &config.overrides);

        let backend = if config.dry_run {
            None
        } else {
            Some(Backend::from_config(&config)?)
        };

        Ok(Self {
            config,
            project,
            backend,
        })
    }

    /// Lists the files to process and where their tests go.
    ///
    /// A directory input yields its direct file entries in the order the
    /// filesystem returns them; subdirectories are skipped. The listing is
    /// taken up front so generated files never feed back into the run.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The input does not exist
    /// - A directory input is paired with an output that is not a directory,
    ///   or a file input with a directory output
    /// - The directory cannot be listed
    pub fn plan(&self) -> Result<Vec<Job>> {
        let input = &self.config.input_path;
        let output = self.config.output_path.as_deref();

        if !input.exists() {
            return Err(Error::io(
                input,
                std::io::Error::new(std::io::ErrorKind::NotFound, "input file not found"),
            ));
        }

        match PathKind::of(input) {
            PathKind::Directory => {
                if let Some(out) = output.filter(|o| PathKind::of(o) != PathKind::Directory) {
                    return Err(Error::kind_mismatch(input, out));
                }
                Self::plan_directory(input, output.unwrap_or(input))
            }
            PathKind::File => {
                if let Some(out) = output.filter(|o| PathKind::of(o) == PathKind::Directory) {
                    return Err(Error::kind_mismatch(input, out));
                }

                let output = output.map_or_else(|| file::test_output_path(input, None), Path::to_path_buf);
                Ok(vec![Job {
                    input: input.clone(),
                    output,
                }])
            }
        }
    }

    fn plan_directory(dir: &Path, output_dir: &Path) -> Result<Vec<Job>> {
        let mut jobs = Vec::new();

        for entry in WalkDir::new(dir).min_depth(1).max_depth(1).follow_links(true) {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(dir).to_path_buf();
                Error::io(path, e.into())
            })?;

            if !entry.file_type().is_file() {
                debug!("Skipping {}", entry.path().display());
                continue;
            }

            let input = entry.into_path();
            let output = file::test_output_path(&input, Some(output_dir));
            jobs.push(Job { input, output });
        }

        Ok(jobs)
    }

    /// Executes the run and returns statistics.
    ///
    /// # Errors
    ///
    /// Returns the first error encountered; remaining files are not
    /// processed.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use testgpt::{Config, Pipeline};
    ///
    /// # #[tokio::main]
    /// # async fn main() -> anyhow::Result<()> {
    /// let config = Config::builder()
    ///     .input_path("./src/sum.ts")
    ///     .api_key("sk-...")
    ///     .build()?;
    ///
    /// let stats = Pipeline::new(config)?.run().await?;
    /// println!("{} files", stats.files_processed);
    /// # Ok(())
    /// # }
    /// ```
    #[instrument(skip(self), fields(input = %self.config.input_path.display()))]
    pub async fn run(self) -> Result<RunStats> {
        let start_time = Instant::now();

        let jobs = self.plan()?;
        if jobs.is_empty() {
            warn!("No files to process in {}", self.config.input_path.display());
        }

        let mut stats = RunStats::default();
        for (index, job) in jobs.iter().enumerate() {
            info!("[{}/{}] {}", index + 1, jobs.len(), job.input.display());

            let written = self.process(job).await.inspect_err(|e| {
                error!("Failed to generate tests for {}: {}", job.input.display(), e);
            })?;

            stats.files_processed += 1;
            stats.bytes_written += written;
        }

        stats.duration = start_time.elapsed();
        info!(
            "✓ Processed {} file(s) in {:.2}s",
            stats.files_processed,
            stats.duration.as_secs_f64()
        );

        Ok(stats)
    }

    /// Runs the single-file pipeline and returns the bytes written.
    async fn process(&self, job: &Job) -> Result<usize> {
        info!("Reading input file...");
        let content = file::read_file(&job.input);

        let extension = FileName::divide(&job.input).extension;
        let resolved = project::resolve(&extension, &self.config.overrides, self.project.as_ref());
        let file_name = job.input.to_string_lossy();

        let args = PromptArgs {
            content: &content,
            file_name: &file_name,
            technologies: &resolved.technologies,
            instructions: &resolved.instructions,
            template: self.config.template.as_deref(),
        };

        let prompt = build_prompt(&args);
        let examples = expand_examples(&args, resolved.examples.as_deref());

        let Some(backend) = &self.backend else {
            self.print_dry_run(job, &prompt, &examples);
            return Ok(0);
        };

        info!("Generating tests...");
        if backend.is_streaming() {
            return Self::stream_to_file(backend, job, &prompt, &examples).await;
        }

        let completion = backend.complete(&prompt, &examples, |_| Ok(())).await?;
        if completion.is_empty() {
            return Err(Error::no_content(&job.input));
        }

        match completion {
            Completion::Text(text) => {
                file::write_file_atomic(&job.output, &text)?;
                Ok(text.len())
            }
            Completion::Streamed(_) => Ok(0),
        }
    }

    /// Appends streamed tokens to the job's output file.
    ///
    /// The output is only touched once the first token arrives; a stream that
    /// fails or ends without tokens leaves no partial file behind.
    async fn stream_to_file(
        backend: &Backend,
        job: &Job,
        prompt: &str,
        examples: &[crate::Message],
    ) -> Result<usize> {
        let mut sink = AppendSink::new(&job.output);
        let streamed = backend
            .complete(prompt, examples, |token| sink.append(token))
            .await;

        match streamed {
            Ok(completion) if !completion.is_empty() => sink.finish(),
            Ok(_) => {
                sink.discard();
                Err(Error::no_content(&job.input))
            }
            Err(e) => {
                sink.discard();
                Err(e)
            }
        }
    }

    /// Logs what would be sent for `job` in dry run mode.
    fn print_dry_run(&self, job: &Job, prompt: &str, examples: &[crate::Message]) {
        let request = CompletionRequest::build(
            &self.config.model,
            self.config.system_message.as_deref(),
            prompt,
            examples,
        );

        warn!(
            "Dry run mode enabled - would write {}",
            job.output.display()
        );
        for message in &request.messages {
            info!("[{:?}]\n{}", message.role, message.content);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;
    use std::collections::HashSet;

    fn dry_config(input: &Path) -> crate::ConfigBuilder {
        Config::builder()
            .input_path(input)
            .config_path(input.join("missing.config.yaml"))
            .dry_run(true)
    }

    #[test]
    fn test_plan_single_file_default_output() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("sum.ts").write_str("export const sum = 1;").unwrap();

        let input = temp.path().join("sum.ts");
        let pipeline = Pipeline::new(dry_config(&input).build().unwrap()).unwrap();

        assert_eq!(
            pipeline.plan().unwrap(),
            vec![Job {
                input: input.clone(),
                output: temp.path().join("sum.test.ts"),
            }]
        );
    }

    #[test]
    fn test_plan_single_file_explicit_output() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("sum.ts").write_str("x").unwrap();

        let input = temp.path().join("sum.ts");
        let output = temp.path().join("custom.spec.ts");
        let config = dry_config(&input).output_path(&output).build().unwrap();

        let jobs = Pipeline::new(config).unwrap().plan().unwrap();
        assert_eq!(jobs[0].output, output);
    }

    #[test]
    fn test_plan_directory_without_output() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("a.ts").write_str("a").unwrap();
        temp.child("b.py").write_str("b").unwrap();
        temp.child("c.rs").write_str("c").unwrap();
        temp.child("nested/d.ts").write_str("d").unwrap();

        let pipeline = Pipeline::new(dry_config(temp.path()).build().unwrap()).unwrap();
        let outputs: HashSet<_> = pipeline
            .plan()
            .unwrap()
            .into_iter()
            .map(|job| job.output)
            .collect();

        let expected: HashSet<_> = ["a.test.ts", "b.test.py", "c.test.rs"]
            .iter()
            .map(|name| temp.path().join(name))
            .collect();
        assert_eq!(outputs, expected);
    }

    #[test]
    fn test_plan_directory_into_output_directory() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("src/a.ts").write_str("a").unwrap();
        temp.child("tests").create_dir_all().unwrap();

        let config = dry_config(&temp.path().join("src"))
            .output_path(temp.path().join("tests"))
            .build()
            .unwrap();

        let jobs = Pipeline::new(config).unwrap().plan().unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].output, temp.path().join("tests/a.test.ts"));
    }

    #[tokio::test]
    async fn test_plan_directory_with_file_output_is_mismatch() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("src/a.ts").write_str("a").unwrap();

        let config = dry_config(&temp.path().join("src"))
            .output_path(temp.path().join("out.test.ts"))
            .build()
            .unwrap();

        let err = Pipeline::new(config).unwrap().run().await.unwrap_err();
        assert!(matches!(err, Error::KindMismatch { .. }));
        assert!(!temp.child("src/a.test.ts").path().exists());
    }

    #[test]
    fn test_plan_file_with_directory_output_is_mismatch() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("a.ts").write_str("a").unwrap();

        let config = dry_config(&temp.path().join("a.ts"))
            .output_path(temp.path())
            .build()
            .unwrap();

        let err = Pipeline::new(config).unwrap().plan().unwrap_err();
        assert!(matches!(err, Error::KindMismatch { .. }));
    }

    #[tokio::test]
    async fn test_missing_input_fails() {
        let temp = assert_fs::TempDir::new().unwrap();
        let config = dry_config(&temp.path().join("missing.ts")).build().unwrap();

        let err = Pipeline::new(config).unwrap().run().await.unwrap_err();
        assert!(err.is_io());
    }

    #[tokio::test]
    async fn test_dry_run_writes_nothing() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("a.ts").write_str("export const a = 1;").unwrap();
        temp.child("b.ts").write_str("export const b = 2;").unwrap();

        let stats = Pipeline::new(dry_config(temp.path()).build().unwrap())
            .unwrap()
            .run()
            .await
            .unwrap();

        assert_eq!(stats.files_processed, 2);
        assert_eq!(stats.bytes_written, 0);
        assert!(!temp.child("a.test.ts").path().exists());
    }

    #[tokio::test]
    async fn test_empty_directory_succeeds() {
        let temp = assert_fs::TempDir::new().unwrap();
        let stats = Pipeline::new(dry_config(temp.path()).build().unwrap())
            .unwrap()
            .run()
            .await
            .unwrap();

        assert_eq!(stats.files_processed, 0);
    }
}
