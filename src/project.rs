//! Project configuration keyed by file extension.
//!
//! A project may carry a `testgpt.config.yaml` describing, per extension,
//! which technologies to test with, extra instructions for the model and
//! worked examples:
//!
//! ```yaml
//! .ts:
//!   technologies: [jest, "@testing-library/react"]
//!   instructions: ["mock network calls"]
//!   examples:
//!     - fileName: sum.ts
//!       code: "export const sum = (a, b) => a + b;"
//!       tests: "test('sum', () => expect(sum(1, 2)).toBe(3));"
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

/// Conventional name of the project configuration file.
pub const CONFIG_FILE_NAME: &str = "testgpt.config.yaml";

/// A validated file extension such as `.ts`, used as configuration key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Extension(String);

impl Extension {
    /// Parses an extension key.
    ///
    /// # Errors
    ///
    /// Returns a configuration error unless the key starts with a dot and
    /// contains no path separator or whitespace.
    pub fn parse(raw: &str) -> Result<Self> {
        let valid = raw.len() > 1
            && raw.starts_with('.')
            && !raw[1..].contains(['.', '/', '\\'])
            && !raw.chars().any(char::is_whitespace);

        if valid {
            Ok(Self(raw.to_string()))
        } else {
            Err(Error::config(format!("Invalid extension key '{raw}'")))
        }
    }

    /// Returns the extension including its leading dot.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Extension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A worked sample: source code and the tests expected for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Example {
    /// Name of the example source file
    pub file_name: String,
    /// Example source code
    pub code: String,
    /// Tests the model should produce for `code`
    pub tests: String,
}

impl Example {
    /// Parses a JSON array of examples.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidExamples`] when the payload is not an array of
    /// `{fileName, code, tests}` objects.
    pub fn parse_list(json: &str) -> Result<Vec<Self>> {
        serde_json::from_str(json).map_err(|e| Error::invalid_examples(e.to_string()))
    }
}

/// Settings for a single extension.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtensionConfig {
    /// Testing technologies, in order of preference
    #[serde(alias = "techs")]
    pub technologies: Vec<String>,
    /// Extra instructions appended to the prompt
    #[serde(alias = "tips")]
    pub instructions: Vec<String>,
    /// Few-shot examples
    pub examples: Vec<Example>,
}

/// Project configuration: one [`ExtensionConfig`] per extension.
///
/// Loaded once per run and read-only afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectConfig {
    entries: HashMap<Extension, ExtensionConfig>,
}

impl ProjectConfig {
    /// Creates an empty configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces the entry for `extension`.
    #[must_use]
    pub fn with_entry(mut self, extension: Extension, config: ExtensionConfig) -> Self {
        self.entries.insert(extension, config);
        self
    }

    /// Parses YAML text. Entries whose key is not a valid extension are
    /// skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the text is not a mapping of
    /// extension records.
    pub fn from_yaml(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::new());
        }

        let raw: HashMap<String, ExtensionConfig> =
            serde_yaml::from_str(text).map_err(|e| Error::config(e.to_string()))?;

        let mut entries = HashMap::with_capacity(raw.len());
        for (key, config) in raw {
            match Extension::parse(&key) {
                Ok(ext) => {
                    entries.insert(ext, config);
                }
                Err(e) => warn!("Skipping configuration entry: {}", e),
            }
        }

        Ok(Self { entries })
    }

    /// Loads the configuration file at `path`.
    ///
    /// Returns `None` when the file does not exist or cannot be parsed; a
    /// broken configuration never stops a run.
    #[must_use]
    pub fn load(path: &Path) -> Option<Self> {
        if !path.is_file() {
            return None;
        }

        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) => {
                warn!("Error reading {}: {}", path.display(), e);
                return None;
            }
        };

        match Self::from_yaml(&text) {
            Ok(config) => Some(config),
            Err(e) => {
                warn!("Could not parse {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Returns the entry for `extension`, if any.
    #[must_use]
    pub fn get(&self, extension: &str) -> Option<&ExtensionConfig> {
        let key = Extension::parse(extension).ok()?;
        self.entries.get(&key)
    }

    /// Number of configured extensions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no extension is configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Values passed explicitly on the command line or by an editor front end.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    /// Explicit technologies
    pub technologies: Option<Vec<String>>,
    /// Explicit instructions
    pub instructions: Option<Vec<String>>,
    /// Explicit examples
    pub examples: Option<Vec<Example>>,
}

/// Effective technologies, instructions and examples for one file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolved {
    /// Technologies to render into the prompt
    pub technologies: Vec<String>,
    /// Instructions to render into the prompt
    pub instructions: Vec<String>,
    /// Examples, `None` when no source supplied any
    pub examples: Option<Vec<Example>>,
}

/// Resolves the effective settings for `extension`.
///
/// Each field takes the explicit value when it is present and non-empty,
/// otherwise the entry configured for the extension, otherwise nothing.
#[must_use]
pub fn resolve(extension: &str, overrides: &Overrides, config: Option<&ProjectConfig>) -> Resolved {
    let entry = config.and_then(|c| c.get(extension));

    Resolved {
        technologies: pick(overrides.technologies.as_ref(), entry.map(|e| &e.technologies))
            .unwrap_or_default(),
        instructions: pick(overrides.instructions.as_ref(), entry.map(|e| &e.instructions))
            .unwrap_or_default(),
        examples: pick(overrides.examples.as_ref(), entry.map(|e| &e.examples)),
    }
}

fn pick<T: Clone>(explicit: Option<&Vec<T>>, configured: Option<&Vec<T>>) -> Option<Vec<T>> {
    explicit
        .filter(|v| !v.is_empty())
        .or(configured)
        .cloned()
}

/// Loads the project configuration for a run.
///
/// When no file is found but technologies were passed explicitly, a
/// single-entry configuration for `extension` is synthesized from the
/// explicit values so lookups behave the same either way.
#[must_use]
pub fn load_for_run(path: &Path, extension: &str, overrides: &Overrides) -> Option<ProjectConfig> {
    info!("Reading {}...", path.display());

    if let Some(config) = ProjectConfig::load(path) {
        info!("Config file found, using it ({} extensions)", config.len());
        return Some(config);
    }

    let technologies = overrides.technologies.clone().unwrap_or_default();
    if technologies.is_empty() {
        info!("Config file not found, continuing with default config");
        return None;
    }

    info!("Config file not found, using passed config");
    let key = match Extension::parse(extension) {
        Ok(key) => key,
        Err(e) => {
            debug!("Not synthesizing config: {}", e);
            return None;
        }
    };

    Some(ProjectConfig::new().with_entry(
        key,
        ExtensionConfig {
            technologies,
            instructions: overrides.instructions.clone().unwrap_or_default(),
            examples: Vec::new(),
        },
    ))
}

/// Splits a comma-separated list, trimming items and dropping empty ones.
#[must_use]
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;

    fn ts_config() -> ProjectConfig {
        ProjectConfig::new().with_entry(
            Extension::parse(".ts").unwrap(),
            ExtensionConfig {
                technologies: vec!["jest".to_string()],
                instructions: vec!["use describe blocks".to_string()],
                examples: vec![Example {
                    file_name: "sum.ts".to_string(),
                    code: "export const sum = 1".to_string(),
                    tests: "test('sum')".to_string(),
                }],
            },
        )
    }

    #[test]
    fn test_extension_parse() {
        assert!(Extension::parse(".ts").is_ok());
        assert!(Extension::parse(".tsx").is_ok());
        assert!(Extension::parse("ts").is_err());
        assert!(Extension::parse(".").is_err());
        assert!(Extension::parse(".a/b").is_err());
        assert!(Extension::parse(". ts").is_err());
    }

    #[test]
    fn test_config_wins_when_no_override() {
        let config = ts_config();
        let resolved = resolve(".ts", &Overrides::default(), Some(&config));

        assert_eq!(resolved.technologies, vec!["jest"]);
        assert_eq!(resolved.instructions, vec!["use describe blocks"]);
        assert_eq!(resolved.examples.as_ref().map(Vec::len), Some(1));
    }

    #[test]
    fn test_override_wins_over_config() {
        let config = ts_config();
        let overrides = Overrides {
            technologies: Some(vec!["vitest".to_string()]),
            instructions: None,
            examples: Some(vec![]),
        };

        let resolved = resolve(".ts", &overrides, Some(&config));

        assert_eq!(resolved.technologies, vec!["vitest"]);
        assert_eq!(resolved.instructions, vec!["use describe blocks"]);
        // Empty explicit examples fall through to the config.
        assert_eq!(resolved.examples.as_ref().map(Vec::len), Some(1));
    }

    #[test]
    fn test_nothing_configured() {
        let resolved = resolve(".py", &Overrides::default(), Some(&ts_config()));

        assert!(resolved.technologies.is_empty());
        assert!(resolved.instructions.is_empty());
        assert_eq!(resolved.examples, None);

        let resolved = resolve(".ts", &Overrides::default(), None);
        assert_eq!(resolved, Resolved::default());
    }

    #[test]
    fn test_from_yaml_with_legacy_keys() {
        let yaml = r#"
.ts:
  techs: [jest]
  tips: ["no snapshots"]
.py:
  technologies: [pytest]
  examples:
    - fileName: add.py
      code: "def add(a, b): return a + b"
      tests: "def test_add(): assert add(1, 2) == 3"
"#;
        let config = ProjectConfig::from_yaml(yaml).unwrap();

        assert_eq!(config.len(), 2);
        let ts = config.get(".ts").unwrap();
        assert_eq!(ts.technologies, vec!["jest"]);
        assert_eq!(ts.instructions, vec!["no snapshots"]);
        assert!(ts.examples.is_empty());

        let py = config.get(".py").unwrap();
        assert_eq!(py.examples[0].file_name, "add.py");
    }

    #[test]
    fn test_from_yaml_skips_invalid_keys() {
        let yaml = "ts:\n  technologies: [jest]\n.js:\n  technologies: [mocha]\n";
        let config = ProjectConfig::from_yaml(yaml).unwrap();

        assert_eq!(config.len(), 1);
        assert!(config.get(".js").is_some());
    }

    #[test]
    fn test_load_broken_file_is_none() {
        let temp = assert_fs::TempDir::new().unwrap();
        let file = temp.child(CONFIG_FILE_NAME);
        file.write_str(".ts: [unclosed").unwrap();

        assert!(ProjectConfig::load(file.path()).is_none());
        assert!(ProjectConfig::load(&temp.path().join("missing.yaml")).is_none());
    }

    #[test]
    fn test_load_for_run_synthesizes_from_overrides() {
        let temp = assert_fs::TempDir::new().unwrap();
        let overrides = Overrides {
            technologies: Some(vec!["pytest".to_string()]),
            instructions: Some(vec!["be brief".to_string()]),
            examples: None,
        };

        let config = load_for_run(&temp.path().join(CONFIG_FILE_NAME), ".py", &overrides).unwrap();
        let entry = config.get(".py").unwrap();

        assert_eq!(entry.technologies, vec!["pytest"]);
        assert_eq!(entry.instructions, vec!["be brief"]);
    }

    #[test]
    fn test_load_for_run_without_anything() {
        let temp = assert_fs::TempDir::new().unwrap();
        let config = load_for_run(&temp.path().join(CONFIG_FILE_NAME), ".py", &Overrides::default());
        assert!(config.is_none());
    }

    #[test]
    fn test_parse_examples() {
        let examples = Example::parse_list(r#"[{"fileName":"a.ts","code":"x","tests":"y"}]"#).unwrap();
        assert_eq!(examples.len(), 1);
        assert_eq!(examples[0].tests, "y");

        let err = Example::parse_list(r#"[{"fileName":"a.ts","code":"x"}]"#).unwrap_err();
        assert!(matches!(err, Error::InvalidExamples { .. }));

        assert!(Example::parse_list(r#"{"fileName":"a.ts"}"#).is_err());
    }

    #[test]
    fn test_split_list() {
        assert_eq!(split_list("jest, react-testing-library,,"), vec!["jest", "react-testing-library"]);
        assert!(split_list("").is_empty());
    }
}
