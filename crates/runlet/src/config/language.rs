use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize, de};

use crate::config::ConfigError;

const INVALID_FILE_EXT_CHARS: [char; 2] = ['/', '.'];

/// Idle threshold applied when a recipe does not tune its own.
const DEFAULT_IDLE_TIMEOUT_MS: u64 = 450;

/// Recipe for building and running one programming language.
///
/// Recipes are pure data: adding a language is a config change, not new
/// control flow. The only per-language code lives behind the two hook keys,
/// [`detect_entry`](Self::detect_entry) and [`harness`](Self::harness).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Language {
    /// Human-readable name for the language (e.g., "C++17 (GCC)")
    pub name: String,

    /// File extension
    pub extension: FileExtension,

    /// Compilation configuration (None for interpreted languages)
    #[serde(default)]
    pub compile: Option<CompileConfig>,

    /// Execution configuration
    pub run: RunConfig,

    /// Quiet time on both output streams before the engine assumes the
    /// program is blocked reading stdin. Tuned per language: scripting
    /// runtimes settle fast, the JVM needs longer.
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,

    /// Entry-point detection hook (languages whose toolchain ties the file
    /// or main-class name to the source text).
    #[serde(default)]
    pub detect_entry: Option<EntryPointDetector>,

    /// Source-rewriting hook applied before the source file is written.
    #[serde(default)]
    pub harness: Option<Harness>,

    /// Container image backing this language's pre-warmed sandbox pool.
    /// Languages without an image get no pool.
    #[serde(default)]
    pub sandbox_image: Option<String>,
}

impl Language {
    /// Check if the language is compiled
    pub fn is_compiled(&self) -> bool {
        self.compile.is_some()
    }

    /// Default source file name for this language
    pub fn source_name(&self) -> String {
        format!("main.{}", self.extension)
    }

    /// Idle threshold as a [`Duration`]
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    /// Expand placeholders in the given command
    ///
    /// Placeholders: `{source}`, `{binary}`, `{class}`.
    pub fn expand_command(command: &[String], source: &str, binary: &str, class: &str) -> Vec<String> {
        command
            .iter()
            .map(|arg| {
                arg.replace("{source}", source)
                    .replace("{binary}", binary)
                    .replace("{class}", class)
            })
            .collect()
    }
}

fn default_idle_timeout_ms() -> u64 {
    DEFAULT_IDLE_TIMEOUT_MS
}

/// Entry-point detection strategies.
///
/// Both are best-effort pattern scans over the submitted source, never a
/// real parse; unusual formatting may pick the wrong name, in which case the
/// documented default applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryPointDetector {
    /// Scan for the `class` carrying `public static void main`; fall back to
    /// `Main`. Honors a `package` declaration.
    JavaClass,

    /// Scan for the first `class` declaration; fall back to `Program`.
    CsharpClass,
}

/// Source-rewriting harnesses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Harness {
    /// Wrap the program in a Node shim exposing a global `input(prompt)`
    /// backed by readline, with forced-exit handlers so the child cannot
    /// outlive the engine's ceiling.
    NodeInput,

    /// Prepend a UTF-8 coding comment (Ruby).
    Utf8Prelude,
}

/// File extension without dot (e.g., "cpp")
#[derive(Debug, Clone, Serialize)]
pub struct FileExtension(String);

impl FileExtension {
    pub fn new(extension: &str) -> Result<Self, ConfigError> {
        let contains_invalid = extension
            .chars()
            .any(|c| INVALID_FILE_EXT_CHARS.contains(&c));
        if contains_invalid {
            return Err(ConfigError::InvalidFileExtChars);
        }
        Ok(Self(extension.to_owned()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'de> Deserialize<'de> for FileExtension {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        FileExtension::new(&s).map_err(|_| {
            de::Error::invalid_value(
                de::Unexpected::Str(&s),
                &"a file extension without '/' or '.' characters",
            )
        })
    }
}

impl std::fmt::Display for FileExtension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Configuration for the compilation step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompileConfig {
    /// Command and arguments with placeholders
    /// Placeholders: {source}, {binary}, {class}
    pub command: Vec<String>,

    /// Bounded wall-clock budget for the compile step, in seconds
    #[serde(default = "default_compile_timeout_secs")]
    pub timeout_secs: u64,

    /// Base name of the produced binary, expanded as `{binary}`
    #[serde(default = "default_output_name")]
    pub output_name: String,

    /// Environment variables to set during compilation
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl CompileConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_compile_timeout_secs() -> u64 {
    15
}

fn default_output_name() -> String {
    "main".to_owned()
}

/// Configuration for the execution step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Command and arguments with placeholders
    /// Placeholders: {source}, {binary}, {class}
    pub command: Vec<String>,

    /// Environment variables to set, merged over the engine base environment
    #[serde(default)]
    pub env: HashMap<String, String>,
}
