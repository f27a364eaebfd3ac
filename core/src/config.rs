//! Option models and loaders for the command runner.

use crate::{Error, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Default project-local binary directory, relative to each search root.
pub const DEFAULT_LOCAL_BIN: &str = "node_modules/.bin";

/// How much the runner echoes to the diagnostic stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, serde::Deserialize, serde::Serialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Verbosity {
    /// Write nothing.
    Quiet,
    /// Echo the command line and its stdout/stderr.
    #[default]
    Normal,
    /// Also echo the working directory and exit status.
    Verbose,
}

impl TryFrom<u8> for Verbosity {
    type Error = InvalidVerbosity;

    fn try_from(level: u8) -> std::result::Result<Self, Self::Error> {
        match level {
            0 => Ok(Verbosity::Quiet),
            1 => Ok(Verbosity::Normal),
            2 => Ok(Verbosity::Verbose),
            other => Err(InvalidVerbosity(other)),
        }
    }
}

impl From<Verbosity> for u8 {
    fn from(verbosity: Verbosity) -> Self {
        match verbosity {
            Verbosity::Quiet => 0,
            Verbosity::Normal => 1,
            Verbosity::Verbose => 2,
        }
    }
}

/// Raised for verbosity levels outside `0..=2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidVerbosity(pub u8);

impl fmt::Display for InvalidVerbosity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "verbosity must be 0, 1 or 2 (got {})", self.0)
    }
}

/// Options recognised by [`CommandRunner`](crate::CommandRunner).
///
/// Unknown keys are ignored when deserializing so that newer configuration
/// files keep working with older builds.
///
/// Expected TOML keys:
/// - `cwd` as a path
/// - `env` as a table of strings
/// - `verbosity` as `0`, `1` or `2`
/// - `shell` as an array, e.g. `["bash", "-c"]`
/// - `ignore_errors` as a boolean
/// - `template_data` as a table of strings
/// - `local_bin` as a relative path
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct Options {
    /// Working directory for spawned commands. Defaults to the process's own.
    pub cwd: Option<PathBuf>,
    /// Environment overrides applied on top of the inherited environment.
    pub env: BTreeMap<String, String>,
    /// How much of the command and its output is echoed to stderr.
    pub verbosity: Verbosity,
    /// Shell program and leading arguments; the command line is appended.
    pub shell: Option<Vec<String>>,
    /// Emit the output file even when the command exits unsuccessfully.
    pub ignore_errors: bool,
    /// Values exposed to templates as `data.<key>`.
    pub template_data: BTreeMap<String, String>,
    /// Project-local binary directory prepended to `PATH`.
    pub local_bin: PathBuf,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            cwd: None,
            env: BTreeMap::new(),
            verbosity: Verbosity::default(),
            shell: None,
            ignore_errors: false,
            template_data: BTreeMap::new(),
            local_bin: PathBuf::from(DEFAULT_LOCAL_BIN),
        }
    }
}

impl Options {
    /// Parse options from a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let options: Options = toml::from_str(source)?;
        options.validate()?;
        Ok(options)
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    pub fn with_shell<I, S>(mut self, shell: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.shell = Some(shell.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_ignore_errors(mut self, ignore_errors: bool) -> Self {
        self.ignore_errors = ignore_errors;
        self
    }

    pub fn with_template_data(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.template_data.insert(key.into(), value.into());
        self
    }

    pub fn with_local_bin(mut self, local_bin: impl Into<PathBuf>) -> Self {
        self.local_bin = local_bin.into();
        self
    }

    /// Check option values that deserialization alone cannot reject.
    pub fn validate(&self) -> Result<()> {
        if let Some(cwd) = &self.cwd {
            if cwd.as_os_str().is_empty() {
                return Err(Error::InvalidOptions("`cwd` must not be empty".into()));
            }
        }
        for key in self.env.keys() {
            if key.is_empty() || key.contains('=') || key.contains('\0') {
                return Err(Error::InvalidOptions(format!(
                    "invalid environment variable name `{key}`"
                )));
            }
        }
        if let Some(shell) = &self.shell {
            if shell.first().map_or(true, |program| program.is_empty()) {
                return Err(Error::InvalidOptions("`shell` needs a program name".into()));
            }
        }
        if self.local_bin.is_absolute() {
            return Err(Error::InvalidOptions(format!(
                "`local_bin` must be relative (got {})",
                self.local_bin.display()
            )));
        }
        Ok(())
    }
}

/// Load runner options from the TOML file at `path`.
pub fn load_options(path: impl AsRef<Path>) -> Result<Options> {
    let source = std::fs::read_to_string(path.as_ref())?;
    Options::from_toml_str(&source)
}
