// Configuration file handling and effective settings

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::GotallyError;

/// Which individually-finalized tests get rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShowFilter {
    #[default]
    All,
    Failed,
    Passed,
    Skipped,
    Collapsed,
    None,
}

impl ShowFilter {
    /// Filters that print buffered output of failed tests
    pub fn renders_failure_output(self) -> bool {
        matches!(self, ShowFilter::All | ShowFilter::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ShowFilter::All => "all",
            ShowFilter::Failed => "failed",
            ShowFilter::Passed => "passed",
            ShowFilter::Skipped => "skipped",
            ShowFilter::Collapsed => "collapsed",
            ShowFilter::None => "none",
        }
    }
}

impl FromStr for ShowFilter {
    type Err = GotallyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(Self::All),
            "failed" => Ok(Self::Failed),
            "passed" => Ok(Self::Passed),
            "skipped" => Ok(Self::Skipped),
            "collapsed" => Ok(Self::Collapsed),
            "none" => Ok(Self::None),
            _ => Err(GotallyError::InvalidShowFilter(s.to_string())),
        }
    }
}

impl fmt::Display for ShowFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How much captured output accompanies failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Verbosity {
    #[default]
    Standard,
    WithOutput,
    Minimal,
    Verbose,
}

impl Verbosity {
    /// Escaped `\t` and `\n` sequences in captured output are expanded
    pub fn unescapes_output(self) -> bool {
        matches!(self, Verbosity::WithOutput | Verbosity::Verbose)
    }

    /// Filter forced by an explicitly requested verbosity
    pub fn implied_filter(self) -> Option<ShowFilter> {
        match self {
            Verbosity::Minimal => Some(ShowFilter::Failed),
            Verbosity::Verbose => Some(ShowFilter::All),
            Verbosity::Standard | Verbosity::WithOutput => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Verbosity::Standard => "standard",
            Verbosity::WithOutput => "with-output",
            Verbosity::Minimal => "minimal",
            Verbosity::Verbose => "verbose",
        }
    }
}

impl FromStr for Verbosity {
    type Err = GotallyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "standard" => Ok(Self::Standard),
            "with-output" => Ok(Self::WithOutput),
            "minimal" => Ok(Self::Minimal),
            "verbose" => Ok(Self::Verbose),
            _ => Err(GotallyError::InvalidVerbosity(s.to_string())),
        }
    }
}

impl fmt::Display for Verbosity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub ci: CiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Display filter policy
    #[serde(default)]
    pub show: Option<ShowFilter>,

    /// Verbosity level
    #[serde(default)]
    pub verbosity: Option<Verbosity>,

    /// Side-channel log of raw `go test -json` lines
    #[serde(default = "default_log_file")]
    pub log_file: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            show: None,
            verbosity: None,
            log_file: default_log_file(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CiConfig {
    /// Force CI mode even when no CI environment is detected
    #[serde(default)]
    pub enabled: bool,

    /// Interval between forced flushes in CI mode
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
}

impl Default for CiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            flush_interval_ms: default_flush_interval_ms(),
        }
    }
}

// Environment variables
pub const ENV_SHOW: &str = "GOTALLY_SHOW";
pub const ENV_VERBOSITY: &str = "GOTALLY_VERBOSITY";
pub const ENV_OUTPUT: &str = "GOTALLY_OUTPUT";
pub const ENV_CI: &str = "GOTALLY_CI";

pub fn default_log_file() -> String {
    String::from("test-output.json")
}

pub fn default_flush_interval_ms() -> u64 {
    1000
}

impl Config {
    /// Load configuration from default locations
    pub fn load() -> Option<Self> {
        // 1. .gotallyrc.toml (current directory)
        // 2. ~/.gotallyrc.toml (home directory)
        let mut paths = Vec::new();
        if let Ok(cwd) = std::env::current_dir() {
            paths.push(cwd.join(".gotallyrc.toml"));
        }
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".gotallyrc.toml"));
        }

        paths
            .iter()
            .find(|p| p.exists())
            .and_then(|p| Self::load_from_file(p))
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: &Path) -> Option<Self> {
        let content = std::fs::read_to_string(path).ok()?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML string
    pub fn parse(content: &str) -> Option<Self> {
        toml::from_str(content).ok()
    }
}

/// Values given on the command line; `None` means "not specified"
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub show: Option<ShowFilter>,
    pub verbosity: Option<Verbosity>,
    pub log_file: Option<PathBuf>,
    pub ci: bool,
}

/// Effective settings after applying precedence
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub show: ShowFilter,
    pub verbosity: Verbosity,
    pub log_file: PathBuf,
    pub ci: bool,
    pub flush_interval_ms: u64,
}

impl Settings {
    /// CLI > environment > config file > defaults
    pub fn resolve<F>(overrides: &Overrides, env: F, file: Option<&Config>) -> Result<Self, GotallyError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let file_cfg = file.cloned().unwrap_or_default();

        let env_show = env(ENV_SHOW).map(|v| v.parse::<ShowFilter>()).transpose()?;
        let env_verbosity = env(ENV_VERBOSITY)
            .map(|v| v.parse::<Verbosity>())
            .transpose()?;

        let explicit_verbosity = overrides
            .verbosity
            .or(env_verbosity)
            .or(file_cfg.output.verbosity);
        let verbosity = explicit_verbosity.unwrap_or_default();

        let show = explicit_verbosity
            .and_then(Verbosity::implied_filter)
            .or(overrides.show)
            .or(env_show)
            .or(file_cfg.output.show)
            .unwrap_or_default();

        let log_file = overrides
            .log_file
            .clone()
            .or_else(|| env(ENV_OUTPUT).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(&file_cfg.output.log_file));

        let ci = overrides.ci
            || env(ENV_CI).is_some_and(|v| is_truthy(&v))
            || file_cfg.ci.enabled
            || env("CI").is_some_and(|v| is_truthy(&v))
            || env("GITHUB_ACTIONS").is_some_and(|v| is_truthy(&v));

        Ok(Self {
            show,
            verbosity,
            log_file,
            ci,
            flush_interval_ms: file_cfg.ci.flush_interval_ms.max(1),
        })
    }

    /// Resolve against the real process environment
    pub fn from_env(overrides: &Overrides, file: Option<&Config>) -> Result<Self, GotallyError> {
        Self::resolve(overrides, |key| std::env::var(key).ok(), file)
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
