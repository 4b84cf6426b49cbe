// Error types for the driver and configuration layer

use std::path::PathBuf;

/// Fatal failures; decode and ordering anomalies never surface here
#[derive(Debug, thiserror::Error)]
pub enum GotallyError {
    #[error("cannot create log file {path}: {source}")]
    LogFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("test process has no stdout pipe")]
    MissingStdout,

    #[error("stream error: {0}")]
    Stream(#[from] std::io::Error),

    #[error("invalid show filter '{0}': must be one of all, failed, passed, skipped, collapsed, none")]
    InvalidShowFilter(String),

    #[error("invalid verbosity '{0}': must be one of standard, with-output, minimal, verbose")]
    InvalidVerbosity(String),
}
