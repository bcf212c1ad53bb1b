use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Stable identity of a worker for the lifetime of its process.
///
/// Replacements forked after a crash get a fresh id; ids are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerId(pub u32);

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which directory relative `url(...)` references are rewritten against when
/// an import had to be found outside the importer's own directory.
///
/// - `Source`: the directory of the root file being compiled (default).
/// - `Output`: the directory of the generated output file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RebaseMode {
    Source,
    Output,
}

impl Default for RebaseMode {
    fn default() -> Self {
        RebaseMode::Source
    }
}

impl FromStr for RebaseMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "source" => Ok(RebaseMode::Source),
            "output" => Ok(RebaseMode::Output),
            other => Err(format!(
                "invalid rebase mode: {other} (expected \"source\" or \"output\")"
            )),
        }
    }
}

impl fmt::Display for RebaseMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RebaseMode::Source => f.write_str("source"),
            RebaseMode::Output => f.write_str("output"),
        }
    }
}

/// Log level as exposed on the CLI and forwarded to worker processes.
#[derive(Debug, Copy, Clone, PartialEq, Eq, clap::ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        };
        f.write_str(s)
    }
}
