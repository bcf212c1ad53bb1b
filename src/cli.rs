// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::{Path, PathBuf};

use clap::Parser;

use crate::config::{ClusterSection, WorkerOptions};
use crate::fs::paths::normalize;
pub use crate::types::LogLevel;
use crate::types::RebaseMode;

/// Command-line arguments for `less-cluster`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "less-cluster",
    version,
    about = "Compile a tree of LESS stylesheets in parallel across a pool of workers.",
    long_about = None
)]
pub struct CliArgs {
    /// Directory to collect `.less` sources from. Default: current directory.
    #[arg(value_name = "DIRECTORY")]
    pub directory: Option<PathBuf>,

    /// Directory the generated CSS is written to. Default: DIRECTORY.
    #[arg(value_name = "OUTPUTDIR")]
    pub output_dir: Option<PathBuf>,

    /// Only rebuild these files, plus whatever imports them.
    ///
    /// Relative paths are resolved against DIRECTORY.
    #[arg(value_name = "FILES")]
    pub files: Vec<PathBuf>,

    /// Glob selecting sources inside DIRECTORY.
    #[arg(short = 'm', long = "match", value_name = "GLOB")]
    pub match_pattern: Option<String>,

    /// Number of worker processes. `0` compiles in-process.
    ///
    /// Default: number of CPUs.
    #[arg(short = 'w', long, value_name = "N")]
    pub workers: Option<usize>,

    /// Extra directory searched for imports (repeatable).
    #[arg(short = 'I', long = "include-path", value_name = "DIR")]
    pub include_paths: Vec<PathBuf>,

    /// What relative urls in rebased imports are rewritten against.
    #[arg(long, value_enum, value_name = "MODE")]
    pub rebase: Option<RebaseMode>,

    /// External compiler command; reads flattened source on stdin, writes
    /// CSS to stdout.
    #[arg(long, value_name = "CMD")]
    pub compiler: Option<String>,

    /// Path to an optional config file (TOML) with a `[cluster]` section.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `LESS_CLUSTER_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Collect and filter, print the batch, but don't compile anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Run as worker ID, speaking JSON lines on stdin/stdout.
    #[arg(long, value_name = "ID", hide = true)]
    pub worker: Option<u32>,
}

impl CliArgs {
    /// The values given on the command line, as a config section that can
    /// be layered over a config file.
    pub fn to_section(&self) -> ClusterSection {
        ClusterSection {
            directory: self.directory.clone(),
            output_dir: self.output_dir.clone(),
            match_pattern: self.match_pattern.clone(),
            workers: self.workers,
            include_paths: self.include_paths.clone(),
            files: self.files.clone(),
            rebase: self.rebase,
            compiler: self.compiler.clone(),
        }
    }

    /// Options of a worker process, resolved against `cwd`.
    pub fn worker_options(&self, cwd: &Path) -> WorkerOptions {
        WorkerOptions {
            include_paths: self
                .include_paths
                .iter()
                .filter(|p| !p.as_os_str().is_empty())
                .map(|p| normalize(&cwd.join(p)))
                .collect(),
            rebase: self.rebase.unwrap_or_default(),
            compiler: self.compiler.clone(),
            log_level: self.log_level,
        }
    }
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positionals_and_flags() {
        let args = CliArgs::try_parse_from([
            "less-cluster",
            "-I",
            "vendor",
            "--workers",
            "2",
            "less",
            "css",
            "a.less",
            "b.less",
        ])
        .unwrap();

        assert_eq!(args.directory, Some(PathBuf::from("less")));
        assert_eq!(args.output_dir, Some(PathBuf::from("css")));
        assert_eq!(args.files, vec![PathBuf::from("a.less"), PathBuf::from("b.less")]);
        assert_eq!(args.workers, Some(2));
        assert_eq!(args.include_paths, vec![PathBuf::from("vendor")]);
    }

    #[test]
    fn worker_args_round_trip_through_the_parser() {
        let options = WorkerOptions {
            include_paths: vec!["/inc".into()],
            rebase: RebaseMode::Output,
            compiler: Some("lessc -".into()),
            log_level: Some(LogLevel::Debug),
        };
        let mut argv = vec!["less-cluster".to_string(), "--worker".into(), "7".into()];
        argv.extend(options.to_args());

        let args = CliArgs::try_parse_from(argv).unwrap();
        assert_eq!(args.worker, Some(7));
        assert_eq!(args.worker_options(Path::new("/cwd")), options);
    }
}
