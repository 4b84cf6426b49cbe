// CLI argument definitions using Clap

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::{Overrides, ShowFilter, Verbosity};

/// Live aggregation and reporting for `go test -json`
#[derive(Parser, Debug)]
#[command(name = "gotally")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Stream go test results into a filtered, hierarchical report", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Enable verbose debug output
    #[arg(short = 'v', long, global = true, default_value_t = false)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(short = 'c', long, global = true, default_value_t = false)]
    pub no_color: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run go test and report results as they arrive (default)
    Stream(StreamArgs),

    /// Replay a previously recorded event log
    Parse(ParseArgs),

    /// Print shell completions (bash, zsh, fish, elvish, powershell)
    Completion(CompletionArgs),
}

/// Flags shared by every command that renders a report
#[derive(Args, Debug, Clone, Default)]
pub struct DisplayArgs {
    /// Which tests to list: all, failed, passed, skipped, collapsed, none
    #[arg(long, value_name = "FILTER")]
    pub show: Option<ShowFilter>,

    /// Output detail: standard, with-output, minimal, verbose
    #[arg(long, value_name = "LEVEL")]
    pub verbosity: Option<Verbosity>,

    /// Write the run summary as JSON to this file
    #[arg(long, value_name = "FILE")]
    pub summary_json: Option<PathBuf>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct StreamArgs {
    /// Packages to test (default: ./...)
    #[arg(required = false)]
    pub packages: Vec<String>,

    #[command(flatten)]
    pub display: DisplayArgs,

    /// File receiving every raw event line
    #[arg(short = 'o', long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Force CI mode (periodic progress heartbeats)
    #[arg(long, default_value_t = false)]
    pub ci: bool,

    /// Extra arguments passed to go test
    #[arg(last = true, value_name = "GO_TEST_ARGS")]
    pub go_test_args: Vec<String>,
}

#[derive(Args, Debug, Clone)]
pub struct ParseArgs {
    /// Event log written by a previous stream run
    #[arg(required = true)]
    pub file: PathBuf,

    #[command(flatten)]
    pub display: DisplayArgs,
}

#[derive(Args, Debug, Clone)]
pub struct CompletionArgs {
    /// Shell type
    #[arg(value_parser = ["bash", "zsh", "fish", "elvish", "powershell"])]
    pub shell: String,
}

impl Cli {
    /// Stream arguments, falling back to defaults when no subcommand was given
    pub fn command_or_default(self) -> Commands {
        self.command
            .unwrap_or_else(|| Commands::Stream(StreamArgs::default()))
    }
}

impl StreamArgs {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            show: self.display.show,
            verbosity: self.display.verbosity,
            log_file: self.output.clone(),
            ci: self.ci,
        }
    }
}

impl ParseArgs {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            show: self.display.show,
            verbosity: self.display.verbosity,
            log_file: None,
            ci: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_no_subcommand_defaults_to_stream() {
        let cli = Cli::try_parse_from(["gotally"]).unwrap();
        match cli.command_or_default() {
            Commands::Stream(args) => {
                assert!(args.packages.is_empty());
                assert!(args.display.show.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_stream_args_with_passthrough() {
        let cli = Cli::try_parse_from([
            "gotally", "stream", "./pkg/...", "--show", "failed", "--ci", "--", "-run", "TestA",
        ])
        .unwrap();
        let Some(Commands::Stream(args)) = cli.command else {
            panic!("expected stream");
        };
        assert_eq!(args.packages, vec!["./pkg/...".to_string()]);
        assert_eq!(args.display.show, Some(ShowFilter::Failed));
        assert!(args.ci);
        assert_eq!(args.go_test_args, vec!["-run".to_string(), "TestA".to_string()]);
    }

    #[test]
    fn test_invalid_show_filter_rejected() {
        let result = Cli::try_parse_from(["gotally", "stream", "--show", "loud"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_with_verbosity() {
        let cli = Cli::try_parse_from([
            "gotally", "parse", "out.json", "--verbosity", "with-output", "-v",
        ])
        .unwrap();
        assert!(cli.verbose);
        let Some(Commands::Parse(args)) = cli.command else {
            panic!("expected parse");
        };
        assert_eq!(args.file, PathBuf::from("out.json"));
        assert_eq!(args.overrides().verbosity, Some(Verbosity::WithOutput));
    }
}
