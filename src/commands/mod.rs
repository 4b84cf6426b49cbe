// Commands module - handles CLI command execution

use anyhow::Result;
use std::sync::Arc;

pub mod parse;
pub mod stream;

pub use parse::handle_parse;
pub use stream::handle_stream;

use crate::cli::DisplayArgs;
use crate::config::Settings;
use crate::execution::Reporters;
use crate::report::{ConsoleReporter, RenderOptions, Reporter, SummaryJsonReporter};

/// Handle shell completion
pub fn handle_completion(shell_type: &str) -> Result<()> {
    use clap::CommandFactory;
    use clap_complete::{Shell, generate};

    let shell = match shell_type.to_lowercase().as_str() {
        "bash" => Shell::Bash,
        "zsh" => Shell::Zsh,
        "fish" => Shell::Fish,
        "elvish" => Shell::Elvish,
        "powershell" => Shell::PowerShell,
        _ => {
            anyhow::bail!(
                "Unsupported shell: {}. Supported: bash, zsh, fish, elvish, powershell",
                shell_type
            );
        }
    };

    let mut cmd = crate::cli::Cli::command();
    let name = cmd.get_name().to_string();
    let mut stdout = std::io::stdout();

    generate(shell, &mut cmd, name, &mut stdout);

    Ok(())
}

/// Console reporter plus the optional summary file
fn build_reporters(settings: &Settings, display: &DisplayArgs, test_filter: Option<String>) -> Reporters {
    let mut reporters: Vec<Box<dyn Reporter>> = Vec::new();

    reporters.push(Box::new(ConsoleReporter::new(RenderOptions {
        filter: settings.show,
        verbosity: settings.verbosity,
        test_filter,
    })));

    if let Some(path) = &display.summary_json {
        reporters.push(Box::new(SummaryJsonReporter::new(path.clone())));
    }

    Arc::new(reporters)
}
