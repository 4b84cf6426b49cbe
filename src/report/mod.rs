// Report module - display filter, console renderer and summary file output

pub mod console;
pub mod filter;
pub mod json;

use anyhow::Result;

use crate::aggregator::{Progress, RunSummary};
use crate::execution::exit::ExitReport;
use crate::state::PackageResult;

pub use console::{ConsoleReporter, RenderOptions, render_package, render_run_summary};
pub use filter::should_show;
pub use json::SummaryJsonReporter;

/// Reporter trait. Implementations are called outside the aggregator lock.
pub trait Reporter: Send + Sync {
    /// Called once per package when it reaches a terminal status
    fn on_package_complete(&self, package: &PackageResult) -> Result<()>;

    /// Called periodically in CI mode
    fn on_heartbeat(&self, _progress: &Progress) -> Result<()> {
        Ok(())
    }

    /// Called when the run is over and the exit code is known
    fn on_run_end(&self, summary: &RunSummary, exit: &ExitReport) -> Result<()>;
}
