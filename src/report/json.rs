// JSON reporter - writes the run summary to a file

use std::fs::File;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Serialize;

use super::Reporter;
use crate::aggregator::RunSummary;
use crate::execution::exit::ExitReport;
use crate::state::PackageResult;

#[derive(Serialize)]
struct SummaryDocument<'a> {
    #[serde(flatten)]
    summary: &'a RunSummary,
    exit: &'a ExitReport,
}

/// Summary JSON reporter
pub struct SummaryJsonReporter {
    output_path: PathBuf,
}

impl SummaryJsonReporter {
    pub fn new(output_path: PathBuf) -> Self {
        Self { output_path }
    }
}

impl Reporter for SummaryJsonReporter {
    fn on_package_complete(&self, _package: &PackageResult) -> Result<()> {
        // Whole document is written at the end
        Ok(())
    }

    fn on_run_end(&self, summary: &RunSummary, exit: &ExitReport) -> Result<()> {
        let file = File::create(&self.output_path).with_context(|| {
            format!(
                "Failed to create summary file: {}",
                self.output_path.display()
            )
        })?;

        serde_json::to_writer_pretty(file, &SummaryDocument { summary, exit })
            .context("Failed to serialize run summary to JSON")?;

        Ok(())
    }
}
