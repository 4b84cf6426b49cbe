// Stream command - run go test and report as packages finish

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::aggregator::Aggregator;
use crate::cli::StreamArgs;
use crate::config::{Config, Settings};
use crate::execution::{self, DriverConfig};

/// Returns the process exit code
pub async fn handle_stream(args: &StreamArgs, file_config: Option<&Config>) -> Result<i32> {
    let settings = Settings::from_env(&args.overrides(), file_config)?;

    let mut driver = DriverConfig::go_test(
        &args.packages,
        &args.go_test_args,
        settings.log_file.clone(),
    );
    driver.ci = settings.ci;
    driver.flush_interval = Duration::from_millis(settings.flush_interval_ms);

    info!(
        "Streaming with show={} verbosity={} ci={} log={}",
        settings.show,
        settings.verbosity,
        settings.ci,
        settings.log_file.display()
    );

    let aggregator = Arc::new(Aggregator::for_filter(settings.show));
    let reporters = super::build_reporters(&settings, &args.display, driver.test_filter());

    let outcome = execution::run(&driver, aggregator, reporters).await?;
    Ok(outcome.report.code)
}
