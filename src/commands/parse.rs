// Parse command - replay a recorded event log

use anyhow::Result;
use std::sync::Arc;
use tracing::info;

use crate::aggregator::Aggregator;
use crate::cli::ParseArgs;
use crate::config::{Config, Settings};
use crate::execution;

/// Returns the process exit code
pub async fn handle_parse(args: &ParseArgs, file_config: Option<&Config>) -> Result<i32> {
    let settings = Settings::from_env(&args.overrides(), file_config)?;
    info!("Replaying {}", args.file.display());

    let aggregator = Arc::new(Aggregator::for_filter(settings.show));
    let reporters = super::build_reporters(&settings, &args.display, None);

    let outcome = execution::replay(&args.file, aggregator, reporters).await?;
    info!(
        "Replayed {} lines ({} events)",
        outcome.stats.lines, outcome.stats.decoded
    );
    Ok(outcome.report.code)
}
