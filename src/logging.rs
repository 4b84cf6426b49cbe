// Logging - tracing subscriber setup and the stderr line format

use chrono::Local;
use console::Style;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;

/// Default directive when `RUST_LOG` is unset
pub fn default_directive(verbose: bool) -> &'static str {
    if verbose { "gotally=debug" } else { "gotally=warn" }
}

/// Install the global subscriber. Diagnostics share stderr with the report.
pub fn init(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

    let _ = tracing_subscriber::fmt()
        .event_format(CustomFormatter)
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// `<icon> LEVEL [HH:MM:SS]: message`
pub struct CustomFormatter;

fn level_label(level: &Level) -> (&'static str, &'static str, Style) {
    match *level {
        Level::TRACE => ("·", "TRACE", Style::new().dim().for_stderr()),
        Level::DEBUG => ("🐛", "DEBUG", Style::new().cyan().for_stderr()),
        Level::INFO => ("ℹ️ ", "INFO", Style::new().blue().for_stderr()),
        Level::WARN => ("⚠️ ", "WARN", Style::new().yellow().for_stderr()),
        Level::ERROR => ("❌", "ERROR", Style::new().red().bold().for_stderr()),
    }
}

impl<S, N> FormatEvent<S, N> for CustomFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> std::fmt::Result {
        let (icon, label, style) = level_label(event.metadata().level());
        let timestamp = Local::now().format("%H:%M:%S");

        write!(writer, "{} {} [{}]: ", icon, style.apply_to(label), timestamp)?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}
