//! Logging — a leveled sink producing `[YYYY-MM-DD HH:MM:SS] LEVEL: message`
//! lines, as required at the CLI boundary.

use chrono::Local;
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::format::{FormatEvent, FormatFields, Writer};
use tracing_subscriber::fmt::FmtContext;
use tracing_subscriber::registry::LookupSpan;

/// Renders each event as `[YYYY-MM-DD HH:MM:SS] LEVEL: message`, dropping
/// the target/span noise tracing-subscriber's default format adds.
pub struct SupervisorFormatter;

impl<S, N> FormatEvent<S, N> for SupervisorFormatter
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
        write!(
            writer,
            "[{}] {}: ",
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            event.metadata().level(),
        )?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Installs the global subscriber. `verbose` lowers the level floor from
/// `info` to `debug`.
pub fn init(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .event_format(SupervisorFormatter)
        .init();
}
