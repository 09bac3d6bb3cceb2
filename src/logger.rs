use crate::routines::output::OutputFile;
use crate::routines::settings::Settings;
use anyhow::Result;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::fmt::{self};
use tracing_subscriber::prelude::__tracing_subscriber_SubscriberExt;
use tracing_subscriber::registry::Registry;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Setup logging for the library
///
/// This function sets up logging using the `tracing` crate, with
/// `tracing-subscriber` for formatting.
///
/// The log level is defined in the settings, and defaults to `INFO`. Log
/// messages are written to stdout and to the log file in the output folder.
///
/// If `log.write` is `false`, no global subscriber is installed and the
/// caller may provide its own.
pub fn setup_log(settings: &Settings) -> Result<()> {
    if !settings.log.write {
        return Ok(());
    }

    let log_level = settings.log.level.as_str();
    let env_filter = EnvFilter::new(log_level);

    // Define a registry with that level as an environment filter
    let subscriber = Registry::default().with(env_filter);

    let outputfile = OutputFile::new(&settings.output.path, &settings.log.file)?;

    // Define layer for the log file
    let file_layer = fmt::layer()
        .with_writer(outputfile.file)
        .with_ansi(false)
        .with_timer(CompactTimestamp);

    // Define layer for stdout
    let stdout_layer = fmt::layer()
        .with_writer(std::io::stdout)
        .with_ansi(true)
        .with_target(false)
        .with_timer(CompactTimestamp);

    subscriber.with(file_layer).with(stdout_layer).init();
    tracing::debug!("Logging is configured with level: {}", log_level);

    Ok(())
}

#[derive(Clone)]
struct CompactTimestamp;

impl FormatTime for CompactTimestamp {
    fn format_time(
        &self,
        w: &mut tracing_subscriber::fmt::format::Writer<'_>,
    ) -> Result<(), std::fmt::Error> {
        write!(w, "{}", chrono::Local::now().format("%H:%M:%S"))
    }
}
