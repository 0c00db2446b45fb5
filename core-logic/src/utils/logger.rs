use anyhow::{Context, Result};
use chrono::Local;
use nu_ansi_term::{Color, Style};
use std::fmt;
use std::path::PathBuf;
use tracing::{Event, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    filter::{EnvFilter, Targets},
    fmt::{format::Writer, FmtContext, FormatEvent, FormatFields},
    prelude::*,
    registry::LookupSpan,
    Layer,
};

/// Target for operator-facing lines. INFO on this target reaches the console.
pub const SPAM_TARGET: &str = "spam";

#[derive(Debug, Clone)]
pub struct LogOptions {
    pub dir: PathBuf,
    pub file_prefix: String,
    /// Errors only, no log files.
    pub quiet: bool,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("logs"),
            file_prefix: "spammer".to_string(),
            quiet: false,
        }
    }
}

/// Installs the global subscriber. Keep the returned guard alive for the
/// life of the process or buffered file lines are lost.
pub fn setup_logger(options: &LogOptions) -> Result<Option<WorkerGuard>> {
    if options.quiet {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::ERROR)
            .try_init()
            .map_err(|e| anyhow::anyhow!("{}", e))
            .context("Failed to set global subscriber")?;
        return Ok(None);
    }

    std::fs::create_dir_all(&options.dir)
        .with_context(|| format!("Failed to create log dir {}", options.dir.display()))?;

    let file_appender = tracing_appender::rolling::hourly(&options.dir, &options.file_prefix);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // RUST_LOG wins for the file when present
    let file_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,{}=info", SPAM_TARGET)));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .event_format(FileFormatter)
        .with_filter(file_filter);

    let console_filter = Targets::new()
        .with_target(SPAM_TARGET, tracing::Level::INFO)
        .with_default(tracing::Level::ERROR);

    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stdout)
        .with_ansi(true)
        .event_format(TerminalFormatter)
        .with_filter(console_filter);

    tracing_subscriber::registry()
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("{}", e))
        .context("Failed to set global subscriber")?;

    Ok(Some(guard))
}

// --- Formatters ---

struct MessageVisitor {
    message: String,
}

impl tracing::field::Visit for MessageVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        }
    }
    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        }
    }
}

fn message_of(event: &Event<'_>) -> String {
    let mut visitor = MessageVisitor {
        message: String::new(),
    };
    event.record(&mut visitor);
    visitor.message
}

/// Starts with `\r` so a log line replaces the status line instead of trailing it.
pub struct TerminalFormatter;

impl<S, N> FormatEvent<S, N> for TerminalFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let msg = message_of(event);

        let colored_msg = if msg.contains("SUCCESS") {
            let green_text = Style::new().fg(Color::LightGreen).bold();
            msg.replace("SUCCESS", &format!("{}", green_text.paint("SUCCESS")))
        } else if msg.contains("FAILED") {
            let red_text = Style::new().fg(Color::LightRed).bold();
            msg.replace("FAILED", &format!("{}", red_text.paint("FAILED")))
        } else {
            msg
        };

        write!(writer, "\r{}", colored_msg)?;
        writeln!(writer)
    }
}

pub struct FileFormatter;

impl<S, N> FormatEvent<S, N> for FileFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
        let level = event.metadata().level();

        write!(writer, "{} [{}] ", timestamp, level)?;
        if let Some(scope) = ctx.event_scope() {
            for span in scope.from_root() {
                write!(writer, "{}: ", span.name())?;
            }
        }
        writeln!(writer, "{}", message_of(event))
    }
}
