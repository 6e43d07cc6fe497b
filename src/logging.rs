//! Console logging.
//!
//! Events go through `tracing`; this module renders them as `HH:MM:SS [LEVEL   ]: message` with
//! one colour per level. The bot has a few levels `tracing` doesn't, so those are carried as
//! event targets and emitted through the macros below.

use std::fmt;

use once_cell::sync::OnceCell;
use owo_colors::{OwoColorize, Style};
use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset. Library chatter is kept to warnings.
const DEFAULT_FILTER: &str = "info,serenity=warn,songbird=warn,lavalink_rs=warn,sqlx=warn,tracing::span=warn";

/// The host's UTC offset. It can only be read while the process is single-threaded, so [`init`]
/// captures it before the runtime starts; until then timestamps are UTC.
static LOCAL_OFFSET: OnceCell<UtcOffset> = OnceCell::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Severity {
    Trace,
    Debug,
    Info,
    Success,
    Event,
    Module,
    Database,
    Warning,
    System,
    Error,
    Critical,
}

impl Severity {
    /// Custom targets win over the tracing level.
    pub(crate) fn of(level: &Level, target: &str) -> Self {
        match target {
            "success" => return Self::Success,
            "event" => return Self::Event,
            "module" => return Self::Module,
            "database" => return Self::Database,
            "system" => return Self::System,
            "critical" => return Self::Critical,
            _ => {}
        }
        if *level == Level::ERROR {
            Self::Error
        } else if *level == Level::WARN {
            Self::Warning
        } else if *level == Level::INFO {
            Self::Info
        } else if *level == Level::DEBUG {
            Self::Debug
        } else {
            Self::Trace
        }
    }

    pub(crate) fn label(self) -> &'static str {
        match self {
            Self::Trace => "TRACE",
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Success => "SUCCESS",
            Self::Event => "EVENT",
            Self::Module => "MODULE",
            Self::Database => "DATABASE",
            Self::Warning => "WARNING",
            Self::System => "SYSTEM",
            Self::Error => "ERROR",
            Self::Critical => "CRITICAL",
        }
    }

    fn style(self) -> Style {
        match self {
            Self::Trace => Style::new().bright_black(),
            Self::Debug => Style::new().white(),
            Self::Info => Style::new().bright_cyan(),
            Self::Success => Style::new().bright_green(),
            Self::Event => Style::new().bright_magenta(),
            Self::Module => Style::new().magenta(),
            Self::Database => Style::new().blue(),
            Self::Warning => Style::new().bright_yellow(),
            Self::System => Style::new().yellow(),
            Self::Error => Style::new().bright_red(),
            Self::Critical => Style::new().white().on_red().bold(),
        }
    }
}

/// The event formatter installed by [`init`].
pub(crate) struct KatFormat;

impl<S, N> FormatEvent<S, N> for KatFormat
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
        let meta = event.metadata();
        let severity = Severity::of(meta.level(), meta.target());
        let label = format!("[{:<8}]", severity.label());
        let stamp = timestamp();

        if writer.has_ansi_escapes() {
            write!(writer, "{} {}: ", stamp.dimmed(), label.style(severity.style()))?;
        } else {
            write!(writer, "{} {}: ", stamp, label)?;
        }
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

fn timestamp() -> String {
    let offset = LOCAL_OFFSET.get().copied().unwrap_or(UtcOffset::UTC);
    clock(OffsetDateTime::now_utc(), offset)
}

/// `HH:MM:SS` of `now` at `offset`.
fn clock(now: OffsetDateTime, offset: UtcOffset) -> String {
    now.to_offset(offset)
        .format(format_description!("[hour]:[minute]:[second]"))
        .unwrap_or_default()
}

/// Installs the global subscriber. `RUST_LOG` overrides the default filter.
///
/// Call this from `main` before any other thread exists, or timestamps fall back to UTC.
pub(crate) fn init() {
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    let _ = LOCAL_OFFSET.set(offset);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .event_format(KatFormat)
        .init();
}

/// Prints a banner, used once at startup.
pub(crate) fn header(text: &str) {
    let bar = "═".repeat(60);
    println!("{}", bar.bright_magenta());
    println!("{}", format!("{:^60}", text).bold());
    println!("{}", bar.bright_magenta());
}

macro_rules! success {
    ($($arg:tt)+) => { ::tracing::info!(target: "success", $($arg)+) };
}

macro_rules! event {
    ($($arg:tt)+) => { ::tracing::info!(target: "event", $($arg)+) };
}

macro_rules! module {
    ($($arg:tt)+) => { ::tracing::info!(target: "module", $($arg)+) };
}

macro_rules! database {
    ($($arg:tt)+) => { ::tracing::info!(target: "database", $($arg)+) };
}

macro_rules! system {
    ($($arg:tt)+) => { ::tracing::warn!(target: "system", $($arg)+) };
}

macro_rules! critical {
    ($($arg:tt)+) => { ::tracing::error!(target: "critical", $($arg)+) };
}

pub(crate) use {critical, database, event, module, success, system};

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Buffer(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Buffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn capture(f: impl FnOnce()) -> String {
        let buffer = Buffer::default();
        let writer = buffer.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_max_level(Level::TRACE)
            .event_format(KatFormat)
            .with_writer(move || writer.clone())
            .finish();
        tracing::subscriber::with_default(subscriber, f);
        let bytes = buffer.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn test_severity_from_target() {
        assert_eq!(Severity::of(&Level::INFO, "success"), Severity::Success);
        assert_eq!(Severity::of(&Level::WARN, "system"), Severity::System);
        assert_eq!(Severity::of(&Level::WARN, "lazybot::music"), Severity::Warning);
        assert_eq!(Severity::of(&Level::TRACE, "lazybot"), Severity::Trace);
    }

    #[test]
    fn test_line_layout() {
        let out = capture(|| {
            success!("Loaded {} prefixes", 3);
            tracing::warn!("careful");
        });
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        // HH:MM:SS is eight characters
        assert_eq!(&lines[0][8..], " [SUCCESS ]: Loaded 3 prefixes");
        assert_eq!(&lines[1][8..], " [WARNING ]: careful");
    }

    #[test]
    fn test_clock_uses_offset() {
        use time::macros::{datetime, offset};
        let now = datetime!(2024-03-01 23:30:05 UTC);
        assert_eq!(clock(now, UtcOffset::UTC), "23:30:05");
        assert_eq!(clock(now, offset!(+7)), "06:30:05");
        assert_eq!(clock(now, offset!(-5:30)), "18:00:05");
    }

    #[test]
    fn test_critical_label() {
        let out = capture(|| critical!("gateway gone"));
        assert!(out.contains("[CRITICAL]: gateway gone"));
    }
}
