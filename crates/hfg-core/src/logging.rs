//! Logging: tracing initialization plus the per-stream file sinks.
//!
//! Two layers coexist:
//!
//! - **Diagnostics** go through the `tracing` ecosystem — compact console
//!   output plus an optional daily-rotating file, installed once at program
//!   start.
//! - **Stream sinks** — `price`, `system`, `trade` — are dedicated
//!   line-oriented files consumed by downstream tooling. Each sink is guarded
//!   by its own mutex, falls back to stdout when its file cannot be opened,
//!   and creates parent directories lazily.

use std::{
    fs::{self, File, OpenOptions},
    io::{self, Write},
    path::Path,
    sync::{Mutex, OnceLock},
};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::{config::LogConfig, time_util};

/// Install the global tracing subscriber for diagnostic output.
///
/// Console output is compact; passing `log_dir` additionally keeps a
/// daily-rotating `gateway.*` file there. `RUST_LOG` overrides
/// `default_level`. A second call is ignored, so test binaries that share a
/// process can call this freely.
pub fn init_tracing(default_level: &str, log_dir: Option<&str>) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let console = fmt::layer().compact().with_target(false);
    let file = log_dir.map(|dir| {
        fmt::layer()
            .with_writer(tracing_appender::rolling::daily(dir, "gateway"))
            .with_ansi(false)
    });

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init();
}

// ---------------------------------------------------------------------------
// Stream sinks
// ---------------------------------------------------------------------------

/// The three log streams consumed by downstream tooling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Price,
    System,
    Trade,
}

impl Stream {
    fn tag(self) -> &'static str {
        match self {
            Self::Price => "PRICE",
            Self::System => "SYSTEM",
            Self::Trade => "TRADE",
        }
    }
}

enum SinkTarget {
    File(File),
    Stdout,
}

struct Sink {
    enabled: bool,
    out: Mutex<SinkTarget>,
}

impl Sink {
    fn open(enabled: bool, path: &str) -> Self {
        let target = if enabled {
            open_file(path).map(SinkTarget::File).unwrap_or(SinkTarget::Stdout)
        } else {
            SinkTarget::Stdout
        };
        Self { enabled, out: Mutex::new(target) }
    }

    fn write_line(&self, tag: &str, msg: std::fmt::Arguments<'_>) {
        if !self.enabled {
            return;
        }
        let mut guard = match self.out.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        let ts = time_util::now_ms();
        let result = match &mut *guard {
            SinkTarget::File(f) => writeln!(f, "{ts} [{tag}] {msg}"),
            SinkTarget::Stdout => writeln!(io::stdout(), "{ts} [{tag}] {msg}"),
        };
        let _ = result;
    }

    fn flush(&self) {
        if let Ok(mut guard) = self.out.lock()
            && let SinkTarget::File(f) = &mut *guard
        {
            let _ = f.flush();
        }
    }
}

fn open_file(path: &str) -> Option<File> {
    if let Some(parent) = Path::new(path).parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).ok()?;
    }
    OpenOptions::new().create(true).append(true).open(path).ok()
}

struct StreamSinks {
    price: Sink,
    system: Sink,
    trade: Sink,
}

static SINKS: OnceLock<StreamSinks> = OnceLock::new();

/// Open the three stream sinks. Called once by the orchestrator before any
/// session starts; later calls are no-ops.
pub fn init_sinks(cfg: &LogConfig) {
    let _ = SINKS.set(StreamSinks {
        price: Sink::open(cfg.price.enabled, &cfg.price.file),
        system: Sink::open(cfg.system.enabled, &cfg.system.file),
        trade: Sink::open(cfg.trade.enabled, &cfg.trade.file),
    });
}

/// Flush all sinks. Called by the orchestrator during shutdown.
pub fn shutdown_sinks() {
    if let Some(sinks) = SINKS.get() {
        sinks.price.flush();
        sinks.system.flush();
        sinks.trade.flush();
    }
}

/// Write one line to a stream sink. Disabled streams and un-initialised sinks
/// discard the message.
pub fn emit(stream: Stream, msg: std::fmt::Arguments<'_>) {
    if let Some(sinks) = SINKS.get() {
        let sink = match stream {
            Stream::Price => &sinks.price,
            Stream::System => &sinks.system,
            Stream::Trade => &sinks.trade,
        };
        sink.write_line(stream.tag(), msg);
    }
}

/// Write to the price stream.
#[macro_export]
macro_rules! log_price {
    ($($arg:tt)*) => {
        $crate::logging::emit($crate::logging::Stream::Price, format_args!($($arg)*))
    };
}

/// Write to the system stream.
#[macro_export]
macro_rules! log_system {
    ($($arg:tt)*) => {
        $crate::logging::emit($crate::logging::Stream::System, format_args!($($arg)*))
    };
}

/// Write to the trade stream.
#[macro_export]
macro_rules! log_trade {
    ($($arg:tt)*) => {
        $crate::logging::emit($crate::logging::Stream::Trade, format_args!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sink_writes_to_file_and_creates_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/price.log");
        let sink = Sink::open(true, path.to_str().unwrap());
        sink.write_line("PRICE", format_args!("BTC-USDT bbo {}", 60000.5));
        sink.flush();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("[PRICE] BTC-USDT bbo 60000.5"));
    }

    #[test]
    fn disabled_sink_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trade.log");
        let sink = Sink::open(false, path.to_str().unwrap());
        sink.write_line("TRADE", format_args!("never"));
        // Disabled sinks do not even create the file.
        assert!(!path.exists());
    }

    #[test]
    fn unopenable_path_falls_back_to_stdout() {
        // A directory path cannot be opened as a file.
        let dir = tempfile::tempdir().unwrap();
        let sink = Sink::open(true, dir.path().to_str().unwrap());
        assert!(matches!(*sink.out.lock().unwrap(), SinkTarget::Stdout));
    }
}
