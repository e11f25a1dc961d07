//! Logger - глобальный sink для engine-сообщений
//!
//! Add-on живёт внутри чужого процесса (игровой сервер), поэтому вывод идёт
//! через подменяемый `LogSink`:
//! - `ConsoleSink` - stdout, ставится `init_logger()` если sink ещё нет
//! - `CaptureSink` - буфер строк (host консоль, тесты)
//!
//! Уровень фильтруется до форматирования, timestamp добавляется здесь.

use once_cell::sync::Lazy;
use std::fmt;
use std::sync::{Arc, Mutex};

/// Prefix всех строк engine'а в общей консоли host'а.
const TAG: &str = "arsenal";

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
        }
    }

    /// Parse config value ("debug", "info", "warning"/"warn", "error").
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "debug" => Some(LogLevel::Debug),
            "info" => Some(LogLevel::Info),
            "warning" | "warn" => Some(LogLevel::Warning),
            "error" => Some(LogLevel::Error),
            _ => None,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Destination for formatted log lines.
pub trait LogSink: Send + Sync {
    fn write(&self, level: LogLevel, line: &str);
}

/// stdout
pub struct ConsoleSink;

impl LogSink for ConsoleSink {
    fn write(&self, level: LogLevel, line: &str) {
        println!("[{}] {}", level, line);
    }
}

/// Keeps every line in memory; clone the handle before installing it.
#[derive(Clone, Default)]
pub struct CaptureSink {
    lines: Arc<Mutex<Vec<(LogLevel, String)>>>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain captured lines.
    pub fn take(&self) -> Vec<(LogLevel, String)> {
        self.lines
            .lock()
            .map(|mut lines| std::mem::take(&mut *lines))
            .unwrap_or_default()
    }
}

impl LogSink for CaptureSink {
    fn write(&self, level: LogLevel, line: &str) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push((level, line.to_string()));
        }
    }
}

struct LoggerState {
    sink: Option<Box<dyn LogSink>>,
    level: LogLevel,
}

static LOGGER: Lazy<Mutex<LoggerState>> = Lazy::new(|| {
    Mutex::new(LoggerState {
        sink: None,
        level: LogLevel::Debug,
    })
});

/// Replace the sink (host embedding).
pub fn set_sink(sink: Box<dyn LogSink>) {
    if let Ok(mut state) = LOGGER.lock() {
        state.sink = Some(sink);
    }
}

/// Console sink, unless the host already installed one.
pub fn init_logger() {
    if let Ok(mut state) = LOGGER.lock() {
        if state.sink.is_none() {
            state.sink = Some(Box::new(ConsoleSink));
        }
    }
}

pub fn set_log_level(level: LogLevel) {
    if let Ok(mut state) = LOGGER.lock() {
        state.level = level;
    }
}

pub fn log_level() -> LogLevel {
    LOGGER.lock().map(|s| s.level).unwrap_or(LogLevel::Debug)
}

/// Debug-level shorthand (FSM transitions, dispatch details).
pub fn log(message: &str) {
    log_with_level(LogLevel::Debug, message);
}

pub fn log_info(message: &str) {
    log_with_level(LogLevel::Info, message);
}

pub fn log_warning(message: &str) {
    log_with_level(LogLevel::Warning, message);
}

pub fn log_error(message: &str) {
    log_with_level(LogLevel::Error, message);
}

pub fn log_with_level(level: LogLevel, message: &str) {
    let Ok(state) = LOGGER.lock() else {
        return;
    };
    if level < state.level {
        return;
    }
    if let Some(sink) = state.sink.as_ref() {
        let timestamp = chrono::Local::now().format("%H:%M:%S%.3f");
        sink.write(level, &format!("{} [{}] {}", timestamp, TAG, message));
    }
}
