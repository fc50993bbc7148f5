//! Session logger: routes the `log` facade into a single file in the OS data
//! directory.
//!
//! The file is **truncated at each launch**, so it only ever holds output from
//! the most recent session.
//!
//! Log location:
//!   Windows:  `%APPDATA%\tilecanvas\tilecanvas.log`
//!   Linux:    `~/.local/share/tilecanvas/tilecanvas.log`
//!   macOS:    `~/Library/Application Support/tilecanvas/tilecanvas.log`
//!
//! Warnings and errors are mirrored to stderr so headless runs still show them.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

use log::{Level, LevelFilter, Log, Metadata, Record};

static LOGGER: SessionLogger = SessionLogger;
static LOG_FILE: OnceLock<Mutex<File>> = OnceLock::new();

struct SessionLogger;

impl Log for SessionLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format!(
            "[{}] [{}] {}: {}",
            timestamp(),
            record.level(),
            record.target(),
            record.args()
        );
        if record.level() <= Level::Warn {
            eprintln!("{}", line);
        }
        write_line(&line);
    }

    fn flush(&self) {
        if let Some(mutex) = LOG_FILE.get()
            && let Ok(mut file) = mutex.lock()
        {
            let _ = file.flush();
        }
    }
}

/// Write a raw line to the session log. I/O errors are ignored so logging
/// never takes the process down.
fn write_line(line: &str) {
    if let Some(mutex) = LOG_FILE.get()
        && let Ok(mut file) = mutex.lock()
    {
        let _ = writeln!(file, "{}", line);
    }
}

/// Install the session logger. Call once, before any logging.
///
/// * Creates (or truncates) the log file.
/// * Registers with the `log` facade at `level`.
/// * Installs a panic hook that writes the panic message to the log before
///   running the previous handler.
pub fn init(level: LevelFilter) {
    let path = data_dir().join("tilecanvas").join("tilecanvas.log");

    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }

    // Open file, truncating any previous session's content
    match OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&path)
    {
        Ok(f) => {
            let _ = LOG_FILE.set(Mutex::new(f));
        }
        Err(e) => {
            // not fatal, stderr mirroring still works
            eprintln!("[logger] Failed to open log file {:?}: {}", path, e);
        }
    }

    if log::set_logger(&LOGGER).is_err() {
        return;
    }
    log::set_max_level(level);

    write_line(&format!(
        "=== tilecanvas session started (unix {}) ===",
        unix_seconds().unwrap_or(0)
    ));
    write_line(&format!("Log file: {}", path.display()));
    write_line("");

    let prev = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        write_line(&format!("[{}] [PANIC] {}", timestamp(), info));
        prev(info);
    }));
}

/// Platform data directory (without the app sub-folder).
fn data_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        if let Ok(appdata) = std::env::var("APPDATA") {
            return PathBuf::from(appdata);
        }
    }
    #[cfg(target_os = "macos")]
    {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home)
                .join("Library")
                .join("Application Support");
        }
    }
    if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(xdg);
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".local").join("share");
    }
    PathBuf::from(".")
}

fn unix_seconds() -> Option<u64> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .ok()
        .map(|d| d.as_secs())
}

/// HH:MM:SS (UTC) within the current day.
fn timestamp() -> String {
    match unix_seconds() {
        Some(secs) => format!(
            "{:02}:{:02}:{:02}",
            (secs % 86400) / 3600,
            (secs % 3600) / 60,
            secs % 60
        ),
        None => "??:??:??".to_string(),
    }
}
