//! Per-PLC log file, owned by the acquisition loop that writes to it.
//!
//! The reference crate's design keeps global state to a minimum and treats
//! OS-thread-local resources as values moved into the thread closure rather
//! than process-wide handler lists; this applies the same idea to logging:
//! one `PlcLog` per loop, lazily opened the same way the CSV sink lazily
//! opens its file, instead of a shared multi-writer `log` appender.

use log::Level;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

pub struct PlcLog {
    plc_name: String,
    path: PathBuf,
    file: Option<File>,
}

impl PlcLog {
    #[must_use]
    pub fn new(log_root: &Path, plc_name: &str) -> Self {
        Self {
            plc_name: plc_name.to_string(),
            path: log_root.join(format!("{plc_name}.log")),
            file: None,
        }
    }

    fn ensure_open(&mut self) -> std::io::Result<&mut File> {
        if self.file.is_none() {
            if let Some(parent) = self.path.parent() {
                fs::create_dir_all(parent)?;
            }
            self.file = Some(OpenOptions::new().create(true).append(true).open(&self.path)?);
        }
        Ok(self.file.as_mut().expect("just populated"))
    }

    fn write_line(&mut self, level: Level, message: &str) {
        let timestamp = chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f");
        let line = format!("{timestamp} {level} [{}] {message}\n", self.plc_name);
        if let Ok(file) = self.ensure_open() {
            let _ = file.write_all(line.as_bytes());
            let _ = file.flush();
        }
        match level {
            Level::Error => log::error!("[{}] {}", self.plc_name, message),
            Level::Warn => log::warn!("[{}] {}", self.plc_name, message),
            Level::Info => log::info!("[{}] {}", self.plc_name, message),
            Level::Debug => log::debug!("[{}] {}", self.plc_name, message),
            Level::Trace => log::trace!("[{}] {}", self.plc_name, message),
        }
    }

    pub fn info(&mut self, message: impl AsRef<str>) {
        self.write_line(Level::Info, message.as_ref());
    }

    pub fn warn(&mut self, message: impl AsRef<str>) {
        self.write_line(Level::Warn, message.as_ref());
    }

    pub fn error(&mut self, message: impl AsRef<str>) {
        self.write_line(Level::Error, message.as_ref());
    }
}

/// Installs the console logger. Mirrors the reference crate's `init()`,
/// minus the syslog branch: this bridge is expected to run under a process
/// supervisor that captures stdout, not to speak syslog directly.
pub fn init_console_logging() {
    let verbose = std::env::var("VERBOSE").ok().as_deref() == Some("1");
    env_logger::Builder::new()
        .target(env_logger::Target::Stdout)
        .filter_level(if verbose {
            log::LevelFilter::Trace
        } else {
            log::LevelFilter::Info
        })
        .init();
}
