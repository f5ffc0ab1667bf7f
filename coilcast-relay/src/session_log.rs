//! Append-only per-session sample log.
//!
//! The file is opened on the first recorded sample and detached by
//! [`SessionLog::reset`]; the next sample then starts a new file named after
//! its own start time. A session never reuses an existing file: when the name
//! is taken (two sessions within one second) a `-N` suffix is added.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Local;
use coilcast_common::SamplePair;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::info;

use crate::poller::CycleError;

/// Session log file name pattern (local time), without the extension.
const FILE_NAME_STEM: &str = "%Y.%m.%d.%H.%M.%S";

/// Timestamp pattern of each line (local time).
const LINE_TIME_FORMAT: &str = "%H:%M:%S";

/// Errors writing the session log.
#[derive(Debug, Error)]
pub enum SessionLogError {
    #[error("Failed to open session log {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to write session log {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

struct OpenLog {
    path: PathBuf,
    file: BufWriter<File>,
}

/// Session log shared by every relay request handler.
pub type SharedSessionLog = Arc<SessionLog>;

/// A lazily-opened, resettable session log.
pub struct SessionLog {
    directory: PathBuf,
    current: Mutex<Option<OpenLog>>,
}

impl SessionLog {
    /// Create a log writing its files into `directory`.
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            current: Mutex::new(None),
        }
    }

    /// Directory receiving the log files.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Path of the open file, if any.
    pub fn current_path(&self) -> Option<PathBuf> {
        self.current.lock().as_ref().map(|log| log.path.clone())
    }

    /// Append a sample line, opening a new file first if none is attached.
    pub fn record(&self, sample: &SamplePair) -> Result<(), SessionLogError> {
        let mut current = self.current.lock();

        if current.is_none() {
            *current = Some(self.open()?);
        }

        match current.as_mut() {
            Some(log) => log.append(&format!(
                "{},INFO,{},{}",
                Local::now().format(LINE_TIME_FORMAT),
                sample.epoch_time,
                sample.sin_value
            )),
            None => Ok(()),
        }
    }

    /// Append a warning line for a failed cycle. No file is opened for this.
    pub fn record_fault(&self, error: &CycleError) -> Result<(), SessionLogError> {
        match self.current.lock().as_mut() {
            Some(log) => log.append(&format!(
                "{},WARNING,{}",
                Local::now().format(LINE_TIME_FORMAT),
                error.kind()
            )),
            None => Ok(()),
        }
    }

    /// Detach the current file, returning its path.
    pub fn reset(&self) -> Option<PathBuf> {
        let detached = self.current.lock().take().map(|log| log.path);
        if let Some(path) = &detached {
            info!(path = %path.display(), "Session log detached");
        }
        detached
    }

    fn open(&self) -> Result<OpenLog, SessionLogError> {
        let stem = Local::now().format(FILE_NAME_STEM).to_string();

        for n in 0u32.. {
            let name = match n {
                0 => format!("{}.log", stem),
                n => format!("{}-{}.log", stem, n),
            };
            let path = self.directory.join(name);

            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => {
                    info!(path = %path.display(), "Session log opened");
                    return Ok(OpenLog {
                        path,
                        file: BufWriter::new(file),
                    });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(source) => return Err(SessionLogError::Open { path, source }),
            }
        }

        Err(SessionLogError::Open {
            path: self.directory.join(stem),
            source: ErrorKind::AlreadyExists.into(),
        })
    }
}

impl OpenLog {
    fn append(&mut self, line: &str) -> Result<(), SessionLogError> {
        writeln!(self.file, "{}", line)
            .and_then(|_| self.file.flush())
            .map_err(|source| SessionLogError::Write {
                path: self.path.clone(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_lines(path: &Path) -> Vec<String> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_opens_lazily_on_first_sample() {
        let dir = tempfile::tempdir().unwrap();
        let log = SessionLog::new(dir.path());

        assert!(log.current_path().is_none());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);

        log.record(&SamplePair::at(1_700_000_000.5)).unwrap();

        let path = log.current_path().expect("file not opened");
        assert!(path.starts_with(dir.path()));
        assert!(path.to_string_lossy().ends_with(".log"));
    }

    #[test]
    fn test_line_format() {
        let dir = tempfile::tempdir().unwrap();
        let log = SessionLog::new(dir.path());
        let sample = SamplePair {
            epoch_time: 1_700_000_000.5,
            sin_value: 0.25,
        };

        log.record(&sample).unwrap();
        log.record(&sample).unwrap();

        let lines = read_lines(&log.current_path().unwrap());
        assert_eq!(lines.len(), 2);

        let fields: Vec<&str> = lines[0].split(',').collect();
        assert_eq!(fields.len(), 4);
        assert_eq!(fields[0].len(), "HH:MM:SS".len());
        assert_eq!(fields[1], "INFO");
        assert_eq!(fields[2].parse::<f64>().unwrap(), 1_700_000_000.5);
        assert_eq!(fields[3].parse::<f32>().unwrap(), 0.25);
    }

    #[test]
    fn test_fault_only_written_to_open_file() {
        let dir = tempfile::tempdir().unwrap();
        let log = SessionLog::new(dir.path());

        log.record_fault(&CycleError::Timeout).unwrap();
        assert!(log.current_path().is_none());

        log.record(&SamplePair::at(1.0)).unwrap();
        log.record_fault(&CycleError::Timeout).unwrap();

        let lines = read_lines(&log.current_path().unwrap());
        assert_eq!(lines.len(), 2);
        assert!(lines[1].ends_with(",WARNING,modbus read timed out"));
    }

    #[test]
    fn test_reset_detaches_file() {
        let dir = tempfile::tempdir().unwrap();
        let log = SessionLog::new(dir.path());

        assert!(log.reset().is_none());

        log.record(&SamplePair::at(1.0)).unwrap();
        let first = log.current_path().unwrap();

        assert_eq!(log.reset(), Some(first.clone()));
        assert!(log.current_path().is_none());

        // Nothing more is written to the detached file
        log.record_fault(&CycleError::Timeout).unwrap();
        assert_eq!(read_lines(&first).len(), 1);

        // The next sample opens a file again
        log.record(&SamplePair::at(2.0)).unwrap();
        assert!(log.current_path().is_some());
    }

    #[test]
    fn test_reset_within_one_second_opens_fresh_file() {
        let dir = tempfile::tempdir().unwrap();
        let log = SessionLog::new(dir.path());

        log.record(&SamplePair::at(1.0)).unwrap();
        let first = log.reset().unwrap();
        log.record(&SamplePair::at(2.0)).unwrap();
        let second = log.current_path().unwrap();

        assert_ne!(first, second);
        assert_eq!(read_lines(&first).len(), 1);
        assert_eq!(read_lines(&second).len(), 1);
    }

    #[test]
    fn test_existing_file_is_never_appended_to() {
        let dir = tempfile::tempdir().unwrap();
        let log = SessionLog::new(dir.path());

        // Occupy the names the next few seconds would produce
        let now = Local::now();
        for offset in 0..3 {
            let stem = (now + chrono::TimeDelta::seconds(offset)).format(FILE_NAME_STEM);
            std::fs::write(dir.path().join(format!("{}.log", stem)), "taken\n").unwrap();
        }

        log.record(&SamplePair::at(1.0)).unwrap();

        let path = log.current_path().unwrap();
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.ends_with("-1.log"), "{name}");
        assert_eq!(read_lines(&path).len(), 1);
    }

    #[test]
    fn test_open_failure() {
        let log = SessionLog::new("/nonexistent/coilcast/logs");

        let result = log.record(&SamplePair::at(1.0));

        assert!(matches!(result, Err(SessionLogError::Open { .. })));
        assert!(log.current_path().is_none());
    }
}
