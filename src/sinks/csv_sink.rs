//! CSV fallback sink: lazily opened, flushed every row, one file per loop
//! lifetime, named with the timestamp fixed at loop start.

use crate::sample::Sample;
use chrono::Local;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

pub struct CsvSink {
    dir: PathBuf,
    filename: String,
    file: Option<File>,
}

impl CsvSink {
    /// Builds the sink without touching the filesystem; the file is opened
    /// lazily on the first row that actually needs to be written, so a loop
    /// that never falls back to CSV leaves no artifact on disk.
    #[must_use]
    pub fn new(plc_data_root: &Path, plc_name: &str) -> Self {
        let timestamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
        Self {
            dir: plc_data_root.join(plc_name),
            filename: format!("{plc_name}_{timestamp}.csv"),
            file: None,
        }
    }

    #[must_use]
    pub fn path(&self) -> PathBuf {
        self.dir.join(&self.filename)
    }

    #[must_use]
    pub fn was_opened(&self) -> bool {
        self.file.is_some()
    }

    fn ensure_open(&mut self, sample: &Sample) -> Result<(), String> {
        if self.file.is_some() {
            return Ok(());
        }
        fs::create_dir_all(&self.dir).map_err(|e| e.to_string())?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path())
            .map_err(|e| e.to_string())?;
        let header = format!("timestamp,{}\n", sample.tag_names().join(","));
        file.write_all(header.as_bytes()).map_err(|e| e.to_string())?;
        file.flush().map_err(|e| e.to_string())?;
        self.file = Some(file);
        Ok(())
    }

    pub fn write_row(&mut self, sample: &Sample) -> Result<(), String> {
        self.ensure_open(sample)?;
        let mut row = Local::now().format("%Y-%m-%dT%H:%M:%S%.3f").to_string();
        for (_, value) in sample.iter() {
            row.push(',');
            if let Some(v) = value {
                row.push_str(&v.to_csv_field());
            }
        }
        row.push('\n');
        let file = self.file.as_mut().expect("ensure_open just populated it");
        file.write_all(row.as_bytes()).map_err(|e| e.to_string())?;
        file.flush().map_err(|e| e.to_string())
    }

    /// Called when a loop is draining because the PLC was never reachable:
    /// removes any file this sink created during the failed attempt, so a
    /// boot that never read a tag leaves no empty per-boot artifact.
    pub fn remove_if_created(&mut self) {
        if self.file.take().is_some() {
            let _ = fs::remove_file(self.path());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coerce::Value;

    fn sample_with(tags: &[(&str, Option<Value>)]) -> Sample {
        let mut s = Sample::new();
        for (name, value) in tags {
            s.insert(*name, value.clone());
        }
        s
    }

    #[test]
    fn file_not_created_until_first_write() {
        let dir = tempfile::tempdir().unwrap();
        let sink = CsvSink::new(dir.path(), "line1");
        assert!(!sink.was_opened());
        assert!(!sink.path().exists());
    }

    #[test]
    fn writing_a_row_creates_header_and_data() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = CsvSink::new(dir.path(), "line1");
        let sample = sample_with(&[("t1", Some(Value::Int16(5))), ("HEARTBEAT", Some(Value::Bool(true)))]);
        sink.write_row(&sample).unwrap();
        let contents = fs::read_to_string(sink.path()).unwrap();
        let mut lines = contents.lines();
        assert_eq!(lines.next().unwrap(), "timestamp,t1,HEARTBEAT");
        let data_line = lines.next().unwrap();
        assert!(data_line.ends_with(",5,True"));
    }

    #[test]
    fn missing_read_encodes_as_empty_field() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = CsvSink::new(dir.path(), "line1");
        let sample = sample_with(&[("t1", None), ("HEARTBEAT", Some(Value::Bool(false)))]);
        sink.write_row(&sample).unwrap();
        let contents = fs::read_to_string(sink.path()).unwrap();
        let data_line = contents.lines().nth(1).unwrap();
        assert!(data_line.ends_with(",,False"));
    }

    #[test]
    fn remove_if_created_deletes_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = CsvSink::new(dir.path(), "line1");
        let sample = sample_with(&[("HEARTBEAT", Some(Value::Bool(true)))]);
        sink.write_row(&sample).unwrap();
        assert!(sink.path().exists());
        sink.remove_if_created();
        assert!(!sink.path().exists());
    }

    #[test]
    fn remove_if_created_is_a_no_op_when_never_opened() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = CsvSink::new(dir.path(), "line1");
        sink.remove_if_created();
        assert!(!sink.path().exists());
    }
}
