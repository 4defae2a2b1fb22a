//! Recording of the forwarded stream.
//!
//! Two files are produced from one path template:
//! - `<stem>.ts`: forwarded payload with the framing header stripped
//! - `<stem>.txt`: timestamped trace of every impairment and control action,
//!   annotated with the `.ts` byte offset it happened at

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Local};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::config::RecordConfig;
use crate::error::{Error, Result};

/// Characters never allowed in the generated file name.
const INVALID_FILENAME_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Expand `%T`/`%D` in the template's file stem and strip invalid characters.
pub fn expand_template(template: &Path, now: &DateTime<Local>) -> Result<(PathBuf, PathBuf)> {
    let stem = template
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| {
            Error::InvalidConfig(format!("invalid record path: {}", template.display()))
        })?;

    let expanded = stem
        .replace("%T", &now.format("%H%M").to_string())
        .replace("%D", &now.format("%d.%m.%y").to_string());
    let name = sanitize_file_name(&expanded);
    if name.is_empty() {
        return Err(Error::InvalidConfig(format!(
            "record file name is empty after sanitizing: {}",
            template.display()
        )));
    }

    let dir = template.parent().unwrap_or_else(|| Path::new(""));
    Ok((
        dir.join(format!("{name}.ts")),
        dir.join(format!("{name}.txt")),
    ))
}

/// Remove characters that are not valid in a file name.
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .filter(|c| !c.is_control() && !INVALID_FILENAME_CHARS.contains(c))
        .collect()
}

/// Writer for the `.ts` recording and its companion log.
pub struct Recorder {
    stream: Mutex<BufWriter<File>>,
    log: Mutex<BufWriter<File>>,
    header_len: usize,
    bytes: AtomicU64,
    stream_path: PathBuf,
    log_path: PathBuf,
}

impl Recorder {
    /// Open the recording files described by `config`, if any.
    pub fn from_config(config: &RecordConfig) -> Result<Option<Self>> {
        config
            .file
            .as_deref()
            .map(|template| Self::create(template, config.header_len))
            .transpose()
    }

    /// Open (creating if needed) the recording files for `template`.
    pub fn create(template: &Path, header_len: usize) -> Result<Self> {
        let (stream_path, log_path) = expand_template(template, &Local::now())?;

        if let Some(dir) = stream_path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|e| {
                Error::Record(format!("failed to create {}: {e}", dir.display()))
            })?;
        }

        let stream = open_append(&stream_path)?;
        let log = open_append(&log_path)?;
        info!(
            "Recording to {} (log {})",
            stream_path.display(),
            log_path.display()
        );

        Ok(Self {
            stream: Mutex::new(BufWriter::new(stream)),
            log: Mutex::new(BufWriter::new(log)),
            header_len,
            bytes: AtomicU64::new(0),
            stream_path,
            log_path,
        })
    }

    /// Append a forwarded datagram's payload.
    pub fn write_datagram(&self, datagram: &[u8]) -> Result<()> {
        let Some(payload) = datagram.get(self.header_len..) else {
            debug!("Datagram shorter than framing header, not recorded");
            return Ok(());
        };
        if payload.is_empty() {
            return Ok(());
        }

        self.stream
            .lock()
            .write_all(payload)
            .map_err(|e| Error::Record(format!("write {}: {e}", self.stream_path.display())))?;
        self.bytes.fetch_add(payload.len() as u64, Ordering::Relaxed);
        Ok(())
    }

    /// Append a trace line annotated with the current byte region.
    pub fn log(&self, message: &str) -> Result<()> {
        let line = format_log_line(&Local::now(), self.bytes_recorded(), message);
        let mut log = self.log.lock();
        log.write_all(line.as_bytes())
            .and_then(|()| log.flush())
            .map_err(|e| Error::Record(format!("write {}: {e}", self.log_path.display())))
    }

    /// Total payload bytes written to the `.ts` file.
    pub fn bytes_recorded(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    /// Flush buffered payload to disk.
    pub fn flush(&self) -> Result<()> {
        self.stream.lock().flush()?;
        self.log.lock().flush()?;
        Ok(())
    }

    /// Path of the `.ts` file.
    pub fn stream_path(&self) -> &Path {
        &self.stream_path
    }

    /// Path of the `.txt` log.
    pub fn log_path(&self) -> &Path {
        &self.log_path
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        let _ = self.stream.get_mut().flush();
        let _ = self.log.get_mut().flush();
    }
}

fn open_append(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| Error::Record(format!("failed to open {}: {e}", path.display())))
}

fn format_log_line(now: &DateTime<Local>, region: u64, message: &str) -> String {
    format!(
        "{} (byte region: {region}) - {message}\n",
        now.format("%H:%M:%S")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_time() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 7, 9, 5, 30).unwrap()
    }

    #[test]
    fn test_expand_template_tokens() {
        let (ts, txt) = expand_template(Path::new("captures/run-%D-%T"), &fixed_time()).unwrap();
        assert_eq!(ts, PathBuf::from("captures/run-07.03.24-0905.ts"));
        assert_eq!(txt, PathBuf::from("captures/run-07.03.24-0905.txt"));
    }

    #[test]
    fn test_expand_template_drops_extension() {
        let (ts, _) = expand_template(Path::new("out.ts"), &fixed_time()).unwrap();
        assert_eq!(ts, PathBuf::from("out.ts"));
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("a<b>c:d\"e|f?g*h"), "abcdefgh");
        assert_eq!(sanitize_file_name("tab\there"), "tabhere");
        assert_eq!(sanitize_file_name("plain-name_1.2"), "plain-name_1.2");
    }

    #[test]
    fn test_log_line_format() {
        let line = format_log_line(&fixed_time(), 1316, "Pausing all goo");
        assert_eq!(line, "09:05:30 (byte region: 1316) - Pausing all goo\n");
    }

    #[test]
    fn test_recorder_strips_header() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = Recorder::create(&dir.path().join("capture"), 12).unwrap();

        let mut datagram = vec![0x80u8; 12];
        datagram.extend_from_slice(&[0x47, 0x01, 0x02]);
        recorder.write_datagram(&datagram).unwrap();
        // Too short to carry payload
        recorder.write_datagram(&[0x80; 8]).unwrap();
        recorder.log("marker").unwrap();
        recorder.flush().unwrap();

        assert_eq!(recorder.bytes_recorded(), 3);
        let ts = std::fs::read(recorder.stream_path()).unwrap();
        assert_eq!(ts, vec![0x47, 0x01, 0x02]);
        let log = std::fs::read_to_string(recorder.log_path()).unwrap();
        assert!(log.contains("(byte region: 3) - marker"));
    }
}
