//! [`crate::traits::LogSink`] implementations (spec.md §6 "Log sink", §4.8).

use crate::traits::{LogFileId, LogSink};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;

/// Appends lines to a plain file on disk, writing `header` only the first
/// time the file is created (matching chrony's tracking-log convention of a
/// one-line column header at the top).
pub struct FileLogSink {
    dir: PathBuf,
    next_id: u32,
    open: HashMap<u32, BufWriter<File>>,
}

impl FileLogSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        FileLogSink { dir: dir.into(), next_id: 0, open: HashMap::new() }
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.log"))
    }
}

impl LogSink for FileLogSink {
    fn file_open(&mut self, name: &str, header: &str) -> LogFileId {
        let path = self.path_for(name);
        let already_existed = path.exists();

        let file = match OpenOptions::new().create(true).append(true).open(&path) {
            Ok(file) => file,
            Err(_) => {
                // The core never treats a logging failure as fatal: it only
                // ever calls `file_write` with the id it gets back, and a
                // write against a dangling id below is a harmless no-op.
                let id = LogFileId(self.next_id);
                self.next_id += 1;
                return id;
            }
        };

        let mut writer = BufWriter::new(file);
        if !already_existed {
            let _ = writeln!(writer, "{header}");
        }

        let id = LogFileId(self.next_id);
        self.next_id += 1;
        self.open.insert(id.0, writer);
        id
    }

    fn file_write(&mut self, id: LogFileId, line: &str) {
        if let Some(writer) = self.open.get_mut(&id.0) {
            let _ = writeln!(writer, "{line}");
            let _ = writer.flush();
        }
    }
}
