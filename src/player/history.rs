//! Play history log.
//!
//! One line per track that announced a cover, appended to `<data>/RP/log`:
//!
//! ```text
//! "2024-01-02 03:04:05","http://host/graphics/covers/m/X.jpg","Jimi Hendrix","The Wind Cries Mary"
//! ```
//!
//! The file is never rotated or rewritten.

use std::collections::VecDeque;
use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

/// File name of the log inside the data directory.
pub const LOG_FILE_NAME: &str = "log";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One played track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub cover_url: String,
    pub artist: String,
    pub song: String,
}

impl LogEntry {
    /// Entry stamped with the current time.
    pub fn now(cover_url: &str, artist: &str, song: &str) -> Self {
        Self {
            timestamp: Utc::now(),
            cover_url: cover_url.to_string(),
            artist: artist.to_string(),
            song: song.to_string(),
        }
    }

    /// The log line, newline included. Values are written as-is.
    pub fn to_line(&self) -> String {
        format!(
            "\"{}\",\"{}\",\"{}\",\"{}\"\n",
            self.timestamp.format(TIMESTAMP_FORMAT),
            self.cover_url,
            self.artist,
            self.song
        )
    }
}

/// Append-only history file.
#[derive(Debug, Clone)]
pub struct HistoryLog {
    path: PathBuf,
}

impl HistoryLog {
    /// Open the log in `data_dir`, creating the directory if needed.
    pub fn open(data_dir: impl AsRef<Path>) -> io::Result<Self> {
        let data_dir = data_dir.as_ref();
        fs::create_dir_all(data_dir)?;
        Ok(Self {
            path: data_dir.join(LOG_FILE_NAME),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, entry: &LogEntry) -> io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(entry.to_line().as_bytes())
    }

    /// The last `limit` raw lines, oldest first. A missing log is empty.
    pub fn read_last(&self, limit: usize) -> io::Result<Vec<String>> {
        let file = match fs::File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut lines = VecDeque::new();
        for line in BufReader::new(file).lines() {
            lines.push_back(line?);
            if lines.len() > limit {
                lines.pop_front();
            }
        }
        Ok(lines.into())
    }
}
