//! Incremental JSONL transcript reading
//!
//! Agent runtimes append one JSON object per line to their transcript files.
//! The reader keeps a byte offset so repeated polls only yield lines appended
//! since the previous read; a trailing partial line (still being written) is
//! left for the next poll.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

pub struct TranscriptReader {
    path: PathBuf,
    offset: u64,
}

impl TranscriptReader {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            offset: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read complete lines appended since the last call.
    ///
    /// A file truncated below the stored offset (rotated transcript) resets
    /// the reader to the start.
    pub fn read_new_lines(&mut self) -> Result<Vec<String>> {
        let mut file = File::open(&self.path)
            .with_context(|| format!("failed to open transcript {}", self.path.display()))?;

        let len = file.metadata().context("failed to stat transcript")?.len();
        if len < self.offset {
            tracing::warn!(path = %self.path.display(), "transcript shrank; re-reading from start");
            self.offset = 0;
        }
        if len == self.offset {
            return Ok(Vec::new());
        }

        file.seek(SeekFrom::Start(self.offset))
            .context("failed to seek transcript")?;
        let mut buf = String::new();
        file.read_to_string(&mut buf)
            .context("failed to read transcript")?;

        // Only consume up to the last complete line
        let consumed = match buf.rfind('\n') {
            Some(idx) => idx + 1,
            None => return Ok(Vec::new()),
        };
        self.offset += consumed as u64;

        Ok(buf[..consumed]
            .lines()
            .map(|l| l.trim())
            .filter(|l| !l.is_empty())
            .map(|l| l.to_string())
            .collect())
    }
}
