use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use memchr::memchr;

use crate::key::Key;
use crate::line_parser;

const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// Sequential line scanner over a file. Reads raw bytes into a scratch
/// buffer, splits on `\n` (a preceding `\r` is stripped) and validates
/// UTF-8 per line. A partial line at the end of the scratch buffer is
/// shifted to the front before the next read, so records are never split
/// across refills. The scratch buffer grows only when one line exceeds
/// it; a final line without a terminator is still a line.
#[derive(Debug)]
pub(crate) struct LineReader {
    path: PathBuf,
    file: File,
    buf: Vec<u8>,
    start: usize,
    len: usize,
    eof: bool,
}

impl LineReader {
    pub(crate) fn open(path: &Path) -> Result<LineReader, anyhow::Error> {
        LineReader::with_buffer_size(path, DEFAULT_BUFFER_SIZE)
    }

    pub(crate) fn with_buffer_size(
        path: &Path,
        buffer_size: usize,
    ) -> Result<LineReader, anyhow::Error> {
        let file = File::open(path)
            .with_context(|| format!("path: {}", path.to_string_lossy()))?;
        Ok(LineReader {
            path: path.to_path_buf(),
            file,
            buf: vec![0u8; buffer_size.max(1)],
            start: 0,
            len: 0,
            eof: false,
        })
    }

    pub(crate) fn next_line(&mut self) -> Result<Option<&str>, anyhow::Error> {
        loop {
            if let Some(offset) = memchr(b'\n', &self.buf[self.start..self.len]) {
                let line_start = self.start;
                let newline = self.start + offset;
                self.start = newline + 1;
                let line = self.line_slice(line_start, newline)?;
                return Ok(Some(line));
            }
            if self.eof {
                if self.start < self.len {
                    let line_start = self.start;
                    let line_end = self.len;
                    self.start = self.len;
                    let line = self.line_slice(line_start, line_end)?;
                    return Ok(Some(line));
                }
                return Ok(None);
            }
            self.fill()?;
        }
    }

    /// Next line together with its parsed ordering key. Run files are
    /// written by this crate, so a line that does not parse is corrupt
    /// input rather than a droppable record.
    pub(crate) fn next_record(&mut self) -> Result<Option<(String, Key)>, anyhow::Error> {
        let line = match self.next_line()? {
            None => return Ok(None),
            Some(line) => line.to_string(),
        };
        match line_parser::parse_key(&line) {
            Some(key) => Ok(Some((line, key))),
            None => Err(anyhow!(
                "malformed record in sorted file {}: {:?}",
                self.path.to_string_lossy(),
                line
            )),
        }
    }

    fn line_slice(&self, start: usize, end: usize) -> Result<&str, anyhow::Error> {
        let mut end = end;
        if end > start && self.buf[end - 1] == b'\r' {
            end -= 1;
        }
        std::str::from_utf8(&self.buf[start..end])
            .with_context(|| format!("invalid utf-8 in {}", self.path.to_string_lossy()))
    }

    fn fill(&mut self) -> Result<(), anyhow::Error> {
        if self.start > 0 {
            self.buf.copy_within(self.start..self.len, 0);
            self.len -= self.start;
            self.start = 0;
        }
        if self.len == self.buf.len() {
            // one line larger than the whole scratch buffer
            self.buf.resize(self.buf.len() * 2, 0);
        }
        let read = self
            .file
            .read(&mut self.buf[self.len..])
            .with_context(|| format!("path: {}", self.path.to_string_lossy()))?;
        if read == 0 {
            self.eof = true;
        }
        self.len += read;
        Ok(())
    }
}
