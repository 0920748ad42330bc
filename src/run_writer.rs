use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::Context;

const WRITER_CAPACITY: usize = 1 << 20;

/// Buffered encode-on-write side of run and output files. Records are
/// written in canonical `<number>. <text>` form, one per line.
pub(crate) struct RunWriter {
    writer: BufWriter<File>,
}

impl RunWriter {
    pub(crate) fn create(path: &Path) -> Result<RunWriter, anyhow::Error> {
        let file = File::create(path)
            .with_context(|| format!("path: {}", path.to_string_lossy()))?;
        Ok(RunWriter::from_file(file))
    }

    pub(crate) fn from_file(file: File) -> RunWriter {
        RunWriter {
            writer: BufWriter::with_capacity(WRITER_CAPACITY, file),
        }
    }

    pub(crate) fn write_record(&mut self, number: i64, text: &str) -> Result<(), anyhow::Error> {
        writeln!(self.writer, "{}. {}", number, text)?;
        Ok(())
    }

    pub(crate) fn write_line(&mut self, line: &str) -> Result<(), anyhow::Error> {
        writeln!(self.writer, "{}", line)?;
        Ok(())
    }

    pub(crate) fn flush(&mut self) -> Result<(), anyhow::Error> {
        self.writer.flush()?;
        Ok(())
    }
}
