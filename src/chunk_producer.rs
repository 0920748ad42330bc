use std::path::PathBuf;
use std::sync::Arc;

use anyhow::bail;

use crate::buffer_pool::BufferPool;
use crate::cancellation::{CancellationToken, Cancelled};
use crate::chunk::{Chunk, Entry};
use crate::line_parser;
use crate::line_reader::LineReader;
use crate::policy::RetryPolicy;

const READ_BUFFER_SIZE: usize = 128 * 1024;

/// Streams the input file, parses records and packs them into pooled
/// chunks. Full chunks leave through the `emit` function handed to
/// [`produce`](ChunkProducer::produce); the orchestrator points it at the
/// bounded sorting queue, tests at a plain vector.
pub(crate) struct ChunkProducer {
    input: PathBuf,
    pool: Arc<BufferPool>,
    retry: RetryPolicy,
    token: CancellationToken,
}

impl ChunkProducer {
    pub(crate) fn new(
        input: PathBuf,
        pool: Arc<BufferPool>,
        retry: RetryPolicy,
        token: CancellationToken,
    ) -> ChunkProducer {
        ChunkProducer {
            input,
            pool,
            retry,
            token,
        }
    }

    pub(crate) fn produce(
        &self,
        mut emit: impl FnMut(Chunk) -> Result<(), anyhow::Error>,
    ) -> Result<(), anyhow::Error> {
        let mut reader = self.retry.run(&self.token, || {
            LineReader::with_buffer_size(&self.input, READ_BUFFER_SIZE)
        })?;
        let capacity = self.pool.buffer_size();
        let mut buffer = self.pool.rent(&self.token)?;
        let mut entries: Vec<Entry> = Vec::new();
        let mut entry_hint: usize = 0;
        let mut chunks: u64 = 0;
        let mut malformed: u64 = 0;
        loop {
            if self.token.is_cancelled() {
                return Err(anyhow::Error::new(Cancelled));
            }
            let line = match reader.next_line()? {
                None => break,
                Some(line) => line,
            };
            let (number, text) = match line_parser::parse_line(line) {
                None => {
                    malformed += 1;
                    continue;
                }
                Some(parsed) => parsed,
            };
            if text.len() > capacity {
                bail!(
                    "record text of {} bytes exceeds the chunk capacity of {} bytes",
                    text.len(),
                    capacity
                );
            }
            if buffer.len() + text.len() > capacity {
                // the record does not fit; hand the chunk off first, then
                // place the record at the start of a fresh buffer
                entry_hint = entry_hint.max(entries.len());
                chunks += 1;
                emit(Chunk::new(buffer, std::mem::take(&mut entries)))?;
                buffer = self.pool.rent(&self.token)?;
                entries = Vec::with_capacity(entry_hint);
            }
            let start = buffer.len();
            buffer.push_str(text);
            entries.push(Entry::new(number, start, text.len()));
        }
        if !entries.is_empty() {
            chunks += 1;
            emit(Chunk::new(buffer, entries))?;
        } else {
            self.pool.give_back(buffer);
        }
        if malformed > 0 {
            log::warn!(
                "dropped {} malformed lines from {}",
                malformed,
                self.input.to_string_lossy()
            );
        }
        log::debug!(
            "produced {} chunks from {}",
            chunks,
            self.input.to_string_lossy()
        );
        Ok(())
    }
}
