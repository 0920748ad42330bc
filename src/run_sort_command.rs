use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context};
use command_executor::command::Command;
use tempfile::Builder;

use crate::buffer_pool::BufferPool;
use crate::cancellation::CancellationToken;
use crate::chunk::Chunk;
use crate::failure::FailureSlot;
use crate::policy::RetryPolicy;
use crate::run_writer::RunWriter;

pub(crate) const RUN_PREFIX: &str = "run-";
pub(crate) const RUN_SUFFIX: &str = ".tmp";

/// One unit of sorting work: sort the carried chunk in place, spill it to
/// a uniquely named run file in the temp directory, record the run path
/// and return the buffer to the pool. Submitted to the sorting pool by
/// the orchestrator, one command per chunk.
///
/// A failed run write exhausting its retries records the error in the
/// shared slot and cancels the pipeline; the command itself completes so
/// the pool can drain.
pub(crate) struct RunSortCommand {
    chunk: Mutex<Option<Chunk>>,
    tmp: PathBuf,
    pool: Arc<BufferPool>,
    retry: RetryPolicy,
    runs: Arc<Mutex<Vec<PathBuf>>>,
    token: CancellationToken,
    failures: FailureSlot,
}

impl RunSortCommand {
    pub(crate) fn new(
        chunk: Chunk,
        tmp: PathBuf,
        pool: Arc<BufferPool>,
        retry: RetryPolicy,
        runs: Arc<Mutex<Vec<PathBuf>>>,
        token: CancellationToken,
        failures: FailureSlot,
    ) -> RunSortCommand {
        RunSortCommand {
            chunk: Mutex::new(Some(chunk)),
            tmp,
            pool,
            retry,
            runs,
            token,
            failures,
        }
    }

    fn write_run(&self, chunk: &Chunk) -> Result<PathBuf, anyhow::Error> {
        self.retry.run(&self.token, || {
            let tmp_file = Builder::new()
                .prefix(RUN_PREFIX)
                .suffix(RUN_SUFFIX)
                .tempfile_in(&self.tmp)
                .with_context(|| {
                    format!("create run file in {}", self.tmp.to_string_lossy())
                })?;
            let (file, path) = tmp_file
                .keep()
                .map_err(|e| anyhow!("persist run file: {}", e))?;
            let mut writer = RunWriter::from_file(file);
            let result = chunk
                .entries()
                .iter()
                .try_for_each(|entry| writer.write_record(entry.number(), chunk.text(entry)))
                .and_then(|_| writer.flush());
            match result {
                Ok(_) => Ok(path),
                Err(error) => {
                    // a rewrite is idempotent at whole-file granularity
                    remove_partial(&path);
                    Err(error)
                }
            }
        })
    }
}

fn remove_partial(path: &Path) {
    if let Err(error) = std::fs::remove_file(path) {
        log::warn!(
            "failed to remove partial run {}: {}",
            path.to_string_lossy(),
            error
        );
    }
}

impl Command for RunSortCommand {
    fn execute(&self) -> Result<(), anyhow::Error> {
        let chunk = self.chunk.lock().unwrap().take();
        let mut chunk = match chunk {
            None => return Ok(()),
            Some(chunk) => chunk,
        };
        if self.token.is_cancelled() {
            self.pool.give_back(chunk.into_buffer());
            return Ok(());
        }
        chunk.sort_entries();
        match self.write_run(&chunk) {
            Ok(path) => {
                log::debug!(
                    "sorted {} records into {}",
                    chunk.len(),
                    path.to_string_lossy()
                );
                self.runs.lock().unwrap().push(path);
            }
            Err(error) => {
                log::error!("run write failed: {:#}", error);
                self.failures.record(error);
                self.token.cancel();
            }
        }
        self.pool.give_back(chunk.into_buffer());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use crate::chunk::Entry;

    use super::*;

    fn chunk_of(records: &[(i64, &str)]) -> Chunk {
        let mut buffer = String::with_capacity(1024);
        let mut entries = Vec::new();
        for (number, text) in records {
            let start = buffer.len();
            buffer.push_str(text);
            entries.push(Entry::new(*number, start, text.len()));
        }
        Chunk::new(buffer, entries)
    }

    #[test]
    fn test_sorted_run_is_written_and_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let pool = Arc::new(BufferPool::new(1024, 0));
        let runs: Arc<Mutex<Vec<PathBuf>>> = Arc::new(Mutex::new(Vec::new()));
        let command = RunSortCommand::new(
            chunk_of(&[(3, "Banana"), (1, "Apple"), (2, "apple")]),
            dir.path().to_path_buf(),
            pool.clone(),
            RetryPolicy::none(),
            runs.clone(),
            CancellationToken::new(),
            FailureSlot::new(),
        );
        command.execute().unwrap();
        let runs = runs.lock().unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(
            fs::read_to_string(&runs[0]).unwrap(),
            "1. Apple\n2. apple\n3. Banana\n"
        );
        let name = runs[0].file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with(RUN_PREFIX));
        assert!(name.ends_with(RUN_SUFFIX));
        // buffer came back to the pool
        assert_eq!(pool.available(), 2);
    }

    #[test]
    fn test_cancelled_command_skips_and_returns_buffer() {
        let dir = tempfile::tempdir().unwrap();
        let pool = Arc::new(BufferPool::new(1024, 0));
        let runs: Arc<Mutex<Vec<PathBuf>>> = Arc::new(Mutex::new(Vec::new()));
        let token = CancellationToken::new();
        token.cancel();
        let command = RunSortCommand::new(
            chunk_of(&[(1, "a")]),
            dir.path().to_path_buf(),
            pool.clone(),
            RetryPolicy::none(),
            runs.clone(),
            token,
            FailureSlot::new(),
        );
        command.execute().unwrap();
        assert!(runs.lock().unwrap().is_empty());
        assert_eq!(pool.available(), 2);
    }

    #[test]
    fn test_unwritable_tmp_records_failure_and_cancels() {
        let pool = Arc::new(BufferPool::new(1024, 0));
        let runs: Arc<Mutex<Vec<PathBuf>>> = Arc::new(Mutex::new(Vec::new()));
        let token = CancellationToken::new();
        let failures = FailureSlot::new();
        let command = RunSortCommand::new(
            chunk_of(&[(1, "a")]),
            PathBuf::from("./no-such-tmp-dir-anywhere"),
            pool.clone(),
            RetryPolicy::none(),
            runs.clone(),
            token.clone(),
            failures.clone(),
        );
        command.execute().unwrap();
        assert!(runs.lock().unwrap().is_empty());
        assert!(failures.take().is_some());
        assert!(token.is_cancelled());
        assert_eq!(pool.available(), 2);
    }

    #[test]
    fn test_second_execution_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let pool = Arc::new(BufferPool::new(1024, 0));
        let runs: Arc<Mutex<Vec<PathBuf>>> = Arc::new(Mutex::new(Vec::new()));
        let command = RunSortCommand::new(
            chunk_of(&[(1, "a")]),
            dir.path().to_path_buf(),
            pool,
            RetryPolicy::none(),
            runs.clone(),
            CancellationToken::new(),
            FailureSlot::new(),
        );
        command.execute().unwrap();
        command.execute().unwrap();
        assert_eq!(runs.lock().unwrap().len(), 1);
    }
}
