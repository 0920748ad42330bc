use std::cmp::max;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use anyhow::{bail, Context};
use command_executor::shutdown_mode::ShutdownMode;
use command_executor::thread_pool_builder::ThreadPoolBuilder;
use regex::Regex;
use rlimit::{getrlimit, setrlimit, Resource};

use crate::buffer_pool::BufferPool;
use crate::cancellation::{CancellationToken, Cancelled};
use crate::chunk_producer::ChunkProducer;
use crate::config::Config;
use crate::coordinator::StartGate;
use crate::failure::FailureSlot;
use crate::merger::{remove_files_best_effort, Merger};
use crate::policy::{RetryPolicy, TimeoutPolicy};
use crate::run_sort_command::RunSortCommand;

/// Sort a text file of numbered records too large to fit in memory.
///
/// Records have the form `<number>. <text>`, one per line, and are
/// ordered by case-insensitive text with the number as tie-break. The
/// input is streamed into fixed-size pooled chunks, chunks are sorted in
/// parallel and spilled as sorted run files, and the runs are combined by
/// a bounded-fan-in k-way merge. Peak chunk memory is
/// `(degree + 1) × chunk size` regardless of input size.
///
/// # Examples
/// ```
/// use std::path::PathBuf;
/// use numbered_line_sort::sort::Sort;
///
/// fn sort_numbered(input: PathBuf, output: PathBuf, tmp: PathBuf) -> Result<(), anyhow::Error> {
///     let mut sort = Sort::new(input, output);
///
///     // set the number of parallel sorting workers, which is also the
///     // merge fan-in width. The default is to use all available cores.
///     sort.with_degree(4);
///
///     // set the directory for run files. The default is the system temp
///     // dir - std::env::temp_dir(), however, for large files it is
///     // recommended to provide a dedicated directory on the same file
///     // system as the output.
///     sort.with_tmp_dir(tmp);
///
///     sort.sort()
/// }
/// ```
pub struct Sort {
    input: PathBuf,
    output: PathBuf,
    tmp: PathBuf,
    degree: usize,
    chunk_size_bytes: u64,
    retry: RetryPolicy,
    merge_timeout: TimeoutPolicy,
    token: CancellationToken,
    gate: Option<StartGate>,
}

impl Sort {
    /// Create a default Sort definition.
    ///
    /// * run files are written to std::env::temp_dir()
    /// * degree defaults to the number of available CPU cores
    /// * input is read into chunks of 64 MiB
    /// * transient I/O failures are retried 3 times starting at 2 seconds
    /// * the merge phase is bounded by a 300 second timeout
    ///
    /// The Sort implementation will increase the file descriptor rlimit
    /// to accommodate the configured merge fan-in.
    pub fn new(input: PathBuf, output: PathBuf) -> Sort {
        Sort {
            input,
            output,
            tmp: std::env::temp_dir(),
            degree: 0,
            chunk_size_bytes: 64 * 1024 * 1024,
            retry: RetryPolicy::default(),
            merge_timeout: TimeoutPolicy::default(),
            token: CancellationToken::new(),
            gate: None,
        }
    }

    /// Set the directory for run files. It is recommended for large files
    /// to use a dedicated directory on the same file system as the output
    /// target.
    pub fn with_tmp_dir(&mut self, tmp: PathBuf) {
        self.tmp = tmp;
    }

    /// Set the parallelism degree: the worker count, the buffer pool
    /// sizing basis and the merge fan-in width. The default is zero which
    /// will result in using all system cores.
    pub fn with_degree(&mut self, degree: usize) {
        self.degree = degree;
    }

    /// The input will be packed into chunks of `chunk_size_bytes`
    /// respecting record boundaries.
    pub fn with_chunk_size_bytes(&mut self, chunk_size_bytes: u64) {
        self.chunk_size_bytes = chunk_size_bytes;
    }

    /// The input will be packed into chunks of `chunk_size_mb` MiB
    /// respecting record boundaries.
    pub fn with_chunk_size_mb(&mut self, chunk_size_mb: u64) {
        self.chunk_size_bytes = chunk_size_mb * 1024 * 1024;
    }

    /// Set the retry policy applied to input open and run-file writes.
    pub fn with_retry_policy(&mut self, retry: RetryPolicy) {
        self.retry = retry;
    }

    /// Set the wall-clock budget for the merge phase.
    pub fn with_merge_timeout(&mut self, timeout: TimeoutPolicy) {
        self.merge_timeout = timeout;
    }

    /// Share a cancellation token with the sort. Cancelling it aborts
    /// in-flight work; the sort then returns the cancelled condition,
    /// detectable with [`is_cancellation`](crate::cancellation::is_cancellation).
    pub fn with_cancellation(&mut self, token: CancellationToken) {
        self.token = token;
    }

    /// Defer the start of the sort until the gate is signalled.
    pub fn with_start_gate(&mut self, gate: StartGate) {
        self.gate = Some(gate);
    }

    /// Sort the input file into the output file.
    pub fn sort(&self) -> Result<(), anyhow::Error> {
        if let Some(gate) = &self.gate {
            gate.wait(&self.token)?;
        }
        let config = self.create_config()?;
        log::info!(
            "sorting {} into {}, tmp: {}, degree: {}, chunk size: {} bytes",
            config.input().to_string_lossy(),
            config.output().to_string_lossy(),
            config.tmp().to_string_lossy(),
            config.degree(),
            config.chunk_size_bytes(),
        );
        let (current_soft, current_hard) = Self::get_rlimits()?;
        log::info!(
            "Current rlimit NOFILE, soft: {}, hard: {}",
            current_soft,
            current_hard
        );
        let new_soft = max((config.files() + 256) as u64, current_soft).min(current_hard);
        log::info!(
            "Set new rlimit NOFILE, soft: {}, hard: {}",
            new_soft,
            current_hard
        );
        Self::set_rlimits(new_soft, current_hard)?;
        self.internal_sort(&config)?;
        log::info!(
            "Restore rlimit NOFILE, soft: {}, hard: {}",
            current_soft,
            current_hard
        );
        Self::set_rlimits(current_soft, current_hard)?;
        Ok(())
    }

    fn get_rlimits() -> Result<(u64, u64), anyhow::Error> {
        getrlimit(Resource::NOFILE).with_context(|| "getrlimit")
    }

    fn set_rlimits(soft: u64, hard: u64) -> Result<(), anyhow::Error> {
        setrlimit(Resource::NOFILE, soft, hard)
            .with_context(|| format!("set rlimit NOFILE, soft: {}, hard: {}", soft, hard))?;
        Ok(())
    }

    fn create_config(&self) -> Result<Config, anyhow::Error> {
        if !self.input.exists() {
            bail!("input file not found: {}", self.input.to_string_lossy());
        }
        if self.chunk_size_bytes == 0 {
            bail!("chunk size must be greater than zero");
        }
        let mut degree = self.degree;
        if degree == 0 {
            degree = num_cpus::get();
        }
        Ok(Config::new(
            self.input.clone(),
            self.output.clone(),
            self.tmp.clone(),
            degree,
            self.chunk_size_bytes,
        ))
    }

    fn internal_sort(&self, config: &Config) -> Result<(), anyhow::Error> {
        log::info!("Start parallel sort");
        let start = Instant::now();
        std::fs::create_dir_all(config.tmp())
            .with_context(|| format!("tmp dir: {}", config.tmp().to_string_lossy()))?;
        clean_stale_runs(config.tmp())?;

        let pool = Arc::new(BufferPool::new(config.buffer_size(), config.degree()));
        let runs: Arc<Mutex<Vec<PathBuf>>> = Arc::new(Mutex::new(Vec::new()));
        let failures = FailureSlot::new();

        let mut thread_pool_builder = ThreadPoolBuilder::new();
        let mut sorting_pool = thread_pool_builder
            .with_name("sorting".to_string())
            .with_tasks(config.degree())
            .with_queue_size(config.queue_size())
            .with_shutdown_mode(ShutdownMode::CompletePending)
            .build()
            .unwrap();

        let producer = ChunkProducer::new(
            config.input().clone(),
            pool.clone(),
            self.retry.clone(),
            self.token.clone(),
        );
        let producer_result = producer.produce(|chunk| {
            let command = Box::new(RunSortCommand::new(
                chunk,
                config.tmp().clone(),
                pool.clone(),
                self.retry.clone(),
                runs.clone(),
                self.token.clone(),
                failures.clone(),
            ));
            sorting_pool.submit(command);
            Ok(())
        });

        log::info!("Shutting down sorting pool");
        sorting_pool.shutdown();
        sorting_pool.join()?;

        let mut runs = std::mem::take(&mut *runs.lock().unwrap());
        runs.sort();

        if let Some(error) = failures.take() {
            remove_files_best_effort(&runs);
            return Err(error);
        }
        if let Err(error) = producer_result {
            remove_files_best_effort(&runs);
            return Err(error);
        }
        if self.token.is_cancelled() {
            remove_files_best_effort(&runs);
            return Err(anyhow::Error::new(Cancelled));
        }

        log::info!("Merging {} runs", runs.len());
        let mut merger = Merger::new(config.degree());
        merger.with_timeout(self.merge_timeout);
        merger.with_cancellation(self.token.clone());
        let merge_result = merger.merge(&runs, config.output());
        remove_files_best_effort(&runs);
        merge_result?;

        log::info!("Finish parallel sort, elapsed: {:?}", start.elapsed());
        Ok(())
    }
}

/// Remove run files left behind by a previous crashed execution.
fn clean_stale_runs(tmp: &Path) -> Result<(), anyhow::Error> {
    let stale = Regex::new(r"^run-\w+\.tmp$").unwrap();
    let mut removed: usize = 0;
    for entry in
        std::fs::read_dir(tmp).with_context(|| format!("tmp dir: {}", tmp.to_string_lossy()))?
    {
        let entry = entry?;
        let name = entry.file_name();
        if stale.is_match(&name.to_string_lossy()) {
            if let Err(error) = std::fs::remove_file(entry.path()) {
                log::warn!(
                    "failed to remove stale run {}: {}",
                    entry.path().to_string_lossy(),
                    error
                );
            } else {
                removed += 1;
            }
        }
    }
    if removed > 0 {
        log::info!(
            "removed {} stale run files from {}",
            removed,
            tmp.to_string_lossy()
        );
    }
    Ok(())
}
