use std::cmp::{max, Reverse};
use std::collections::BinaryHeap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;

use anyhow::Context;
use command_executor::shutdown_mode::ShutdownMode;
use command_executor::thread_pool_builder::ThreadPoolBuilder;
use data_encoding::HEXLOWER;

use crate::cancellation::{CancellationToken, Cancelled};
use crate::failure::FailureSlot;
use crate::heap_node::HeapNode;
use crate::line_reader::LineReader;
use crate::merge_command::MergeGroupCommand;
use crate::policy::{Deadline, TimeoutPolicy};
use crate::run_writer::RunWriter;

const DEADLINE_CHECK_INTERVAL: u64 = 4096;

/// K-way merge of pre-sorted files with bounded fan-in.
///
/// With at most `degree` inputs a single merge writes the output
/// directly. With more, the inputs are partitioned into groups of
/// `degree`, the groups are merged into intermediate files beside the
/// output with up to `degree` merges running concurrently, and a final
/// merge combines the intermediates. Inputs are never deleted;
/// intermediates always are.
///
/// # Examples
/// ```
/// use std::path::PathBuf;
/// use numbered_line_sort::merger::Merger;
/// use numbered_line_sort::policy::TimeoutPolicy;
///
/// fn combine_runs(runs: Vec<PathBuf>, output: PathBuf) -> Result<(), anyhow::Error> {
///     let mut merger = Merger::new(4);
///     merger.with_timeout(TimeoutPolicy::none());
///     merger.merge(&runs, &output)
/// }
/// ```
pub struct Merger {
    degree: usize,
    timeout: TimeoutPolicy,
    token: CancellationToken,
}

impl Merger {
    pub fn new(degree: usize) -> Merger {
        Merger {
            degree: max(degree, 1),
            timeout: TimeoutPolicy::default(),
            token: CancellationToken::new(),
        }
    }

    /// Set the wall-clock budget for the whole merge. The default allows
    /// five minutes.
    pub fn with_timeout(&mut self, timeout: TimeoutPolicy) {
        self.timeout = timeout;
    }

    /// Share a cancellation token with the merge loops.
    pub fn with_cancellation(&mut self, token: CancellationToken) {
        self.token = token;
    }

    /// Merge `runs` (each internally sorted) into `output`.
    pub fn merge(&self, runs: &[PathBuf], output: &Path) -> Result<(), anyhow::Error> {
        let deadline = self.timeout.deadline();
        deadline.check()?;
        if self.token.is_cancelled() {
            return Err(anyhow::Error::new(Cancelled));
        }
        if runs.len() <= self.degree {
            merge_group(runs, output, &deadline, &self.token)?;
            return Ok(());
        }

        let groups: Vec<Vec<PathBuf>> = runs.chunks(self.degree).map(|group| group.to_vec()).collect();
        log::info!(
            "merging {} runs in {} groups of up to {}",
            runs.len(),
            groups.len(),
            self.degree
        );
        let intermediates: Arc<Mutex<Vec<PathBuf>>> = Arc::new(Mutex::new(Vec::new()));
        let failures = FailureSlot::new();
        let mut thread_pool_builder = ThreadPoolBuilder::new();
        let mut merging_pool = thread_pool_builder
            .with_name("merging".to_string())
            .with_tasks(self.degree)
            .with_queue_size(self.degree)
            .with_shutdown_mode(ShutdownMode::CompletePending)
            .build()
            .unwrap();

        for group in groups {
            let command = Box::new(MergeGroupCommand::new(
                group,
                intermediate_target(output),
                intermediates.clone(),
                deadline,
                self.token.clone(),
                failures.clone(),
            ));
            merging_pool.submit(command);
        }
        merging_pool.shutdown();
        merging_pool.join()?;

        let mut collected = std::mem::take(&mut *intermediates.lock().unwrap());
        collected.sort();
        if let Some(error) = failures.take() {
            remove_files_best_effort(&collected);
            return Err(error);
        }
        if self.token.is_cancelled() {
            remove_files_best_effort(&collected);
            return Err(anyhow::Error::new(Cancelled));
        }
        let result = merge_group(&collected, output, &deadline, &self.token);
        remove_files_best_effort(&collected);
        result?;
        Ok(())
    }
}

/// Merge one group of sorted files into `target`, returning the number
/// of lines written. A single input degenerates to a byte-faithful copy.
pub(crate) fn merge_group(
    files: &[PathBuf],
    target: &Path,
    deadline: &Deadline,
    token: &CancellationToken,
) -> Result<u64, anyhow::Error> {
    log::info!(
        "merging {} files into {}, thread: {}",
        files.len(),
        target.to_string_lossy(),
        thread::current().name().unwrap_or("unnamed")
    );
    let mut written: u64 = 0;
    if files.len() == 1 {
        let file = File::open(&files[0])
            .with_context(|| format!("path: {}", files[0].to_string_lossy()))?;
        let mut reader = BufReader::new(file);
        let target_file = File::create(target)
            .with_context(|| format!("path: {}", target.to_string_lossy()))?;
        let mut writer = BufWriter::new(target_file);
        let mut line = String::new();
        while reader.read_line(&mut line)? > 0 {
            writer.write_all(line.as_bytes())?;
            written += 1;
            if written % DEADLINE_CHECK_INTERVAL == 0 {
                deadline.check()?;
                if token.is_cancelled() {
                    return Err(anyhow::Error::new(Cancelled));
                }
            }
            line.clear();
        }
        writer.flush()?;
    } else {
        let mut readers = Vec::with_capacity(files.len());
        for path in files {
            readers.push(LineReader::open(path)?);
        }
        let mut heap: BinaryHeap<Reverse<HeapNode>> = BinaryHeap::with_capacity(readers.len());
        for (source, reader) in readers.iter_mut().enumerate() {
            if let Some((line, key)) = reader.next_record()? {
                heap.push(Reverse(HeapNode::new(source, line, key)));
            }
        }
        let mut writer = RunWriter::create(target)?;
        while let Some(Reverse(node)) = heap.pop() {
            writer.write_line(node.line())?;
            written += 1;
            if written % DEADLINE_CHECK_INTERVAL == 0 {
                deadline.check()?;
                if token.is_cancelled() {
                    return Err(anyhow::Error::new(Cancelled));
                }
            }
            if let Some((line, key)) = readers[node.source()].next_record()? {
                heap.push(Reverse(HeapNode::new(node.source(), line, key)));
            }
        }
        writer.flush()?;
    }
    log::info!(
        "finished merging into {}, {} lines, thread: {}",
        target.to_string_lossy(),
        written,
        thread::current().name().unwrap_or("unnamed")
    );
    Ok(written)
}

fn intermediate_target(output: &Path) -> PathBuf {
    let directory = output.parent().unwrap_or_else(|| Path::new(""));
    let name = format!("merge-{}.tmp", HEXLOWER.encode(&rand::random::<[u8; 16]>()));
    directory.join(name)
}

pub(crate) fn remove_files_best_effort(paths: &[PathBuf]) {
    for path in paths {
        if path.exists() {
            if let Err(error) = std::fs::remove_file(path) {
                log::warn!("failed to remove {}: {}", path.to_string_lossy(), error);
            }
        }
    }
}
