use std::path::PathBuf;

/// Resolved settings snapshot for one sort execution. Built by
/// `Sort::create_config` after defaults are applied; handed to commands
/// by value so workers never reach back into the builder.
#[derive(Clone, Debug)]
pub(crate) struct Config {
    input: PathBuf,
    output: PathBuf,
    tmp: PathBuf,
    degree: usize,
    chunk_size_bytes: u64,
}

impl Config {
    pub(crate) fn new(
        input: PathBuf,
        output: PathBuf,
        tmp: PathBuf,
        degree: usize,
        chunk_size_bytes: u64,
    ) -> Config {
        Config {
            input,
            output,
            tmp,
            degree,
            chunk_size_bytes,
        }
    }

    pub(crate) fn input(&self) -> &PathBuf {
        &self.input
    }

    pub(crate) fn output(&self) -> &PathBuf {
        &self.output
    }

    pub(crate) fn tmp(&self) -> &PathBuf {
        &self.tmp
    }

    pub(crate) fn degree(&self) -> usize {
        self.degree
    }

    pub(crate) fn chunk_size_bytes(&self) -> u64 {
        self.chunk_size_bytes
    }

    /// Capacity of one pool buffer. Text is stored as UTF-8 bytes, so the
    /// buffer unit is one byte and the capacity equals the chunk size.
    pub(crate) fn buffer_size(&self) -> usize {
        self.chunk_size_bytes as usize
    }

    /// Hand-off capacity between the producer and the sorting workers.
    pub(crate) fn queue_size(&self) -> usize {
        self.degree
    }

    /// Upper bound of concurrently open run handles during the parallel
    /// merge level, used to budget the NOFILE raise.
    pub(crate) fn files(&self) -> usize {
        self.degree * (self.degree + 1)
    }
}
