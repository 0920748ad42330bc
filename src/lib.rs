//! This crate implements an external merge sort for text files of numbered
//! records, that is files where every line has the form `<number>. <text>`.
//!
//! Records are ordered by their text, compared case-insensitively, with
//! the numeric value as tie-break. The implementation targets files far
//! larger than available memory: the input is streamed into a fixed set
//! of pooled buffers, full chunks are sorted by parallel workers and
//! spilled to disk as sorted run files, and the runs are combined by a
//! bounded-fan-in k-way merge. Peak chunk memory is capped at
//! `(degree + 1) × chunk size` no matter how large the input grows, and
//! a single `degree` setting controls the worker count, the buffer pool
//! size and the merge fan-in width.
//!
//! # Examples
//! ```
//! use std::path::PathBuf;
//! use numbered_line_sort::sort::Sort;
//!
//! // optimized for use with Jemalloc
//! use tikv_jemallocator::Jemalloc;
//! #[global_allocator]
//! static GLOBAL: Jemalloc = Jemalloc;
//!
//! // parallel external sort of numbered records
//! fn sort_records(input: PathBuf, output: PathBuf, tmp: PathBuf) -> Result<(), anyhow::Error> {
//!     let mut sort = Sort::new(input, output);
//!
//!     // set the parallelism degree: the number of sorting workers, the
//!     // buffer pool sizing basis and the merge fan-in width. The default
//!     // is to use all available CPU cores.
//!     sort.with_degree(2);
//!
//!     // set the directory for intermediate run files. The default is the
//!     // system temp dir - std::env::temp_dir(), however, for large files
//!     // it is recommended to provide a dedicated directory, preferably on
//!     // the same file system as the output result.
//!     sort.with_tmp_dir(tmp);
//!
//!     sort.sort()
//! }
//! ```

pub(crate) mod buffer_pool;
pub(crate) mod chunk;
pub(crate) mod chunk_producer;
pub(crate) mod config;
pub(crate) mod failure;
pub(crate) mod heap_node;
pub(crate) mod key;
pub(crate) mod line_parser;
pub(crate) mod line_reader;
pub(crate) mod merge_command;
pub(crate) mod run_sort_command;
pub(crate) mod run_writer;

pub mod cancellation;
pub mod coordinator;
pub mod merger;
pub mod policy;
pub mod sort;
