use std::fs;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::thread;

use anyhow::{bail, Error};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use simple_logger::SimpleLogger;

use numbered_line_sort::coordinator::StartGate;
use numbered_line_sort::sort::Sort;

use tikv_jemallocator::Jemalloc;
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

const WORDS: [&str; 8] = [
    "apple", "banana", "cherry", "date", "fig", "grape", "kiwi", "lemon",
];

fn generate_input(path: &Path, count: usize) -> Result<(), Error> {
    let mut rng = StdRng::seed_from_u64(415);
    let mut writer = BufWriter::new(File::create(path)?);
    for _ in 0..count {
        let number: i64 = rng.gen_range(0..100_000);
        let word = WORDS[rng.gen_range(0..WORDS.len())];
        if rng.gen_bool(0.5) {
            writeln!(writer, "{}. {}", number, word.to_uppercase())?;
        } else {
            writeln!(writer, "{}. {}", number, word)?;
        }
    }
    writer.flush()?;
    Ok(())
}

fn verify_sorted(path: &Path) -> Result<(), Error> {
    let reader = BufReader::new(File::open(path)?);
    let mut previous: Option<(String, i64)> = None;
    for line in reader.lines() {
        let line = line?;
        let dot = line.find('.').unwrap();
        let number: i64 = line[..dot].parse()?;
        let current = (line[dot + 2..].to_lowercase(), number);
        if let Some(previous) = previous {
            if previous > current {
                bail!("output is not sorted: {:?} before {:?}", previous, current);
            }
        }
        previous = Some(current);
    }
    Ok(())
}

// cargo run -r --example sort_numbered_file
pub fn main() -> Result<(), Error> {
    SimpleLogger::new().init().unwrap();

    let input_path = PathBuf::from("./target/demo-input.dat");
    let output_path = PathBuf::from("./target/demo-sorted.dat");
    let tmp_path = PathBuf::from("./target/demo-tmp/");
    generate_input(&input_path, 100_000)?;

    // the sort waits on the gate; the main thread plays the operator and
    // releases it
    let gate = StartGate::new();
    let mut sort = Sort::new(input_path.clone(), output_path.clone());
    sort.with_degree(4);
    sort.with_chunk_size_mb(1);
    sort.with_tmp_dir(tmp_path.clone());
    sort.with_start_gate(gate.clone());

    let sorter = thread::spawn(move || sort.sort());
    log::info!("releasing the start gate");
    gate.signal();
    sorter.join().unwrap()?;

    verify_sorted(&output_path)?;
    log::info!("sorted output verified at {}", output_path.to_string_lossy());

    fs::remove_file(input_path)?;
    fs::remove_file(output_path)?;
    fs::remove_dir_all(tmp_path)?;
    Ok(())
}
