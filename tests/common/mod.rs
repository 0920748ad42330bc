use std::collections::HashMap;
use std::fs;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::str::FromStr;

use data_encoding::HEXLOWER;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub fn setup() {
    let results_dir_path = PathBuf::from_str("./target/results/").unwrap();

    if !results_dir_path.exists() {
        fs::create_dir_all(&results_dir_path).unwrap_or_else(|_| {
            panic!("Failed to create results directory: {:?}", results_dir_path)
        });
    }
}

#[allow(dead_code)]
pub fn read_lines(path: PathBuf) -> Result<Vec<String>, anyhow::Error> {
    let reader = BufReader::new(File::open(path)?);
    let lines = reader.lines().map(|x| x.unwrap()).collect();
    Ok(lines)
}

#[allow(dead_code)]
pub fn temp_file_name(dir: &str) -> PathBuf {
    let mut result = PathBuf::from(dir);
    let name = HEXLOWER.encode(&rand::random::<[u8; 16]>());
    result.push(name);
    result
}

/// Create a uniquely named working directory for one test. Tests run in
/// parallel and the sort deletes stale run files from its tmp dir at
/// startup, so concurrent tests must never share a tmp dir.
#[allow(dead_code)]
pub fn work_dir() -> PathBuf {
    let dir = temp_file_name("./target/results/");
    fs::create_dir_all(&dir).unwrap_or_else(|_| panic!("Failed to create work dir: {:?}", dir));
    dir
}

const WORDS: [&str; 12] = [
    "apple", "banana", "cherry", "date", "elder", "fig", "grape", "honeydew", "kiwi", "lemon",
    "mango", "nectarine",
];

/// Write `count` pseudo-random numbered records to `path`. The same seed
/// always produces the same file. Text case is randomized so the
/// case-insensitive ordering is actually exercised.
#[allow(dead_code)]
pub fn generate_input(path: &PathBuf, count: usize, seed: u64) -> Result<(), anyhow::Error> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut writer = BufWriter::new(File::create(path)?);
    for _ in 0..count {
        let number: i64 = rng.gen_range(-1000..1000);
        let words = rng.gen_range(1..4);
        let mut text = String::new();
        for i in 0..words {
            if i > 0 {
                text.push(' ');
            }
            let word = WORDS[rng.gen_range(0..WORDS.len())];
            if rng.gen_bool(0.5) {
                text.push_str(&word.to_uppercase());
            } else {
                text.push_str(word);
            }
        }
        writeln!(writer, "{}. {}", number, text)?;
    }
    writer.flush()?;
    Ok(())
}

/// Parse a canonical `<number>. <text>` line. Panics on lines this crate
/// should never have written.
#[allow(dead_code)]
pub fn parse_record(line: &str) -> (i64, String) {
    let dot = line.find('.').unwrap_or_else(|| panic!("no dot in {:?}", line));
    let number = i64::from_str(line[..dot].trim()).unwrap();
    (number, line[dot + 2..].to_string())
}

/// True when adjacent lines satisfy the crate's ordering: lowercased text
/// first, then ascending number.
#[allow(dead_code)]
pub fn is_sorted(lines: &[String]) -> bool {
    lines.windows(2).all(|pair| {
        let (left_number, left_text) = parse_record(&pair[0]);
        let (right_number, right_text) = parse_record(&pair[1]);
        let left = (left_text.to_lowercase(), left_number);
        let right = (right_text.to_lowercase(), right_number);
        left <= right
    })
}

/// Multiset of `(number, text)` pairs for completeness assertions;
/// malformed lines are skipped the way the sort skips them.
#[allow(dead_code)]
pub fn record_multiset(lines: &[String]) -> HashMap<(i64, String), usize> {
    let mut result: HashMap<(i64, String), usize> = HashMap::new();
    for line in lines {
        if let Some(dot) = line.find('.') {
            if dot == 0 || line.as_bytes().get(dot + 1) != Some(&b' ') {
                continue;
            }
            if let Ok(number) = i64::from_str(line[..dot].trim()) {
                *result
                    .entry((number, line[dot + 2..].to_string()))
                    .or_insert(0) += 1;
            }
        }
    }
    result
}
