use crate::key::compare_text;

/// One record inside a chunk: the parsed number plus the span of the
/// record's text in the owning chunk's buffer. An entry is meaningless
/// without its chunk.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Entry {
    number: i64,
    start: usize,
    length: usize,
}

impl Entry {
    pub(crate) fn new(number: i64, start: usize, length: usize) -> Entry {
        Entry {
            number,
            start,
            length,
        }
    }

    pub(crate) fn number(&self) -> i64 {
        self.number
    }
}

/// A rented pool buffer filled with record text plus the entries that
/// index into it. The buffer travels with the chunk from the producer to
/// the sorting worker and returns to the pool when the chunk is consumed.
#[derive(Debug)]
pub(crate) struct Chunk {
    buffer: String,
    entries: Vec<Entry>,
}

impl Chunk {
    pub(crate) fn new(buffer: String, entries: Vec<Entry>) -> Chunk {
        Chunk { buffer, entries }
    }

    pub(crate) fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn used(&self) -> usize {
        self.buffer.len()
    }

    pub(crate) fn text(&self, entry: &Entry) -> &str {
        &self.buffer[entry.start..entry.start + entry.length]
    }

    /// Order the entries with the shared comparator: case-insensitive
    /// text, then ascending number.
    pub(crate) fn sort_entries(&mut self) {
        let Chunk { buffer, entries } = self;
        let text = |entry: &Entry| &buffer[entry.start..entry.start + entry.length];
        entries.sort_unstable_by(|left, right| {
            compare_text(text(left), text(right)).then_with(|| left.number.cmp(&right.number))
        });
    }

    pub(crate) fn into_buffer(self) -> String {
        self.buffer
    }
}
