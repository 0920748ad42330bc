use std::cmp::Ordering;

/// The one ordering used everywhere: case-insensitive text comparison,
/// then ascending number for equal text. Chunk sorting compares buffer
/// spans through this function and the merge compares [`Key`]s through
/// it, so the two phases cannot disagree.
pub(crate) fn compare_text(left: &str, right: &str) -> Ordering {
    let lhs = left.chars().flat_map(char::to_lowercase);
    let rhs = right.chars().flat_map(char::to_lowercase);
    lhs.cmp(rhs)
}

/// Owned ordering key for merge candidates.
#[derive(Debug, Clone)]
pub(crate) struct Key {
    text: String,
    number: i64,
}

impl Key {
    pub(crate) fn new(text: String, number: i64) -> Key {
        Key { text, number }
    }

    pub(crate) fn text(&self) -> &str {
        &self.text
    }

    pub(crate) fn number(&self) -> i64 {
        self.number
    }
}

impl Eq for Key {}

impl PartialEq<Self> for Key {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl PartialOrd<Self> for Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Key {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_text(&self.text, &other.text)
            .then_with(|| self.number.cmp(&other.number))
    }
}
