use std::str::FromStr;

use crate::key::Key;

/// Split a raw line into `(number, text)`. The record form is
/// `<number>. <text>`: an integer, the first dot, one space, then the
/// text, which may be empty. Anything else is not a record and yields
/// `None`; parsing never fails hard.
pub(crate) fn parse_line(line: &str) -> Option<(i64, &str)> {
    let dot = line.find('.')?;
    if dot == 0 {
        return None;
    }
    let number = i64::from_str(line[..dot].trim()).ok()?;
    if line.as_bytes().get(dot + 1) != Some(&b' ') {
        return None;
    }
    Some((number, &line[dot + 2..]))
}

/// Parse a line into an owned merge [`Key`].
pub(crate) fn parse_key(line: &str) -> Option<Key> {
    let (number, text) = parse_line(line)?;
    Some(Key::new(text.to_string(), number))
}
