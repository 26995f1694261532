//! Fixed-length header records.
//!
//! The header is a sequence of 80-byte text records, each starting with a
//! keyword. Records are blank padded on write and may be NUL terminated
//! on read.

use mtzkit_core::{keymatch, Token, Tokenizer};

/// Length of one header record in bytes.
pub const RECORD_LEN: usize = 80;

/// Text of a record up to the first NUL.
#[must_use]
pub fn record_text(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// Builds a record from the first `nitems` bytes of `text`, stopping at a
/// NUL, and pads it with blanks.
#[must_use]
pub fn pad_record(text: &str, nitems: usize) -> [u8; RECORD_LEN] {
    let mut rec = [b' '; RECORD_LEN];
    for (dst, &b) in rec
        .iter_mut()
        .zip(text.as_bytes().iter().take(nitems.min(RECORD_LEN)))
    {
        if b == 0 {
            break;
        }
        *dst = b;
    }
    rec
}

/// Formats a number the way C's `%.{precision}g` does.
#[must_use]
pub fn format_g(value: f64, precision: usize) -> String {
    if value.is_nan() {
        return if value.is_sign_negative() { "-nan" } else { "nan" }.to_string();
    }
    if value.is_infinite() {
        return if value < 0.0 { "-inf" } else { "inf" }.to_string();
    }
    if value == 0.0 {
        return if value.is_sign_negative() { "-0" } else { "0" }.to_string();
    }
    let p = precision.max(1);
    let sci = format!("{:.*e}", p - 1, value);
    let (mantissa, exp) = sci.split_once('e').unwrap_or((sci.as_str(), "0"));
    let exp: i64 = exp.parse().unwrap_or(0);
    let p = i64::try_from(p).unwrap_or(i64::MAX);
    if exp < -4 || exp >= p {
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{}e{sign}{:02}", strip_zeros(mantissa), exp.abs())
    } else {
        let decimals = usize::try_from(p - 1 - exp).unwrap_or(0);
        strip_zeros(&format!("{value:.decimals$}")).to_string()
    }
}

fn strip_zeros(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}

/// Leading integer of `s` as C's `atoi` reads it.
pub(crate) fn atoi(s: &str) -> i32 {
    let s = s.trim_start();
    let (neg, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let end = digits.bytes().position(|b| !b.is_ascii_digit()).unwrap_or(digits.len());
    let v: i32 = digits[..end].parse().unwrap_or(0);
    if neg {
        -v
    } else {
        v
    }
}

/// Truncates `s` to at most `n` characters.
pub(crate) fn clip(s: &str, n: usize) -> String {
    s.chars().take(n).collect()
}

/// A header record split into tokens.
#[derive(Debug, Clone)]
pub struct HeaderRecord {
    pub text: String,
    pub tokens: Vec<Token>,
}

impl HeaderRecord {
    #[must_use]
    pub fn parse(bytes: &[u8]) -> Self {
        let text = record_text(bytes);
        let tokens = Tokenizer::default().tokenize(&text);
        Self { text, tokens }
    }

    /// First token of the record.
    #[must_use]
    pub fn keyword(&self) -> &str {
        self.tokens.first().map_or("", |t| t.text.as_str())
    }

    /// True if the keyword matches `key` on four characters, ignoring case.
    #[must_use]
    pub fn is(&self, key: &str) -> bool {
        keymatch(self.keyword(), key)
    }

    /// True if the raw record starts with `prefix`.
    #[must_use]
    pub fn starts_with(&self, prefix: &str) -> bool {
        self.text.starts_with(prefix)
    }

    #[must_use]
    pub fn ntok(&self) -> usize {
        self.tokens.len()
    }

    /// Text of token `i`, empty if absent.
    #[must_use]
    pub fn text_at(&self, i: usize) -> &str {
        self.tokens.get(i).map_or("", |t| t.text.as_str())
    }

    /// Numeric value of token `i`, 0 if absent or not numeric.
    #[must_use]
    pub fn number(&self, i: usize) -> f64 {
        self.tokens.get(i).map_or(0.0, Token::number)
    }

    #[must_use]
    pub fn int(&self, i: usize) -> i32 {
        self.tokens.get(i).map_or(0, Token::int)
    }

    /// Characters `from..to` of the raw record.
    #[must_use]
    pub fn field(&self, from: usize, to: usize) -> String {
        self.text.chars().skip(from).take(to.saturating_sub(from)).collect()
    }
}

/// Sequential reader over header records that can return to where it
/// started.
#[derive(Debug, Clone)]
pub(crate) struct RecordCursor<'a> {
    data: &'a [u8],
    start: usize,
    pos: usize,
}

impl<'a> RecordCursor<'a> {
    pub(crate) fn new(data: &'a [u8], start: usize) -> Self {
        Self {
            data,
            start,
            pos: start,
        }
    }

    pub(crate) fn rewind(&mut self) {
        self.pos = self.start;
    }

    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    /// Next `n` raw bytes, or `None` at end of data.
    pub(crate) fn read_bytes(&mut self, n: usize) -> Option<&'a [u8]> {
        let bytes = self.data.get(self.pos..self.pos.checked_add(n)?)?;
        self.pos += n;
        Some(bytes)
    }

    pub(crate) fn next_record(&mut self) -> Option<HeaderRecord> {
        self.read_bytes(RECORD_LEN).map(HeaderRecord::parse)
    }

    /// Everything after the current position.
    pub(crate) fn rest(&self) -> &'a [u8] {
        self.data.get(self.pos..).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_g() {
        assert_eq!(format_g(0.0, 9), "0");
        assert_eq!(format_g(30.0, 9), "30");
        assert_eq!(format_g(-12.5, 9), "-12.5");
        assert_eq!(format_g(1.0e-5, 9), "1e-05");
        assert_eq!(format_g(0.0001, 9), "0.0001");
        assert_eq!(format_g(1.0e10, 9), "1e+10");
        assert_eq!(format_g(123_456_789.0, 9), "123456789");
        assert_eq!(format_g(1_234_567_890.0, 9), "1.23456789e+09");
        assert_eq!(format_g(f64::from(0.1f32), 9), "0.100000001");
        assert_eq!(format_g(f64::NAN, 9), "nan");
    }

    #[test]
    fn test_pad_record() {
        let rec = pad_record("VERS MTZ:V1.1", 13);
        assert_eq!(&rec[..13], b"VERS MTZ:V1.1");
        assert!(rec[13..].iter().all(|&b| b == b' '));

        let cut = pad_record("SYMINF   1  1 \0 rest", 52);
        assert_eq!(record_text(&cut).trim_end(), "SYMINF   1  1");

        let short = pad_record("NDIF        2 and more", 13);
        assert_eq!(record_text(&short).trim_end(), "NDIF        2");
    }

    #[test]
    fn test_header_record() {
        let rec = HeaderRecord::parse(&pad_record("COLUMN FP   F  1.5 300.25    1", 80));
        assert!(rec.is("COLU"));
        assert!(rec.starts_with("COLU"));
        assert_eq!(rec.ntok(), 6);
        assert_eq!(rec.text_at(1), "FP");
        assert_eq!(rec.int(5), 1);
        assert!((rec.number(4) - 300.25).abs() < 1e-9);
        assert_eq!(rec.text_at(9), "");
    }

    #[test]
    fn test_atoi() {
        assert_eq!(atoi("1.1"), 1);
        assert_eq!(atoi("  -42x"), -42);
        assert_eq!(atoi("x"), 0);
    }

    #[test]
    fn test_cursor() {
        let mut data = Vec::new();
        data.extend_from_slice(&pad_record("TITLE one", 80));
        data.extend_from_slice(&pad_record("END", 80));
        data.extend_from_slice(b"tail");
        let mut cursor = RecordCursor::new(&data, 0);
        assert!(cursor.next_record().unwrap().is("TITL"));
        assert!(cursor.next_record().unwrap().starts_with("END"));
        assert_eq!(cursor.rest(), b"tail");
        assert!(cursor.next_record().is_none());
        cursor.rewind();
        assert_eq!(cursor.position(), 0);
    }
}
