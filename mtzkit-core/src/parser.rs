//! Tokenizer for keyworded text records.
//!
//! Header records and reference-table lines are split into tokens on a
//! configurable delimiter set. Quoted strings are kept whole, a pair of
//! adjacent null delimiters yields an empty token, and a comment
//! character ends the line.

const QUOTES: [char; 2] = ['"', '\''];

/// One token of a parsed line.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// Full token text, without enclosing quotes.
    pub text: String,
    /// Numeric value if the whole token parses as a finite number.
    pub value: Option<f64>,
    /// The token was enclosed in quotes.
    pub quoted: bool,
    /// Empty token produced by two adjacent null delimiters.
    pub null: bool,
    /// Character offset of the first character.
    pub start: usize,
}

impl Token {
    /// First four characters, the significant part of a keyword.
    #[must_use]
    pub fn word(&self) -> &str {
        match self.text.char_indices().nth(4) {
            Some((i, _)) => &self.text[..i],
            None => &self.text,
        }
    }

    /// Numeric value or 0.0, the way header fields are read.
    #[must_use]
    pub fn number(&self) -> f64 {
        self.value.unwrap_or(0.0)
    }

    /// Numeric value truncated to an integer.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn int(&self) -> i32 {
        self.number() as i32
    }
}

fn numeric_value(s: &str) -> Option<f64> {
    let first = s.chars().next()?;
    if !(first.is_ascii_digit() || matches!(first, '+' | '-' | '.')) {
        return None;
    }
    s.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Line tokenizer with configurable delimiters.
#[derive(Debug, Clone)]
pub struct Tokenizer {
    delimiters: Vec<char>,
    null_delimiters: Vec<char>,
    comments: Vec<char>,
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self {
            delimiters: vec![' ', '\t', ',', '=', '\r'],
            null_delimiters: vec![',', '='],
            comments: vec!['!', '#'],
        }
    }
}

impl Tokenizer {
    /// Creates a tokenizer with the given delimiters. Null delimiters must
    /// also appear in `delimiters`.
    #[must_use]
    pub fn new(delimiters: &str, null_delimiters: &str) -> Self {
        Self {
            delimiters: delimiters.chars().collect(),
            null_delimiters: null_delimiters.chars().collect(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_comments(mut self, comments: &str) -> Self {
        self.comments = comments.chars().collect();
        self
    }

    fn is_delim(&self, c: char) -> bool {
        self.delimiters.contains(&c)
    }

    fn is_comment(&self, c: char) -> bool {
        self.comments.contains(&c)
    }

    /// Splits `line` into tokens.
    #[must_use]
    #[allow(clippy::cast_sign_loss, clippy::cast_possible_wrap)]
    pub fn tokenize(&self, line: &str) -> Vec<Token> {
        let line = line.strip_suffix('\n').unwrap_or(line);
        let chars: Vec<char> = line.chars().collect();
        let mut tokens = Vec::new();
        if chars.is_empty() {
            return tokens;
        }
        let d0 = self.delimiters.first().copied().unwrap_or(' ');
        let last = chars.len() - 1;

        let mut quoted = false;
        let mut in_token = false;
        let mut match_quote = ' ';
        let mut token_quoted = false;
        let mut ibeg = 0usize;
        let mut ich: isize = -1;

        while ich <= last as isize {
            let this = if ich < 0 { d0 } else { chars[ich as usize] };
            let next = if ich == last as isize {
                d0
            } else {
                chars[(ich + 1) as usize]
            };
            let mut start = false;
            let mut end = false;
            let mut null = false;
            let mut comment = false;

            if quoted {
                if this == match_quote && self.is_delim(next) {
                    quoted = false;
                    end = true;
                }
            } else if self.is_delim(this) && QUOTES.contains(&next) {
                quoted = true;
                start = true;
                match_quote = next;
                ich += 1;
            } else {
                comment = self.is_comment(this);
                let next_breaks = self.is_delim(next) || self.is_comment(next);
                if !self.is_delim(this) {
                    end = in_token && next_breaks;
                } else {
                    start = !in_token && !next_breaks;
                    if !in_token
                        && self.null_delimiters.contains(&this)
                        && self.null_delimiters.contains(&next)
                    {
                        null = true;
                    }
                }
            }

            if null {
                tokens.push(Token {
                    text: String::new(),
                    value: None,
                    quoted: false,
                    null: true,
                    start: ich.max(0) as usize,
                });
            } else if start {
                in_token = true;
                token_quoted = quoted;
                ibeg = (ich + 1) as usize;
            }

            if end && in_token {
                in_token = false;
                let iend = if token_quoted { ich - 1 } else { ich };
                let text: String = if iend >= ibeg as isize {
                    chars[ibeg..=iend as usize].iter().collect()
                } else {
                    String::new()
                };
                let value = if token_quoted { None } else { numeric_value(&text) };
                tokens.push(Token {
                    text,
                    value,
                    quoted: token_quoted,
                    null: false,
                    start: ibeg,
                });
            }

            if comment {
                break;
            }
            ich += 1;
        }
        tokens
    }
}

/// Compares two keywords on their first four characters, ignoring case.
#[must_use]
pub fn keymatch(key1: &str, key2: &str) -> bool {
    let k1: Vec<char> = key1.chars().take(4).map(|c| c.to_ascii_uppercase()).collect();
    let k2: Vec<char> = key2.chars().take(4).map(|c| c.to_ascii_uppercase()).collect();
    k1 == k2
}
