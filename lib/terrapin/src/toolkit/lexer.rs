use crate::toolkit::error::{ConfigError, LexerError};
use crate::toolkit::scanner::{Scanner, anchored};
use memchr::{memchr, memchr_iter};
use regex::Regex;
use std::fmt;
use std::hash::Hash;

/// A terminal kind symbol: a cheap, copyable identifier provided by the
/// grammar, typically a fieldless enum.
pub trait TokenKind: Copy + Eq + Hash + fmt::Debug + 'static {}

impl<T: Copy + Eq + Hash + fmt::Debug + 'static> TokenKind for T {}

/// A single lexed token.
///
/// Tokens without a kind are punctuation or keyword literals: their identity
/// is their text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token<K> {
    pub kind: Option<K>,
    /// The matched text, unescaped when the terminal asked for it.
    pub value: String,
    /// 1-based line the token starts on.
    pub lineno: u64,
}

/// A terminal definition. Registration order defines the evaluation priority:
/// the first pattern that matches at the cursor wins.
pub struct Terminal<K> {
    pub(crate) kind: Option<K>,
    pattern: Regex,
    unescape: bool,
}

impl<K> Terminal<K> {
    pub fn new(kind: Option<K>, pattern: &str, unescape: bool) -> Result<Self, ConfigError> {
        Ok(Self {
            kind,
            pattern: anchored(pattern).map_err(|e| ConfigError::Pattern {
                pattern: pattern.to_owned(),
                message: e.to_string(),
            })?,
            unescape,
        })
    }
}

/// Turns an input string into a lazy sequence of [`Token`]s, skipping
/// whitespace and comments between them.
pub struct Lexer<'a, K> {
    scanner: Scanner<'a>,
    terminals: &'a [Terminal<K>],
    whitespace: &'a Regex,
    comment: &'a Regex,
    lineno: u64,
    peeked: Option<Token<K>>,
    failed: bool,
}

impl<'a, K: TokenKind> Lexer<'a, K> {
    pub fn new(
        input: &'a str,
        terminals: &'a [Terminal<K>],
        whitespace: &'a Regex,
        comment: &'a Regex,
    ) -> Result<Self, ConfigError> {
        if terminals.is_empty() {
            return Err(ConfigError::NoTerminals);
        }
        Ok(Self {
            scanner: Scanner::new(input),
            terminals,
            whitespace,
            comment,
            lineno: 1,
            peeked: None,
            failed: false,
        })
    }

    /// The line the lexer cursor is currently on.
    pub fn lineno(&self) -> u64 {
        self.peeked.as_ref().map_or(self.lineno, |t| t.lineno)
    }

    /// Returns the next token without consuming it. Idempotent until
    /// [`shift`](Self::shift): repeated calls return the same token, and a
    /// failing call leaves the cursor on the offending input.
    pub fn first(&mut self) -> Result<Option<&Token<K>>, LexerError> {
        if self.peeked.is_none() {
            self.peeked = self.next_token()?;
        }
        Ok(self.peeked.as_ref())
    }

    /// Returns the next token and consumes it.
    pub fn shift(&mut self) -> Result<Option<Token<K>>, LexerError> {
        self.first()?;
        Ok(self.peeked.take())
    }

    /// Resynchronizes after a failed match: skip `pattern` if given, then retry
    /// [`first`](Self::first); while that keeps failing, advance one character
    /// and retry. Afterwards the lexer either has a valid lookahead or is at
    /// EOF.
    pub fn recover(&mut self, pattern: Option<&Regex>) {
        self.peeked = None;
        if let Some(pattern) = pattern {
            if let Some(text) = self.scanner.scan(pattern) {
                self.lineno += count_line_jumps(text);
            }
        }
        loop {
            match self.next_token() {
                Ok(token) => {
                    self.peeked = token;
                    return;
                }
                Err(_) => match self.scanner.advance_char() {
                    Some('\n') => self.lineno += 1,
                    Some(_) => {}
                    None => return,
                },
            }
        }
    }

    fn next_token(&mut self) -> Result<Option<Token<K>>, LexerError> {
        self.skip_filler();
        if self.scanner.is_eos() {
            return Ok(None);
        }
        let lineno = self.lineno;
        for terminal in self.terminals {
            if let Some(text) = self.scanner.scan(&terminal.pattern) {
                self.lineno += count_line_jumps(text);
                let value = if terminal.unescape {
                    unescape(text)
                } else {
                    text.to_owned()
                };
                return Ok(Some(Token {
                    kind: terminal.kind,
                    value,
                    lineno,
                }));
            }
        }
        Err(self.no_match_error())
    }

    /// Skips the whitespace pattern, then the comment pattern, until neither
    /// matches, counting line jumps.
    fn skip_filler(&mut self) {
        loop {
            let mut matched = false;
            if let Some(text) = self.scanner.scan(self.whitespace) {
                self.lineno += count_line_jumps(text);
                matched = true;
            }
            if self.scanner.skip(self.comment).is_some() {
                matched = true;
            }
            if !matched {
                return;
            }
        }
    }

    fn no_match_error(&self) -> LexerError {
        let rest = self.scanner.rest();
        let offending_end = rest
            .find(|c: char| c.is_ascii_whitespace())
            .unwrap_or(rest.len());
        let line_end = memchr(b'\n', rest.as_bytes()).unwrap_or(rest.len());
        LexerError {
            offending_token: truncate(&rest[..offending_end], 100).to_owned(),
            snippet: truncate(&rest[..line_end], 100).to_owned(),
            lineno: self.lineno,
        }
    }
}

impl<K: TokenKind> Iterator for Lexer<'_, K> {
    type Item = Result<Token<K>, LexerError>;

    /// Lazily yields the remaining tokens; the sequence is finite and ends at
    /// EOF or at the first lexer error.
    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.shift() {
            Ok(token) => token.map(Ok),
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

fn count_line_jumps(text: &str) -> u64 {
    memchr_iter(b'\n', text.as_bytes()).count() as u64
}

/// Truncates to at most `max` bytes without splitting a character.
fn truncate(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Decodes `\uXXXX` and `\UXXXXXXXX` numeric escapes and the single-character
/// string escapes, left to right.
///
/// At each escape position the numeric forms are tried first, and a character
/// produced by an escape is never reinterpreted as the start of a new one, so
/// `\` followed by `n` stays a backslash and an `n`.
pub fn unescape(value: &str) -> String {
    if memchr(b'\\', value.as_bytes()).is_none() {
        return value.to_owned();
    }
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(i) = memchr(b'\\', rest.as_bytes()) {
        out.push_str(&rest[..i]);
        let tail = &rest[i + 1..];
        let (decoded, consumed) = decode_escape(tail);
        match decoded {
            Some(c) => out.push(c),
            // Unknown escape: keep the backslash as-is.
            None => out.push('\\'),
        }
        rest = &tail[consumed..];
    }
    out.push_str(rest);
    out
}

/// Decodes the escape following a backslash, returning the character and the
/// number of bytes consumed after the backslash.
fn decode_escape(tail: &str) -> (Option<char>, usize) {
    let mut chars = tail.chars();
    match chars.next() {
        Some('u') => decode_hex(&tail[1..], 4).map_or((None, 0), |c| (Some(c), 5)),
        Some('U') => decode_hex(&tail[1..], 8).map_or((None, 0), |c| (Some(c), 9)),
        Some('t') => (Some('\t'), 1),
        Some('b') => (Some('\u{8}'), 1),
        Some('n') => (Some('\n'), 1),
        Some('r') => (Some('\r'), 1),
        Some('f') => (Some('\u{C}'), 1),
        Some(c @ ('"' | '\'' | '\\')) => (Some(c), 1),
        _ => (None, 0),
    }
}

fn decode_hex(tail: &str, len: usize) -> Option<char> {
    let digits = tail.get(..len)?;
    char::from_u32(u32::from_str_radix(digits, 16).ok()?)
}
