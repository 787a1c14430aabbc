use regex::Regex;

/// Compiles `pattern` anchored to the match start, so [`Scanner::scan`] can
/// only succeed at the cursor position.
pub fn anchored(pattern: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!(r"\A(?:{pattern})"))
}

/// A pull-based cursor over a UTF-8 string.
///
/// All matching goes through [`anchored`] patterns: on success the cursor
/// advances past the match, on failure it stays put.
pub struct Scanner<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Scanner<'a> {
    pub fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    pub fn is_eos(&self) -> bool {
        self.pos >= self.input.len()
    }

    /// The not yet consumed remainder of the input.
    pub fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Moves the cursor. `pos` must sit on a character boundary.
    pub fn set_pos(&mut self, pos: usize) {
        debug_assert!(self.input.is_char_boundary(pos));
        self.pos = pos.min(self.input.len());
    }

    /// Matches `pattern` at the cursor. On success the cursor advances past
    /// the match and the matched slice is returned; an empty match is treated
    /// as a failure so callers can safely loop on `scan`.
    pub fn scan(&mut self, pattern: &Regex) -> Option<&'a str> {
        let found = pattern.find(self.rest())?;
        debug_assert_eq!(found.start(), 0, "scanner patterns must be anchored");
        if found.end() == 0 {
            return None;
        }
        let matched = &self.rest()[..found.end()];
        self.pos += found.end();
        Some(matched)
    }

    /// Like [`scan`](Self::scan), discarding the match.
    pub fn skip(&mut self, pattern: &Regex) -> Option<usize> {
        self.scan(pattern).map(str::len)
    }

    /// Consumes a single character, for resynchronization after a failed match.
    pub fn advance_char(&mut self) -> Option<char> {
        let c = self.rest().chars().next()?;
        self.pos += c.len_utf8();
        Some(c)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_advances_only_on_match() {
        let digits = anchored("[0-9]+").unwrap();
        let word = anchored("[a-z]+").unwrap();
        let mut scanner = Scanner::new("abc123");
        assert_eq!(scanner.scan(&digits), None);
        assert_eq!(scanner.pos(), 0);
        assert_eq!(scanner.scan(&word), Some("abc"));
        assert_eq!(scanner.pos(), 3);
        assert_eq!(scanner.rest(), "123");
        assert_eq!(scanner.skip(&digits), Some(3));
        assert!(scanner.is_eos());
    }

    #[test]
    fn empty_match_is_a_failure() {
        let optional = anchored("x?").unwrap();
        let mut scanner = Scanner::new("abc");
        assert_eq!(scanner.scan(&optional), None);
        assert_eq!(scanner.pos(), 0);
    }

    #[test]
    fn advance_char_is_utf8_safe() {
        let mut scanner = Scanner::new("é!");
        assert_eq!(scanner.advance_char(), Some('é'));
        assert_eq!(scanner.rest(), "!");
    }
}
