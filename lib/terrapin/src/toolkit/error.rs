use std::error::Error;
use std::{fmt, io};

/// An error raised while assembling a [`Grammar`](super::Grammar).
///
/// The grammar is unusable: parsing never starts and the error is never
/// recovered from.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// The terminal table is empty.
    #[error("no terminals registered for the grammar")]
    NoTerminals,
    /// No grammar rules were registered.
    #[error("no rules registered for the grammar")]
    NoRules,
    /// No start production was given, or it has no rule.
    #[error("start production {0} has no rule")]
    UnknownStart(String),
    /// A terminal or filler pattern does not compile.
    #[error("pattern {pattern} does not compile: {message}")]
    Pattern { pattern: String, message: String },
    /// Two alternatives of the same production branch on the same token.
    #[error("grammar is not LL(1): {production} branches twice on {token}")]
    Ambiguous { production: String, token: String },
    /// A rule references a terminal kind missing from the terminal table.
    #[error("rule for {production} references the unregistered terminal {terminal}")]
    UnknownTerminal { production: String, terminal: String },
}

/// No terminal matched at a non-EOF position of the input.
#[derive(Debug, Clone, thiserror::Error)]
#[error("no terminal matches {offending_token:?} at line {lineno}")]
pub struct LexerError {
    /// The next whitespace-delimited slice of the input, truncated to 100 bytes.
    pub offending_token: String,
    /// The remainder of the offending line.
    pub snippet: String,
    /// 1-based line of the first uncoverable character.
    pub lineno: u64,
}

/// A single recorded syntax violation.
#[derive(Debug, Clone)]
pub struct Violation {
    /// The production that was active when the violation was found.
    pub production: String,
    /// The textual form of the offending token, if any.
    pub token: Option<String>,
    /// 1-based source line of the offending token.
    pub lineno: u64,
    pub message: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "syntax error at line {} in {}: {}",
            self.lineno, self.production, self.message
        )
    }
}

/// The aggregated outcome of a failed parse.
///
/// Violations accumulate while the parser resynchronizes; the driver raises
/// them as one error once the input is exhausted, or after the first one when
/// `validate` is set.
#[derive(Debug, Clone)]
pub struct ParseError {
    violations: Vec<Violation>,
}

impl ParseError {
    pub(crate) fn new(violations: Vec<Violation>) -> Self {
        Self { violations }
    }

    /// All recorded violations, in source order.
    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, violation) in self.violations.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            violation.fmt(f)?;
        }
        Ok(())
    }
}

impl Error for ParseError {}

impl From<ParseError> for io::Error {
    fn from(error: ParseError) -> Self {
        Self::new(io::ErrorKind::InvalidData, error)
    }
}
