//! A reusable parsing toolkit: a regex-driven [`Lexer`] over a string
//! [`Scanner`], and a table-driven LL(1) [`Parser`] with FIRST/FOLLOW
//! panic-mode error recovery. Grammars are assembled with [`GrammarBuilder`]
//! and frozen into [`Grammar`] values; nothing here knows about Turtle.

mod error;
mod grammar;
mod lexer;
mod parser;
mod scanner;

pub use self::error::{ConfigError, LexerError, ParseError, Violation};
pub use self::grammar::{
    Grammar, GrammarBuilder, HandlerStep, Language, ProductionHandler, RuleError, Symbol,
    TerminalHandler, TokenMatcher, TokenSet,
};
pub use self::lexer::{Lexer, Terminal, Token, TokenKind, unescape};
pub use self::parser::{ParseOptions, Parser};
pub use self::scanner::{Scanner, anchored};
