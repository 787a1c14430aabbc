#![doc = include_str!("../README.md")]
#![doc(test(attr(deny(warnings))))]

mod serializer;
mod terminals;
pub mod toolkit;
pub mod turtle;

pub use crate::serializer::{TurtleSerializer, WriterError, WriterTurtleSerializer};
pub use crate::toolkit::{ConfigError, LexerError, ParseError, Violation};
pub use crate::turtle::{TurtleMetadata, TurtleParseError, TurtleParser};
