//! Concrete syntax: the pest grammar and the tree builder over it.

pub mod parser;

pub use parser::{parse, parse_str};
