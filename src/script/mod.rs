//! Script parsing and block structuring.
//!
//! Scripts are flat text, one command per line, with nested `loop N ... end`
//! blocks as the only control structure. Parsing builds the block tree and
//! rejects structural errors; a separate referential pass validates every
//! command call against the registry before anything executes, making script
//! validity all-or-nothing.

/// Block tree node and script definitions.
pub mod ast;
/// Line-oriented parser and validation entry points.
pub mod parser;

pub use ast::{Script, ScriptNode};
pub use parser::{COMMENT_PREFIX, parse, parse_validated};
