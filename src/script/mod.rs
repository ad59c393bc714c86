//! SmartScript: a small tag-based template language.
//!
//! Templates are plain text with embedded tags:
//!
//! - `{$= a b + "0.00" @decfmt $}` evaluates its elements on a stack and
//!   writes what is left, bottom to top.
//! - `{$ FOR i 1 10 2 $} ... {$ END $}` repeats its body while `i` stays
//!   within the end bound.
//!
//! Outside tags, `\\` writes a backslash and `\{$` writes a literal `{$`.
//!
//! ```
//! use smarthttp::script::parse;
//!
//! let document = parse("{$ FOR i 1 3 $}{$= i $}{$END$}").unwrap();
//! assert_eq!(document.to_string(), "{$ FOR i 1 3 $}{$= i $}{$END$}");
//! ```

pub mod engine;
pub mod error;
pub mod format;
pub mod functions;
pub mod lexer;
pub mod nodes;
pub mod parser;
pub mod value;

pub use engine::SmartScriptEngine;
pub use error::{LexerError, ParseError, RuntimeError};
pub use functions::Function;
pub use lexer::{Lexer, LexerMode, Token};
pub use nodes::Document;
pub use parser::parse;
pub use value::Value;
