//! A lazy, non-validating JSON tokenizer plus a small output builder.
//!
//! The tokenizer intentionally does not enforce JSON grammar between tokens —
//! callers may see a `Comma` or `Colon` token in a position a strict parser
//! would reject, and are expected to ignore them. This mirrors the lenient
//! behavior the transcoder (`crate::transcode`) relies on for its skip
//! algorithm (§4.2 / §4.3 of the design).

mod builder;
mod tokenizer;

pub use builder::JsonBuilder;
pub use tokenizer::{unescape, Token, TokenKind, Tokenizer};
