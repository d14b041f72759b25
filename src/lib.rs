//! # relex
//!
//! A configurable lexical-analysis toolkit: regex rule sets compiled into a
//! modal match engine, plus an independent backtracking token stream buffer.
//!
//! ## Overview
//!
//! - [`Tokenizer`]: a compiled specification of one or more named rule
//!   sets. Scans chunked input strictly left to right into [`Token`]s,
//!   switching rule sets as rules direct.
//! - [`Rule`]: one named pattern plus its post-processing [`Action`]
//!   (keep, ignore, convert, keep-if-contains, rename, custom) and
//!   optional [`Switch`] of the active rule set.
//! - [`TagRegistry`]: the closed name-to-tag table built at specification
//!   compile time; every token carries a dense [`TokenId`] issued by it.
//! - [`TokenStream`]: peek/get/unget buffering with nested speculative
//!   [`mark`](TokenStream::mark) scopes, over any iterator, with
//!   configurable end-of-input sentinels.
//! - [`line_joiner`]: a preprocessing filter that joins backslash-continued
//!   input lines, optionally preserving the physical line count.
//!
//! ## Example
//!
//! ```rust
//! use relex::{Rule, TokenStream, Tokenizer, Value};
//!
//! let tz = Tokenizer::new(vec![
//!     Rule::ignore("WHITESPACE", r"\s+"),
//!     Rule::new("IDENTIFIER", r"[A-Za-z_][A-Za-z_0-9]*"),
//!     Rule::int("CONSTANT", r"-?[0-9]+"),
//! ])?;
//!
//! let tokens = tz.tokenize("abc123 def 42")?;
//! assert_eq!(tokens.len(), 3);
//! assert_eq!(tokens[2].value, Value::Int(42));
//!
//! // Buffer the tokens for speculative, backtrackable consumption.
//! let mut ts = TokenStream::from(tokens.into_iter());
//! let first = ts.get().unwrap();
//! ts.unget(first.clone());
//! assert_eq!(ts.get(), Some(first));
//! # Ok::<(), relex::Error>(())
//! ```
//!
//! Scanning is strict: input no rule matches is an [`Error`], never a
//! silent skip, and every failure carries the [`Loc`] it arose at.

mod error;
mod rules;
mod stream;
mod token;
mod tokenizer;

pub use crate::error::Error;
pub use crate::rules::{Action, ActionFn, Convert, Outcome, Rule, Switch};
pub use crate::stream::{Mark, TokenStream};
pub use crate::token::{Loc, TagRegistry, Token, TokenId, Value};
pub use crate::tokenizer::{
    line_joiner, LineJoiner, Tokenizer, TokenizerBuilder, Tokens, DEFAULT_KEY,
};
