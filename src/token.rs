//! # Tokens and the Identifier Registry
//!
//! This module defines the value types flowing out of the match engine:
//!
//! - [`TokenId`]: the dense integer tag classifying a token's kind,
//! - [`TagRegistry`]: the closed name-to-tag table built from a rule
//!   specification,
//! - [`Value`]: the payload carried by a token (matched text by default,
//!   or whatever a conversion action produced),
//! - [`Loc`]: the source position a token was matched at,
//! - [`Token`]: the immutable `{tag, value, loc}` triple itself.
//!
//! Tags are assigned once, at specification build time, and never change for
//! the lifetime of the registry: the set of all rule names across all rule
//! sets is deduplicated, sorted lexicographically, and numbered densely from
//! zero. The order is part of the contract; downstream code may compare or
//! serialize tag values.
use std::collections::{BTreeSet, HashMap};
use std::fmt;

use anyhow::bail;
use smartstring::alias::String;

/// The tag identifying a token's kind.
///
/// Opaque and cheap: ordering, equality, and hashing all follow the dense
/// integer assigned by the [`TagRegistry`] that produced it. Use
/// [`TagRegistry::name`] to render one for humans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TokenId(pub(crate) u32);

impl TokenId {
    /// The dense index backing this tag.
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl From<TokenId> for usize {
    fn from(id: TokenId) -> Self {
        id.as_usize()
    }
}

impl From<TokenId> for u32 {
    fn from(id: TokenId) -> Self {
        id.0
    }
}

/// The closed name-to-tag table for one specification.
///
/// Built by scanning every rule name in every rule set, deduplicating, and
/// assigning [`TokenId`]s in lexicographic name order, starting at 0.
/// Immutable once built. A registry
/// can be shared by several tokenizers (see
/// [`TokenizerBuilder::registry`](crate::TokenizerBuilder::registry)) so that
/// tokens from different specifications carry comparable tags; building a
/// tokenizer against a registry that does not cover all of its rule names
/// fails up front.
#[derive(Debug, Clone, Default)]
pub struct TagRegistry {
    names: Vec<String>,
    index: HashMap<String, TokenId>,
}

impl TagRegistry {
    /// Builds a registry from an arbitrary collection of names.
    ///
    /// Duplicates collapse to one entry. Tags are dense from 0 in
    /// lexicographic name order, regardless of the order given here.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let sorted: BTreeSet<String> = names
            .into_iter()
            .map(|name| name.as_ref().into())
            .collect();
        let names: Vec<String> = sorted.into_iter().collect();
        let index = names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), TokenId(i as u32)))
            .collect();
        TagRegistry { names, index }
    }

    /// The tag assigned to `name`, if any.
    pub fn lookup(&self, name: &str) -> Option<TokenId> {
        self.index.get(name).copied()
    }

    /// The name behind a tag issued by this registry.
    ///
    /// Panics if `id` came from a different, larger registry.
    pub fn name(&self, id: TokenId) -> &str {
        &self.names[id.as_usize()]
    }

    /// All registered names, in tag order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(|name| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// The payload carried by a token.
///
/// A plain match carries [`Value::Str`] with the matched text; conversion
/// actions produce the numeric variants; [`Value::None`] is for synthetic
/// and sentinel tokens that carry nothing. `TryFrom` impls extract the
/// inner payload or fail with a descriptive error:
///
/// ```
/// # use relex::Value;
/// let v = Value::Int(42);
/// let n = i64::try_from(v).unwrap();
/// assert_eq!(n, 42);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Value {
    /// No payload (synthetic or sentinel tokens).
    #[default]
    None,
    /// Matched (or substituted) text.
    Str(String),
    /// Converted integer payload.
    Int(i64),
    /// Converted floating-point payload.
    Float(f64),
}

impl Value {
    /// The text payload, if this is a [`Value::Str`].
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.into())
    }
}

macro_rules! impl_tryfrom_value {
    ($variant:ident, $ty:ty) => {
        impl TryFrom<Value> for $ty {
            type Error = anyhow::Error;

            fn try_from(value: Value) -> Result<Self, Self::Error> {
                match value {
                    Value::$variant(x) => Ok(x),
                    other => bail!(
                        "expected {} value, got {:?}",
                        stringify!($variant),
                        other
                    ),
                }
            }
        }
    };
}

impl_tryfrom_value!(Str, String);
impl_tryfrom_value!(Int, i64);
impl_tryfrom_value!(Float, f64);

/// Where a token was matched.
///
/// `start..end` are byte offsets within the chunk the token came from;
/// `line` is the chunk's line number (if numbering is on) and `source` the
/// name given to the chunk sequence. Matches never cross chunk boundaries,
/// so one `Loc` always describes a span within a single chunk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Loc {
    /// Name of the input the chunk came from, if one was given.
    pub source: Option<String>,
    /// Line number of the chunk, if numbering is on.
    pub line: Option<usize>,
    /// Byte offset of the first matched byte within the chunk.
    pub start: usize,
    /// Byte offset one past the last matched byte.
    pub end: usize,
}

impl fmt::Display for Loc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(source) = &self.source {
            write!(f, "{source}:")?;
        }
        if let Some(line) = self.line {
            write!(f, "{line}:")?;
        }
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// One classified span of input.
///
/// Immutable value object; equality is structural over all three fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// The token's kind.
    pub tag: TokenId,
    /// The token's payload.
    pub value: Value,
    /// Where the token was matched.
    pub loc: Loc,
}

impl Token {
    pub fn new(tag: TokenId, value: Value, loc: Loc) -> Self {
        Token { tag, value, loc }
    }

    /// A token with no location, for sentinels and synthesized items.
    pub fn synthetic(tag: TokenId, value: Value) -> Self {
        Token {
            tag,
            value,
            loc: Loc::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_orders_names() {
        let reg = TagRegistry::from_names(["ZEBRA", "ALPHA", "MID", "ALPHA"]);
        assert_eq!(reg.len(), 3);
        assert_eq!(reg.names().collect::<Vec<_>>(), vec!["ALPHA", "MID", "ZEBRA"]);
        assert_eq!(reg.lookup("ALPHA"), Some(TokenId(0)));
        assert_eq!(reg.lookup("MID"), Some(TokenId(1)));
        assert_eq!(reg.lookup("ZEBRA"), Some(TokenId(2)));
        assert_eq!(reg.name(TokenId(2)), "ZEBRA");
    }

    #[test]
    fn registry_lookup_missing_is_none() {
        let reg = TagRegistry::from_names(["A"]);
        assert_eq!(reg.lookup("B"), None);
        assert!(!reg.is_empty());
    }

    #[test]
    fn tags_are_stable_across_rebuilds() {
        let a = TagRegistry::from_names(["IF", "IDENT", "CONSTANT"]);
        let b = TagRegistry::from_names(["CONSTANT", "IF", "IDENT"]);
        for name in a.names() {
            assert_eq!(a.lookup(name), b.lookup(name));
        }
    }

    #[test]
    fn value_try_from_extracts_payloads() {
        let s = String::try_from(Value::Str("abc".into())).unwrap();
        assert_eq!(s, "abc");
        assert_eq!(i64::try_from(Value::Int(-7)).unwrap(), -7);
        assert_eq!(f64::try_from(Value::Float(0.5)).unwrap(), 0.5);
    }

    #[test]
    fn value_try_from_mismatch_is_descriptive() {
        let err = i64::try_from(Value::Str("abc".into())).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("expected Int"), "got {msg:?}");
    }

    #[test]
    fn loc_display_variants() {
        let full = Loc {
            source: Some("f.x".into()),
            line: Some(3),
            start: 5,
            end: 12,
        };
        assert_eq!(full.to_string(), "f.x:3:5..12");

        let unnumbered = Loc {
            source: None,
            line: None,
            start: 5,
            end: 12,
        };
        assert_eq!(unnumbered.to_string(), "5..12");
    }

    #[test]
    fn token_equality_is_structural() {
        let reg = TagRegistry::from_names(["WORD"]);
        let tag = reg.lookup("WORD").unwrap();
        let loc = Loc {
            source: None,
            line: Some(1),
            start: 0,
            end: 3,
        };
        let a = Token::new(tag, Value::Str("abc".into()), loc.clone());
        let b = Token::new(tag, Value::Str("abc".into()), loc);
        assert_eq!(a, b);
        assert_ne!(a, Token::synthetic(tag, Value::None));
    }
}
