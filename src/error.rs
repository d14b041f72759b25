//! # Error Type
//!
//! This module defines [`Error`], the single error surface of the crate.
//! It covers three distinct failure classes:
//!
//! - **Configuration errors**: bad rule specifications (duplicate names,
//!   missing default rule set, unresolvable switch targets, patterns that do
//!   not compile). All of these are detected while building a
//!   [`Tokenizer`](crate::Tokenizer), before any input is scanned.
//! - **Scan errors**: input that no rule in the active rule set matches
//!   ([`Error::UnmatchedInput`]), or a rule that matched zero characters
//!   ([`Error::EmptyMatch`]). Both carry the offending [`Loc`] and are fatal
//!   to the scan that produced them; the engine never skips or retries.
//! - **Action failures**: errors raised by a rule's post-processing action
//!   propagate unchanged through [`Error::Action`] (transparent), so callers
//!   see the action's own message and source chain.
//!
//! Backtracking misuse on the stream buffer (ungetting foreign items and the
//! like) is deliberately *not* an error; see
//! [`TokenStream::unget`](crate::TokenStream::unget).
use crate::token::Loc;
use smartstring::alias::String;
use thiserror::Error;

/// All failures produced while building a specification or scanning input.
///
/// Configuration variants are returned by
/// [`TokenizerBuilder::build`](crate::TokenizerBuilder::build); scan variants
/// by the token iterator. [`Error::Action`] wraps nothing: it forwards the
/// underlying [`anyhow::Error`] verbatim via `#[error(transparent)]`.
#[derive(Debug, Error)]
pub enum Error {
    /// The same rule name was declared twice within one rule set.
    #[error("duplicate rule name {name:?} in rule set {set:?}")]
    DuplicateRuleName { set: String, name: String },

    /// The same rule set key was declared twice.
    #[error("duplicate rule set {set:?}")]
    DuplicateRuleSet { set: String },

    /// No rule set was declared under the distinguished `"default"` key.
    #[error("no \"default\" rule set in specification")]
    MissingDefaultRuleSet,

    /// A rule set was declared with no rules at all.
    #[error("rule set {set:?} has no rules")]
    EmptyRuleSet { set: String },

    /// A rule's pattern failed to compile on its own.
    #[error("rule {rule:?} in rule set {set:?}: bad pattern {pattern:?}")]
    BadPattern {
        set: String,
        rule: String,
        pattern: String,
        #[source]
        source: regex_automata::meta::BuildError,
    },

    /// A rule set's joined alternation failed to compile even though every
    /// pattern compiled individually (e.g. a size limit was hit).
    #[error("rule set {set:?}: alternation failed to compile")]
    SetCompile {
        set: String,
        #[source]
        source: regex_automata::meta::BuildError,
    },

    /// A rule's switch target names no declared rule set.
    #[error("rule {rule:?} in rule set {set:?}: switch target {target:?} names no rule set")]
    UnknownRuleSet {
        set: String,
        rule: String,
        target: String,
    },

    /// A rule (or its action) references a token name absent from the
    /// registry. Only possible with an injected registry that does not cover
    /// the specification, or a rename/keep-if target that no rule declares.
    #[error("rule {rule:?} in rule set {set:?}: unknown token name {name:?}")]
    UnknownTokenName {
        set: String,
        rule: String,
        name: String,
    },

    /// No rule in the active rule set matched at the current position while
    /// input remained. Carries the position and the full offending chunk.
    #[error("no rule matched at {loc}: {text:?}")]
    UnmatchedInput { loc: Loc, text: String },

    /// A rule matched zero characters, which can never make progress.
    #[error("rule {rule:?} matched empty input at {loc}")]
    EmptyMatch { loc: Loc, rule: String },

    /// A post-processing action or converter failed. Forwarded unchanged.
    #[error(transparent)]
    Action(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn display_carries_location() {
        let err = Error::UnmatchedInput {
            loc: Loc {
                source: Some("input.x".into()),
                line: Some(3),
                start: 4,
                end: 9,
            },
            text: "abc \t!".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("input.x:3:4..9"), "got {msg:?}");
        assert!(msg.contains("abc \\t!"));
    }

    #[test]
    fn action_errors_pass_through_unchanged() {
        let err: Error = anyhow!("digit overflow in CONSTANT").into();
        assert_eq!(err.to_string(), "digit overflow in CONSTANT");
        assert!(matches!(err, Error::Action(_)));
    }

    // Compile-time bounds check: scan errors must be shippable across
    // anyhow/thread boundaries like every other error in the pipeline.
    fn _assert_send_sync_static<T: Send + Sync + 'static>() {}
    #[test]
    fn error_is_send_sync_static() {
        _assert_send_sync_static::<Error>();
    }
}
