//! # Rules and Rule Set Compilation
//!
//! A [`Rule`] names a pattern and says what to do when it fires: keep the
//! match as a token, suppress it, convert its value, rename it, or run an
//! arbitrary [`Action::Custom`] function. A rule may also carry a
//! [`Switch`], changing the active rule set whenever it fires.
//!
//! Rule sets compile their patterned rules into one multi-pattern
//! alternation. Branch order is declaration order and ties go to the
//! earlier rule (leftmost-first semantics, the same as trying each pattern
//! in turn at the current position, not longest-match-overall). The
//! compiled alternation is built lazily on first use and cached for the
//! lifetime of the specification.
use std::collections::HashMap;
use std::fmt;

use anyhow::anyhow;
use log::warn;
use once_cell::sync::OnceCell;
use regex_automata::{meta, MatchKind, PatternID};
use smartstring::alias::String;

use crate::error::Error;
use crate::token::{TagRegistry, TokenId, Value};

/// A post-processing function: full control over the emitted tag and value.
///
/// Receives the registry (for name lookups), the fired rule's own tag,
/// and the matched text as a [`Value::Str`]. Errors propagate unchanged to
/// the caller of the token-producing call.
pub type ActionFn = Box<dyn Fn(&TagRegistry, TokenId, Value) -> anyhow::Result<Outcome>>;

/// What a post-processing action decided.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Produce a token with this tag and value.
    Emit(TokenId, Value),
    /// Consume the match without producing a token.
    Suppress,
}

/// Value conversion applied by [`Action::Convert`].
#[derive(Debug, Clone, Copy)]
pub enum Convert {
    /// Parse the matched text as `i64`.
    Int,
    /// Parse the matched text as `f64`.
    Float,
    /// Arbitrary conversion function.
    With(fn(&str) -> anyhow::Result<Value>),
}

impl Convert {
    fn apply(&self, raw: &str) -> anyhow::Result<Value> {
        match self {
            Convert::Int => Ok(Value::Int(raw.parse::<i64>()?)),
            Convert::Float => Ok(Value::Float(raw.parse::<f64>()?)),
            Convert::With(f) => f(raw),
        }
    }
}

/// The closed set of per-rule post-processing behaviors.
pub enum Action {
    /// Emit the rule's own tag with the matched text. The default.
    Keep,
    /// Consume the match, emit nothing.
    Ignore,
    /// Emit the rule's own tag with a converted value.
    Convert(Convert),
    /// Suppress unless the matched text contains `needle`; on a hit, emit
    /// `needle` itself as the value, under `emit_as` (or the rule's own tag).
    KeepIf {
        needle: String,
        emit_as: Option<String>,
    },
    /// Emit under another registered name's tag, value unchanged.
    Rename(String),
    /// Run an [`ActionFn`].
    Custom(ActionFn),
}

impl Action {
    /// Wraps a closure as an [`Action::Custom`].
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&TagRegistry, TokenId, Value) -> anyhow::Result<Outcome> + 'static,
    {
        Action::Custom(Box::new(f))
    }

    pub(crate) fn apply(
        &self,
        registry: &TagRegistry,
        tag: TokenId,
        raw: &str,
    ) -> anyhow::Result<Outcome> {
        match self {
            Action::Keep => Ok(Outcome::Emit(tag, Value::from(raw))),
            Action::Ignore => Ok(Outcome::Suppress),
            Action::Convert(conv) => Ok(Outcome::Emit(tag, conv.apply(raw)?)),
            Action::KeepIf { needle, emit_as } => {
                if raw.contains(needle.as_str()) {
                    let tag = match emit_as {
                        Some(name) => resolve(registry, name)?,
                        None => tag,
                    };
                    Ok(Outcome::Emit(tag, Value::Str(needle.clone())))
                } else {
                    Ok(Outcome::Suppress)
                }
            }
            Action::Rename(name) => Ok(Outcome::Emit(resolve(registry, name)?, Value::from(raw))),
            Action::Custom(f) => f(registry, tag, Value::from(raw)),
        }
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Keep => f.write_str("Keep"),
            Action::Ignore => f.write_str("Ignore"),
            Action::Convert(conv) => f.debug_tuple("Convert").field(conv).finish(),
            Action::KeepIf { needle, emit_as } => f
                .debug_struct("KeepIf")
                .field("needle", needle)
                .field("emit_as", emit_as)
                .finish(),
            Action::Rename(name) => f.debug_tuple("Rename").field(name).finish(),
            Action::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

fn resolve(registry: &TagRegistry, name: &str) -> anyhow::Result<TokenId> {
    registry
        .lookup(name)
        .ok_or_else(|| anyhow!("unknown token name {name:?}"))
}

/// Rule set change requested by a fired rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Switch {
    /// Switch to the named rule set.
    To(String),
    /// Switch to the next rule set in declaration order, wrapping around.
    Next,
}

/// Switch target with the rule set index already resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SwitchIdx {
    Set(usize),
    Next,
}

/// One named pattern plus its post-processing behavior.
///
/// Rules with no pattern match nothing but still reserve a name and tag; use
/// them to register sentinel kinds referenced by actions (see
/// [`Rule::keep_if_as`]) or to build synthetic tokens.
#[derive(Debug)]
pub struct Rule {
    pub(crate) name: String,
    pub(crate) pattern: Option<String>,
    pub(crate) action: Action,
    pub(crate) switch: Option<Switch>,
}

impl Rule {
    /// A plain rule: match `pattern`, emit the matched text under `name`.
    pub fn new(name: impl Into<String>, pattern: impl Into<String>) -> Self {
        Rule {
            name: name.into(),
            pattern: Some(pattern.into()),
            action: Action::Keep,
            switch: None,
        }
    }

    /// A pattern-less rule: reserves `name` in the registry, never matches.
    pub fn tag(name: impl Into<String>) -> Self {
        Rule {
            name: name.into(),
            pattern: None,
            action: Action::Keep,
            switch: None,
        }
    }

    /// Match and consume `pattern`, emitting nothing.
    pub fn ignore(name: impl Into<String>, pattern: impl Into<String>) -> Self {
        Rule::new(name, pattern).with_action(Action::Ignore)
    }

    /// Match `pattern`, emit the value converted by `conv`.
    pub fn convert(name: impl Into<String>, pattern: impl Into<String>, conv: Convert) -> Self {
        Rule::new(name, pattern).with_action(Action::Convert(conv))
    }

    /// Match `pattern`, emit its text parsed as an `i64`.
    pub fn int(name: impl Into<String>, pattern: impl Into<String>) -> Self {
        Rule::convert(name, pattern, Convert::Int)
    }

    /// A keyword rule: the name is `word` uppercased, the pattern matches
    /// `word` up to a word boundary, so `keyword("if")` matches `if` but
    /// not the prefix of `ifx`.
    ///
    /// The word is interpolated into the pattern as-is, so regex
    /// metacharacters keep their meaning; a word that is not itself a
    /// valid pattern fails validation at build time.
    pub fn keyword(word: impl AsRef<str>) -> Self {
        let word = word.as_ref();
        Rule::new(word.to_uppercase(), format!(r"(?:{word})\b"))
    }

    /// Suppress unless the match contains `needle`; emit `needle` as the
    /// value under the rule's own tag. A whitespace rule declared as
    /// `keep_if("NEWLINE", r"\s+", "\n")` collapses any run of whitespace
    /// containing newlines into a single `NEWLINE` token.
    pub fn keep_if(
        name: impl Into<String>,
        pattern: impl Into<String>,
        needle: impl Into<String>,
    ) -> Self {
        Rule::new(name, pattern).with_action(Action::KeepIf {
            needle: needle.into(),
            emit_as: None,
        })
    }

    /// Like [`Rule::keep_if`], but emits under `emit_as` instead of the
    /// rule's own tag. `emit_as` must be registered by some rule (a
    /// [`Rule::tag`] suffices).
    pub fn keep_if_as(
        name: impl Into<String>,
        pattern: impl Into<String>,
        needle: impl Into<String>,
        emit_as: impl Into<String>,
    ) -> Self {
        Rule::new(name, pattern).with_action(Action::KeepIf {
            needle: needle.into(),
            emit_as: Some(emit_as.into()),
        })
    }

    /// Match `pattern`, emit it, and switch to the named rule set.
    pub fn switch_to(
        name: impl Into<String>,
        pattern: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Rule::new(name, pattern).with_switch(Switch::To(target.into()))
    }

    /// Match `pattern`, emit it, and switch to the next rule set in
    /// declaration order, wrapping around.
    pub fn cycle(name: impl Into<String>, pattern: impl Into<String>) -> Self {
        Rule::new(name, pattern).with_switch(Switch::Next)
    }

    /// Replaces the rule's action.
    pub fn with_action(mut self, action: Action) -> Self {
        self.action = action;
        self
    }

    /// Sets the rule's switch target.
    pub fn with_switch(mut self, switch: Switch) -> Self {
        self.switch = Some(switch);
        self
    }

    /// The rule's name (and registry entry).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The rule's pattern source, if it has one.
    pub fn pattern(&self) -> Option<&str> {
        self.pattern.as_deref()
    }
}

/// One compiled rule set: declaration-ordered rules, resolved tags and
/// switch targets, and the lazily built alternation.
#[derive(Debug)]
pub(crate) struct RuleSet {
    key: String,
    rules: Vec<Rule>,
    tags: Vec<TokenId>,
    switches: Vec<Option<SwitchIdx>>,
    /// Rule index for each alternation branch, in `PatternID` order.
    patterned: Vec<usize>,
    patterns: Vec<String>,
    regex: OnceCell<meta::Regex>,
}

impl RuleSet {
    pub(crate) fn build(
        key: &str,
        rules: Vec<Rule>,
        registry: &TagRegistry,
        index: &HashMap<String, usize>,
    ) -> Result<Self, Error> {
        if rules.is_empty() {
            return Err(Error::EmptyRuleSet { set: key.into() });
        }
        let mut tags = Vec::with_capacity(rules.len());
        let mut switches = Vec::with_capacity(rules.len());
        let mut patterned = Vec::new();
        let mut patterns: Vec<String> = Vec::new();
        for (i, rule) in rules.iter().enumerate() {
            let tag = registry
                .lookup(rule.name())
                .ok_or_else(|| Error::UnknownTokenName {
                    set: key.into(),
                    rule: rule.name().into(),
                    name: rule.name().into(),
                })?;
            tags.push(tag);
            if let Some(pattern) = rule.pattern() {
                // Validate each pattern on its own so a bad one is reported
                // against its rule, not the whole alternation.
                meta::Regex::new(pattern).map_err(|source| Error::BadPattern {
                    set: key.into(),
                    rule: rule.name().into(),
                    pattern: pattern.into(),
                    source,
                })?;
                patterned.push(i);
                patterns.push(pattern.into());
            }
            match &rule.action {
                Action::Rename(name) => check_name(registry, key, rule, name)?,
                Action::KeepIf {
                    emit_as: Some(name),
                    ..
                } => check_name(registry, key, rule, name)?,
                _ => {}
            }
            switches.push(match &rule.switch {
                None => None,
                Some(Switch::Next) => Some(SwitchIdx::Next),
                Some(Switch::To(target)) => {
                    let Some(&set) = index.get(target.as_str()) else {
                        return Err(Error::UnknownRuleSet {
                            set: key.into(),
                            rule: rule.name().into(),
                            target: target.clone(),
                        });
                    };
                    Some(SwitchIdx::Set(set))
                }
            });
        }
        if patterns.is_empty() {
            warn!("rule set {key:?} has only pattern-less rules and can never match");
        }
        Ok(RuleSet {
            key: key.into(),
            rules,
            tags,
            switches,
            patterned,
            patterns,
            regex: OnceCell::new(),
        })
    }

    /// The compiled alternation, built on first use.
    pub(crate) fn compile(&self) -> Result<&meta::Regex, Error> {
        self.regex.get_or_try_init(|| {
            meta::Regex::builder()
                .configure(meta::Regex::config().match_kind(MatchKind::LeftmostFirst))
                .build_many(&self.patterns)
                .map_err(|source| Error::SetCompile {
                    set: self.key.clone(),
                    source,
                })
        })
    }

    pub(crate) fn rule_for(&self, pid: PatternID) -> (&Rule, TokenId, Option<SwitchIdx>) {
        let i = self.patterned[pid.as_usize()];
        (&self.rules[i], self.tags[i], self.switches[i])
    }

    pub(crate) fn key(&self) -> &str {
        &self.key
    }
}

fn check_name(registry: &TagRegistry, set: &str, rule: &Rule, name: &str) -> Result<(), Error> {
    if registry.lookup(name).is_none() {
        return Err(Error::UnknownTokenName {
            set: set.into(),
            rule: rule.name().into(),
            name: name.into(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use regex_automata::{Anchored, Input};

    fn init_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn reg(names: &[&str]) -> TagRegistry {
        TagRegistry::from_names(names.iter().copied())
    }

    #[test]
    fn keyword_rule_shape() {
        let rule = Rule::keyword("if");
        assert_eq!(rule.name(), "IF");
        assert_eq!(rule.pattern(), Some(r"(?:if)\b"));
    }

    #[test]
    fn keep_action_emits_matched_text() {
        let registry = reg(&["FOO"]);
        let tag = registry.lookup("FOO").unwrap();
        let out = Action::Keep.apply(&registry, tag, "abc").unwrap();
        assert_eq!(out, Outcome::Emit(tag, Value::Str("abc".into())));
    }

    #[test]
    fn ignore_action_suppresses() {
        let registry = reg(&["FOO"]);
        let tag = registry.lookup("FOO").unwrap();
        let out = Action::Ignore.apply(&registry, tag, "abc").unwrap();
        assert_eq!(out, Outcome::Suppress);
    }

    #[test]
    fn rename_action_swaps_tag_only() {
        let registry = reg(&["FOO", "BAR"]);
        let foo = registry.lookup("FOO").unwrap();
        let bar = registry.lookup("BAR").unwrap();
        let out = Action::Rename("BAR".into())
            .apply(&registry, foo, "abc")
            .unwrap();
        assert_eq!(out, Outcome::Emit(bar, Value::Str("abc".into())));
    }

    #[test]
    fn rename_to_unknown_name_fails() {
        let registry = reg(&["FOO"]);
        let tag = registry.lookup("FOO").unwrap();
        let err = Action::Rename("NOPE".into())
            .apply(&registry, tag, "abc")
            .unwrap_err();
        assert!(err.to_string().contains("NOPE"));
    }

    #[test]
    fn keep_if_emits_needle_or_nothing() {
        let registry = reg(&["WS", "NL"]);
        let ws = registry.lookup("WS").unwrap();
        let nl = registry.lookup("NL").unwrap();
        let action = Action::KeepIf {
            needle: "\n".into(),
            emit_as: Some("NL".into()),
        };
        let hit = action.apply(&registry, ws, "  \n\n ").unwrap();
        assert_eq!(hit, Outcome::Emit(nl, Value::Str("\n".into())));
        let miss = action.apply(&registry, ws, "   ").unwrap();
        assert_eq!(miss, Outcome::Suppress);
    }

    #[test]
    fn convert_int_and_custom_fn() {
        let registry = reg(&["N"]);
        let tag = registry.lookup("N").unwrap();
        let out = Action::Convert(Convert::Int)
            .apply(&registry, tag, "-42")
            .unwrap();
        assert_eq!(out, Outcome::Emit(tag, Value::Int(-42)));

        fn halves(raw: &str) -> anyhow::Result<Value> {
            Ok(Value::Float(raw.parse::<f64>()? / 2.0))
        }
        let out = Action::Convert(Convert::With(halves))
            .apply(&registry, tag, "3")
            .unwrap();
        assert_eq!(out, Outcome::Emit(tag, Value::Float(1.5)));
    }

    #[test]
    fn custom_action_controls_everything() {
        let registry = reg(&["WORD", "SHOUT"]);
        let word = registry.lookup("WORD").unwrap();
        let action = Action::custom(|registry, tag, value| {
            let Value::Str(s) = value else {
                bail!("expected text");
            };
            if s.chars().all(|c| c.is_uppercase()) {
                let shout = registry.lookup("SHOUT").unwrap();
                Ok(Outcome::Emit(shout, Value::Str(s)))
            } else {
                Ok(Outcome::Emit(tag, Value::Str(s)))
            }
        });
        let out = action.apply(&registry, word, "HEY").unwrap();
        assert_eq!(
            out,
            Outcome::Emit(registry.lookup("SHOUT").unwrap(), Value::Str("HEY".into()))
        );
        let out = action.apply(&registry, word, "hey").unwrap();
        assert_eq!(out, Outcome::Emit(word, Value::Str("hey".into())));
    }

    #[test]
    fn earlier_rule_wins_ties() {
        init_logger();
        let registry = reg(&["A", "AB", "B"]);
        let rules = vec![
            Rule::new("A", "a"),
            Rule::new("AB", "ab"),
            Rule::new("B", "b"),
        ];
        let set = RuleSet::build("default", rules, &registry, &HashMap::new()).unwrap();
        let re = set.compile().unwrap();
        let m = re
            .find(Input::new("ab").anchored(Anchored::Yes))
            .expect("must match");
        let (rule, _, _) = set.rule_for(m.pattern());
        assert_eq!(rule.name(), "A");
        assert_eq!(m.end(), 1);
    }

    #[test]
    fn patternless_rules_reserve_tags_only() {
        init_logger();
        let registry = reg(&["NEWLINE", "WORD"]);
        let rules = vec![Rule::tag("NEWLINE"), Rule::new("WORD", r"\w+")];
        let set = RuleSet::build("default", rules, &registry, &HashMap::new()).unwrap();
        let re = set.compile().unwrap();
        let m = re
            .find(Input::new("xyz").anchored(Anchored::Yes))
            .expect("must match");
        let (rule, tag, _) = set.rule_for(m.pattern());
        assert_eq!(rule.name(), "WORD");
        assert_eq!(registry.name(tag), "WORD");
    }

    #[test]
    fn empty_ruleset_rejected() {
        let registry = reg(&[]);
        let err = RuleSet::build("default", vec![], &registry, &HashMap::new()).unwrap_err();
        assert!(matches!(err, Error::EmptyRuleSet { .. }));
    }

    #[test]
    fn bad_pattern_names_its_rule() {
        let registry = reg(&["OK", "BROKEN"]);
        let rules = vec![Rule::new("OK", "a"), Rule::new("BROKEN", "(")];
        let err = RuleSet::build("default", rules, &registry, &HashMap::new()).unwrap_err();
        let Error::BadPattern { rule, .. } = &err else {
            panic!("expected BadPattern, got {err:?}");
        };
        assert_eq!(rule, "BROKEN");
    }

    #[test]
    fn unknown_switch_target_rejected() {
        let registry = reg(&["SLASH"]);
        let mut index = HashMap::new();
        index.insert(String::from("default"), 0);
        let rules = vec![Rule::switch_to("SLASH", "/", "NOSUCH")];
        let err = RuleSet::build("default", rules, &registry, &index).unwrap_err();
        assert!(matches!(err, Error::UnknownRuleSet { target, .. } if target == "NOSUCH"));
    }

    #[test]
    fn unknown_action_name_rejected() {
        let registry = reg(&["WORD"]);
        let mut index = HashMap::new();
        index.insert(String::from("default"), 0);
        let rules = vec![Rule::new("WORD", r"\w+").with_action(Action::Rename("NOPE".into()))];
        let err = RuleSet::build("default", rules, &registry, &index).unwrap_err();
        assert!(matches!(err, Error::UnknownTokenName { name, .. } if name == "NOPE"));
    }
}
