//! # Match Engine and Modal Controller
//!
//! A [`Tokenizer`] is a compiled specification: one or more named rule
//! sets sharing a single [`TagRegistry`]. Scanning starts in the
//! [`DEFAULT_KEY`] set and proceeds strictly left to right: at each
//! position the active set's alternation is tried anchored at that
//! position, the winning rule's match is consumed, its action decides
//! whether a token comes out, and its switch (if any) picks the rule set
//! for the *next* position. A position no rule matches is a hard error,
//! never a skip.
//!
//! Input arrives as a sequence of chunks (typically lines). Matches never
//! cross a chunk boundary, and each chunk gets the next line number unless
//! numbering is turned off; see [`Tokens::with_start_line`].
//!
//! ```
//! use relex::{Rule, Tokenizer, Value};
//!
//! let tz = Tokenizer::new(vec![
//!     Rule::ignore("WS", r"[ \t]+"),
//!     Rule::int("NUMBER", r"[0-9]+"),
//!     Rule::new("WORD", r"[a-z]+"),
//! ])?;
//! let tokens = tz.tokenize("fuel 88")?;
//! assert_eq!(tokens.len(), 2);
//! assert_eq!(tokens[1].value, Value::Int(88));
//! # Ok::<(), relex::Error>(())
//! ```
use std::collections::{HashMap, HashSet};
use std::mem;

use log::{debug, trace};
use regex_automata::{Anchored, Input};
use smartstring::alias::String;

use crate::error::Error;
use crate::rules::{Outcome, Rule, RuleSet, SwitchIdx};
use crate::token::{Loc, TagRegistry, Token};

/// Key of the rule set every scan starts in. A specification without a
/// rule set under this key does not build.
pub const DEFAULT_KEY: &str = "default";

/// A compiled lexical specification.
///
/// Immutable once built; one `Tokenizer` can run any number of scans,
/// concurrently or in sequence, each with its own [`Tokens`] state.
#[derive(Debug)]
pub struct Tokenizer {
    registry: TagRegistry,
    sets: Vec<RuleSet>,
    default_set: usize,
}

impl Tokenizer {
    /// Compiles a single-set specification under [`DEFAULT_KEY`].
    pub fn new(rules: Vec<Rule>) -> Result<Self, Error> {
        Tokenizer::builder().ruleset(DEFAULT_KEY, rules).build()
    }

    /// Starts a multi-set specification. See [`TokenizerBuilder`].
    pub fn builder() -> TokenizerBuilder {
        TokenizerBuilder::default()
    }

    /// The name-to-tag table this specification compiled against.
    pub fn registry(&self) -> &TagRegistry {
        &self.registry
    }

    /// Scans a chunk sequence. Chunks are typically lines; a match never
    /// crosses from one chunk into the next. Line numbering starts at 1 by
    /// default and the source is unnamed; both are adjustable on the
    /// returned iterator before scanning starts.
    pub fn tokens<I>(&self, chunks: I) -> Tokens<'_, I::IntoIter>
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        Tokens {
            tz: self,
            chunks: chunks.into_iter(),
            active: self.default_set,
            chunk: String::new(),
            pos: 0,
            source: None,
            cur_line: None,
            next_line: Some(1),
            done: false,
        }
    }

    /// Scans one complete chunk and collects every token it yields.
    pub fn tokenize(&self, text: impl Into<String>) -> Result<Vec<Token>, Error> {
        self.tokens([text.into()]).try_collect()
    }
}

/// Builder for multi-set specifications.
///
/// Rule sets are declared in order; [`Switch::Next`](crate::Switch::Next)
/// cycles through them in that order. Exactly one set must be keyed
/// [`DEFAULT_KEY`]. By default the registry is scanned out of the declared
/// rule names; inject a prebuilt one with [`TokenizerBuilder::registry`] to
/// make tags comparable across several tokenizers.
#[derive(Debug, Default)]
pub struct TokenizerBuilder {
    sets: Vec<(String, Vec<Rule>)>,
    registry: Option<TagRegistry>,
}

impl TokenizerBuilder {
    /// Declares a rule set under `key`.
    pub fn ruleset(mut self, key: impl Into<String>, rules: Vec<Rule>) -> Self {
        self.sets.push((key.into(), rules));
        self
    }

    /// Uses `registry` instead of scanning one from the declared names.
    /// Building fails with [`Error::UnknownTokenName`] if the injected
    /// registry does not cover every rule name in the specification.
    pub fn registry(mut self, registry: TagRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// The registry this specification would scan from its rule names,
    /// without compiling anything. Useful as input to
    /// [`TagRegistry::from_names`] when merging the names of several
    /// specifications into one shared registry.
    pub fn build_registry(&self) -> Result<TagRegistry, Error> {
        scan_names(&self.sets)
    }

    /// Validates the specification and compiles it into a [`Tokenizer`].
    ///
    /// A rule set with no rules at all is rejected
    /// ([`Error::EmptyRuleSet`]); a set whose rules are all pattern-less
    /// builds with a warning and can never match anything.
    pub fn build(self) -> Result<Tokenizer, Error> {
        let mut index: HashMap<String, usize> = HashMap::new();
        for (i, (key, _)) in self.sets.iter().enumerate() {
            if index.insert(key.clone(), i).is_some() {
                return Err(Error::DuplicateRuleSet { set: key.clone() });
            }
        }
        if !index.contains_key(DEFAULT_KEY) {
            return Err(Error::MissingDefaultRuleSet);
        }
        let default_set = index[DEFAULT_KEY];
        // Name scanning doubles as the per-set duplicate check, so it runs
        // even when the registry is injected.
        let scanned = scan_names(&self.sets)?;
        let registry = self.registry.unwrap_or(scanned);
        let mut sets = Vec::with_capacity(self.sets.len());
        for (key, rules) in self.sets {
            sets.push(RuleSet::build(&key, rules, &registry, &index)?);
        }
        debug!(
            "compiled specification: {} rule sets, {} token names",
            sets.len(),
            registry.len()
        );
        Ok(Tokenizer {
            registry,
            sets,
            default_set,
        })
    }
}

fn scan_names(sets: &[(String, Vec<Rule>)]) -> Result<TagRegistry, Error> {
    let mut names: Vec<&str> = Vec::new();
    for (key, rules) in sets {
        let mut seen: HashSet<&str> = HashSet::new();
        for rule in rules {
            if !seen.insert(rule.name()) {
                return Err(Error::DuplicateRuleName {
                    set: key.clone(),
                    name: rule.name().into(),
                });
            }
            names.push(rule.name());
        }
    }
    Ok(TagRegistry::from_names(names))
}

/// One scan in progress: the active rule set, the current chunk and
/// position within it, and the line counter.
///
/// Produced by [`Tokenizer::tokens`]. Pull tokens with [`Tokens::try_next`]
/// or through the [`Iterator`] impl (which yields `Result<Token, Error>`).
/// After the first error or the end of input the iterator is fused: every
/// further pull reports end of input.
pub struct Tokens<'t, I> {
    tz: &'t Tokenizer,
    chunks: I,
    active: usize,
    chunk: String,
    pos: usize,
    source: Option<String>,
    cur_line: Option<usize>,
    next_line: Option<usize>,
    done: bool,
}

impl<'t, I> Tokens<'t, I>
where
    I: Iterator,
    I::Item: Into<String>,
{
    /// Names the input; the name lands in every [`Loc`] this scan produces.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Sets the line number of the first chunk, or disables numbering
    /// entirely with `None`. The default is `1`.
    pub fn with_start_line(mut self, line: impl Into<Option<usize>>) -> Self {
        self.next_line = line.into();
        self
    }

    /// The next token, `Ok(None)` at end of input, or the first error.
    pub fn try_next(&mut self) -> Result<Option<Token>, Error> {
        if self.done {
            return Ok(None);
        }
        let next = self.step();
        if !matches!(next, Ok(Some(_))) {
            self.done = true;
        }
        next
    }

    /// Runs the scan to completion and collects all tokens.
    pub fn try_collect(mut self) -> Result<Vec<Token>, Error> {
        let mut tokens = Vec::new();
        while let Some(token) = self.try_next()? {
            tokens.push(token);
        }
        Ok(tokens)
    }

    fn step(&mut self) -> Result<Option<Token>, Error> {
        let tz = self.tz;
        loop {
            if self.pos >= self.chunk.len() {
                let Some(chunk) = self.chunks.next() else {
                    return Ok(None);
                };
                self.chunk = chunk.into();
                self.pos = 0;
                self.cur_line = self.next_line;
                if let Some(line) = self.next_line {
                    self.next_line = Some(line + 1);
                }
                // An empty chunk consumes its line number and nothing else.
                continue;
            }
            let set = &tz.sets[self.active];
            let re = set.compile()?;
            let input = Input::new(self.chunk.as_str())
                .range(self.pos..)
                .anchored(Anchored::Yes);
            let Some(m) = re.find(input) else {
                return Err(Error::UnmatchedInput {
                    loc: self.loc(self.pos, self.chunk.len()),
                    text: self.chunk.clone(),
                });
            };
            let (rule, tag, switch) = set.rule_for(m.pattern());
            if m.is_empty() {
                return Err(Error::EmptyMatch {
                    loc: self.loc(m.start(), m.end()),
                    rule: rule.name().into(),
                });
            }
            let raw = &self.chunk[m.start()..m.end()];
            let loc = self.loc(m.start(), m.end());
            trace!(
                "matched {} {raw:?} at {loc} in set {:?}",
                rule.name(),
                set.key()
            );
            self.pos = m.end();
            let outcome = rule.action.apply(&tz.registry, tag, raw)?;
            // The switch applies even when the action suppressed the match.
            if let Some(switch) = switch {
                let next = match switch {
                    SwitchIdx::Set(i) => i,
                    SwitchIdx::Next => (self.active + 1) % tz.sets.len(),
                };
                if next != self.active {
                    trace!("rule set {:?} -> {:?}", set.key(), tz.sets[next].key());
                }
                self.active = next;
            }
            match outcome {
                Outcome::Emit(tag, value) => return Ok(Some(Token::new(tag, value, loc))),
                Outcome::Suppress => continue,
            }
        }
    }

    fn loc(&self, start: usize, end: usize) -> Loc {
        Loc {
            source: self.source.clone(),
            line: self.cur_line,
            start,
            end,
        }
    }
}

impl<'t, I> Iterator for Tokens<'t, I>
where
    I: Iterator,
    I::Item: Into<String>,
{
    type Item = Result<Token, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        self.try_next().transpose()
    }
}

/// Joins backslash-continued lines ahead of a scan.
///
/// A line whose trailing newline is preceded by an odd number of
/// backslashes continues on the next line; the backslash and newline are
/// dropped and the pieces concatenate into one chunk. With
/// `preserve_line_count` each absorbed continuation is re-emitted as a bare
/// `"\n"` chunk ahead of the joined line, so the lines *after* a join keep
/// their physical numbers; the joined line itself reports the number of its
/// final piece.
///
/// ```
/// use relex::line_joiner;
///
/// let joined: Vec<_> = line_joiner(["fuel \\\n", "88\n"], true).collect();
/// assert_eq!(joined, vec!["\n", "fuel 88\n"]);
/// ```
pub fn line_joiner<I>(lines: I, preserve_line_count: bool) -> LineJoiner<I::IntoIter>
where
    I: IntoIterator,
    I::Item: Into<String>,
{
    LineJoiner {
        inner: lines.into_iter(),
        prev: String::new(),
        makeup: 0,
        held: None,
        preserve: preserve_line_count,
        done: false,
    }
}

/// Iterator behind [`line_joiner`].
pub struct LineJoiner<I> {
    inner: I,
    prev: String,
    makeup: usize,
    held: Option<String>,
    preserve: bool,
    done: bool,
}

impl<I> Iterator for LineJoiner<I>
where
    I: Iterator,
    I::Item: Into<String>,
{
    type Item = String;

    fn next(&mut self) -> Option<String> {
        loop {
            if self.done && self.held.is_none() {
                // End of input: flush the dangling continuation, then makeup.
                if !self.prev.is_empty() {
                    return Some(mem::take(&mut self.prev));
                }
                if self.makeup > 0 {
                    self.makeup -= 1;
                    return Some("\n".into());
                }
                return None;
            }
            // Makeup newlines go out before the line that completed a join.
            if self.makeup > 0 && self.held.is_some() {
                self.makeup -= 1;
                return Some("\n".into());
            }
            let s = match self.held.take() {
                Some(s) => s,
                None => match self.inner.next() {
                    Some(s) => s.into(),
                    None => {
                        self.done = true;
                        continue;
                    }
                },
            };
            if self.makeup > 0 {
                self.held = Some(s);
                continue;
            }
            if ends_escaped(&s) {
                self.prev.push_str(&s[..s.len() - 2]);
                if self.preserve {
                    self.makeup += 1;
                }
                continue;
            }
            if self.prev.is_empty() {
                return Some(s);
            }
            let mut out = mem::take(&mut self.prev);
            out.push_str(&s);
            return Some(out);
        }
    }
}

/// True when `s` ends in a continuation: a newline preceded by an odd run
/// of backslashes (`\\\n` is a literal backslash at end of line, not a
/// continuation).
fn ends_escaped(s: &str) -> bool {
    let bytes = s.as_bytes();
    if bytes.len() < 2 || bytes[bytes.len() - 1] != b'\n' || bytes[bytes.len() - 2] != b'\\' {
        return false;
    }
    let run = bytes[..bytes.len() - 1]
        .iter()
        .rev()
        .take_while(|&&b| b == b'\\')
        .count();
    run % 2 == 1
}
