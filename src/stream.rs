//! # Backtracking Token Stream Buffer
//!
//! [`TokenStream`] turns any iterator into a buffered stream with
//! lookahead ([`peek`](TokenStream::peek)), pushback
//! ([`unget`](TokenStream::unget)), and nested speculative scopes
//! ([`mark`](TokenStream::mark)). It is independent of the match engine:
//! the items can be [`Token`](crate::Token)s from a scan, or anything else
//! worth backtracking over.
//!
//! End-of-sequence behavior is policy, set at construction:
//!
//! - no policy: `get`/`peek` return `None` once every source is exhausted;
//! - [`with_lasttok`](TokenStream::with_lasttok): one final synthetic item
//!   is delivered first, as an ordinary one-shot item (it is logged and
//!   unwound like any other);
//! - [`with_eoftok`](TokenStream::with_eoftok): after the end, `get` and
//!   `peek` produce fresh clones of the sentinel forever. Consuming a
//!   sentinel changes nothing, so unwinding a mark never replays one, and
//!   [`at_eof`](TokenStream::at_eof) stays correct throughout;
//! - both: the lasttok comes first, then the eoftok clones.
//!
//! ```
//! use relex::TokenStream;
//!
//! let mut ts = TokenStream::from("a b c".split(' '));
//! assert_eq!(ts.peek(), Some("a"));
//! {
//!     let mut m = ts.mark();
//!     assert_eq!(m.get(), Some("a"));
//!     assert_eq!(m.get(), Some("b"));
//!     // not accepted: both gets unwind when the mark drops
//! }
//! assert_eq!(ts.get(), Some("a"));
//! ```
use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};

use log::trace;

struct Frame<T> {
    log: Vec<T>,
    accepted: bool,
}

/// A peekable, ungettable, backtrackable buffer over one or more sources.
///
/// Sources are drained in order and concatenate seamlessly. All state
/// lives in the buffer itself; the sources are only ever pulled forward.
pub struct TokenStream<I: Iterator> {
    sources: VecDeque<I>,
    queue: VecDeque<I::Item>,
    frames: Vec<Frame<I::Item>>,
    lasttok: Option<I::Item>,
    eoftok: Option<I::Item>,
}

impl<I: Iterator> TokenStream<I> {
    /// A stream over `sources`, drained left to right.
    pub fn new(sources: Vec<I>) -> Self {
        TokenStream {
            sources: sources.into_iter().collect(),
            queue: VecDeque::new(),
            frames: Vec::new(),
            lasttok: None,
            eoftok: None,
        }
    }

    /// Delivers `token` once, after the last real item.
    pub fn with_lasttok(mut self, token: I::Item) -> Self {
        self.lasttok = Some(token);
        self
    }

    /// Delivers clones of `token` forever once the sequence is exhausted.
    /// An iterator over such a stream never terminates; use
    /// [`TokenStream::at_eof`] as the loop control instead.
    pub fn with_eoftok(mut self, token: I::Item) -> Self {
        self.eoftok = Some(token);
        self
    }

    fn pull(&mut self) -> Option<I::Item> {
        while let Some(source) = self.sources.front_mut() {
            if let Some(item) = source.next() {
                return Some(item);
            }
            self.sources.pop_front();
        }
        self.lasttok.take()
    }

    /// Buffers until `n` items are queued or the sequence ends.
    fn fill(&mut self, n: usize) {
        while self.queue.len() < n {
            let Some(item) = self.pull() else { return };
            self.queue.push_back(item);
        }
    }

    /// Pushes `item` back; the next [`get`](TokenStream::get) returns it.
    ///
    /// The item need not have come out of this stream. No provenance is
    /// checked: ungetting something the stream never produced is the
    /// caller's own bookkeeping to defend.
    pub fn unget(&mut self, item: I::Item) {
        self.queue.push_front(item);
    }

    /// Pushes a batch back; items come out again in the order given.
    pub fn unget_all(&mut self, items: Vec<I::Item>) {
        for item in items.into_iter().rev() {
            self.queue.push_front(item);
        }
    }

    /// True once every real item (lasttok included) has been consumed.
    /// With an eoftok configured this is the only end-of-input signal.
    pub fn at_eof(&mut self) -> bool {
        self.fill(1);
        self.queue.is_empty()
    }

    /// Opens a speculative scope.
    ///
    /// The guard borrows the stream; use it wherever the stream itself
    /// would be used. When it drops unaccepted, every item gotten inside
    /// the scope is pushed back in order, restoring the pre-mark state on
    /// every exit path. After [`accept`](TokenStream::accept), gotten
    /// items stay consumed; under a still-open outer mark they become the
    /// outer scope's items, so an unaccepted outer mark unwinds them too.
    pub fn mark(&mut self) -> Mark<'_, I> {
        self.frames.push(Frame {
            log: Vec::new(),
            accepted: false,
        });
        trace!("mark: {} frames open", self.frames.len());
        Mark { stream: self }
    }

    /// Commits the innermost open mark. Callable at any point in the
    /// scope's lifetime, before or after the gets it covers.
    ///
    /// Panics if no mark is open.
    pub fn accept(&mut self) {
        match self.frames.last_mut() {
            Some(frame) => frame.accepted = true,
            None => panic!("accept() with no open mark"),
        }
    }

    fn exit_mark(&mut self) {
        let Some(frame) = self.frames.pop() else { return };
        if frame.accepted {
            // Consumed for good; replay duty moves to the enclosing scope.
            if let Some(parent) = self.frames.last_mut() {
                parent.log.extend(frame.log);
            }
            trace!("mark accepted: {} frames open", self.frames.len());
        } else {
            trace!(
                "mark unwound: {} items replayed, {} frames open",
                frame.log.len(),
                self.frames.len()
            );
            self.unget_all(frame.log);
        }
    }
}

impl<I: Iterator> TokenStream<I>
where
    I::Item: Clone,
{
    /// The next item without consuming it.
    pub fn peek(&mut self) -> Option<I::Item> {
        self.peek_nth(0)
    }

    /// The `k`-th unconsumed item (0 is the next one) without consuming
    /// anything. Idempotent. Past the end this is the eoftok, if
    /// configured, else `None`.
    pub fn peek_nth(&mut self, k: usize) -> Option<I::Item> {
        self.fill(k + 1);
        match self.queue.get(k) {
            Some(item) => Some(item.clone()),
            None => self.eoftok.clone(),
        }
    }

    /// Up to `n` upcoming items; shorter only at end of sequence.
    pub fn peek_n(&mut self, n: usize) -> Vec<I::Item> {
        let mut items = Vec::with_capacity(n);
        for k in 0..n {
            let Some(item) = self.peek_nth(k) else { break };
            items.push(item);
        }
        items
    }

    /// Consumes and returns the next item. Past the end this is the
    /// eoftok, if configured, else `None`.
    pub fn get(&mut self) -> Option<I::Item> {
        self.fill(1);
        match self.queue.pop_front() {
            Some(item) => {
                if let Some(frame) = self.frames.last_mut() {
                    frame.log.push(item.clone());
                }
                Some(item)
            }
            // Sentinel consumption is stateless: no log entry.
            None => self.eoftok.clone(),
        }
    }

    /// Consumes up to `n` items; shorter only at end of sequence.
    pub fn get_n(&mut self, n: usize) -> Vec<I::Item> {
        let mut items = Vec::with_capacity(n);
        for _ in 0..n {
            let Some(item) = self.get() else { break };
            items.push(item);
        }
        items
    }

    /// The next item if it satisfies `pred`, without consuming. `None` on
    /// a predicate miss or at end of sequence.
    pub fn peek_if<F>(&mut self, pred: F) -> Option<I::Item>
    where
        F: FnOnce(&I::Item) -> bool,
    {
        let item = self.peek()?;
        pred(&item).then_some(item)
    }

    /// Like [`peek_if`](TokenStream::peek_if), but once the real items are
    /// exhausted returns `Some(at_end)` regardless of the predicate.
    pub fn peek_if_or<F>(&mut self, pred: F, at_end: I::Item) -> Option<I::Item>
    where
        F: FnOnce(&I::Item) -> bool,
    {
        if self.at_eof() {
            return Some(at_end);
        }
        self.peek_if(pred)
    }
}

impl<I: Iterator> From<I> for TokenStream<I> {
    fn from(source: I) -> Self {
        TokenStream::new(vec![source])
    }
}

/// Consumes via [`TokenStream::get`]; never terminates if an eoftok is
/// configured.
impl<I: Iterator> Iterator for TokenStream<I>
where
    I::Item: Clone,
{
    type Item = I::Item;

    fn next(&mut self) -> Option<I::Item> {
        self.get()
    }
}

/// RAII guard for one speculative scope; see [`TokenStream::mark`].
///
/// Derefs to the stream, so gets, peeks, and nested marks all go through
/// the guard. Holding the stream's `&mut` is what makes misuse (accepting
/// an outer mark from under an inner one, reusing a closed frame)
/// unrepresentable.
pub struct Mark<'a, I: Iterator> {
    stream: &'a mut TokenStream<I>,
}

impl<I: Iterator> Deref for Mark<'_, I> {
    type Target = TokenStream<I>;

    fn deref(&self) -> &TokenStream<I> {
        self.stream
    }
}

impl<I: Iterator> DerefMut for Mark<'_, I> {
    fn deref_mut(&mut self) -> &mut TokenStream<I> {
        self.stream
    }
}

impl<I: Iterator> Drop for Mark<'_, I> {
    fn drop(&mut self) {
        self.stream.exit_mark();
    }
}
