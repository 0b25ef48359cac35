//! Mutable step script with a cursor

#[cfg(test)]
mod proptests;

use super::Step;

#[derive(Debug, Clone)]
struct Entry<S> {
    step: S,
    temporary: bool,
}

/// Ordered steps plus a cursor. Steps inserted at the cursor run next;
/// temporary ones are dropped by `reset`.
#[derive(Debug, Clone)]
pub struct Chain<S = Step> {
    entries: Vec<Entry<S>>,
    cursor: usize,
}

impl<S> Default for Chain<S> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            cursor: 0,
        }
    }
}

impl<S: Clone> Chain<S> {
    /// Chain of permanent steps
    pub fn new(steps: impl IntoIterator<Item = S>) -> Self {
        Self {
            entries: steps
                .into_iter()
                .map(|step| Entry {
                    step,
                    temporary: false,
                })
                .collect(),
            cursor: 0,
        }
    }

    /// Step at the cursor, advancing it. `None` once exhausted.
    ///
    /// Returns a copy so permanent steps can be replayed after `reset`.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Option<S> {
        let entry = self.entries.get(self.cursor)?;
        self.cursor += 1;
        Some(entry.step.clone())
    }

    /// Insert at the cursor so the step is returned by the next `next()`
    pub fn push_next(&mut self, step: S, temporary: bool) -> &mut Self {
        self.entries.insert(self.cursor, Entry { step, temporary });
        self
    }

    /// Append permanent steps at the tail
    pub fn push(&mut self, steps: impl IntoIterator<Item = S>) -> &mut Self {
        self.entries.extend(steps.into_iter().map(|step| Entry {
            step,
            temporary: false,
        }));
        self
    }

    /// Rewind to the start, dropping temporary steps
    pub fn reset(&mut self) -> &mut Self {
        self.cursor = 0;
        self.entries.retain(|entry| !entry.temporary);
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Steps not yet returned by `next()`
    pub fn remaining(&self) -> impl Iterator<Item = &S> {
        self.entries[self.cursor..].iter().map(|entry| &entry.step)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_exhausts_then_returns_none() {
        let mut chain = Chain::new(["a", "b"]);
        assert_eq!(chain.next(), Some("a"));
        assert_eq!(chain.next(), Some("b"));
        assert_eq!(chain.next(), None);
        assert_eq!(chain.next(), None);
        assert_eq!(chain.cursor(), 2);
    }

    #[test]
    fn push_next_runs_immediately() {
        let mut chain = Chain::new(["a", "b"]);
        assert_eq!(chain.next(), Some("a"));
        chain.push_next("x", true).push_next("y", false);
        assert_eq!(chain.next(), Some("y"));
        assert_eq!(chain.next(), Some("x"));
        assert_eq!(chain.next(), Some("b"));
    }

    #[test]
    fn reset_drops_temporary_steps() {
        let mut chain = Chain::new(["a"]);
        chain.next();
        chain.push_next("tmp", true);
        chain.push(["b"]);
        chain.push_next("keep", false);
        chain.reset();

        let replay: Vec<_> = std::iter::from_fn(|| chain.next()).collect();
        assert_eq!(replay, vec!["a", "keep", "b"]);
    }

    #[test]
    fn empty_chain() {
        let mut chain: Chain<u8> = Chain::default();
        assert!(chain.is_empty());
        assert_eq!(chain.next(), None);
        chain.reset();
        assert_eq!(chain.cursor(), 0);
    }

    #[test]
    fn remaining_tracks_cursor() {
        let mut chain = Chain::new([1, 2, 3]);
        chain.next();
        assert_eq!(chain.remaining().copied().collect::<Vec<_>>(), vec![2, 3]);
    }
}
