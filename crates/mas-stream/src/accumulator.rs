use std::collections::VecDeque;

/// Append-only answer buffer fed from a FIFO of pending fragments.
#[derive(Debug, Default)]
pub struct TextAccumulator {
    pending: VecDeque<String>,
    buffer: String,
    one_per_tick: bool,
}

impl TextAccumulator {
    /// Creates an empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a fragment. Empty fragments are skipped.
    pub fn enqueue(&mut self, fragment: impl Into<String>) {
        let fragment = fragment.into();
        if !fragment.is_empty() {
            self.pending.push_back(fragment);
        }
    }

    /// Moves up to `max_count` fragments into the buffer (all of them for `None`).
    ///
    /// Returns true if anything was moved.
    pub fn drain(&mut self, max_count: Option<usize>) -> bool {
        let take = max_count
            .unwrap_or(self.pending.len())
            .min(self.pending.len());
        for fragment in self.pending.drain(..take) {
            self.buffer.push_str(&fragment);
        }
        take > 0
    }

    /// One drain-loop step: a single fragment while animating, the whole queue otherwise.
    pub fn drain_tick(&mut self) -> bool {
        let moved = if self.one_per_tick {
            self.drain(Some(1))
        } else {
            self.drain(None)
        };
        if self.one_per_tick && self.pending.is_empty() {
            self.one_per_tick = false;
        }
        moved
    }

    /// Switches to one-fragment-per-tick draining until the queue empties.
    pub fn start_animation(&mut self) {
        if !self.pending.is_empty() {
            self.one_per_tick = true;
        }
    }

    /// True while fragments are released one per tick.
    pub fn is_animating(&self) -> bool {
        self.one_per_tick
    }

    /// True while fragments are queued but not yet in the buffer.
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Cumulative answer text.
    pub fn text(&self) -> &str {
        &self.buffer
    }

    /// True until the first fragment reaches the buffer.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_drain_preserves_arrival_order() {
        let mut acc = TextAccumulator::new();
        acc.enqueue("Hi");
        acc.enqueue("");
        acc.enqueue(" there");
        assert!(acc.drain(None));
        assert_eq!(acc.text(), "Hi there");
        assert!(!acc.drain(None));
    }

    #[test]
    fn bounded_drain_moves_at_most_max_count() {
        let mut acc = TextAccumulator::new();
        for fragment in ["a", "b", "c"] {
            acc.enqueue(fragment);
        }
        assert!(acc.drain(Some(2)));
        assert_eq!(acc.text(), "ab");
        assert!(acc.has_pending());
        assert!(acc.drain(Some(5)));
        assert_eq!(acc.text(), "abc");
    }

    #[test]
    fn animation_drains_one_fragment_per_tick_then_clears() {
        let mut acc = TextAccumulator::new();
        acc.enqueue("Paris ");
        acc.enqueue("is");
        acc.start_animation();

        assert!(acc.drain_tick());
        assert_eq!(acc.text(), "Paris ");
        assert!(acc.is_animating());

        assert!(acc.drain_tick());
        assert_eq!(acc.text(), "Paris is");
        assert!(!acc.is_animating());

        acc.enqueue(" here");
        acc.enqueue(" now");
        assert!(acc.drain_tick());
        assert_eq!(acc.text(), "Paris is here now");
    }
}
