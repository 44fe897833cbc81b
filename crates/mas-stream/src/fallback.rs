use crate::accumulator::TextAccumulator;

/// Keeps the `final` answer and replays it when no tokens were streamed.
#[derive(Debug, Default)]
pub struct FallbackReconciler {
    final_answer: Option<String>,
}

impl FallbackReconciler {
    /// Creates a reconciler with no stored answer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Handles a `final` event.
    ///
    /// When nothing has been streamed yet, the answer is split into fragments and
    /// queued for one-per-tick replay; returns true in that case. Otherwise the
    /// answer is only kept as a safety net.
    pub fn on_final(
        &mut self,
        answer: &str,
        saw_answer_token: bool,
        accumulator: &mut TextAccumulator,
    ) -> bool {
        if answer.is_empty() {
            return false;
        }
        self.final_answer = Some(answer.to_string());
        if saw_answer_token || !accumulator.is_empty() || accumulator.has_pending() {
            return false;
        }
        for fragment in split_fragments(answer) {
            accumulator.enqueue(fragment);
        }
        accumulator.start_animation();
        true
    }

    /// Answer to show if the buffer is still empty when the run ends.
    pub fn safety_net(&self) -> Option<&str> {
        self.final_answer.as_deref()
    }
}

/// Splits text into words with their trailing whitespace; each newline is its own fragment.
///
/// Concatenating the fragments yields the input unchanged.
pub fn split_fragments(text: &str) -> Vec<String> {
    let mut fragments = Vec::new();
    let mut current = String::new();
    let mut in_trailing_space = false;
    for ch in text.chars() {
        if ch == '\n' {
            if !current.is_empty() {
                fragments.push(std::mem::take(&mut current));
            }
            fragments.push("\n".to_string());
            in_trailing_space = false;
        } else if ch.is_whitespace() {
            current.push(ch);
            in_trailing_space = true;
        } else {
            if in_trailing_space && !current.is_empty() {
                fragments.push(std::mem::take(&mut current));
            }
            current.push(ch);
            in_trailing_space = false;
        }
    }
    if !current.is_empty() {
        fragments.push(current);
    }
    fragments
}
