use crate::frame::ServerEvent;

const BANNER_TITLE: &str = "**Agent activity**";
const REASONING_SOURCES: [&str; 3] = ["reasoning", "thought", "thinking"];

/// Transient status and reasoning shown until the first answer token arrives.
#[derive(Debug)]
pub struct ActivityTracker {
    status_line: String,
    heartbeat_line: String,
    reasoning: String,
    visible: bool,
    dirty: bool,
}

impl Default for ActivityTracker {
    fn default() -> Self {
        Self {
            status_line: String::new(),
            heartbeat_line: String::new(),
            reasoning: String::new(),
            visible: true,
            dirty: false,
        }
    }
}

impl ActivityTracker {
    /// Creates a visible, empty banner.
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds a non-token event into the banner state.
    ///
    /// Returns true if the banner changed. Once hidden, every event is ignored.
    pub fn apply(&mut self, event: &ServerEvent) -> bool {
        if !self.visible {
            return false;
        }
        let changed = match event {
            ServerEvent::ToolStart { tool } => {
                self.set_status(format!("tool start: {}", tool.as_deref().unwrap_or("tool")))
            }
            ServerEvent::ToolEnd {
                ok,
                error,
                rows_count,
            } => {
                let line = match (ok, error, rows_count) {
                    (Some(false), Some(error), _) => format!("tool end: failed ({error})"),
                    (Some(false), None, _) => "tool end: failed".to_string(),
                    (_, _, Some(rows)) => format!("tool end ({rows} rows)"),
                    _ => "tool end".to_string(),
                };
                self.set_status(line)
            }
            ServerEvent::Retrieve {
                table,
                rows_count,
                docs_count,
            } => {
                let table = table.as_deref().unwrap_or("source");
                let line = match (rows_count, docs_count) {
                    (None, Some(docs)) => format!("retrieve: {table} -> {docs} docs"),
                    (rows, _) => format!("retrieve: {table} -> {} rows", rows.unwrap_or(0)),
                };
                self.set_status(line)
            }
            ServerEvent::TraceToken { text, source } => {
                if is_reasoning_source(source.as_deref()) {
                    if text.is_empty() {
                        false
                    } else {
                        self.reasoning.push_str(text);
                        true
                    }
                } else {
                    self.set_status(text.trim().to_string())
                }
            }
            _ => false,
        };
        self.dirty |= changed;
        changed
    }

    /// Replaces the heartbeat line (elapsed-time indicator).
    pub fn set_heartbeat(&mut self, line: String) {
        if self.visible && self.heartbeat_line != line {
            self.heartbeat_line = line;
            self.dirty = true;
        }
    }

    /// Permanently hides the banner and drops its contents.
    ///
    /// Returns true only on the first call.
    pub fn hide(&mut self) -> bool {
        if !self.visible {
            return false;
        }
        self.visible = false;
        self.status_line.clear();
        self.heartbeat_line.clear();
        self.reasoning.clear();
        self.dirty = true;
        true
    }

    /// False once the banner has been hidden.
    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Latest tool or trace status.
    pub fn status_line(&self) -> &str {
        &self.status_line
    }

    /// Accumulated reasoning text.
    pub fn reasoning(&self) -> &str {
        &self.reasoning
    }

    /// Returns and clears the pending-update flag.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    /// True if a change has not been rendered yet.
    pub fn has_pending_update(&self) -> bool {
        self.dirty
    }

    /// Markdown banner, or `None` when hidden or there is nothing to show.
    pub fn banner(&self) -> Option<String> {
        if !self.visible {
            return None;
        }
        let mut lines: Vec<String> = Vec::new();
        if !self.status_line.is_empty() {
            lines.push(self.status_line.clone());
        }
        if !self.heartbeat_line.is_empty() {
            lines.push(format!("_{}_", self.heartbeat_line));
        }
        let reasoning = emphasize_block(&self.reasoning);
        if !reasoning.is_empty() {
            if !lines.is_empty() {
                lines.push(String::new());
            }
            lines.push(reasoning);
        }
        if lines.is_empty() {
            return None;
        }
        Some(format!("{BANNER_TITLE}\n{}", lines.join("\n")))
    }

    /// Composes the text shown to the caller for the given cumulative answer.
    pub fn render(&self, answer: &str) -> String {
        match self.banner() {
            Some(banner) if answer.is_empty() => banner,
            Some(banner) => format!("{banner}\n\n---\n\n{answer}"),
            None => answer.to_string(),
        }
    }

    fn set_status(&mut self, line: String) -> bool {
        if line.is_empty() || line == self.status_line {
            return false;
        }
        self.status_line = line;
        true
    }
}

fn is_reasoning_source(source: Option<&str>) -> bool {
    source.is_some_and(|s| {
        REASONING_SOURCES
            .iter()
            .any(|channel| s.trim().eq_ignore_ascii_case(channel))
    })
}

/// Italicizes each line; blank lines stay blank.
fn emphasize_block(text: &str) -> String {
    let text = text.trim_end_matches(|c: char| c == '\n' || c == '\r');
    if text.trim().is_empty() {
        return String::new();
    }
    text.lines()
        .map(|line| {
            let line = line.trim();
            if line.is_empty() {
                String::new()
            } else {
                format!("*{line}*")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}
