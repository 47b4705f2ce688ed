//! Turn lifecycle types and title helpers

use chrono::{DateTime, Local};

/// Where the session is in the current turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TurnPhase {
    /// No turn has run yet
    #[default]
    Idle,
    /// Reply fragments are arriving
    Streaming {
        /// A title request runs alongside the stream
        awaiting_title: bool,
    },
    /// Stream finished; joining the title request
    Merging,
    /// Last turn was persisted
    Committed,
    /// Last turn failed or was cancelled; nothing was persisted
    Aborted,
}

impl TurnPhase {
    /// Whether a new submission may start
    pub fn is_accepting(self) -> bool {
        matches!(self, Self::Idle | Self::Committed | Self::Aborted)
    }
}

/// Result of a submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Blank input; nothing happened
    Ignored,
    /// The turn was persisted
    Committed {
        /// Title the conversation is stored under
        title: String,
        /// Full assistant reply
        reply: String,
        /// Whether this turn started a new conversation
        created: bool,
    },
}

/// Receives reply fragments as they stream in
///
/// Implemented for any `FnMut(&str) + Send` closure.
pub trait FragmentSink: Send {
    fn on_fragment(&mut self, fragment: &str);
}

impl<F> FragmentSink for F
where
    F: FnMut(&str) + Send,
{
    fn on_fragment(&mut self, fragment: &str) {
        self(fragment)
    }
}

/// Sink that discards fragments
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl FragmentSink for NullSink {
    fn on_fragment(&mut self, _fragment: &str) {}
}

const TITLE_QUOTES: &[char] = &['"', '\'', '\u{201c}', '\u{201d}', '\u{2018}', '\u{2019}'];

/// Clean up a suggested title
///
/// Strips surrounding whitespace and quote characters, in any nesting.
pub fn normalize_title(raw: &str) -> String {
    raw.trim_matches(|c: char| c.is_whitespace() || TITLE_QUOTES.contains(&c))
        .to_string()
}

/// Title used when no usable suggestion arrived
pub fn fallback_title(now: DateTime<Local>) -> String {
    format!("Chat {}", now.format("%Y-%m-%d %H:%M:%S"))
}

/// First of `base`, `base (2)`, `base (3)`, ... for which `taken` is false
pub fn unique_title<F>(base: &str, mut taken: F) -> String
where
    F: FnMut(&str) -> bool,
{
    if !taken(base) {
        return base.to_string();
    }
    let mut n = 2u32;
    loop {
        let candidate = format!("{} ({})", base, n);
        if !taken(&candidate) {
            return candidate;
        }
        n += 1;
    }
}
