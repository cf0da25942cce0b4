//! Compile-time error reporting.
//!
//! Productions do not unwind: a failing rule abandons the compile, and the
//! shared [`ErrorState`] records what was reported. [`NoErrs`] selects how
//! loudly: normally, flag-only, or fully suppressed.

use std::fmt;

/// How errors are surfaced while parsing.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum NoErrs {
    /// Keep the message and mark the error flag.
    Report,
    /// Mark the error flag but keep no message.
    Quiet,
    /// Neither message nor flag; the compile still fails.
    Off,
}

impl Default for NoErrs {
    fn default() -> NoErrs {
        NoErrs::Report
    }
}

/// Shared error sink of one compile.
#[derive(Debug, Default)]
pub struct ErrorState {
    pub mode: NoErrs,
    /// The sticky error flag; callers must clear it before chaining
    /// another parse.
    pub flagged: bool,
    pub messages: Vec<String>,
}

impl ErrorState {
    pub fn new(mode: NoErrs) -> ErrorState {
        ErrorState {
            mode,
            flagged: false,
            messages: Vec::new(),
        }
    }

    /// Reports a message and marks the error flag, per the current mode.
    /// Only the first report of a compile keeps its message.
    pub fn report(&mut self, msg: String) {
        if self.mode == NoErrs::Report && !self.flagged {
            self.messages.push(msg);
        }
        if self.mode != NoErrs::Off {
            self.flagged = true;
        }
    }

    /// Reports without marking the flag (used for follow-up diagnostics).
    pub fn report_unflagged(&mut self, msg: String) {
        if self.mode == NoErrs::Report && !self.flagged {
            self.messages.push(msg);
        }
    }

    pub fn clear(&mut self) {
        self.flagged = false;
        self.messages.clear();
    }
}

/// A failed compile: the collected diagnostics plus the flag state.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub messages: Vec<String>,
    pub flagged: bool,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.messages.first() {
            Some(m) => write!(f, "{}", m),
            None => write!(f, "parse error"),
        }
    }
}

impl std::error::Error for ParseError {}
