//! Selection of the newest line from cumulative response text.

use log::trace;

/// Tracks what has already been surfaced from a cumulative response body.
///
/// Each call to [`CumulativeBuffer::latest_line`] receives the entire text
/// received so far. Only the last non-empty line is returned: earlier lines
/// in the same text are treated as superseded and are never replayed, so
/// phase changes that arrive together in one network chunk are collapsed
/// into the newest one.
#[derive(Debug, Default)]
pub struct CumulativeBuffer {
    last_line: Option<String>,
}

impl CumulativeBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the newest line of `text`, or `None` when its newest line is
    /// the one already returned by the previous call.
    pub fn latest_line<'a>(&mut self, text: &'a str) -> Option<&'a str> {
        let line = last_non_empty_line(text)?;

        if self.last_line.as_deref() == Some(line) {
            trace!("Ignoring repeated chunk of {} bytes", text.len());
            return None;
        }

        self.last_line = Some(line.to_owned());
        Some(line)
    }

    /// Forget everything seen so far.
    pub fn reset(&mut self) {
        self.last_line = None;
    }
}

/// Last line of `text` that is not empty after trimming.
pub fn last_non_empty_line(text: &str) -> Option<&str> {
    text.lines().map(str::trim).rfind(|line| !line.is_empty())
}
