//! Typed progress frames.

use std::fmt;

use serde::Deserialize;

use crate::ParseError;

/// Status label the host sends once the model is fully registered.
pub const SUCCESS_STATUS: &str = "success";

/// One progress update from the pull stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressFrame {
    /// A phase without byte counters ("pulling manifest", "verifying sha256", ...).
    StatusOnly { status: String },

    /// A downloading phase with byte counters. `completed <= total` always holds.
    WithBytes {
        status: String,
        completed: u64,
        total: u64,
    },
}

impl ProgressFrame {
    /// Create a status-only frame.
    pub fn status_only(status: impl Into<String>) -> Self {
        Self::StatusOnly {
            status: status.into(),
        }
    }

    /// Create a frame with byte counters.
    ///
    /// `completed` is clamped to `total`, and a zero `total` yields a
    /// status-only frame since no progress can be derived from it.
    pub fn with_bytes(status: impl Into<String>, completed: u64, total: u64) -> Self {
        let status = status.into();
        if total == 0 {
            return Self::StatusOnly { status };
        }
        Self::WithBytes {
            status,
            completed: completed.min(total),
            total,
        }
    }

    pub fn status(&self) -> &str {
        match self {
            Self::StatusOnly { status } | Self::WithBytes { status, .. } => status,
        }
    }

    /// `(completed, total)` when the frame carries byte counters.
    pub fn bytes(&self) -> Option<(u64, u64)> {
        match self {
            Self::StatusOnly { .. } => None,
            Self::WithBytes {
                completed, total, ..
            } => Some((*completed, *total)),
        }
    }

    pub fn percentage(&self) -> Option<Percentage> {
        self.bytes()
            .and_then(|(completed, total)| Percentage::from_bytes(completed, total))
    }

    /// Whether this frame is the terminal success sentinel.
    pub fn is_success(&self) -> bool {
        self.status() == SUCCESS_STATUS
    }
}

/// Whole-number completion percentage in `0..=100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Percentage(u8);

impl Percentage {
    /// `round(completed / total * 100)`, or `None` when `total` is zero.
    pub fn from_bytes(completed: u64, total: u64) -> Option<Self> {
        if total == 0 {
            return None;
        }
        let ratio = completed.min(total) as f64 / total as f64;
        Some(Self((ratio * 100.0).round() as u8))
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl fmt::Display for Percentage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}

/// A decoded line of the pull stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamLine {
    Progress(ProgressFrame),
    /// The host reported a failure in-band, e.g. an unknown model name.
    HostError(String),
}

/// Wire shape of a stream line. Unknown fields such as `digest` are ignored.
#[derive(Debug, Deserialize)]
struct RawLine {
    status: Option<String>,
    total: Option<u64>,
    completed: Option<u64>,
    error: Option<String>,
}

/// Parse one line of the pull stream.
pub fn parse_line(line: &str) -> Result<StreamLine, ParseError> {
    let line = line.trim();
    if line.is_empty() {
        return Err(ParseError::Empty);
    }

    let raw: RawLine = serde_json::from_str(line)?;

    if let Some(error) = raw.error {
        return Ok(StreamLine::HostError(error));
    }

    let status = raw.status.ok_or(ParseError::MissingStatus)?;
    let frame = match (raw.completed, raw.total) {
        (Some(completed), Some(total)) => ProgressFrame::with_bytes(status, completed, total),
        _ => ProgressFrame::status_only(status),
    };

    Ok(StreamLine::Progress(frame))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress(line: &str) -> ProgressFrame {
        match parse_line(line) {
            Ok(StreamLine::Progress(frame)) => frame,
            other => panic!("expected progress frame for {line}, got {other:?}"),
        }
    }

    #[test]
    fn test_status_only_line() {
        let frame = progress(r#"{"status":"pulling manifest"}"#);
        assert_eq!(frame, ProgressFrame::status_only("pulling manifest"));
        assert_eq!(frame.bytes(), None);
        assert_eq!(frame.percentage(), None);
        assert!(!frame.is_success());
    }

    #[test]
    fn test_line_with_bytes() {
        let frame = progress(
            r#"{"status":"downloading","digest":"sha256:abc","total":1000000,"completed":250000}"#,
        );
        assert_eq!(frame.status(), "downloading");
        assert_eq!(frame.bytes(), Some((250_000, 1_000_000)));
        assert_eq!(frame.percentage(), Some(Percentage(25)));
    }

    #[test]
    fn test_total_without_completed_is_status_only() {
        // The host announces a layer's size before any bytes arrive
        let frame = progress(r#"{"status":"pulling 8eeb52dfb3bb","total":4000}"#);
        assert_eq!(frame.bytes(), None);
    }

    #[test]
    fn test_success_sentinel() {
        assert!(progress(r#"{"status":"success"}"#).is_success());
    }

    #[test]
    fn test_host_error_line() {
        let line = parse_line(r#"{"error":"pull model manifest: file does not exist"}"#).unwrap();
        assert_eq!(
            line,
            StreamLine::HostError("pull model manifest: file does not exist".to_string())
        );
    }

    #[test]
    fn test_malformed_lines() {
        assert!(matches!(parse_line(""), Err(ParseError::Empty)));
        assert!(matches!(parse_line("   "), Err(ParseError::Empty)));
        assert!(matches!(
            parse_line(r#"{"status":"downl"#),
            Err(ParseError::Json(_))
        ));
        assert!(matches!(
            parse_line(r#"{"total":10,"completed":5}"#),
            Err(ParseError::MissingStatus)
        ));
        assert!(matches!(
            parse_line(r#"{"status":"downloading","total":-1,"completed":0}"#),
            Err(ParseError::Json(_))
        ));
    }

    #[test]
    fn test_percentage_rounding() {
        let test_cases = vec![
            (0, 1000, 0),
            (1, 1000, 0),
            (5, 1000, 1),
            (250_000, 1_000_000, 25),
            (333, 1000, 33),
            (666, 1000, 67),
            (995, 1000, 100),
            (1000, 1000, 100),
        ];

        for (completed, total, expected) in test_cases {
            let expected_exact = ((completed as f64 / total as f64) * 100.0).round() as u8;
            let pct = Percentage::from_bytes(completed, total).unwrap();
            assert_eq!(pct.value(), expected, "{completed}/{total}");
            assert_eq!(pct.value(), expected_exact, "{completed}/{total}");
        }
    }

    #[test]
    fn test_percentage_stays_in_range() {
        let totals = [1u64, 7, 1000, 4_683_087_519, u64::MAX];
        for total in totals {
            for completed in [0, 1, total / 3, total / 2, total - 1, total] {
                let pct = Percentage::from_bytes(completed, total).unwrap();
                assert!(pct.value() <= 100, "{completed}/{total} gave {pct}");
            }
        }
        assert_eq!(Percentage::from_bytes(0, 0), None);
    }

    #[test]
    fn test_completed_is_clamped_to_total() {
        let frame = ProgressFrame::with_bytes("downloading", 1200, 1000);
        assert_eq!(frame.bytes(), Some((1000, 1000)));
        assert_eq!(frame.percentage().map(Percentage::value), Some(100));
    }

    #[test]
    fn test_zero_total_is_status_only() {
        let frame = ProgressFrame::with_bytes("downloading", 0, 0);
        assert_eq!(frame, ProgressFrame::status_only("downloading"));
    }
}
