//! Progress parsing for streamed model pulls.
//!
//! The inference host answers `POST /api/pull` with one JSON object per
//! line, each describing the current phase of the download. The transport
//! hands the response over as the *whole text received so far*, not as
//! deltas, so this crate is written against that cumulative contract:
//! [`CumulativeBuffer`] picks the newest line out of the accumulated text
//! and [`parse_line`] turns it into a typed [`StreamLine`].
//!
//! # Example
//!
//! ```
//! use ollama_console_progress::{parse_line, CumulativeBuffer, ProgressFrame, StreamLine};
//!
//! let mut buffer = CumulativeBuffer::new();
//! let text = "{\"status\":\"pulling manifest\"}\n\
//!             {\"status\":\"downloading\",\"total\":1000,\"completed\":250}\n";
//!
//! let line = buffer.latest_line(text).expect("new text");
//! match parse_line(line)? {
//!     StreamLine::Progress(frame) => {
//!         assert_eq!(frame.status(), "downloading");
//!         assert_eq!(frame.percentage().map(|p| p.value()), Some(25));
//!     }
//!     StreamLine::HostError(message) => panic!("host error: {message}"),
//! }
//!
//! // The same text again is not a new event.
//! assert!(buffer.latest_line(text).is_none());
//! # Ok::<(), ollama_console_progress::ParseError>(())
//! ```

mod buffer;
mod frame;

pub use buffer::{last_non_empty_line, CumulativeBuffer};
pub use frame::{parse_line, Percentage, ProgressFrame, StreamLine, SUCCESS_STATUS};

use thiserror::Error;

/// Errors produced while decoding a single progress line.
///
/// None of these are fatal to a pull: the caller logs them and waits for
/// the next chunk.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// The line was empty after trimming.
    #[error("Progress line is empty")]
    Empty,

    /// The line is not a JSON object of the expected shape.
    #[error("Malformed progress line: {0}")]
    Json(#[from] serde_json::Error),

    /// The object carried neither a `status` nor an `error` field.
    #[error("Progress line has no status")]
    MissingStatus,
}
