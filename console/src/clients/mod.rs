mod error;
mod transport;

// Re-export public types
pub use error::TransportError;
pub use transport::{StreamEnd, Transport};
