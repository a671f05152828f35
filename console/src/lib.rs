pub mod cli;
pub mod clients;
pub mod config;
pub mod error;
pub mod format;
pub mod install;
pub mod listeners;
pub mod log;
pub mod models;
pub mod setup;
mod sync;

pub use error::Error;
pub use setup::Console;
