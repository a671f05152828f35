use derive_more::{Display, From};

#[derive(Debug, Display, From)]
pub enum Error {
    #[from]
    Config(crate::config::ConfigError),

    #[from]
    Transport(crate::clients::TransportError),

    #[from]
    Start(crate::install::StartError),

    #[from]
    Io(std::io::Error),
}

impl std::error::Error for Error {}

impl Error {
    /// Returns a user-friendly error message suitable for display
    pub fn user_message(&self) -> String {
        match self {
            Error::Config(e) => e.to_string(),
            Error::Transport(e) => e.user_message(),
            Error::Start(e) => e.user_message(),
            Error::Io(e) => format!("I/O error: {}", e),
        }
    }
}
