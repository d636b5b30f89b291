use thiserror::Error;

#[derive(Error, Debug)]
pub enum NavigatorError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to parse configuration: {0}")]
    ConfigFormat(#[from] serde_yaml::Error),

    #[error("Malformed service message: {0}")]
    Message(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, NavigatorError>;
