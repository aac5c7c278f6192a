use thiserror::Error;

pub type Result<T> = std::result::Result<T, FilterError>;

#[derive(Error, Debug, PartialEq)]
pub enum FilterError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Decay timer already running")]
    AlreadyStarted,

    #[error("Decay timer not running")]
    NotStarted,
}

// Conversion from String for validation errors
impl From<String> for FilterError {
    fn from(msg: String) -> Self {
        FilterError::InvalidConfig(msg)
    }
}
