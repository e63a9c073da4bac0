use thiserror::Error;

/// Startup failures: loading configuration and preparing the database.
#[derive(Error, Debug)]
pub enum BloomError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}

/// Input rejected before any side effect takes place.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("subject name is required")]
    MissingName,

    #[error("subject gender is required")]
    MissingGender,

    #[error("subject age {age} is outside the accepted range {min}..={max}")]
    AgeOutOfRange { age: i32, min: i32, max: i32 },

    #[error("answer is empty")]
    EmptyAnswer,

    #[error("unknown column: {0}")]
    UnknownColumn(String),

    #[error("column {column} expects {expected}, got {actual}")]
    ColumnType {
        column: String,
        expected: &'static str,
        actual: String,
    },

    #[error("column {0} cannot be written by a patch")]
    ReadOnlyColumn(String),
}
