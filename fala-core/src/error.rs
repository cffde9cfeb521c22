#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Lesson error: {0}")]
    Lesson(String),

    #[error("Template error: {0}")]
    Template(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
