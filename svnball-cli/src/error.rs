use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Archive error: {0}")]
    Archive(#[from] svnball_engine::ArchiveError),

    #[error("Revision cache error: {0}")]
    Cache(#[from] svnball_engine::CacheError),

    #[error("Revision store error: {0}")]
    Store(#[from] svnball_engine::StoreError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Initialization failed: {0}")]
    Initialization(String),
}

impl From<toml::de::Error> for AppError {
    fn from(error: toml::de::Error) -> Self {
        AppError::Config(error.to_string())
    }
}
