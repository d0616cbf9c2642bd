use thiserror::Error;

#[derive(Debug, Error)]
pub enum TossApiError {
    #[error("Could not initialize client: {0}")]
    Initialization(String),
}
