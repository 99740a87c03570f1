// Domain Error Types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Duplicate queue name: {0} (a live queue already holds this name)")]
    DuplicateQueueName(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid entry: {0}")]
    InvalidEntry(String),
}

pub type Result<T> = std::result::Result<T, DomainError>;
