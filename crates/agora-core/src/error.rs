use uuid::Uuid;

use agora_db::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum ForumError {
    #[error("content {0} not found")]
    NotFound(Uuid),

    #[error("content {0} was modified concurrently")]
    Conflict(Uuid),

    #[error("parent {0} does not exist")]
    InvalidReference(Uuid),

    #[error("invalid content: {0}")]
    Validation(&'static str),

    #[error(transparent)]
    Store(anyhow::Error),
}

impl From<StoreError> for ForumError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => Self::NotFound(id),
            StoreError::Conflict(id) => Self::Conflict(id),
            StoreError::Backend(e) => Self::Store(e),
        }
    }
}

pub type Result<T> = std::result::Result<T, ForumError>;
