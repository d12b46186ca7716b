use parley_shared::IdError;
use parley_store::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Directory error: {0}")]
    Directory(String),

    #[error("Invalid identifier: {0}")]
    Id(#[from] IdError),

    #[error("No authenticated user; messaging is disabled")]
    NoIdentity,

    #[error("No conversation selected")]
    NoSelection,

    #[error("Message is empty")]
    EmptyMessage,

    #[error("The message being edited no longer exists")]
    EditTargetGone,
}
