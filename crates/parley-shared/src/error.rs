use thiserror::Error;

/// Rejections produced while validating identifiers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdError {
    #[error("Identifier is empty")]
    Empty,

    #[error("Identifier {id:?} contains reserved character {ch:?}")]
    ReservedChar { id: String, ch: char },

    #[error("Malformed conversation key: {0:?}")]
    MalformedKey(String),
}
