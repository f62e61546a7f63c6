/// Errors produced while reviewing a single admission request.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A field the mutation needs is missing or has the wrong type.
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    /// Patch computation or encoding failed.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedRequest(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// HTTP-like status code reported when a request is denied because of
    /// this error.
    pub fn code(&self) -> u16 {
        match self {
            Error::MalformedRequest(_) => 400,
            Error::Internal(_) => 500,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Internal(format!("serialization failed: {}", e))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
