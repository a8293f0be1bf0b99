//! Error types for the diary

use thiserror::Error;

/// A backend operation failed. The message is shown to the user verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct BackendError {
    pub message: String,
}

impl BackendError {
    pub fn new(message: impl Into<String>) -> Self {
        BackendError {
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        BackendError::new(err.to_string())
    }
}

impl From<serde_json::Error> for BackendError {
    fn from(err: serde_json::Error) -> Self {
        BackendError::new(format!("malformed response: {err}"))
    }
}

/// User actions that reach the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    SignIn,
    SignUp,
    SignOut,
    SaveEntry,
    UpdateEntry,
    DeleteEntry,
}

impl Operation {
    fn prefix(self) -> &'static str {
        match self {
            Operation::SignIn | Operation::SignUp => "Error",
            Operation::SignOut => "Error signing out",
            Operation::SaveEntry => "Error saving entry",
            Operation::UpdateEntry => "Error updating entry",
            Operation::DeleteEntry => "Error deleting entry",
        }
    }
}

/// A failed operation, ready to be shown as a blocking alert.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}: {}", .operation.prefix(), .error.message)]
pub struct Notice {
    pub operation: Operation,
    #[source]
    pub error: BackendError,
}

impl Notice {
    pub fn new(operation: Operation, error: BackendError) -> Self {
        Notice { operation, error }
    }
}

/// Attaches the operation to a backend result.
pub(crate) trait ResultExt<T> {
    fn during(self, operation: Operation) -> Result<T, Notice>;
}

impl<T> ResultExt<T> for Result<T, BackendError> {
    fn during(self, operation: Operation) -> Result<T, Notice> {
        self.map_err(|error| {
            tracing::warn!(?operation, %error, "backend operation failed");
            Notice::new(operation, error)
        })
    }
}
