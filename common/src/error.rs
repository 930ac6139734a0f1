use thiserror::Error;

/// Rule violations raised by the domain layer. Handlers map each variant to
/// an HTTP status; anything else travels as `anyhow::Error`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    InvalidState(String),

    #[error("{}", .0.join("; "))]
    Invalid(Vec<String>),

    /// Another writer changed the row first.
    #[error("{0}")]
    Conflict(String),
}

impl DomainError {
    pub fn invalid(message: impl Into<String>) -> Self {
        DomainError::Invalid(vec![message.into()])
    }

    pub fn state(message: impl Into<String>) -> Self {
        DomainError::InvalidState(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        DomainError::Forbidden(message.into())
    }
}

pub type DomainResult<T> = std::result::Result<T, DomainError>;

/// Collects validation messages and turns them into a single error.
#[derive(Debug, Default)]
pub struct Violations(Vec<String>);

impl Violations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(&mut self, ok: bool, message: &str) {
        if !ok {
            self.0.push(message.to_string());
        }
    }

    pub fn into_result(self) -> DomainResult<()> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(DomainError::Invalid(self.0))
        }
    }
}
