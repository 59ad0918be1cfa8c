use thiserror::Error;

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("upstream returned {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid configuration: {0}")]
    Validation(String),

    #[error("{0}")]
    Unschedulable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl SchedulerError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, SchedulerError::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
