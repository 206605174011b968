use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Book(#[from] bookdepth::BookError),

    #[error("config error: {0}")]
    Config(String),

    #[error("terminal error: {0}")]
    Terminal(#[from] std::io::Error),

    #[error("stream session failed: {0}")]
    SessionFailed(String),
}

impl AppError {
    /// Request-scoped failures are reported to the user; everything else
    /// ends the process with a non-zero status.
    pub fn is_fatal(&self) -> bool {
        match self {
            AppError::Book(e) => !e.is_request_scoped(),
            AppError::Config(_) | AppError::Terminal(_) | AppError::SessionFailed(_) => true,
        }
    }
}
