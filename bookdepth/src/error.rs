use thiserror::Error;

#[derive(Error, Debug)]
pub enum BookError {
    #[error("no order book data available for {0}")]
    Unavailable(String),

    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("render error: {0}")]
    Render(String),

    #[error("HTTP error {status}: {message}")]
    Http { status: u16, message: String },

    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("decimal parse error: {0}")]
    Decimal(#[from] rust_decimal::Error),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("websocket error: {0}")]
    WebSocket(Box<tokio_tungstenite::tungstenite::Error>),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("pong timeout")]
    PongTimeout,

    #[error("stale connection: {0}ms since last message")]
    StaleConnection(u64),

    #[error("sequence gap: expected update {expected}, got {got}")]
    SequenceGap { expected: u64, got: u64 },

    #[error("gave up reconnecting after {0} attempts")]
    ReconnectExhausted(u32),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl From<tokio_tungstenite::tungstenite::Error> for BookError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        BookError::WebSocket(Box::new(e))
    }
}

impl BookError {
    /// Whether the error is scoped to a single request and should be shown to
    /// the caller rather than treated as a session failure.
    pub fn is_request_scoped(&self) -> bool {
        matches!(
            self,
            BookError::Unavailable(_) | BookError::MalformedInput(_) | BookError::Render(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, BookError>;
