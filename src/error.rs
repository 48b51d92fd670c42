use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum AlarmError {
    #[error("Failed to open GPIO pin {pin}: {source}")]
    GpioOpenFailed {
        pin: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to persist monitoring state to {path}: {source}")]
    StateWriteFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Notification delivery failed: {0}")]
    NotificationFailed(String),

    #[error("Status socket error: {0}")]
    SocketError(String),

    #[error("another door-alarm instance is already running")]
    AlreadyRunning,

    #[error(transparent)]
    IoError(#[from] std::io::Error),

    #[error(transparent)]
    SerdeJsonError(#[from] serde_json::Error),

    #[error(transparent)]
    HttpError(#[from] reqwest::Error),

    #[error(transparent)]
    WebSocketError(#[from] tokio_tungstenite::tungstenite::Error),
}

pub type Result<T> = std::result::Result<T, AlarmError>;
