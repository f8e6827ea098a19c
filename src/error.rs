use std::error::Error;
use std::fmt;

#[derive(Debug)]
pub enum PairlinkError {
    // Registry errors
    AlreadyRegistered(String),
    SessionNotFound(String),
    Banned(String),

    // Room errors
    RoomNotFound(String),
    RoomClosed(String),
    NotParticipant(String),
    MessageLimitReached(String),

    // Queue errors
    QueueFull,

    // Protocol errors
    Validation(String),
    Precondition(String),

    // System errors
    Config(String),
    Transport(String),
    Internal(String),
}

impl fmt::Display for PairlinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyRegistered(id) => write!(f, "Transport already registered: {}", id),
            Self::SessionNotFound(id) => write!(f, "Session not found: {}", id),
            Self::Banned(id) => write!(f, "Session is banned: {}", id),
            Self::RoomNotFound(id) => write!(f, "Room not found: {}", id),
            Self::RoomClosed(id) => write!(f, "Room is closed: {}", id),
            Self::NotParticipant(id) => write!(f, "Not a participant of room: {}", id),
            Self::MessageLimitReached(id) => write!(f, "Message limit reached in room: {}", id),
            Self::QueueFull => write!(f, "Matching queue is full"),
            Self::Validation(msg) => write!(f, "Validation error: {}", msg),
            Self::Precondition(msg) => write!(f, "Precondition failed: {}", msg),
            Self::Config(msg) => write!(f, "Configuration error: {}", msg),
            Self::Transport(msg) => write!(f, "Transport error: {}", msg),
            Self::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl Error for PairlinkError {}

impl PairlinkError {
    /// Stable error code sent to the offending client.
    pub fn wire_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::QueueFull | Self::MessageLimitReached(_) => "capacity",
            Self::Transport(_) => "transport_error",
            Self::Config(_) | Self::Internal(_) => "internal_error",
            _ => "precondition_failed",
        }
    }

    /// Message safe to echo back to the client. Internal detail stays
    /// out of the wire message.
    pub fn wire_message(&self) -> String {
        match self {
            Self::Config(_) | Self::Internal(_) => "internal error".to_string(),
            other => other.to_string(),
        }
    }
}

// Generic result type for the crate
pub type Result<T> = std::result::Result<T, PairlinkError>;
