use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure body returned by the scheduling backend and by our own routes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: u16,
    #[serde(default)]
    pub message: String,
}

impl ErrorResponse {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

/// Errors raised while talking to the external scheduling backend.
#[derive(Error, Debug)]
pub enum BookingError {
    #[error("scheduling backend returned {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("request to scheduling backend failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected response from scheduling backend: {0}")]
    Decode(#[from] serde_json::Error),
}

impl BookingError {
    pub fn status(&self) -> u16 {
        match self {
            BookingError::Upstream { status, .. } => *status,
            BookingError::Transport(e) => e.status().map(|s| s.as_u16()).unwrap_or(502),
            BookingError::Decode(_) => 502,
        }
    }

    pub fn to_response(&self) -> ErrorResponse {
        match self {
            BookingError::Upstream { status, message } => ErrorResponse::new(*status, message.clone()),
            other => ErrorResponse::new(other.status(), other.to_string()),
        }
    }
}

/// Rejected transitions of the booking flow.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FlowError {
    #[error("action not allowed while {actual}, expected {expected}")]
    WrongStep {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("mentorship occurrence {0} is not configured for this class")]
    UnknownOccurrence(usize),

    #[error("mentorship occurrence {0} is already booked")]
    AlreadyBooked(usize),

    #[error("date {0} is not offered for this occurrence")]
    DateNotOffered(String),

    #[error("date {0} is in the past")]
    DateInPast(String),

    #[error("slot {0} was not found")]
    SlotNotFound(String),

    #[error("slot {0} is not available")]
    SlotUnavailable(String),

    #[error("choose a time at least 1 hour in advance")]
    TooSoon,

    #[error("a booking is already being submitted")]
    SubmissionInFlight,

    #[error("invalid date: {0}")]
    InvalidDate(String),
}

impl FlowError {
    pub fn status(&self) -> u16 {
        match self {
            FlowError::TooSoon | FlowError::SubmissionInFlight | FlowError::SlotUnavailable(_) | FlowError::AlreadyBooked(_) => 409,
            FlowError::UnknownOccurrence(_) | FlowError::SlotNotFound(_) => 404,
            _ => 400,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read settings: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse settings: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("environment variable '{0}' not found")]
    MissingEnv(String),

    #[error("invalid setting '{key}': {reason}")]
    Invalid { key: &'static str, reason: String },
}
