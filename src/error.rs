use std::time::Duration;
use thiserror::Error;

/// A staff-channel notice could not be posted. The complaint is not persisted
/// in this case and the submitter is told to retry.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DeliverError {
    #[error("gateway timed out after {0:?}")]
    Timeout(Duration),

    #[error("channel rejected the message: {0}")]
    Rejected(String),

    #[error("transport failure: {0}")]
    Transport(String),
}

/// A citizen could not be notified after a staff reply. The response stays
/// recorded; the failure is reported to the staff channel instead.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum NotifyError {
    #[error("user has blocked the bot")]
    Blocked,

    #[error("user account is deactivated")]
    Deactivated,

    #[error("user unreachable, chat not found")]
    Unreachable,

    #[error("refusing to message the bot's own account")]
    SelfMessage,

    #[error("notification failed: {0}")]
    Other(String),
}

impl NotifyError {
    /// Maps a raw transport error message onto the classification the staff
    /// channel sees. Unknown messages fall through to `Other`.
    pub fn classify(raw: &str) -> NotifyError {
        let lowered = raw.to_ascii_lowercase();
        if lowered.contains("blocked by the user") {
            NotifyError::Blocked
        } else if lowered.contains("user is deactivated") {
            NotifyError::Deactivated
        } else if lowered.contains("chat not found") {
            NotifyError::Unreachable
        } else if lowered.contains("can't send messages to bots") {
            NotifyError::SelfMessage
        } else {
            NotifyError::Other(raw.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_known_transport_errors() {
        assert_eq!(
            NotifyError::classify("Forbidden: bot was blocked by the user"),
            NotifyError::Blocked
        );
        assert_eq!(
            NotifyError::classify("Forbidden: user is deactivated"),
            NotifyError::Deactivated
        );
        assert_eq!(
            NotifyError::classify("Bad Request: chat not found"),
            NotifyError::Unreachable
        );
        assert_eq!(
            NotifyError::classify("Forbidden: bots can't send messages to bots"),
            NotifyError::SelfMessage
        );
    }

    #[test]
    fn unknown_errors_fall_through_to_other() {
        assert_eq!(
            NotifyError::classify("something else entirely"),
            NotifyError::Other("something else entirely".to_string())
        );
    }
}
